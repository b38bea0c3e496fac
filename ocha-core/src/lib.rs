#![warn(clippy::all, rust_2018_idioms)]

mod context;
pub mod language;
pub mod prettyprinter;
pub mod stepper;
pub mod substitute;

pub use language::{
    Callee, Control, Definition, Defs, Expr, Param, PrimOp, Program, Variable,
    parse::{ParseError, parse_expr, parse_program},
};
pub use stepper::{StepError, step};
