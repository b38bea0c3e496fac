use std::fmt::{self, Write};

use derive_more::{Display, From};
use indexmap::IndexMap;
use pest_ast::FromPest;
use thiserror::Error;

use self::parse::{Rule, span_into_str};
use crate::prettyprinter::PrettyPrint;

pub mod parse;

pub trait Fresh {
    fn fresh(number: usize) -> Self;
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From, FromPest)]
#[pest_ast(rule(Rule::ident))]
pub struct Variable(#[pest_ast(outer(with(span_into_str), with(str::to_string)))] pub String);

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Variable(value.to_string())
    }
}

impl Fresh for Variable {
    fn fresh(number: usize) -> Self {
        Self(format!("v{number}"))
    }
}

/// Primitive arithmetic operators, always applied to exactly two numbers.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum PrimOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
}

impl PrimOp {
    /// Binding strength for infix printing and parsing.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div => 2,
        }
    }
}

/// The two reserved callee names delimiting and capturing continuations.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum Control {
    #[display("reset")]
    Reset,
    #[display("shift")]
    Shift,
}

impl Control {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reset" => Some(Self::Reset),
            "shift" => Some(Self::Shift),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Param {
    Var(Variable),
    Unit,
    Wildcard,
}

impl Param {
    /// The name this parameter binds, if any.
    #[must_use]
    pub fn var(&self) -> Option<&Variable> {
        match self {
            Self::Var(var) => Some(var),
            Self::Unit | Self::Wildcard => None,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(var) => write!(f, "{var}"),
            Self::Unit => f.write_str("()"),
            Self::Wildcard => f.write_char('_'),
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Number(f64),
    Ident(Variable),
    Unit,
    Lambda { params: Vec<Param>, body: Box<Expr> },
    Apply { callee: Callee, args: Vec<Expr> },
}

#[derive(Clone, PartialEq, Debug)]
pub enum Callee {
    Prim(PrimOp),
    Control(Control),
    Named(Variable),
    Expr(Box<Expr>),
}

impl Expr {
    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    #[must_use]
    pub fn ident(name: impl Into<Variable>) -> Self {
        Self::Ident(name.into())
    }

    #[must_use]
    pub fn lambda(params: Vec<Param>, body: Expr) -> Self {
        Self::Lambda {
            params,
            body: Box::new(body),
        }
    }

    #[must_use]
    pub fn apply(callee: Expr, args: Vec<Expr>) -> Self {
        Self::Apply {
            callee: Callee::Expr(Box::new(callee)),
            args,
        }
    }

    /// Application of a global (or not yet substituted) name.
    #[must_use]
    pub fn call(name: impl Into<Variable>, args: Vec<Expr>) -> Self {
        Self::Apply {
            callee: Callee::Named(name.into()),
            args,
        }
    }

    #[must_use]
    pub fn binary(op: PrimOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Apply {
            callee: Callee::Prim(op),
            args: vec![lhs, rhs],
        }
    }

    /// `reset (fun () -> body)`
    #[must_use]
    pub fn reset(body: Expr) -> Self {
        Self::Apply {
            callee: Callee::Control(Control::Reset),
            args: vec![Self::lambda(vec![Param::Unit], body)],
        }
    }

    /// `shift (fun k -> body)`
    #[must_use]
    pub fn shift(k: impl Into<Variable>, body: Expr) -> Self {
        Self::Apply {
            callee: Callee::Control(Control::Shift),
            args: vec![Self::lambda(vec![Param::Var(k.into())], body)],
        }
    }

    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Number(_) | Self::Unit | Self::Lambda { .. })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pretty())
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct Definition {
    pub name: Variable,
    pub params: Vec<Param>,
    pub body: Expr,
}

impl Definition {
    /// The definition as a first-class value. Definitions without parameters
    /// stand for their body.
    #[must_use]
    pub fn to_lambda(&self) -> Expr {
        if self.params.is_empty() {
            self.body.clone()
        } else {
            Expr::lambda(self.params.clone(), self.body.clone())
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum DefsError {
    #[error("`{0}` is defined more than once")]
    Duplicate(Variable),
}

/// Global definitions, keyed by name in source order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Defs(IndexMap<Variable, Definition>);

impl Defs {
    /// # Errors
    ///
    /// Returns an error if two definitions share a name.
    pub fn new(definitions: impl IntoIterator<Item = Definition>) -> Result<Self, DefsError> {
        let mut map = IndexMap::new();
        for def in definitions {
            if map.contains_key(&def.name) {
                return Err(DefsError::Duplicate(def.name));
            }
            map.insert(def.name.clone(), def);
        }
        Ok(Self(map))
    }

    #[must_use]
    pub fn get(&self, name: &Variable) -> Option<&Definition> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.0.values()
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Program {
    pub defs: Defs,
    pub expr: Expr,
}

impl Default for Expr {
    fn default() -> Self {
        Self::Unit
    }
}
