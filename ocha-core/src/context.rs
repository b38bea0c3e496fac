//! One-hole evaluation contexts.
//!
//! A context is split at the nearest enclosing `reset`: `current` rebuilds the
//! expression up to that delimiter, `outer` rebuilds everything beyond it.
//! `shift` captures `current` and nothing else.

use crate::{language::Expr, stepper::StepError};

/// Rebuilds the delimited part of the context around its hole.
pub(crate) type Frame = Box<dyn FnOnce(Expr) -> Expr>;

/// Rebuilds the context beyond the nearest delimiter. Closing a delimiter can
/// fail, so this is fallible.
pub(crate) type Outer = Box<dyn FnOnce(Expr) -> Result<Expr, StepError>>;

pub(crate) struct Context {
    current: Frame,
    outer: Outer,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            current: Box::new(|expr| expr),
            outer: Box::new(Ok::<Expr, StepError>),
        }
    }
}

impl Context {
    /// Descends one level: the hole of the result is the hole of `frame`.
    #[must_use]
    pub(crate) fn within(self, frame: impl FnOnce(Expr) -> Expr + 'static) -> Self {
        let Self { current, outer } = self;
        Self {
            current: Box::new(move |expr| current(frame(expr))),
            outer,
        }
    }

    /// Crosses a delimiter. Everything gathered so far moves into `outer`
    /// behind `close`, which rebuilds the delimiter itself, and `current`
    /// starts over.
    #[must_use]
    pub(crate) fn delimit(
        self,
        close: impl FnOnce(Expr) -> Result<Expr, StepError> + 'static,
    ) -> Self {
        let Self { current, outer } = self;
        Self {
            current: Box::new(|expr| expr),
            outer: Box::new(move |expr| outer(current(close(expr)?))),
        }
    }

    /// Fills the hole, rebuilding the whole expression.
    pub(crate) fn plug(self, expr: Expr) -> Result<Expr, StepError> {
        (self.outer)((self.current)(expr))
    }

    /// Splits off the delimited part of the context, filled with `hole`.
    pub(crate) fn capture(self, hole: Expr) -> (Expr, Outer) {
        ((self.current)(hole), self.outer)
    }
}
