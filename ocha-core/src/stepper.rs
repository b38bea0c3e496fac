use thiserror::Error;
use tracing::{Level, debug, trace};

use crate::{
    context::Context,
    language::{Callee, Control, Definition, Defs, Expr, Fresh, Param, PrimOp, Variable},
    substitute::substitute,
};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum StepError {
    #[error("No reduction rule applies to `{0}`")]
    UnknownShape(Expr),

    #[error("`{0}` is not defined")]
    UnboundGlobal(Variable),

    #[error("Expected at least {expected} arguments, found {found}")]
    ArityUnderflow { expected: usize, found: usize },

    #[error("`{0}` expects a single function argument")]
    MalformedControl(Control),

    #[error("reset produced `{0}`, which cannot be applied to its remaining arguments")]
    ResetArguments(Expr),

    #[error("`{0}` expects two numbers")]
    PrimitiveOperands(PrimOp),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("`{0}` produced a number that is not finite")]
    NotFinite(PrimOp),
}

/// Performs exactly one reduction step of `expr` under the global definitions `defs`.
///
/// Values are returned unchanged, so a caller driving evaluation stops once
/// [`Expr::is_value`] holds. Fresh variables minted during the step are named
/// `v0`, `v1`, ... afresh on every call.
///
/// # Errors
///
/// Returns an error if no reduction rule applies, in which case no partial
/// result is produced.
#[tracing::instrument(level = Level::DEBUG, skip_all, fields(expr = %expr), err, ret(Display))]
pub fn step(defs: &Defs, expr: &Expr) -> Result<Expr, StepError> {
    Stepper::new(defs).step(expr.clone(), Context::default())
}

struct Stepper<'a> {
    defs: &'a Defs,
    fresh: usize,
}

impl<'a> Stepper<'a> {
    fn new(defs: &'a Defs) -> Self {
        Self { defs, fresh: 0 }
    }

    /// Mints the next `v<n>` not already taken by a global definition.
    fn fresh_var(&mut self) -> Variable {
        loop {
            let var = Variable::fresh(self.fresh);
            self.fresh += 1;
            if self.defs.get(&var).is_none() {
                return var;
            }
        }
    }

    fn lookup(&self, name: &Variable) -> Result<&'a Definition, StepError> {
        self.defs
            .get(name)
            .ok_or_else(|| StepError::UnboundGlobal(name.clone()))
    }

    fn step(&mut self, expr: Expr, ctx: Context) -> Result<Expr, StepError> {
        match expr {
            Expr::Number(_) | Expr::Unit | Expr::Lambda { .. } => ctx.plug(expr),
            Expr::Ident(name) => {
                let def = self.lookup(&name)?;
                debug!(%name, "expanding global");
                ctx.plug(def.to_lambda())
            }
            Expr::Apply { callee, args } => self.apply(callee, args, ctx),
        }
    }

    fn apply(&mut self, callee: Callee, args: Vec<Expr>, ctx: Context) -> Result<Expr, StepError> {
        // Arguments are evaluated right to left.
        if let Some(index) = args.iter().rposition(|arg| !arg.is_value()) {
            return self.argument(callee, args, index, ctx);
        }

        match callee {
            Callee::Control(Control::Reset) => self.reset(args, ctx),
            Callee::Control(Control::Shift) => self.shift(args, ctx),
            Callee::Prim(op) => {
                let value = primitive(op, &args)?;
                debug!(%op, value, "primitive");
                ctx.plug(Expr::Number(value))
            }
            Callee::Named(name) => {
                let def = self.lookup(&name)?;
                debug!(%name, "expanding global");
                ctx.plug(Expr::apply(def.to_lambda(), args))
            }
            Callee::Expr(callee) => match *callee {
                Expr::Lambda { params, body } => {
                    debug!(arity = params.len(), "beta");
                    ctx.plug(beta(params, *body, args)?)
                }
                callee @ (Expr::Apply { .. } | Expr::Ident(_)) => {
                    trace!("descending into callee");
                    let ctx = ctx.within(move |hole| Expr::apply(hole, args));
                    self.step(callee, ctx)
                }
                callee => Err(StepError::UnknownShape(Expr::apply(callee, args))),
            },
        }
    }

    fn argument(
        &mut self,
        callee: Callee,
        mut args: Vec<Expr>,
        index: usize,
        ctx: Context,
    ) -> Result<Expr, StepError> {
        trace!(index, "descending into argument");
        let focus = std::mem::take(&mut args[index]);
        let ctx = ctx.within(move |hole| {
            let mut args = args;
            args[index] = hole;
            Expr::Apply { callee, args }
        });
        self.step(focus, ctx)
    }

    fn reset(&mut self, args: Vec<Expr>, ctx: Context) -> Result<Expr, StepError> {
        let mut args = args.into_iter();
        let Some(Expr::Lambda { params, body }) = args.next() else {
            return Err(StepError::MalformedControl(Control::Reset));
        };
        if params.len() > 1 {
            return Err(StepError::MalformedControl(Control::Reset));
        }
        let trailing: Vec<Expr> = args.collect();

        if body.is_value() {
            debug!("popping reset");
            return ctx.plug(close_reset(params, *body, trailing)?);
        }

        trace!("crossing reset");
        let ctx = ctx.delimit(move |inner| close_reset(params, inner, trailing));
        self.step(*body, ctx)
    }

    fn shift(&mut self, args: Vec<Expr>, ctx: Context) -> Result<Expr, StepError> {
        let Ok([handler]) = <[Expr; 1]>::try_from(args) else {
            return Err(StepError::MalformedControl(Control::Shift));
        };
        if !matches!(&handler, Expr::Lambda { params, .. } if params.len() == 1) {
            return Err(StepError::MalformedControl(Control::Shift));
        }

        let var = self.fresh_var();
        let (delimited, outer) = ctx.capture(Expr::Ident(var.clone()));
        let continuation = Expr::lambda(vec![Param::Var(var)], Expr::reset(delimited));
        debug!(%continuation, "captured continuation");
        outer(Expr::apply(handler, vec![continuation]))
    }
}

/// Rebuilds the `reset` delimiting `body`, or removes it once `body` is a
/// value. A function value is applied to the arguments the `reset` carried.
fn close_reset(params: Vec<Param>, body: Expr, trailing: Vec<Expr>) -> Result<Expr, StepError> {
    if !body.is_value() {
        let args = std::iter::once(Expr::lambda(params, body))
            .chain(trailing)
            .collect();
        return Ok(Expr::Apply {
            callee: Callee::Control(Control::Reset),
            args,
        });
    }
    if trailing.is_empty() {
        return Ok(body);
    }
    match body {
        lambda @ Expr::Lambda { .. } => Ok(Expr::apply(lambda, trailing)),
        value => Err(StepError::ResetArguments(value)),
    }
}

/// Applies a lambda to fully evaluated arguments, one parameter at a time.
fn beta(mut params: Vec<Param>, body: Expr, mut args: Vec<Expr>) -> Result<Expr, StepError> {
    if params.is_empty() {
        return Err(StepError::UnknownShape(Expr::apply(
            Expr::lambda(params, body),
            args,
        )));
    }
    if args.len() < params.len() {
        return Err(StepError::ArityUnderflow {
            expected: params.len(),
            found: args.len(),
        });
    }

    if params.len() > 1 {
        trace!("currying");
        let rest_params = params.split_off(1);
        let rest_args = args.split_off(1);
        let body = Expr::apply(Expr::lambda(rest_params, body), rest_args);
        return beta(params, body, args);
    }

    let surplus = args.split_off(1);
    let reduced = substitute(&body, &params[0], &args[0]);
    if surplus.is_empty() {
        Ok(reduced)
    } else {
        Ok(Expr::apply(reduced, surplus))
    }
}

fn primitive(op: PrimOp, args: &[Expr]) -> Result<f64, StepError> {
    let [Expr::Number(lhs), Expr::Number(rhs)] = args else {
        return Err(StepError::PrimitiveOperands(op));
    };
    let value = match op {
        PrimOp::Add => lhs + rhs,
        PrimOp::Sub => lhs - rhs,
        PrimOp::Mul => lhs * rhs,
        PrimOp::Div if *rhs == 0.0 => return Err(StepError::DivisionByZero),
        PrimOp::Div => lhs / rhs,
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(StepError::NotFinite(op))
    }
}
