use pretty::RcDoc;

use super::{PrettyPrint, parens, spaced};
use crate::language::{Callee, Definition, Expr, Param, Program, Variable};

impl PrettyPrint for Program {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        RcDoc::intersperse(
            self.defs
                .iter()
                .map(PrettyPrint::to_doc)
                .chain(std::iter::once(self.expr.to_doc())),
            RcDoc::text(";;")
                .append(RcDoc::hardline())
                .append(RcDoc::hardline()),
        )
    }
}

impl PrettyPrint for Definition {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        RcDoc::text("let")
            .append(RcDoc::space())
            .append(self.name.to_doc())
            .append(if self.params.is_empty() {
                RcDoc::nil()
            } else {
                RcDoc::space().append(spaced(&self.params))
            })
            .append(RcDoc::space())
            .append(RcDoc::text("="))
            .append(RcDoc::hardline().append(self.body.to_doc()).nest(2))
    }
}

impl PrettyPrint for Variable {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        RcDoc::text(&self.0)
    }
}

impl PrettyPrint for Param {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        match self {
            Self::Var(var) => var.to_doc(),
            Self::Unit => RcDoc::text("()"),
            Self::Wildcard => RcDoc::text("_"),
        }
    }
}

impl PrettyPrint for Expr {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        match self {
            Self::Number(n) => RcDoc::as_string(n),
            Self::Ident(var) => var.to_doc(),
            Self::Unit => RcDoc::text("()"),
            Self::Lambda { params, body } => RcDoc::text("fun")
                .append(RcDoc::space())
                .append(spaced(params))
                .append(RcDoc::space())
                .append(RcDoc::text("->"))
                .append(RcDoc::space())
                .append(body.to_doc()),
            Self::Apply {
                callee: Callee::Prim(op),
                args,
            } if args.len() == 2 => {
                let precedence = op.precedence();
                operand(&args[0], precedence, false)
                    .append(RcDoc::space())
                    .append(RcDoc::as_string(op))
                    .append(RcDoc::space())
                    .append(operand(&args[1], precedence, true))
            }
            Self::Apply { callee, args } if args.is_empty() => callee.to_doc(),
            Self::Apply { callee, args } => callee.to_doc().append(RcDoc::space()).append(
                RcDoc::intersperse(args.iter().map(argument), RcDoc::space()),
            ),
        }
    }
}

impl PrettyPrint for Callee {
    fn to_doc(&self) -> RcDoc<'_, ()> {
        match self {
            Self::Prim(op) => parens(RcDoc::as_string(op)),
            Self::Control(control) => RcDoc::as_string(control),
            Self::Named(var) => var.to_doc(),
            Self::Expr(expr) => parens(expr.to_doc()),
        }
    }
}

/// Operand of an infix operator binding with `precedence`. Operators are left
/// associative, so an equally binding operator on the right needs parentheses.
fn operand(expr: &Expr, precedence: u8, right: bool) -> RcDoc<'_, ()> {
    let needs_parens = match expr {
        Expr::Lambda { .. } => true,
        Expr::Apply {
            callee: Callee::Prim(op),
            args,
        } if args.len() == 2 => {
            op.precedence() < precedence || (right && op.precedence() == precedence)
        }
        _ => false,
    };
    if needs_parens {
        parens(expr.to_doc())
    } else {
        expr.to_doc()
    }
}

fn argument(expr: &Expr) -> RcDoc<'_, ()> {
    match expr {
        Expr::Lambda { .. } | Expr::Apply { .. } => parens(expr.to_doc()),
        Expr::Number(n) if n.is_sign_negative() => parens(expr.to_doc()),
        _ => expr.to_doc(),
    }
}
