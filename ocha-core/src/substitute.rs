use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::language::{Callee, Expr, Param, Variable};

/// Replaces the free occurrences of `param` in `body` with `value`.
///
/// Inner binders of the same name shadow the substitution. Binders are never
/// renamed, so a free variable of `value` can be captured by a binder inside
/// `body`. Unit and wildcard parameters bind nothing.
#[must_use]
pub fn substitute(body: &Expr, param: &Param, value: &Expr) -> Expr {
    match param.var() {
        Some(var) => Substitution::new([(var.clone(), value.clone())]).expr(body),
        None => body.clone(),
    }
}

pub(crate) struct Substitution {
    mapping: HashMap<Variable, Expr>,
    /// Free variables of the replacements.
    captures: BTreeSet<Variable>,
}

impl Substitution {
    pub(crate) fn new(mapping: impl IntoIterator<Item = (Variable, Expr)>) -> Self {
        let mapping: HashMap<Variable, Expr> = mapping.into_iter().collect();
        let captures = mapping.values().flat_map(Expr::free_vars).collect();
        Self { mapping, captures }
    }

    pub(crate) fn expr(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Number(_) | Expr::Unit => expr.clone(),
            Expr::Ident(var) => self
                .mapping
                .get(var)
                .cloned()
                .unwrap_or_else(|| expr.clone()),
            Expr::Lambda { params, body } => {
                let mut inner = Self {
                    mapping: self.mapping.clone(),
                    captures: self.captures.clone(),
                };
                for var in params.iter().filter_map(Param::var) {
                    inner.mapping.remove(var);
                }
                if inner.mapping.is_empty() {
                    return expr.clone();
                }
                for var in params.iter().filter_map(Param::var) {
                    if inner.captures.contains(var) {
                        warn!(binder = %var, "substituting under a binder that captures a free variable");
                    }
                }
                Expr::lambda(params.clone(), inner.expr(body))
            }
            Expr::Apply { callee, args } => Expr::Apply {
                callee: self.callee(callee),
                args: args.iter().map(|arg| self.expr(arg)).collect(),
            },
        }
    }

    fn callee(&self, callee: &Callee) -> Callee {
        match callee {
            Callee::Prim(_) | Callee::Control(_) => callee.clone(),
            Callee::Named(var) => match self.mapping.get(var) {
                Some(value) => Callee::Expr(Box::new(value.clone())),
                None => callee.clone(),
            },
            Callee::Expr(expr) => Callee::Expr(Box::new(self.expr(expr))),
        }
    }
}

impl Expr {
    /// Names occurring free in this expression, including named callees.
    #[must_use]
    pub fn free_vars(&self) -> BTreeSet<Variable> {
        let mut vars = BTreeSet::new();
        self.free_variables(&mut BTreeSet::new(), &mut vars);
        vars
    }

    fn free_variables(&self, bound: &mut BTreeSet<Variable>, vars: &mut BTreeSet<Variable>) {
        match self {
            Self::Number(_) | Self::Unit => {}
            Self::Ident(var) => {
                if !bound.contains(var) {
                    vars.insert(var.clone());
                }
            }
            Self::Lambda { params, body } => {
                let mut bound = bound.clone(); // create new scope for bound variables in lambda
                bound.extend(params.iter().filter_map(Param::var).cloned());
                body.free_variables(&mut bound, vars);
            }
            Self::Apply { callee, args } => {
                match callee {
                    Callee::Prim(_) | Callee::Control(_) => {}
                    Callee::Named(var) => {
                        if !bound.contains(var) {
                            vars.insert(var.clone());
                        }
                    }
                    Callee::Expr(expr) => expr.free_variables(bound, vars),
                }
                for arg in args {
                    arg.free_variables(bound, vars);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::substitute;
    use crate::language::{Expr, Param, Variable, parse::parse_expr};

    fn x() -> Param {
        Param::Var("x".into())
    }

    #[rstest]
    #[case("x", "3")]
    #[case("x + x", "3 + 3")]
    #[case("fun y -> x y", "fun y -> 3 y")]
    #[case("fun x -> x", "fun x -> x")]
    #[case("fun y x -> x + y", "fun y x -> x + y")]
    #[case("(fun x -> x) x", "(fun x -> x) 3")]
    #[case("y", "y")]
    #[case("10", "10")]
    fn substitute_number(#[case] body: &str, #[case] expected: &str) -> anyhow::Result<()> {
        let result = substitute(&parse_expr(body)?, &x(), &Expr::number(3.0));
        assert_eq!(result, parse_expr(expected)?);
        Ok(())
    }

    #[test]
    fn named_callee_becomes_expression() -> anyhow::Result<()> {
        let k = parse_expr("fun v -> v + 1")?;
        let result = substitute(&parse_expr("k 10")?, &Param::Var("k".into()), &k);
        assert_eq!(result, Expr::apply(k, vec![Expr::number(10.0)]));
        Ok(())
    }

    #[rstest]
    #[case(Param::Unit)]
    #[case(Param::Wildcard)]
    fn placeholders_bind_nothing(#[case] param: Param) -> anyhow::Result<()> {
        let body = parse_expr("fun () -> x")?;
        assert_eq!(substitute(&body, &param, &Expr::Unit), body);
        Ok(())
    }

    #[test]
    fn substituted_value_can_be_captured() -> anyhow::Result<()> {
        // Binders are not renamed, so the free `y` of the argument is captured.
        let body = parse_expr("fun y -> x")?;
        let result = substitute(&body, &x(), &Expr::ident("y"));
        assert_eq!(result, parse_expr("fun y -> y")?);
        Ok(())
    }

    #[rstest]
    #[case("fun x -> x y", &["y"])]
    #[case("f (fun k -> k 1) z", &["f", "z"])]
    #[case("reset (fun () -> shift (fun k -> k 1))", &[])]
    #[case("(fun x -> x) x", &["x"])]
    fn free_vars(#[case] source: &str, #[case] expected: &[&str]) -> anyhow::Result<()> {
        let vars = parse_expr(source)?.free_vars();
        let expected: std::collections::BTreeSet<Variable> =
            expected.iter().copied().map(Variable::from).collect();
        assert_eq!(vars, expected);
        Ok(())
    }
}
