use std::sync::LazyLock;

use from_pest::{ConversionError, FromPest, Void};
use pest::{
    Parser as _,
    error,
    iterators::{Pair, Pairs},
    pratt_parser::{Assoc, Op, PrattParser},
};
use pest_derive::Parser;
use thiserror::Error;

use super::{Callee, Control, Definition, Defs, DefsError, Expr, Param, PrimOp, Program, Variable};

#[derive(Parser)]
#[grammar = "language/ocha.pest"]
pub struct OchaParser;

pub(crate) fn span_into_str(span: pest::Span<'_>) -> &str {
    span.as_str()
}

#[derive(Clone, Debug, Error)]
pub enum ParseError {
    #[error("Ocha parsing error:\n{0}")]
    Syntax(#[from] Box<error::Error<Rule>>),

    #[error("Conversion error:\n{0}")]
    Conversion(#[from] ConversionError<Void>),

    #[error(transparent)]
    Defs(#[from] DefsError),
}

static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left) | Op::infix(Rule::div, Assoc::Left))
});

/// Parses a whole program: definitions separated by `;;`, then the main expression.
///
/// # Errors
///
/// Returns an error if the source is not syntactically valid or defines a name twice.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let mut pairs = OchaParser::parse(Rule::program, source).map_err(Box::new)?;
    let mut inner = pairs.next().ok_or(ConversionError::NoMatch)?.into_inner();
    let definitions: Vec<Definition> = FromPest::from_pest(&mut inner)?;
    let expr = Expr::from_pest(&mut inner)?;
    end_of_input(inner, stringify!(Program))?;
    Ok(Program {
        defs: Defs::new(definitions)?,
        expr,
    })
}

/// Parses a single expression with no surrounding definitions.
///
/// # Errors
///
/// Returns an error if the source is not a syntactically valid expression.
pub fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    let mut pairs = OchaParser::parse(Rule::toplevel, source).map_err(Box::new)?;
    let mut inner = pairs.next().ok_or(ConversionError::NoMatch)?.into_inner();
    let expr = Expr::from_pest(&mut inner)?;
    end_of_input(inner, stringify!(Expr))?;
    Ok(expr)
}

fn end_of_input(
    mut inner: Pairs<'_, Rule>,
    current_node: &'static str,
) -> Result<(), ConversionError<Void>> {
    match inner.next() {
        Some(pair) if pair.as_rule() == Rule::EOI => Ok(()),
        _ => Err(ConversionError::Extraneous { current_node }),
    }
}

// Conversions from pest parse trees

impl<'pest> FromPest<'pest> for Param {
    type Rule = Rule;
    type FatalError = Void;

    fn from_pest(
        pest: &mut Pairs<'pest, Self::Rule>,
    ) -> Result<Self, ConversionError<Self::FatalError>> {
        let mut clone = pest.clone();
        let pair = clone.next().ok_or(ConversionError::NoMatch)?;
        if pair.as_rule() != Rule::param {
            return Err(ConversionError::NoMatch);
        }
        let inner = pair
            .into_inner()
            .next()
            .ok_or(ConversionError::NoMatch)?;
        let param = match inner.as_rule() {
            Rule::ident => Param::Var(Variable::from(inner.as_str())),
            Rule::unit => Param::Unit,
            Rule::wildcard => Param::Wildcard,
            _ => return Err(ConversionError::NoMatch),
        };
        *pest = clone;
        Ok(param)
    }
}

impl<'pest> FromPest<'pest> for Definition {
    type Rule = Rule;
    type FatalError = Void;

    fn from_pest(
        pest: &mut Pairs<'pest, Self::Rule>,
    ) -> Result<Self, ConversionError<Self::FatalError>> {
        let mut clone = pest.clone();
        let pair = clone.next().ok_or(ConversionError::NoMatch)?;
        if pair.as_rule() != Rule::definition {
            return Err(ConversionError::NoMatch);
        }
        let mut inner = pair.into_inner();
        let def = Definition {
            name: FromPest::from_pest(&mut inner)?,
            params: FromPest::from_pest(&mut inner)?,
            body: FromPest::from_pest(&mut inner)?,
        };
        if inner.next().is_some() {
            return Err(ConversionError::Extraneous {
                current_node: stringify!(Definition),
            });
        }
        *pest = clone;
        Ok(def)
    }
}

impl<'pest> FromPest<'pest> for Expr {
    type Rule = Rule;
    type FatalError = Void;

    fn from_pest(
        pest: &mut Pairs<'pest, Self::Rule>,
    ) -> Result<Self, ConversionError<Self::FatalError>> {
        let mut clone = pest.clone();
        let pair = clone.next().ok_or(ConversionError::NoMatch)?;
        if pair.as_rule() != Rule::expr {
            return Err(ConversionError::NoMatch);
        }
        let expr = expr(pair)?;
        *pest = clone;
        Ok(expr)
    }
}

fn expr(pair: Pair<'_, Rule>) -> Result<Expr, ConversionError<Void>> {
    let pair = pair.into_inner().next().ok_or(ConversionError::NoMatch)?;
    match pair.as_rule() {
        Rule::let_in => let_in(pair),
        Rule::lambda => lambda(pair),
        Rule::seq => seq(pair),
        _ => Err(ConversionError::NoMatch),
    }
}

/// `let p = value in body` is sugar for `(fun p -> body) value`.
fn let_in(pair: Pair<'_, Rule>) -> Result<Expr, ConversionError<Void>> {
    let mut inner = pair.into_inner();
    let param = Param::from_pest(&mut inner)?;
    let value = Expr::from_pest(&mut inner)?;
    let body = Expr::from_pest(&mut inner)?;
    Ok(Expr::apply(Expr::lambda(vec![param], body), vec![value]))
}

fn lambda(pair: Pair<'_, Rule>) -> Result<Expr, ConversionError<Void>> {
    let mut inner = pair.into_inner();
    let params: Vec<Param> = FromPest::from_pest(&mut inner)?;
    let body = Expr::from_pest(&mut inner)?;
    if params.is_empty() {
        return Err(ConversionError::NoMatch);
    }
    Ok(Expr::lambda(params, body))
}

/// `first; second` is sugar for `(fun _ -> second) first`.
fn seq(pair: Pair<'_, Rule>) -> Result<Expr, ConversionError<Void>> {
    let mut inner = pair.into_inner();
    let first = binary(inner.next().ok_or(ConversionError::NoMatch)?)?;
    match inner.next() {
        None => Ok(first),
        Some(second) => Ok(Expr::apply(
            Expr::lambda(vec![Param::Wildcard], expr(second)?),
            vec![first],
        )),
    }
}

fn binary(pair: Pair<'_, Rule>) -> Result<Expr, ConversionError<Void>> {
    PRATT
        .map_primary(app)
        .map_infix(|lhs, op, rhs| Ok(Expr::binary(prim_op(&op)?, lhs?, rhs?)))
        .parse(pair.into_inner())
}

fn prim_op(pair: &Pair<'_, Rule>) -> Result<PrimOp, ConversionError<Void>> {
    match pair.as_rule() {
        Rule::add => Ok(PrimOp::Add),
        Rule::sub => Ok(PrimOp::Sub),
        Rule::mul => Ok(PrimOp::Mul),
        Rule::div => Ok(PrimOp::Div),
        _ => Err(ConversionError::NoMatch),
    }
}

fn app(pair: Pair<'_, Rule>) -> Result<Expr, ConversionError<Void>> {
    let mut inner = pair.into_inner();
    let head = inner.next().ok_or(ConversionError::NoMatch)?;
    let args = inner.map(atom).collect::<Result<Vec<_>, _>>()?;
    if args.is_empty() {
        return atom(head);
    }
    let callee = match head.as_rule() {
        Rule::ident => Control::from_name(head.as_str()).map_or_else(
            || Callee::Named(Variable::from(head.as_str())),
            Callee::Control,
        ),
        Rule::section => {
            let op = head.into_inner().next().ok_or(ConversionError::NoMatch)?;
            Callee::Prim(prim_op(&op)?)
        }
        _ => Callee::Expr(Box::new(atom(head)?)),
    };
    Ok(Expr::Apply { callee, args })
}

fn atom(pair: Pair<'_, Rule>) -> Result<Expr, ConversionError<Void>> {
    match pair.as_rule() {
        Rule::number => pair
            .as_str()
            .parse()
            .map(Expr::Number)
            .map_err(|_err| ConversionError::NoMatch),
        Rule::unit => Ok(Expr::Unit),
        Rule::ident => Ok(Expr::Ident(Variable::from(pair.as_str()))),
        Rule::expr => expr(pair),
        _ => Err(ConversionError::NoMatch),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use dir_test::{Fixture, dir_test};
    use rstest::rstest;

    use super::{ParseError, parse_expr, parse_program};
    use crate::language::{Callee, Control, Expr, Param, PrimOp, Program};

    pub(crate) fn parse_ocha(raw_path: &str) -> (&str, Program) {
        let path = std::path::Path::new(raw_path);
        let source = std::fs::read_to_string(path).unwrap();
        let program = parse_program(&source).unwrap_or_else(|err| {
            panic!(
                "could not parse program {:?}\n{err}",
                path.file_stem().unwrap()
            )
        });
        (path.file_stem().unwrap().to_str().unwrap(), program)
    }

    #[allow(clippy::needless_pass_by_value)]
    #[dir_test(dir: "$CARGO_MANIFEST_DIR/programs", glob: "**/*.ml", loader: crate::language::parse::tests::parse_ocha, postfix: "check_parse")]
    fn check_parse(fixture: Fixture<(&str, Program)>) {
        let (_name, _program) = fixture.content();
    }

    #[test]
    fn precedence() -> anyhow::Result<()> {
        let expr = parse_expr("5 + 6 / 3")?;
        assert_eq!(
            expr,
            Expr::binary(
                PrimOp::Add,
                Expr::number(5.0),
                Expr::binary(PrimOp::Div, Expr::number(6.0), Expr::number(3.0)),
            )
        );
        Ok(())
    }

    #[test]
    fn left_associative() -> anyhow::Result<()> {
        let expr = parse_expr("8 - 2 - 1")?;
        assert_eq!(
            expr,
            Expr::binary(
                PrimOp::Sub,
                Expr::binary(PrimOp::Sub, Expr::number(8.0), Expr::number(2.0)),
                Expr::number(1.0),
            )
        );
        Ok(())
    }

    #[test]
    fn application_binds_tighter_than_infix() -> anyhow::Result<()> {
        let expr = parse_expr("f 1 -2")?;
        assert_eq!(
            expr,
            Expr::binary(
                PrimOp::Sub,
                Expr::call("f", vec![Expr::number(1.0)]),
                Expr::number(2.0),
            )
        );
        assert_eq!(
            parse_expr("f (-2)")?,
            Expr::call("f", vec![Expr::number(-2.0)])
        );
        Ok(())
    }

    #[test]
    fn control_callees() -> anyhow::Result<()> {
        assert_eq!(
            parse_expr("reset (fun () -> 3)")?,
            Expr::reset(Expr::number(3.0))
        );
        assert_eq!(
            parse_expr("shift (fun k -> k 10)")?,
            Expr::shift("k", Expr::call("k", vec![Expr::number(10.0)]))
        );
        // A bare `reset` is just a name.
        assert_eq!(parse_expr("reset")?, Expr::ident("reset"));
        Ok(())
    }

    #[test]
    fn operator_sections() -> anyhow::Result<()> {
        assert_eq!(
            parse_expr("(+) 1 2")?,
            Expr::binary(PrimOp::Add, Expr::number(1.0), Expr::number(2.0))
        );
        assert_eq!(
            parse_expr("(-) 3")?,
            Expr::Apply {
                callee: Callee::Prim(PrimOp::Sub),
                args: vec![Expr::number(3.0)],
            }
        );
        assert!(matches!(parse_expr("(*)"), Err(ParseError::Conversion(_))));
        Ok(())
    }

    #[test]
    fn reset_keeps_trailing_arguments() -> anyhow::Result<()> {
        let Expr::Apply { callee, args } = parse_expr("reset (fun () -> fun s -> s) 3")? else {
            panic!("expected an application");
        };
        assert_eq!(callee, Callee::Control(Control::Reset));
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], Expr::number(3.0));
        Ok(())
    }

    #[test]
    fn let_desugars_to_application() -> anyhow::Result<()> {
        assert_eq!(
            parse_expr("let x = 1 in x + x")?,
            Expr::apply(
                Expr::lambda(
                    vec![Param::Var("x".into())],
                    Expr::binary(PrimOp::Add, Expr::ident("x"), Expr::ident("x")),
                ),
                vec![Expr::number(1.0)],
            )
        );
        Ok(())
    }

    #[test]
    fn sequence_desugars_to_wildcard() -> anyhow::Result<()> {
        assert_eq!(
            parse_expr("f (); 2")?,
            Expr::apply(
                Expr::lambda(vec![Param::Wildcard], Expr::number(2.0)),
                vec![Expr::call("f", vec![Expr::Unit])],
            )
        );
        Ok(())
    }

    #[test]
    fn program_with_definitions() -> anyhow::Result<()> {
        let program = parse_program(
            "(* a constant *)
             let f () = 10;;
             let add x y = x + y;;
             add (f ()) 1",
        )?;
        let names: Vec<_> = program.defs.iter().map(|def| def.name.0.as_str()).collect();
        assert_eq!(names, ["f", "add"]);
        assert_eq!(
            program.defs.iter().nth(1).map(|def| def.params.len()),
            Some(2)
        );
        Ok(())
    }

    #[rstest]
    #[case("let f x = x;; let f y = y;; f 1")]
    fn duplicate_definition(#[case] source: &str) {
        assert!(matches!(parse_program(source), Err(ParseError::Defs(_))));
    }

    #[rstest]
    #[case("fun -> 1")]
    #[case("1 +")]
    #[case("let x = 1")]
    #[case("(1")]
    fn syntax_errors(#[case] source: &str) {
        assert!(matches!(parse_expr(source), Err(ParseError::Syntax(_))));
    }
}
