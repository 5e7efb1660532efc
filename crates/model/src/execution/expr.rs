use crate::core::error::ExprError;
use pest::{
    Parser,
    iterators::{Pair, Pairs},
};
use pest_derive::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[grammar = "execution/math.pest"]
pub struct MathParser;

/// Arithmetic over field names and numeric literals, as used by the
/// `math_expression` aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MathExpr {
    Number(f64),
    Field(String),
    Binary {
        left: Box<MathExpr>,
        op: BinaryOp,
        right: Box<MathExpr>,
    },
    Negate(Box<MathExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathExpr {
    pub fn parse(input: &str) -> Result<MathExpr, ExprError> {
        if input.trim().is_empty() {
            return Err(ExprError::Empty);
        }

        let mut pairs = MathParser::parse(Rule::expression, input)
            .map_err(|e| ExprError::from_pest_error(input, e))?;

        let expression = next_pair(&mut pairs)?;
        let sum = next_pair(&mut expression.into_inner())?;
        build_sum(sum)
    }

    /// Field names referenced by the expression, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn binary(left: MathExpr, op: BinaryOp, right: MathExpr) -> MathExpr {
        MathExpr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            MathExpr::Number(_) => {}
            MathExpr::Field(name) => out.push(name),
            MathExpr::Binary { left, right, .. } => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            MathExpr::Negate(inner) => inner.collect_fields(out),
        }
    }
}

fn next_pair<'a>(pairs: &mut Pairs<'a, Rule>) -> Result<Pair<'a, Rule>, ExprError> {
    pairs.next().ok_or(ExprError::UnexpectedEnd)
}

// sum := product (add_op product)*, folded left to right
fn build_sum(pair: Pair<Rule>) -> Result<MathExpr, ExprError> {
    let mut inner = pair.into_inner();
    let mut left = build_product(next_pair(&mut inner)?)?;

    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => BinaryOp::Add,
            _ => BinaryOp::Subtract,
        };
        let right = build_product(next_pair(&mut inner)?)?;
        left = MathExpr::binary(left, op, right);
    }

    Ok(left)
}

fn build_product(pair: Pair<Rule>) -> Result<MathExpr, ExprError> {
    let mut inner = pair.into_inner();
    let mut left = build_unary(next_pair(&mut inner)?)?;

    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "*" => BinaryOp::Multiply,
            _ => BinaryOp::Divide,
        };
        let right = build_unary(next_pair(&mut inner)?)?;
        left = MathExpr::binary(left, op, right);
    }

    Ok(left)
}

fn build_unary(pair: Pair<Rule>) -> Result<MathExpr, ExprError> {
    let mut negations = 0;
    let mut operand = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::sign if inner.as_str() == "-" => negations += 1,
            Rule::sign => {}
            _ => operand = Some(build_primary(inner)?),
        }
    }

    let mut expr = operand.ok_or(ExprError::UnexpectedEnd)?;
    for _ in 0..negations {
        expr = MathExpr::Negate(Box::new(expr));
    }
    Ok(expr)
}

fn build_primary(pair: Pair<Rule>) -> Result<MathExpr, ExprError> {
    match pair.as_rule() {
        Rule::number => Ok(match pair.as_str().parse::<f64>() {
            Ok(n) => MathExpr::Number(n),
            Err(_) => MathExpr::Field(pair.as_str().to_string()),
        }),
        Rule::ident => Ok(MathExpr::Field(pair.as_str().to_string())),
        Rule::sum => build_sum(pair),
        other => {
            let (line, column) = pair.line_col();
            Err(ExprError::Syntax {
                line,
                column,
                message: format!("unexpected {other:?}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_precedence_and_parens() {
        let expr = MathExpr::parse("(合同金额 - 已回款) * 0.5 + 1").unwrap();
        assert_eq!(expr.fields(), vec!["合同金额", "已回款"]);

        match expr {
            MathExpr::Binary {
                op: BinaryOp::Add, ..
            } => {}
            other => panic!("unexpected root: {other:?}"),
        }
    }

    #[test]
    fn unary_minus() {
        assert_eq!(
            MathExpr::parse("-a").unwrap(),
            MathExpr::Negate(Box::new(MathExpr::Field("a".into())))
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(MathExpr::parse(""), Err(ExprError::Empty));
        assert_eq!(MathExpr::parse("(a + b"), Err(ExprError::UnbalancedParens));
        assert_eq!(MathExpr::parse("a + "), Err(ExprError::UnexpectedEnd));
        assert_eq!(MathExpr::parse("a % b"), Err(ExprError::InvalidCharacter('%')));
        assert!(matches!(
            MathExpr::parse("a b"),
            Err(ExprError::Syntax { line: 1, column: 3, .. })
        ));
    }

    #[test]
    fn folds_left_to_right_within_a_precedence_level() {
        let expected = MathExpr::binary(
            MathExpr::binary(
                MathExpr::Field("a".into()),
                BinaryOp::Subtract,
                MathExpr::Field("b".into()),
            ),
            BinaryOp::Subtract,
            MathExpr::Field("c".into()),
        );
        assert_eq!(MathExpr::parse("a - b - c").unwrap(), expected);
    }

    #[test]
    fn numbers_and_field_names_share_characters() {
        assert_eq!(MathExpr::parse(".5").unwrap(), MathExpr::Number(0.5));
        assert_eq!(MathExpr::parse("2e3").unwrap(), MathExpr::Number(2000.0));
        assert_eq!(
            MathExpr::parse("2024年金额").unwrap(),
            MathExpr::Field("2024年金额".into())
        );
        assert_eq!(
            MathExpr::parse("--a").unwrap(),
            MathExpr::Negate(Box::new(MathExpr::Negate(Box::new(MathExpr::Field(
                "a".into()
            )))))
        );
    }
}
