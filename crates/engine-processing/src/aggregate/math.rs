use model::{
    core::value::Value,
    execution::expr::{BinaryOp, MathExpr},
    records::row::Row,
};

/// Evaluates `expr`, reading fields through `lookup`. Division by zero
/// yields `None` rather than an infinite value.
pub fn evaluate<F>(expr: &MathExpr, lookup: &F) -> Option<f64>
where
    F: Fn(&str) -> f64,
{
    let result = match expr {
        MathExpr::Number(n) => *n,
        MathExpr::Field(name) => lookup(name),
        MathExpr::Negate(inner) => -evaluate(inner, lookup)?,
        MathExpr::Binary { left, op, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            match op {
                BinaryOp::Add => l + r,
                BinaryOp::Subtract => l - r,
                BinaryOp::Multiply => l * r,
                BinaryOp::Divide if r == 0.0 => return None,
                BinaryOp::Divide => l / r,
            }
        }
    };
    result.is_finite().then_some(result)
}

/// Evaluates against a row; missing, blank and non-numeric fields count as 0.
pub fn evaluate_row(expr: &MathExpr, row: &Row) -> Option<f64> {
    evaluate(expr, &|name| {
        row.value(name).and_then(Value::as_number).unwrap_or(0.0)
    })
}

/// Rounds away binary floating-point noise such as `0.30000000000000004`.
pub fn tidy(n: f64) -> f64 {
    const SCALE: f64 = 1e10;
    let rounded = (n * SCALE).round() / SCALE;
    if rounded.is_finite() { rounded } else { n }
}
