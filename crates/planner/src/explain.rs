use std::fmt;

use crate::logical_plan::{AggExpr, BinaryOp, Expr, JoinKind, LiteralValue};
use crate::schema::sql_type_name;

/// Render an expression as SQL-like text.
///
/// The rendering is stable: structurally equal expressions render
/// identically, which synthetic key naming relies on.
pub fn fmt_expr(e: &Expr) -> String {
    match e {
        Expr::Column(c) => c.full_name(),
        Expr::Literal(v) => fmt_literal(v),
        Expr::BinaryOp { left, op, right } => {
            format!("({} {} {})", fmt_expr(left), fmt_op(*op), fmt_expr(right))
        }
        Expr::Cast { expr, to_type } => {
            format!("CAST({} AS {})", fmt_expr(expr), sql_type_name(to_type))
        }
        Expr::And(a, b) => format!("({} AND {})", fmt_expr(a), fmt_expr(b)),
        Expr::Or(a, b) => format!("({} OR {})", fmt_expr(a), fmt_expr(b)),
        Expr::Not(x) => format!("(NOT {})", fmt_expr(x)),
        Expr::IsNull(x) => format!("({} IS NULL)", fmt_expr(x)),
        Expr::IsNotNull(x) => format!("({} IS NOT NULL)", fmt_expr(x)),
        Expr::CaseWhen {
            branches,
            else_expr,
        } => {
            let mut s = "(CASE".to_string();
            for (cond, result) in branches {
                s.push_str(&format!(" WHEN {} THEN {}", fmt_expr(cond), fmt_expr(result)));
            }
            if let Some(e) = else_expr {
                s.push_str(&format!(" ELSE {}", fmt_expr(e)));
            }
            s.push_str(" END)");
            s
        }
        Expr::Function { name, args } => format!(
            "{}({})",
            name.to_ascii_uppercase(),
            args.iter().map(fmt_expr).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn fmt_literal(v: &LiteralValue) -> String {
    match v {
        LiteralValue::Int32(x) => x.to_string(),
        LiteralValue::Int64(x) => x.to_string(),
        LiteralValue::Float64(x) => format!("{x:?}"),
        LiteralValue::Utf8(s) => format!("'{}'", s.replace('\'', "''")),
        LiteralValue::Boolean(b) => b.to_string(),
        LiteralValue::Time(s) => format!("TIME '{s}'"),
        LiteralValue::Null => "NULL".to_string(),
    }
}

fn fmt_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::Plus => "+",
        BinaryOp::Minus => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fmt_expr(self))
    }
}

impl fmt::Display for AggExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggExpr::CountStar => write!(f, "COUNT(*)"),
            AggExpr::Count(e) => write!(f, "COUNT({e})"),
            AggExpr::Sum(e) => write!(f, "SUM({e})"),
            AggExpr::Min(e) => write!(f, "MIN({e})"),
            AggExpr::Max(e) => write!(f, "MAX({e})"),
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Outer => "OUTER",
        })
    }
}

#[cfg(test)]
mod tests {
    use arrow_schema::DataType;

    use crate::logical_plan::*;

    #[test]
    fn renders_nested_expressions() {
        let e = Expr::And(
            Box::new(binary(col("AMOUNT"), BinaryOp::Gt, lit_f64(10.0))),
            Box::new(Expr::IsNotNull(Box::new(qualified_col("O", "ITEM")))),
        );
        assert_eq!(e.to_string(), "((AMOUNT > 10.0) AND (O.ITEM IS NOT NULL))");

        let c = Expr::Cast {
            expr: Box::new(call("ucase", vec![lit_str("it's")])),
            to_type: DataType::Int64,
        };
        assert_eq!(c.to_string(), "CAST(UCASE('it''s') AS BIGINT)");
    }

    #[test]
    fn renders_case_and_aggregates() {
        let e = Expr::CaseWhen {
            branches: vec![(binary(col("A"), BinaryOp::Lt, lit_i32(0)), lit_str("neg"))],
            else_expr: Some(Box::new(lit_str("pos"))),
        };
        assert_eq!(e.to_string(), "(CASE WHEN (A < 0) THEN 'neg' ELSE 'pos' END)");
        assert_eq!(AggExpr::Sum(col("AMOUNT")).to_string(), "SUM(AMOUNT)");
        assert_eq!(AggExpr::CountStar.to_string(), "COUNT(*)");
    }
}
