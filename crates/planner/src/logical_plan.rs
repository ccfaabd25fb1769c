//! Inputs the logical-plan layer hands to physical lowering: scalar
//! expressions, select items, aggregate calls, join kinds and window bounds.

use std::time::Duration;

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};

/// Reference to a column, optionally qualified by a source alias (`O.ORDERID`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// `QUALIFIER.NAME`, or just `NAME` when unqualified.
    pub fn full_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(LiteralValue),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        to_type: DataType,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    /// Searched CASE: first branch whose condition is true wins.
    CaseWhen {
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    /// Scalar function call resolved through the function registry.
    Function { name: String, args: Vec<Expr> },
}

impl Expr {
    /// The column this expression refers to, if it is a bare column reference.
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    /// `TIME 'HH:MM:SS[.fff]'`, validated when compiled.
    Time(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

/// One projected output column: `expr AS name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectExpression {
    pub name: String,
    pub expr: Expr,
}

impl SelectExpression {
    pub fn new(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggExpr {
    /// `COUNT(*)`
    CountStar,
    Count(Expr),
    Sum(Expr),
    Min(Expr),
    Max(Expr),
}

/// One aggregate output column: `agg AS name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpression {
    pub name: String,
    pub agg: AggExpr,
}

impl AggregateExpression {
    pub fn new(name: impl Into<String>, agg: AggExpr) -> Self {
        Self {
            name: name.into(),
            agg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Outer,
}

/// Time bound of a stream-stream join: a right event joins a left event when
/// its timestamp lies in `[left - before, left + after]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinWindow {
    pub before: Duration,
    pub after: Duration,
}

impl JoinWindow {
    /// Symmetric window (`WITHIN n`).
    pub fn of(size: Duration) -> Self {
        Self {
            before: size,
            after: size,
        }
    }

    /// Asymmetric window (`WITHIN (before, after)`).
    pub fn new(before: Duration, after: Duration) -> Self {
        Self { before, after }
    }
}

/// Builds an unqualified column-reference expression.
pub fn col(name: &str) -> Expr {
    Expr::Column(ColumnRef::new(name))
}

/// Builds a qualified column-reference expression (`qualifier.name`).
pub fn qualified_col(qualifier: &str, name: &str) -> Expr {
    Expr::Column(ColumnRef::qualified(qualifier, name))
}

/// Builds an `Int32` literal expression.
pub fn lit_i32(v: i32) -> Expr {
    Expr::Literal(LiteralValue::Int32(v))
}

/// Builds an `Int64` literal expression.
pub fn lit_i64(v: i64) -> Expr {
    Expr::Literal(LiteralValue::Int64(v))
}

/// Builds a `Float64` literal expression.
pub fn lit_f64(v: f64) -> Expr {
    Expr::Literal(LiteralValue::Float64(v))
}

/// Builds a string literal expression.
pub fn lit_str(v: &str) -> Expr {
    Expr::Literal(LiteralValue::Utf8(v.to_string()))
}

/// Builds a boolean literal expression.
pub fn lit_bool(v: bool) -> Expr {
    Expr::Literal(LiteralValue::Boolean(v))
}

/// Builds a binary expression.
pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Builds a function call expression.
pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Function {
        name: name.to_string(),
        args,
    }
}
