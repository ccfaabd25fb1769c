//! Expression compilation and evaluation for row operators.
//!
//! Input contract:
//! - expressions reference columns of one fixed input schema by (optionally
//!   qualified) name;
//! - functions are resolved through a [`FunctionRegistry`].
//!
//! Output contract:
//! - every name, function and operand type is resolved at compile time;
//!   implicit numeric widenings become explicit casts in the evaluator tree;
//! - evaluation is a pure function of one row.

mod cast;

use std::fmt;
use std::sync::Arc;

use arrow_schema::{DataType, SchemaRef};
use ssq_common::{Result, SsqError};
use ssq_planner::{resolve_column, BinaryOp, Expr, LiteralValue};

use crate::udf::{FunctionRegistry, ScalarFunction};
use crate::value::{Row, Value};

pub use cast::{can_cast, cast_value, parse_time_literal};

/// Executable expression node.
///
/// Implementations capture no mutable state, so a compiled tree can be shared
/// across runtime threads.
pub trait PhysicalExpr: Send + Sync {
    /// Static output data type of this expression.
    fn data_type(&self) -> DataType;
    /// Evaluate the expression against one row.
    fn evaluate(&self, row: &Row) -> Result<Value>;
}

/// An expression compiled against a fixed input schema.
///
/// Built once at plan-construction time and reused for every row. A schema
/// change requires compiling again.
#[derive(Clone)]
pub struct CompiledExpression {
    expr: Expr,
    input_schema: SchemaRef,
    data_type: DataType,
    evaluator: Arc<dyn PhysicalExpr>,
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("expr", &self.expr.to_string())
            .field("data_type", &self.data_type)
            .finish()
    }
}

impl CompiledExpression {
    /// Source expression.
    pub fn expression(&self) -> &Expr {
        &self.expr
    }

    /// Schema the expression was compiled against.
    pub fn input_schema(&self) -> &SchemaRef {
        &self.input_schema
    }

    /// Resolved output type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn evaluate(&self, row: &Row) -> Result<Value> {
        self.evaluator.evaluate(row)
    }
}

/// Compile one expression against `input_schema`.
pub fn compile_expr(
    expr: &Expr,
    input_schema: &SchemaRef,
    functions: &dyn FunctionRegistry,
) -> Result<CompiledExpression> {
    let evaluator = build(expr, input_schema, functions)?;
    Ok(CompiledExpression {
        expr: expr.clone(),
        input_schema: Arc::clone(input_schema),
        data_type: evaluator.data_type(),
        evaluator,
    })
}

/// Compile an ordered list of expressions against one schema.
///
/// `context` names the operator (`Select`, `Group By`, ...) and is prefixed to
/// any error together with the offending expression.
pub fn compile_exprs<'a, I>(
    exprs: I,
    context: &str,
    input_schema: &SchemaRef,
    functions: &dyn FunctionRegistry,
) -> Result<Vec<CompiledExpression>>
where
    I: IntoIterator<Item = &'a Expr>,
{
    exprs
        .into_iter()
        .map(|e| {
            compile_expr(e, input_schema, functions)
                .map_err(|err| err.with_context(&format!("{context} expression {e}")))
        })
        .collect()
}

fn build(
    expr: &Expr,
    schema: &SchemaRef,
    functions: &dyn FunctionRegistry,
) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        Expr::Column(c) => {
            let index = resolve_column(schema, c)?;
            let dt = schema.field(index).data_type().clone();
            Ok(Arc::new(ColumnExpr { index, dt }))
        }

        Expr::Literal(v) => {
            let value = literal_value(v)?;
            let dt = match v {
                LiteralValue::Null => DataType::Null,
                _ => value.data_type(),
            };
            Ok(Arc::new(LiteralExpr { value, dt }))
        }

        Expr::Cast { expr, to_type } => {
            let inner = build(expr, schema, functions)?;
            let from = inner.data_type();
            if !can_cast(&from, to_type) {
                return Err(SsqError::TypeResolution(format!(
                    "cannot cast {from:?} to {to_type:?}"
                )));
            }
            Ok(cast_if_needed(inner, to_type))
        }

        Expr::And(a, b) | Expr::Or(a, b) => {
            let left = build_boolean(a, schema, functions, "AND/OR")?;
            let right = build_boolean(b, schema, functions, "AND/OR")?;
            let op = if matches!(expr, Expr::And(..)) {
                BoolOp::And
            } else {
                BoolOp::Or
            };
            Ok(Arc::new(BoolBinaryExpr { left, right, op }))
        }

        Expr::Not(e) => {
            let inner = build_boolean(e, schema, functions, "NOT")?;
            Ok(Arc::new(NotExpr { inner }))
        }

        Expr::IsNull(e) => Ok(Arc::new(IsNullExpr {
            inner: build(e, schema, functions)?,
            negated: false,
        })),
        Expr::IsNotNull(e) => Ok(Arc::new(IsNullExpr {
            inner: build(e, schema, functions)?,
            negated: true,
        })),

        Expr::CaseWhen {
            branches,
            else_expr,
        } => {
            if branches.is_empty() {
                return Err(SsqError::TypeResolution(
                    "CASE requires at least one WHEN/THEN branch".to_string(),
                ));
            }
            let mut conds = Vec::with_capacity(branches.len());
            let mut results = Vec::with_capacity(branches.len());
            for (cond, result) in branches {
                conds.push(build_boolean(cond, schema, functions, "CASE WHEN")?);
                results.push(build(result, schema, functions)?);
            }
            let otherwise = match else_expr {
                Some(e) => Some(build(e, schema, functions)?),
                None => None,
            };
            let mut types = results.iter().map(|r| r.data_type()).collect::<Vec<_>>();
            if let Some(o) = &otherwise {
                types.push(o.data_type());
            }
            let out = common_super_type(&types)?;
            Ok(Arc::new(CaseExpr {
                branches: conds
                    .into_iter()
                    .zip(results.into_iter().map(|r| cast_if_needed(r, &out)))
                    .collect(),
                otherwise: otherwise.map(|o| cast_if_needed(o, &out)),
                out,
            }))
        }

        Expr::BinaryOp { left, op, right } => {
            let l = build(left, schema, functions)?;
            let r = build(right, schema, functions)?;
            let (ldt, rdt) = (l.data_type(), r.data_type());
            if op.is_comparison() {
                let target = comparison_type(*op, &ldt, &rdt)?;
                Ok(Arc::new(CompareExpr {
                    left: cast_if_needed(l, &target),
                    right: cast_if_needed(r, &target),
                    op: *op,
                }))
            } else {
                let out = arithmetic_type(*op, &ldt, &rdt)?;
                Ok(Arc::new(ArithExpr {
                    left: cast_if_needed(l, &out),
                    right: cast_if_needed(r, &out),
                    op: *op,
                    out,
                }))
            }
        }

        Expr::Function { name, args } => {
            let compiled_args = args
                .iter()
                .map(|a| build(a, schema, functions))
                .collect::<Result<Vec<_>>>()?;
            let arg_types = compiled_args
                .iter()
                .map(|a| a.data_type())
                .collect::<Vec<_>>();
            let (func, out) = functions.resolve(name, &arg_types)?;
            Ok(Arc::new(FunctionExpr {
                func,
                args: compiled_args,
                out,
            }))
        }
    }
}

fn build_boolean(
    expr: &Expr,
    schema: &SchemaRef,
    functions: &dyn FunctionRegistry,
    what: &str,
) -> Result<Arc<dyn PhysicalExpr>> {
    let compiled = build(expr, schema, functions)?;
    match compiled.data_type() {
        DataType::Boolean => Ok(compiled),
        DataType::Null => Ok(cast_if_needed(compiled, &DataType::Boolean)),
        other => Err(SsqError::TypeResolution(format!(
            "{what} requires boolean operands, got {other:?} for {expr}"
        ))),
    }
}

fn literal_value(v: &LiteralValue) -> Result<Value> {
    Ok(match v {
        LiteralValue::Int32(x) => Value::Int32(*x),
        LiteralValue::Int64(x) => Value::Int64(*x),
        LiteralValue::Float64(x) => Value::Float64(*x),
        LiteralValue::Utf8(s) => Value::Utf8(s.clone()),
        LiteralValue::Boolean(b) => Value::Boolean(*b),
        LiteralValue::Time(s) => Value::Time(parse_time_literal(s)?),
        LiteralValue::Null => Value::Null,
    })
}

// -------------------------
// Type inference
// -------------------------

fn numeric_rank(dt: &DataType) -> Option<u8> {
    Some(match dt {
        DataType::Int32 => 1,
        DataType::Int64 => 2,
        DataType::Float64 => 3,
        _ => return None,
    })
}

fn is_numeric(dt: &DataType) -> bool {
    numeric_rank(dt).is_some()
}

fn wider_numeric(a: &DataType, b: &DataType) -> Option<DataType> {
    let ra = numeric_rank(a)?;
    let rb = numeric_rank(b)?;
    Some(if ra >= rb { a.clone() } else { b.clone() })
}

fn comparison_type(op: BinaryOp, l: &DataType, r: &DataType) -> Result<DataType> {
    if *l == DataType::Null {
        return Ok(r.clone());
    }
    if *r == DataType::Null || l == r {
        if *l == DataType::Boolean && !matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
            return Err(SsqError::TypeResolution(
                "ordering comparisons are not defined for BOOLEAN".to_string(),
            ));
        }
        return Ok(l.clone());
    }
    wider_numeric(l, r).ok_or_else(|| {
        SsqError::TypeResolution(format!("cannot compare types {l:?} and {r:?}"))
    })
}

fn arithmetic_type(op: BinaryOp, l: &DataType, r: &DataType) -> Result<DataType> {
    let out = match (l, r) {
        (DataType::Null, DataType::Null) => Some(DataType::Int32),
        (DataType::Null, other) | (other, DataType::Null) if is_numeric(other) => {
            Some(other.clone())
        }
        _ => wider_numeric(l, r),
    };
    out.ok_or_else(|| {
        SsqError::TypeResolution(format!(
            "arithmetic {op:?} requires numeric operands, got {l:?} and {r:?}"
        ))
    })
}

fn common_super_type(types: &[DataType]) -> Result<DataType> {
    let mut target: Option<DataType> = None;
    for dt in types {
        if *dt == DataType::Null {
            continue;
        }
        target = Some(match target {
            None => dt.clone(),
            Some(t) if t == *dt => t,
            Some(t) => wider_numeric(&t, dt).ok_or_else(|| {
                SsqError::TypeResolution(format!(
                    "CASE branch type mismatch: cannot unify {t:?} and {dt:?}"
                ))
            })?,
        });
    }
    Ok(target.unwrap_or(DataType::Null))
}

fn cast_if_needed(inner: Arc<dyn PhysicalExpr>, to: &DataType) -> Arc<dyn PhysicalExpr> {
    if inner.data_type() == *to || *to == DataType::Null {
        inner
    } else {
        Arc::new(CastExpr {
            inner,
            to_type: to.clone(),
        })
    }
}

// =====================
// Evaluator nodes
// =====================

struct ColumnExpr {
    index: usize,
    dt: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        Ok(row.get(self.index).clone())
    }
}

struct LiteralExpr {
    value: Value,
    dt: DataType,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, _row: &Row) -> Result<Value> {
        Ok(self.value.clone())
    }
}

struct CastExpr {
    inner: Arc<dyn PhysicalExpr>,
    to_type: DataType,
}

impl PhysicalExpr for CastExpr {
    fn data_type(&self) -> DataType {
        self.to_type.clone()
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        cast_value(self.inner.evaluate(row)?, &self.to_type)
    }
}

struct NotExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for NotExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        Ok(match self.inner.evaluate(row)? {
            Value::Boolean(b) => Value::Boolean(!b),
            _ => Value::Null,
        })
    }
}

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

/// Kleene AND/OR: null only when the known operands do not decide the result.
struct BoolBinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BoolOp,
}

impl PhysicalExpr for BoolBinaryExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        let l = self.left.evaluate(row)?.as_bool();
        let short_circuit = match self.op {
            BoolOp::And => Some(false),
            BoolOp::Or => Some(true),
        };
        if l == short_circuit {
            return Ok(Value::Boolean(l == Some(true)));
        }
        let r = self.right.evaluate(row)?.as_bool();
        if r == short_circuit {
            return Ok(Value::Boolean(r == Some(true)));
        }
        Ok(match (l, r) {
            (Some(a), Some(b)) => Value::Boolean(match self.op {
                BoolOp::And => a && b,
                BoolOp::Or => a || b,
            }),
            _ => Value::Null,
        })
    }
}

struct IsNullExpr {
    inner: Arc<dyn PhysicalExpr>,
    negated: bool,
}

impl PhysicalExpr for IsNullExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        let is_null = self.inner.evaluate(row)?.is_null();
        Ok(Value::Boolean(is_null != self.negated))
    }
}

struct CaseExpr {
    branches: Vec<(Arc<dyn PhysicalExpr>, Arc<dyn PhysicalExpr>)>,
    otherwise: Option<Arc<dyn PhysicalExpr>>,
    out: DataType,
}

impl PhysicalExpr for CaseExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        for (cond, result) in &self.branches {
            if cond.evaluate(row)?.as_bool() == Some(true) {
                return result.evaluate(row);
            }
        }
        match &self.otherwise {
            Some(e) => e.evaluate(row),
            None => Ok(Value::Null),
        }
    }
}

struct CompareExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BinaryOp,
}

impl PhysicalExpr for CompareExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        let l = self.left.evaluate(row)?;
        let r = self.right.evaluate(row)?;
        let Some(ord) = l.compare(&r) else {
            return Ok(Value::Null);
        };
        let passed = match self.op {
            BinaryOp::Eq => ord.is_eq(),
            BinaryOp::NotEq => ord.is_ne(),
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::LtEq => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            BinaryOp::GtEq => ord.is_ge(),
            op => return Err(misplaced(op)),
        };
        Ok(Value::Boolean(passed))
    }
}

struct ArithExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BinaryOp,
    out: DataType,
}

impl PhysicalExpr for ArithExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        let l = self.left.evaluate(row)?;
        let r = self.right.evaluate(row)?;
        match (l, r) {
            (Value::Int32(a), Value::Int32(b)) => {
                int_arith(self.op, i64::from(a), i64::from(b)).and_then(|v| {
                    i32::try_from(v)
                        .map(Value::Int32)
                        .map_err(|_| SsqError::Execution("integer overflow".to_string()))
                })
            }
            (Value::Int64(a), Value::Int64(b)) => int_arith(self.op, a, b).map(Value::Int64),
            (Value::Float64(a), Value::Float64(b)) => Ok(Value::Float64(match self.op {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                op => return Err(misplaced(op)),
            })),
            _ => Ok(Value::Null),
        }
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<i64> {
    let res = match op {
        BinaryOp::Plus => a.checked_add(b),
        BinaryOp::Minus => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
            return Err(SsqError::Execution("division by zero".to_string()));
        }
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulo => a.checked_rem(b),
        op => return Err(misplaced(op)),
    };
    res.ok_or_else(|| SsqError::Execution("integer overflow".to_string()))
}

fn misplaced(op: BinaryOp) -> SsqError {
    SsqError::Execution(format!("operator {op:?} cannot be evaluated here"))
}

struct FunctionExpr {
    func: Arc<dyn ScalarFunction>,
    args: Vec<Arc<dyn PhysicalExpr>>,
    out: DataType,
}

impl PhysicalExpr for FunctionExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, row: &Row) -> Result<Value> {
        let values = self
            .args
            .iter()
            .map(|arg| arg.evaluate(row))
            .collect::<Result<Vec<_>>>()?;
        self.func.invoke(&values).map_err(|e| {
            SsqError::Execution(format!("function '{}' failed: {e}", self.func.name()))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema, SchemaRef};
    use ssq_common::SsqError;
    use ssq_planner::*;

    use super::{compile_expr, compile_exprs};
    use crate::udf::InMemoryFunctionRegistry;
    use crate::value::{Row, Value};

    fn orders() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("ROWKEY", DataType::Utf8, true),
            Field::new("ORDERID", DataType::Int32, true),
            Field::new("AMOUNT", DataType::Float64, true),
            Field::new("ITEM", DataType::Utf8, true),
        ]))
    }

    fn row(key: &str, id: i32, amount: f64, item: Option<&str>) -> Row {
        Row::new(vec![
            key.into(),
            id.into(),
            amount.into(),
            item.map(Value::from).unwrap_or(Value::Null),
        ])
    }

    fn eval(expr: Expr, r: &Row) -> Value {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let compiled = compile_expr(&expr, &orders(), &functions).expect("compile");
        compiled.evaluate(r).expect("evaluate")
    }

    #[test]
    fn arithmetic_widens_int_to_double() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let e = binary(col("ORDERID"), BinaryOp::Plus, col("AMOUNT"));
        let compiled = compile_expr(&e, &orders(), &functions).expect("compile");
        assert_eq!(compiled.data_type(), &DataType::Float64);
        assert_eq!(
            compiled.evaluate(&row("k", 2, 0.5, None)).unwrap(),
            Value::Float64(2.5)
        );
    }

    #[test]
    fn comparisons_are_null_aware() {
        let r = row("k", 7, 10.0, None);
        assert_eq!(
            eval(binary(col("ORDERID"), BinaryOp::GtEq, lit_i64(7)), &r),
            Value::Boolean(true)
        );
        assert_eq!(
            eval(binary(col("ITEM"), BinaryOp::Eq, lit_str("x")), &r),
            Value::Null
        );
        assert_eq!(
            eval(Expr::IsNull(Box::new(col("ITEM"))), &r),
            Value::Boolean(true)
        );
    }

    #[test]
    fn kleene_logic_short_circuits() {
        let r = row("k", 1, 1.0, None);
        let unknown = binary(col("ITEM"), BinaryOp::Eq, lit_str("x"));
        let and = Expr::And(Box::new(unknown.clone()), Box::new(lit_bool(false)));
        assert_eq!(eval(and, &r), Value::Boolean(false));
        let or = Expr::Or(Box::new(unknown.clone()), Box::new(lit_bool(true)));
        assert_eq!(eval(or, &r), Value::Boolean(true));
        let and_true = Expr::And(Box::new(unknown), Box::new(lit_bool(true)));
        assert_eq!(eval(and_true, &r), Value::Null);
    }

    #[test]
    fn case_and_functions_evaluate_per_row() {
        let e = Expr::CaseWhen {
            branches: vec![(
                binary(col("AMOUNT"), BinaryOp::Gt, lit_i32(100)),
                call("ucase", vec![col("ITEM")]),
            )],
            else_expr: Some(Box::new(lit_str("small"))),
        };
        assert_eq!(eval(e.clone(), &row("k", 1, 150.0, Some("tv"))), Value::from("TV"));
        assert_eq!(eval(e, &row("k", 1, 5.0, Some("pen"))), Value::from("small"));
    }

    #[test]
    fn qualified_reference_resolves_against_plain_schema() {
        let r = row("k", 42, 1.0, None);
        assert_eq!(eval(qualified_col("O", "ORDERID"), &r), Value::Int32(42));
    }

    #[test]
    fn time_literals_compile_to_millis_of_day() {
        let r = row("k", 1, 1.0, None);
        assert_eq!(
            eval(Expr::Literal(LiteralValue::Time("01:00:00.5".into())), &r),
            Value::Time(3_600_500)
        );
        let functions = InMemoryFunctionRegistry::with_builtins();
        let err = compile_expr(
            &Expr::Literal(LiteralValue::Time("25:00".into())),
            &orders(),
            &functions,
        )
        .expect_err("bad time");
        assert!(matches!(err, SsqError::TypeResolution(_)), "{err}");
    }

    #[test]
    fn unresolved_names_fail_at_compile_time_with_context() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let exprs = vec![col("ORDERID"), col("ORDERIDD")];
        let err = compile_exprs(exprs.iter(), "Select", &orders(), &functions)
            .expect_err("unknown column");
        let msg = err.to_string();
        assert!(matches!(err, SsqError::TypeResolution(_)));
        assert!(msg.contains("Select expression ORDERIDD"), "{msg}");
        assert!(msg.contains("unknown column 'ORDERIDD'"), "{msg}");

        let err = compile_expr(&call("nope", vec![]), &orders(), &functions)
            .expect_err("unknown function");
        assert!(err.to_string().contains("unknown function 'nope'"), "{err}");

        let err = compile_expr(
            &binary(col("ITEM"), BinaryOp::Multiply, lit_i32(2)),
            &orders(),
            &functions,
        )
        .expect_err("string arithmetic");
        assert!(err.to_string().contains("requires numeric operands"), "{err}");
    }

    #[test]
    fn integer_division_by_zero_is_a_row_error() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let e = binary(col("ORDERID"), BinaryOp::Divide, lit_i32(0));
        let compiled = compile_expr(&e, &orders(), &functions).expect("compile");
        let err = compiled
            .evaluate(&row("k", 1, 1.0, None))
            .expect_err("division by zero");
        assert!(matches!(err, SsqError::Execution(_)));
    }
}
