//! Row functions produced by planning and handed to the runtime.
//!
//! Everything here is immutable after construction. A row-level evaluation
//! failure is logged and degrades the affected output (null column, rejected
//! row); it never unwinds into the runtime.

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use ssq_common::{PlannerConfig, Result, SsqError};
use ssq_planner::{field_index, AggExpr, AggregateExpression, Expr};
use tracing::warn;

use crate::expressions::{cast_value, compile_expr, CompiledExpression};
use crate::stream::{
    AggregateFn, Initializer, KeyMapper, RecordKey, RowPredicate, ValueJoinerFn, ValueMapper,
};
use crate::udf::FunctionRegistry;
use crate::value::{Row, Value};

/// Evaluates a projection list against each row.
#[derive(Debug)]
pub struct SelectValueMapper {
    names: Vec<String>,
    expressions: Vec<CompiledExpression>,
}

impl SelectValueMapper {
    pub fn new(names: Vec<String>, expressions: Vec<CompiledExpression>) -> Self {
        debug_assert_eq!(names.len(), expressions.len());
        Self { names, expressions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn expressions(&self) -> &[CompiledExpression] {
        &self.expressions
    }

    /// Project one row. A tombstone maps to a tombstone.
    pub fn apply(&self, row: Option<&Row>) -> Option<Row> {
        let row = row?;
        Some(
            self.names
                .iter()
                .zip(&self.expressions)
                .map(|(name, expr)| match expr.evaluate(row) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(column = %name, expression = %expr.expression(), error = %e,
                            "select expression failed; emitting null");
                        Value::Null
                    }
                })
                .collect(),
        )
    }

    pub fn into_mapper(self: Arc<Self>) -> ValueMapper {
        Arc::new(move |row: Option<&Row>| self.apply(row))
    }
}

/// Pseudo-columns exposed to predicates over windowed keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowBound {
    Start,
    End,
}

/// A compiled boolean filter.
#[derive(Debug)]
pub struct SqlPredicate {
    expr: CompiledExpression,
    window_columns: Vec<WindowBound>,
}

impl SqlPredicate {
    /// Compile `expr` as a filter over `schema`.
    ///
    /// With a windowed key the window start and end are resolvable under the
    /// configured pseudo-column names.
    pub fn compile(
        expr: &Expr,
        schema: &SchemaRef,
        windowed_key: bool,
        config: &PlannerConfig,
        functions: &dyn FunctionRegistry,
    ) -> Result<Self> {
        let mut window_columns = Vec::new();
        let compile_schema = if windowed_key {
            let mut fields = schema.fields().iter().cloned().collect::<Vec<_>>();
            for (bound, name) in [
                (WindowBound::Start, &config.window_start_column_name),
                (WindowBound::End, &config.window_end_column_name),
            ] {
                if field_index(schema, name).is_none() {
                    fields.push(Arc::new(Field::new(name, DataType::Int64, true)));
                    window_columns.push(bound);
                }
            }
            Arc::new(Schema::new(fields))
        } else {
            Arc::clone(schema)
        };

        let compiled = compile_expr(expr, &compile_schema, functions)
            .map_err(|e| e.with_context(&format!("Filter expression {expr}")))?;
        if compiled.data_type() != &DataType::Boolean {
            return Err(SsqError::TypeMismatch(format!(
                "Filter expression {expr} has type {:?}, expected BOOLEAN",
                compiled.data_type()
            )));
        }
        Ok(Self {
            expr: compiled,
            window_columns,
        })
    }

    pub fn expression(&self) -> &CompiledExpression {
        &self.expr
    }

    /// Whether the record passes. Tombstones, null results and evaluation
    /// failures do not.
    pub fn test(&self, key: &RecordKey, row: Option<&Row>) -> bool {
        let Some(row) = row else {
            return false;
        };
        let result = if self.window_columns.is_empty() {
            self.expr.evaluate(row)
        } else {
            let mut extended = row.clone();
            for bound in &self.window_columns {
                extended.push(match (key.window(), bound) {
                    (Some(w), WindowBound::Start) => Value::Int64(w.start_ms),
                    (Some(w), WindowBound::End) => Value::Int64(w.end_ms),
                    (None, _) => Value::Null,
                });
            }
            self.expr.evaluate(&extended)
        };
        match result {
            Ok(v) => v.as_bool() == Some(true),
            Err(e) => {
                warn!(expression = %self.expr.expression(), error = %e,
                    "filter expression failed; dropping row");
                false
            }
        }
    }

    pub fn into_predicate(self: Arc<Self>) -> RowPredicate {
        Arc::new(move |key: &RecordKey, row: Option<&Row>| self.test(key, row))
    }
}

/// Concatenates left and right values, padding a missing side with nulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueJoiner {
    left_width: usize,
    right_width: usize,
}

impl ValueJoiner {
    pub fn new(left: &Schema, right: &Schema) -> Self {
        Self {
            left_width: left.fields().len(),
            right_width: right.fields().len(),
        }
    }

    pub fn join(&self, left: Option<&Row>, right: Option<&Row>) -> Row {
        let mut columns = Vec::with_capacity(self.left_width + self.right_width);
        for (side, width) in [(left, self.left_width), (right, self.right_width)] {
            match side {
                Some(row) => columns.extend(row.columns().iter().cloned()),
                None => columns.extend(std::iter::repeat(Value::Null).take(width)),
            }
        }
        Row::new(columns)
    }

    pub fn into_joiner(self) -> ValueJoinerFn {
        Arc::new(move |left: Option<&Row>, right: Option<&Row>| self.join(left, right))
    }
}

/// Separator between the per-expression parts of a composite group-by key.
pub const GROUP_BY_KEY_DELIMITER: &str = "|+|";

/// Computes composite group-by keys.
#[derive(Debug)]
pub struct GroupByMapper {
    expressions: Vec<CompiledExpression>,
}

impl GroupByMapper {
    pub fn new(expressions: Vec<CompiledExpression>) -> Self {
        Self { expressions }
    }

    /// Synthetic key name for a grouping list. Equal lists give equal names.
    pub fn key_name_for(expressions: &[Expr]) -> String {
        expressions
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(GROUP_BY_KEY_DELIMITER)
    }

    /// The composite key of one row.
    pub fn key_for(&self, row: &Row) -> Value {
        let parts = self
            .expressions
            .iter()
            .map(|expr| match expr.evaluate(row) {
                Ok(v) => v.to_string(),
                Err(e) => {
                    warn!(expression = %expr.expression(), error = %e,
                        "group by expression failed; using null key part");
                    Value::Null.to_string()
                }
            })
            .collect::<Vec<_>>();
        Value::Utf8(parts.join(GROUP_BY_KEY_DELIMITER))
    }

    pub fn into_key_mapper(self: Arc<Self>) -> KeyMapper {
        Arc::new(move |row: &Row| self.key_for(row))
    }
}

/// Row functions of a rekey: which rows survive, their new key and the
/// optional rewrite of the row-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RekeyMapper {
    key_index: usize,
    rowkey_index: Option<usize>,
}

impl RekeyMapper {
    pub fn new(key_index: usize, rowkey_index: Option<usize>) -> Self {
        Self {
            key_index,
            rowkey_index,
        }
    }

    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// Rows without a value or without a key value are dropped.
    pub fn accepts(&self, row: Option<&Row>) -> bool {
        row.is_some_and(|r| !r.get(self.key_index).is_null())
    }

    /// New key: the key column in string form.
    pub fn key_for(&self, row: &Row) -> Value {
        Value::Utf8(row.get(self.key_index).to_string())
    }

    /// Copy the new key into the row-key column when configured to.
    pub fn update(&self, row: Option<&Row>) -> Option<Row> {
        let mut row = row?.clone();
        if let Some(i) = self.rowkey_index {
            let key = self.key_for(&row);
            row.set(i, key);
        }
        Some(row)
    }

    pub fn filter_fn(self) -> RowPredicate {
        Arc::new(move |_: &RecordKey, row: Option<&Row>| self.accepts(row))
    }

    pub fn key_mapper(self) -> KeyMapper {
        Arc::new(move |row: &Row| self.key_for(row))
    }

    pub fn value_mapper(self) -> ValueMapper {
        Arc::new(move |row: Option<&Row>| self.update(row))
    }
}

/// Removes row-key columns from values written to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkValueMapper {
    rowkey_indexes: BTreeSet<usize>,
}

impl SinkValueMapper {
    pub fn new(rowkey_indexes: BTreeSet<usize>) -> Self {
        Self { rowkey_indexes }
    }

    pub fn apply(&self, row: Option<&Row>) -> Option<Row> {
        let row = row?;
        Some(
            row.columns()
                .iter()
                .enumerate()
                .filter(|(i, _)| !self.rowkey_indexes.contains(i))
                .map(|(_, v)| v.clone())
                .collect(),
        )
    }

    pub fn into_mapper(self) -> ValueMapper {
        Arc::new(move |row: Option<&Row>| self.apply(row))
    }
}

#[derive(Debug)]
struct AggregateCall {
    agg: AggExpr,
    arg: Option<CompiledExpression>,
    data_type: DataType,
}

/// Where the key column of an aggregate row comes from.
#[derive(Debug, Clone, PartialEq)]
struct KeyColumn {
    /// Input column holding the key value, when the grouping key is a column.
    index: Option<usize>,
    data_type: DataType,
}

/// Initializer and fold for a list of aggregate calls.
///
/// Aggregate rows are laid out as `[key, agg_0, agg_1, ...]`.
#[derive(Debug)]
pub struct Aggregator {
    names: Vec<String>,
    calls: Vec<AggregateCall>,
    key: Option<KeyColumn>,
}

impl Aggregator {
    /// Compile aggregate arguments against the grouped input schema.
    pub fn compile(
        aggregates: &[AggregateExpression],
        schema: &SchemaRef,
        functions: &dyn FunctionRegistry,
    ) -> Result<Self> {
        let mut names = Vec::with_capacity(aggregates.len());
        let mut calls = Vec::with_capacity(aggregates.len());
        for a in aggregates {
            let arg = match &a.agg {
                AggExpr::CountStar => None,
                AggExpr::Count(e) | AggExpr::Sum(e) | AggExpr::Min(e) | AggExpr::Max(e) => Some(
                    compile_expr(e, schema, functions)
                        .map_err(|err| err.with_context(&format!("Aggregate {}", a.agg)))?,
                ),
            };
            let data_type = match (&a.agg, &arg) {
                (AggExpr::Sum(_), Some(arg)) => match arg.data_type() {
                    DataType::Int32 | DataType::Int64 => DataType::Int64,
                    DataType::Float64 => DataType::Float64,
                    other => {
                        return Err(SsqError::TypeResolution(format!(
                            "Aggregate {}: SUM requires a numeric argument, got {other:?}",
                            a.agg
                        )))
                    }
                },
                (AggExpr::Min(_) | AggExpr::Max(_), Some(arg)) => arg.data_type().clone(),
                _ => DataType::Int64,
            };
            names.push(a.name.clone());
            calls.push(AggregateCall {
                agg: a.agg.clone(),
                arg,
                data_type,
            });
        }
        Ok(Self {
            names,
            calls,
            key: None,
        })
    }

    /// Type the key column of aggregate rows as `data_type`.
    ///
    /// Record keys arrive in string form after a rekey, so the key column is
    /// read from input column `index` when given and cast from the record key
    /// otherwise.
    pub fn with_key_column(mut self, index: Option<usize>, data_type: DataType) -> Self {
        self.key = Some(KeyColumn { index, data_type });
        self
    }

    fn key_value(&self, key: &Value, row: &Row) -> Value {
        let Some(column) = &self.key else {
            return key.clone();
        };
        if let Some(v) = column.index.map(|i| row.get(i)) {
            if v.data_type() == column.data_type {
                return v.clone();
            }
        }
        cast_value(key.clone(), &column.data_type).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "aggregate key does not fit its column type");
            Value::Null
        })
    }

    /// Output fields of the aggregate columns, after the key column.
    pub fn output_fields(&self) -> Vec<Field> {
        self.names
            .iter()
            .zip(&self.calls)
            .map(|(name, call)| Field::new(name, call.data_type.clone(), true))
            .collect()
    }

    pub fn initial(&self) -> Row {
        let mut row = Row::nulls(1 + self.calls.len());
        for (i, call) in self.calls.iter().enumerate() {
            if matches!(call.agg, AggExpr::CountStar | AggExpr::Count(_)) {
                row.set(i + 1, Value::Int64(0));
            }
        }
        row
    }

    /// Fold `row` into `aggregate` for the group `key`.
    pub fn fold(&self, key: &Value, row: &Row, mut aggregate: Row) -> Row {
        aggregate.set(0, self.key_value(key, row));
        for (i, call) in self.calls.iter().enumerate() {
            let slot = i + 1;
            let input = match &call.arg {
                None => Value::Boolean(true),
                Some(arg) => match arg.evaluate(row) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(aggregate = %call.agg, error = %e,
                            "aggregate argument failed; skipping row for this call");
                        continue;
                    }
                },
            };
            if input.is_null() {
                continue;
            }
            let current = aggregate.get(slot).clone();
            let next = match &call.agg {
                AggExpr::CountStar | AggExpr::Count(_) => {
                    Value::Int64(current.as_i64().unwrap_or(0).saturating_add(1))
                }
                AggExpr::Sum(_) => match add(&current, &input, &call.data_type) {
                    Some(v) => v,
                    None => {
                        warn!(aggregate = %call.agg, "SUM overflow; keeping previous value");
                        current
                    }
                },
                AggExpr::Min(_) => pick(current, input, std::cmp::Ordering::Less),
                AggExpr::Max(_) => pick(current, input, std::cmp::Ordering::Greater),
            };
            aggregate.set(slot, next);
        }
        aggregate
    }

    pub fn initializer(self: &Arc<Self>) -> Initializer {
        let this = Arc::clone(self);
        Arc::new(move || this.initial())
    }

    pub fn aggregate_fn(self: &Arc<Self>) -> AggregateFn {
        let this = Arc::clone(self);
        Arc::new(move |key: &Value, row: &Row, aggregate: Row| this.fold(key, row, aggregate))
    }
}

fn add(current: &Value, input: &Value, out: &DataType) -> Option<Value> {
    match out {
        DataType::Float64 => {
            Some(Value::Float64(current.as_f64().unwrap_or(0.0) + input.as_f64()?))
        }
        _ => current
            .as_i64()
            .unwrap_or(0)
            .checked_add(input.as_i64()?)
            .map(Value::Int64),
    }
}

fn pick(current: Value, input: Value, wanted: std::cmp::Ordering) -> Value {
    if current.is_null() || input.compare(&current) == Some(wanted) {
        input
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use arrow_schema::{DataType, Field, Schema, SchemaRef};
    use ssq_common::{PlannerConfig, SsqError};
    use ssq_planner::*;

    use super::*;
    use crate::expressions::compile_exprs;
    use crate::stream::TimeWindow;
    use crate::udf::InMemoryFunctionRegistry;

    fn orders() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("ROWKEY", DataType::Utf8, true),
            Field::new("ORDERID", DataType::Int32, true),
            Field::new("AMOUNT", DataType::Float64, true),
        ]))
    }

    fn order(key: &str, id: i32, amount: f64) -> Row {
        Row::new(vec![key.into(), id.into(), amount.into()])
    }

    fn plain(key: &str) -> RecordKey {
        RecordKey::Plain(Value::from(key))
    }

    #[test]
    fn select_mapper_propagates_tombstones_and_nulls_failed_columns() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let exprs = vec![
            col("ORDERID"),
            binary(col("ORDERID"), BinaryOp::Divide, lit_i32(0)),
        ];
        let compiled = compile_exprs(exprs.iter(), "Select", &orders(), &functions).unwrap();
        let mapper = SelectValueMapper::new(vec!["ID".into(), "BAD".into()], compiled);

        assert_eq!(mapper.apply(None), None);
        assert_eq!(
            mapper.apply(Some(&order("k", 3, 1.0))),
            Some(Row::new(vec![Value::Int32(3), Value::Null]))
        );
    }

    #[test]
    fn predicate_must_be_boolean() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let err = SqlPredicate::compile(
            &col("AMOUNT"),
            &orders(),
            false,
            &PlannerConfig::default(),
            &functions,
        )
        .expect_err("non-boolean filter");
        assert!(matches!(err, SsqError::TypeMismatch(_)), "{err}");
    }

    #[test]
    fn predicate_rejects_tombstones_and_unknown_results() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let p = SqlPredicate::compile(
            &binary(col("AMOUNT"), BinaryOp::Gt, lit_i32(10)),
            &orders(),
            false,
            &PlannerConfig::default(),
            &functions,
        )
        .unwrap();
        assert!(p.test(&plain("k"), Some(&order("k", 1, 11.0))));
        assert!(!p.test(&plain("k"), Some(&order("k", 1, 9.0))));
        assert!(!p.test(&plain("k"), None));
        let null_amount = Row::new(vec!["k".into(), 1.into(), Value::Null]);
        assert!(!p.test(&plain("k"), Some(&null_amount)));
    }

    #[test]
    fn window_pseudo_columns_resolve_only_for_windowed_keys() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let config = PlannerConfig::default();
        let expr = binary(col("WINDOWSTART"), BinaryOp::GtEq, lit_i64(1000));

        let err = SqlPredicate::compile(&expr, &orders(), false, &config, &functions)
            .expect_err("no window columns on plain keys");
        assert!(matches!(err, SsqError::TypeResolution(_)), "{err}");

        let p = SqlPredicate::compile(&expr, &orders(), true, &config, &functions).unwrap();
        let early = RecordKey::Windowed {
            key: Value::from("k"),
            window: TimeWindow::new(0, 500),
        };
        let late = RecordKey::Windowed {
            key: Value::from("k"),
            window: TimeWindow::new(1000, 2000),
        };
        let row = order("k", 1, 1.0);
        assert!(!p.test(&early, Some(&row)));
        assert!(p.test(&late, Some(&row)));
    }

    #[test]
    fn joiner_pads_missing_side_with_nulls() {
        let left = Schema::new(vec![
            Field::new("A", DataType::Int32, true),
            Field::new("B", DataType::Int32, true),
        ]);
        let right = Schema::new(vec![
            Field::new("C", DataType::Int32, true),
            Field::new("D", DataType::Int32, true),
            Field::new("E", DataType::Int32, true),
        ]);
        let joiner = ValueJoiner::new(&left, &right);
        let l = Row::new(vec![1.into(), 2.into()]);
        let r = Row::new(vec![3.into(), 4.into(), 5.into()]);

        let merged = joiner.join(Some(&l), None);
        assert_eq!(merged.len(), 5);
        assert_eq!(&merged.columns()[..2], l.columns());
        assert!(merged.columns()[2..].iter().all(Value::is_null));

        let mirrored = joiner.join(None, Some(&r));
        assert!(mirrored.columns()[..2].iter().all(Value::is_null));
        assert_eq!(&mirrored.columns()[2..], r.columns());
    }

    #[test]
    fn group_by_keys_and_names_are_deterministic() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let exprs = vec![col("ORDERID"), col("AMOUNT")];
        assert_eq!(GroupByMapper::key_name_for(&exprs), "ORDERID|+|AMOUNT");
        assert_eq!(
            GroupByMapper::key_name_for(&exprs),
            GroupByMapper::key_name_for(&exprs.clone())
        );
        assert_ne!(
            GroupByMapper::key_name_for(&[col("ORDERID")]),
            GroupByMapper::key_name_for(&[col("AMOUNT")])
        );

        let compiled = compile_exprs(exprs.iter(), "Group By", &orders(), &functions).unwrap();
        let mapper = GroupByMapper::new(compiled);
        assert_eq!(mapper.key_for(&order("k", 7, 2.5)), Value::from("7|+|2.5"));
        let partial = Row::new(vec!["k".into(), 7.into(), Value::Null]);
        assert_eq!(mapper.key_for(&partial), Value::from("7|+|null"));
    }

    #[test]
    fn rekey_drops_null_keys_and_rewrites_rowkey() {
        let rekey = RekeyMapper::new(1, Some(0));
        let row = order("old", 42, 1.0);
        assert!(rekey.accepts(Some(&row)));
        assert!(!rekey.accepts(None));
        assert!(!rekey.accepts(Some(&Row::new(vec!["k".into(), Value::Null, 1.0.into()]))));
        assert_eq!(rekey.key_for(&row), Value::from("42"));
        assert_eq!(rekey.update(Some(&row)).unwrap().get(0), &Value::from("42"));
        assert_eq!(
            RekeyMapper::new(1, None).update(Some(&row)).unwrap().get(0),
            &Value::from("old")
        );
    }

    #[test]
    fn sink_mapper_strips_rowkey_columns() {
        let mapper = SinkValueMapper::new(BTreeSet::from([0]));
        assert_eq!(
            mapper.apply(Some(&order("k", 1, 2.0))),
            Some(Row::new(vec![1.into(), 2.0.into()]))
        );
        assert_eq!(mapper.apply(None), None);
    }

    #[test]
    fn aggregator_folds_counts_sums_and_extremes() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let aggs = vec![
            AggregateExpression::new("CNT", AggExpr::CountStar),
            AggregateExpression::new("TOTAL", AggExpr::Sum(col("AMOUNT"))),
            AggregateExpression::new("MAXID", AggExpr::Max(col("ORDERID"))),
            AggregateExpression::new("IDS", AggExpr::Sum(col("ORDERID"))),
        ];
        let agg = Aggregator::compile(&aggs, &orders(), &functions).unwrap();
        let types = agg
            .output_fields()
            .iter()
            .map(|f| f.data_type().clone())
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![DataType::Int64, DataType::Float64, DataType::Int32, DataType::Int64]
        );

        let key = Value::from("g");
        let mut acc = agg.initial();
        assert_eq!(acc.get(1), &Value::Int64(0));
        for (id, amount) in [(3, 1.5), (9, 2.0), (4, 0.5)] {
            acc = agg.fold(&key, &order("k", id, amount), acc);
        }
        assert_eq!(
            acc.into_columns(),
            vec![
                Value::from("g"),
                Value::Int64(3),
                Value::Float64(4.0),
                Value::Int32(9),
                Value::Int64(16)
            ]
        );
    }

    #[test]
    fn aggregator_types_the_key_column() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let aggs = vec![AggregateExpression::new("CNT", AggExpr::CountStar)];

        let by_column = Aggregator::compile(&aggs, &orders(), &functions)
            .unwrap()
            .with_key_column(Some(1), DataType::Int32);
        let acc = by_column.fold(&Value::from("42"), &order("k", 42, 1.0), by_column.initial());
        assert_eq!(acc.get(0), &Value::Int32(42));

        let by_cast = Aggregator::compile(&aggs, &orders(), &functions)
            .unwrap()
            .with_key_column(None, DataType::Int64);
        let acc = by_cast.fold(&Value::from("7"), &order("k", 1, 1.0), by_cast.initial());
        assert_eq!(acc.get(0), &Value::Int64(7));

        let acc = by_cast.fold(&Value::from("x"), &order("k", 1, 1.0), by_cast.initial());
        assert_eq!(acc.get(0), &Value::Null);
        assert_eq!(acc.get(1), &Value::Int64(1));
    }

    #[test]
    fn aggregator_rejects_non_numeric_sum() {
        let functions = InMemoryFunctionRegistry::with_builtins();
        let aggs = vec![AggregateExpression::new("S", AggExpr::Sum(col("ROWKEY")))];
        let err = Aggregator::compile(&aggs, &orders(), &functions).expect_err("string sum");
        assert!(matches!(err, SsqError::TypeResolution(_)), "{err}");
    }
}
