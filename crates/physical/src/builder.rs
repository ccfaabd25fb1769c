//! Lowering entry points: one build call per logical operation.
//!
//! Input contract:
//! - upstream nodes were produced by the same builder;
//! - expressions refer to columns of the upstream node's schema.
//!
//! Output contract:
//! - every name, function and type is resolved before a node is returned, so
//!   a built plan cannot fail on unresolved references while running;
//! - node schemas and key fields follow the propagation rules of each
//!   operator;
//! - a failed build leaves no node behind.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use ssq_common::{NodeId, PlannerConfig, Result, SsqError};
use ssq_execution::{
    compile_exprs, Aggregator, FunctionRegistry, GroupByMapper, Grouped, JoinSerdes, RecordKey,
    RekeyMapper, Row, SelectValueMapper, SinkTopic, SinkValueMapper, SqlPredicate, StreamRuntime,
    ValueJoiner,
};
use ssq_planner::{
    ensure_unique_field_names, field_index, resolve_column, schema_definition_string,
    split_alias, AggregateExpression, ColumnRef, Expr, JoinKind, JoinWindow, KeyField,
    KeyFormat, SelectExpression,
};
use tracing::{debug, info, trace};

use crate::explain::ExecutionPlan;
use crate::grouped::GroupedStream;
use crate::node::{DataflowHandle, PlanNode, PlanOp};
use crate::sink::{SinkAttachment, SinkAttachments, SinkRequest};

/// Parameters of a join supplied by the surrounding planner.
#[derive(Debug, Clone)]
pub struct JoinSpec<S> {
    pub kind: JoinKind,
    /// Left fields followed by right fields.
    pub schema: SchemaRef,
    /// Resolved from the equi-join condition by the caller.
    pub key_field: Option<KeyField>,
    /// Required for stream-stream joins, rejected for stream-table joins.
    pub window: Option<JoinWindow>,
    pub serdes: JoinSerdes<S>,
}

/// Builds physical plan nodes on top of a [`StreamRuntime`].
pub struct PhysicalPlanBuilder<R: StreamRuntime> {
    runtime: R,
    config: PlannerConfig,
    functions: Arc<dyn FunctionRegistry>,
    next_id: u64,
    sinks: SinkAttachments<R::Serde>,
}

impl<R: StreamRuntime> PhysicalPlanBuilder<R> {
    pub fn new(
        runtime: R,
        config: PlannerConfig,
        functions: Arc<dyn FunctionRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runtime,
            config,
            functions,
            next_id: 0,
            sinks: SinkAttachments::default(),
        })
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn sinks(&self) -> &SinkAttachments<R::Serde> {
        &self.sinks
    }

    pub fn sink(&self, node: NodeId) -> Option<&SinkAttachment<R::Serde>> {
        self.sinks.get(node)
    }

    /// Plan dump of `node`, including attached sinks.
    pub fn execution_plan<'a>(&'a self, node: &'a PlanNode<R>) -> ExecutionPlan<'a, R> {
        node.execution_plan("").with_sinks(&self.sinks)
    }

    /// A stream read from `topic`.
    pub fn source_stream(
        &mut self,
        topic: &str,
        schema: SchemaRef,
        key_field: Option<KeyField>,
        key_format: KeyFormat,
    ) -> Result<Arc<PlanNode<R>>> {
        validate_source(&schema, key_field.as_ref())?;
        let stream = self.runtime.stream_source(topic, &schema)?;
        Ok(self.finish(
            schema,
            key_field,
            key_format,
            PlanOp::Source {
                topic: topic.to_string(),
            },
            DataflowHandle::Stream(stream),
        ))
    }

    /// A table materialized from `topic`.
    pub fn source_table(
        &mut self,
        topic: &str,
        schema: SchemaRef,
        key_field: Option<KeyField>,
        key_format: KeyFormat,
    ) -> Result<Arc<PlanNode<R>>> {
        validate_source(&schema, key_field.as_ref())?;
        let table = self.runtime.table_source(topic, &schema)?;
        Ok(self.finish(
            schema,
            key_field,
            key_format,
            PlanOp::Source {
                topic: topic.to_string(),
            },
            DataflowHandle::Table(table),
        ))
    }

    /// Project `items` over every row of `input`.
    ///
    /// The output key is the input key relocated to the first item that is a
    /// bare reference to it. When no item references the key, the output is
    /// unkeyed. A synthetic input key is carried over as is.
    pub fn select(
        &mut self,
        input: &Arc<PlanNode<R>>,
        items: &[SelectExpression],
    ) -> Result<Arc<PlanNode<R>>> {
        let compiled = compile_exprs(
            items.iter().map(|i| &i.expr),
            "Select",
            input.schema(),
            self.functions.as_ref(),
        )?;
        let fields = items
            .iter()
            .zip(&compiled)
            .map(|(item, expr)| Field::new(&item.name, expr.data_type().clone(), true))
            .collect::<Vec<_>>();
        ensure_unique_field_names(&fields).map_err(|e| e.with_context("Select"))?;
        let schema = Arc::new(Schema::new(fields));
        let key_field = project_key_field(input.key_field(), items);

        let names = items.iter().map(|i| i.name.clone()).collect();
        let mapper = Arc::new(SelectValueMapper::new(names, compiled));
        let handle = match input.handle() {
            DataflowHandle::Stream(s) => {
                DataflowHandle::Stream(self.runtime.map_values(s, Arc::clone(&mapper).into_mapper()))
            }
            DataflowHandle::Table(t) => DataflowHandle::Table(
                self.runtime
                    .map_table_values(t, Arc::clone(&mapper).into_mapper()),
            ),
        };
        Ok(self.finish(
            schema,
            key_field,
            input.key_format(),
            PlanOp::Project {
                input: Arc::clone(input),
                mapper,
            },
            handle,
        ))
    }

    /// Keep the rows of `input` for which `predicate` is true.
    pub fn filter(
        &mut self,
        input: &Arc<PlanNode<R>>,
        predicate: &Expr,
    ) -> Result<Arc<PlanNode<R>>> {
        let predicate = Arc::new(SqlPredicate::compile(
            predicate,
            input.schema(),
            input.key_format().is_windowed(),
            &self.config,
            self.functions.as_ref(),
        )?);
        let handle = match input.handle() {
            DataflowHandle::Stream(s) => {
                DataflowHandle::Stream(self.runtime.filter(s, Arc::clone(&predicate).into_predicate()))
            }
            DataflowHandle::Table(t) => DataflowHandle::Table(
                self.runtime
                    .filter_table(t, Arc::clone(&predicate).into_predicate()),
            ),
        };
        Ok(self.finish(
            Arc::clone(input.schema()),
            input.key_field().cloned(),
            input.key_format(),
            PlanOp::Filter {
                input: Arc::clone(input),
                predicate,
            },
            handle,
        ))
    }

    /// Repartition `input` on the column named by `key`.
    ///
    /// Returns `input` itself when it is already keyed by that name. With
    /// `update_rowkey` the configured row-key column is overwritten with the
    /// new key.
    pub fn select_key(
        &mut self,
        input: &Arc<PlanNode<R>>,
        key: &KeyField,
        update_rowkey: bool,
    ) -> Result<Arc<PlanNode<R>>> {
        if input.key_field().is_some_and(|k| k.name == key.name) {
            trace!(node = %input.id(), key = %key.name, "already keyed; rekey skipped");
            return Ok(Arc::clone(input));
        }
        let stream = input.handle().as_stream().ok_or_else(|| {
            SsqError::UnsupportedShape(format!("cannot rekey table {}", input.id()))
        })?;

        let schema = input.schema();
        let index = resolve_key_column(schema, &key.name)?;
        let rowkey_index = if update_rowkey {
            Some(
                field_index(schema, &self.config.key_column_name).ok_or_else(|| {
                    SsqError::KeyResolution(format!(
                        "row key column '{}' is not in schema {}",
                        self.config.key_column_name,
                        schema_definition_string(schema)
                    ))
                })?,
            )
        } else {
            None
        };

        let rekey = RekeyMapper::new(index, rowkey_index);
        let filtered = self.runtime.filter(stream, rekey.filter_fn());
        let mut keyed = self.runtime.select_key(&filtered, rekey.key_mapper());
        if rowkey_index.is_some() {
            keyed = self.runtime.map_values(&keyed, rekey.value_mapper());
        }

        let field = schema.field(index);
        let key_field = match key.index {
            Some(_) => KeyField::new(field.name().clone(), index, field.data_type().clone()),
            None => KeyField::synthetic(field.name().clone(), field.data_type().clone()),
        };
        Ok(self.finish(
            Arc::clone(schema),
            Some(key_field),
            KeyFormat::Plain,
            PlanOp::Rekey {
                input: Arc::clone(input),
                rekey,
            },
            DataflowHandle::Stream(keyed),
        ))
    }

    /// Join a stream with a table or, given a window, with another stream.
    pub fn join(
        &mut self,
        left: &Arc<PlanNode<R>>,
        right: &Arc<PlanNode<R>>,
        spec: JoinSpec<R::Serde>,
    ) -> Result<Arc<PlanNode<R>>> {
        let left_stream = left.handle().as_stream().ok_or_else(|| {
            SsqError::UnsupportedShape(format!(
                "left input {} of a join must be a stream",
                left.id()
            ))
        })?;
        validate_join_schema(&spec.schema, left.schema(), right.schema())?;
        let key_field = spec.key_field.ok_or_else(|| {
            SsqError::KeyResolution("join requires a key field".to_string())
        })?;
        if key_field
            .index
            .is_some_and(|i| i >= spec.schema.fields().len())
        {
            return Err(SsqError::KeyResolution(format!(
                "join key {key_field} is outside schema {}",
                schema_definition_string(&spec.schema)
            )));
        }

        let joiner = ValueJoiner::new(left.schema(), right.schema());
        let stream = match right.handle() {
            DataflowHandle::Table(table) => {
                if spec.window.is_some() {
                    return Err(SsqError::UnsupportedShape(
                        "stream-table join does not take a window".to_string(),
                    ));
                }
                if spec.kind == JoinKind::Outer {
                    return Err(SsqError::UnsupportedShape(
                        "OUTER join is not supported between a stream and a table".to_string(),
                    ));
                }
                self.runtime.stream_table_join(
                    left_stream,
                    table,
                    spec.kind,
                    joiner.into_joiner(),
                    spec.serdes,
                )
            }
            DataflowHandle::Stream(right_stream) => {
                let window = spec.window.ok_or_else(|| {
                    SsqError::UnsupportedShape("stream-stream join requires a window".to_string())
                })?;
                self.runtime.stream_stream_join(
                    left_stream,
                    right_stream,
                    spec.kind,
                    window,
                    joiner.into_joiner(),
                    spec.serdes,
                )
            }
        };
        Ok(self.finish(
            spec.schema,
            Some(key_field),
            left.key_format(),
            PlanOp::Join {
                left: Arc::clone(left),
                right: Arc::clone(right),
                kind: spec.kind,
                window: spec.window,
                joiner,
            },
            DataflowHandle::Stream(stream),
        ))
    }

    /// Group `input` for aggregation, repartitioning only when the current
    /// key cannot serve as the grouping key.
    pub fn group_by(
        &mut self,
        input: &Arc<PlanNode<R>>,
        group_by: &[Expr],
        value_serde: R::Serde,
    ) -> Result<GroupedStream<R>> {
        if group_by.is_empty() {
            return Err(SsqError::UnsupportedShape(
                "GROUP BY requires at least one expression".to_string(),
            ));
        }
        let stream = input.handle().as_stream().ok_or_else(|| {
            SsqError::UnsupportedShape(format!("cannot group table {}", input.id()))
        })?;

        if let Some(key) = input.key_field().filter(|k| !rekey_required(k, group_by)) {
            trace!(node = %input.id(), key = %key, "grouping on existing key");
            let handle = self.runtime.group_by_key(
                stream,
                Grouped {
                    key_format: input.key_format(),
                    value_serde,
                },
            );
            return Ok(GroupedStream {
                source: Arc::clone(input),
                key_field: key.clone(),
                key_format: input.key_format(),
                key_mapper: None,
                handle,
            });
        }

        let compiled = compile_exprs(
            group_by,
            "Group By",
            input.schema(),
            self.functions.as_ref(),
        )?;
        let mapper = Arc::new(GroupByMapper::new(compiled));
        let key_name = GroupByMapper::key_name_for(group_by);
        trace!(node = %input.id(), key = %key_name, "grouping requires repartition");

        let non_null = self.runtime.filter(
            stream,
            Arc::new(|_: &RecordKey, row: Option<&Row>| row.is_some()),
        );
        let handle = self.runtime.group_by(
            &non_null,
            Arc::clone(&mapper).into_key_mapper(),
            Grouped {
                key_format: KeyFormat::Plain,
                value_serde,
            },
        );
        Ok(GroupedStream {
            source: Arc::clone(input),
            key_field: KeyField::synthetic(key_name, DataType::Utf8),
            key_format: KeyFormat::Plain,
            key_mapper: Some(mapper),
            handle,
        })
    }

    /// Aggregate a grouped stream into a table of `[key, aggregates...]`.
    pub fn aggregate(
        &mut self,
        grouped: &GroupedStream<R>,
        aggregates: &[AggregateExpression],
    ) -> Result<Arc<PlanNode<R>>> {
        let key = &grouped.key_field;
        let aggregator = Arc::new(
            Aggregator::compile(aggregates, grouped.source.schema(), self.functions.as_ref())?
                .with_key_column(key.index, key.data_type.clone()),
        );
        let mut fields = vec![Field::new(&key.name, key.data_type.clone(), true)];
        fields.extend(aggregator.output_fields());
        ensure_unique_field_names(&fields).map_err(|e| e.with_context("Aggregate"))?;

        let table = self.runtime.aggregate(
            &grouped.handle,
            aggregator.initializer(),
            aggregator.aggregate_fn(),
        );
        Ok(self.finish(
            Arc::new(Schema::new(fields)),
            Some(KeyField::new(key.name.clone(), 0, key.data_type.clone())),
            grouped.key_format,
            PlanOp::Aggregate {
                input: Arc::clone(&grouped.source),
                group_key: grouped.key_mapper.clone(),
                aggregator,
            },
            DataflowHandle::Table(table),
        ))
    }

    /// The changelog of a table as a stream.
    pub fn to_stream(&mut self, input: &Arc<PlanNode<R>>) -> Result<Arc<PlanNode<R>>> {
        let table = input.handle().as_table().ok_or_else(|| {
            SsqError::UnsupportedShape(format!("{} is already a stream", input.id()))
        })?;
        let stream = self.runtime.table_to_stream(table);
        Ok(self.finish(
            Arc::clone(input.schema()),
            input.key_field().cloned(),
            input.key_format(),
            PlanOp::ToStream {
                input: Arc::clone(input),
            },
            DataflowHandle::Stream(stream),
        ))
    }

    /// Write `input` to a topic, leaving out the requested row-key columns.
    pub fn into_sink(
        &mut self,
        input: &Arc<PlanNode<R>>,
        request: SinkRequest<R::Serde>,
    ) -> Result<&SinkAttachment<R::Serde>> {
        if let Some(existing) = self.sinks.get(input.id()) {
            return Err(SsqError::UnsupportedShape(format!(
                "{} already writes to sink '{}'",
                input.id(),
                existing.topic()
            )));
        }
        let width = input.schema().fields().len();
        if let Some(bad) = request.rowkey_indexes.iter().find(|i| **i >= width) {
            return Err(SsqError::KeyResolution(format!(
                "row key index {bad} is outside schema {}",
                schema_definition_string(input.schema())
            )));
        }
        let schema = Arc::new(Schema::new(
            input
                .schema()
                .fields()
                .iter()
                .enumerate()
                .filter(|(i, _)| !request.rowkey_indexes.contains(i))
                .map(|(_, f)| Arc::clone(f))
                .collect::<Vec<_>>(),
        ));

        let mapper = SinkValueMapper::new(request.rowkey_indexes.clone()).into_mapper();
        let values = match input.handle() {
            DataflowHandle::Stream(s) => self.runtime.map_values(s, mapper),
            DataflowHandle::Table(t) => {
                let changelog = self.runtime.table_to_stream(t);
                self.runtime.map_values(&changelog, mapper)
            }
        };
        let partitions = request.partitions.unwrap_or(self.config.sink_partitions);
        let replicas = request.replicas.unwrap_or(self.config.sink_replicas);
        self.runtime.to_sink(
            &values,
            SinkTopic {
                name: request.topic.clone(),
                value_serde: request.value_serde.clone(),
                partitions,
                replicas,
            },
        )?;
        info!(node = %input.id(), topic = %request.topic, partitions, replicas, "attached sink");

        self.sinks.insert(SinkAttachment {
            node: input.id(),
            topic: request.topic,
            value_serde: request.value_serde,
            rowkey_indexes: request.rowkey_indexes,
            partitions,
            replicas,
            schema,
        })
    }

    fn finish(
        &mut self,
        schema: SchemaRef,
        key_field: Option<KeyField>,
        key_format: KeyFormat,
        op: PlanOp<R>,
        handle: DataflowHandle<R>,
    ) -> Arc<PlanNode<R>> {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let node = PlanNode {
            id,
            schema,
            key_field,
            key_format,
            op,
            handle,
        };
        debug!(
            node = %id,
            kind = %node.kind(),
            key = ?node.key_field().map(|k| k.to_string()),
            schema = %schema_definition_string(node.schema()),
            "built plan node"
        );
        Arc::new(node)
    }
}

fn validate_source(schema: &Schema, key_field: Option<&KeyField>) -> Result<()> {
    ensure_unique_field_names(schema.fields().iter().map(|f| f.as_ref()))?;
    let Some(key) = key_field else {
        return Ok(());
    };
    let Some(index) = key.index else {
        return Ok(());
    };
    match schema.fields().get(index) {
        Some(f) if f.name() == &key.name && f.data_type() == &key.data_type => Ok(()),
        _ => Err(SsqError::KeyResolution(format!(
            "key field {key} does not match schema {}",
            schema_definition_string(schema)
        ))),
    }
}

/// Output key of a projection.
fn project_key_field(key: Option<&KeyField>, items: &[SelectExpression]) -> Option<KeyField> {
    let key = key?;
    if key.is_synthetic() {
        return Some(key.clone());
    }
    items.iter().enumerate().find_map(|(i, item)| {
        let column = item.expr.as_column()?;
        key.matches_column(column)
            .then(|| key.relocated(key.name.clone(), i))
    })
}

/// A single grouping expression that is a reference to the key column can
/// reuse the existing partitioning.
fn rekey_required(key: &KeyField, group_by: &[Expr]) -> bool {
    match group_by {
        [only] => only
            .as_column()
            .map_or(true, |c| c.name != key.unaliased_name()),
        _ => true,
    }
}

fn resolve_key_column(schema: &Schema, name: &str) -> Result<usize> {
    let column = match split_alias(name) {
        (Some(alias), rest) => ColumnRef::qualified(alias, rest),
        (None, rest) => ColumnRef::new(rest),
    };
    resolve_column(schema, &column).map_err(|e| {
        SsqError::KeyResolution(format!(
            "key column '{name}' cannot be resolved in {}: {e}",
            schema_definition_string(schema)
        ))
    })
}

fn validate_join_schema(joined: &Schema, left: &Schema, right: &Schema) -> Result<()> {
    let expected = left.fields().iter().chain(right.fields().iter());
    let matches = joined.fields().len() == left.fields().len() + right.fields().len()
        && joined.fields().iter().zip(expected).all(|(j, e)| {
            j.name() == e.name() && j.data_type() == e.data_type()
        });
    if matches {
        Ok(())
    } else {
        Err(SsqError::TypeMismatch(format!(
            "join schema {} is not {} followed by {}",
            schema_definition_string(joined),
            schema_definition_string(left),
            schema_definition_string(right)
        )))
    }
}
