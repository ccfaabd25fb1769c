#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use ssq_common::{PlannerConfig, Result, SsqError};
use ssq_execution::{
    AggregateFn, Grouped, InMemoryFunctionRegistry, Initializer, JoinSerdes, KeyMapper, RecordKey,
    Row, RowPredicate, SinkTopic, StreamRuntime, Value, ValueJoinerFn, ValueMapper,
};
use ssq_physical::{DataflowHandle, PhysicalPlanBuilder, PlanNode};
use ssq_planner::{JoinKind, JoinWindow, KeyField, KeyFormat};

/// Serde handle passed through the builder untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSerde(pub &'static str);

pub enum Stage {
    Source { topic: String },
    Filter(RowPredicate),
    Map(ValueMapper),
    SelectKey(KeyMapper),
    ToStream,
    Aggregate {
        grouped: GroupedPipeline,
        initializer: Initializer,
        aggregator: AggregateFn,
    },
    Join {
        kind: JoinKind,
        window: Option<JoinWindow>,
        joiner: ValueJoinerFn,
    },
}

/// A chain of stages; the handle of both streams and tables.
pub struct Pipeline {
    pub stage: Stage,
    pub parent: Option<Arc<Pipeline>>,
}

pub type Handle = Arc<Pipeline>;

#[derive(Clone)]
pub struct GroupedPipeline {
    pub input: Handle,
    pub key: Option<KeyMapper>,
    pub key_format: KeyFormat,
    pub value_serde: TestSerde,
}

pub struct RecordedSink {
    pub input: Handle,
    pub topic: SinkTopic<TestSerde>,
}

/// Runtime that records every operator it is asked for and can replay
/// records through unary pipelines.
#[derive(Default)]
pub struct InMemoryRuntime {
    ops: Mutex<Vec<String>>,
    sinks: Mutex<Vec<RecordedSink>>,
}

impl InMemoryRuntime {
    fn record(&self, op: impl Into<String>) {
        self.ops.lock().expect("ops lock").push(op.into());
    }

    fn stage(&self, parent: &Handle, stage: Stage) -> Handle {
        Arc::new(Pipeline {
            stage,
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().expect("ops lock").clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops().iter().filter(|o| o.as_str() == op).count()
    }

    pub fn sink_topics(&self) -> Vec<SinkTopic<TestSerde>> {
        self.sinks
            .lock()
            .expect("sinks lock")
            .iter()
            .map(|s| s.topic.clone())
            .collect()
    }

    /// Push records written to the sink `topic` through its pipeline.
    pub fn push_to_sink(
        &self,
        topic: &str,
        records: Vec<(RecordKey, Option<Row>)>,
    ) -> Vec<(RecordKey, Option<Row>)> {
        let sinks = self.sinks.lock().expect("sinks lock");
        let sink = sinks
            .iter()
            .find(|s| s.topic.name == topic)
            .unwrap_or_else(|| panic!("no sink for topic {topic}"));
        push(&sink.input, records)
    }
}

fn chain(handle: &Handle) -> Vec<&Pipeline> {
    let mut stages = Vec::new();
    let mut cur = Some(handle);
    while let Some(p) = cur {
        stages.push(p.as_ref());
        cur = p.parent.as_ref();
    }
    stages.reverse();
    stages
}

/// Replay records from the source of `handle` through every stage.
pub fn push(handle: &Handle, records: Vec<(RecordKey, Option<Row>)>) -> Vec<(RecordKey, Option<Row>)> {
    let mut out = records;
    for p in chain(handle) {
        out = match &p.stage {
            Stage::Source { .. } | Stage::ToStream => out,
            Stage::Filter(pred) => out
                .into_iter()
                .filter(|(k, v)| pred(k, v.as_ref()))
                .collect(),
            Stage::Map(mapper) => out
                .into_iter()
                .map(|(k, v)| {
                    let mapped = mapper(v.as_ref());
                    (k, mapped)
                })
                .collect(),
            Stage::SelectKey(key) => out
                .into_iter()
                .map(|(_, v)| {
                    let row = v.expect("select_key receives non-null rows");
                    (RecordKey::Plain(key(&row)), Some(row))
                })
                .collect(),
            Stage::Aggregate { .. } | Stage::Join { .. } => {
                panic!("push does not run through aggregations or joins")
            }
        };
    }
    out
}

/// Run `records` through the grouping and aggregation behind `table`.
pub fn aggregate(table: &Handle, records: Vec<(RecordKey, Option<Row>)>) -> BTreeMap<String, Row> {
    let Stage::Aggregate {
        grouped,
        initializer,
        aggregator,
    } = &table.stage
    else {
        panic!("not an aggregate table");
    };
    let mut groups = BTreeMap::new();
    for (key, row) in push(&grouped.input, records) {
        let row = row.unwrap_or_else(|| panic!("null row for key {key} reached the aggregation"));
        let group = match &grouped.key {
            Some(mapper) => mapper(&row),
            None => key.value().clone(),
        };
        let acc = groups
            .remove(&group.to_string())
            .unwrap_or_else(|| initializer());
        groups.insert(group.to_string(), aggregator(&group, &row, acc));
    }
    groups
}

/// Predicate of a filter stage.
pub fn predicate(handle: &Handle) -> &RowPredicate {
    match &handle.stage {
        Stage::Filter(pred) => pred,
        _ => panic!("not a filter stage"),
    }
}

/// Merge function of a join stream.
pub fn joiner(handle: &Handle) -> &ValueJoinerFn {
    match &handle.stage {
        Stage::Join { joiner, .. } => joiner,
        _ => panic!("not a join stream"),
    }
}

impl StreamRuntime for InMemoryRuntime {
    type Stream = Handle;
    type Table = Handle;
    type Grouped = GroupedPipeline;
    type Serde = TestSerde;

    fn stream_source(&self, topic: &str, _schema: &SchemaRef) -> Result<Handle> {
        if topic.is_empty() {
            return Err(SsqError::Execution("empty topic name".to_string()));
        }
        self.record(format!("stream_source {topic}"));
        Ok(Arc::new(Pipeline {
            stage: Stage::Source {
                topic: topic.to_string(),
            },
            parent: None,
        }))
    }

    fn table_source(&self, topic: &str, _schema: &SchemaRef) -> Result<Handle> {
        self.record(format!("table_source {topic}"));
        Ok(Arc::new(Pipeline {
            stage: Stage::Source {
                topic: topic.to_string(),
            },
            parent: None,
        }))
    }

    fn filter(&self, input: &Handle, predicate: RowPredicate) -> Handle {
        self.record("filter");
        self.stage(input, Stage::Filter(predicate))
    }

    fn filter_table(&self, input: &Handle, predicate: RowPredicate) -> Handle {
        self.record("filter_table");
        self.stage(input, Stage::Filter(predicate))
    }

    fn map_values(&self, input: &Handle, mapper: ValueMapper) -> Handle {
        self.record("map_values");
        self.stage(input, Stage::Map(mapper))
    }

    fn map_table_values(&self, input: &Handle, mapper: ValueMapper) -> Handle {
        self.record("map_table_values");
        self.stage(input, Stage::Map(mapper))
    }

    fn select_key(&self, input: &Handle, key: KeyMapper) -> Handle {
        self.record("select_key");
        self.stage(input, Stage::SelectKey(key))
    }

    fn group_by_key(&self, input: &Handle, grouped: Grouped<TestSerde>) -> GroupedPipeline {
        self.record("group_by_key");
        GroupedPipeline {
            input: Arc::clone(input),
            key: None,
            key_format: grouped.key_format,
            value_serde: grouped.value_serde,
        }
    }

    fn group_by(
        &self,
        input: &Handle,
        key: KeyMapper,
        grouped: Grouped<TestSerde>,
    ) -> GroupedPipeline {
        self.record("group_by");
        GroupedPipeline {
            input: Arc::clone(input),
            key: Some(key),
            key_format: grouped.key_format,
            value_serde: grouped.value_serde,
        }
    }

    fn aggregate(
        &self,
        input: &GroupedPipeline,
        initializer: Initializer,
        aggregator: AggregateFn,
    ) -> Handle {
        self.record("aggregate");
        Arc::new(Pipeline {
            stage: Stage::Aggregate {
                grouped: input.clone(),
                initializer,
                aggregator,
            },
            parent: None,
        })
    }

    fn stream_table_join(
        &self,
        left: &Handle,
        _right: &Handle,
        kind: JoinKind,
        joiner: ValueJoinerFn,
        _serdes: JoinSerdes<TestSerde>,
    ) -> Handle {
        self.record(format!("stream_table_join {kind}"));
        self.stage(
            left,
            Stage::Join {
                kind,
                window: None,
                joiner,
            },
        )
    }

    fn stream_stream_join(
        &self,
        left: &Handle,
        _right: &Handle,
        kind: JoinKind,
        window: JoinWindow,
        joiner: ValueJoinerFn,
        _serdes: JoinSerdes<TestSerde>,
    ) -> Handle {
        self.record(format!("stream_stream_join {kind}"));
        self.stage(
            left,
            Stage::Join {
                kind,
                window: Some(window),
                joiner,
            },
        )
    }

    fn table_to_stream(&self, input: &Handle) -> Handle {
        self.record("table_to_stream");
        self.stage(input, Stage::ToStream)
    }

    fn to_sink(&self, input: &Handle, topic: SinkTopic<TestSerde>) -> Result<()> {
        self.record(format!("to_sink {}", topic.name));
        self.sinks.lock().expect("sinks lock").push(RecordedSink {
            input: Arc::clone(input),
            topic,
        });
        Ok(())
    }
}

pub type TestBuilder = PhysicalPlanBuilder<InMemoryRuntime>;
pub type TestNode = PlanNode<InMemoryRuntime>;

pub fn builder() -> TestBuilder {
    builder_with(PlannerConfig::default())
}

pub fn builder_with(config: PlannerConfig) -> TestBuilder {
    PhysicalPlanBuilder::new(
        InMemoryRuntime::default(),
        config,
        Arc::new(InMemoryFunctionRegistry::with_builtins()),
    )
    .expect("valid config")
}

/// `[ROWKEY: string, ORDERID: int, AMOUNT: double]`
pub fn orders_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("ROWKEY", DataType::Utf8, true),
        Field::new("ORDERID", DataType::Int32, true),
        Field::new("AMOUNT", DataType::Float64, true),
    ]))
}

pub fn rowkey() -> KeyField {
    KeyField::new("ROWKEY", 0, DataType::Utf8)
}

pub fn orders_stream(b: &mut TestBuilder) -> Arc<TestNode> {
    b.source_stream("orders", orders_schema(), Some(rowkey()), KeyFormat::Plain)
        .expect("orders source")
}

pub fn order(key: &str, id: i32, amount: f64) -> Row {
    Row::new(vec![Value::from(key), Value::from(id), Value::from(amount)])
}

pub fn keyed(key: &str, row: Row) -> (RecordKey, Option<Row>) {
    (RecordKey::Plain(Value::from(key)), Some(row))
}

pub fn stream_handle(node: &TestNode) -> &Handle {
    match node.handle() {
        DataflowHandle::Stream(s) => s,
        DataflowHandle::Table(_) => panic!("{:?} is a table", node.id()),
    }
}

pub fn table_handle(node: &TestNode) -> &Handle {
    match node.handle() {
        DataflowHandle::Table(t) => t,
        DataflowHandle::Stream(_) => panic!("{:?} is a stream", node.id()),
    }
}

pub fn field_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}
