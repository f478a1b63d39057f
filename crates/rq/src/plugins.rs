//! `defineAggregate`/`defineOperator` plugin registration (spec §6).
//!
//! Both plugin kinds resolve to the same trick the IR already supports:
//! an `Expr::Aggregate`/`Expr::Func` node carrying its own factory
//! closure, so the compiler and evaluator need no registry lookup for a
//! name they've never seen — `rq_compiler::eval::eval` already checks
//! `FuncCall.factory` before falling back to the builtin table, and
//! `to_dataflow_aggregate` already checks `AggregateCall.config` before
//! falling back to a built-in `AggregateKind`.

use std::sync::Arc;

use rq_dataflow::aggregate::ValueTransform;
use rq_core::Value;
use rq_ir::{AggregateCall, AggregateConfig, Expr, FuncCall};

/// A registered aggregate reduction: `(preMap, reduce, postMap?)` plus
/// how raw field values are coerced before `preMap` runs.
#[derive(Clone)]
pub struct AggregateDefinition {
    pre_map: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    reduce: Arc<dyn Fn(&[(Value, i64)]) -> Value + Send + Sync>,
    post_map: Option<Arc<dyn Fn(&Value) -> Value + Send + Sync>>,
    value_transform: ValueTransform,
}

impl AggregateDefinition {
    pub fn new(
        pre_map: impl Fn(&Value) -> Value + Send + Sync + 'static,
        reduce: impl Fn(&[(Value, i64)]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self { pre_map: Arc::new(pre_map), reduce: Arc::new(reduce), post_map: None, value_transform: ValueTransform::Raw }
    }

    pub fn with_post_map(mut self, post_map: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.post_map = Some(Arc::new(post_map));
        self
    }

    pub fn with_value_transform(mut self, value_transform: ValueTransform) -> Self {
        self.value_transform = value_transform;
        self
    }

    /// Builds an `Expr::Aggregate` node over `arg`, to be used as a
    /// select-item expression under a `groupBy`.
    pub fn call(&self, name: impl Into<String>, arg: Expr) -> Expr {
        Expr::Aggregate(AggregateCall {
            name: name.into(),
            kind: None,
            args: vec![arg],
            config: Some(AggregateConfig {
                pre_map: self.pre_map.clone(),
                reduce: self.reduce.clone(),
                post_map: self.post_map.clone(),
                value_transform: self.value_transform,
            }),
        })
    }
}

pub fn define_aggregate(
    pre_map: impl Fn(&Value) -> Value + Send + Sync + 'static,
    reduce: impl Fn(&[(Value, i64)]) -> Value + Send + Sync + 'static,
) -> AggregateDefinition {
    AggregateDefinition::new(pre_map, reduce)
}

/// A registered scalar operator: a name plus the closure that computes
/// it over its already-evaluated arguments.
#[derive(Clone)]
pub struct OperatorDefinition {
    name: String,
    factory: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl OperatorDefinition {
    pub fn new(name: impl Into<String>, compile: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self { name: name.into(), factory: Arc::new(compile) }
    }

    pub fn call(&self, args: Vec<Expr>) -> Expr {
        Expr::Func(FuncCall { name: self.name.clone(), args, factory: Some(self.factory.clone()) })
    }
}

pub fn define_operator(name: impl Into<String>, compile: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> OperatorDefinition {
    OperatorDefinition::new(name, compile)
}

/// Builds a two-argument comparison operator.
pub fn comparison(cmp: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> impl Fn(&[Value]) -> Value + Send + Sync + 'static {
    move |args: &[Value]| match (args.first(), args.get(1)) {
        (Some(a), Some(b)) => Value::Bool(cmp(a, b)),
        _ => Value::Bool(false),
    }
}

/// Builds a single-argument value transform operator.
pub fn transform(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> impl Fn(&[Value]) -> Value + Send + Sync + 'static {
    move |args: &[Value]| args.first().map(&f).unwrap_or(Value::Null)
}

/// Builds a two-argument numeric operator; either side missing or
/// non-numeric yields `null`.
pub fn numeric(bin: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> impl Fn(&[Value]) -> Value + Send + Sync + 'static {
    move |args: &[Value]| match (args.first().and_then(Value::as_f64), args.get(1).and_then(Value::as_f64)) {
        (Some(a), Some(b)) => Value::Float(bin(a, b)),
        _ => Value::Null,
    }
}

/// Whether a value is the engine's "unknown" marker (`null`).
pub fn is_unknown(value: &Value) -> bool {
    value.is_null()
}
