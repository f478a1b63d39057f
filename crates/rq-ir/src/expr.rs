//! IR expression nodes (spec §3 "IR expressions", §4.13 fingerprinting).
//!
//! Every node evaluates to a single `rq_core::Value`; there is no
//! compile-time result type parameter the way the spec's `Val<T>` /
//! `Func<T>` notation suggests — the teacher's own `Expr` AST
//! (`crates/query/src/ast/expr.rs`) is likewise untyped at the Rust
//! level, carrying a schema-resolved `Value` instead.

use rq_dataflow::aggregate::ValueTransform;
use rq_dataflow::AggregateKind;
use rq_core::Value;
use std::fmt::Write as _;
use std::sync::Arc;

/// A dotted path into a namespaced row: `path[0]` is the alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefPath {
    pub path: Vec<String>,
}

impl RefPath {
    pub fn new(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { path: path.into_iter().map(Into::into).collect() }
    }

    pub fn as_slice(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }
}

/// An operator factory compiled ahead of time by a `defineOperator`
/// plugin, overriding registry lookup by name (spec §6).
pub type OperatorFactory = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct FuncCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub factory: Option<OperatorFactory>,
}

impl std::fmt::Debug for FuncCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

/// `(preMap, reduce, postMap?)` for a custom aggregate, embedded by a
/// `defineAggregate` plugin (spec §4.5, §6).
pub type PreMapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type ReduceFn = Arc<dyn Fn(&[(Value, i64)]) -> Value + Send + Sync>;
pub type PostMapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct AggregateConfig {
    pub pre_map: PreMapFn,
    pub reduce: ReduceFn,
    pub post_map: Option<PostMapFn>,
    pub value_transform: ValueTransform,
}

impl std::fmt::Debug for AggregateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateConfig")
            .field("post_map", &self.post_map.is_some())
            .field("value_transform", &self.value_transform)
            .finish()
    }
}

#[derive(Clone)]
pub struct AggregateCall {
    pub name: String,
    pub kind: Option<AggregateKind>,
    pub args: Vec<Expr>,
    pub config: Option<AggregateConfig>,
}

impl std::fmt::Debug for AggregateCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateCall")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("args", &self.args)
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct IncludesSubquery {
    pub field_name: String,
    pub query: Box<super::query::QueryNode>,
    pub correlation_field: RefPath,
    pub child_correlation_field: RefPath,
    pub materialize_as_array: bool,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Ref(RefPath),
    Val(Value),
    Func(FuncCall),
    Aggregate(AggregateCall),
    Includes(IncludesSubquery),
}

impl Expr {
    pub fn ref_path(path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Expr::Ref(RefPath::new(path))
    }

    pub fn val(value: impl Into<Value>) -> Self {
        Expr::Val(value.into())
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Func(FuncCall { name: name.into(), args, factory: None })
    }

    pub fn aggregate(name: impl Into<String>, kind: AggregateKind, args: Vec<Expr>) -> Self {
        Expr::Aggregate(AggregateCall { name: name.into(), kind: Some(kind), args, config: None })
    }

    /// Structural fingerprint contribution for this node (spec §4.13):
    /// ref paths, literal values (canonicalized), operator names, and
    /// argument fingerprints concatenated with stable separators.
    pub fn fingerprint(&self, out: &mut String) {
        match self {
            Expr::Ref(r) => {
                let _ = write!(out, "R({})", r.path.join("."));
            }
            Expr::Val(v) => {
                let _ = write!(out, "V({})", fingerprint_value(v));
            }
            Expr::Func(f) => {
                let _ = write!(out, "F[{}](", f.name);
                for (i, arg) in f.args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.fingerprint(out);
                }
                out.push(')');
            }
            Expr::Aggregate(a) => {
                let _ = write!(out, "A[{}](", a.name);
                for (i, arg) in a.args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.fingerprint(out);
                }
                out.push(')');
            }
            Expr::Includes(inc) => {
                let _ = write!(
                    out,
                    "X[{}|{}|{}|{}](",
                    inc.field_name,
                    inc.correlation_field.path.join("."),
                    inc.child_correlation_field.path.join("."),
                    inc.materialize_as_array
                );
                out.push_str(&inc.query.fingerprint());
                out.push(')');
            }
        }
    }
}

/// Stable, deterministic rendering of a literal for fingerprinting:
/// dates as epoch ms, arrays in order, objects by sorted key (spec
/// §4.13).
pub fn fingerprint_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("\"{s}\""),
        Value::Date(ms) => format!("d{ms}"),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(fingerprint_value).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(fields) => {
            let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}:{}", fingerprint_value(v))).collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_across_equal_objectes_with_different_insertion_order() {
        let mut a = std::collections::BTreeMap::new();
        a.insert("b".to_string(), Value::Int(2));
        a.insert("a".to_string(), Value::Int(1));
        let mut b = std::collections::BTreeMap::new();
        b.insert("a".to_string(), Value::Int(1));
        b.insert("b".to_string(), Value::Int(2));
        assert_eq!(fingerprint_value(&Value::Object(a)), fingerprint_value(&Value::Object(b)));
    }

    #[test]
    fn func_fingerprint_includes_name_and_args() {
        let expr = Expr::func("eq", vec![Expr::ref_path(["u", "id"]), Expr::val(1i64)]);
        let mut out = String::new();
        expr.fingerprint(&mut out);
        assert_eq!(out, "F[eq](R(u.id),V(1))");
    }
}
