//! Walks an IR query, resolves aliases to input streams, and wires IVM
//! operators into a `DataflowGraph` (spec §4.7).

use crate::eval::{eval, eval_bool};
use hashbrown::HashMap;
use rq_core::{ContractViolation, RecordKey, Result, Row, Value};
use rq_dataflow::aggregate::{Aggregate, AggregateKind as DfAggregateKind};
use rq_dataflow::operators::{DistinctOperator, FilterOperator, GroupByOperator, JoinKind, JoinOperator, MapOperator, TopKOperator};
use rq_dataflow::{DataflowGraph, NodeId};
use rq_ir::{Expr, FromClause, QueryNode, RefPath, SortOrder};
use std::cmp::Ordering;

/// The output of compiling one `QueryNode`: where in the graph its
/// terminal stream lives, plus the bookkeeping the live-query assembly
/// layer needs to finish wiring sources and nested `includes` children
/// (spec §4.7 step 14).
#[derive(Debug)]
pub struct CompiledPipeline {
    pub output_node: NodeId,
    pub alias_to_collection_id: HashMap<String, String>,
    pub alias_remapping: HashMap<String, String>,
    pub source_where_clauses: HashMap<String, Vec<Expr>>,
    pub includes: Vec<CompiledInclude>,
}

#[derive(Debug)]
pub struct CompiledInclude {
    pub field_name: String,
    pub child: CompiledPipeline,
    pub correlation_field: RefPath,
    pub child_correlation_field: RefPath,
    pub materialize_as_array: bool,
}

/// Resolves a collection id to the graph source node carrying its raw
/// change stream; owned by the live-query assembly layer, which knows
/// how to open a collection's subscription.
pub trait CollectionResolver {
    fn resolve(&mut self, graph: &mut DataflowGraph, collection_id: &str) -> NodeId;
}

struct ParentCorrelation {
    stream: NodeId,
    correlation_field: RefPath,
    child_correlation_field: RefPath,
}

pub fn compile(query: &QueryNode, graph: &mut DataflowGraph, resolver: &mut dyn CollectionResolver) -> Result<CompiledPipeline> {
    let _span = tracing::debug_span!("compile_query", alias = %query.alias).entered();
    compile_inner(query, graph, resolver, None)
}

fn compile_inner(
    query: &QueryNode,
    graph: &mut DataflowGraph,
    resolver: &mut dyn CollectionResolver,
    parent: Option<ParentCorrelation>,
) -> Result<CompiledPipeline> {
    let mut seen_aliases = Vec::new();
    rq_ir::collect_direct_collection_aliases(query, &mut seen_aliases)
        .map_err(|alias| ContractViolation::AliasCollision { alias })?;

    let optimized = rq_ir::optimizer::optimize(query.clone());
    let q = optimized.query;
    let source_where_clauses = optimized.source_where_clauses;
    let mut alias_remapping = optimized.alias_remapping;
    let mut alias_to_collection_id = HashMap::new();
    let mut includes = Vec::new();

    let main_alias = q.alias.clone();
    let mut main_node = match &q.from {
        FromClause::Collection(id) => {
            alias_to_collection_id.insert(main_alias.clone(), id.clone());
            resolver.resolve(graph, id)
        }
        FromClause::Query(inner) => {
            let compiled = compile_inner(inner, graph, resolver, None)?;
            alias_to_collection_id.extend(compiled.alias_to_collection_id);
            alias_remapping.extend(compiled.alias_remapping);
            includes.extend(compiled.includes);
            compiled.output_node
        }
    };

    if let Some(parent) = &parent {
        let correlation_field = parent.correlation_field.clone();
        let child_correlation_field = parent.child_correlation_field.clone();
        main_node = graph.add_binary(
            main_node,
            parent.stream,
            Box::new(JoinOperator::new(
                JoinKind::Inner,
                move |_k: &RecordKey, row: &Row| row.get_path(&child_correlation_field.as_slice()).cloned().unwrap_or(Value::Null),
                move |_k: &RecordKey, row: &Row| row.get_path(&correlation_field.as_slice()).cloned().unwrap_or(Value::Null),
                |child: &Row, _parent: &Row| child.clone(),
            )),
        );
    }

    main_node = namespace_and_filter(graph, main_node, &main_alias, source_where_clauses.get(&main_alias));

    for join in &q.join {
        let (join_node, join_alias_map) = match &join.source {
            FromClause::Collection(id) => {
                alias_to_collection_id.insert(join.alias.clone(), id.clone());
                (resolver.resolve(graph, id), HashMap::new())
            }
            FromClause::Query(inner) => {
                let compiled = compile_inner(inner, graph, resolver, None)?;
                includes.extend(compiled.includes);
                (compiled.output_node, compiled.alias_to_collection_id)
            }
        };
        alias_to_collection_id.extend(join_alias_map);

        let join_side = namespace_and_filter(graph, join_node, &join.alias, source_where_clauses.get(&join.alias));

        let (left_path, right_path) = equi_join_paths(&join.on, &join.alias);
        let kind = join.kind;
        main_node = graph.add_binary(
            main_node,
            join_side,
            Box::new(JoinOperator::new(
                kind,
                move |_k: &RecordKey, row: &Row| row.get_path(&left_path.as_slice()).cloned().unwrap_or(Value::Null),
                move |_k: &RecordKey, row: &Row| row.get_path(&right_path.as_slice()).cloned().unwrap_or(Value::Null),
                |left: &Row, right: &Row| left.clone().merge(right.clone()),
            )),
        );
    }

    for clause in &q.where_clauses {
        let clause = clause.clone();
        main_node = graph.add_unary(main_node, Box::new(FilterOperator::new(move |_k: &RecordKey, row: &Row| eval_bool(&clause, row))));
    }
    for predicate in &q.fn_where {
        let predicate = predicate.clone();
        main_node = graph.add_unary(main_node, Box::new(FilterOperator::new(move |_k: &RecordKey, row: &Row| predicate(row))));
    }

    let mut select_aggregates = Vec::new();
    let mut includes_fields = Vec::new();
    if let Some(items) = &q.select {
        for item in items {
            match &item.expr {
                Expr::Aggregate(agg) => select_aggregates.push((item.output_field.clone(), agg.clone())),
                Expr::Includes(inc) => includes_fields.push((item.output_field.clone(), inc.clone())),
                _ => {}
            }
        }
    }

    let forward_main_row = q.select.is_none() && q.join.is_empty() && q.group_by.is_empty() && !q.has_aggregate_select();
    if forward_main_row {
        let alias = main_alias.clone();
        main_node = graph.add_unary(
            main_node,
            Box::new(MapOperator::new(move |_k: &RecordKey, row: &Row| {
                row.get(&alias).and_then(Value::as_object).cloned().map(Row::from).unwrap_or_default()
            })),
        );
    } else if let Some(items) = q.select.clone() {
        main_node = graph.add_unary(
            main_node,
            Box::new(MapOperator::new(move |_k: &RecordKey, row: &Row| {
                let mut out = Row::new();
                for item in &items {
                    let value = match &item.expr {
                        Expr::Aggregate(_) | Expr::Includes(_) => Value::Null,
                        other => eval(other, row),
                    };
                    out.set(item.output_field.clone(), value);
                }
                out
            })),
        );
    }

    let has_group_by = !q.group_by.is_empty() || q.has_aggregate_select();
    if has_group_by {
        let group_exprs = q.group_by.clone();
        let aggregates: Vec<Aggregate> = select_aggregates
            .iter()
            .map(|(field, call)| to_dataflow_aggregate(field, call))
            .collect();
        let having_clauses = q.having.clone();
        let having_fns = q.fn_having.clone();
        if having_clauses.is_empty() && having_fns.is_empty() {
            main_node = graph.add_unary(main_node, Box::new(GroupByOperator::new(
                move |_k: &RecordKey, row: &Row| group_key(&group_exprs, row),
                aggregates,
            )));
        } else {
            main_node = graph.add_unary(
                main_node,
                Box::new(GroupByOperator::with_having(
                    move |_k: &RecordKey, row: &Row| group_key(&group_exprs, row),
                    aggregates,
                    move |row: &Row| {
                        having_clauses.iter().all(|c| eval_bool(c, row)) && having_fns.iter().all(|f| f(row))
                    },
                )),
            );
        }
    } else if !q.having.is_empty() {
        return Err(ContractViolation::HavingWithoutGroupBy.into());
    }

    if q.distinct {
        if q.select.is_none() {
            return Err(ContractViolation::DistinctWithoutSelect.into());
        }
        main_node = graph.add_unary(main_node, Box::new(DistinctOperator::per_value()));
    }

    if q.limit.is_some() || q.offset.is_some() {
        if q.order_by.is_empty() {
            return Err(ContractViolation::LimitWithoutOrderBy.into());
        }
        let order_by = q.order_by.clone();
        let limit = q.limit.unwrap_or(usize::MAX);
        let offset = q.offset.unwrap_or(0);
        let partition_field = parent.as_ref().map(|p| p.child_correlation_field.clone());
        main_node = graph.add_unary(
            main_node,
            Box::new(TopKOperator::new(
                move |_k: &RecordKey, row: &Row| match &partition_field {
                    Some(path) => row.get_path(&path.as_slice()).cloned().unwrap_or(Value::Null),
                    None => Value::Null,
                },
                move |a: &Row, b: &Row| compare_rows(&order_by, a, b),
                limit,
                offset,
            )),
        );
    } else if !q.order_by.is_empty() {
        let order_by = q.order_by.clone();
        main_node = graph.add_unary(
            main_node,
            Box::new(MapOperator::new(move |_k: &RecordKey, row: &Row| {
                let mut out = row.clone();
                let key: Vec<Value> = order_by.iter().map(|o| eval(&o.expr, row)).collect();
                out.set("$orderByIndex", Value::Array(key));
                out
            })),
        );
    }

    for (field_name, inc) in includes_fields {
        let child_parent = ParentCorrelation {
            stream: main_node,
            correlation_field: inc.correlation_field.clone(),
            child_correlation_field: inc.child_correlation_field.clone(),
        };
        let compiled_child = compile_inner(&inc.query, graph, resolver, Some(child_parent))?;
        includes.push(CompiledInclude {
            field_name,
            child: compiled_child,
            correlation_field: inc.correlation_field,
            child_correlation_field: inc.child_correlation_field,
            materialize_as_array: inc.materialize_as_array,
        });
    }

    Ok(CompiledPipeline { output_node: main_node, alias_to_collection_id, alias_remapping, source_where_clauses, includes })
}

fn namespace_and_filter(graph: &mut DataflowGraph, node: NodeId, alias: &str, pushed: Option<&Vec<Expr>>) -> NodeId {
    let alias_owned = alias.to_string();
    let mut node = graph.add_unary(node, Box::new(MapOperator::new(move |_k: &RecordKey, row: &Row| row.clone().namespaced(&alias_owned))));
    if let Some(clauses) = pushed {
        for clause in clauses {
            let clause = clause.clone();
            node = graph.add_unary(node, Box::new(FilterOperator::new(move |_k: &RecordKey, row: &Row| eval_bool(&clause, row))));
        }
    }
    node
}

/// Resolves a join's `on` predicate (`eq(Ref, Ref)`) into the left and
/// right ref paths, ordering them so the right path belongs to
/// `join_alias`.
fn equi_join_paths(on: &Expr, join_alias: &str) -> (RefPath, RefPath) {
    if let Expr::Func(f) = on {
        if f.name == "eq" && f.args.len() == 2 {
            if let (Expr::Ref(a), Expr::Ref(b)) = (&f.args[0], &f.args[1]) {
                return if b.path.first().map(String::as_str) == Some(join_alias) {
                    (a.clone(), b.clone())
                } else {
                    (b.clone(), a.clone())
                };
            }
        }
    }
    (RefPath::new(Vec::<String>::new()), RefPath::new(Vec::<String>::new()))
}

fn group_key(group_exprs: &[Expr], row: &Row) -> Value {
    if group_exprs.is_empty() {
        return Value::Null;
    }
    let mut fields = std::collections::BTreeMap::new();
    for (i, expr) in group_exprs.iter().enumerate() {
        let field_name = if let Expr::Ref(r) = expr { r.path.last().cloned().unwrap_or_else(|| format!("g{i}")) } else { format!("g{i}") };
        fields.insert(field_name, eval(expr, row));
    }
    Value::Object(fields)
}

fn to_dataflow_aggregate(output_field: &str, call: &rq_ir::AggregateCall) -> Aggregate {
    let source_field = match call.args.first() {
        Some(Expr::Ref(r)) => r.path.last().cloned().unwrap_or_default(),
        _ => String::new(),
    };
    if let Some(config) = &call.config {
        let custom = rq_dataflow::aggregate::CustomAggregate {
            pre_map: config.pre_map.clone(),
            reduce: config.reduce.clone(),
            post_map: config.post_map.clone(),
        };
        return Aggregate::custom(output_field, source_field, custom).with_transform(config.value_transform);
    }
    let kind = match call.kind {
        Some(rq_dataflow::AggregateKind::Count) => DfAggregateKind::Count,
        Some(rq_dataflow::AggregateKind::Sum) => DfAggregateKind::Sum,
        Some(rq_dataflow::AggregateKind::Avg) => DfAggregateKind::Avg,
        Some(rq_dataflow::AggregateKind::Min) => DfAggregateKind::Min,
        Some(rq_dataflow::AggregateKind::Max) => DfAggregateKind::Max,
        None => DfAggregateKind::Count,
    };
    if matches!(kind, DfAggregateKind::Count) {
        Aggregate::count(output_field)
    } else {
        Aggregate::new(output_field, source_field, kind)
    }
}

fn compare_rows(order_by: &[rq_ir::OrderByItem], a: &Row, b: &Row) -> Ordering {
    for item in order_by {
        let va = eval(&item.expr, a);
        let vb = eval(&item.expr, b);
        let ord = va.cmp(&vb);
        let ord = if item.order == SortOrder::Desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
