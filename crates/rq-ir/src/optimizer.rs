//! Predicate pushdown and subquery flattening (spec §4.7 steps 2–4).
//!
//! Grounded on the teacher's `optimizer/predicate_pushdown.rs` (a
//! `Pass` over a `LogicalPlan` that walks `AND`-conjuncts and sinks
//! single-table predicates below a join) — rebuilt here over the IR's
//! `Expr`/`QueryNode` instead of the teacher's physical plan nodes, and
//! narrowed to exactly the two rewrites the spec calls for.

use crate::expr::Expr;
use crate::query::{FromClause, QueryNode};
use hashbrown::HashMap;

/// A query after optimization, plus the bookkeeping the compiler needs
/// to resolve aliases through flattened subqueries and pre-filter
/// per-source loads.
pub struct OptimizedQuery {
    pub query: QueryNode,
    /// Per-alias predicates that reference only that alias, sunk out of
    /// `where_clauses` so the compiler can apply them immediately after
    /// resolving the alias's input stream.
    pub source_where_clauses: HashMap<String, Vec<Expr>>,
    /// `outerAlias -> innermostAlias`, flattened to one hop even across
    /// a chain of trivial subqueries.
    pub alias_remapping: HashMap<String, String>,
}

pub fn optimize(mut query: QueryNode) -> OptimizedQuery {
    let mut alias_remapping = HashMap::new();
    query.from = flatten_from(query.from, &query.alias, &mut alias_remapping);
    for join in &mut query.join {
        let flattened = flatten_from(std::mem::replace(&mut join.source, FromClause::Collection(String::new())), &join.alias, &mut alias_remapping);
        join.source = flattened;
    }

    let mut source_where_clauses: HashMap<String, Vec<Expr>> = HashMap::new();
    let mut residual = Vec::new();
    for clause in query.where_clauses.drain(..) {
        match single_alias_of(&clause) {
            Some(alias) => source_where_clauses.entry(alias).or_default().push(clause),
            None => residual.push(clause),
        }
    }
    query.where_clauses = residual;

    OptimizedQuery { query, source_where_clauses, alias_remapping }
}

/// A subquery is trivial (and thus flattenable) when it does nothing
/// but rename a direct collection reference: no join, filter,
/// projection, grouping, ordering, or limiting of its own.
fn is_trivial(query: &QueryNode) -> bool {
    matches!(query.from, FromClause::Collection(_))
        && query.join.is_empty()
        && query.where_clauses.is_empty()
        && query.fn_where.is_empty()
        && query.group_by.is_empty()
        && query.having.is_empty()
        && query.select.is_none()
        && query.order_by.is_empty()
        && query.limit.is_none()
        && query.offset.is_none()
        && !query.distinct
}

fn flatten_from(from: FromClause, outer_alias: &str, remap: &mut HashMap<String, String>) -> FromClause {
    match from {
        FromClause::Query(inner) if is_trivial(&inner) => {
            let FromClause::Collection(collection_id) = inner.from else {
                unreachable!("is_trivial guarantees a direct collection reference")
            };
            remap.insert(outer_alias.to_string(), inner.alias.clone());
            FromClause::Collection(collection_id)
        }
        other => other,
    }
}

/// If `expr` is a comparison-shaped predicate referencing exactly one
/// alias (via `Ref` nodes), returns that alias; anything touching more
/// than one alias, or no alias at all, stays in the residual `where`.
fn single_alias_of(expr: &Expr) -> Option<String> {
    let mut aliases: Vec<String> = Vec::new();
    collect_ref_aliases(expr, &mut aliases);
    aliases.dedup();
    match aliases.len() {
        1 => Some(aliases.into_iter().next().unwrap()),
        _ => None,
    }
}

fn collect_ref_aliases(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Ref(r) => {
            if let Some(alias) = r.path.first() {
                out.push(alias.clone());
            }
        }
        Expr::Val(_) => {}
        Expr::Func(f) => {
            for arg in &f.args {
                collect_ref_aliases(arg, out);
            }
        }
        Expr::Aggregate(a) => {
            for arg in &a.args {
                collect_ref_aliases(arg, out);
            }
        }
        Expr::Includes(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn single_alias_predicate_is_pushed_to_its_source() {
        let mut query = QueryNode::new("u", FromClause::Collection("users".into()));
        query.where_clauses.push(Expr::func("eq", vec![Expr::ref_path(["u", "active"]), Expr::val(true)]));
        let optimized = optimize(query);
        assert!(optimized.query.where_clauses.is_empty());
        assert_eq!(optimized.source_where_clauses.get("u").map(Vec::len), Some(1));
    }

    #[test]
    fn cross_alias_predicate_stays_residual() {
        let mut query = QueryNode::new("u", FromClause::Collection("users".into()));
        query.where_clauses.push(Expr::func("eq", vec![Expr::ref_path(["u", "id"]), Expr::ref_path(["p", "user_id"])]));
        let optimized = optimize(query);
        assert_eq!(optimized.query.where_clauses.len(), 1);
        assert!(optimized.source_where_clauses.is_empty());
    }

    #[test]
    fn trivial_subquery_flattens_with_one_hop_alias_remapping() {
        let inner = QueryNode::new("raw_users", FromClause::Collection("users".into()));
        let outer = QueryNode::new("u", FromClause::Query(Box::new(inner)));
        let optimized = optimize(outer);
        assert!(matches!(optimized.query.from, FromClause::Collection(ref id) if id == "users"));
        assert_eq!(optimized.alias_remapping.get("u"), Some(&"raw_users".to_string()));
    }
}
