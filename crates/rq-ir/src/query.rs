//! IR query nodes (spec §3 "IR query", §4.13 fingerprinting).

use crate::expr::{Expr, RefPath};
use rq_dataflow::operators::JoinKind;
use std::fmt::Write as _;
use std::sync::Arc;

/// A predicate expressed as a closure rather than an `Expr` tree (the
/// spec's `fnWhere`/`fnHaving`) — not representable structurally, so it
/// is excluded from the fingerprint; callers that need change detection
/// across a functional predicate must bump the query identity
/// themselves (e.g. by rebuilding the closure under a new query).
pub type FnPredicate = Arc<dyn Fn(&rq_core::Row) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug)]
pub enum FromClause {
    Collection(String),
    Query(Box<QueryNode>),
}

impl FromClause {
    fn fingerprint(&self, out: &mut String) {
        match self {
            FromClause::Collection(id) => {
                let _ = write!(out, "C({id})");
            }
            FromClause::Query(q) => {
                out.push_str("Q(");
                out.push_str(&q.fingerprint());
                out.push(')');
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct JoinClause {
    pub alias: String,
    pub source: FromClause,
    pub kind: JoinKind,
    pub on: Expr,
}

#[derive(Clone, Debug)]
pub struct SelectItem {
    pub output_field: String,
    pub expr: Expr,
}

#[derive(Clone, Debug)]
pub struct OrderByItem {
    pub expr: Expr,
    pub order: SortOrder,
}

/// `{ from, join[], where[], fnWhere[], groupBy[], having[], fnHaving[],
/// select?, orderBy[], limit?, offset?, distinct?, singleResult? }`
/// (spec §3).
#[derive(Clone)]
pub struct QueryNode {
    pub from: FromClause,
    pub alias: String,
    pub join: Vec<JoinClause>,
    pub where_clauses: Vec<Expr>,
    pub fn_where: Vec<FnPredicate>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Expr>,
    pub fn_having: Vec<FnPredicate>,
    pub select: Option<Vec<SelectItem>>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub distinct: bool,
    pub single_result: bool,
}

impl std::fmt::Debug for QueryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryNode")
            .field("from", &self.from)
            .field("alias", &self.alias)
            .field("join", &self.join)
            .field("where_clauses", &self.where_clauses)
            .field("fn_where", &self.fn_where.len())
            .field("group_by", &self.group_by)
            .field("having", &self.having)
            .field("fn_having", &self.fn_having.len())
            .field("select", &self.select)
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("distinct", &self.distinct)
            .field("single_result", &self.single_result)
            .finish()
    }
}

impl QueryNode {
    pub fn new(alias: impl Into<String>, from: FromClause) -> Self {
        Self {
            from,
            alias: alias.into(),
            join: Vec::new(),
            where_clauses: Vec::new(),
            fn_where: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            fn_having: Vec::new(),
            select: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            single_result: false,
        }
    }

    pub fn has_aggregate_select(&self) -> bool {
        self.select
            .as_ref()
            .map(|items| items.iter().any(|item| matches!(item.expr, Expr::Aggregate(_))))
            .unwrap_or(false)
    }

    /// Structural fingerprint: collection ids, ref paths, literal
    /// values, operator names and arg fingerprints, and a marker per
    /// present clause (`F|J|W|S|G|H|O|L|X|D|1`) (spec §4.13).
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        out.push('F');
        self.from.fingerprint(&mut out);

        if !self.join.is_empty() {
            out.push_str("|J(");
            for j in &self.join {
                let _ = write!(out, "{}:{:?}:", j.alias, j.kind);
                j.source.fingerprint(&mut out);
                out.push(':');
                j.on.fingerprint(&mut out);
                out.push(';');
            }
            out.push(')');
        }
        if !self.where_clauses.is_empty() {
            out.push_str("|W(");
            for w in &self.where_clauses {
                w.fingerprint(&mut out);
                out.push(';');
            }
            out.push(')');
        }
        if let Some(select) = &self.select {
            out.push_str("|S(");
            for item in select {
                let _ = write!(out, "{}=", item.output_field);
                item.expr.fingerprint(&mut out);
                out.push(';');
            }
            out.push(')');
        }
        if !self.group_by.is_empty() {
            out.push_str("|G(");
            for g in &self.group_by {
                g.fingerprint(&mut out);
                out.push(';');
            }
            out.push(')');
        }
        if !self.having.is_empty() {
            out.push_str("|H(");
            for h in &self.having {
                h.fingerprint(&mut out);
                out.push(';');
            }
            out.push(')');
        }
        if !self.order_by.is_empty() {
            out.push_str("|O(");
            for o in &self.order_by {
                o.expr.fingerprint(&mut out);
                let _ = write!(out, ":{:?};", o.order);
            }
            out.push(')');
        }
        if self.limit.is_some() || self.offset.is_some() {
            let _ = write!(out, "|L({:?},{:?})", self.limit, self.offset);
        }
        if self.select.as_ref().map(|items| items.iter().any(|i| matches!(i.expr, Expr::Includes(_)))).unwrap_or(false)
        {
            out.push_str("|X");
        }
        if self.distinct {
            out.push_str("|D");
        }
        if self.single_result {
            out.push_str("|1");
        }
        out
    }
}

/// Validates alias scoping pre-optimization (spec §3 invariant, §4.7
/// step 2): an alias used for a direct collection reference in a
/// subquery must not collide with any ancestor's direct-collection
/// alias.
pub fn collect_direct_collection_aliases(query: &QueryNode, out: &mut Vec<String>) -> Result<(), String> {
    if matches!(query.from, FromClause::Collection(_)) {
        if out.contains(&query.alias) {
            return Err(query.alias.clone());
        }
        out.push(query.alias.clone());
    }
    for join in &query.join {
        if matches!(join.source, FromClause::Collection(_)) {
            if out.contains(&join.alias) {
                return Err(join.alias.clone());
            }
            out.push(join.alias.clone());
        }
    }
    Ok(())
}

pub fn ref_path(path: impl IntoIterator<Item = impl Into<String>>) -> RefPath {
    RefPath::new(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn fingerprint_differs_when_a_where_clause_changes() {
        let mut q = QueryNode::new("u", FromClause::Collection("users".into()));
        q.where_clauses.push(Expr::func("eq", vec![Expr::ref_path(["u", "id"]), Expr::val(1i64)]));
        let fp1 = q.fingerprint();

        q.where_clauses[0] = Expr::func("eq", vec![Expr::ref_path(["u", "id"]), Expr::val(2i64)]);
        let fp2 = q.fingerprint();

        assert_ne!(fp1, fp2);
    }

    #[test]
    fn duplicate_direct_collection_alias_in_a_join_is_rejected() {
        let mut q = QueryNode::new("u", FromClause::Collection("users".into()));
        q.join.push(JoinClause {
            alias: "u".into(),
            source: FromClause::Collection("users".into()),
            kind: JoinKind::Inner,
            on: Expr::val(true),
        });
        let mut seen = Vec::new();
        assert!(collect_direct_collection_aliases(&q, &mut seen).is_err());
    }
}
