//! The public query builder (spec §6, "public query surface").
//!
//! A thin fluent wrapper over `rq_ir::QueryNode` — the IR is already
//! shaped like a builder's output (`Clone`, optional clauses, no
//! private invariants the builder needs to police), so this layer adds
//! nothing but ergonomic method names and `impl Into<String>` args, the
//! same posture `rq_ir::QueryNode::new` and `rq_dataflow::aggregate::
//! Aggregate::new` already take.

use std::sync::Arc;

use rq_dataflow::operators::JoinKind;
use rq_core::Row;
use rq_ir::{Expr, FromClause, IncludesSubquery, JoinClause, OrderByItem, QueryNode, RefPath, SelectItem, SortOrder};

pub struct QueryBuilder {
    node: QueryNode,
}

impl QueryBuilder {
    pub fn from(alias: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self { node: QueryNode::new(alias, FromClause::Collection(collection_id.into())) }
    }

    pub fn from_query(alias: impl Into<String>, sub: QueryBuilder) -> Self {
        Self { node: QueryNode::new(alias, FromClause::Query(Box::new(sub.node))) }
    }

    pub fn r#where(mut self, expr: Expr) -> Self {
        self.node.where_clauses.push(expr);
        self
    }

    pub fn where_fn(mut self, predicate: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        self.node.fn_where.push(Arc::new(predicate));
        self
    }

    pub fn select<S: Into<String>>(mut self, items: impl IntoIterator<Item = (S, Expr)>) -> Self {
        self.node.select = Some(items.into_iter().map(|(name, expr)| SelectItem { output_field: name.into(), expr }).collect());
        self
    }

    /// Appends a nested `includes` field to the select list, creating one
    /// if none exists yet.
    pub fn include<P1, P2>(
        mut self,
        field_name: impl Into<String>,
        child: QueryBuilder,
        correlation_field: impl IntoIterator<Item = P1>,
        child_correlation_field: impl IntoIterator<Item = P2>,
        materialize_as_array: bool,
    ) -> Self
    where
        P1: Into<String>,
        P2: Into<String>,
    {
        let field_name = field_name.into();
        let inc = IncludesSubquery {
            field_name: field_name.clone(),
            query: Box::new(child.node),
            correlation_field: RefPath::new(correlation_field),
            child_correlation_field: RefPath::new(child_correlation_field),
            materialize_as_array,
        };
        self.node.select.get_or_insert_with(Vec::new).push(SelectItem { output_field: field_name, expr: Expr::Includes(inc) });
        self
    }

    pub fn join(mut self, kind: JoinKind, alias: impl Into<String>, collection_id: impl Into<String>, on: Expr) -> Self {
        self.node.join.push(JoinClause { alias: alias.into(), source: FromClause::Collection(collection_id.into()), kind, on });
        self
    }

    pub fn join_query(mut self, kind: JoinKind, alias: impl Into<String>, sub: QueryBuilder, on: Expr) -> Self {
        self.node.join.push(JoinClause { alias: alias.into(), source: FromClause::Query(Box::new(sub.node)), kind, on });
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.node.group_by = exprs;
        self
    }

    pub fn having(mut self, expr: Expr) -> Self {
        self.node.having.push(expr);
        self
    }

    pub fn having_fn(mut self, predicate: impl Fn(&Row) -> bool + Send + Sync + 'static) -> Self {
        self.node.fn_having.push(Arc::new(predicate));
        self
    }

    pub fn order_by(mut self, expr: Expr, order: SortOrder) -> Self {
        self.node.order_by.push(OrderByItem { expr, order });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.node.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.node.offset = Some(n);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.node.distinct = true;
        self
    }

    pub fn single_result(mut self) -> Self {
        self.node.single_result = true;
        self
    }

    pub fn build(self) -> QueryNode {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_filtered_query_builds_a_node_with_one_where_clause() {
        let q = QueryBuilder::from("u", "users")
            .r#where(Expr::func("eq", vec![Expr::ref_path(["u", "active"]), Expr::val(true)]))
            .build();
        assert_eq!(q.where_clauses.len(), 1);
        assert_eq!(q.alias, "u");
    }

    #[test]
    fn select_with_an_include_appends_to_the_select_list() {
        let child = QueryBuilder::from("o", "orders");
        let q = QueryBuilder::from("u", "users").include("orders", child, ["u", "id"], ["o", "userId"], true).build();
        assert_eq!(q.select.as_ref().unwrap().len(), 1);
    }
}
