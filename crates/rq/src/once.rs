//! `queryOnce` (spec §6): compile, run a tick against whatever the
//! source collections currently hold, read the result, and let the
//! live query go out of scope — there is no teardown beyond dropping
//! it, since a one-shot query never registers status subscriptions on
//! its sources (see `LiveQuery::gate_readiness`, which callers of a
//! long-lived live query use instead).

use rq_core::{Result, Row};
use rq_ir::QueryNode;
use rq_live::{CollectionRegistry, LiveQuery};

pub fn query_once(query: &QueryNode, registry: &mut CollectionRegistry) -> Result<Vec<Row>> {
    let live = LiveQuery::compile(query, registry, "query-once")?;
    live.lock().unwrap().tick();
    let rows = live.lock().unwrap().sink.to_array();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::QueryBuilder;
    use rq_collection::{Change, Collection, NoopAdapter};
    use rq_core::{RecordKey, Value};

    #[test]
    fn query_once_reads_whatever_the_source_already_holds() {
        let mut registry = CollectionRegistry::new();
        let mut users = Collection::new("users", NoopAdapter);
        registry.register("users", &mut users.core);

        users.core.begin();
        let mut row = Row::new();
        row.set("name", Value::from("ada"));
        users.core.write(Change::insert(RecordKey::Int(1), row));
        users.core.commit();

        let query = QueryBuilder::from("u", "users").build();
        let rows = query_once(&query, &mut registry).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
