//! Subset-load deduplication (spec §4.9): before asking a
//! [`crate::collection::SyncAdapter`] to fetch rows matching some
//! `where`/`orderBy`/`limit`/`offset`, check whether that coverage has
//! already been requested (or is in flight) so the same rows aren't
//! fetched twice.
//!
//! There is no teacher file this is grounded on directly — the teacher's
//! `crates/query` plans a single in-memory dataset and never talks to a
//! remote source — so this is built from the spec's own description of
//! the algorithm, using [`crate::predicate::is_subset`]/`minus` as the
//! boolean-algebra primitives and the teacher's `tracing`-based
//! instrumentation style for the bookkeeping log lines.

use tracing::trace;

use crate::collection::{CollectionCore, LoadOutcome, SyncAdapter};
use crate::predicate::{is_subset, minus, Predicate};

/// A sort term a sync adapter advertises as part of a `loadSubset` call —
/// the same narrow-algebra posture as [`Predicate`]: a collection's
/// `orderBy` can be an arbitrary `rq_ir::OrderByItem` at the query layer,
/// but the deduper only needs to ask "are these two orderings the same",
/// so a field name plus direction is all it carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderByTerm {
    pub field: String,
    pub order: SortDirection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadSubsetOptions {
    pub where_: Predicate,
    pub order_by: Vec<OrderByTerm>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl LoadSubsetOptions {
    pub fn unlimited(where_: Predicate) -> Self {
        Self { where_, order_by: Vec::new(), limit: None, offset: None }
    }

    pub fn with_order_by(mut self, order_by: Vec<OrderByTerm>) -> Self {
        self.order_by = order_by;
        self
    }

    fn is_unlimited(&self) -> bool {
        self.limit.is_none() && self.offset.is_none()
    }

    /// Whether `self`, already-requested coverage, also satisfies
    /// `requested`: equal `where`, compatible `orderBy`, and a limit/offset
    /// window that is at least as wide (spec §4.9 step 3).
    fn covers(&self, requested: &LoadSubsetOptions) -> bool {
        self.where_ == requested.where_
            && self.order_by == requested.order_by
            && limit_covers(self.limit, requested.limit)
            && offset_covers(self.offset, requested.offset)
    }
}

fn limit_covers(existing: Option<usize>, requested: Option<usize>) -> bool {
    match (existing, requested) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(existing), Some(requested)) => existing >= requested,
    }
}

fn offset_covers(existing: Option<usize>, requested: Option<usize>) -> bool {
    existing.unwrap_or(0) <= requested.unwrap_or(0)
}

#[derive(Clone, Debug)]
struct LimitedCall {
    options: LoadSubsetOptions,
    generation: u64,
    settled: bool,
}

/// Fired once for every `loadSubset` request the deduper answers without
/// consulting the adapter (spec §4.9's closing sentence, §8's dedup
/// property).
pub type DeduplicateCallback = Box<dyn FnMut(&LoadSubsetOptions) + Send>;

/// Tracks what coverage a collection has already requested from its sync
/// adapter so a repeated (or narrower) `loadSubset` call can be answered
/// without another round trip.
pub struct SubsetDeduper {
    /// Unlimited (no limit/offset) predicates already fully loaded.
    unlimited_where: Vec<Predicate>,
    has_loaded_all_data: bool,
    limited_calls: Vec<LimitedCall>,
    generation: u64,
    on_deduplicate: Option<DeduplicateCallback>,
}

impl SubsetDeduper {
    pub fn new() -> Self {
        Self {
            unlimited_where: Vec::new(),
            has_loaded_all_data: false,
            limited_calls: Vec::new(),
            generation: 0,
            on_deduplicate: None,
        }
    }

    /// Registers the callback invoked for each request short-circuited by
    /// existing coverage. Only one callback is kept, matching
    /// `subscribe_status`'s single-slot posture in `CollectionCore` —
    /// callers that need fan-out compose it themselves.
    pub fn on_deduplicate(&mut self, callback: impl FnMut(&LoadSubsetOptions) + Send + 'static) {
        self.on_deduplicate = Some(Box::new(callback));
    }

    fn fire_deduplicate(&mut self, options: &LoadSubsetOptions) {
        if let Some(callback) = &mut self.on_deduplicate {
            callback(options);
        }
    }

    /// Marks the collection as having loaded everything; every future
    /// `request` is satisfied without consulting the adapter.
    pub fn mark_all_data_loaded(&mut self) {
        self.has_loaded_all_data = true;
    }

    pub fn request(
        &mut self,
        core: &mut CollectionCore,
        adapter: &mut dyn SyncAdapter,
        options: LoadSubsetOptions,
    ) -> LoadOutcome {
        self.generation += 1;
        let generation = self.generation;

        if self.has_loaded_all_data {
            trace!(collection = %core.id, "loadSubset satisfied: all data already loaded");
            self.fire_deduplicate(&options);
            return LoadOutcome::Satisfied;
        }

        if options.is_unlimited() {
            return self.request_unlimited(core, adapter, options);
        }
        self.request_limited(core, adapter, options, generation)
    }

    fn request_unlimited(
        &mut self,
        core: &mut CollectionCore,
        adapter: &mut dyn SyncAdapter,
        options: LoadSubsetOptions,
    ) -> LoadOutcome {
        if let Some(covering) = self.unlimited_where.iter().find(|p| is_subset(&options.where_, p)) {
            trace!(collection = %core.id, ?covering, "loadSubset satisfied by existing coverage");
            self.fire_deduplicate(&options);
            return LoadOutcome::Satisfied;
        }

        // Shrink the request to what isn't already covered by any single
        // prior predicate, rather than asking for the whole thing again.
        let residual = self
            .unlimited_where
            .iter()
            .fold(options.where_.clone(), |acc, covered| minus(&acc, covered));
        let request = LoadSubsetOptions::unlimited(residual);

        match adapter.load_subset(core, &request) {
            LoadOutcome::Satisfied => {
                self.unlimited_where.push(options.where_);
                LoadOutcome::Satisfied
            }
            LoadOutcome::Pending => {
                self.limited_calls.push(LimitedCall {
                    options: LoadSubsetOptions::unlimited(options.where_),
                    generation: self.generation,
                    settled: false,
                });
                LoadOutcome::Pending
            }
        }
    }

    fn request_limited(
        &mut self,
        core: &mut CollectionCore,
        adapter: &mut dyn SyncAdapter,
        options: LoadSubsetOptions,
        generation: u64,
    ) -> LoadOutcome {
        if let Some(existing) = self.limited_calls.iter().find(|c| c.options.covers(&options)) {
            if existing.settled {
                trace!(collection = %core.id, "loadSubset satisfied: covered by an already-completed limited call");
                self.fire_deduplicate(&options);
                return LoadOutcome::Satisfied;
            }
            trace!(collection = %core.id, "loadSubset deduplicated: covered by an in-flight limited call");
            self.fire_deduplicate(&options);
            return LoadOutcome::Pending;
        }

        self.limited_calls.push(LimitedCall { options: options.clone(), generation, settled: false });
        match adapter.load_subset(core, &options) {
            LoadOutcome::Satisfied => {
                self.settle(&options);
                LoadOutcome::Satisfied
            }
            LoadOutcome::Pending => LoadOutcome::Pending,
        }
    }

    /// Called by an adapter once a `Pending` fetch completes out of band,
    /// so the deduper records the coverage and a stale in-flight entry
    /// from a superseded generation doesn't linger forever.
    pub fn resolve_pending(&mut self, options: &LoadSubsetOptions) {
        if options.is_unlimited() {
            if let Some(pos) = self.limited_calls.iter().position(|c| &c.options == options) {
                let call = self.limited_calls.remove(pos);
                self.unlimited_where.push(call.options.where_);
            }
            return;
        }
        self.settle(options);
    }

    fn settle(&mut self, options: &LoadSubsetOptions) {
        if let Some(call) = self.limited_calls.iter_mut().find(|c| &c.options == options) {
            call.settled = true;
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for SubsetDeduper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Collection, NoopAdapter};
    use rq_core::Value;

    #[test]
    fn repeating_an_already_covered_unlimited_where_skips_the_adapter() {
        let mut col = Collection::new("users", NoopAdapter);
        let first = col.load_subset(LoadSubsetOptions::unlimited(Predicate::Gt(
            "age".into(),
            Value::Int(18),
        )));
        assert_eq!(first, LoadOutcome::Satisfied);

        let narrower = col.load_subset(LoadSubsetOptions::unlimited(Predicate::Gt(
            "age".into(),
            Value::Int(30),
        )));
        assert_eq!(narrower, LoadOutcome::Satisfied);
        assert_eq!(col.deduper.unlimited_where.len(), 1);
    }

    #[test]
    fn identical_limited_calls_deduplicate() {
        let mut col = Collection::new("users", NoopAdapter);
        let opts = LoadSubsetOptions { where_: Predicate::True, order_by: Vec::new(), limit: Some(10), offset: Some(0) };
        col.load_subset(opts.clone());
        assert_eq!(col.deduper.limited_calls.len(), 1);
        col.load_subset(opts);
        assert_eq!(col.deduper.limited_calls.len(), 1);
    }

    #[test]
    fn a_narrower_limit_is_satisfied_by_a_wider_already_loaded_call() {
        // Seed scenario 4: loadSubset({active, limit:10}) then
        // loadSubset({active, limit:5}) — the second must dedup to
        // `Satisfied` without reaching the adapter.
        let mut col = Collection::new("active_users", NoopAdapter);
        let active = Predicate::Eq("active".into(), Value::Bool(true));
        let order_by = vec![OrderByTerm { field: "createdAt".into(), order: SortDirection::Desc }];

        let wide = LoadSubsetOptions { where_: active.clone(), order_by: order_by.clone(), limit: Some(10), offset: None };
        let first = col.load_subset(wide);
        assert_eq!(first, LoadOutcome::Satisfied);
        assert_eq!(col.deduper.limited_calls.len(), 1);

        let narrow = LoadSubsetOptions { where_: active, order_by, limit: Some(5), offset: None };
        let second = col.load_subset(narrow);
        assert_eq!(second, LoadOutcome::Satisfied);
        assert_eq!(col.deduper.limited_calls.len(), 1, "the narrower call must not be forwarded to the adapter");
    }

    #[test]
    fn a_wider_limit_is_not_satisfied_by_a_narrower_already_loaded_call() {
        let mut col = Collection::new("active_users", NoopAdapter);
        let active = Predicate::Eq("active".into(), Value::Bool(true));

        let narrow = LoadSubsetOptions { where_: active.clone(), order_by: Vec::new(), limit: Some(5), offset: None };
        col.load_subset(narrow);
        assert_eq!(col.deduper.limited_calls.len(), 1);

        let wide = LoadSubsetOptions { where_: active, order_by: Vec::new(), limit: Some(10), offset: None };
        col.load_subset(wide);
        assert_eq!(col.deduper.limited_calls.len(), 2, "a wider request needs its own adapter round trip");
    }

    #[test]
    fn on_deduplicate_fires_exactly_for_short_circuited_requests() {
        use std::sync::{Arc, Mutex};

        let mut col = Collection::new("active_users", NoopAdapter);
        let fired = Arc::new(Mutex::new(0u32));
        let fired_handle = fired.clone();
        col.deduper.on_deduplicate(move |_opts| {
            *fired_handle.lock().unwrap() += 1;
        });

        let active = Predicate::Eq("active".into(), Value::Bool(true));
        col.load_subset(LoadSubsetOptions { where_: active.clone(), order_by: Vec::new(), limit: Some(10), offset: None });
        assert_eq!(*fired.lock().unwrap(), 0, "the first, newly-forwarded call is not a dedup");

        col.load_subset(LoadSubsetOptions { where_: active, order_by: Vec::new(), limit: Some(5), offset: None });
        assert_eq!(*fired.lock().unwrap(), 1, "the covered call must fire onDeduplicate exactly once");
    }

    #[test]
    fn all_data_loaded_short_circuits_every_future_request() {
        let mut col = Collection::new("users", NoopAdapter);
        col.deduper.mark_all_data_loaded();
        let outcome = col.load_subset(LoadSubsetOptions::unlimited(Predicate::Gt(
            "age".into(),
            Value::Int(0),
        )));
        assert_eq!(outcome, LoadOutcome::Satisfied);
        assert!(col.deduper.unlimited_where.is_empty());
    }
}
