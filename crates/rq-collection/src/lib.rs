//! Keyed collection store, subset-load deduplication, and cross-collection
//! union (spec §4.8, §4.9, §4.11) — the layer a live query is compiled
//! against but that knows nothing about queries itself.

pub mod change;
pub mod collection;
pub mod predicate;
pub mod subscription;
pub mod subset_dedup;
pub mod union;

pub use change::{Change, ChangeKind};
pub use collection::{Collection, CollectionCore, LoadOutcome, NoopAdapter, Status, SyncAdapter};
pub use predicate::Predicate;
pub use subscription::{ChangeCallback, StatusCallback, SubscriptionId, SubscriptionManager};
pub use subset_dedup::{DeduplicateCallback, LoadSubsetOptions, OrderByTerm, SortDirection, SubsetDeduper};
pub use union::UnionCollection;
