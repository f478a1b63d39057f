pub mod distinct;
pub mod filter;
pub mod group_by;
pub mod join;
pub mod map;
pub mod top_k;

pub use distinct::DistinctOperator;
pub use filter::FilterOperator;
pub use group_by::GroupByOperator;
pub use join::{JoinKind, JoinOperator};
pub use map::MapOperator;
pub use top_k::TopKOperator;
