//! Multiset and keyed-index primitives underlying the IVM operators.

pub mod index;
pub mod multiset;

pub use index::Index;
pub use multiset::Multiset;
