//! Insert dependency analysis and regrouping

pub mod graph;
pub mod sorter;

pub use graph::{InsertGraph, InsertInfo};
pub use sorter::{sort_inserts, InsertActionSorter, SortOutcome};
