pub mod counts;
pub mod list;
pub mod reconcile;
pub mod wait;
