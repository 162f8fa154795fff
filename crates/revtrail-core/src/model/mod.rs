pub mod entity;
pub mod record;

pub use entity::EntityRef;
pub use record::{Attribution, HistoryRecord, Mutation, QueryOptions, SortOrder};
