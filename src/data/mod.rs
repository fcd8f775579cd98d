//! Form value storage

mod array;
pub mod path;
mod store;

pub use path::{parse_path, Segment};
pub use store::{DataChange, PathStore, Snapshot, SubscriberId};
