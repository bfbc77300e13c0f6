//! Review and summary store implementations.
//!
//! `SqliteStore` is the on-disk backend used by the binary. `MemoryStore`
//! keeps everything in process, for tests and for embedders that load
//! reviews from elsewhere.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
