//! Storage backends for the Tinylink URL shortener.
//!
//! Three interchangeable implementations of
//! [`LinkRepository`][tinylink_core::LinkRepository]:
//!
//! - [`InMemoryRepository`]: a map behind a reader/writer lock, volatile.
//! - [`FileRepository`]: one JSON document rewritten on every mutation.
//! - [`PostgresRepository`]: a relational table with transactional batches.
//!
//! [`Backend`] wraps whichever one [`StorageConfig`] selects at start-up.

pub mod backend;
pub mod file;
pub mod memory;
pub mod postgres;

pub use backend::{Backend, BackendKind, StorageConfig};
pub use file::FileRepository;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use tinylink_core::{LinkRepository, StorageError};
