//! Core types and traits for the Tinylink URL shortener.
//!
//! This crate provides the domain types, the storage contract every
//! backend implements, the service contract transport adapters call, and
//! the [`Context`] cancellation scope threaded through all of them.

pub mod context;
pub mod error;
pub mod link;
pub mod repository;
pub mod shortcode;
pub mod shortener;
pub mod user;

pub use context::{CancelHandle, Context};
pub use error::{ContextError, CoreError, ShortenerError, StorageError, StorageResultExt};
pub use link::{Link, LinkId};
pub use repository::{LinkRepository, Stats};
pub use shortcode::ShortCode;
pub use shortener::{Registration, Shortener};
pub use user::{User, UserId};
