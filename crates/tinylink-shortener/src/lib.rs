//! URL shortener service implementation.
//!
//! [`LinkService`] implements [`Shortener`][tinylink_core::Shortener] on top
//! of any [`LinkRepository`][tinylink_core::LinkRepository]. Core types are
//! re-exported from `tinylink_core`.

pub mod deletion;
pub mod service;

pub use deletion::DeletionTask;
pub use service::{LinkService, ServiceSettings};
pub use tinylink_core::{Registration, Shortener, ShortenerError};
