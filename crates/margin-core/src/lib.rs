//! # margin-core
//!
//! Core types, validation and formatting for the margin highlight sync
//! pipeline.
//!
//! This crate has no network side effects. It provides:
//! - Source and delivery data models
//! - Highlight validation rules
//! - Deterministic Markdown rendering
//! - Stage execution deadlines
//! - The [`NoteSink`] seam implemented by sink clients

pub mod deadline;
pub mod defaults;
pub mod error;
pub mod formatting;
pub mod models;
pub mod traits;
pub mod validation;

pub use deadline::Deadline;
pub use error::{Error, Result};
pub use formatting::{format_batch, format_date, format_grouped_by_book, format_highlight};
pub use models::*;
pub use traits::NoteSink;
pub use validation::{validate_batch, validate_highlight};
