//! Core domain models
//!
//! This module defines the workflow model, the builder that produces it
//! from a parsed document, diagnostics, and the lint policy.

pub mod builder;
pub mod config;
pub mod diagnostic;
pub mod document;
pub mod model;

pub use builder::{build_model, ModelError};
pub use config::{LintPolicy, PolicyError};
pub use diagnostic::*;
pub use document::{discover, load_directory, Document, DocumentError, ExcludedDocument, LoadError, LoadedDocument};
pub use model::*;
