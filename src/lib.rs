//! Batch journal-entry analysis: normalize imported spreadsheet rows, partition
//! them into balanced entries, validate each entry against a client's chart of
//! accounts and dimensions, and attach advisory suggestions.
//!
//! The crate only reads reference data. Nothing is created, posted or approved.

pub mod assembler;
pub mod cache;
pub mod error;
pub mod fmt;
pub mod grouper;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod reference;
pub mod reference_db;
pub mod settings;
pub mod suggester;
pub mod validator;

pub use error::{BatchError, Result};
pub use models::{BatchAnalysisResult, RawImportRow};
pub use pipeline::{analyze_batch, AnalyzeOptions};
pub use reference::{ReferenceData, ReferenceSnapshot, ResolveError};
pub use reference_db::SqliteReference;
