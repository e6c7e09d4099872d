//! File-backed task store library.
//!
//! Tasks are markdown documents with a YAML header, organised on disk by
//! workflow state. This crate exports the path resolution engine, id and
//! sequence generation, the document model and the workflow state store.

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod format;
pub mod identity;
pub mod paths;
pub mod store;
pub mod types;
