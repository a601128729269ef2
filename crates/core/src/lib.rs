//! # Formlink Core
//!
//! Port interfaces between the submission pipeline and its host.
//!
//! This crate contains:
//! - Collaborator traits the host form builder implements
//! - No database, HTTP, or platform code
//!
//! ## Architecture Principles
//! - Only depends on `formlink-domain`
//! - All external collaborators are reached via traits

pub mod ports;

pub use ports::{
    ApiCallObserver, CredentialStore, EntryAnnotator, FeedConfigStore, FieldValueAccessor,
    NoteSeverity,
};
