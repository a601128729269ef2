//! Collaborator port interfaces
//!
//! The host form builder owns settings storage, feed storage, field-value
//! resolution, and entry annotation. The pipeline reaches all of it through
//! these traits only, so the integration core stays testable without a
//! host.

use formlink_domain::{CallAudit, Entry, Feed, Form, IntegrationSettings, Result};

/// Severity of an audit note attached to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSeverity {
    Success,
    Warning,
    Error,
}

/// Resolve a mapped form field to a submission value.
///
/// Implementations handle composite field decomposition (address, name,
/// checkbox groups, phone reformatting) and computed values (form title,
/// submission date, source IP/URL). Must be side-effect free; the
/// submitters may call it any number of times per run.
pub trait FieldValueAccessor: Send + Sync {
    fn value(&self, form: &Form, entry: &Entry, field_id: &str) -> String;
}

/// Append a human-readable audit note to the originating submission entry.
pub trait EntryAnnotator: Send + Sync {
    fn add_note(&self, entry_id: u64, text: &str, severity: NoteSeverity);
}

/// Read-only access to plugin-level integration settings.
pub trait CredentialStore: Send + Sync {
    fn settings(&self) -> Result<IntegrationSettings>;
}

/// Read-only access to stored feed configurations.
pub trait FeedConfigStore: Send + Sync {
    /// Feeds attached to a form, in processing order.
    fn feeds_for_form(&self, form_id: u64) -> Result<Vec<Feed>>;
}

/// Hook receiving the audit record of every transport call, success or
/// failure. Used for external API troubleshooting alongside the structured
/// logs.
pub trait ApiCallObserver: Send + Sync {
    fn on_call(&self, audit: &CallAudit);
}
