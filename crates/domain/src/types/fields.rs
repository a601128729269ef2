//! Field catalog entries and the mappable-name escape.

use serde::{Deserialize, Serialize};

/// Sentinel substituted for periods in field names.
///
/// The host's field-map storage cannot round-trip periods in mapped field
/// names (e.g. `email.primary_address`), so names are escaped on the way in
/// and reversed on the way out. The substitution must stay a bijection for
/// every name in use; real Luminate field names never contain this
/// sequence.
pub const DOT_SENTINEL: &str = "__dot__";

/// Escape a Luminate field name into a host-safe mappable name.
pub fn mappable_field_name(name: &str) -> String {
    name.replace('.', DOT_SENTINEL)
}

/// Reverse of [`mappable_field_name`].
pub fn luminate_field_name(name: &str) -> String {
    name.replace(DOT_SENTINEL, ".")
}

/// One mappable field of the constituent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Host-safe mappable name (escaped).
    pub name: String,
    /// Display label shown in the mapping UI.
    pub label: String,
    #[serde(default)]
    pub required: bool,
}

/// One CRM group available for membership mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
}
