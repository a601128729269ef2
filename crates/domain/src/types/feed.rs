//! Submission-event carriers: form, entry, and feed configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A form definition as exposed by the host form builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Form {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl Form {
    pub fn field(&self, field_id: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.id == field_id)
    }
}

/// One field of a form definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

/// One submitted entry of a form. Field values are resolved through the
/// `FieldValueAccessor` port, never read from here directly by the
/// submitters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entry {
    pub id: u64,
    /// Raw values keyed by form field id.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// A stored mapping configuration connecting one form to one or more CRM
/// submission types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feed {
    pub id: u64,
    pub form_id: u64,
    #[serde(default)]
    pub meta: FeedMeta,
}

/// Feed configuration flags and field maps.
///
/// The host stores boolean flags as `"1"`/`"0"` strings; deserialization
/// accepts both spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedMeta {
    /// Push mapped fields to a constituent record.
    #[serde(default, with = "host_flag")]
    pub constituent: bool,
    /// Assign the constituent to the selected groups after a successful
    /// create-or-update.
    #[serde(default, with = "host_flag")]
    pub group: bool,
    /// Submit a survey response.
    #[serde(default, with = "host_flag")]
    pub survey: bool,
    /// Mappable constituent field name -> form field id.
    #[serde(default)]
    pub mapped_fields: BTreeMap<String, String>,
    /// Mappable survey field name -> form field id.
    #[serde(default)]
    pub survey_mapped_fields: BTreeMap<String, String>,
    /// Selected survey id, when the survey mapping is in use.
    #[serde(default)]
    pub survey_id: Option<String>,
    /// Group selections keyed by numeric group id, flagged "1" or "0".
    #[serde(default)]
    pub group_selections: BTreeMap<String, String>,
}

impl FeedMeta {
    /// Group ids flagged for assignment. Only integer-valued keys count;
    /// anything else in the selection map is host bookkeeping.
    pub fn selected_group_ids(&self) -> Vec<&str> {
        self.group_selections
            .iter()
            .filter(|(id, flag)| {
                flag.as_str() == "1"
                    && !id.is_empty()
                    && id.chars().all(|c| c.is_ascii_digit())
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Serde helpers for the host's `"1"`/`"0"` flag encoding.
mod host_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "1" } else { "0" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Bool(bool),
            Text(String),
            Number(i64),
        }

        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(value) => value,
            Flag::Text(value) => value == "1" || value.eq_ignore_ascii_case("true"),
            Flag::Number(value) => value != 0,
        })
    }
}
