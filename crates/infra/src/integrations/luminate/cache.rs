//! Catalog caches for slow remote listings.
//!
//! The constituent field catalog and the group list change rarely and are
//! expensive to pull (the group listing pages through the whole account),
//! so both sit behind moka caches with long TTLs.

use std::sync::Arc;
use std::time::Duration;

use formlink_domain::{FieldMapping, GroupInfo};
use moka::sync::Cache;

/// TTL for the constituent field catalog (one week).
pub const FIELD_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// TTL for the group list (four weeks).
pub const GROUP_CACHE_TTL: Duration = Duration::from_secs(28 * 24 * 60 * 60);

const FIELDS_KEY: &str = "constituent_fields";
const GROUPS_KEY: &str = "groups";

/// In-memory caches shared by the field map resolver.
pub struct LuminateCaches {
    fields: Cache<&'static str, Arc<Vec<FieldMapping>>>,
    groups: Cache<&'static str, Arc<Vec<GroupInfo>>>,
}

impl LuminateCaches {
    pub fn new() -> Self {
        Self::with_ttls(FIELD_CACHE_TTL, GROUP_CACHE_TTL)
    }

    /// Custom TTLs, for tests.
    pub fn with_ttls(field_ttl: Duration, group_ttl: Duration) -> Self {
        Self {
            fields: Cache::builder().time_to_live(field_ttl).max_capacity(1).build(),
            groups: Cache::builder().time_to_live(group_ttl).max_capacity(1).build(),
        }
    }

    pub fn fields(&self) -> Option<Arc<Vec<FieldMapping>>> {
        self.fields.get(FIELDS_KEY)
    }

    pub fn store_fields(&self, fields: Vec<FieldMapping>) -> Arc<Vec<FieldMapping>> {
        let fields = Arc::new(fields);
        self.fields.insert(FIELDS_KEY, fields.clone());
        fields
    }

    pub fn invalidate_fields(&self) {
        self.fields.invalidate(FIELDS_KEY);
    }

    pub fn groups(&self) -> Option<Arc<Vec<GroupInfo>>> {
        self.groups.get(GROUPS_KEY)
    }

    pub fn store_groups(&self, groups: Vec<GroupInfo>) -> Arc<Vec<GroupInfo>> {
        let groups = Arc::new(groups);
        self.groups.insert(GROUPS_KEY, groups.clone());
        groups
    }
}

impl Default for LuminateCaches {
    fn default() -> Self {
        Self::new()
    }
}
