//! # Component Cache
//!
//! A component's private, read-mostly projection of shared editor state.
//!
//! ## Versioning
//!
//! Every entry remembers the bus clock value (`Envelope::seq` or a
//! late-join `asOf`) it was written at. [`Cache::apply`] refuses writes
//! older than the current entry, so a late-join snapshot that arrives after
//! a newer broadcast cannot roll the field back.
//!
//! Entries written with [`Cache::extend`] (module-specific fields) keep
//! their version untouched.

pub mod mirror;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use shared_types::{AliasTable, KeyTable, ProfileSnapshot};

pub use mirror::{install as install_mirror, MirrorBinding, MIRROR_BINDINGS};

/// Well-known cache keys.
pub mod keys {
    pub const SELECTED_KEY: &str = "selectedKey";
    pub const SELECTED_ALIAS: &str = "selectedAlias";
    pub const CURRENT_ENVIRONMENT: &str = "currentEnvironment";
    pub const CURRENT_PROFILE: &str = "currentProfile";
    pub const PROFILE: &str = "profile";
    pub const KEYS: &str = "keys";
    pub const ALIASES: &str = "aliases";
    pub const PREFERENCES: &str = "preferences";
    pub const ACTIVE_BINDSET: &str = "activeBindset";
    pub const BINDSET_NAMES: &str = "bindsetNames";
}

/// Environment a fresh cache assumes until told otherwise.
pub const DEFAULT_ENVIRONMENT: &str = "space";

/// Bindset every profile starts with.
pub const DEFAULT_BINDSET: &str = "Primary Bindset";

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub version: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cache {
    entries: BTreeMap<String, CacheEntry>,
}

impl Cache {
    /// A cache seeded with the well-known defaults at version 0.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut cache = Self::default();
        cache.seed_defaults();
        cache
    }

    fn defaults() -> [(&'static str, Value); 10] {
        [
            (keys::SELECTED_KEY, Value::Null),
            (keys::SELECTED_ALIAS, Value::Null),
            (keys::CURRENT_ENVIRONMENT, json!(DEFAULT_ENVIRONMENT)),
            (keys::CURRENT_PROFILE, Value::Null),
            (keys::PROFILE, Value::Null),
            (keys::KEYS, json!({})),
            (keys::ALIASES, json!({})),
            (keys::PREFERENCES, json!({})),
            (keys::ACTIVE_BINDSET, json!(DEFAULT_BINDSET)),
            (keys::BINDSET_NAMES, json!([DEFAULT_BINDSET])),
        ]
    }

    /// Insert defaults for well-known keys that are missing. Existing
    /// entries, including module-specific ones, are left alone.
    pub fn seed_defaults(&mut self) {
        for (key, value) in Self::defaults() {
            self.entries
                .entry(key.to_string())
                .or_insert(CacheEntry { value, version: 0 });
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Typed read; `None` when missing, null, or of a different shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .filter(|v| !v.is_null())
            .and_then(|v| T::deserialize(v).ok())
    }

    /// Version the entry was last written at (0 when missing or default).
    #[must_use]
    pub fn version(&self, key: &str) -> u64 {
        self.entries.get(key).map_or(0, |e| e.version)
    }

    /// Versioned write. Returns `false` (and changes nothing) when `version`
    /// is older than the current entry.
    pub fn apply(&mut self, key: &str, value: Value, version: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if version < entry.version => false,
            Some(entry) => {
                entry.value = value;
                entry.version = version;
                true
            }
            None => {
                self.entries
                    .insert(key.to_string(), CacheEntry { value, version });
                true
            }
        }
    }

    /// Merge module-specific fields. Existing versions are kept.
    pub fn extend<I, K>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (key, value) in fields {
            let key = key.into();
            let version = self.version(&key);
            self.entries.insert(key, CacheEntry { value, version });
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -------------------------------------------------------------------------
    // Well-known accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn selected_key(&self) -> Option<String> {
        self.get_as(keys::SELECTED_KEY)
    }

    #[must_use]
    pub fn selected_alias(&self) -> Option<String> {
        self.get_as(keys::SELECTED_ALIAS)
    }

    #[must_use]
    pub fn current_environment(&self) -> String {
        self.get_as(keys::CURRENT_ENVIRONMENT)
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    #[must_use]
    pub fn current_profile(&self) -> Option<String> {
        self.get_as(keys::CURRENT_PROFILE)
    }

    #[must_use]
    pub fn profile(&self) -> Option<ProfileSnapshot> {
        self.get_as(keys::PROFILE)
    }

    #[must_use]
    pub fn keys(&self) -> KeyTable {
        self.get_as(keys::KEYS).unwrap_or_default()
    }

    #[must_use]
    pub fn aliases(&self) -> AliasTable {
        self.get_as(keys::ALIASES).unwrap_or_default()
    }

    #[must_use]
    pub fn preferences(&self) -> Map<String, Value> {
        self.get_as(keys::PREFERENCES).unwrap_or_default()
    }

    #[must_use]
    pub fn active_bindset(&self) -> String {
        self.get_as(keys::ACTIVE_BINDSET)
            .unwrap_or_else(|| DEFAULT_BINDSET.to_string())
    }

    #[must_use]
    pub fn bindset_names(&self) -> Vec<String> {
        self.get_as(keys::BINDSET_NAMES).unwrap_or_default()
    }
}
