//! # Payload Entities
//!
//! Payload shapes of the well-known broadcast and request topics.
//!
//! ## Clusters
//!
//! - **Editor state**: selection, environment, profile, preferences, bindsets
//! - **Substrate**: late-join announcement/reply, bus diagnostics
//!
//! The schemas here are only the parts the coordination substrate reads.
//! Owners of each topic may send additional fields; unknown fields are
//! ignored on deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// CLUSTER A: EDITOR STATE
// =============================================================================

/// Command list bound to one key or alias.
pub type CommandList = Vec<String>;

/// Key name → bound commands.
pub type KeyTable = BTreeMap<String, CommandList>;

/// One alias definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasDef {
    /// Commands the alias expands to.
    #[serde(default)]
    pub commands: CommandList,
    /// Free-form description shown in the editor.
    #[serde(default)]
    pub description: String,
}

/// Alias name → definition.
pub type AliasTable = BTreeMap<String, AliasDef>;

/// Per-environment key bindings of a profile.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    #[serde(default)]
    pub keys: KeyTable,
}

/// Snapshot of a profile as broadcast by the profile owner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    /// Stable profile id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Environment name (e.g. `space`, `ground`) → bindings.
    #[serde(default)]
    pub builds: BTreeMap<String, Build>,
    /// Aliases shared by all environments.
    #[serde(default)]
    pub aliases: AliasTable,
}

impl ProfileSnapshot {
    /// Key table for an environment; empty if the profile has no build for it.
    #[must_use]
    pub fn keys_for(&self, environment: &str) -> KeyTable {
        self.builds
            .get(environment)
            .map(|b| b.keys.clone())
            .unwrap_or_default()
    }
}

/// `selection:changed` payload. Either side may be absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPayload {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

/// `environment:changed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentPayload {
    pub environment: String,
}

/// `profile:switched` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSwitchPayload {
    pub profile_id: String,
    #[serde(default)]
    pub profile: Option<ProfileSnapshot>,
    /// Environment the switched-to profile opens in, if it changed.
    #[serde(default)]
    pub environment: Option<String>,
}

/// `profile:updated` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdatePayload {
    pub profile_id: String,
    pub profile: ProfileSnapshot,
}

/// `preferences:changed` payload: a single setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencePayload {
    pub key: String,
    pub value: Value,
}

/// `preferences:loaded` / `preferences:saved` payload: the full settings map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPayload {
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// `bindsets:changed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindsetListPayload {
    #[serde(default)]
    pub names: Vec<String>,
}

/// `bindset:active-changed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBindsetPayload {
    pub bindset: String,
}

// =============================================================================
// CLUSTER B: SUBSTRATE
// =============================================================================

/// Announcement a starting component publishes on `component:register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    /// Identity of the newcomer.
    pub name: String,
    /// Private topic peers must answer on.
    pub reply_topic: String,
}

/// A peer's answer to a [`RegisterPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LateJoinReply {
    /// Identity of the answering peer.
    pub sender: String,
    /// Peer's current-state snapshot; `null` for stateless peers.
    #[serde(default)]
    pub state: Value,
    /// Bus clock at the moment the snapshot was taken.
    pub as_of: u64,
}

/// Report of a failed handler, published on `bus:diagnostics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusDiagnostic {
    pub topic: String,
    pub seq: u64,
    pub subscription: u64,
    pub owner: Option<String>,
    pub error: String,
}
