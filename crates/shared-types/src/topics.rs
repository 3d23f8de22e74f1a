//! # Topic Schema Registry
//!
//! Each well-known topic is declared once here as a zero-sized marker type
//! that binds its name to its payload type(s). The bus stays string-keyed;
//! the markers let call sites publish, subscribe, request and respond with
//! statically checked payloads.
//!
//! | Marker | Topic | Payload |
//! |--------|-------|---------|
//! | [`SelectionChanged`] | `selection:changed` | [`SelectionPayload`] |
//! | [`EnvironmentChanged`] | `environment:changed` | [`EnvironmentPayload`] |
//! | [`ProfileSwitched`] | `profile:switched` | [`ProfileSwitchPayload`] |
//! | [`ProfileUpdated`] | `profile:updated` | [`ProfileUpdatePayload`] |
//! | [`PreferencesChanged`] | `preferences:changed` | [`PreferencePayload`] |
//! | [`PreferencesLoaded`] | `preferences:loaded` | [`PreferencesPayload`] |
//! | [`PreferencesSaved`] | `preferences:saved` | [`PreferencesPayload`] |
//! | [`BindsetsChanged`] | `bindsets:changed` | [`BindsetListPayload`] |
//! | [`ActiveBindsetChanged`] | `bindset:active-changed` | [`ActiveBindsetPayload`] |
//! | [`ComponentRegister`] | `component:register` | [`RegisterPayload`] |
//! | [`BusDiagnostics`] | `bus:diagnostics` | [`BusDiagnostic`] |

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entities::{
    ActiveBindsetPayload, BindsetListPayload, BusDiagnostic, EnvironmentPayload,
    PreferencePayload, PreferencesPayload, ProfileSwitchPayload, ProfileUpdatePayload,
    RegisterPayload, SelectionPayload,
};

/// A one-to-many topic with a fixed payload schema.
pub trait BroadcastTopic {
    /// Wire name of the topic.
    const NAME: &'static str;
    /// Payload carried by every publish.
    type Payload: Serialize + DeserializeOwned + Send + 'static;
}

/// A request topic with fixed request and response schemas.
pub trait RequestTopic {
    /// Wire name of the topic.
    const NAME: &'static str;
    type Request: Serialize + DeserializeOwned + Send + 'static;
    type Response: Serialize + DeserializeOwned + Send + 'static;
}

macro_rules! broadcast_topic {
    ($(#[$meta:meta])* $marker:ident, $name:literal, $payload:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $marker;

        impl BroadcastTopic for $marker {
            const NAME: &'static str = $name;
            type Payload = $payload;
        }
    };
}

macro_rules! request_topic {
    ($(#[$meta:meta])* $marker:ident, $name:literal, $req:ty => $resp:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $marker;

        impl RequestTopic for $marker {
            const NAME: &'static str = $name;
            type Request = $req;
            type Response = $resp;
        }
    };
}

// =============================================================================
// BROADCAST TOPICS (mirrored into every component cache)
// =============================================================================

broadcast_topic!(
    /// Selected key and/or alias changed.
    SelectionChanged, "selection:changed", SelectionPayload
);
broadcast_topic!(
    /// Active environment changed.
    EnvironmentChanged, "environment:changed", EnvironmentPayload
);
broadcast_topic!(
    /// A different profile became current.
    ProfileSwitched, "profile:switched", ProfileSwitchPayload
);
broadcast_topic!(
    /// The current profile's contents changed.
    ProfileUpdated, "profile:updated", ProfileUpdatePayload
);
broadcast_topic!(
    /// One preference changed.
    PreferencesChanged, "preferences:changed", PreferencePayload
);
broadcast_topic!(PreferencesLoaded, "preferences:loaded", PreferencesPayload);
broadcast_topic!(PreferencesSaved, "preferences:saved", PreferencesPayload);
broadcast_topic!(
    /// The list of known bindsets changed.
    BindsetsChanged, "bindsets:changed", BindsetListPayload
);
broadcast_topic!(
    /// A different bindset became active.
    ActiveBindsetChanged, "bindset:active-changed", ActiveBindsetPayload
);

// =============================================================================
// SUBSTRATE TOPICS
// =============================================================================

broadcast_topic!(
    /// Late-join announcement.
    ComponentRegister, "component:register", RegisterPayload
);
broadcast_topic!(
    /// Failed handler reports.
    BusDiagnostics, "bus:diagnostics", BusDiagnostic
);

// =============================================================================
// REQUEST TOPICS
// =============================================================================

request_topic!(
    /// Ask the selection owner for the current selection.
    GetSelection, "selection:get", () => SelectionPayload
);
request_topic!(
    /// Ask the preferences owner for the full settings map.
    GetPreferences, "preferences:get", () => PreferencesPayload
);

/// Identities of the authoritative owners whose late-join snapshots every
/// component knows how to merge.
pub mod senders {
    pub const SELECTION_SERVICE: &str = "selection-service";
    pub const ENVIRONMENT_SERVICE: &str = "environment-service";
    pub const PROFILE_SERVICE: &str = "profile-service";
    pub const PREFERENCES_SERVICE: &str = "preferences-service";
    pub const BINDSET_SERVICE: &str = "bindset-service";
}
