//! # Late-Join Protocol
//!
//! A component that initializes after its peers have already broadcast
//! state asks them for it:
//!
//! ```text
//! newcomer                         bus                         peer (live)
//!    │ subscribe(component:register)│                              │
//!    │ subscribe(reply topic)       │                              │
//!    │ publish {name, replyTopic} ─▶│── component:register ───────▶│
//!    │                              │◀── {sender, state, asOf} ────│
//!    │◀── reply topic ──────────────│                              │
//!    │ interpret + merge_peer_state │                              │
//! ```
//!
//! Replies are merged one by one as they arrive; zero replies is fine.
//! Well-known senders are interpreted here and written to the cache with
//! `asOf` as the version, so a reply never overwrites a field a newer
//! broadcast already set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shared_bus::sync_handler;
use shared_types::topics::{senders, ComponentRegister};
use shared_types::{BroadcastTopic, LateJoinReply, ProfileSnapshot, RegisterPayload};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::cache::{keys, mirror, Cache};
use crate::component::{Component, LifecycleState, Shared};

/// State published by the selection service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    #[serde(default)]
    pub selected_key: Option<String>,
    #[serde(default)]
    pub selected_alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentState {
    pub environment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileState {
    #[serde(default)]
    pub current_profile: Option<String>,
    #[serde(default)]
    pub profile: Option<ProfileSnapshot>,
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesState {
    #[serde(default)]
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindsetState {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub active: Option<String>,
}

/// Apply a reply from a well-known sender to `cache`.
///
/// Returns how many fields were written. Unknown senders, null states and
/// undecodable states write nothing.
pub fn interpret(cache: &mut Cache, reply: &LateJoinReply) -> usize {
    if reply.state.is_null() {
        return 0;
    }
    let as_of = reply.as_of;
    let state = &reply.state;

    let written = match reply.sender.as_str() {
        senders::SELECTION_SERVICE => decode::<SelectionState>(reply).map(|s| {
            [
                cache.apply(keys::SELECTED_KEY, json!(s.selected_key), as_of),
                cache.apply(keys::SELECTED_ALIAS, json!(s.selected_alias), as_of),
            ]
            .into_iter()
            .filter(|w| *w)
            .count()
        }),
        senders::ENVIRONMENT_SERVICE => decode::<EnvironmentState>(reply).map(|s| {
            let mut written = usize::from(cache.apply(
                keys::CURRENT_ENVIRONMENT,
                json!(s.environment),
                as_of,
            ));
            if let Some(profile) = cache.profile() {
                written += usize::from(cache.apply(
                    keys::KEYS,
                    json!(profile.keys_for(&s.environment)),
                    as_of,
                ));
            }
            written
        }),
        senders::PROFILE_SERVICE => decode::<ProfileState>(reply).map(|s| {
            let mut written = 0;
            if let Some(environment) = s.environment {
                written += usize::from(cache.apply(keys::CURRENT_ENVIRONMENT, json!(environment), as_of));
            }
            if let Some(id) = s.current_profile {
                written += usize::from(cache.apply(keys::CURRENT_PROFILE, json!(id), as_of));
            }
            if let Some(profile) = &s.profile {
                let before = cache.version(keys::PROFILE);
                mirror::write_profile_body(cache, profile, as_of);
                written += usize::from(as_of >= before);
            }
            written
        }),
        senders::PREFERENCES_SERVICE => decode::<PreferencesState>(reply).map(|s| {
            usize::from(cache.apply(keys::PREFERENCES, Value::Object(s.settings), as_of))
        }),
        senders::BINDSET_SERVICE => decode::<BindsetState>(reply).map(|s| {
            let mut written = 0;
            if !s.names.is_empty() {
                written += usize::from(cache.apply(keys::BINDSET_NAMES, json!(s.names), as_of));
            }
            if let Some(active) = s.active {
                written += usize::from(cache.apply(keys::ACTIVE_BINDSET, json!(active), as_of));
            }
            written
        }),
        other => {
            trace!(sender = %other, "No built-in interpretation for late-join sender");
            Some(0)
        }
    };

    written.unwrap_or_else(|| {
        warn!(sender = %reply.sender, state = %state, "Undecodable late-join state ignored");
        0
    })
}

fn decode<T: serde::de::DeserializeOwned>(reply: &LateJoinReply) -> Option<T> {
    T::deserialize(&reply.state).ok()
}

/// Subscribe to announcements and to a private reply topic, then announce.
pub(crate) fn install<C: Component>(shared: &Arc<Shared<C>>) {
    let ctx = &shared.ctx;
    let name = ctx.name().to_string();
    let reply_topic = format!("{}::late-join::{}::{}", ComponentRegister::NAME, name, Uuid::new_v4());

    let weak = Arc::downgrade(shared);
    ctx.subscribe_topic::<ComponentRegister, _>(move |announce, _| {
        if let Some(shared) = weak.upgrade() {
            answer(&shared, &announce);
        }
        Ok(())
    });

    let weak = Arc::downgrade(shared);
    ctx.subscribe(
        &reply_topic,
        sync_handler(move |env| {
            let reply: LateJoinReply = env.payload_as()?;
            if let Some(shared) = weak.upgrade() {
                merge_reply(&shared, &reply);
            }
            Ok(())
        }),
    );

    let announce = RegisterPayload { name, reply_topic };
    match ctx.publish_event::<ComponentRegister>(&announce) {
        Ok(peers) => debug!(component = %announce.name, peers, "Late-join announced"),
        Err(e) => warn!(component = %announce.name, error = %e, "Late-join announcement failed"),
    }
}

fn answer<C: Component>(shared: &Shared<C>, announce: &RegisterPayload) {
    let ctx = &shared.ctx;
    if announce.name == ctx.name() || !ctx.is_live() {
        return;
    }

    let reply = LateJoinReply {
        sender: ctx.name().to_string(),
        state: shared.component.current_state(ctx).unwrap_or(Value::Null),
        as_of: ctx.bus().current_seq(),
    };
    match serde_json::to_value(&reply) {
        Ok(value) => {
            ctx.publish(&announce.reply_topic, value);
            debug!(component = %ctx.name(), newcomer = %announce.name, as_of = reply.as_of, "Late-join reply sent");
        }
        Err(e) => warn!(component = %ctx.name(), error = %e, "Failed to encode late-join reply"),
    }
}

fn merge_reply<C: Component>(shared: &Shared<C>, reply: &LateJoinReply) {
    let ctx = &shared.ctx;
    if ctx.lifecycle() == LifecycleState::Destroyed {
        return;
    }
    if reply.state.is_null() {
        trace!(component = %ctx.name(), sender = %reply.sender, "Stateless peer reply");
        return;
    }

    let written = interpret(&mut ctx.cache_mut(), reply);
    debug!(
        component = %ctx.name(),
        sender = %reply.sender,
        as_of = reply.as_of,
        written,
        "Late-join reply merged"
    );
    shared.component.merge_peer_state(ctx, reply);
}
