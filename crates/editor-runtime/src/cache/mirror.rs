//! Well-known broadcast topics mirrored into every component cache.
//!
//! The table is declarative: one [`MirrorBinding`] per topic, each naming
//! the cache writer for that topic. Writes are versioned with the
//! envelope's `seq`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_bus::{sync_handler, HandlerResult, InMemoryEventBus, Subscription};
use shared_types::topics::{
    ActiveBindsetChanged, BindsetsChanged, EnvironmentChanged, PreferencesChanged,
    PreferencesLoaded, PreferencesSaved, ProfileSwitched, ProfileUpdated, SelectionChanged,
};
use shared_types::{
    ActiveBindsetPayload, BindsetListPayload, BroadcastTopic, EnvironmentPayload, Envelope,
    PreferencePayload, PreferencesPayload, ProfileSnapshot, ProfileSwitchPayload,
    ProfileUpdatePayload, SelectionPayload,
};
use tracing::trace;

use super::{keys, Cache};

/// Cache writer for one mirrored topic.
pub type MirrorWriter = fn(&mut Cache, &Envelope) -> HandlerResult;

#[derive(Clone, Copy)]
pub struct MirrorBinding {
    pub topic: &'static str,
    pub write: MirrorWriter,
}

pub const MIRROR_BINDINGS: &[MirrorBinding] = &[
    MirrorBinding {
        topic: SelectionChanged::NAME,
        write: write_selection,
    },
    MirrorBinding {
        topic: EnvironmentChanged::NAME,
        write: write_environment,
    },
    MirrorBinding {
        topic: ProfileSwitched::NAME,
        write: write_profile_switch,
    },
    MirrorBinding {
        topic: ProfileUpdated::NAME,
        write: write_profile_update,
    },
    MirrorBinding {
        topic: PreferencesChanged::NAME,
        write: write_preference,
    },
    MirrorBinding {
        topic: PreferencesLoaded::NAME,
        write: write_preferences,
    },
    MirrorBinding {
        topic: PreferencesSaved::NAME,
        write: write_preferences,
    },
    MirrorBinding {
        topic: BindsetsChanged::NAME,
        write: write_bindset_names,
    },
    MirrorBinding {
        topic: ActiveBindsetChanged::NAME,
        write: write_active_bindset,
    },
];

/// Subscribe `cache` to every mirrored topic. The caller owns the returned
/// subscriptions and must release them on teardown.
pub fn install(
    bus: &InMemoryEventBus,
    owner: &str,
    cache: &Arc<RwLock<Cache>>,
) -> Vec<Subscription> {
    MIRROR_BINDINGS
        .iter()
        .map(|binding| {
            let cache = Arc::clone(cache);
            let write = binding.write;
            bus.subscribe_as(
                binding.topic,
                Some(owner),
                sync_handler(move |env| write(&mut cache.write(), &env)),
            )
        })
        .collect()
}

fn write_selection(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let selection: SelectionPayload = env.payload_as()?;
    cache.apply(keys::SELECTED_KEY, json!(selection.key), env.seq);
    cache.apply(keys::SELECTED_ALIAS, json!(selection.alias), env.seq);
    Ok(())
}

fn write_environment(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let payload: EnvironmentPayload = env.payload_as()?;
    cache.apply(keys::CURRENT_ENVIRONMENT, json!(payload.environment), env.seq);
    if let Some(profile) = cache.profile() {
        let table = profile.keys_for(&payload.environment);
        cache.apply(keys::KEYS, json!(table), env.seq);
    }
    Ok(())
}

fn write_profile_switch(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let payload: ProfileSwitchPayload = env.payload_as()?;
    cache.apply(keys::CURRENT_PROFILE, json!(payload.profile_id), env.seq);
    if let Some(environment) = &payload.environment {
        cache.apply(keys::CURRENT_ENVIRONMENT, json!(environment), env.seq);
    }
    // A new profile invalidates whatever was selected in the old one.
    cache.apply(keys::SELECTED_KEY, Value::Null, env.seq);
    cache.apply(keys::SELECTED_ALIAS, Value::Null, env.seq);
    if let Some(profile) = &payload.profile {
        write_profile_body(cache, profile, env.seq);
    }
    Ok(())
}

fn write_profile_update(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let payload: ProfileUpdatePayload = env.payload_as()?;
    match cache.current_profile() {
        Some(current) if current != payload.profile_id => {
            trace!(profile = %payload.profile_id, "Ignoring update for inactive profile");
        }
        _ => {
            cache.apply(keys::CURRENT_PROFILE, json!(payload.profile_id), env.seq);
            write_profile_body(cache, &payload.profile, env.seq);
        }
    }
    Ok(())
}

/// Write `profile`, plus its aliases and the key table for the cached
/// environment.
pub(crate) fn write_profile_body(cache: &mut Cache, profile: &ProfileSnapshot, version: u64) {
    let environment = cache.current_environment();
    cache.apply(keys::PROFILE, json!(profile), version);
    cache.apply(keys::ALIASES, json!(profile.aliases), version);
    cache.apply(keys::KEYS, json!(profile.keys_for(&environment)), version);
}

fn write_preference(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let payload: PreferencePayload = env.payload_as()?;
    let mut settings = cache.preferences();
    settings.insert(payload.key, payload.value);
    cache.apply(keys::PREFERENCES, Value::Object(settings), env.seq);
    Ok(())
}

fn write_preferences(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let payload: PreferencesPayload = env.payload_as()?;
    cache.apply(keys::PREFERENCES, Value::Object(payload.settings), env.seq);
    Ok(())
}

fn write_bindset_names(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let payload: BindsetListPayload = env.payload_as()?;
    cache.apply(keys::BINDSET_NAMES, json!(payload.names), env.seq);
    Ok(())
}

fn write_active_bindset(cache: &mut Cache, env: &Envelope) -> HandlerResult {
    let payload: ActiveBindsetPayload = env.payload_as()?;
    cache.apply(keys::ACTIVE_BINDSET, json!(payload.bindset), env.seq);
    Ok(())
}
