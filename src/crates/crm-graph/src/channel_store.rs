//! Runtime container for a graph's channels.

use crate::error::{GraphError, Result};
use crate::node_result::ChannelUpdates;
use crm_checkpoint::{Channel, ChannelVersion, ChannelVersions};
use std::collections::HashMap;

/// The live set of channels a compiled graph threads through node execution.
///
/// Each channel is a boxed `crm_checkpoint::Channel`, so the merge semantics
/// (last-value, append, custom reducer) are defined once in `crm-checkpoint`
/// and reused here without the graph engine knowing anything domain-specific.
pub struct ChannelStore {
    channels: HashMap<String, Box<dyn Channel>>,
    versions: ChannelVersions,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            versions: HashMap::new(),
        }
    }

    /// Register a channel under `name`. Call once per channel when building
    /// the initial state; `apply` only ever updates channels that exist.
    pub fn register(&mut self, name: impl Into<String>, channel: Box<dyn Channel>) {
        let name = name.into();
        self.versions
            .entry(name.clone())
            .or_insert(ChannelVersion::Int(0));
        self.channels.insert(name, channel);
    }

    pub fn get_json(&self, name: &str) -> Result<serde_json::Value> {
        self.channels
            .get(name)
            .ok_or_else(|| GraphError::Execution(format!("unknown channel: {name}")))?
            .get()
            .map_err(GraphError::Channel)
    }

    pub fn try_get_json(&self, name: &str) -> Option<serde_json::Value> {
        self.channels.get(name).and_then(|c| c.get().ok())
    }

    pub fn has(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Apply a batch of writes produced by a node, bumping the version of
    /// every channel actually touched and returning their names.
    pub fn apply(&mut self, updates: &ChannelUpdates) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for (name, value) in updates {
            let channel = self
                .channels
                .get_mut(name)
                .ok_or_else(|| GraphError::Execution(format!("unknown channel: {name}")))?;
            if channel.update(vec![value.clone()]).map_err(GraphError::Channel)? {
                let version = self
                    .versions
                    .entry(name.clone())
                    .or_insert(ChannelVersion::Int(0));
                *version = version.next();
                touched.push(name.clone());
            }
        }
        Ok(touched)
    }

    /// Snapshot every channel's current value, keyed by channel name.
    pub fn snapshot(&self) -> Result<HashMap<String, serde_json::Value>> {
        let mut out = HashMap::new();
        for (name, channel) in &self.channels {
            if let Ok(value) = channel.get() {
                out.insert(name.clone(), value);
            }
        }
        Ok(out)
    }

    pub fn versions(&self) -> &ChannelVersions {
        &self.versions
    }

    /// Restore channel values from a checkpoint's `channel_values`, leaving
    /// unregistered channel names untouched (they simply stay empty).
    pub fn restore(&mut self, values: &HashMap<String, serde_json::Value>) -> Result<()> {
        for (name, value) in values {
            if let Some(channel) = self.channels.get_mut(name) {
                channel
                    .from_checkpoint(value.clone())
                    .map_err(GraphError::Channel)?;
            }
        }
        Ok(())
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_checkpoint::LastValueChannel;
    use serde_json::json;

    #[test]
    fn apply_bumps_version_only_on_actual_write() {
        let mut store = ChannelStore::new();
        store.register("response", Box::new(LastValueChannel::new()));

        let mut updates = ChannelUpdates::new();
        updates.insert("response".into(), json!("hello"));
        let touched = store.apply(&updates).unwrap();
        assert_eq!(touched, vec!["response".to_string()]);
        assert_eq!(store.get_json("response").unwrap(), json!("hello"));
    }

    #[test]
    fn apply_to_unknown_channel_errors() {
        let mut store = ChannelStore::new();
        let mut updates = ChannelUpdates::new();
        updates.insert("nope".into(), json!(1));
        assert!(store.apply(&updates).is_err());
    }

    #[test]
    fn restore_round_trips_through_snapshot() {
        let mut store = ChannelStore::new();
        store.register("count", Box::new(LastValueChannel::new()));
        let mut updates = ChannelUpdates::new();
        updates.insert("count".into(), json!(3));
        store.apply(&updates).unwrap();

        let snap = store.snapshot().unwrap();

        let mut restored = ChannelStore::new();
        restored.register("count", Box::new(LastValueChannel::new()));
        restored.restore(&snap).unwrap();
        assert_eq!(restored.get_json("count").unwrap(), json!(3));
    }
}
