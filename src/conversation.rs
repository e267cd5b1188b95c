//! In-memory state of guided-insert conversations
//!
//! Entries live in a sharded concurrent map. Operations on one conversation
//! run under that entry's shard lock, so a retried request cannot interleave
//! with the update it retries. Conversations untouched for longer than the
//! configured time-to-live behave as if they never existed and are dropped by
//! [`ConversationStore::evict_expired`].

use crate::error::{AssistantError, Result};
use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueState {
    pub conversation_id: String,
    pub table_name: String,
    pub collected_values: Map<String, Value>,
}

#[derive(Debug)]
struct Entry {
    state: DialogueState,
    touched: Instant,
}

impl Entry {
    fn fresh(id: &str, table: &str, values: Map<String, Value>) -> Self {
        Self {
            state: DialogueState {
                conversation_id: id.to_string(),
                table_name: table.to_string(),
                collected_values: values,
            },
            touched: Instant::now(),
        }
    }
}

pub struct ConversationStore {
    entries: DashMap<String, Entry>,
    ttl: Option<Duration>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(None)
    }
}

pub fn new_conversation_id() -> String {
    format!("conv-{}", Uuid::new_v4())
}

impl ConversationStore {
    /// `ttl = None` keeps conversations until they are finalized.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn expired(ttl: Option<Duration>, entry: &Entry) -> bool {
        ttl.map_or(false, |ttl| entry.touched.elapsed() >= ttl)
    }

    fn not_found(id: &str) -> AssistantError {
        AssistantError::ConversationNotFound(id.to_string())
    }

    /// Start (or restart) a conversation for `table`.
    pub fn create(&self, id: &str, table: &str) {
        self.entries.insert(id.to_string(), Entry::fresh(id, table, Map::new()));
        info!("Conversation {} started for {}", id, table);
    }

    /// Merge `values` into the live conversation for `table`, starting it if
    /// it is absent or expired. Lookup and write share one entry lock.
    /// A live conversation for another table is left untouched and rejected.
    pub fn upsert(&self, id: &str, table: &str, values: &Map<String, Value>) -> Result<DialogueState> {
        let ttl = self.ttl;
        match self.entries.entry(id.to_string()) {
            Slot::Occupied(mut occupied) if !Self::expired(ttl, occupied.get()) => {
                let entry = occupied.get_mut();
                if entry.state.table_name != table {
                    return Err(AssistantError::InvalidRequest(format!(
                        "Conversation {} is collecting values for {}, not {}",
                        id, entry.state.table_name, table
                    )));
                }
                entry.touched = Instant::now();
                for (field, value) in values {
                    entry.state.collected_values.insert(field.clone(), value.clone());
                }
                Ok(entry.state.clone())
            }
            Slot::Occupied(mut occupied) => {
                let entry = Entry::fresh(id, table, values.clone());
                let state = entry.state.clone();
                occupied.insert(entry);
                debug!("Conversation {} expired, restarted for {}", id, table);
                Ok(state)
            }
            Slot::Vacant(vacant) => {
                let entry = Entry::fresh(id, table, values.clone());
                let state = entry.state.clone();
                vacant.insert(entry);
                info!("Conversation {} started for {}", id, table);
                Ok(state)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<DialogueState> {
        self.with_entry(id, |state| state.clone())
    }

    pub fn set_value(&self, id: &str, field: &str, value: Value) -> Result<()> {
        self.with_entry(id, |state| {
            state.collected_values.insert(field.to_string(), value);
        })?;
        debug!("Conversation {}: collected {}", id, field);
        Ok(())
    }

    /// Remove the conversation and hand back what it collected.
    pub fn finalize(&self, id: &str) -> Result<(String, Map<String, Value>)> {
        let ttl = self.ttl;
        match self.entries.remove_if(id, |_, entry| !Self::expired(ttl, entry)) {
            Some((_, entry)) => {
                info!("Conversation {} finalized", id);
                Ok((entry.state.table_name, entry.state.collected_values))
            }
            None => {
                self.entries.remove_if(id, |_, entry| Self::expired(ttl, entry));
                Err(Self::not_found(id))
            }
        }
    }

    /// Drop every expired conversation; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.ttl;
        if ttl.is_none() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|_, entry| !Self::expired(ttl, entry));
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            info!("Evicted {} abandoned conversations", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `f` on a live entry under its lock, refreshing its last-touched time.
    fn with_entry<T>(&self, id: &str, f: impl FnOnce(&mut DialogueState) -> T) -> Result<T> {
        let ttl = self.ttl;
        {
            let mut entry = self.entries.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            if !Self::expired(ttl, &entry) {
                entry.touched = Instant::now();
                return Ok(f(&mut entry.state));
            }
        }
        self.entries.remove_if(id, |_, entry| Self::expired(ttl, entry));
        debug!("Conversation {} expired", id);
        Err(Self::not_found(id))
    }
}
