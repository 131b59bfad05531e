//! Client-side cache of the current chat session and the paginated chat
//! session index, with optimistic delete/rollback and Today/Recent/Past
//! grouping.
//!
//! Generalized from `turbomcp-client::resources::ResourceCache` (a bounded
//! LRU-ish cache with an index kept separate from hydrated entries), from
//! resource URIs to chat session records.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use rtagent_core::{group_for, ChatSessionEntry, EventBus, SessionGroup};

#[derive(Debug, Default)]
struct State {
    current_session_id: Option<String>,
    current_session_payload: Value,
    index: VecDeque<ChatSessionEntry>,
    /// Ids removed optimistically (before the server confirms), so a late
    /// `chat_session_changed`/index refresh naming them again can be
    /// suppressed until the server explicitly re-adds them.
    tombstoned: Vec<String>,
}

/// Grouped view of the session index, mirroring how the UI renders the
/// session list.
#[derive(Debug, Clone, Default)]
pub struct GroupedSessions {
    /// Sessions last touched today.
    pub today: Vec<ChatSessionEntry>,
    /// Sessions touched within the recent window (including defensively
    /// folded far-future timestamps).
    pub recent: Vec<ChatSessionEntry>,
    /// Everything older.
    pub past: Vec<ChatSessionEntry>,
}

/// Caches the current chat session and a bounded index of known sessions,
/// emitting `chat_session_changed`/`session_deleted`/`session_restored`
/// notifications on the shared [`EventBus`].
pub struct SessionStore {
    bus: Arc<EventBus>,
    max_cached: usize,
    state: Mutex<State>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("session store lock poisoned");
        f.debug_struct("SessionStore")
            .field("current_session_id", &state.current_session_id)
            .field("indexed", &state.index.len())
            .field("max_cached", &self.max_cached)
            .finish()
    }
}

impl SessionStore {
    /// Creates an empty store bounded to `max_cached` index entries.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, max_cached: usize) -> Self {
        Self {
            bus,
            max_cached: max_cached.max(1),
            state: Mutex::new(State::default()),
        }
    }

    /// The currently active chat session id, if any.
    #[must_use]
    pub fn current_chat_session_id(&self) -> Option<String> {
        self.state.lock().expect("session store lock poisoned").current_session_id.clone()
    }

    /// Sets the current session and emits `chat_session_changed` with the
    /// raw server payload, for apps that want fields this SDK doesn't model.
    pub fn set_current_session(&self, session_id: Option<String>, payload: Value) {
        {
            let mut state = self.state.lock().expect("session store lock poisoned");
            state.current_session_id = session_id.clone();
            state.current_session_payload = payload.clone();
        }
        self.bus.emit("chat_session_changed", &payload);
    }

    /// Replaces the index with a fresh page from `get_user_sessions`,
    /// trimming to `max_cached` (oldest-by-insertion dropped first) and
    /// re-honoring any still-relevant tombstones.
    pub fn apply_index_page(&self, entries: Vec<ChatSessionEntry>) {
        let mut state = self.state.lock().expect("session store lock poisoned");
        for entry in entries {
            if state.tombstoned.contains(&entry.session_id) {
                continue;
            }
            if let Some(pos) = state.index.iter().position(|e| e.session_id == entry.session_id) {
                state.index[pos] = entry;
            } else {
                state.index.push_back(entry);
            }
        }
        while state.index.len() > self.max_cached {
            state.index.pop_front();
        }
        drop(state);
        self.bus.emit("session_index_updated", &Value::Null);
    }

    /// Renames a cached session entry and bumps `updated_at` to now,
    /// re-sorting the index by `updated_at` descending so the renamed
    /// session rises to the top the way a just-touched session would.
    pub fn update_session_name(&self, session_id: &str, name: &str) {
        let now = chrono::Utc::now();
        {
            let mut state = self.state.lock().expect("session store lock poisoned");
            if let Some(entry) = state.index.iter_mut().find(|e| e.session_id == session_id) {
                entry.session_name = Some(name.to_string());
                entry.updated_at = Some(now.to_rfc3339());
            }
            sort_by_updated_at_desc(&mut state.index);
        }
        self.bus.emit(
            "chat_session_name_changed",
            &serde_json::json!({ "session_id": session_id, "session_name": name }),
        );
    }

    /// Optimistically removes `session_id` from the index before the server
    /// confirms, tombstoning it so a stale index refresh cannot resurrect it.
    pub fn delete_optimistic(&self, session_id: &str) -> Option<ChatSessionEntry> {
        let removed = {
            let mut state = self.state.lock().expect("session store lock poisoned");
            let position = state.index.iter().position(|e| e.session_id == session_id)?;
            let removed = state.index.remove(position);
            state.tombstoned.push(session_id.to_string());
            removed
        };
        if removed.is_some() {
            self.bus.emit("session_deleted", &serde_json::json!({ "session_id": session_id }));
        }
        removed
    }

    /// Reverses a [`Self::delete_optimistic`] call after the server rejects
    /// the delete, reinserting `entry` and clearing its tombstone.
    pub fn rollback_delete(&self, entry: ChatSessionEntry) {
        let session_id = entry.session_id.clone();
        {
            let mut state = self.state.lock().expect("session store lock poisoned");
            state.tombstoned.retain(|id| id != &session_id);
            if !state.index.iter().any(|e| e.session_id == session_id) {
                state.index.push_back(entry);
            }
            sort_by_updated_at_desc(&mut state.index);
        }
        self.bus.emit("session_restored", &serde_json::json!({ "session_id": session_id }));
    }

    /// Groups the current index into Today/Recent/Past buckets relative to
    /// `now`, each in index order.
    #[must_use]
    pub fn grouped(&self, now: chrono::DateTime<chrono::Utc>) -> GroupedSessions {
        let state = self.state.lock().expect("session store lock poisoned");
        let mut grouped = GroupedSessions::default();
        for entry in &state.index {
            match group_for(entry, now) {
                SessionGroup::Today => grouped.today.push(entry.clone()),
                SessionGroup::Recent => grouped.recent.push(entry.clone()),
                SessionGroup::Past => grouped.past.push(entry.clone()),
            }
        }
        grouped
    }

    /// A snapshot of the raw index, in current order.
    #[must_use]
    pub fn index_snapshot(&self) -> Vec<ChatSessionEntry> {
        self.state.lock().expect("session store lock poisoned").index.iter().cloned().collect()
    }

    /// Clears everything: current session, index, and tombstones. Called on
    /// full disconnect when the app does not want stale session state
    /// surviving into the next connection's lifetime.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("session store lock poisoned");
        *state = State::default();
    }
}

fn sort_by_updated_at_desc(index: &mut VecDeque<ChatSessionEntry>) {
    let mut entries: Vec<_> = index.drain(..).collect();
    entries.sort_by(|a, b| b.effective_timestamp().cmp(&a.effective_timestamp()));
    index.extend(entries);
}
