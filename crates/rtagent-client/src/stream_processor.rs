//! Consumes the whitelisted subset of server events and assembles the
//! currently streaming assistant message out of incremental deltas.
//!
//! Generalized from `turbomcp-client::llm::streaming`'s
//! `StreamChunk`/`CollectingStreamHandler` shape: "collect chunks into a
//! string" becomes the richer per-interaction accumulator this protocol
//! needs (text, thought, tool calls, subsession nesting).

use std::sync::{Arc, Mutex};

use serde_json::Value;

use rtagent_core::EventBus;

use crate::session_store::SessionStore;

/// Event types this processor claims exclusive ownership of. Once handled
/// here, `ConnectionCore` must not also raw-forward the event to the bus.
pub const WHITELIST: &[&str] = &[
    "interaction",
    "text_delta",
    "thought_delta",
    "completion",
    "tool_select_delta",
    "tool_call",
    "render_media",
    "system_message",
    "error",
    "history_delta",
    "chat_session_changed",
    "user_message",
    "anthropic_user_message",
    "subsession_started",
    "subsession_ended",
    "cancelled",
    "user_turn_start",
];

/// Whether `event_type` is one [`StreamProcessor::handle_event`] will consume.
#[must_use]
pub fn is_whitelisted(event_type: &str) -> bool {
    WHITELIST.contains(&event_type)
}

/// Lifecycle phase of one tool invocation, driven by `tool_select_delta`'s
/// vendor-specific substate field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolNotificationState {
    /// The model has selected the tool but arguments are still streaming in.
    Preparing,
    /// The tool call is fully formed and has been dispatched.
    Executing,
}

/// The lifecycle record for one tool invocation, tracked separately from its
/// eventual result so the UI can show a spinner while the call is pending.
#[derive(Debug, Clone)]
pub struct ToolNotification {
    /// Id correlating this notification to a later `tool_call` result.
    pub id: String,
    /// Tool name, once known.
    pub name: Option<String>,
    /// Current lifecycle phase.
    pub state: ToolNotificationState,
}

/// One tool call accumulated into the in-flight message: partial arguments
/// while `tool_select_delta` is streaming, then a final result once
/// `tool_call` arrives.
#[derive(Debug, Clone, Default)]
pub struct ToolCallState {
    /// Id correlating partial deltas to the eventual result.
    pub id: String,
    /// Tool name, once known.
    pub name: Option<String>,
    /// Concatenated raw argument fragments streamed so far.
    pub partial_arguments: String,
    /// The tool's result payload, once `tool_call` arrives for this id.
    pub result: Option<Value>,
}

/// The in-flight buffers for one streaming assistant interaction.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    /// Running assistant text, appended to by `text_delta`.
    pub text: String,
    /// Running chain-of-thought text, appended to by `thought_delta`.
    pub thought: String,
    /// Tool calls observed during this interaction, in first-seen order.
    pub tool_calls: Vec<ToolCallState>,
    /// Nested subsession ids, pushed by `subsession_started`, popped by
    /// `subsession_ended`.
    pub subsession_stack: Vec<String>,
}

/// A stable message record produced when a streaming interaction closes,
/// either via `completion` or via truncation on `cancelled`.
#[derive(Debug, Clone)]
pub struct CompletedMessage {
    /// Final assistant text.
    pub text: String,
    /// Final chain-of-thought text, if any was streamed.
    pub thought: String,
    /// Tool calls made during this interaction.
    pub tool_calls: Vec<ToolCallState>,
    /// Whether this message was cut short by a `cancelled` event rather than
    /// reaching a natural `completion`.
    pub truncated: bool,
}

struct State {
    accumulator: Accumulator,
    notifications: Vec<ToolNotification>,
}

/// Maintains the [`Accumulator`] for the currently streaming message and the
/// list of pending [`ToolNotification`]s, driven by the fixed event
/// [`WHITELIST`].
pub struct StreamProcessor {
    bus: Arc<EventBus>,
    state: Mutex<State>,
}

impl std::fmt::Debug for StreamProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("stream processor lock poisoned");
        f.debug_struct("StreamProcessor")
            .field("text_len", &state.accumulator.text.len())
            .field("tool_calls", &state.accumulator.tool_calls.len())
            .field("notifications", &state.notifications.len())
            .finish()
    }
}

impl StreamProcessor {
    /// Creates a processor with empty buffers, emitting derived events on `bus`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(State {
                accumulator: Accumulator::default(),
                notifications: Vec::new(),
            }),
        }
    }

    /// Clears the streaming buffers. Called on new session, explicit app
    /// reset, or a `cancelled` event.
    pub fn reset_accumulator(&self) {
        let mut state = self.state.lock().expect("stream processor lock poisoned");
        state.accumulator = Accumulator::default();
    }

    /// A snapshot of the current text buffer, for UI rendering or tests.
    #[must_use]
    pub fn current_text(&self) -> String {
        self.state.lock().expect("stream processor lock poisoned").accumulator.text.clone()
    }

    /// A snapshot of the current thought buffer.
    #[must_use]
    pub fn current_thought(&self) -> String {
        self.state.lock().expect("stream processor lock poisoned").accumulator.thought.clone()
    }

    /// A snapshot of the tool calls accumulated so far this interaction.
    #[must_use]
    pub fn tool_calls(&self) -> Vec<ToolCallState> {
        self.state.lock().expect("stream processor lock poisoned").accumulator.tool_calls.clone()
    }

    /// A snapshot of currently pending tool notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<ToolNotification> {
        self.state.lock().expect("stream processor lock poisoned").notifications.clone()
    }

    /// Current subsession nesting depth.
    #[must_use]
    pub fn subsession_depth(&self) -> usize {
        self.state.lock().expect("stream processor lock poisoned").accumulator.subsession_stack.len()
    }

    /// Handles one inbound event if it is in [`WHITELIST`].
    ///
    /// Returns `true` if the event was consumed (the caller must not also
    /// raw-forward it to the bus), `false` if `event_type` is not whitelisted.
    pub fn handle_event(&self, event_type: &str, payload: &Value, session_store: &SessionStore) -> bool {
        match event_type {
            "chat_session_changed" => {
                let session_id = payload.get("session_id").and_then(Value::as_str).map(str::to_string);
                session_store.set_current_session(session_id, payload.clone());
                self.reset_accumulator();
                true
            }
            "interaction" => {
                self.reset_accumulator();
                self.bus.emit(event_type, payload);
                true
            }
            "text_delta" => {
                let delta = extract_delta(payload);
                let full_text = {
                    let mut state = self.state.lock().expect("stream processor lock poisoned");
                    state.accumulator.text.push_str(delta);
                    state.accumulator.text.clone()
                };
                self.bus.emit("text_delta", &serde_json::json!({ "delta": delta, "text": full_text }));
                true
            }
            "thought_delta" => {
                let delta = extract_delta(payload);
                let full_thought = {
                    let mut state = self.state.lock().expect("stream processor lock poisoned");
                    state.accumulator.thought.push_str(delta);
                    state.accumulator.thought.clone()
                };
                self.bus.emit("thought_delta", &serde_json::json!({ "delta": delta, "thought": full_thought }));
                true
            }
            "completion" => {
                let message = {
                    let state = self.state.lock().expect("stream processor lock poisoned");
                    CompletedMessage {
                        text: state.accumulator.text.clone(),
                        thought: state.accumulator.thought.clone(),
                        tool_calls: state.accumulator.tool_calls.clone(),
                        truncated: false,
                    }
                };
                self.bus.emit(
                    "message_completed",
                    &serde_json::json!({
                        "text": message.text,
                        "thought": message.thought,
                        "tool_call_count": message.tool_calls.len(),
                        "truncated": message.truncated,
                    }),
                );
                true
            }
            "tool_select_delta" => {
                self.handle_tool_select_delta(payload);
                true
            }
            "tool_call" => {
                self.handle_tool_call(payload);
                true
            }
            "subsession_started" => {
                if let Some(id) = payload.get("subsession_id").and_then(Value::as_str) {
                    self.state
                        .lock()
                        .expect("stream processor lock poisoned")
                        .accumulator
                        .subsession_stack
                        .push(id.to_string());
                }
                self.bus.emit(event_type, payload);
                true
            }
            "subsession_ended" => {
                self.state.lock().expect("stream processor lock poisoned").accumulator.subsession_stack.pop();
                self.bus.emit(event_type, payload);
                true
            }
            "cancelled" => {
                let message = {
                    let mut state = self.state.lock().expect("stream processor lock poisoned");
                    let message = CompletedMessage {
                        text: state.accumulator.text.clone(),
                        thought: state.accumulator.thought.clone(),
                        tool_calls: state.accumulator.tool_calls.clone(),
                        truncated: true,
                    };
                    state.notifications.clear();
                    message
                };
                self.reset_accumulator();
                self.bus.emit(
                    "cancelled",
                    &serde_json::json!({
                        "text": message.text,
                        "thought": message.thought,
                        "truncated": true,
                    }),
                );
                true
            }
            "user_turn_start" => {
                self.state.lock().expect("stream processor lock poisoned").notifications.clear();
                self.bus.emit("all_notifications_cleared", &Value::Null);
                true
            }
            "user_message" | "anthropic_user_message" => {
                // Authoritative from the server; the client never synthesises
                // user messages locally, so this is a pure passthrough.
                self.bus.emit(event_type, payload);
                true
            }
            "render_media" | "system_message" | "error" | "history_delta" => {
                self.bus.emit(event_type, payload);
                true
            }
            _ => false,
        }
    }

    fn handle_tool_select_delta(&self, payload: &Value) {
        let Some(id) = payload.get("id").or_else(|| payload.get("tool_call_id")).and_then(Value::as_str) else {
            return;
        };
        let name = payload.get("name").or_else(|| payload.get("tool_name")).and_then(Value::as_str);
        let arg_fragment = payload.get("arguments_delta").or_else(|| payload.get("arguments")).and_then(Value::as_str).unwrap_or_default();
        let executing = payload
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.eq_ignore_ascii_case("executing"))
            .unwrap_or(false);

        let mut state = self.state.lock().expect("stream processor lock poisoned");
        if let Some(call) = state.accumulator.tool_calls.iter_mut().find(|c| c.id == id) {
            if name.is_some() {
                call.name = name.map(str::to_string);
            }
            call.partial_arguments.push_str(arg_fragment);
        } else {
            state.accumulator.tool_calls.push(ToolCallState {
                id: id.to_string(),
                name: name.map(str::to_string),
                partial_arguments: arg_fragment.to_string(),
                result: None,
            });
        }

        let new_state = if executing { ToolNotificationState::Executing } else { ToolNotificationState::Preparing };
        if let Some(notification) = state.notifications.iter_mut().find(|n| n.id == id) {
            notification.state = new_state;
            if name.is_some() {
                notification.name = name.map(str::to_string);
            }
        } else {
            state.notifications.push(ToolNotification {
                id: id.to_string(),
                name: name.map(str::to_string),
                state: new_state,
            });
        }
        drop(state);

        self.bus.emit(
            "tool_notification",
            &serde_json::json!({ "id": id, "name": name, "executing": executing }),
        );
    }

    fn handle_tool_call(&self, payload: &Value) {
        let Some(id) = payload.get("id").or_else(|| payload.get("tool_call_id")).and_then(Value::as_str) else {
            return;
        };
        let result = payload.get("result").cloned();

        {
            let mut state = self.state.lock().expect("stream processor lock poisoned");
            if let Some(call) = state.accumulator.tool_calls.iter_mut().find(|c| c.id == id) {
                call.result = result.clone();
            }
            state.notifications.retain(|n| n.id != id);
        }

        self.bus.emit("tool_call_complete", &serde_json::json!({ "id": id, "result": result }));
        self.bus.emit("tool_notification_removed", &serde_json::json!({ "id": id }));
    }
}

fn extract_delta(payload: &Value) -> &str {
    payload
        .get("delta")
        .or_else(|| payload.get("text"))
        .or_else(|| payload.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::SessionStore;

    fn harness() -> (StreamProcessor, SessionStore, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let processor = StreamProcessor::new(bus.clone());
        let store = SessionStore::new(bus.clone(), 500);
        (processor, store, bus)
    }

    #[test]
    fn non_whitelisted_event_is_not_consumed() {
        let (processor, store, _bus) = harness();
        assert!(!processor.handle_event("agent_list", &Value::Null, &store));
    }

    #[test]
    fn text_delta_accumulates_full_text() {
        let (processor, store, _bus) = harness();
        processor.handle_event("text_delta", &serde_json::json!({"delta": "Hel"}), &store);
        processor.handle_event("text_delta", &serde_json::json!({"delta": "lo"}), &store);
        assert_eq!(processor.current_text(), "Hello");
    }

    #[test]
    fn completion_emits_message_completed_with_accumulated_text() {
        let (processor, store, bus) = harness();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        bus.on("message_completed", move |payload| {
            *seen2.lock().unwrap() = Some(payload.clone());
        });
        processor.handle_event("text_delta", &serde_json::json!({"delta": "hi"}), &store);
        processor.handle_event("completion", &Value::Null, &store);
        let payload = seen.lock().unwrap().clone().unwrap();
        assert_eq!(payload["text"], "hi");
        assert_eq!(payload["truncated"], false);
    }

    #[test]
    fn cancelled_truncates_and_clears_notifications() {
        let (processor, store, _bus) = harness();
        processor.handle_event(
            "tool_select_delta",
            &serde_json::json!({"id": "t1", "name": "search"}),
            &store,
        );
        assert_eq!(processor.notifications().len(), 1);
        processor.handle_event("text_delta", &serde_json::json!({"delta": "partial"}), &store);
        processor.handle_event("cancelled", &Value::Null, &store);
        assert_eq!(processor.current_text(), "");
        assert!(processor.notifications().is_empty());
    }

    #[test]
    fn tool_call_matches_by_id_and_clears_its_notification() {
        let (processor, store, _bus) = harness();
        processor.handle_event(
            "tool_select_delta",
            &serde_json::json!({"id": "t1", "name": "search"}),
            &store,
        );
        processor.handle_event(
            "tool_call",
            &serde_json::json!({"id": "t1", "result": {"ok": true}}),
            &store,
        );
        assert!(processor.notifications().is_empty());
        let calls = processor.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].result, Some(serde_json::json!({"ok": true})));
    }

    #[test]
    fn user_turn_start_clears_all_notifications_nuclear() {
        let (processor, store, _bus) = harness();
        processor.handle_event("tool_select_delta", &serde_json::json!({"id": "a"}), &store);
        processor.handle_event("tool_select_delta", &serde_json::json!({"id": "b"}), &store);
        assert_eq!(processor.notifications().len(), 2);
        processor.handle_event("user_turn_start", &Value::Null, &store);
        assert!(processor.notifications().is_empty());
    }

    #[test]
    fn subsession_started_and_ended_balance_the_stack() {
        let (processor, store, _bus) = harness();
        processor.handle_event("subsession_started", &serde_json::json!({"subsession_id": "s1"}), &store);
        assert_eq!(processor.subsession_depth(), 1);
        processor.handle_event("subsession_ended", &Value::Null, &store);
        assert_eq!(processor.subsession_depth(), 0);
    }

    #[test]
    fn chat_session_changed_resets_accumulator_and_updates_session_store() {
        let (processor, store, _bus) = harness();
        processor.handle_event("text_delta", &serde_json::json!({"delta": "stale"}), &store);
        processor.handle_event(
            "chat_session_changed",
            &serde_json::json!({"session_id": "s-42"}),
            &store,
        );
        assert_eq!(processor.current_text(), "");
        assert_eq!(store.current_chat_session_id(), Some("s-42".to_string()));
    }
}
