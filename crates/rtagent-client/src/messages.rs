//! Outbound client command envelopes.
//!
//! The wire protocol is duck-typed JSON tagged on `type` (see
//! [`crate::stream_processor`] for the inbound side); these are the
//! client-to-server commands `ConnectionCore` is allowed to send.

use serde::Serialize;

/// One outbound command frame, serialized as `{"type": "...", ...fields}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Requests the current agent catalog.
    GetAgents,
    /// Switches the active agent for the current session.
    SetAgent {
        /// Agent key to switch to.
        agent_key: String,
    },
    /// Requests the current avatar catalog.
    GetAvatars,
    /// Selects an avatar for rendering.
    SetAvatar {
        /// Avatar identifier.
        avatar_id: String,
    },
    /// Binds an avatar vendor session token to the current chat session.
    SetAvatarSession {
        /// Vendor-issued session token.
        avatar_session_id: String,
    },
    /// Clears any avatar vendor session binding.
    ClearAvatarSession,
    /// Sets the voice used for the current agent's audio output.
    SetAgentVoice {
        /// Voice identifier.
        voice_id: String,
    },
    /// Submits a user text turn, with optional file attachments by id.
    TextInput {
        /// The text the user typed or spoke.
        text: String,
        /// Ids of files previously uploaded via `FileUploader`, to attach to
        /// this turn. Omitted entirely (not sent as `[]`) when empty.
        #[serde(skip_serializing_if = "Option::is_none")]
        file_ids: Option<Vec<String>>,
    },
    /// Starts a brand-new chat session, optionally with a given agent.
    NewChatSession {
        /// Agent to start the new session with, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_key: Option<String>,
    },
    /// Resumes a previously created chat session by id.
    ResumeChatSession {
        /// Chat session id to resume.
        session_id: String,
    },
    /// Renames the current chat session.
    SetChatSessionName {
        /// Chat session id to rename.
        session_id: String,
        /// New display name.
        name: String,
    },
    /// Attaches arbitrary metadata to the current chat session.
    SetSessionMetadata {
        /// Chat session id to annotate.
        session_id: String,
        /// Opaque metadata payload.
        metadata: serde_json::Value,
    },
    /// Replaces the message history of the current chat session.
    SetSessionMessages {
        /// Chat session id to replace messages for.
        session_id: String,
        /// Replacement message list, opaque to this SDK.
        messages: serde_json::Value,
    },
    /// Requests a page of the user's chat session index.
    GetUserSessions {
        /// Pagination offset.
        offset: u32,
        /// Page size.
        limit: u32,
    },
    /// Requests the voice catalog.
    GetVoices,
    /// Requests the tool catalog.
    GetToolCatalog,
    /// Liveness probe initiated by the client.
    Ping,
    /// Advisory request that the server cancel the in-flight response.
    /// The server remains authoritative; the SDK does not locally truncate
    /// the message until it observes `cancelled`.
    ClientWantsCancel,
}

impl ClientCommand {
    /// Builds a `text_input` command, omitting `file_ids` entirely when the
    /// caller passed an empty list rather than sending `"file_ids": []`.
    #[must_use]
    pub fn text_input(text: impl Into<String>, file_ids: Vec<String>) -> Self {
        Self::TextInput {
            text: text.into(),
            file_ids: if file_ids.is_empty() { None } else { Some(file_ids) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_input_with_no_files_omits_file_ids_key() {
        let cmd = ClientCommand::text_input("hello", vec![]);
        let json = serde_json::to_value(&cmd).unwrap();
        assert!(!json.as_object().unwrap().contains_key("file_ids"));
        assert_eq!(json["type"], "text_input");
    }

    #[test]
    fn text_input_with_files_includes_file_ids() {
        let cmd = ClientCommand::text_input("hello", vec!["f1".into()]);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["file_ids"], serde_json::json!(["f1"]));
    }

    #[test]
    fn new_chat_session_without_agent_key_omits_field() {
        let cmd = ClientCommand::NewChatSession { agent_key: None };
        let json = serde_json::to_value(&cmd).unwrap();
        assert!(!json.as_object().unwrap().contains_key("agent_key"));
    }

    #[test]
    fn ping_serializes_to_bare_type_tag() {
        let json = serde_json::to_value(ClientCommand::Ping).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ping"}));
    }
}
