//! `POST /api/chat`, spec.md §6 "Chat & generation".

use std::str::FromStr;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use shellwright_core::{ConversationId, Error};
use shellwright_llm::prompt::TaskKind;
use shellwright_memory::Message;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: ConversationId,
    pub persona_id: String,
    pub channel_id: String,
    pub timestamp: DateTime<Utc>,
}

const FALLBACK_REPLY: &str =
    "I can't reach a language model provider right now; please try again shortly.";

/// Appends the user turn and the assistant reply to memory regardless of
/// whether the provider succeeded, spec.md §6 S1.
pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Json<ChatResponse>, ApiError> {
    let conversation_id = match &request.conversation_id {
        Some(raw) => ConversationId::from_str(raw)
            .map_err(|_| ApiError(Error::validation("conversationId must be a UUID")))?,
        None => ConversationId::new(),
    };

    let persona = state.personas.current();
    let channel = state.channels.current();

    let memory = &state.settings.memory;
    let history = state
        .memory
        .context_for(conversation_id, memory.context_window, memory.context_max_chars);

    let user_turn = match &request.context {
        Some(context) => format!("{}\n\nAdditional context: {context}", request.message),
        None => request.message.clone(),
    };

    let envelope = state.prompt_assembler.assemble(
        TaskKind::Chat,
        &persona,
        &channel,
        None,
        &history,
        memory.context_window,
        &user_turn,
        None,
        None,
    );

    let response_text = match state.gateway.generate(&envelope).await {
        Ok(completion) => completion.text,
        Err(err) => {
            warn!(error = %err, "chat completion unavailable, returning fallback reply");
            FALLBACK_REPLY.to_string()
        }
    };

    let mut user_message = Message::user(request.message);
    user_message.persona_id = Some(persona.id.clone());
    user_message.channel_id = Some(channel.id.clone());
    state.memory.append(conversation_id, user_message);

    let mut assistant_message = Message::assistant(response_text.clone());
    assistant_message.persona_id = Some(persona.id.clone());
    assistant_message.channel_id = Some(channel.id.clone());
    state.memory.append(conversation_id, assistant_message);

    Ok(Json(ChatResponse {
        response: response_text,
        conversation_id,
        persona_id: persona.id,
        channel_id: channel.id,
        timestamp: Utc::now(),
    }))
}
