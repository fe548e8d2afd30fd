use serde_json::{json, Value};

use crate::transport::{ApiError, ApiRequest};
use crate::types::{Conversation, ConversationStart, Message, Page};
use crate::Client;

const CONVERSATIONS: &str = "/chat/conversations";

impl Client {
    pub async fn conversations(&self) -> Result<Page<Conversation>, ApiError> {
        let value = self.cached_get(CONVERSATIONS, Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Creates (or revives) the thread and posts its first message in one
    /// request.
    pub async fn start_conversation(&self, payload: Value) -> Result<ConversationStart, ApiError> {
        let value = self
            .run_mutation(ApiRequest::post(CONVERSATIONS, payload))
            .await?;
        self.cache.invalidate_exact(CONVERSATIONS);
        Ok(serde_json::from_value(value)?)
    }

    pub async fn conversation(&self, id: u64) -> Result<Conversation, ApiError> {
        let value = self
            .cached_get(&format!("{CONVERSATIONS}/{id}"), Vec::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn messages(&self, conversation_id: u64) -> Result<Page<Message>, ApiError> {
        let value = self
            .cached_get(&format!("{CONVERSATIONS}/{conversation_id}/messages"), Vec::new())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Invalidates only this conversation's message list. The conversation
    /// list keeps its possibly stale last-message preview until its next
    /// refetch.
    pub async fn send_message(
        &self,
        conversation_id: u64,
        text: impl Into<String>,
    ) -> Result<Message, ApiError> {
        let value = self
            .run_mutation(ApiRequest::post(
                format!("{CONVERSATIONS}/{conversation_id}/messages"),
                json!({ "text": text.into() }),
            ))
            .await?;
        self.cache
            .invalidate_exact(&format!("{CONVERSATIONS}/{conversation_id}/messages"));
        Ok(serde_json::from_value(value)?)
    }
}
