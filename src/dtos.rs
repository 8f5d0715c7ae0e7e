use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{ConversationSummary, Message};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponseDto {
        pub id: String,
        pub conversation_id: String,
        pub sender_id: String,
        pub receiver_id: String,
        pub content: String,
        pub created_at: NaiveDateTime,
}

impl From<Message> for MessageResponseDto {
        fn from(message: Message) -> Self {
                MessageResponseDto {
                        id: message.message_id.to_string(),
                        conversation_id: message.conversation_id.to_string(),
                        sender_id: message.sender_id.to_string(),
                        receiver_id: message.receiver_id.to_string(),
                        content: message.content,
                        created_at: message.timestamp,
                }
        }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponseDto {
        pub id: String,
        pub user1_id: String,
        pub user2_id: String,
        pub last_message_at: NaiveDateTime,
        pub last_message_content: Option<String>,
}

impl From<ConversationSummary> for ConversationResponseDto {
        fn from(summary: ConversationSummary) -> Self {
                ConversationResponseDto {
                        id: summary.conversation_id.to_string(),
                        user1_id: summary.user1_id.to_string(),
                        user2_id: summary.user2_id.to_string(),
                        last_message_at: summary.last_message_at,
                        last_message_content: summary.last_message_content,
                }
        }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponseDto<T> {
        pub items: Vec<T>,
        pub total: i64,
        pub page: i64,
        pub limit: i64,
}
