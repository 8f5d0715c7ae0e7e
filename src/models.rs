use std::cmp::Ordering;

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema;

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = schema::conversations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Conversation {
        pub conversation_id: i64,
        pub user1_id: i64,
        pub user2_id: i64,
        pub last_timestamp: NaiveDateTime,
}

impl Conversation {
        pub fn has_participant(&self, user_id: i64) -> bool {
                self.user1_id == user_id || self.user2_id == user_id
        }

        /// True when the conversation is between `a` and `b`, in either order.
        pub fn is_between(&self, a: i64, b: i64) -> bool {
                (self.user1_id == a && self.user2_id == b) || (self.user1_id == b && self.user2_id == a)
        }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = schema::messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Message {
        pub conversation_id: i64,
        pub timestamp: NaiveDateTime,
        pub message_id: i64,
        pub content: String,
        pub sender_id: i64,
        pub receiver_id: i64,
}

impl Message {
        /// Clustering order of the message log: newest first, ties broken by ascending message id.
        pub fn log_order(&self, other: &Message) -> Ordering {
                other.timestamp
                        .cmp(&self.timestamp)
                        .then_with(|| self.message_id.cmp(&other.message_id))
        }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone, PartialEq, Eq)]
#[diesel(primary_key(conversation_id))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = schema::last_message_cache)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LastMessageCacheEntry {
        pub conversation_id: i64,
        pub sender_id: i64,
        pub receiver_id: i64,
        pub last_timestamp: NaiveDateTime,
        pub last_message: Option<String>,
}

impl LastMessageCacheEntry {
        /// Row written when a conversation is opened, before any message exists.
        pub fn empty(conversation: &Conversation) -> Self {
                LastMessageCacheEntry {
                        conversation_id: conversation.conversation_id,
                        sender_id: conversation.user1_id,
                        receiver_id: conversation.user2_id,
                        last_timestamp: conversation.last_timestamp,
                        last_message: None,
                }
        }
}

impl From<&Message> for LastMessageCacheEntry {
        fn from(head: &Message) -> Self {
                LastMessageCacheEntry {
                        conversation_id: head.conversation_id,
                        sender_id: head.sender_id,
                        receiver_id: head.receiver_id,
                        last_timestamp: head.timestamp,
                        last_message: Some(head.content.clone()),
                }
        }
}

/// A conversation joined with its last-message cache row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
        pub conversation_id: i64,
        pub user1_id: i64,
        pub user2_id: i64,
        pub last_message_at: NaiveDateTime,
        pub last_message_content: Option<String>,
}

impl From<(Conversation, LastMessageCacheEntry)> for ConversationSummary {
        fn from((conversation, entry): (Conversation, LastMessageCacheEntry)) -> Self {
                ConversationSummary {
                        conversation_id: conversation.conversation_id,
                        user1_id: conversation.user1_id,
                        user2_id: conversation.user2_id,
                        last_message_at: entry.last_timestamp,
                        last_message_content: entry.last_message,
                }
        }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageQuery {
        pub before: Option<NaiveDateTime>,
        pub offset: i64,
        pub limit: i64,
}

impl MessageQuery {
        pub fn page(offset: i64, limit: i64) -> Self {
                MessageQuery { before: None, offset, limit }
        }

        pub fn before(mut self, timestamp: NaiveDateTime) -> Self {
                self.before = Some(timestamp);
                self
        }

        pub fn matches(&self, message: &Message) -> bool {
                self.before.map_or(true, |before| message.timestamp < before)
        }
}

#[cfg(test)]
mod tests {
        use chrono::{DateTime, NaiveDateTime};

        use super::*;

        fn at(seconds: i64) -> NaiveDateTime {
                DateTime::from_timestamp(seconds, 0).unwrap().naive_utc()
        }

        fn message(timestamp: i64, message_id: i64) -> Message {
                Message {
                        conversation_id: 1,
                        timestamp: at(timestamp),
                        message_id,
                        content: format!("message {message_id}"),
                        sender_id: 10,
                        receiver_id: 20,
                }
        }

        #[test]
        fn log_order_is_timestamp_desc_then_message_id_asc() {
                let mut messages = vec![message(100, 2), message(200, 3), message(100, 1), message(150, 9)];
                messages.sort_by(Message::log_order);

                let keys: Vec<(NaiveDateTime, i64)> = messages.iter().map(|m| (m.timestamp, m.message_id)).collect();
                assert_eq!(keys, vec![(at(200), 3), (at(150), 9), (at(100), 1), (at(100), 2)]);
        }

        #[test]
        fn is_between_ignores_participant_order() {
                let conversation = Conversation {
                        conversation_id: 7,
                        user1_id: 10,
                        user2_id: 20,
                        last_timestamp: at(0),
                };

                assert!(conversation.is_between(10, 20));
                assert!(conversation.is_between(20, 10));
                assert!(!conversation.is_between(10, 30));
                assert!(conversation.has_participant(20));
                assert!(!conversation.has_participant(30));
        }

        #[test]
        fn before_filter_is_strict() {
                let query = MessageQuery::page(0, 20).before(at(100));

                assert!(query.matches(&message(99, 1)));
                assert!(!query.matches(&message(100, 1)));
                assert!(MessageQuery::page(0, 20).matches(&message(100, 1)));
        }

        #[test]
        fn cache_entry_from_head_carries_content() {
                let entry = LastMessageCacheEntry::from(&message(42, 5));

                assert_eq!(entry.last_timestamp, at(42));
                assert_eq!(entry.last_message.as_deref(), Some("message 5"));
                assert_eq!((entry.sender_id, entry.receiver_id), (10, 20));
        }
}
