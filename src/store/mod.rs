//! Storage contract shared by the Postgres and in-memory backends.
//!
//! Reads go through one of the three structure traits. Writes that touch more than one structure live
//! on [`MessengerStore`] so each backend can make them atomic.

use chrono::NaiveDateTime;

use crate::errors::store_error::StoreError;
use crate::models::{Conversation, ConversationSummary, LastMessageCacheEntry, Message, MessageQuery};

pub mod memory_store;
pub mod pg_store;

pub use memory_store::MemoryStore;
pub use pg_store::PgStore;

pub trait ConversationIndex {
        fn find_conversation(&self, conversation_id: i64) -> Result<Option<Conversation>, StoreError>;

        fn find_conversation_between(&self, user1_id: i64, user2_id: i64)
                -> Result<Option<Conversation>, StoreError>;
}

pub trait MessageLog {
        /// Messages of one conversation in clustering order.
        fn find_messages(&self, conversation_id: i64, query: MessageQuery) -> Result<Vec<Message>, StoreError>;

        fn count_messages(&self, conversation_id: i64, before: Option<NaiveDateTime>) -> Result<i64, StoreError>;
}

pub trait LastMessageCache {
        fn find_entry(&self, conversation_id: i64) -> Result<Option<LastMessageCacheEntry>, StoreError>;

        /// Conversations the user takes part in, most recently active first.
        fn find_conversations_for_user(
                &self,
                user_id: i64,
                offset: i64,
                limit: i64,
        ) -> Result<Vec<ConversationSummary>, StoreError>;

        fn count_conversations_for_user(&self, user_id: i64) -> Result<i64, StoreError>;
}

pub trait MessengerStore: ConversationIndex + MessageLog + LastMessageCache + Send + Sync {
        /// Creates the tables if they are missing. Safe to call repeatedly.
        fn ensure_schema(&self) -> Result<(), StoreError>;

        /// Returns the existing conversation between the two participants, or inserts `conversation`
        /// together with an empty cache row. The flag is true when a new conversation was created.
        fn open_conversation(&self, conversation: &Conversation) -> Result<(Conversation, bool), StoreError>;

        /// Appends to the log, refreshes the cache row from the log head and bumps the conversation's
        /// last activity. Returns the cache row as written.
        fn append_message(&self, message: &Message) -> Result<LastMessageCacheEntry, StoreError>;
}
