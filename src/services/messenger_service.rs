use std::sync::Mutex;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use snowflake::SnowflakeIdGenerator;
use tracing::{error, info};

use crate::config::{Config, MAX_PAGE_SIZE};

/// Fractional-second digits kept on stored timestamps. CQL `timestamp` holds milliseconds, and Postgres
/// `TIMESTAMP` holds microseconds, so milliseconds survive both.
pub const TIMESTAMP_PRECISION: u16 = 3;
use crate::dtos::{ConversationResponseDto, MessageResponseDto, PaginatedResponseDto};
use crate::errors::store_error::StoreError;
use crate::models::{Conversation, ConversationSummary, Message, MessageQuery};
use crate::store::MessengerStore;

/// Conversation and message operations over any [`MessengerStore`].
#[derive(Debug)]
pub struct MessengerService<S> {
        store: S,
        id_generator: Mutex<SnowflakeIdGenerator>,
        page_size: i64,
}

impl<S: MessengerStore> MessengerService<S> {
        pub fn new(store: S, config: &Config) -> Self {
                Self {
                        store,
                        id_generator: Mutex::new(SnowflakeIdGenerator::new(config.machine_id, config.node_id)),
                        page_size: config.page_size,
                }
        }

        pub fn store(&self) -> &S {
                &self.store
        }

        pub fn default_page_size(&self) -> i64 {
                self.page_size
        }

        /// Turns a 1-based page and an optional page size into an offset and limit.
        fn page_bounds(&self, page: i64, limit: Option<i64>) -> Result<(i64, i64), StoreError> {
                paginate(page, limit.unwrap_or(self.page_size))
        }

        pub fn create_or_get_conversation(
                &self,
                user1_id: i64,
                user2_id: i64,
        ) -> Result<ConversationResponseDto, StoreError> {
                if user1_id == user2_id {
                        return Err(StoreError::BadRequest("a conversation needs two distinct users".to_string()));
                }

                info!(user1_id, user2_id, "creating or getting conversation");
                let candidate = Conversation {
                        conversation_id: self.next_id()?,
                        user1_id,
                        user2_id,
                        last_timestamp: now(),
                };
                let (conversation, _) = self.store.open_conversation(&candidate)?;

                self.get_conversation(conversation.conversation_id)
        }

        pub fn get_conversation(&self, conversation_id: i64) -> Result<ConversationResponseDto, StoreError> {
                let conversation = self.find_conversation(conversation_id)?;
                let entry = self.store.find_entry(conversation_id)?.ok_or_else(|| {
                        error!(conversation_id, "conversation has no last message cache row");
                        StoreError::Internal(format!("conversation {conversation_id} has no cache row"))
                })?;

                Ok(ConversationResponseDto::from(ConversationSummary::from((conversation, entry))))
        }

        pub fn get_user_conversations(
                &self,
                user_id: i64,
                page: i64,
                limit: Option<i64>,
        ) -> Result<PaginatedResponseDto<ConversationResponseDto>, StoreError> {
                let (offset, limit) = self.page_bounds(page, limit)?;

                let total = self.store.count_conversations_for_user(user_id)?;
                let items = self
                        .store
                        .find_conversations_for_user(user_id, offset, limit)?
                        .into_iter()
                        .map(ConversationResponseDto::from)
                        .collect();

                Ok(PaginatedResponseDto {
                        items,
                        total,
                        page,
                        limit,
                })
        }

        pub fn send_message(
                &self,
                conversation_id: i64,
                sender_id: i64,
                receiver_id: i64,
                content: String,
        ) -> Result<MessageResponseDto, StoreError> {
                self.send_message_at(conversation_id, sender_id, receiver_id, content, now())
        }

        /// Like [`Self::send_message`] with a caller-supplied timestamp, e.g. when importing history. The
        /// timestamp is truncated to [`TIMESTAMP_PRECISION`]; the returned message is what the store holds.
        pub fn send_message_at(
                &self,
                conversation_id: i64,
                sender_id: i64,
                receiver_id: i64,
                content: String,
                timestamp: NaiveDateTime,
        ) -> Result<MessageResponseDto, StoreError> {
                let conversation = self.find_conversation(conversation_id)?;
                if sender_id == receiver_id || !conversation.is_between(sender_id, receiver_id) {
                        return Err(StoreError::BadRequest(format!(
                                "users {sender_id} and {receiver_id} are not the participants of conversation {conversation_id}"
                        )));
                }

                let message = Message {
                        conversation_id,
                        timestamp: timestamp.trunc_subsecs(TIMESTAMP_PRECISION),
                        message_id: self.next_id()?,
                        content,
                        sender_id,
                        receiver_id,
                };
                self.store.append_message(&message)?;

                Ok(MessageResponseDto::from(message))
        }

        pub fn get_conversation_messages(
                &self,
                conversation_id: i64,
                page: i64,
                limit: Option<i64>,
        ) -> Result<PaginatedResponseDto<MessageResponseDto>, StoreError> {
                let (offset, limit) = self.page_bounds(page, limit)?;
                self.page_of_messages(conversation_id, MessageQuery::page(offset, limit), page)
        }

        pub fn get_messages_before_timestamp(
                &self,
                conversation_id: i64,
                before: NaiveDateTime,
                page: i64,
                limit: Option<i64>,
        ) -> Result<PaginatedResponseDto<MessageResponseDto>, StoreError> {
                let (offset, limit) = self.page_bounds(page, limit)?;
                self.page_of_messages(conversation_id, MessageQuery::page(offset, limit).before(before), page)
        }

        fn page_of_messages(
                &self,
                conversation_id: i64,
                query: MessageQuery,
                page: i64,
        ) -> Result<PaginatedResponseDto<MessageResponseDto>, StoreError> {
                self.find_conversation(conversation_id)?;

                let total = self.store.count_messages(conversation_id, query.before)?;
                let items = self
                        .store
                        .find_messages(conversation_id, query)?
                        .into_iter()
                        .map(MessageResponseDto::from)
                        .collect();

                Ok(PaginatedResponseDto {
                        items,
                        total,
                        page,
                        limit: query.limit,
                })
        }

        fn find_conversation(&self, conversation_id: i64) -> Result<Conversation, StoreError> {
                self.store
                        .find_conversation(conversation_id)?
                        .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id} not found")))
        }

        fn next_id(&self) -> Result<i64, StoreError> {
                let mut id_generator = self.id_generator.lock().map_err(|_| {
                        error!("failed to lock id generator");
                        StoreError::Internal("failed to lock id generator".to_string())
                })?;

                Ok(id_generator.real_time_generate())
        }
}

fn now() -> NaiveDateTime {
        Utc::now().naive_utc().trunc_subsecs(TIMESTAMP_PRECISION)
}

fn paginate(page: i64, limit: i64) -> Result<(i64, i64), StoreError> {
        if page < 1 {
                return Err(StoreError::BadRequest("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
                return Err(StoreError::BadRequest(format!("limit must be between 1 and {MAX_PAGE_SIZE}")));
        }

        let offset = (page - 1)
                .checked_mul(limit)
                .ok_or_else(|| StoreError::BadRequest("page is out of range".to_string()))?;

        Ok((offset, limit))
}
