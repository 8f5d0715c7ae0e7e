use chrono::NaiveDateTime;
use derive_new::new;
use diesel::prelude::*;

use crate::errors::store_error::StoreError;
use crate::models::{Message, MessageQuery};
use crate::schema::messages;
use crate::DbPool;

#[derive(new, Debug, Clone)]
pub struct MessageRepository {
        pool: DbPool,
}

impl MessageRepository {
        pub fn find_by_conversation_id(
                &self,
                conversation_id: i64,
                query: MessageQuery,
        ) -> Result<Vec<Message>, StoreError> {
                let mut connection = self.pool.get()?;

                let mut statement = messages::table
                        .filter(messages::conversation_id.eq(conversation_id))
                        .select(Message::as_select())
                        .into_boxed();
                if let Some(before) = query.before {
                        statement = statement.filter(messages::timestamp.lt(before));
                }

                Ok(statement
                        .order_by((messages::timestamp.desc(), messages::message_id.asc()))
                        .offset(query.offset)
                        .limit(query.limit)
                        .load(&mut connection)?)
        }

        pub fn count_by_conversation_id(
                &self,
                conversation_id: i64,
                before: Option<NaiveDateTime>,
        ) -> Result<i64, StoreError> {
                let mut connection = self.pool.get()?;

                let mut statement = messages::table
                        .filter(messages::conversation_id.eq(conversation_id))
                        .select(diesel::dsl::count_star())
                        .into_boxed();
                if let Some(before) = before {
                        statement = statement.filter(messages::timestamp.lt(before));
                }

                Ok(statement.get_result(&mut connection)?)
        }

        pub(crate) fn insert_in(connection: &mut PgConnection, message: &Message) -> Result<(), StoreError> {
                diesel::insert_into(messages::table).values(message).execute(connection)?;

                Ok(())
        }

        /// First message of the conversation in clustering order.
        pub(crate) fn find_head_in(
                connection: &mut PgConnection,
                conversation_id: i64,
        ) -> Result<Option<Message>, StoreError> {
                Ok(messages::table
                        .filter(messages::conversation_id.eq(conversation_id))
                        .order_by((messages::timestamp.desc(), messages::message_id.asc()))
                        .select(Message::as_select())
                        .first(connection)
                        .optional()?)
        }
}
