pub mod conversation_repository;
pub mod last_message_cache_repository;
pub mod message_repository;
