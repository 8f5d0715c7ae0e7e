use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;

pub mod config;
pub mod cql;
pub mod dtos;
pub mod errors;
pub mod models;
pub mod repositories;
pub mod schema;
pub mod services;
pub mod store;

pub use config::Config;
pub use errors::store_error::StoreError;
pub use services::messenger_service::MessengerService;
pub use store::{MemoryStore, MessengerStore, PgStore};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;
