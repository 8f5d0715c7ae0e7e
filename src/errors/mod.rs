pub mod store_error;
