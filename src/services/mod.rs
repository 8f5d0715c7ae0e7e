pub mod messenger_service;
