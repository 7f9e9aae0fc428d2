pub mod audit;
pub mod channel_service;
pub mod conversation_service;
pub mod engagement;
pub mod group_service;
pub mod message_service;
pub mod read_tracker;
