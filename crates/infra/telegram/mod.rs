pub mod bot_client;
pub mod notice_queue;
