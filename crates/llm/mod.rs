pub mod gigachat_client;
