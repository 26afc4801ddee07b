pub mod yookassa_client;
