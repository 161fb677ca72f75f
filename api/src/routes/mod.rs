pub mod chats;
pub mod consent;
pub mod health;
pub mod twin;
