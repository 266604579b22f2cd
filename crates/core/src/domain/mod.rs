pub mod chat;
pub mod geo;
pub mod profile;
pub mod quest;
