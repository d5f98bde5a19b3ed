pub mod chat;
pub mod classes;
pub mod documents;
pub mod permissions;
