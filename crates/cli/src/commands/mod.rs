pub mod chat;
pub mod check;
