pub mod account;
pub mod caller;
pub mod category;
pub mod conversation;
pub mod response;
pub mod utterance;
