//! No Dragon Lord — keeps a chat bot from becoming a group's most active poster.

pub mod config;
pub mod error;
pub mod guard;
pub mod host;
pub mod store;
