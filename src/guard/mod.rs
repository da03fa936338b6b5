//! Decision engine — counts group messages and gates the bot's replies.

pub mod engine;
pub mod event;
pub mod policy;

pub use engine::{Decision, DragonLordGuard, IgnoreReason, Standing};
pub use event::{GroupMessage, HostEvent, MessageKind};
pub use policy::GroupFilter;
