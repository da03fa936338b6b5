//! Persistence layer — libSQL-backed message tallies and their daily reset.

pub mod counter;
pub mod libsql_backend;
pub mod reset;
pub mod traits;

pub use counter::CounterStore;
pub use libsql_backend::LibSqlBackend;
pub use reset::{Clock, ResetSchedule, SystemClock};
pub use traits::TallyStore;
