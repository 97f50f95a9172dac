pub mod branch;
pub mod client;
pub mod error;
pub mod models;
pub mod repositories;
pub mod timestamp;
pub mod usage;

pub use branch::{BranchOutcome, ThreadBrancher};
pub use client::PersistClient;
pub use error::PersistError;
pub use models::{Message, MessageRole, MessageStatus, Thread, ThreadStatus};
pub use repositories::{MessageRepository, ThreadRepository};
pub use usage::{rolling_window, UsageCounter, UsageCounts, UsageWindow};
