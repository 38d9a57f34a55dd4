mod client;
mod error;
pub mod modtime;
pub mod pacer;
mod types;

pub use client::{DEFAULT_BASE_URL, DEFAULT_PER_PAGE, FileJumpClient, parse_retry_after};
pub use error::{ApiErrorClass, FileJumpError, RETRY_STATUS_CODES};
pub use pacer::{Backoff, Pacer};
pub use types::{Entry, FileEntries, FolderInfo, ItemType, STATUS_SUCCESS};
