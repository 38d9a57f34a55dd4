//! FileJump remote for file synchronization hosts.
//!
//! [`FileJumpFs`] maps directory and file operations onto the FileJump REST
//! API through [`filejump_core::FileJumpClient`], resolving paths to folder ids
//! with a [`DirCache`].

mod config;
pub mod dircache;
pub mod encoding;
mod error;
mod fs;
mod object;
mod range;

pub use config::{DEFAULT_UPLOAD_CUTOFF, Options, parse_size};
pub use dircache::{DirCache, DirCacheSource};
pub use encoding::Encoder;
pub use error::{BackendError, Result};
pub use fs::{DirEntry, Directory, Features, FileJumpFs, Fs, HashType, UploadReader};
pub use object::{Object, ObjectInfo, ReadStream};
pub use range::OpenOption;
