//! Path-validating file reader. Every read is canonicalized and must land on
//! a regular file under the sandbox root; successful reads are memoized.

pub mod cache;
pub mod config;
pub mod error;
pub mod root;
pub mod source;

pub use cache::{CacheStats, FileCache};
pub use config::SandboxConfig;
pub use error::SandboxError;
pub use root::SandboxRoot;
pub use source::{DiskSource, FileSource};
