//! FileSystem abstraction so directory inspection can run against a real tree or an
//! in-memory one

mod mock;
mod real;
mod r#trait;

pub use mock::MockFileSystem;
pub use r#trait::{DirEntry, FileSystem};
pub use real::RealFileSystem;
