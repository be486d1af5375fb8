pub mod archive;
pub mod builder;
pub mod error;
pub mod manifest;
pub mod sizing;
pub mod storage;
pub mod tarball;
pub mod types;

pub use archive::{Archiver, SevenZipArchiver};
pub use builder::{BackupBuilder, BuildReport, SkippedItem};
pub use error::{Error, Result};
pub use manifest::{BackupRootFolder, FileUpload, FolderUpload, Node, NodeKind, NodePath};
pub use sizing::{measure, SizeEstimate};
pub use storage::{BackupStorage, BackupStore};
pub use tarball::TarballArchiver;
pub use types::*;
