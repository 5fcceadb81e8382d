/// Ferry FS: filesystem items for the transfer engine.
///
/// - `file` and `directory` item kinds with timestamp and permission metadata
/// - A handler that receives items below a root directory
/// - Bundle construction from local paths
/// - Validation of received names before anything touches the disk

pub mod bundle;
pub mod directory;
pub mod file;
pub mod handler;
pub mod path;

pub use bundle::{add_path, build_bundle};
pub use directory::DirectoryItem;
pub use file::{FileAttributes, FileItem};
pub use handler::FilesystemHandler;
pub use path::{PathError, validate_name};
