/// Building a send bundle from local paths.
///
/// A file is announced by its file name. A directory is walked recursively
/// (symlinks are not followed) and every entry is named relative to the
/// directory's parent, so `~/photos` yields `photos`, `photos/a.jpg`, ...

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use ferry_transfer::{Bundle, ItemError};

use crate::directory::DirectoryItem;
use crate::file::FileItem;
use crate::path::relative_name;

pub fn build_bundle<P: AsRef<Path>>(paths: &[P]) -> Result<Bundle, ItemError> {
    let mut bundle = Bundle::new();
    for path in paths {
        add_path(&mut bundle, path.as_ref())?;
    }
    tracing::info!(
        items = bundle.item_count(),
        bytes = bundle.total_size(),
        "bundle built"
    );
    Ok(bundle)
}

/// Append `path` (a file or a whole directory tree) to `bundle`.
pub fn add_path(bundle: &mut Bundle, path: &Path) -> Result<(), ItemError> {
    let path = fs::canonicalize(path)?;
    if path.is_dir() {
        return add_directory(bundle, &path);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ItemError::InvalidName {
            name: path.display().to_string(),
            reason: "path has no file name".into(),
        })?;
    bundle.add(Box::new(FileItem::local(&path, name)?));
    Ok(())
}

fn add_directory(bundle: &mut Bundle, dir: &Path) -> Result<(), ItemError> {
    let base = dir.parent().unwrap_or(dir);

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let Some(name) = relative_name(base, entry.path()) else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            bundle.add(Box::new(DirectoryItem::local(entry.path(), name)));
        } else if file_type.is_file() {
            bundle.add(Box::new(FileItem::local(entry.path(), name)?));
        } else {
            tracing::warn!(path = %entry.path().display(), "skipping special file");
        }
    }
    Ok(())
}
