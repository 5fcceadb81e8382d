use std::path::{Component, Path, PathBuf};

/// Why an item name cannot be used as a path below the receive directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("name is empty")]
    Empty,
    #[error("name contains a null byte")]
    NullByte,
    #[error("name contains a parent directory (..)")]
    ParentDir,
    #[error("name is absolute")]
    Absolute,
    #[error("name contains an invalid component")]
    InvalidComponent,
}

// Received names are written below the receive root, so anything that could
// climb out of it is rejected.
pub fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::Empty);
    }
    // \0 ends the string early in C APIs
    if name.contains('\0') {
        return Err(PathError::NullByte);
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return Err(PathError::Absolute);
    }

    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => continue,
            Component::ParentDir => return Err(PathError::ParentDir),
            Component::RootDir => return Err(PathError::Absolute),
            Component::Prefix(_) => return Err(PathError::InvalidComponent),
        }
    }
    if normal == 0 {
        return Err(PathError::Empty);
    }
    Ok(())
}

/// Local path for a received item name.
pub fn resolve(root: &Path, name: &str) -> Result<PathBuf, PathError> {
    validate_name(name)?;
    Ok(root.join(name.split('/').filter(|c| !c.is_empty() && *c != ".").collect::<PathBuf>()))
}

/// `path` relative to `base`, joined with `/` regardless of platform.
pub fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}
