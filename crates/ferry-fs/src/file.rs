/// Regular files.
///
/// A file carries `read_only`, `executable` and the `created`, `last_read`
/// and `last_modified` timestamps (milliseconds since the Unix epoch) as
/// header extension fields. On receive, access and modification times and
/// the permission bits are applied when the item is closed.

use std::fs::{self, File, FileTimes};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use ferry_transfer::{Item, ItemError, ItemHeader, OpenMode, TYPE_FILE};

use crate::path::resolve;

pub const READ_ONLY: &str = "read_only";
pub const EXECUTABLE: &str = "executable";
pub const CREATED: &str = "created";
pub const LAST_READ: &str = "last_read";
pub const LAST_MODIFIED: &str = "last_modified";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub read_only: bool,
    pub executable: bool,
    pub created: Option<i64>,
    pub last_read: Option<i64>,
    pub last_modified: Option<i64>,
}

impl FileAttributes {
    pub fn from_metadata(meta: &fs::Metadata) -> Self {
        Self {
            read_only: meta.permissions().readonly(),
            executable: is_executable(meta),
            created: to_millis(meta.created()),
            last_read: to_millis(meta.accessed()),
            last_modified: to_millis(meta.modified()),
        }
    }

    pub fn from_header(header: &ItemHeader) -> Self {
        Self {
            read_only: header.flag(READ_ONLY),
            executable: header.flag(EXECUTABLE),
            created: header.integer(CREATED),
            last_read: header.integer(LAST_READ),
            last_modified: header.integer(LAST_MODIFIED),
        }
    }

    pub fn to_properties(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        properties.insert(READ_ONLY.into(), Value::Bool(self.read_only));
        properties.insert(EXECUTABLE.into(), Value::Bool(self.executable));
        for (key, value) in [
            (CREATED, self.created),
            (LAST_READ, self.last_read),
            (LAST_MODIFIED, self.last_modified),
        ] {
            if let Some(ms) = value {
                properties.insert(key.into(), Value::from(ms));
            }
        }
        properties
    }

    fn apply_times(&self, file: &File) -> io::Result<()> {
        let accessed = self.last_read.and_then(from_millis);
        let modified = self.last_modified.and_then(from_millis);
        if accessed.is_none() && modified.is_none() {
            return Ok(());
        }

        let mut times = FileTimes::new();
        if let Some(t) = accessed {
            times = times.set_accessed(t);
        }
        if let Some(t) = modified {
            times = times.set_modified(t);
        }
        file.set_times(times)
    }

    fn apply_permissions(&self, path: &Path) -> io::Result<()> {
        if !self.read_only && !self.executable {
            return Ok(());
        }
        let mut perms = fs::metadata(path)?.permissions();
        #[cfg(unix)]
        if self.executable {
            use std::os::unix::fs::PermissionsExt;
            // x wherever r is set
            let mode = perms.mode();
            perms.set_mode(mode | ((mode & 0o444) >> 2));
        }
        if self.read_only {
            perms.set_readonly(true);
        }
        fs::set_permissions(path, perms)
    }
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

fn to_millis(time: io::Result<SystemTime>) -> Option<i64> {
    time.ok().map(|t| DateTime::<Utc>::from(t).timestamp_millis())
}

fn from_millis(ms: i64) -> Option<SystemTime> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(SystemTime::from)
}

pub struct FileItem {
    path: PathBuf,
    name: String,
    size: u64,
    attributes: FileAttributes,
    file: Option<File>,
    mode: Option<OpenMode>,
}

impl FileItem {
    /// A local file to send, announced as `name`.
    pub fn local(path: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, ItemError> {
        let path = path.into();
        let meta = fs::metadata(&path)?;
        Ok(Self {
            size: meta.len(),
            attributes: FileAttributes::from_metadata(&meta),
            path,
            name: name.into(),
            file: None,
            mode: None,
        })
    }

    /// A file to receive below `root`, described by `header`.
    pub fn from_header(root: &Path, header: &ItemHeader) -> Result<Self, ItemError> {
        let path = resolve(root, &header.name).map_err(|e| ItemError::InvalidName {
            name: header.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path,
            name: header.name.clone(),
            size: header.content_size(),
            attributes: FileAttributes::from_header(header),
            file: None,
            mode: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn attributes(&self) -> &FileAttributes {
        &self.attributes
    }

    fn file_for(&mut self, mode: OpenMode) -> Result<&mut File, ItemError> {
        if self.mode != Some(mode) {
            return Err(ItemError::NotOpen);
        }
        self.file.as_mut().ok_or(ItemError::NotOpen)
    }
}

impl Item for FileItem {
    fn item_type(&self) -> &str {
        TYPE_FILE
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn properties(&self) -> Map<String, Value> {
        self.attributes.to_properties()
    }

    fn open(&mut self, mode: OpenMode) -> Result<(), ItemError> {
        let file = match mode {
            OpenMode::Read => File::open(&self.path)?,
            OpenMode::Write => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                File::create(&self.path)?
            }
        };
        self.file = Some(file);
        self.mode = Some(mode);
        Ok(())
    }

    fn read(&mut self, max: usize) -> Result<Bytes, ItemError> {
        let file = self.file_for(OpenMode::Read)?;
        let mut buf = vec![0u8; max];
        let n = loop {
            match file.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ItemError> {
        self.file_for(OpenMode::Write)?.write_all(data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ItemError> {
        let file = self.file.take().ok_or(ItemError::NotOpen)?;
        if self.mode.take() == Some(OpenMode::Write) {
            self.attributes.apply_times(&file)?;
            drop(file);
            self.attributes.apply_permissions(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, size: u64) -> ItemHeader {
        ItemHeader::new(name, TYPE_FILE, size)
    }

    #[test]
    fn test_local_file_reads_in_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello world").unwrap();

        let mut item = FileItem::local(&path, "a.txt").unwrap();
        assert_eq!(item.size(), 11);
        assert_eq!(item.item_type(), "file");
        assert!(item.properties().contains_key(LAST_MODIFIED));

        item.open(OpenMode::Read).unwrap();
        let mut content = Vec::new();
        loop {
            let block = item.read(4).unwrap();
            if block.is_empty() {
                break;
            }
            assert!(block.len() <= 4);
            content.extend_from_slice(&block);
        }
        item.close().unwrap();
        assert_eq!(content, b"hello world");
    }

    #[test]
    fn test_receive_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let mut item = FileItem::from_header(dir.path(), &header("photos/2024/a.jpg", 3)).unwrap();

        item.open(OpenMode::Write).unwrap();
        item.write(b"abc").unwrap();
        item.close().unwrap();

        let written = fs::read(dir.path().join("photos/2024/a.jpg")).unwrap();
        assert_eq!(written, b"abc");
    }

    #[test]
    fn test_receive_applies_modified_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = header("old.txt", 1);
        h.properties.insert(LAST_MODIFIED.into(), Value::from(1_600_000_000_000i64));
        h.properties.insert(LAST_READ.into(), Value::String("1600000500000".into()));

        let mut item = FileItem::from_header(dir.path(), &h).unwrap();
        assert_eq!(item.attributes().last_read, Some(1_600_000_500_000));
        item.open(OpenMode::Write).unwrap();
        item.write(b"x").unwrap();
        item.close().unwrap();

        let meta = fs::metadata(dir.path().join("old.txt")).unwrap();
        assert_eq!(to_millis(meta.modified()), Some(1_600_000_000_000));
    }

    #[test]
    fn test_receive_applies_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = header("locked.txt", 0);
        h.properties.insert(READ_ONLY.into(), Value::Bool(true));

        let mut item = FileItem::from_header(dir.path(), &h).unwrap();
        item.open(OpenMode::Write).unwrap();
        item.close().unwrap();

        let meta = fs::metadata(dir.path().join("locked.txt")).unwrap();
        assert!(meta.permissions().readonly());
    }

    #[cfg(unix)]
    #[test]
    fn test_receive_applies_executable() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = header("run.sh", 0);
        h.properties.insert(EXECUTABLE.into(), Value::Bool(true));

        let mut item = FileItem::from_header(dir.path(), &h).unwrap();
        item.open(OpenMode::Write).unwrap();
        item.close().unwrap();

        let meta = fs::metadata(dir.path().join("run.sh")).unwrap();
        assert!(is_executable(&meta));
    }

    #[test]
    fn test_rejects_unsafe_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["../escape.txt", "/etc/passwd", ""] {
            let err = FileItem::from_header(dir.path(), &header(name, 1))
                .err()
                .unwrap();
            assert!(matches!(err, ItemError::InvalidName { .. }), "{}", name);
        }
    }

    #[test]
    fn test_read_requires_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"data").unwrap();

        let mut item = FileItem::local(&path, "a.txt").unwrap();
        assert!(matches!(item.read(4), Err(ItemError::NotOpen)));
        assert!(matches!(item.close(), Err(ItemError::NotOpen)));
    }
}
