//! Open-flag selection for file stages.
//!
//! Sources open read-only; sinks open write-only, creating or truncating the
//! file with owner read/write permission. There is no text/binary
//! distinction on Unix, so every open is binary.

use crate::error::{Error, Result};
use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use std::path::Path;

/// Flags used to open a path for a source.
pub const SOURCE_FLAGS: OFlags = OFlags::RDONLY.union(OFlags::CLOEXEC);

/// Flags used to open a path for a sink.
pub const SINK_FLAGS: OFlags = OFlags::WRONLY
    .union(OFlags::CREATE)
    .union(OFlags::TRUNC)
    .union(OFlags::CLOEXEC);

/// Permission bits for files created by a sink.
pub const SINK_MODE: Mode = Mode::RUSR.union(Mode::WUSR);

/// Open `path` for reading.
pub fn open_for_read(path: &Path) -> Result<OwnedFd> {
    Ok(rustix::fs::open(path, SOURCE_FLAGS, Mode::empty())?)
}

/// Open `path` for writing, creating or truncating it.
pub fn open_for_write(path: &Path) -> Result<OwnedFd> {
    Ok(rustix::fs::open(path, SINK_FLAGS, SINK_MODE)?)
}

/// Fail with [`Error::FileNotFound`] unless `path` exists.
pub fn require_existing(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::FileNotFound(path.to_path_buf()))
    }
}

/// Fail with a configuration error if `path` is empty.
pub fn require_path(path: Option<&Path>, stage: &str) -> Result<()> {
    match path {
        Some(path) if !path.as_os_str().is_empty() => Ok(()),
        _ => Err(Error::Configuration(format!("{stage}: empty file path"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_write_creates_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        std::fs::write(&path, b"previous contents").unwrap();
        let fd = open_for_write(&path).unwrap();
        rustix::io::write(&fd, b"new").unwrap();
        drop(fd);
        assert_eq!(std::fs::read(&path).unwrap(), b"new");

        let fresh = dir.path().join("fresh.bin");
        drop(open_for_write(&fresh).unwrap());
        let mode = std::fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_read_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.bin");
        std::fs::write(&path, b"data").unwrap();

        let fd = open_for_read(&path).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(rustix::io::read(&fd, &mut buf).unwrap(), 4);
        assert!(rustix::io::write(&fd, b"x").is_err());
    }

    #[test]
    fn test_missing_path_errors() {
        let missing = Path::new("/nonexistent/parallax/input.bin");
        assert!(matches!(
            require_existing(missing),
            Err(Error::FileNotFound(p)) if p == missing
        ));
        assert!(matches!(open_for_read(missing), Err(Error::System(_))));
    }

    #[test]
    fn test_require_path() {
        assert!(require_path(Some(Path::new("/tmp/a")), "sink").is_ok());
        assert!(matches!(
            require_path(Some(Path::new("")), "sink"),
            Err(Error::Configuration(_))
        ));
        assert!(require_path(None, "sink").is_err());
    }
}
