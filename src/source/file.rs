//! Filesystem-backed source.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{
    Capabilities, ReadableSource, SeekableSource, Source, SourceStat, WritableSource,
    resolve_seek,
};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// A source backed by a file on disk.
///
/// Reads go straight to the file. Staged writes go to a temporary file created
/// in the same directory, which `commit_write` renames over the original.
/// The rename is atomic on POSIX filesystems.
///
/// A source created with [`FileSource::window`] exposes only a byte range of
/// the file and is read-only.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    start: u64,
    length: Option<u64>,
    file: Option<File>,
    pos: u64,
    staged: Option<NamedTempFile>,
}

impl FileSource {
    /// Creates a source for the file at `path`. The file need not exist yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            start: 0,
            length: None,
            file: None,
            pos: 0,
            staged: None,
        }
    }

    /// Creates a read-only source over `length` bytes starting at `start`.
    ///
    /// A `length` of `None` extends the window to the end of the file.
    pub fn window(path: impl AsRef<Path>, start: u64, length: Option<u64>) -> Self {
        let mut source = Self::new(path);
        source.start = start;
        source.length = length;
        source
    }

    /// The path this source reads from and commits to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_window(&self) -> bool {
        self.start != 0 || self.length.is_some()
    }

    fn file(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        self.file
            .as_mut()
            .ok_or(Error::UnsupportedOperation { operation: "read" })
    }

    fn visible_len(&mut self) -> Result<u64> {
        let start = self.start;
        let length = self.length;
        let file_len = self.file()?.metadata()?.len();
        let available = file_len.saturating_sub(start);
        Ok(length.map_or(available, |len| len.min(available)))
    }

    fn staged(&mut self) -> Result<&mut NamedTempFile> {
        self.staged.as_mut().ok_or(Error::UnsupportedOperation {
            operation: "write without begin_write",
        })
    }
}

impl ReadableSource for FileSource {
    fn open(&mut self) -> Result<()> {
        self.file()?;
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.visible_len()?.saturating_sub(self.pos);
        let want = remaining.min(buf.len() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }
        let offset = self.start + self.pos;
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;
        let n = file.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }

    fn stat(&self) -> Result<SourceStat> {
        let meta = fs::metadata(&self.path)?;
        let available = meta.len().saturating_sub(self.start);
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        Ok(SourceStat {
            size: Some(self.length.map_or(available, |len| len.min(available))),
            mtime: Some(Timestamp::from_unix_secs(mtime.unix_seconds())),
        })
    }
}

impl SeekableSource for FileSource {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.visible_len()?;
        self.pos = resolve_seek(pos, self.pos, len)?;
        Ok(self.pos)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }
}

impl WritableSource for FileSource {
    fn begin_write(&mut self) -> Result<()> {
        if self.is_window() {
            return Err(Error::UnsupportedOperation {
                operation: "write to a file window",
            });
        }
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let temp = NamedTempFile::new_in(&dir)?;
        log::debug!(
            "staging write for {} in {}",
            self.path.display(),
            temp.path().display()
        );
        self.staged = Some(temp);
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.staged()?.as_file_mut().write(buf)?)
    }

    fn commit_write(&mut self) -> Result<()> {
        let temp = self.staged.take().ok_or(Error::UnsupportedOperation {
            operation: "commit without begin_write",
        })?;
        temp.as_file().sync_all()?;

        // Keep the original file's permissions instead of the temp file's 0600.
        if let Ok(meta) = fs::metadata(&self.path) {
            if let Err(e) = fs::set_permissions(temp.path(), meta.permissions()) {
                log::warn!(
                    "could not copy permissions to {}: {}",
                    temp.path().display(),
                    e
                );
            }
        }

        self.file = None;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        self.pos = 0;
        Ok(())
    }

    fn rollback_write(&mut self) {
        if let Some(temp) = self.staged.take() {
            log::debug!("discarding staged write {}", temp.path().display());
            if let Err(e) = temp.close() {
                log::warn!("could not remove staged write: {}", e);
            }
        }
    }

    fn seek_write(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.staged()?.as_file_mut().seek(pos)?)
    }

    fn tell_write(&mut self) -> Result<u64> {
        Ok(self.staged()?.as_file_mut().stream_position()?)
    }

    fn remove(&mut self) -> Result<()> {
        self.file = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Source for FileSource {
    fn capabilities(&self) -> Capabilities {
        if self.is_window() {
            Capabilities::READ | Capabilities::SEEK
        } else {
            Capabilities::all()
        }
    }

    fn as_seekable(&mut self) -> Option<&mut dyn SeekableSource> {
        Some(self)
    }

    fn as_writable(&mut self) -> Option<&mut dyn WritableSource> {
        if self.is_window() { None } else { Some(self) }
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.rollback_write();
    }
}
