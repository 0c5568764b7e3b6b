// Size-based rotating file writer.
//
// Rotation runs inline on the writing thread (the non-blocking appender's
// worker): when the next write would push the file past `max_bytes`, the
// current file becomes `<path>.1`, older files shift up by one, and
// anything past `max_files` is deleted. I/O failures are reported once on
// stderr and the line is written there instead; `write` itself never fails.
// The notice is re-armed only by a rotation that succeeds.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::LoggingError;

pub struct RotatingFileWriter {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    file: Option<File>,
    written: u64,
    degraded: bool,
}

impl RotatingFileWriter {
    /// Open (or create) `path` for appending. Missing parent directories are
    /// created.
    pub fn open(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        max_files: usize,
    ) -> Result<Self, LoggingError> {
        let mut writer = Self {
            path: path.into(),
            max_bytes: max_bytes.max(1),
            max_files,
            file: None,
            written: 0,
            degraded: false,
        };
        if let Some(parent) = writer.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LoggingError::Open {
                path: writer.path.clone(),
                source,
            })?;
        }
        writer.reopen()?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the `index`-th rotated file (`1` is the most recent).
    pub fn rotated_path(&self, index: usize) -> PathBuf {
        rotated(&self.path, index)
    }

    fn reopen(&mut self) -> Result<(), LoggingError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LoggingError::Open {
                path: self.path.clone(),
                source,
            })?;
        self.written = file.metadata().map_or(0, |m| m.len());
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), LoggingError> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
        let path = self.path.clone();
        let fail = |source| LoggingError::Rotate {
            path: path.clone(),
            source,
        };

        if self.max_files == 0 {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
                .map_err(fail)?;
            self.file = Some(file);
            self.written = 0;
            return Ok(());
        }

        remove_if_exists(&rotated(&self.path, self.max_files)).map_err(fail)?;
        for index in (1..self.max_files).rev() {
            rename_if_exists(&rotated(&self.path, index), &rotated(&self.path, index + 1))
                .map_err(fail)?;
        }
        rename_if_exists(&self.path, &rotated(&self.path, 1)).map_err(fail)?;
        self.reopen()
    }

    fn report(&mut self, err: &LoggingError) {
        if !self.degraded {
            self.degraded = true;
            eprintln!("thermosync: {err}; logging to stderr");
        }
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = u64::try_from(buf.len()).unwrap_or(u64::MAX);

        if self.written > 0 && self.written.saturating_add(incoming) > self.max_bytes {
            match self.rotate() {
                Ok(()) => self.degraded = false,
                Err(err) => self.report(&err),
            }
        }
        if self.file.is_none() {
            if let Err(err) = self.reopen() {
                self.report(&err);
            }
        }

        match self.file.as_mut().map(|file| file.write_all(buf)) {
            Some(Ok(())) => {
                self.written = self.written.saturating_add(incoming);
            }
            Some(Err(source)) => {
                self.file = None;
                let err = LoggingError::Write {
                    path: self.path.clone(),
                    source,
                };
                self.report(&err);
                let _ = io::stderr().write_all(buf);
            }
            None => {
                let _ = io::stderr().write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

fn rotated(path: &Path, index: usize) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn rename_if_exists(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
