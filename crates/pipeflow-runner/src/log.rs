//! Shared daily job log.
//!
//! All child output from all concurrent runs lands in one append-only
//! file per calendar day, `scheduler-<DDMMYYYY>.log`. Lines are written
//! whole under a lock and flushed immediately, so output from parallel
//! jobs interleaves per line, never mid-line.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

use crate::error::Result;

struct Inner {
    date: String,
    file: File,
}

pub struct DailyLog {
    dir: PathBuf,
    inner: Mutex<Option<Inner>>,
}

impl DailyLog {
    /// Creates the log directory if missing. The day's file is opened
    /// lazily on first write.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            inner: Mutex::new(None),
        })
    }

    /// Append one line, rolling over to a new file at midnight.
    pub fn write_line(&self, line: &str) -> Result<()> {
        let today = Local::now().format("%d%m%Y").to_string();
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            // A panic while holding the lock only loses log output;
            // keep writing for the runs still alive.
            Err(poisoned) => poisoned.into_inner(),
        };

        let reopen = match guard.as_ref() {
            Some(inner) => inner.date != today,
            None => true,
        };
        if reopen {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(&today))?;
            *guard = Some(Inner { date: today, file });
        }

        if let Some(inner) = guard.as_mut() {
            inner.file.write_all(line.as_bytes())?;
            inner.file.write_all(b"\n")?;
            inner.file.flush()?;
        }
        Ok(())
    }

    pub fn path_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("scheduler-{date}.log"))
    }

    pub fn today_path(&self) -> PathBuf {
        self.path_for(&Local::now().format("%d%m%Y").to_string())
    }

    /// Today's log contents for inspection surfaces. Child processes
    /// write whatever bytes they like, so decode lossily rather than
    /// fail on a stray non-UTF-8 sequence.
    pub fn read_today(&self) -> Result<String> {
        let bytes = std::fs::read(self.today_path())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
