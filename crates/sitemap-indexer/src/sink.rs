//! Registration sinks: where accepted URLs end up.

use crate::record::UrlRecord;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::warn;

/// Accepts URL records for the sitemap.
pub trait RegistrationSink {
    /// Store or queue one record. Failures are the sink's to report.
    fn register(&self, record: UrlRecord);

    /// Whether any URL has been registered so far.
    fn has_registered_urls(&self) -> bool;
}

impl<T: RegistrationSink + ?Sized> RegistrationSink for &T {
    fn register(&self, record: UrlRecord) {
        (**self).register(record)
    }

    fn has_registered_urls(&self) -> bool {
        (**self).has_registered_urls()
    }
}

impl<T: RegistrationSink + ?Sized> RegistrationSink for Rc<T> {
    fn register(&self, record: UrlRecord) {
        (**self).register(record)
    }

    fn has_registered_urls(&self) -> bool {
        (**self).has_registered_urls()
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RefCell<Vec<UrlRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UrlRecord> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl RegistrationSink for MemorySink {
    fn register(&self, record: UrlRecord) {
        self.records.borrow_mut().push(record);
    }

    fn has_registered_urls(&self) -> bool {
        !self.is_empty()
    }
}

/// Append-only JSON-lines file of registered URLs.
pub struct JsonlSink {
    file: File,
    path: PathBuf,
}

impl JsonlSink {
    /// Open or create the output file.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RegistrationSink for JsonlSink {
    fn register(&self, record: UrlRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!(identifier = %record.identifier, "failed to encode URL record: {e}");
                return;
            }
        };
        let mut file = &self.file;
        if let Err(e) = writeln!(file, "{line}") {
            warn!(path = %self.path.display(), "failed to append URL record: {e}");
        }
    }

    fn has_registered_urls(&self) -> bool {
        self.file.metadata().map(|m| m.len() > 0).unwrap_or(false)
    }
}
