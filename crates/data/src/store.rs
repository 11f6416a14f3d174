//! File-backed key-value store.
//!
//! One JSON file per key under a namespace directory. Writes land in a
//! temporary file in the same directory and are committed with a rename, so
//! a record is either fully replaced or untouched; a crash mid-write never
//! leaves a torn record. Reads and writes of distinct keys are independent
//! files, which is what lets a concurrently running deferred job and a
//! manual command touch the same namespace safely.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error reading/writing a record file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A typed view over one directory of records, keyed by ticker.
#[derive(Debug, Clone)]
pub struct Namespace<T> {
    dir: PathBuf,
    _record: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Namespace<T> {
    /// Opens (creating if needed) the namespace directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            _record: PhantomData,
        })
    }

    /// Reads the record for `key`, or `None` if absent.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn read(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Returns `true` if a record exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.record_path(key).exists()
    }

    /// Atomically replaces the record for `key`.
    ///
    /// The record is serialized to a temporary file and renamed into place,
    /// so the replace is all-or-nothing.
    ///
    /// # Errors
    /// Returns an error if serialization or the filesystem operations fail.
    pub fn write(&self, key: &str, record: &T) -> Result<(), StoreError> {
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(writer, record)?;
        }
        let path = self.record_path(key);
        fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), "wrote record");
        Ok(())
    }

    /// Deletes the record for `key`. Returns `false` if it was absent.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    /// Reads every record in the namespace, sorted by key.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed or a record fails
    /// to parse.
    pub fn entries(&self) -> Result<Vec<(String, T)>, StoreError> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // In-flight temp files are dot-prefixed.
            if name.starts_with('.') {
                continue;
            }
            let Some(key) = name.strip_suffix(".json") else {
                continue;
            };
            let reader = BufReader::new(File::open(&path)?);
            entries.push((key.to_string(), serde_json::from_reader(reader)?));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
        rev: u32,
    }

    fn open(dir: &TempDir) -> Namespace<Note> {
        Namespace::open(dir.path()).unwrap()
    }

    #[test]
    fn read_of_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let ns = open(&dir);
        assert!(ns.read("AAPL").unwrap().is_none());
        assert!(!ns.contains("AAPL"));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let ns = open(&dir);
        let note = Note {
            text: "breakout".to_string(),
            rev: 1,
        };
        ns.write("AAPL", &note).unwrap();
        assert_eq!(ns.read("AAPL").unwrap(), Some(note));
    }

    #[test]
    fn write_replaces_existing_record() {
        let dir = TempDir::new().unwrap();
        let ns = open(&dir);
        ns.write("AAPL", &Note { text: "a".into(), rev: 1 }).unwrap();
        ns.write("AAPL", &Note { text: "b".into(), rev: 2 }).unwrap();
        assert_eq!(ns.read("AAPL").unwrap().unwrap().rev, 2);
    }

    #[test]
    fn delete_reports_whether_a_record_existed() {
        let dir = TempDir::new().unwrap();
        let ns = open(&dir);
        ns.write("AAPL", &Note { text: "a".into(), rev: 1 }).unwrap();
        assert!(ns.delete("AAPL").unwrap());
        assert!(!ns.delete("AAPL").unwrap());
        assert!(ns.read("AAPL").unwrap().is_none());
    }

    #[test]
    fn entries_lists_records_sorted_and_skips_temp_files() {
        let dir = TempDir::new().unwrap();
        let ns = open(&dir);
        ns.write("MSFT", &Note { text: "m".into(), rev: 1 }).unwrap();
        ns.write("AAPL", &Note { text: "a".into(), rev: 1 }).unwrap();
        std::fs::write(dir.path().join(".GOOG.json.tmp"), b"{garbage").unwrap();

        let entries = ns.entries().unwrap();
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["AAPL", "MSFT"]);
    }
}
