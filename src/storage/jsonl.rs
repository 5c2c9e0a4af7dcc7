//! JSONL record storage
//!
//! Tasks, hold reasons and template rows are stored one JSON object per line.
//! Uses file locking for concurrent access safety.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::{HoldReason, HoldReasonId, Task, TaskId, TemplateRow, TemplateRowId};

/// A record that can live in a [`JsonlStore`]
pub trait Record: Serialize + DeserializeOwned {
    type Key: Ord + Copy;

    /// Label used in error messages
    const KIND: &'static str;

    fn key(&self) -> Self::Key;
}

impl Record for Task {
    type Key = TaskId;
    const KIND: &'static str = "task";

    fn key(&self) -> TaskId {
        self.id
    }
}

impl Record for HoldReason {
    type Key = HoldReasonId;
    const KIND: &'static str = "hold reason";

    fn key(&self) -> HoldReasonId {
        self.id
    }
}

impl Record for TemplateRow {
    type Key = TemplateRowId;
    const KIND: &'static str = "template row";

    fn key(&self) -> TemplateRowId {
        self.id
    }
}

/// Store for records in JSONL format
pub struct JsonlStore<T> {
    path: PathBuf,
    _record: PhantomData<T>,
}

impl<T: Record> JsonlStore<T> {
    /// Creates a new store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all records, ordered by key
    ///
    /// A key seen on several lines keeps its last occurrence, so appended
    /// updates win over older lines.
    pub fn read_all(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open {} store: {}", T::KIND, self.path.display()))?;

        file.lock_shared()
            .with_context(|| format!("Failed to acquire read lock on {} store", T::KIND))?;

        let reader = BufReader::new(&file);
        let mut records = BTreeMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let record: T = serde_json::from_str(&line).with_context(|| {
                format!("Failed to parse {} at line {}", T::KIND, line_num + 1)
            })?;

            records.insert(record.key(), record);
        }

        // Lock is released when file is dropped
        Ok(records.into_values().collect())
    }

    /// Writes all records to the store (full rewrite, sorted by key)
    pub fn write_all<'a>(&self, records: impl IntoIterator<Item = &'a T>) -> Result<()>
    where
        T: 'a,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to acquire write lock on {} store", T::KIND))?;

            let mut writer = BufWriter::new(&file);

            let mut sorted: Vec<&T> = records.into_iter().collect();
            sorted.sort_by_key(|r| r.key());

            for record in sorted {
                let line = serde_json::to_string(record)
                    .with_context(|| format!("Failed to serialize {}", T::KIND))?;
                writeln!(writer, "{}", line)
                    .with_context(|| format!("Failed to write {}", T::KIND))?;
            }

            writer
                .flush()
                .with_context(|| format!("Failed to flush {} store", T::KIND))?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }

    /// Appends a single record without rewriting the file
    pub fn append(&self, record: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {} store: {}", T::KIND, self.path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire write lock on {} store", T::KIND))?;

        let mut writer = BufWriter::new(&file);
        let line = serde_json::to_string(record)
            .with_context(|| format!("Failed to serialize {}", T::KIND))?;
        writeln!(writer, "{}", line).with_context(|| format!("Failed to write {}", T::KIND))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {} store", T::KIND))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HoldRegistry, NewHoldReason, NewTask, WorkingCalendar};
    use tempfile::TempDir;

    fn make_task(n: u64) -> Task {
        let new = NewTask::new(
            format!("Task {}", n),
            "2024-01-01".parse().unwrap(),
            2,
        );
        Task::scheduled(TaskId::new(n), n as u32, &new, &WorkingCalendar::default()).unwrap()
    }

    #[test]
    fn read_empty_store() {
        let dir = TempDir::new().unwrap();
        let store: JsonlStore<Task> = JsonlStore::new(dir.path().join("tasks.jsonl"));

        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn write_and_read_sorted() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("tasks.jsonl"));

        let tasks = vec![make_task(3), make_task(1), make_task(2)];
        store.write_all(&tasks).unwrap();

        let loaded: Vec<Task> = store.read_all().unwrap();
        let ids: Vec<_> = loaded.iter().map(|t| t.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(loaded[0].name, "Task 1");
    }

    #[test]
    fn appended_line_wins() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("tasks.jsonl"));

        let mut task = make_task(1);
        store.append(&task).unwrap();
        task.rename("Renamed");
        store.append(&task).unwrap();

        let loaded: Vec<Task> = store.read_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Renamed");
    }

    #[test]
    fn stores_hold_reasons() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("hold_reasons.jsonl"));

        let mut registry = HoldRegistry::new();
        registry.create(NewHoldReason::named("Weather"));
        store.write_all(registry.iter()).unwrap();

        let loaded: Vec<HoldReason> = store.read_all().unwrap();
        assert_eq!(HoldRegistry::from_reasons(loaded), registry);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("nested").join("dir").join("tasks.jsonl"));

        store.append(&make_task(1)).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn atomic_write() {
        let dir = TempDir::new().unwrap();
        let store = JsonlStore::new(dir.path().join("tasks.jsonl"));

        store.write_all(&[make_task(1)]).unwrap();

        // Temp file should not exist after write
        let temp_path = store.path().with_extension("jsonl.tmp");
        assert!(!temp_path.exists());
    }

    #[test]
    fn corrupt_line_reports_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");
        fs::write(&path, "{not json}\n").unwrap();

        let store: JsonlStore<Task> = JsonlStore::new(path);
        let err = store.read_all().unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
    }
}
