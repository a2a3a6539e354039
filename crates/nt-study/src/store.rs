//! Durable study storage: one JSON trial record per line, append-only.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use nt_types::{StoreError, TrialResult};
use tracing::{debug, warn};

/// Append-only JSON-lines file mapping trial numbers to their results.
/// Survives process restarts; each append is flushed to disk before the
/// next trial starts.
#[derive(Debug)]
pub struct StudyStore {
    path: PathBuf,
    file: File,
}

impl StudyStore {
    /// Open the store (creating it if absent) and load every recorded
    /// trial. A torn trailing line — the footprint of a crash mid-append —
    /// is dropped with a warning; corruption anywhere else is fatal.
    pub fn open(path: &Path) -> Result<(Self, Vec<TrialResult>), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| open_error(path, &e))?;
            }
        }

        let mut trials = Vec::new();
        if path.exists() {
            let file = File::open(path).map_err(|e| open_error(path, &e))?;
            let lines: Vec<String> = BufReader::new(file)
                .lines()
                .collect::<Result<_, _>>()
                .map_err(|e| open_error(path, &e))?;

            for (idx, line) in lines.iter().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<TrialResult>(line) {
                    Ok(trial) => trials.push(trial),
                    Err(e) if idx + 1 == lines.len() => {
                        warn!(
                            line = idx + 1,
                            "dropping torn trailing record in study store: {e}"
                        );
                    }
                    Err(e) => {
                        return Err(StoreError::Corrupt {
                            path: path.display().to_string(),
                            line: idx + 1,
                            message: e.to_string(),
                        });
                    }
                }
            }
            debug!(trials = trials.len(), store = %path.display(), "loaded study store");
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| open_error(path, &e))?;

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
            },
            trials,
        ))
    }

    pub fn append(&mut self, trial: &TrialResult) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(trial).map_err(|e| self.append_error(&e))?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| self.append_error(&e))?;
        self.file.sync_data().map_err(|e| self.append_error(&e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_error(&self, e: &dyn std::fmt::Display) -> StoreError {
        StoreError::Append {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}

fn open_error(path: &Path, e: &dyn std::fmt::Display) -> StoreError {
    StoreError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_types::Assignment;

    fn trial(number: u64) -> TrialResult {
        let mut t = TrialResult::new(number, Assignment::new());
        t.mark_completed(-50.0 - number as f64);
        t
    }

    #[test]
    fn append_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.jsonl");

        let (mut store, loaded) = StudyStore::open(&path).unwrap();
        assert!(loaded.is_empty());
        store.append(&trial(0)).unwrap();
        store.append(&trial(1)).unwrap();
        drop(store);

        let (_, loaded) = StudyStore::open(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].trial_number, 0);
        assert_eq!(loaded[1].trial_number, 1);
        assert_eq!(loaded[1].objective, -51.0);
    }

    #[test]
    fn torn_trailing_line_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.jsonl");

        let (mut store, _) = StudyStore::open(&path).unwrap();
        store.append(&trial(0)).unwrap();
        drop(store);

        let mut contents = fs::read_to_string(&path).unwrap();
        contents.push_str("{\"trial_number\":1,\"assign");
        fs::write(&path, contents).unwrap();

        let (_, loaded) = StudyStore::open(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].trial_number, 0);
    }

    #[test]
    fn corruption_in_the_middle_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("study.jsonl");

        let (mut store, _) = StudyStore::open(&path).unwrap();
        store.append(&trial(0)).unwrap();
        drop(store);

        let mut contents = fs::read_to_string(&path).unwrap();
        contents = format!("not json at all\n{contents}");
        fs::write(&path, contents).unwrap();

        match StudyStore::open(&path) {
            Err(StoreError::Corrupt { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected corrupt store, got {other:?}"),
        }
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("study.jsonl");

        let (mut store, _) = StudyStore::open(&path).unwrap();
        store.append(&trial(0)).unwrap();
        assert!(path.exists());
    }
}
