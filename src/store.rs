//! Single-file registry store.
//!
//! Records live in one JSON-lines file, fully loaded into an id-ordered map.
//! Mutations are buffered in memory; `commit` persists them atomically
//! (tmp + rename + best-effort dir fsync), `rollback` restores the last
//! committed view. An exclusive advisory lock next to the store file keeps
//! out concurrent writers for the lifetime of the handle.

use anyhow::{bail, Context, Result};
use log::debug;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::lock::{try_acquire_exclusive, LockGuard};
use crate::record::FileRecord;

/// Outcome of a metadata update. Not finding the record or having nothing
/// to change are ordinary results, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(FileRecord),
    NotFound,
    NoChange,
}

/// Fuzzy query filter: id matches exactly, the text fields match
/// case-insensitively, every whitespace-separated word in order.
#[derive(Debug, Clone, Default)]
pub struct InfoFilter {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub group: Option<String>,
    pub comment: Option<String>,
}

pub struct Store {
    path: Option<PathBuf>,
    records: BTreeMap<u64, FileRecord>,
    committed: BTreeMap<u64, FileRecord>,
    next_id: u64,
    dirty: bool,
    _lock: Option<LockGuard>,
}

impl Store {
    /// Open (or create on first commit) the store at `path`, taking the
    /// writer lock. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let lock = try_acquire_exclusive(path)?;
        let records = if path.exists() {
            load_records(path)?
        } else {
            BTreeMap::new()
        };
        let next_id = records.keys().next_back().map_or(1, |id| id + 1);
        debug!(
            "store {}: {} records, next id {}",
            path.display(),
            records.len(),
            next_id
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            committed: records.clone(),
            records,
            next_id,
            dirty: false,
            _lock: Some(lock),
        })
    }

    /// Ephemeral store with no backing file (tests, dry runs). Commit only
    /// snapshots the in-memory view.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            records: BTreeMap::new(),
            committed: BTreeMap::new(),
            next_id: 1,
            dirty: false,
            _lock: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&FileRecord> {
        self.records.get(&id)
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Exact content-key lookup, in id order. With `full` set to None only
    /// size and md1 are compared (the quick check); otherwise all four
    /// fingerprint fields must match.
    pub fn query_data(
        &self,
        size: u64,
        md1: &str,
        full: Option<(&str, &str)>,
    ) -> Vec<&FileRecord> {
        self.records
            .values()
            .filter(|r| r.size == size && r.md1 == md1)
            .filter(|r| match full {
                Some((md5, ed2k)) => r.md5 == md5 && r.ed2k == ed2k,
                None => true,
            })
            .collect()
    }

    /// Metadata lookup, in id order. Fields left None are ignored.
    pub fn query_info(&self, filter: &InfoFilter) -> Vec<&FileRecord> {
        self.records
            .values()
            .filter(|r| filter.id.map_or(true, |id| r.id == id))
            .filter(|r| {
                filter
                    .name
                    .as_deref()
                    .map_or(true, |n| contains_words(Some(&r.name), n))
            })
            .filter(|r| {
                filter
                    .group
                    .as_deref()
                    .map_or(true, |g| contains_words(r.group.as_deref(), g))
            })
            .filter(|r| {
                filter
                    .comment
                    .as_deref()
                    .map_or(true, |c| contains_words(r.comment.as_deref(), c))
            })
            .collect()
    }

    /// Stage an insert. An id of 0 gets the next free identifier; an
    /// explicit id (journal replay) is preserved and must be unused.
    /// Returns the assigned id. Visible to queries immediately.
    pub fn insert(&mut self, mut record: FileRecord) -> Result<u64> {
        if record.id == 0 {
            record.id = self.next_id;
        } else if self.records.contains_key(&record.id) {
            bail!("duplicate record id {}", record.id);
        }
        self.next_id = self.next_id.max(record.id + 1);
        let id = record.id;
        self.records.insert(id, record);
        self.dirty = true;
        Ok(id)
    }

    /// Replace the record with the same id wholesale. Returns false when no
    /// such record exists.
    pub fn replace(&mut self, record: FileRecord) -> bool {
        if !self.records.contains_key(&record.id) {
            return false;
        }
        self.records.insert(record.id, record);
        self.dirty = true;
        true
    }

    /// Stage a metadata update. Only non-empty supplied fields are written
    /// unless `set_all` forces every metadata field (clearing the absent
    /// ones). Digest fields are never touched.
    pub fn update_meta(
        &mut self,
        id: u64,
        name: Option<&str>,
        group: Option<&str>,
        comment: Option<&str>,
        set_all: bool,
    ) -> UpdateOutcome {
        let Some(rec) = self.records.get_mut(&id) else {
            return UpdateOutcome::NotFound;
        };
        let mut changed = false;
        if set_all || name.is_some_and(|s| !s.is_empty()) {
            rec.name = name.unwrap_or("").to_string();
            changed = true;
        }
        if set_all || group.is_some_and(|s| !s.is_empty()) {
            rec.group = group.filter(|s| !s.is_empty()).map(str::to_string);
            changed = true;
        }
        if set_all || comment.is_some_and(|s| !s.is_empty()) {
            rec.comment = comment.filter(|s| !s.is_empty()).map(str::to_string);
            changed = true;
        }
        if !changed {
            return UpdateOutcome::NoChange;
        }
        self.dirty = true;
        UpdateOutcome::Updated(rec.clone())
    }

    /// Persist all staged mutations atomically and make them the new
    /// rollback point.
    pub fn commit(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            if self.dirty {
                write_records(path, &self.records)?;
            }
        }
        self.committed = self.records.clone();
        self.dirty = false;
        Ok(())
    }

    /// Discard all staged mutations, restoring the last committed view.
    pub fn rollback(&mut self) {
        self.records = self.committed.clone();
        self.next_id = self.records.keys().next_back().map_or(1, |id| id + 1);
        self.dirty = false;
    }
}

fn load_records(path: &Path) -> Result<BTreeMap<u64, FileRecord>> {
    let file = File::open(path).with_context(|| format!("open store {}", path.display()))?;
    let mut records = BTreeMap::new();
    for (no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read store {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let rec: FileRecord = serde_json::from_str(&line)
            .with_context(|| format!("bad store record at {}:{}", path.display(), no + 1))?;
        if records.insert(rec.id, rec).is_some() {
            bail!("duplicate record id in store {}:{}", path.display(), no + 1);
        }
    }
    Ok(records)
}

fn write_records(path: &Path, records: &BTreeMap<u64, FileRecord>) -> Result<()> {
    let mut tmp_os = OsString::from(path.as_os_str());
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);

    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .with_context(|| format!("open store tmp {}", tmp.display()))?;
    for rec in records.values() {
        let line = serde_json::to_string(rec)?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;
    }
    f.sync_all()
        .with_context(|| format!("sync store tmp {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;

    // fsync the parent directory so the rename itself is durable
    // (best-effort; not available on all platforms).
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Case-insensitive "all words appear in order" match, the text-field
/// equivalent of an SQL `ILIKE '%w1%w2%'` filter.
fn contains_words(haystack: Option<&str>, needle: &str) -> bool {
    let Some(hay) = haystack else {
        return false;
    };
    let hay = hay.to_lowercase();
    let mut pos = 0;
    for word in needle.to_lowercase().split_whitespace() {
        match hay[pos..].find(&word) {
            Some(i) => pos += i + word.len(),
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, size: u64, md1: &str) -> FileRecord {
        FileRecord {
            id: 0,
            name: name.into(),
            group: Some("grp".into()),
            comment: None,
            size,
            md1: md1.into(),
            md5: "m".repeat(32),
            ed2k: "e".repeat(32),
        }
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let mut st = Store::ephemeral();
        assert_eq!(st.insert(rec("a", 1, "x")).unwrap(), 1);
        assert_eq!(st.insert(rec("b", 2, "y")).unwrap(), 2);
        // explicit id is preserved and bumps the sequence
        let mut r = rec("c", 3, "z");
        r.id = 10;
        assert_eq!(st.insert(r).unwrap(), 10);
        assert_eq!(st.insert(rec("d", 4, "w")).unwrap(), 11);
    }

    #[test]
    fn quick_query_ignores_full_digests() {
        let mut st = Store::ephemeral();
        let mut r = rec("a", 5, "head");
        r.md5 = "1".repeat(32);
        st.insert(r).unwrap();

        assert_eq!(st.query_data(5, "head", None).len(), 1);
        assert!(st
            .query_data(5, "head", Some((&"2".repeat(32), &"e".repeat(32))))
            .is_empty());
    }

    #[test]
    fn info_filter_contains_words() {
        let mut st = Store::ephemeral();
        let mut r = rec("My Great File.mkv", 1, "x");
        r.comment = Some("Some Long Comment".into());
        st.insert(r).unwrap();

        let hits = st.query_info(&InfoFilter {
            name: Some("great file".into()),
            ..Default::default()
        });
        assert_eq!(hits.len(), 1);

        let hits = st.query_info(&InfoFilter {
            comment: Some("long some".into()), // out of order
            ..Default::default()
        });
        assert!(hits.is_empty());

        let hits = st.query_info(&InfoFilter {
            group: Some("nope".into()),
            ..Default::default()
        });
        assert!(hits.is_empty());
    }

    #[test]
    fn update_meta_outcomes() {
        let mut st = Store::ephemeral();
        let id = st.insert(rec("a", 1, "x")).unwrap();

        assert_eq!(
            st.update_meta(999, Some("n"), None, None, false),
            UpdateOutcome::NotFound
        );
        assert_eq!(st.update_meta(id, None, None, None, false), UpdateOutcome::NoChange);

        match st.update_meta(id, Some("renamed"), None, Some("note"), false) {
            UpdateOutcome::Updated(r) => {
                assert_eq!(r.name, "renamed");
                assert_eq!(r.comment.as_deref(), Some("note"));
                assert_eq!(r.group.as_deref(), Some("grp")); // untouched
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // set_all clears fields that were not supplied
        match st.update_meta(id, Some("again"), None, None, true) {
            UpdateOutcome::Updated(r) => {
                assert_eq!(r.name, "again");
                assert_eq!(r.group, None);
                assert_eq!(r.comment, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn rollback_restores_committed_view() {
        let mut st = Store::ephemeral();
        st.insert(rec("kept", 1, "x")).unwrap();
        st.commit().unwrap();
        st.insert(rec("dropped", 2, "y")).unwrap();
        assert_eq!(st.len(), 2);
        st.rollback();
        assert_eq!(st.len(), 1);
        assert_eq!(st.records().next().unwrap().name, "kept");
        // ids are not burned by a rolled back insert
        assert_eq!(st.insert(rec("new", 3, "z")).unwrap(), 2);
    }
}
