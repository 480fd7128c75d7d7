//! Append-only mutation journal.
//!
//! Every committed mutation of the registry is appended as one text line;
//! replaying the journal from the top into an empty store reproduces the
//! registry exactly. The format is human-auditable:
//!
//! ```text
//! # Mon Aug 24 21:03:11 2026
//! +  DBF000001|n:file.bin|g:movies|c:|s:42|md1:<32hex>|md5:<32hex>|ed2k:<32hex>|
//! !  DBF000001|n:renamed.bin|g:|c:|s:0|md1:|md5:|ed2k:|
//! !! DBF000001|n:renamed.bin|g:movies|c:|s:42|md1:<32hex>|md5:<32hex>|ed2k:<32hex>|
//! ```
//!
//! `+  ` adds a record, `!  ` announces a pending metadata update, `!! `
//! records the applied post-update state. `# ` lines are comments. The line
//! codec is lossless and canonical: serializing a parsed line reproduces it
//! byte for byte. Absent group/comment serialize as empty fields, never as a
//! null marker.

use anyhow::{bail, Context, Result};
use chrono::Local;
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::consts::{LOG_ADD, LOG_COMMENT, LOG_UPDATE_APPLIED, LOG_UPDATE_PENDING};
use crate::record::FileRecord;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalOp {
    Add,
    UpdatePending,
    UpdateApplied,
}

impl JournalOp {
    fn prefix(self) -> &'static str {
        match self {
            JournalOp::Add => LOG_ADD,
            JournalOp::UpdatePending => LOG_UPDATE_PENDING,
            JournalOp::UpdateApplied => LOG_UPDATE_APPLIED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub op: JournalOp,
    pub record: FileRecord,
}

impl JournalEntry {
    pub fn new(op: JournalOp, record: FileRecord) -> Self {
        Self { op, record }
    }

    pub fn to_line(&self) -> String {
        format!("{}{}", self.op.prefix(), record_body(&self.record))
    }

    /// Parse one journal line. Comment and blank lines yield `Ok(None)`;
    /// anything else must be a well-formed entry.
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (op, body) = if let Some(rest) = line.strip_prefix(LOG_ADD) {
            (JournalOp::Add, rest)
        } else if let Some(rest) = line.strip_prefix(LOG_UPDATE_APPLIED) {
            (JournalOp::UpdateApplied, rest)
        } else if let Some(rest) = line.strip_prefix(LOG_UPDATE_PENDING) {
            (JournalOp::UpdatePending, rest)
        } else {
            bail!("unrecognized journal line: {}", line);
        };
        Ok(Some(Self {
            op,
            record: parse_record_body(body)?,
        }))
    }
}

/// Whether a value can be embedded in a journal field. The field separator
/// and line breaks are the only bytes the line codec cannot round-trip;
/// callers must refuse such values before anything reaches the journal.
pub fn clean_field(s: &str) -> bool {
    !s.contains(['|', '\n', '\r'])
}

fn record_body(rec: &FileRecord) -> String {
    format!(
        "DBF{:06}|n:{}|g:{}|c:{}|s:{}|md1:{}|md5:{}|ed2k:{}|",
        rec.id,
        rec.name,
        rec.group.as_deref().unwrap_or(""),
        rec.comment.as_deref().unwrap_or(""),
        rec.size,
        rec.md1,
        rec.md5,
        rec.ed2k,
    )
}

fn parse_record_body(body: &str) -> Result<FileRecord> {
    let parts: Vec<&str> = body.split('|').collect();
    // eight fields plus the empty tail after the final separator
    if parts.len() != 9 || !parts[8].is_empty() {
        bail!("malformed journal record: {}", body);
    }
    let id_str = parts[0]
        .strip_prefix("DBF")
        .with_context(|| format!("missing DBF tag in: {}", body))?;
    if id_str.is_empty() || !id_str.bytes().all(|b| b.is_ascii_digit()) {
        bail!("bad record id in: {}", body);
    }
    let id: u64 = id_str.parse()?;

    let field = |idx: usize, tag: &str| -> Result<String> {
        parts[idx]
            .strip_prefix(tag)
            .map(str::to_string)
            .with_context(|| format!("missing {} field in: {}", tag, body))
    };
    let name = field(1, "n:")?;
    let group = field(2, "g:")?;
    let comment = field(3, "c:")?;
    let size_str = field(4, "s:")?;
    if size_str.is_empty() || !size_str.bytes().all(|b| b.is_ascii_digit()) {
        bail!("bad size in: {}", body);
    }

    Ok(FileRecord {
        id,
        name,
        group: (!group.is_empty()).then_some(group),
        comment: (!comment.is_empty()).then_some(comment),
        size: size_str.parse()?,
        md1: field(5, "md1:")?,
        md5: field(6, "md5:")?,
        ed2k: field(7, "ed2k:")?,
    })
}

/// Counters from a completed replay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayStats {
    pub lines: usize,
    pub adds: usize,
    pub updates: usize,
}

/// Append handle. The file is opened lazily on the first append of a
/// session; a timestamp comment marks each session in the journal.
pub struct Journal {
    path: PathBuf,
    file: Option<File>,
}

impl Journal {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        if self.file.is_none() {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("open journal {}", self.path.display()))?;
            let stamp = Local::now().format("%a %b %e %H:%M:%S %Y");
            writeln!(f, "{}{}", LOG_COMMENT, stamp)
                .with_context(|| format!("write journal {}", self.path.display()))?;
            self.file = Some(f);
        }
        let f = self.file.as_mut().context("journal file just opened")?;
        writeln!(f, "{}", entry.to_line())
            .with_context(|| format!("write journal {}", self.path.display()))?;
        f.sync_data()
            .with_context(|| format!("sync journal {}", self.path.display()))?;
        Ok(())
    }

    /// Replay the journal at `path` into an empty store, file order. `Add`
    /// lines insert preserving the logged id; `!! ` lines overwrite the
    /// record with the same id; `!  ` lines are informational only. The
    /// first unparseable line aborts the whole replay -- a partially
    /// recovered registry is never accepted silently.
    pub fn replay(path: &Path, store: &mut Store) -> Result<ReplayStats> {
        let file =
            File::open(path).with_context(|| format!("open journal {}", path.display()))?;
        let mut stats = ReplayStats::default();
        for (no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("read journal {}", path.display()))?;
            stats.lines = no + 1;
            let entry = JournalEntry::parse_line(&line)
                .with_context(|| format!("replay failed at {}:{}", path.display(), no + 1))?;
            let Some(entry) = entry else { continue };
            match entry.op {
                JournalOp::Add => {
                    store.insert(entry.record).with_context(|| {
                        format!("replay failed at {}:{}", path.display(), no + 1)
                    })?;
                    stats.adds += 1;
                }
                JournalOp::UpdateApplied => {
                    if store.replace(entry.record) {
                        stats.updates += 1;
                    } else {
                        warn!(
                            "journal {}:{}: update for an id never added, skipped",
                            path.display(),
                            no + 1
                        );
                    }
                }
                JournalOp::UpdatePending => {
                    debug!("journal {}:{}: pending update ignored", path.display(), no + 1);
                }
            }
        }
        info!(
            "replayed {}: {} lines, {} adds, {} updates",
            path.display(),
            stats.lines,
            stats.adds,
            stats.updates
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec() -> FileRecord {
        FileRecord {
            id: 7,
            name: "a.bin".into(),
            group: None,
            comment: Some("note".into()),
            size: 1234,
            md1: "1".repeat(32),
            md5: "2".repeat(32),
            ed2k: "3".repeat(32),
        }
    }

    #[test]
    fn line_roundtrip_is_canonical() {
        for op in [JournalOp::Add, JournalOp::UpdatePending, JournalOp::UpdateApplied] {
            let line = JournalEntry::new(op, rec()).to_line();
            let parsed = JournalEntry::parse_line(&line).unwrap().unwrap();
            assert_eq!(parsed.op, op);
            assert_eq!(parsed.to_line(), line);
        }
    }

    #[test]
    fn empty_metadata_serializes_as_empty_fields() {
        let mut r = rec();
        r.comment = None;
        let line = JournalEntry::new(JournalOp::Add, r.clone()).to_line();
        assert!(line.contains("|g:|c:|"));
        let parsed = JournalEntry::parse_line(&line).unwrap().unwrap();
        assert_eq!(parsed.record, r);
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        assert!(JournalEntry::parse_line("# Mon Aug 24 2026").unwrap().is_none());
        assert!(JournalEntry::parse_line("").unwrap().is_none());
        assert!(JournalEntry::parse_line("   ").unwrap().is_none());
    }

    #[test]
    fn garbage_lines_are_fatal() {
        assert!(JournalEntry::parse_line("?? DBF000001|n:x|").is_err());
        assert!(JournalEntry::parse_line("+  DBF|n:x|g:|c:|s:1|md1:|md5:|ed2k:|").is_err());
        assert!(JournalEntry::parse_line("+  DBF000001|n:x|g:|c:|s:nan|md1:|md5:|ed2k:|").is_err());
        assert!(JournalEntry::parse_line("+  DBF000001|n:x|g:|s:1|md1:|md5:|ed2k:|").is_err());
    }

    #[test]
    fn separator_bytes_are_not_clean() {
        assert!(clean_field("Some Show - 01.mkv"));
        assert!(clean_field(""));
        assert!(!clean_field("a|b.bin"));
        assert!(!clean_field("two\nlines"));
        assert!(!clean_field("cr\rhere"));
    }

    #[test]
    fn wide_ids_still_roundtrip() {
        let mut r = rec();
        r.id = 12_345_678; // wider than the 6-digit pad
        let line = JournalEntry::new(JournalOp::Add, r).to_line();
        assert!(line.starts_with("+  DBF12345678|"));
        let parsed = JournalEntry::parse_line(&line).unwrap().unwrap();
        assert_eq!(parsed.to_line(), line);
    }
}
