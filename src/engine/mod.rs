//! Run orchestration: register/check runs, batch import, metadata updates,
//! queries and journal-based recovery.
//!
//! Files are processed strictly sequentially. The only concurrency is one
//! hash worker per file during the full stage: the worker owns the
//! fingerprint, the orchestrator keeps the progress counter and the cancel
//! token and polls every 250 ms to re-render the status line and to watch
//! for an interrupt. The store is only ever touched from the orchestrating
//! thread.
//!
//! Mutations are staged in the store, decided by the commit policy at the
//! end of the run, and journaled only after the store commit succeeded --
//! either every staged record of a run is persisted (and journaled, in
//! insertion order) or none are.

pub mod commit;
pub mod status;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::RegfileConfig;
use crate::consts::{DEFAULTS_FILES, POLL_INTERVAL_MS, RULER};
use crate::journal::{clean_field, Journal, JournalEntry, JournalOp, ReplayStats};
use crate::record::FileRecord;
use crate::store::{InfoFilter, Store, UpdateOutcome};
use crate::sum::{FileSum, SumParse};

use commit::{approve_commit, CommitMode, Prompt, StdinPrompt};
use status::{progress_message, StatusLine};

/// Per-run options resolved from the CLI and configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    pub group: Option<String>,
    pub comment: Option<String>,
    /// Consult per-directory defaults files for missing group/comment.
    pub use_defaults: bool,
    pub commit: CommitMode,
}

/// What a register or check run did.
#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    /// Files actually reached before the run ended (equals `total` unless
    /// interrupted).
    pub processed: usize,
    pub failed: Vec<String>,
    pub staged_ids: Vec<u64>,
    pub committed: bool,
    pub interrupted: bool,
}

/// What a batch import did.
#[derive(Debug)]
pub struct ImportSummary {
    pub files: usize,
    pub entries: usize,
    pub warnings: usize,
    pub failed: Vec<String>,
    pub committed: bool,
}

pub struct Engine {
    config: RegfileConfig,
    store: Store,
    journal: Journal,
    prompt: Box<dyn Prompt>,
    interrupt: Arc<AtomicBool>,
    // per-directory (group, comment) learned from defaults files;
    // None marks "directory inspected, nothing beyond the CLI values"
    defaults_cache: HashMap<PathBuf, Option<(Option<String>, Option<String>)>>,
}

impl Engine {
    pub fn new(config: RegfileConfig, store: Store, journal: Journal) -> Self {
        Self {
            config,
            store,
            journal,
            prompt: Box::new(StdinPrompt),
            interrupt: Arc::new(AtomicBool::new(false)),
            defaults_cache: HashMap::new(),
        }
    }

    /// Replace the interactive prompt (tests script it).
    pub fn set_prompt(&mut self, prompt: Box<dyn Prompt>) {
        self.prompt = prompt;
    }

    /// Flag checked between files and at every poll tick; setting it (e.g.
    /// from a Ctrl-C handler) cancels the current hash and ends the run.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &RegfileConfig {
        &self.config
    }

    /// Register new files: fingerprint, deduplicate, stage, commit.
    pub fn register(&mut self, files: &[PathBuf], opts: &RunOpts) -> Result<RunSummary> {
        self.register_check(files, opts, true)
    }

    /// Verify files against the registry without modifying it.
    pub fn check(&mut self, files: &[PathBuf], opts: &RunOpts) -> Result<RunSummary> {
        self.register_check(files, opts, false)
    }

    fn register_check(
        &mut self,
        files: &[PathBuf],
        opts: &RunOpts,
        register: bool,
    ) -> Result<RunSummary> {
        let status = StatusLine::new(files.len());
        let total_bytes = total_size(files);
        let run_start = Instant::now();
        let mut prev_bytes: u64 = 0;
        let mut prev_dir: Option<PathBuf> = None;
        let mut prev_gc: Option<(Option<String>, Option<String>)> = None;
        let mut failed: Vec<String> = Vec::new();
        let mut staged: Vec<FileRecord> = Vec::new();
        let mut interrupted = false;
        let mut processed = 0usize;

        for (idx, path) in files.iter().enumerate() {
            let no = idx + 1;
            processed = no;
            let short = short_name(path);

            let dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
            if prev_dir.as_deref() != Some(dir.as_path()) {
                println!("Directory [{}]", dir.display());
                prev_dir = Some(dir);
            }

            let (group, comment) = if register {
                let gc = self.group_comment(path, opts);
                if prev_gc.as_ref() != Some(&gc) {
                    println!(
                        "Using group:'{}' comment:'{}'",
                        gc.0.as_deref().unwrap_or(""),
                        gc.1.as_deref().unwrap_or("")
                    );
                    prev_gc = Some(gc.clone());
                }
                gc
            } else {
                (None, None)
            };

            // nothing with unjournalable metadata may be staged
            if register && !meta_fits_journal(&short, group.as_deref(), comment.as_deref()) {
                status.print(no, &short, "FAILED (name or metadata contains '|' or a line break)");
                failed.push(path.display().to_string());
                status.newline();
                continue;
            }

            // quick stage: size + md1 only
            status.print(no, &short, "Quick");
            let mut sum = match FileSum::for_file(path) {
                Ok(s) => s,
                Err(e) => {
                    fail_file(&status, no, &short, &e, path, &mut failed);
                    continue;
                }
            };
            if let Err(e) = sum.compute_size_head() {
                fail_file(&status, no, &short, &e, path, &mut failed);
                continue;
            }
            let size = sum.size().ok_or_else(|| anyhow!("size missing after head stage"))?;
            let md1 = sum
                .md1()
                .ok_or_else(|| anyhow!("md1 missing after head stage"))?
                .to_string();

            let might_be = !self.store.query_data(size, &md1, None).is_empty();
            if !register && !might_be {
                // a check cannot succeed without a quick match; skip the
                // expensive full read outright
                status.print(no, &short, "FAILED");
                failed.push(path.display().to_string());
                status.newline();
                continue;
            }

            // full stage on a worker; poll progress and the interrupt flag
            let token = sum.cancel_token();
            let progress = sum.progress();
            let worker = thread::spawn(move || {
                let result = sum.compute_full();
                (sum, result)
            });
            let mut cancel_sent = false;
            while !worker.is_finished() {
                if !cancel_sent && self.interrupt.load(Ordering::Relaxed) {
                    token.cancel();
                    cancel_sent = true;
                }
                status.print(
                    no,
                    &short,
                    &progress_message(
                        progress.bytes(),
                        size,
                        prev_bytes,
                        total_bytes,
                        run_start.elapsed().as_secs_f64(),
                        register && might_be,
                    ),
                );
                thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
            }
            let (sum, result) = worker
                .join()
                .map_err(|_| anyhow!("hash worker panicked for {}", path.display()))?;
            match result {
                Ok(true) => {}
                Ok(false) => {
                    status.print(no, &short, "Interrupted");
                    failed.push(format!("{}    (Interrupted)", path.display()));
                    status.newline();
                    interrupted = true;
                    break;
                }
                Err(e) => {
                    fail_file(&status, no, &short, &e, path, &mut failed);
                    continue;
                }
            }
            prev_bytes += size;

            // full check: all four fingerprint fields
            let md5 = sum
                .md5()
                .ok_or_else(|| anyhow!("md5 missing after full stage"))?
                .to_string();
            let ed2k = sum
                .ed2k()
                .ok_or_else(|| anyhow!("ed2k missing after full stage"))?
                .to_string();
            let matching = self
                .store
                .query_data(size, &md1, Some((&md5, &ed2k)))
                .into_iter()
                .next()
                .cloned();

            if register {
                let record = FileRecord {
                    id: 0,
                    name: sum.name().to_string(),
                    group: group.clone(),
                    comment: comment.clone(),
                    size,
                    md1: md1.clone(),
                    md5,
                    ed2k,
                };
                match matching {
                    None => {
                        let mut record = record;
                        record.id = self.store.insert(record.clone())?;
                        status.print(no, &short, &format!("New entry {}", record.id));
                        staged.push(record);
                    }
                    Some(existing) => {
                        let kind = if existing.same_entry(&record) { "full" } else { "data" };
                        status.print(
                            no,
                            &short,
                            &format!("Already registered ({} match) as {}", kind, existing.id),
                        );
                        failed.push(path.display().to_string());
                    }
                }
            } else {
                match matching {
                    Some(existing) => {
                        let verdict = if existing.name == sum.name() {
                            "OK".to_string()
                        } else {
                            format!("(as {}) OK", existing.name)
                        };
                        status.print(no, &short, &format!("id:{} {}", existing.id, verdict));
                    }
                    None => {
                        status.print(no, &short, "FAILED");
                        failed.push(path.display().to_string());
                    }
                }
            }
            status.newline();
        }

        println!("{}", RULER);
        let ok = processed - failed.len().min(processed);
        if register {
            println!("About to register {} files out of {}", ok, processed);
        } else {
            println!(
                "Passed {} files out of {}.{}",
                ok,
                processed,
                if failed.is_empty() { " ALL OK" } else { "" }
            );
        }
        print_failed(&failed);

        let mut committed = false;
        if register {
            if staged.is_empty() {
                println!("No files were registered!");
                self.store.rollback();
            } else if approve_commit(
                opts.commit,
                staged.len(),
                failed.len(),
                self.prompt.as_mut(),
            )? {
                self.store.commit().context("commit store")?;
                for record in &staged {
                    self.journal
                        .append(&JournalEntry::new(JournalOp::Add, record.clone()))?;
                }
                info!("registered {} new entries", staged.len());
                println!("Done.");
                committed = true;
            } else {
                self.store.rollback();
                println!("Aborted!");
            }
        }

        Ok(RunSummary {
            total: files.len(),
            processed,
            failed,
            staged_ids: staged.iter().map(|r| r.id).collect(),
            committed,
            interrupted,
        })
    }

    /// Import MYSUM fingerprint logs. A malformed line fails only its own
    /// file: that file's already-parsed records are dropped while files
    /// processed earlier in the run stay staged.
    pub fn import(&mut self, files: &[PathBuf], opts: &RunOpts) -> Result<ImportSummary> {
        let status = StatusLine::new(files.len());
        let mut prev_dir: Option<PathBuf> = None;
        let mut prev_gc: Option<(Option<String>, Option<String>)> = None;
        let mut failed: Vec<String> = Vec::new();
        let mut warnings = 0usize;
        let mut all_staged: Vec<FileRecord> = Vec::new();

        for (idx, path) in files.iter().enumerate() {
            let no = idx + 1;
            let short = short_name(path);

            let dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
            if prev_dir.as_deref() != Some(dir.as_path()) {
                println!("Directory [{}]", dir.display());
                prev_dir = Some(dir);
            }
            let (group, comment) = self.group_comment(path, opts);
            if prev_gc.as_ref() != Some(&(group.clone(), comment.clone())) {
                println!(
                    "Using group:'{}' comment:'{}'",
                    group.as_deref().unwrap_or(""),
                    comment.as_deref().unwrap_or("")
                );
                prev_gc = Some((group.clone(), comment.clone()));
            }
            status.print(no, &short, "");

            // imported names come through the fingerprint parser, which
            // already excludes the separator; the run metadata does not
            if !meta_fits_journal("", group.as_deref(), comment.as_deref()) {
                status.print(no, &short, "FAILED (metadata contains '|' or a line break)");
                failed.push(path.display().to_string());
                status.newline();
                continue;
            }

            let text = match fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) => {
                    fail_file(&status, no, &short, &anyhow!(e), path, &mut failed);
                    continue;
                }
            };

            let mut line_no = 0usize;
            let mut failed_at: Option<usize> = None;
            let mut file_records: Vec<FileRecord> = Vec::new();
            for line in text.lines() {
                line_no += 1;
                status.print(no, &short, &format!("L{}", line_no));
                let sum = match FileSum::parse_mysum(line) {
                    SumParse::Parsed(s) => s,
                    SumParse::Malformed(_) => {
                        status.print(no, &short, "not a MYSUM!");
                        status.newline();
                        failed_at = Some(line_no);
                        break;
                    }
                };
                status.print(no, &short, &format!("{} L{}", sum.name(), line_no));

                let record = FileRecord::from_sum(&sum, group.clone(), comment.clone())
                    .ok_or_else(|| anyhow!("parsed fingerprint is incomplete"))?;
                let matching = self
                    .store
                    .query_data(record.size, &record.md1, Some((&record.md5, &record.ed2k)))
                    .into_iter()
                    .next()
                    .cloned();
                if let Some(existing) = matching {
                    warnings += 1;
                    let kind = if existing.same_entry(&record) { "full" } else { "data" };
                    status.print(
                        no,
                        &short,
                        &format!(
                            "Already registered ({} match) as {} L{}",
                            kind, existing.id, line_no
                        ),
                    );
                    status.newline();
                    continue;
                }
                file_records.push(record);
            }

            match failed_at {
                Some(1) => {
                    status.print(no, &short, "FAILED");
                    failed.push(path.display().to_string());
                    status.newline();
                }
                Some(n) => {
                    let after = format!("after {} lines", n);
                    status.print(no, &short, &format!("FAILED {}", after));
                    failed.push(format!("{}       ({})", path.display(), after));
                    status.newline();
                }
                None => {
                    for record in file_records {
                        let mut record = record;
                        record.id = self.store.insert(record.clone())?;
                        all_staged.push(record);
                    }
                }
            }
            status.newline();
        }

        println!("{}", RULER);
        println!(
            "About to import {} entries ({} warnings) from {} files out of {}",
            all_staged.len(),
            warnings,
            files.len() - failed.len(),
            files.len()
        );
        print_failed(&failed);

        let mut committed = false;
        if all_staged.is_empty() {
            println!("Nothing to import!");
            self.store.rollback();
        } else if approve_commit(
            opts.commit,
            all_staged.len(),
            failed.len() + warnings,
            self.prompt.as_mut(),
        )? {
            self.store.commit().context("commit store")?;
            for record in &all_staged {
                self.journal
                    .append(&JournalEntry::new(JournalOp::Add, record.clone()))?;
            }
            info!("imported {} entries", all_staged.len());
            println!("Done.");
            committed = true;
        } else {
            self.store.rollback();
            println!("Aborted!");
        }

        Ok(ImportSummary {
            files: files.len(),
            entries: all_staged.len(),
            warnings,
            failed,
            committed,
        })
    }

    /// Update name/group/comment of the record with `id`. Supplied fields
    /// overwrite; with `set_all` every metadata field is forced (clearing
    /// the absent ones). A pending journal line precedes the attempt, an
    /// applied line (with the post-update record) follows success.
    pub fn setdata(
        &mut self,
        id: u64,
        name: Option<&str>,
        group: Option<&str>,
        comment: Option<&str>,
        set_all: bool,
    ) -> Result<UpdateOutcome> {
        for value in [name, group, comment].into_iter().flatten() {
            if !clean_field(value) {
                anyhow::bail!("metadata value '{}' contains '|' or a line break", value);
            }
        }
        let pending = FileRecord {
            id,
            name: name.unwrap_or("").to_string(),
            group: group.map(str::to_string),
            comment: comment.map(str::to_string),
            size: 0,
            md1: String::new(),
            md5: String::new(),
            ed2k: String::new(),
        };
        self.journal
            .append(&JournalEntry::new(JournalOp::UpdatePending, pending))?;

        let outcome = self.store.update_meta(id, name, group, comment, set_all);
        if let UpdateOutcome::Updated(record) = &outcome {
            self.store.commit().context("commit store")?;
            self.journal
                .append(&JournalEntry::new(JournalOp::UpdateApplied, record.clone()))?;
            debug!("updated entry {}", id);
        }
        Ok(outcome)
    }

    /// Fuzzy query; an empty result is an ordinary `Ok`.
    pub fn query(&self, filter: &InfoFilter) -> Result<Vec<FileRecord>> {
        Ok(self.store.query_info(filter).into_iter().cloned().collect())
    }

    fn group_comment(
        &mut self,
        path: &Path,
        opts: &RunOpts,
    ) -> (Option<String>, Option<String>) {
        let mut group = opts.group.clone();
        let mut comment = opts.comment.clone();
        if (group.is_some() && comment.is_some()) || !opts.use_defaults {
            return (group, comment);
        }

        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        if let Some(cached) = self.defaults_cache.get(&dir) {
            if let Some((g, c)) = cached {
                if group.is_none() {
                    group = g.clone();
                }
                if comment.is_none() {
                    comment = c.clone();
                }
            }
            return (group, comment);
        }

        for name in DEFAULTS_FILES {
            let candidate = dir.join(name);
            if !candidate.is_file() {
                continue;
            }
            match fs::read_to_string(&candidate) {
                Ok(text) => {
                    let mut lines = text.lines();
                    if let Some(first) = lines.next() {
                        if group.is_none() && !first.trim().is_empty() {
                            group = Some(first.trim().to_string());
                        }
                    }
                    if let Some(second) = lines.next() {
                        if comment.is_none() && !second.trim().is_empty() {
                            comment = Some(second.trim().to_string());
                        }
                    }
                }
                Err(e) => {
                    println!("Error trying to open the file '{}': {}", candidate.display(), e);
                    continue;
                }
            }
            break;
        }
        let learned = if group == opts.group && comment == opts.comment {
            None
        } else {
            Some((group.clone(), comment.clone()))
        };
        self.defaults_cache.insert(dir, learned);
        (group, comment)
    }
}

/// Rebuild the store from the journal. The existing store file is moved
/// aside as `<store>~`; an existing backup must be confirmed away first.
/// Returns `Ok(None)` when the operator declined.
pub fn recover(
    config: &RegfileConfig,
    prompt: &mut dyn Prompt,
) -> Result<Option<ReplayStats>> {
    if !config.log.exists() {
        anyhow::bail!("the journal {} doesn't exist", config.log.display());
    }
    if config.db.exists() {
        let backup = backup_path(&config.db);
        if backup.exists() {
            let keep = !prompt.ask_exact(
                "A backup already exists. Remove it (only Yes is accepted)?",
                "Yes",
            )?;
            if keep {
                return Ok(None);
            }
            fs::remove_file(&backup)
                .with_context(|| format!("remove backup {}", backup.display()))?;
        }
        fs::rename(&config.db, &backup).with_context(|| {
            format!("move {} aside to {}", config.db.display(), backup.display())
        })?;
        info!("store moved aside to {}", backup.display());
    }

    let mut store = Store::open(&config.db)?;
    let stats = Journal::replay(&config.log, &mut store)?;
    store.commit().context("commit recovered store")?;
    Ok(Some(stats))
}

fn backup_path(db: &Path) -> PathBuf {
    let mut os = db.as_os_str().to_os_string();
    os.push("~");
    PathBuf::from(os)
}

/// Expand arguments into the candidate file list: directories are walked
/// recursively (sorted for a stable order), plain paths pass through.
pub fn collect_candidates(args: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for arg in args {
        if arg.is_dir() {
            walk(arg, &mut out)?;
        } else {
            out.push(arg.clone());
        }
    }
    Ok(out)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("read directory {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            walk(&entry, out)?;
        } else {
            out.push(entry);
        }
    }
    Ok(())
}

fn total_size(files: &[PathBuf]) -> u64 {
    files
        .iter()
        .filter_map(|f| fs::metadata(f).ok())
        .map(|m| m.len())
        .sum()
}

fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn meta_fits_journal(name: &str, group: Option<&str>, comment: Option<&str>) -> bool {
    clean_field(name) && group.map_or(true, clean_field) && comment.map_or(true, clean_field)
}

fn print_failed(failed: &[String]) {
    if failed.is_empty() {
        return;
    }
    println!("A list of files that failed:");
    for name in failed {
        println!("    {}", name);
    }
}

fn fail_file(
    status: &StatusLine,
    no: usize,
    short: &str,
    err: &anyhow::Error,
    path: &Path,
    failed: &mut Vec<String>,
) {
    status.print(no, short, &format!("FAILED ({:#})", err));
    failed.push(path.display().to_string());
    status.newline();
}
