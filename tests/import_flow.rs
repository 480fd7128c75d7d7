//! Importing MYSUM fingerprint logs, including per-file failure isolation.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

use regfile::engine::commit::CommitMode;
use regfile::engine::RunOpts;
use regfile::store::InfoFilter;
use regfile::{Engine, Journal, RegfileConfig, Store};

fn engine_at(root: &Path) -> Result<Engine> {
    let config = RegfileConfig {
        db: root.join("dbfile.db"),
        log: root.join("dbfile.log"),
        commit: CommitMode::Auto,
    };
    let store = Store::open(&config.db)?;
    let journal = Journal::new(config.log.clone());
    Ok(Engine::new(config, store, journal))
}

fn mysum(name: &str, size: u64, fill: char) -> String {
    let d: String = std::iter::repeat(fill).take(32).collect();
    format!("[MYSUM:{}|{}|{}|{}|{}]", name, size, d, d, d)
}

#[test]
fn imports_every_line() -> Result<()> {
    let root = unique_root("imp");
    fs::create_dir_all(&root)?;
    let log = root.join("batch.mysum");
    fs::write(
        &log,
        format!("{}\n{}\n", mysum("one.bin", 100, 'a'), mysum("two.bin", 200, 'b')),
    )?;

    let mut engine = engine_at(&root)?;
    let opts = RunOpts {
        group: Some("batch".into()),
        ..Default::default()
    };
    let summary = engine.import(&[log], &opts)?;
    assert!(summary.committed);
    assert_eq!(summary.entries, 2);
    assert_eq!(summary.warnings, 0);
    assert!(summary.failed.is_empty());
    drop(engine);

    let store = Store::open(&root.join("dbfile.db"))?;
    let hits = store.query_info(&InfoFilter {
        group: Some("batch".into()),
        ..Default::default()
    });
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].name, "one.bin");
    Ok(())
}

#[test]
fn malformed_line_fails_only_its_own_file() -> Result<()> {
    let root = unique_root("impfail");
    fs::create_dir_all(&root)?;
    let good = root.join("good.mysum");
    fs::write(&good, format!("{}\n", mysum("good.bin", 50, 'c')))?;
    let bad = root.join("bad.mysum");
    fs::write(
        &bad,
        format!("{}\nnot a fingerprint line\n{}\n", mysum("kept.bin", 60, 'd'), mysum("never.bin", 70, 'e')),
    )?;

    let mut engine = engine_at(&root)?;
    let summary = engine.import(&[good, bad], &RunOpts::default())?;
    // only the clean file's entry survives; the failing file drops all of
    // its records including the ones parsed before the bad line
    assert_eq!(summary.entries, 1);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].contains("after 2 lines"));
    assert!(summary.committed);
    drop(engine);

    let store = Store::open(&root.join("dbfile.db"))?;
    let all = store.query_info(&InfoFilter::default());
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "good.bin");
    Ok(())
}

#[test]
fn bad_first_line_reports_a_plain_failure() -> Result<()> {
    let root = unique_root("impfirst");
    fs::create_dir_all(&root)?;
    let bad = root.join("bad.mysum");
    fs::write(&bad, "garbage\n")?;

    let mut engine = engine_at(&root)?;
    let summary = engine.import(&[bad.clone()], &RunOpts::default())?;
    assert_eq!(summary.entries, 0);
    assert!(!summary.committed);
    assert_eq!(summary.failed, vec![bad.display().to_string()]);
    Ok(())
}

#[test]
fn duplicate_fingerprints_warn_instead_of_inserting() -> Result<()> {
    let root = unique_root("impdup");
    fs::create_dir_all(&root)?;
    let first = root.join("first.mysum");
    fs::write(&first, format!("{}\n", mysum("orig.bin", 300, 'f')))?;
    let second = root.join("second.mysum");
    // same digests under another name
    fs::write(&second, format!("{}\n", mysum("copy.bin", 300, 'f')))?;

    let mut engine = engine_at(&root)?;
    let summary = engine.import(&[first, second], &RunOpts::default())?;
    assert_eq!(summary.entries, 1);
    assert_eq!(summary.warnings, 1);
    assert!(summary.failed.is_empty());
    Ok(())
}

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("regfile_{}_{}_{}", prefix, pid, t))
}
