use anyhow::Result;
use log::warn;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use regfile::config::{load_or_init, LoadedConfig};
use regfile::engine::commit::CommitMode;
use regfile::{Engine, Journal, Store};

/// Load the configuration. A freshly created config file cancels the
/// requested operation so the operator can review the defaults first;
/// that case returns `Ok(None)`.
pub fn load_config(path: Option<PathBuf>) -> Result<Option<LoadedConfig>> {
    let loaded = load_or_init(path.as_deref())?;
    if loaded.created {
        println!(
            "!!!   A new configuration file was created at '{}'.",
            loaded.path.display()
        );
        println!("!!!   Review it and run the command again.");
        return Ok(None);
    }
    Ok(Some(loaded))
}

/// Open the store and journal named by the configuration and install the
/// Ctrl-C handler that interrupts a running fingerprint stage.
pub fn build_engine(loaded: LoadedConfig) -> Result<Engine> {
    let store = Store::open(&loaded.config.db)?;
    let journal = Journal::new(loaded.config.log.clone());
    let engine = Engine::new(loaded.config, store, journal);
    let flag = engine.interrupt_handle();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        warn!("Ctrl-C handler not installed: {}", e);
    }
    Ok(engine)
}

/// CLI override wins over the configured commit policy.
pub fn resolve_commit(cli: Option<String>, configured: CommitMode) -> Result<CommitMode> {
    match cli {
        Some(s) => s.parse(),
        None => Ok(configured),
    }
}
