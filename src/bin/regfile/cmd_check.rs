use anyhow::Result;
use std::path::PathBuf;

use regfile::engine::RunOpts;
use regfile::collect_candidates;

use super::util;

pub fn exec(config: Option<PathBuf>, files: Vec<PathBuf>) -> Result<()> {
    let Some(loaded) = util::load_config(config)? else {
        return Ok(());
    };
    let mut engine = util::build_engine(loaded)?;

    let candidates = collect_candidates(&files)?;
    if candidates.is_empty() {
        println!("Nothing to do!");
        return Ok(());
    }
    engine.check(&candidates, &RunOpts::default())?;
    Ok(())
}
