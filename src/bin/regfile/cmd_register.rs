use anyhow::Result;
use std::path::PathBuf;

use regfile::engine::RunOpts;
use regfile::collect_candidates;

use super::util;

pub fn exec(
    config: Option<PathBuf>,
    files: Vec<PathBuf>,
    group: Option<String>,
    comment: Option<String>,
    defaults: bool,
    commit: Option<String>,
) -> Result<()> {
    let Some(loaded) = util::load_config(config)? else {
        return Ok(());
    };
    let commit = util::resolve_commit(commit, loaded.config.commit)?;
    let mut engine = util::build_engine(loaded)?;

    let candidates = collect_candidates(&files)?;
    if candidates.is_empty() {
        println!("Nothing to do!");
        return Ok(());
    }
    let opts = RunOpts {
        group,
        comment,
        use_defaults: defaults,
        commit,
    };
    engine.register(&candidates, &opts)?;
    Ok(())
}
