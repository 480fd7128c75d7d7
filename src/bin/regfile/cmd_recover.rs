use anyhow::Result;
use std::path::PathBuf;

use regfile::engine::commit::StdinPrompt;

use super::util;

pub fn exec(config: Option<PathBuf>) -> Result<()> {
    let Some(loaded) = util::load_config(config)? else {
        return Ok(());
    };
    let mut prompt = StdinPrompt;
    match regfile::recover(&loaded.config, &mut prompt)? {
        Some(stats) => println!(
            "Recovered {} entries ({} updates) from {} journal lines.",
            stats.adds, stats.updates, stats.lines
        ),
        None => println!("Aborted!"),
    }
    Ok(())
}
