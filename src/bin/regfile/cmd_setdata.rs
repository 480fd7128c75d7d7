use anyhow::Result;
use std::path::PathBuf;

use regfile::store::UpdateOutcome;

use super::util;

pub fn exec(
    config: Option<PathBuf>,
    id: u64,
    name: Option<String>,
    group: Option<String>,
    comment: Option<String>,
    all: bool,
) -> Result<()> {
    let Some(loaded) = util::load_config(config)? else {
        return Ok(());
    };
    let mut engine = util::build_engine(loaded)?;
    match engine.setdata(id, name.as_deref(), group.as_deref(), comment.as_deref(), all)? {
        UpdateOutcome::Updated(record) => {
            println!("Updated:");
            println!("{}", record.display(true));
        }
        UpdateOutcome::NotFound => println!("No record with id {}!", id),
        UpdateOutcome::NoChange => println!("Nothing to change!"),
    }
    Ok(())
}
