use anyhow::Result;
use std::path::PathBuf;

use regfile::store::InfoFilter;

use super::util;

#[allow(clippy::too_many_arguments)]
pub fn exec(
    config: Option<PathBuf>,
    id: Option<u64>,
    name: Option<String>,
    group: Option<String>,
    comment: Option<String>,
    verbose: bool,
    mysum: bool,
    ed2k: bool,
) -> Result<()> {
    let Some(loaded) = util::load_config(config)? else {
        return Ok(());
    };
    let engine = util::build_engine(loaded)?;

    let filter = InfoFilter {
        id,
        name,
        group,
        comment,
    };
    let records = engine.query(&filter)?;
    if records.is_empty() {
        println!("No record matches the query!");
        return Ok(());
    }
    for record in &records {
        if mysum {
            println!("{}", record.mysum_line());
        } else if ed2k {
            println!("{}", record.ed2k_link());
        } else {
            println!("{}", record.display(verbose));
        }
    }
    Ok(())
}
