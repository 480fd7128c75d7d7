use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use regfile::consts::DEFAULTS_FILES;

/// Write a defaults file (first line group, second line comment) that
/// register and import runs pick up for files in that directory.
pub fn exec(dir: PathBuf, group: String, comment: Option<String>) -> Result<()> {
    let path = dir.join(DEFAULTS_FILES[0]);
    let mut text = group;
    text.push('\n');
    if let Some(comment) = comment {
        text.push_str(&comment);
        text.push('\n');
    }
    fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
