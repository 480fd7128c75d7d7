//! Registry records.
//!
//! The (size, md1, md5, ed2k) tuple is the content key used for duplicate
//! detection; name, group and comment are mutable metadata that never
//! participate in it.

use serde::{Deserialize, Serialize};

use crate::sum::{format_mysum, FileSum};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Store-assigned identifier; 0 means "not yet assigned".
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub size: u64,
    pub md1: String,
    pub md5: String,
    pub ed2k: String,
}

impl FileRecord {
    /// Build a record from a complete fingerprint plus run metadata.
    /// Returns None while the fingerprint lacks any digest.
    pub fn from_sum(
        sum: &FileSum,
        group: Option<String>,
        comment: Option<String>,
    ) -> Option<Self> {
        Some(Self {
            id: 0,
            name: sum.name().to_string(),
            group,
            comment,
            size: sum.size()?,
            md1: sum.md1()?.to_string(),
            md5: sum.md5()?.to_string(),
            ed2k: sum.ed2k()?.to_string(),
        })
    }

    /// True when `other` carries the same content key and identical
    /// metadata ("full match", as opposed to a mere "data match").
    pub fn same_entry(&self, other: &FileRecord) -> bool {
        self.name == other.name && self.group == other.group && self.comment == other.comment
    }

    pub fn mysum_line(&self) -> String {
        format_mysum(&self.name, self.size, &self.md5, &self.md1, &self.ed2k)
    }

    pub fn ed2k_link(&self) -> String {
        format!("ed2k://|file|{}|{}|{}|/", self.name, self.size, self.ed2k)
    }

    /// Multi-line human form used by query output.
    pub fn display(&self, verbose: bool) -> String {
        let mut lines = vec![format!("[{:5}] '{}' s:{}", self.id, self.name, self.size)];
        if let Some(group) = self.group.as_deref().filter(|g| !g.is_empty()) {
            lines.push(format!("        group: {}", group));
        }
        if let Some(comment) = self.comment.as_deref().filter(|c| !c.is_empty()) {
            lines.push(format!("        comment: {}", comment));
        }
        if verbose {
            lines.push(format!(
                "        md1:{}  md5:{}  ed2k:{}",
                self.md1, self.md5, self.ed2k
            ));
        }
        lines.join("\n")
    }
}
