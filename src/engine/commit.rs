//! Commit policy: whether a staged batch gets persisted.

use anyhow::Result;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Governs whether a run needs interactive approval before persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Commit without asking (unless nothing was staged).
    #[default]
    Auto,
    /// Always ask.
    Confirm,
    /// Ask only when the run had failures or duplicates.
    Problem,
}

impl FromStr for CommitMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CommitMode::Auto),
            "confirm" => Ok(CommitMode::Confirm),
            "problem" => Ok(CommitMode::Problem),
            other => anyhow::bail!(
                "unsupported commit mode '{}' (expected auto, confirm or problem)",
                other
            ),
        }
    }
}

impl fmt::Display for CommitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommitMode::Auto => "auto",
            CommitMode::Confirm => "confirm",
            CommitMode::Problem => "problem",
        })
    }
}

/// Interactive confirmation seam; scriptable in tests.
pub trait Prompt {
    /// Yes/no question, empty input defaulting to yes; anything else
    /// re-prompts.
    fn ask_yes_no(&mut self, question: &str) -> Result<bool>;

    /// Free-form question accepted only when the reply equals `expected`
    /// exactly.
    fn ask_exact(&mut self, question: &str, expected: &str) -> Result<bool>;
}

/// Reads replies from stdin.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask_yes_no(&mut self, question: &str) -> Result<bool> {
        let stdin = io::stdin();
        loop {
            print!("{} ", question);
            io::stdout().flush()?;
            let mut reply = String::new();
            if stdin.lock().read_line(&mut reply)? == 0 {
                return Ok(false); // EOF counts as a refusal
            }
            match reply.trim().to_ascii_lowercase().as_str() {
                "" | "yes" | "y" => return Ok(true),
                "no" | "n" => return Ok(false),
                _ => println!("Only yes or no (or just Enter) is a valid choice."),
            }
        }
    }

    fn ask_exact(&mut self, question: &str, expected: &str) -> Result<bool> {
        print!("{} ", question);
        io::stdout().flush()?;
        let mut reply = String::new();
        io::stdin().lock().read_line(&mut reply)?;
        Ok(reply.trim() == expected)
    }
}

const COMMIT_QUESTION: &str = "Do you wish to commit these changes? [YES/no]";

/// Decide whether the staged batch gets persisted. An empty batch is never
/// committed; beyond that the mode decides if the prompt is consulted.
pub fn approve_commit(
    mode: CommitMode,
    staged: usize,
    problems: usize,
    prompt: &mut dyn Prompt,
) -> Result<bool> {
    if staged == 0 {
        return Ok(false);
    }
    match mode {
        CommitMode::Auto => Ok(true),
        CommitMode::Confirm => prompt.ask_yes_no(COMMIT_QUESTION),
        CommitMode::Problem => {
            if problems > 0 {
                prompt.ask_yes_no(COMMIT_QUESTION)
            } else {
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<bool>);

    impl Prompt for Scripted {
        fn ask_yes_no(&mut self, _q: &str) -> Result<bool> {
            Ok(self.0.remove(0))
        }
        fn ask_exact(&mut self, _q: &str, _e: &str) -> Result<bool> {
            Ok(self.0.remove(0))
        }
    }

    #[test]
    fn empty_batch_never_commits() {
        let mut p = Scripted(vec![true]);
        assert!(!approve_commit(CommitMode::Auto, 0, 0, &mut p).unwrap());
        assert!(!approve_commit(CommitMode::Confirm, 0, 5, &mut p).unwrap());
    }

    #[test]
    fn auto_skips_the_prompt() {
        let mut p = Scripted(vec![]);
        assert!(approve_commit(CommitMode::Auto, 3, 2, &mut p).unwrap());
    }

    #[test]
    fn confirm_always_asks() {
        let mut p = Scripted(vec![false]);
        assert!(!approve_commit(CommitMode::Confirm, 3, 0, &mut p).unwrap());
    }

    #[test]
    fn problem_asks_only_on_problems() {
        let mut p = Scripted(vec![]);
        assert!(approve_commit(CommitMode::Problem, 3, 0, &mut p).unwrap());
        let mut p = Scripted(vec![true]);
        assert!(approve_commit(CommitMode::Problem, 3, 1, &mut p).unwrap());
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!(" Confirm ".parse::<CommitMode>().unwrap(), CommitMode::Confirm);
        assert!("sometimes".parse::<CommitMode>().is_err());
    }
}
