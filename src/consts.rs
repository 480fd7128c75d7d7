//! Shared format constants (MYSUM fingerprints, journal lines, run output).

// -------- Fingerprint --------

/// Length of the leading segment hashed into the "md1" digest.
pub const HEAD_SIZE: u64 = 1024 * 1024;

/// ED2K part size. The ed2k digest is the MD4 of the concatenated MD4
/// digests of all parts of this size (with a single-part shortcut).
pub const ED2K_PART_SIZE: usize = 9_728_000;

/// Hex length of every digest field (MD4 and MD5 are both 128-bit).
pub const DIGEST_HEX_LEN: usize = 32;

// -------- Journal --------

// Line prefixes. The record body after the prefix is identical for all
// three mutation kinds.
pub const LOG_COMMENT: &str = "# ";
pub const LOG_ADD: &str = "+  ";
pub const LOG_UPDATE_PENDING: &str = "!  ";
pub const LOG_UPDATE_APPLIED: &str = "!! ";

// -------- Run output --------

pub const RULER: &str = " - - - - - - - - - - - - - - - - - - - - - - - - - - - - - ";

/// Orchestrator poll interval while a hash worker is running.
pub const POLL_INTERVAL_MS: u64 = 250;

/// Per-directory defaults files, in lookup order.
pub const DEFAULTS_FILES: [&str; 2] = ["_.regfiledefaults", ".regfiledefaults"];
