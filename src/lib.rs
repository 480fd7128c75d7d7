//! regfile -- a content-addressed file registry.
//!
//! Files are identified by a three-digest fingerprint (whole-file MD5, MD5
//! of the first MiB, chunked-MD4 ED2K) plus the byte size. The registry is
//! a single JSON-lines store guarded by an advisory lock, with every
//! committed mutation mirrored into an append-only text journal that can
//! rebuild the store from scratch.
//!
//! Layers, bottom up:
//!
//! - [`sum`]     -- fingerprint computation, MYSUM text codec
//! - [`record`]  -- the registry entry and its display forms
//! - [`store`]   -- in-memory registry with staged-commit persistence
//! - [`journal`] -- append-only mutation log and replay
//! - [`engine`]  -- run orchestration (register/check/import/setdata/query)
//! - [`config`]  -- JSON configuration file and environment overrides

pub mod config;
pub mod consts;
pub mod engine;
pub mod journal;
pub mod lock;
pub mod record;
pub mod store;
pub mod sum;

pub use config::{load_or_init, LoadedConfig, RegfileConfig};
pub use engine::commit::CommitMode;
pub use engine::{collect_candidates, recover, Engine, RunOpts};
pub use journal::{Journal, JournalEntry, JournalOp, ReplayStats};
pub use record::FileRecord;
pub use store::{InfoFilter, Store, UpdateOutcome};
pub use sum::{FileSum, SumParse, SumState};
