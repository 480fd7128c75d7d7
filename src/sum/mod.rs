//! MYSUM content fingerprints.
//!
//! A fingerprint is the (size, md1, md5, ed2k) tuple identifying a file's
//! content:
//! - md1:  MD5 of the first megabyte (1024*1024 bytes)
//! - md5:  MD5 of the whole file
//! - ed2k: eDonkey2000 digest (MD4 over the concatenated MD4 digests of
//!   9,728,000-byte parts, with a single-part shortcut)
//!
//! Text form: `[MYSUM:name|size|md5|md1|ed2k]`.
//!
//! Computation is staged so a cheap duplicate pre-check (size + md1) can run
//! before paying for a full read. The full pass is cancellable between part
//! reads; a cancelled pass leaves every digest untouched.

pub mod source;

use anyhow::{anyhow, bail, Result};
use md4::{Digest as _, Md4};
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::consts::{DIGEST_HEX_LEN, ED2K_PART_SIZE, HEAD_SIZE};
use source::{FileSource, MemSource, SumSource};

/// Computation stage. Advances monotonically; which digest fields are
/// populated fully determines the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SumState {
    /// Only a source is attached.
    Initialized,
    /// Size and md1 are known.
    SizeHead,
    /// All digests are known.
    Complete,
}

/// Cancellation handle for a running full computation. Cloneable and safe to
/// trigger from another thread; the effect is observed at the next part
/// boundary.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Read-only view of the bytes hashed so far by a full pass.
#[derive(Clone)]
pub struct SumProgress {
    bytes: Arc<AtomicU64>,
}

impl SumProgress {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Outcome of parsing MYSUM text. A non-fingerprint line is a normal
/// branch, not an error.
pub enum SumParse {
    Parsed(FileSum),
    Malformed(String),
}

pub struct FileSum {
    name: String,
    source: Option<Box<dyn SumSource + Send>>,
    size: Option<u64>,
    md1: Option<String>,
    md5: Option<String>,
    ed2k: Option<String>,
    processed: Arc<AtomicU64>,
    cancel: Arc<AtomicBool>,
    state: SumState,
}

impl FileSum {
    /// Fingerprint a file on disk. The short file name goes into the MYSUM
    /// text form.
    pub fn for_file(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("no file name in {}", path.display()))?;
        let src = FileSource::open(path)?;
        Ok(Self::with_source(name, Box::new(src)))
    }

    /// Fingerprint an in-memory buffer under the given display name.
    pub fn for_memory(name: &str, bytes: Vec<u8>) -> Self {
        Self::with_source(name.to_string(), Box::new(MemSource::new(bytes)))
    }

    fn with_source(name: String, source: Box<dyn SumSource + Send>) -> Self {
        Self {
            name,
            source: Some(source),
            size: None,
            md1: None,
            md5: None,
            ed2k: None,
            processed: Arc::new(AtomicU64::new(0)),
            cancel: Arc::new(AtomicBool::new(false)),
            state: SumState::Initialized,
        }
    }

    /// Rebuild a fingerprint from stored attributes (no source attached).
    /// The state is derived from which fields are populated; size/md1 must
    /// be both set or both unset, likewise md5/ed2k, and the digest pair
    /// requires the head pair. Anything else is rejected.
    pub fn from_parts(
        name: String,
        size: Option<u64>,
        md1: Option<String>,
        md5: Option<String>,
        ed2k: Option<String>,
    ) -> Result<Self> {
        let weight = size.is_some() as u8
            | (md1.is_some() as u8) << 1
            | (md5.is_some() as u8) << 2
            | (ed2k.is_some() as u8) << 3;
        let state = match weight {
            0b0000 => SumState::Initialized,
            0b0011 => SumState::SizeHead,
            0b1111 => SumState::Complete,
            _ => bail!(
                "inconsistent fingerprint attributes for '{}' (size:{:?} md1:{:?} md5:{:?} ed2k:{:?})",
                name, size, md1, md5, ed2k
            ),
        };
        Ok(Self {
            name,
            source: None,
            size,
            md1,
            md5,
            ed2k,
            processed: Arc::new(AtomicU64::new(0)),
            cancel: Arc::new(AtomicBool::new(false)),
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SumState {
        self.state
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn md1(&self) -> Option<&str> {
        self.md1.as_deref()
    }

    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    pub fn ed2k(&self) -> Option<&str> {
        self.ed2k.as_deref()
    }

    /// Bytes hashed so far by the current full pass.
    pub fn processed_bytes(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Shareable progress view for a pass running on another thread.
    pub fn progress(&self) -> SumProgress {
        SumProgress {
            bytes: Arc::clone(&self.processed),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Request cancellation of a running full pass. Observed at the next
    /// part boundary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Advance to `target`, or by exactly one stage if `target` is `None`.
    /// No-op once `Complete`. Invalid targets are unrepresentable: the state
    /// enum covers exactly the legal range.
    pub fn advance(&mut self, target: Option<SumState>) -> Result<()> {
        if self.state == SumState::Complete {
            return Ok(());
        }
        let target = target.unwrap_or(match self.state {
            SumState::Initialized => SumState::SizeHead,
            _ => SumState::Complete,
        });
        if target >= SumState::SizeHead && self.state < SumState::SizeHead {
            self.compute_size_head()?;
        }
        if target >= SumState::Complete && self.state < SumState::Complete {
            self.compute_full()?;
        }
        Ok(())
    }

    /// Determine size and md1. Idempotent once at `SizeHead` or later.
    /// Leaves the source positioned at offset 0 on success.
    pub fn compute_size_head(&mut self) -> Result<()> {
        if self.state >= SumState::SizeHead {
            return Ok(());
        }
        let src = self
            .source
            .as_mut()
            .ok_or_else(|| anyhow!("fingerprint '{}' has no source to read", self.name))?;

        let size = src.size()?;
        src.seek(SeekFrom::Start(0))?;

        let mut head = vec![0u8; HEAD_SIZE.min(size) as usize];
        let n = read_fill(src, &mut head)?;
        let digest = md5::compute(&head[..n]);

        src.seek(SeekFrom::Start(0))?;

        self.size = Some(size);
        self.md1 = Some(format!("{:x}", digest));
        self.state = SumState::SizeHead;
        Ok(())
    }

    /// Determine md5 and ed2k over the whole source. Runs
    /// `compute_size_head` first when still `Initialized`; idempotent once
    /// `Complete`.
    ///
    /// Returns `Ok(false)` when a cancellation request was observed: the
    /// state and all digest fields are then left exactly as before the call
    /// (apart from the size/md1 stage), so no partial digest ever escapes.
    pub fn compute_full(&mut self) -> Result<bool> {
        self.compute_full_with(None)
    }

    /// Like [`compute_full`](Self::compute_full) but reporting cumulative
    /// bytes after every hashed part to `progress`.
    pub fn compute_full_with(
        &mut self,
        mut progress: Option<&mut dyn FnMut(u64)>,
    ) -> Result<bool> {
        match self.state {
            SumState::Initialized => self.compute_size_head()?,
            SumState::SizeHead => {}
            SumState::Complete => return Ok(true),
        }
        let src = self
            .source
            .as_mut()
            .ok_or_else(|| anyhow!("fingerprint '{}' has no source to read", self.name))?;
        src.seek(SeekFrom::Start(0))?;
        self.processed.store(0, Ordering::Relaxed);

        let mut md5ctx = md5::Context::new();
        // Concatenated 16-byte MD4 digests of every part.
        let mut part_digests: Vec<u8> = Vec::new();
        let mut first_part_hex: Option<String> = None;
        let mut last_part_full = false;
        let mut total: u64 = 0;
        let mut buf = vec![0u8; ED2K_PART_SIZE];

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(false);
            }
            let n = read_fill(src, &mut buf)?;
            if n == 0 {
                break;
            }
            last_part_full = n == ED2K_PART_SIZE;

            let digest = Md4::digest(&buf[..n]);
            part_digests.extend_from_slice(&digest);
            if first_part_hex.is_none() {
                first_part_hex = Some(hex(&digest));
            }

            md5ctx.consume(&buf[..n]);
            total += n as u64;
            self.processed.store(total, Ordering::Relaxed);
            if let Some(cb) = progress.as_deref_mut() {
                cb(total);
            }
        }

        // A file of exactly N full parts carries one extra digest of an
        // empty part (ED2K link compatibility).
        if last_part_full {
            part_digests.extend_from_slice(&Md4::digest(b""));
        }

        // Single-part shortcut: the part's own MD4 is the ed2k digest.
        self.ed2k = Some(if part_digests.len() == 16 {
            first_part_hex.unwrap_or_default()
        } else {
            hex(&Md4::digest(&part_digests))
        });
        self.md5 = Some(format!("{:x}", md5ctx.compute()));
        self.state = SumState::Complete;
        Ok(true)
    }

    /// Canonical MYSUM text form. Only a `Complete` fingerprint has one.
    pub fn to_mysum_string(&self) -> Result<String> {
        match (&self.size, &self.md1, &self.md5, &self.ed2k) {
            (Some(size), Some(md1), Some(md5), Some(ed2k)) => {
                Ok(format_mysum(&self.name, *size, md5, md1, ed2k))
            }
            _ => bail!("fingerprint '{}' is not complete", self.name),
        }
    }

    /// Parse MYSUM text. Leading/trailing whitespace is tolerated, as is
    /// trailing content after the closing bracket.
    pub fn parse_mysum(text: &str) -> SumParse {
        match parse_mysum_fields(text) {
            Some((name, size, md5, md1, ed2k)) => match FileSum::from_parts(
                name.to_string(),
                Some(size),
                Some(md1.to_string()),
                Some(md5.to_string()),
                Some(ed2k.to_string()),
            ) {
                Ok(sum) => SumParse::Parsed(sum),
                Err(e) => SumParse::Malformed(e.to_string()),
            },
            None => SumParse::Malformed(format!("not a MYSUM string: {}", text.trim())),
        }
    }
}

impl PartialEq for FileSum {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.size == other.size
            && self.md1 == other.md1
            && self.md5 == other.md5
            && self.ed2k == other.ed2k
    }
}

impl fmt::Debug for FileSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSum")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("size", &self.size)
            .field("md1", &self.md1)
            .field("md5", &self.md5)
            .field("ed2k", &self.ed2k)
            .finish()
    }
}

/// MYSUM text form from loose fields (used for fingerprints and for
/// formatting stored records).
pub fn format_mysum(name: &str, size: u64, md5: &str, md1: &str, ed2k: &str) -> String {
    format!("[MYSUM:{}|{}|{}|{}|{}]", name, size, md5, md1, ed2k)
}

fn parse_mysum_fields(text: &str) -> Option<(&str, u64, &str, &str, &str)> {
    let s = text.trim().strip_prefix("[MYSUM:")?;
    let (name, s) = split_field(s, '|')?;
    if name.is_empty() {
        return None;
    }
    let (size_str, s) = split_field(s, '|')?;
    if size_str.is_empty() || !size_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let size: u64 = size_str.parse().ok()?;
    let (md5, s) = split_field(s, '|')?;
    let (md1, s) = split_field(s, '|')?;
    let (ed2k, _) = split_field(s, ']')?;
    if !is_hex32(md5) || !is_hex32(md1) || !is_hex32(ed2k) {
        return None;
    }
    Some((name, size, md5, md1, ed2k))
}

fn split_field(s: &str, delim: char) -> Option<(&str, &str)> {
    let i = s.find(delim)?;
    Some((&s[..i], &s[i + delim.len_utf8()..]))
}

fn is_hex32(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Read until `buf` is full or the source is exhausted; returns bytes read.
fn read_fill<R: Read + ?Sized>(src: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
