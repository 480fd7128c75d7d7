//! Fingerprint vectors over a reproducible pseudo-random byte stream.
//!
//! The stream is one MiB of MT19937 output (init_by_array key [0]) repeated
//! end to end, so every test size shares the same first MiB. Each byte is a
//! bounded integer draw: 9 bits from the top of a 32-bit word, rejecting
//! values past 255, which is how CPython's `randint(0, 255)` samples.

use anyhow::Result;
use md4::{Digest, Md4};

use regfile::sum::{FileSum, SumParse, SumState};

const MIB: usize = 1024 * 1024;
const PART: usize = 9_728_000;

struct Mt19937 {
    mt: [u32; 624],
    idx: usize,
}

impl Mt19937 {
    fn seeded(seed: u32) -> Self {
        let mut mt = [0u32; 624];
        mt[0] = seed;
        for i in 1..624 {
            mt[i] = 1_812_433_253u32
                .wrapping_mul(mt[i - 1] ^ (mt[i - 1] >> 30))
                .wrapping_add(i as u32);
        }
        Self { mt, idx: 624 }
    }

    fn new_by_array(key: &[u32]) -> Self {
        let mut m = Self::seeded(19_650_218);
        let mut i = 1usize;
        let mut j = 0usize;
        for _ in 0..624.max(key.len()) {
            let prev = m.mt[i - 1];
            m.mt[i] = (m.mt[i] ^ (prev ^ (prev >> 30)).wrapping_mul(1_664_525))
                .wrapping_add(key[j])
                .wrapping_add(j as u32);
            i += 1;
            j += 1;
            if i >= 624 {
                m.mt[0] = m.mt[623];
                i = 1;
            }
            if j >= key.len() {
                j = 0;
            }
        }
        for _ in 0..623 {
            let prev = m.mt[i - 1];
            m.mt[i] = (m.mt[i] ^ (prev ^ (prev >> 30)).wrapping_mul(1_566_083_941))
                .wrapping_sub(i as u32);
            i += 1;
            if i >= 624 {
                m.mt[0] = m.mt[623];
                i = 1;
            }
        }
        m.mt[0] = 0x8000_0000;
        m
    }

    fn next_u32(&mut self) -> u32 {
        if self.idx >= 624 {
            for i in 0..624 {
                let y = (self.mt[i] & 0x8000_0000) | (self.mt[(i + 1) % 624] & 0x7fff_ffff);
                let mut next = y >> 1;
                if y & 1 != 0 {
                    next ^= 0x9908_b0df;
                }
                self.mt[i] = self.mt[(i + 397) % 624] ^ next;
            }
            self.idx = 0;
        }
        let mut y = self.mt[self.idx];
        self.idx += 1;
        y ^= y >> 11;
        y ^= (y << 7) & 0x9d2c_5680;
        y ^= (y << 15) & 0xefc6_0000;
        y ^= y >> 18;
        y
    }
}

fn block() -> Vec<u8> {
    let mut rng = Mt19937::new_by_array(&[0]);
    let mut out = Vec::with_capacity(MIB);
    while out.len() < MIB {
        // 9-bit draw with rejection of out-of-range values
        let r = rng.next_u32() >> 23;
        if r < 256 {
            out.push(r as u8);
        }
    }
    out
}

fn stream(len: usize) -> Vec<u8> {
    let block = block();
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let take = (len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);
    }
    out
}

fn fingerprint(name: &str, bytes: Vec<u8>) -> Result<FileSum> {
    let mut sum = FileSum::for_memory(name, bytes);
    sum.compute_size_head()?;
    assert!(sum.compute_full()?);
    assert_eq!(sum.state(), SumState::Complete);
    Ok(sum)
}

// First bytes of the generator, checked against CPython
// `random.seed(0); [random.randint(0, 255) for _ in range(8)]`.
#[test]
fn generator_matches_the_seeded_stream() {
    assert_eq!(block()[..8], [197, 215, 20, 132, 248, 207, 155, 244]);
}

#[test]
fn empty_input() -> Result<()> {
    let sum = fingerprint("empty.bin", Vec::new())?;
    assert_eq!(sum.size(), Some(0));
    assert_eq!(sum.md5(), Some("d41d8cd98f00b204e9800998ecf8427e"));
    assert_eq!(sum.md1(), Some("d41d8cd98f00b204e9800998ecf8427e"));
    assert_eq!(sum.ed2k(), Some("31d6cfe0d16ae931b73c59d7e0c089c0"));
    assert_eq!(
        sum.to_mysum_string()?,
        "[MYSUM:empty.bin|0|d41d8cd98f00b204e9800998ecf8427e|\
         d41d8cd98f00b204e9800998ecf8427e|31d6cfe0d16ae931b73c59d7e0c089c0]"
    );
    Ok(())
}

#[test]
fn exactly_one_part() -> Result<()> {
    let sum = fingerprint("part.bin", stream(PART))?;
    assert_eq!(sum.size(), Some(PART as u64));
    assert_eq!(sum.md5(), Some("ce3cd52a835724497f650257b66ea2f1"));
    assert_eq!(sum.md1(), Some("7684306b69a563fd5db77311d4a15fdd"));
    assert_eq!(sum.ed2k(), Some("3cbc0bbaacc8fac677a7032579eda4a2"));
    Ok(())
}

#[test]
fn exactly_two_parts() -> Result<()> {
    let sum = fingerprint("parts.bin", stream(2 * PART))?;
    assert_eq!(sum.md5(), Some("9cd33d3c799676733466c1ac19d9b565"));
    assert_eq!(sum.md1(), Some("7684306b69a563fd5db77311d4a15fdd"));
    assert_eq!(sum.ed2k(), Some("a119aaeb87f8fc56cedc4e33b788aeab"));
    Ok(())
}

#[test]
fn sixty_four_mib() -> Result<()> {
    let sum = fingerprint("big.bin", stream(64 * MIB))?;
    assert_eq!(sum.md5(), Some("01dde5d665fb2ed685ffe50d231ae263"));
    assert_eq!(sum.md1(), Some("7684306b69a563fd5db77311d4a15fdd"));
    assert_eq!(sum.ed2k(), Some("175cefe7b23344274adf476201340743"));
    Ok(())
}

// A whole multiple of the part size appends the MD4 of the empty input
// before the outer hash; checked against a direct computation.
#[test]
fn part_boundary_appends_empty_digest() -> Result<()> {
    let data = stream(PART);
    let sum = fingerprint("boundary.bin", data.clone())?;

    let mut concat = Vec::new();
    concat.extend_from_slice(&Md4::digest(&data));
    concat.extend_from_slice(&Md4::digest(b""));
    let expected = format!("{:x}", Md4::digest(&concat));
    assert_eq!(sum.ed2k(), Some(expected.as_str()));
    Ok(())
}

// One byte past the boundary starts a second part instead.
#[test]
fn one_byte_past_the_boundary() -> Result<()> {
    let data = stream(PART + 1);
    let sum = fingerprint("over.bin", data.clone())?;

    let mut concat = Vec::new();
    concat.extend_from_slice(&Md4::digest(&data[..PART]));
    concat.extend_from_slice(&Md4::digest(&data[PART..]));
    let expected = format!("{:x}", Md4::digest(&concat));
    assert_eq!(sum.ed2k(), Some(expected.as_str()));
    Ok(())
}

// Below one part the ED2K digest is the part's MD4 itself, no outer hash.
#[test]
fn single_short_part_skips_the_outer_hash() -> Result<()> {
    let data = stream(4096);
    let sum = fingerprint("short.bin", data.clone())?;
    let expected = format!("{:x}", Md4::digest(&data));
    assert_eq!(sum.ed2k(), Some(expected.as_str()));
    Ok(())
}

#[test]
fn mysum_text_survives_a_roundtrip() -> Result<()> {
    let sum = fingerprint("round.bin", stream(4096))?;
    let line = sum.to_mysum_string()?;
    match FileSum::parse_mysum(&line) {
        SumParse::Parsed(back) => {
            assert_eq!(back.name(), "round.bin");
            assert_eq!(back.size(), sum.size());
            assert_eq!(back.md5(), sum.md5());
            assert_eq!(back.md1(), sum.md1());
            assert_eq!(back.ed2k(), sum.ed2k());
        }
        SumParse::Malformed(why) => panic!("roundtrip failed: {}", why),
    }
    Ok(())
}

#[test]
fn file_and_memory_sources_agree() -> Result<()> {
    let root = unique_root("sumvec");
    std::fs::create_dir_all(&root)?;
    let path = root.join("agree.bin");
    let data = stream(3 * MIB + 17);
    std::fs::write(&path, &data)?;

    let mut from_file = FileSum::for_file(&path)?;
    from_file.compute_size_head()?;
    assert!(from_file.compute_full()?);

    let from_mem = fingerprint("agree.bin", data)?;
    assert_eq!(from_file.md5(), from_mem.md5());
    assert_eq!(from_file.md1(), from_mem.md1());
    assert_eq!(from_file.ed2k(), from_mem.ed2k());
    Ok(())
}

fn unique_root(prefix: &str) -> std::path::PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("regfile_{}_{}_{}", prefix, pid, t))
}
