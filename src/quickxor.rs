use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const WIDTH_BITS: usize = 160;
const SHIFT: usize = 11;
const DIGEST_LEN: usize = WIDTH_BITS / 8;

/// Streaming implementation of the remote's content hash: every input byte
/// is XORed into a 160-bit circular window at bit position `(11 * i) % 160`,
/// and the total input length is folded little-endian into the last 8 bytes
/// of the digest. Must agree bit-for-bit with the remote's computation.
pub struct QuickXorHash {
    digest: [u8; DIGEST_LEN],
    bit_pos: usize,
    length: u64,
}

impl QuickXorHash {
    pub fn new() -> Self {
        QuickXorHash {
            digest: [0; DIGEST_LEN],
            bit_pos: 0,
            length: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &b in data {
            let byte_pos = self.bit_pos / 8;
            let offset = self.bit_pos % 8;
            // A byte XORed at a bit offset spans two adjacent digest bytes,
            // wrapping from the last back to the first.
            let spread = (b as u16) << offset;
            self.digest[byte_pos] ^= (spread & 0xff) as u8;
            self.digest[(byte_pos + 1) % DIGEST_LEN] ^= (spread >> 8) as u8;
            self.bit_pos = (self.bit_pos + SHIFT) % WIDTH_BITS;
        }
        self.length += data.len() as u64;
    }

    pub fn finalize(mut self) -> [u8; DIGEST_LEN] {
        for (i, b) in self.length.to_le_bytes().iter().enumerate() {
            self.digest[DIGEST_LEN - 8 + i] ^= b;
        }
        self.digest
    }

    pub fn base64(self) -> String {
        STANDARD.encode(self.finalize())
    }
}

impl Default for QuickXorHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a file's contents through a fixed buffer.
pub fn quickxor_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hash = QuickXorHash::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hash.update(&buf[..n]);
    }
    Ok(hash.base64())
}
