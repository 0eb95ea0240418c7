//! scrypt key derivation (RFC 7914)
//!
//! A self-contained implementation of scrypt built from:
//! - PBKDF2-HMAC-SHA256 to expand the passphrase into the initial blocks and
//!   to compress the mixed blocks into the derived key
//! - ROMix, the memory-hard mixing step, run once per parallel lane
//! - BlockMix with the Salsa20/8 core
//!
//! Output is byte-identical to any RFC 7914 conformant implementation, which
//! is what lets a second service read vaults written by this one. All byte to
//! word conversions are explicitly little-endian.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::salsa::{WORDS, load_le, salsa20_8, store_le};

/// Output length of HMAC-SHA256 in bytes.
const HASH_LEN: usize = 32;

/// Number of 32-bit words per unit of the block size factor `r`.
const WORDS_PER_R: usize = 2 * WORDS;

/// Cost and output parameters for one scrypt derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptParams {
    /// CPU/memory cost. Must be a power of two and at least 2.
    pub n: u32,
    /// Block size factor.
    pub r: u32,
    /// Parallelism (number of independent ROMix lanes).
    pub p: u32,
    /// Length of the derived key in bytes.
    pub dk_len: usize,
}

impl ScryptParams {
    /// The parameters every vault is written with. Changing any of these
    /// makes existing vaults unreadable here and by every other reader.
    pub const VAULT: ScryptParams = ScryptParams::new(16384, 8, 1, 32);

    pub const fn new(n: u32, r: u32, p: u32, dk_len: usize) -> Self {
        Self { n, r, p, dk_len }
    }

    /// Bytes of scratch memory ROMix needs for one lane, if representable.
    pub fn memory_bytes(&self) -> Option<usize> {
        lane_bytes(self.r)?.checked_mul(self.n as usize)
    }

    /// Checks the RFC 7914 constraints plus the buffer arithmetic used here.
    pub fn validate(&self) -> Result<()> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(invalid(format!(
                "scrypt N must be a power of two of at least 2, got {}",
                self.n
            )));
        }
        if self.r == 0 {
            return Err(invalid("scrypt r must be at least 1"));
        }
        if self.p == 0 {
            return Err(invalid("scrypt p must be at least 1"));
        }
        if self.dk_len == 0 {
            return Err(invalid("derived key length must be at least 1"));
        }
        // N < 2^(128 * r / 8); only binding for r = 1 given N fits in a u32.
        if self.r == 1 && self.n >= 1 << 16 {
            return Err(invalid("scrypt N must be below 2^16 when r is 1"));
        }
        // p <= (2^32 - 1) * hLen / MFLen
        let mf_total = u64::from(self.p)
            .checked_mul(128)
            .and_then(|v| v.checked_mul(u64::from(self.r)));
        match mf_total {
            Some(total) if total <= u64::from(u32::MAX) * HASH_LEN as u64 => {}
            _ => return Err(invalid("scrypt p * 128 * r is too large")),
        }
        if self.dk_len as u64 > u64::from(u32::MAX) * HASH_LEN as u64 {
            return Err(invalid("derived key length is too large"));
        }
        lane_bytes(self.r)
            .and_then(|lane| lane.checked_mul(self.p as usize))
            .ok_or_else(|| invalid("scrypt p * 128 * r overflows"))?;
        self.memory_bytes()
            .ok_or_else(|| invalid("scrypt N * 128 * r overflows"))?;
        Ok(())
    }
}

fn lane_bytes(r: u32) -> Option<usize> {
    (r as usize).checked_mul(128)
}

fn invalid(msg: impl Into<String>) -> VaultError {
    VaultError::new(ErrorCategory::Internal, ErrorKind::InvalidParameters, msg)
}

/// Derives `params.dk_len` bytes from `password` and `salt`.
///
/// The returned buffer is wiped when dropped.
pub fn scrypt(password: &[u8], salt: &[u8], params: &ScryptParams) -> Result<Zeroizing<Vec<u8>>> {
    params.validate()?;

    let lane_len = 128 * params.r as usize;
    let mut b = Zeroizing::new(vec![0u8; lane_len * params.p as usize]);
    pbkdf2_hmac_sha256(password, salt, 1, &mut b)?;

    let mut words = Zeroizing::new(vec![0u32; lane_len / 4]);
    for lane in b.chunks_exact_mut(lane_len) {
        load_le(lane, &mut words);
        ro_mix(&mut words, params.n)?;
        store_le(&words, lane);
    }

    let mut dk = Zeroizing::new(vec![0u8; params.dk_len]);
    pbkdf2_hmac_sha256(password, &b, 1, &mut dk)?;
    Ok(dk)
}

/// PBKDF2 with HMAC-SHA256 as the PRF, filling all of `out`.
pub fn pbkdf2_hmac_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out: &mut [u8],
) -> Result<()> {
    if iterations == 0 {
        return Err(invalid("PBKDF2 needs at least one iteration"));
    }
    if out.len().div_ceil(HASH_LEN) as u64 > u64::from(u32::MAX) {
        return Err(invalid("PBKDF2 output length is too large"));
    }

    let prf = Hmac::<Sha256>::new_from_slice(password).map_err(|e| {
        VaultError::with_source(
            ErrorCategory::Internal,
            ErrorKind::InvalidParameters,
            "HMAC rejected the passphrase as a key",
            e,
        )
    })?;

    let mut u = [0u8; HASH_LEN];
    let mut t = [0u8; HASH_LEN];
    for (index, chunk) in out.chunks_mut(HASH_LEN).enumerate() {
        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&(index as u32 + 1).to_be_bytes());
        u.copy_from_slice(&mac.finalize().into_bytes());
        t.copy_from_slice(&u);

        for _ in 1..iterations {
            let mut mac = prf.clone();
            mac.update(&u);
            u.copy_from_slice(&mac.finalize().into_bytes());
            for (acc, byte) in t.iter_mut().zip(u.iter()) {
                *acc ^= byte;
            }
        }

        chunk.copy_from_slice(&t[..chunk.len()]);
    }
    u.zeroize();
    t.zeroize();
    Ok(())
}

/// scryptBlockMix with Salsa20/8.
///
/// `input` holds 2r sub-blocks of 16 words. The Salsa20/8 outputs are written
/// to `output` de-interleaved: even-indexed results first, then odd-indexed.
pub fn block_mix(input: &[u32], output: &mut [u32]) {
    debug_assert_eq!(input.len(), output.len());
    debug_assert_eq!(input.len() % WORDS_PER_R, 0);

    let blocks = input.len() / WORDS;
    let r = blocks / 2;

    let mut x = [0u32; WORDS];
    x.copy_from_slice(&input[(blocks - 1) * WORDS..]);

    for (i, sub_block) in input.chunks_exact(WORDS).enumerate() {
        for (xw, bw) in x.iter_mut().zip(sub_block) {
            *xw ^= bw;
        }
        x = salsa20_8(&x);

        let dest = if i % 2 == 0 { i / 2 } else { r + i / 2 };
        output[dest * WORDS..(dest + 1) * WORDS].copy_from_slice(&x);
    }
    x.zeroize();
}

/// Interprets the last sub-block of `block` as a little-endian integer,
/// keeping the low 64 bits.
pub fn integerify(block: &[u32]) -> u64 {
    let last = block.len() - WORDS;
    u64::from(block[last]) | (u64::from(block[last + 1]) << 32)
}

/// scryptROMix over one lane of 32r words, in place.
///
/// Allocates N copies of the lane as scratch; the scratch is wiped and freed
/// before returning.
pub fn ro_mix(block: &mut [u32], n: u32) -> Result<()> {
    if n < 2 || !n.is_power_of_two() {
        return Err(invalid(format!(
            "scrypt N must be a power of two of at least 2, got {}",
            n
        )));
    }
    let len = block.len();
    if len == 0 || len % WORDS_PER_R != 0 {
        return Err(invalid(format!(
            "ROMix lane must be a non-empty multiple of {} words, got {}",
            WORDS_PER_R, len
        )));
    }
    let n = n as usize;
    let v_len = len
        .checked_mul(n)
        .ok_or_else(|| invalid("scrypt N * 128 * r overflows"))?;

    let mut v = Zeroizing::new(vec![0u32; v_len]);
    let mut x = Zeroizing::new(block.to_vec());
    let mut y = Zeroizing::new(vec![0u32; len]);

    for entry in v.chunks_exact_mut(len) {
        entry.copy_from_slice(&x);
        block_mix(&x, &mut y);
        std::mem::swap(&mut *x, &mut *y);
    }

    for _ in 0..n {
        let j = (integerify(&x) % n as u64) as usize;
        for (xw, vw) in x.iter_mut().zip(&v[j * len..(j + 1) * len]) {
            *xw ^= vw;
        }
        block_mix(&x, &mut y);
        std::mem::swap(&mut *x, &mut *y);
    }

    block.copy_from_slice(&x);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    // Input shared by the BlockMix and ROMix vectors of RFC 7914.
    #[rustfmt::skip]
    const MIX_INPUT: [u8; 128] = [
        0xf7, 0xce, 0x0b, 0x65, 0x3d, 0x2d, 0x72, 0xa4, 0x10, 0x8c, 0xf5, 0xab, 0xe9, 0x12, 0xff, 0xdd,
        0x77, 0x76, 0x16, 0xdb, 0xbb, 0x27, 0xa7, 0x0e, 0x82, 0x04, 0xf3, 0xae, 0x2d, 0x0f, 0x6f, 0xad,
        0x89, 0xf6, 0x8f, 0x48, 0x11, 0xd1, 0xe8, 0x7b, 0xcc, 0x3b, 0xd7, 0x40, 0x0a, 0x9f, 0xfd, 0x29,
        0x09, 0x4f, 0x01, 0x84, 0x63, 0x95, 0x74, 0xf3, 0x9a, 0xe5, 0xa1, 0x31, 0x52, 0x17, 0xbc, 0xd7,
        0x89, 0x49, 0x91, 0x44, 0x72, 0x13, 0xbb, 0x22, 0x6c, 0x25, 0xb5, 0x4d, 0xa8, 0x63, 0x70, 0xfb,
        0xcd, 0x98, 0x43, 0x80, 0x37, 0x46, 0x66, 0xbb, 0x8f, 0xfc, 0xb5, 0xbf, 0x40, 0xc2, 0x54, 0xb0,
        0x67, 0xd2, 0x7c, 0x51, 0xce, 0x4a, 0xd5, 0xfe, 0xd8, 0x29, 0xc9, 0x0b, 0x50, 0x5a, 0x57, 0x1b,
        0x7f, 0x4d, 0x1c, 0xad, 0x6a, 0x52, 0x3c, 0xda, 0x77, 0x0e, 0x67, 0xbc, 0xea, 0xaf, 0x7e, 0x89,
    ];

    #[test]
    fn test_block_mix_rfc7914_vector() {
        #[rustfmt::skip]
        let expected: [u8; 128] = [
            0xa4, 0x1f, 0x85, 0x9c, 0x66, 0x08, 0xcc, 0x99, 0x3b, 0x81, 0xca, 0xcb, 0x02, 0x0c, 0xef, 0x05,
            0x04, 0x4b, 0x21, 0x81, 0xa2, 0xfd, 0x33, 0x7d, 0xfd, 0x7b, 0x1c, 0x63, 0x96, 0x68, 0x2f, 0x29,
            0xb4, 0x39, 0x31, 0x68, 0xe3, 0xc9, 0xe6, 0xbc, 0xfe, 0x6b, 0xc5, 0xb7, 0xa0, 0x6d, 0x96, 0xba,
            0xe4, 0x24, 0xcc, 0x10, 0x2c, 0x91, 0x74, 0x5c, 0x24, 0xad, 0x67, 0x3d, 0xc7, 0x61, 0x8f, 0x81,
            0x20, 0xed, 0xc9, 0x75, 0x32, 0x38, 0x81, 0xa8, 0x05, 0x40, 0xf6, 0x4c, 0x16, 0x2d, 0xcd, 0x3c,
            0x21, 0x07, 0x7c, 0xfe, 0x5f, 0x8d, 0x5f, 0xe2, 0xb1, 0xa4, 0x16, 0x8f, 0x95, 0x36, 0x78, 0xb7,
            0x7d, 0x3b, 0x3d, 0x80, 0x3b, 0x60, 0xe4, 0xab, 0x92, 0x09, 0x96, 0xe5, 0x9b, 0x4d, 0x53, 0xb6,
            0x5d, 0x2a, 0x22, 0x58, 0x77, 0xd5, 0xed, 0xf5, 0x84, 0x2c, 0xb9, 0xf1, 0x4e, 0xef, 0xe4, 0x25,
        ];

        let input = words(&MIX_INPUT);
        let mut output = vec![0u32; input.len()];
        block_mix(&input, &mut output);
        assert_eq!(bytes(&output), expected.to_vec());
    }

    #[test]
    fn test_block_mix_deinterleaves_even_then_odd() {
        // With r = 2 there are four sub-blocks; recompute the chain by hand
        // and check where each Salsa20/8 output lands.
        let input: Vec<u32> = (0..64u32).map(|i| i.wrapping_mul(0x9e37_79b9)).collect();
        let mut output = vec![0u32; 64];
        block_mix(&input, &mut output);

        let mut x = [0u32; WORDS];
        x.copy_from_slice(&input[48..64]);
        let mut chain = Vec::new();
        for sub_block in input.chunks_exact(WORDS) {
            for (xw, bw) in x.iter_mut().zip(sub_block) {
                *xw ^= bw;
            }
            x = salsa20_8(&x);
            chain.push(x);
        }

        assert_eq!(&output[0..16], &chain[0]);
        assert_eq!(&output[16..32], &chain[2]);
        assert_eq!(&output[32..48], &chain[1]);
        assert_eq!(&output[48..64], &chain[3]);
    }

    #[test]
    fn test_ro_mix_rfc7914_vector() {
        #[rustfmt::skip]
        let expected: [u8; 128] = [
            0x79, 0xcc, 0xc1, 0x93, 0x62, 0x9d, 0xeb, 0xca, 0x04, 0x7f, 0x0b, 0x70, 0x60, 0x4b, 0xf6, 0xb6,
            0x2c, 0xe3, 0xdd, 0x4a, 0x96, 0x26, 0xe3, 0x55, 0xfa, 0xfc, 0x61, 0x98, 0xe6, 0xea, 0x2b, 0x46,
            0xd5, 0x84, 0x13, 0x67, 0x3b, 0x99, 0xb0, 0x29, 0xd6, 0x65, 0xc3, 0x57, 0x60, 0x1f, 0xb4, 0x26,
            0xa0, 0xb2, 0xf4, 0xbb, 0xa2, 0x00, 0xee, 0x9f, 0x0a, 0x43, 0xd1, 0x9b, 0x57, 0x1a, 0x9c, 0x71,
            0xef, 0x11, 0x42, 0xe6, 0x5d, 0x5a, 0x26, 0x6f, 0xdd, 0xca, 0x83, 0x2c, 0xe5, 0x9f, 0xaa, 0x7c,
            0xac, 0x0b, 0x9c, 0xf1, 0xbe, 0x2b, 0xff, 0xca, 0x30, 0x0d, 0x01, 0xee, 0x38, 0x76, 0x19, 0xc4,
            0xae, 0x12, 0xfd, 0x44, 0x38, 0xf2, 0x03, 0xa0, 0xe4, 0xe1, 0xc4, 0x7e, 0xc3, 0x14, 0x86, 0x1f,
            0x4e, 0x90, 0x87, 0xcb, 0x33, 0x39, 0x6a, 0x68, 0x73, 0xe8, 0xf9, 0xd2, 0x53, 0x9a, 0x4b, 0x8e,
        ];

        let mut block = words(&MIX_INPUT);
        ro_mix(&mut block, 16).unwrap();
        assert_eq!(bytes(&block), expected.to_vec());
    }

    #[test]
    fn test_integerify_reads_last_sub_block() {
        let mut block = vec![0u32; 64];
        block[48] = 0x0000_0005;
        block[49] = 0x0000_0001;
        assert_eq!(integerify(&block), 0x0000_0001_0000_0005);
    }

    #[test]
    fn test_ro_mix_rejects_bad_n() {
        let mut block = words(&MIX_INPUT);
        for n in [0, 1, 3, 1000] {
            let err = ro_mix(&mut block, n).expect_err("expected invalid N");
            assert_eq!(err.kind, ErrorKind::InvalidParameters);
        }
    }

    #[test]
    fn test_ro_mix_rejects_partial_lane() {
        let mut block = vec![0u32; 40];
        let err = ro_mix(&mut block, 16).expect_err("expected invalid lane");
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }

    // RFC 7914, section 11.
    #[test]
    fn test_pbkdf2_rfc7914_vector() {
        let mut out = [0u8; 64];
        pbkdf2_hmac_sha256(b"passwd", b"salt", 1, &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc\
             49ca9cccf179b645991664b39d77ef317c71b845b1e30bd509112041d3a19783"
        );
    }

    #[test]
    fn test_pbkdf2_partial_final_block() {
        let mut long = [0u8; 64];
        let mut short = [0u8; 40];
        pbkdf2_hmac_sha256(b"passwd", b"salt", 1, &mut long).unwrap();
        pbkdf2_hmac_sha256(b"passwd", b"salt", 1, &mut short).unwrap();
        assert_eq!(&long[..40], &short[..]);
    }

    #[test]
    fn test_pbkdf2_rejects_zero_iterations() {
        let mut out = [0u8; 32];
        let err = pbkdf2_hmac_sha256(b"p", b"s", 0, &mut out).expect_err("expected error");
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_vault_params_are_valid() {
        ScryptParams::VAULT.validate().unwrap();
        assert_eq!(ScryptParams::VAULT.memory_bytes(), Some(16 * 1024 * 1024));
    }

    #[test]
    fn test_params_validation() {
        let cases = [
            ScryptParams::new(0, 8, 1, 32),
            ScryptParams::new(1, 8, 1, 32),
            ScryptParams::new(1000, 8, 1, 32),
            ScryptParams::new(16, 0, 1, 32),
            ScryptParams::new(16, 8, 0, 32),
            ScryptParams::new(16, 8, 1, 0),
            ScryptParams::new(1 << 16, 1, 1, 32),
            ScryptParams::new(16, u32::MAX, u32::MAX, 32),
            ScryptParams::new(16, 1 << 20, 1 << 20, 32),
        ];
        for params in cases {
            let err = params.validate().expect_err("expected invalid parameters");
            assert_eq!(err.kind, ErrorKind::InvalidParameters, "{:?}", params);
        }
    }

    #[test]
    fn test_params_validation_overflowing_p_r_is_rejected() {
        // p * 128 * r does not fit in a u64 here.
        let params = ScryptParams::new(16, u32::MAX, u32::MAX, 32);
        let err = params.validate().expect_err("expected invalid parameters");
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
        assert_eq!(err.to_string(), "scrypt p * 128 * r is too large");

        let err = scrypt(b"pw", b"salt", &params).expect_err("expected invalid parameters");
        assert_eq!(err.kind, ErrorKind::InvalidParameters);
    }

    #[test]
    fn test_scrypt_small_rfc7914_vector() {
        let dk = scrypt(b"", b"", &ScryptParams::new(16, 1, 1, 64)).unwrap();
        assert_eq!(
            hex::encode(&*dk),
            "77d6576238657b203b19ca42c18a0497f16b4844e3074ae8dfdffa3fede21442\
             fcd0069ded0948f8326a753a0fc81f17e8d3e0fb2e0d3628cf35e20c38d18906"
        );
    }

    #[test]
    fn test_scrypt_is_deterministic() {
        let params = ScryptParams::new(64, 2, 2, 32);
        let a = scrypt(b"correct horse", b"salt", &params).unwrap();
        let b = scrypt(b"correct horse", b"salt", &params).unwrap();
        let c = scrypt(b"correct horsf", b"salt", &params).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }
}
