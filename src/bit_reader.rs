//! VP8 boolean arithmetic decoder (RFC 6386 section 7).
//!
//! The decoder keeps a 56-bit accumulator on 64-bit targets (24-bit
//! elsewhere) and stores `range - 1`, which stays in `[127, 254]` between
//! decisions. Renormalization recovers the shift count from
//! `leading_zeros()` instead of a lookup table; the resulting state is
//! identical.
//!
//! Reading past the end of the input synthesizes zero bits and never fails.
//! The exhaustion is recorded in an `eof` flag that callers check at
//! section boundaries to reject truncated frames wholesale.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::api::DecodingError;
use crate::tables::{Prob, TreeNode};

/// Accumulator refill size in bits. Any multiple of 8 from 8 to 56.
#[cfg(target_pointer_width = "64")]
const BITS: i32 = 56;
#[cfg(not(target_pointer_width = "64"))]
const BITS: i32 = 24;

const BYTES_PER_LOAD: usize = (BITS / 8) as usize;

/// Boolean decoder over an owned buffer.
///
/// This is the reader used for the frame header and per-macroblock mode
/// data (partition 0). It is also the reusable entry point for callers
/// that parse VP8 header bitstreams themselves: [`read_bool`], the
/// probability-128 shorthand [`read_flag`], MSB-first [`read_literal`] and
/// tree-coded [`read_with_tree`] cover the four primitive operations.
///
/// [`read_bool`]: BoolDecoder::read_bool
/// [`read_flag`]: BoolDecoder::read_flag
/// [`read_literal`]: BoolDecoder::read_literal
/// [`read_with_tree`]: BoolDecoder::read_with_tree
pub struct BoolDecoder {
    data: Box<[u8]>,
    pos: usize,
    value: u64,
    /// Current range minus 1, in `[127, 254]`.
    range: u32,
    /// Number of valid accumulator bits not yet consumed.
    bits: i32,
    eof: bool,
}

impl BoolDecoder {
    pub fn new() -> Self {
        Self {
            data: Box::new([]),
            pos: 0,
            value: 0,
            range: 255 - 1,
            bits: -8, // forces a load before the first decision
            eof: false,
        }
    }

    /// Initialize the decoder over `data`, resetting all state.
    pub fn init(&mut self, data: Vec<u8>) -> Result<(), DecodingError> {
        if data.is_empty() {
            return Err(DecodingError::NotEnoughInitData);
        }
        self.data = data.into_boxed_slice();
        self.pos = 0;
        self.value = 0;
        self.range = 255 - 1;
        self.bits = -8;
        self.eof = false;
        self.load_new_bytes();
        Ok(())
    }

    #[cold]
    fn load_final_bytes(&mut self) {
        if self.pos < self.data.len() {
            self.bits += 8;
            self.value = u64::from(self.data[self.pos]) | (self.value << 8);
            self.pos += 1;
        } else if !self.eof {
            // Past the end: shift in zero bits, once per refill.
            self.value <<= 8;
            self.bits += 8;
            self.eof = true;
        } else {
            // Keep the shift amounts defined for arbitrarily long tail reads.
            self.bits = 0;
        }
    }

    #[inline(always)]
    fn load_new_bytes(&mut self) {
        let remaining = self.data.len() - self.pos;
        if remaining >= BYTES_PER_LOAD {
            let bits = load_accumulator(&self.data[self.pos..]);
            self.value = bits | (self.value << BITS);
            self.bits += BITS;
            self.pos += BYTES_PER_LOAD;
        } else {
            self.load_final_bytes();
        }
    }

    /// Decode one boolean with the given probability of being zero.
    #[inline(always)]
    pub fn read_bool(&mut self, prob: Prob) -> bool {
        let mut range = self.range;
        if self.bits < 0 {
            self.load_new_bytes();
        }

        let pos = self.bits;
        let split = (range.wrapping_mul(u32::from(prob))) >> 8;
        let value = (self.value >> pos) as u32;
        let bit = value > split;

        if bit {
            range -= split;
            self.value = self.value.wrapping_sub((u64::from(split) + 1) << pos);
        } else {
            range = split + 1;
        }

        let shift = 7 ^ (31 ^ range.leading_zeros() as i32);
        range <<= shift;
        self.bits -= shift;
        self.range = range.wrapping_sub(1);

        bit
    }

    /// Decode one boolean at probability 128.
    #[inline(always)]
    pub fn read_flag(&mut self) -> bool {
        self.read_bool(128)
    }

    /// Read `n` bits MSB-first, each at probability 128.
    #[inline(always)]
    pub fn read_literal(&mut self, n: u8) -> u8 {
        let mut v = 0u8;
        for _ in 0..n {
            v = (v << 1) | (self.read_flag() as u8);
        }
        v
    }

    /// Read an optional signed value: a presence flag, then `n` magnitude
    /// bits, then a sign bit. Absent values decode as 0.
    #[inline]
    pub fn read_optional_signed_value(&mut self, n: u8) -> i32 {
        if !self.read_flag() {
            return 0;
        }
        let magnitude = i32::from(self.read_literal(n));
        if self.read_flag() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Walk a probability tree to a leaf and return its (token-encoded)
    /// value.
    #[inline]
    pub fn read_with_tree<const N: usize>(&mut self, tree: &[TreeNode; N]) -> i8 {
        let mut node = tree[0];
        loop {
            let b = self.read_bool(node.prob);
            let i = if b { node.right } else { node.left };
            let Some(next) = tree.get(usize::from(i)) else {
                return TreeNode::value_from_branch(i);
            };
            node = *next;
        }
    }

    /// True once any read has consumed synthesized zero bits.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Pass `value` through, failing if the decoder has run past the end
    /// of its input.
    #[inline]
    pub fn check<T>(&self, value: T) -> Result<T, DecodingError> {
        if self.eof {
            Err(DecodingError::BitStreamError)
        } else {
            Ok(value)
        }
    }
}

impl Default for BoolDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
fn load_accumulator(buf: &[u8]) -> u64 {
    #[cfg(target_pointer_width = "64")]
    {
        if buf.len() >= 8 {
            // Load 8 bytes big-endian and drop the last to get 7.
            u64::from_be_bytes(buf[..8].try_into().unwrap()) >> 8
        } else {
            let mut bits: u64 = 0;
            for &byte in buf.iter().take(BYTES_PER_LOAD) {
                bits = (bits << 8) | u64::from(byte);
            }
            bits
        }
    }
    #[cfg(not(target_pointer_width = "64"))]
    {
        let mut bits: u64 = 0;
        for &byte in buf.iter().take(BYTES_PER_LOAD) {
            bits = (bits << 8) | u64::from(byte);
        }
        bits
    }
}

/// Saved decoder state for one residual partition.
///
/// Macroblock rows alternate between partitions, so each partition's
/// position has to survive while the others advance.
#[derive(Clone, Copy, Default)]
pub(crate) struct PartitionState {
    value: u64,
    range: u32,
    bits: i32,
    pos: usize,
    eof: bool,
}

impl PartitionState {
    /// Fresh state with the accumulator primed from the first bytes of
    /// `data`, mirroring [`BoolDecoder::init`].
    fn primed(data: &[u8]) -> Self {
        let mut state = Self {
            value: 0,
            range: 255 - 1,
            bits: -8,
            pos: 0,
            eof: false,
        };
        if data.len() >= BYTES_PER_LOAD {
            state.value = load_accumulator(data);
            state.bits += BITS;
            state.pos = BYTES_PER_LOAD;
        } else if !data.is_empty() {
            state.value = u64::from(data[0]);
            state.bits += 8;
            state.pos = 1;
        } else {
            state.value = 0;
            state.bits += 8;
            state.eof = true;
        }
        state
    }
}

/// The residual partitions of a frame: concatenated data plus a saved
/// reader state per partition.
pub(crate) struct Partitions {
    data: Box<[u8]>,
    boundaries: [(usize, usize); 8],
    states: [PartitionState; 8],
}

impl Partitions {
    pub fn new() -> Self {
        Self {
            data: Box::new([]),
            boundaries: [(0, 0); 8],
            states: [PartitionState::default(); 8],
        }
    }

    /// Install partition data and initialize every partition's reader.
    pub fn init(&mut self, data: Vec<u8>, boundaries: &[(usize, usize)]) {
        self.data = data.into_boxed_slice();

        for (i, &(start, len)) in boundaries.iter().take(8).enumerate() {
            self.boundaries[i] = (start, len);
            self.states[i] = PartitionState::primed(&self.data[start..start + len]);
        }
    }

    /// Borrow a reader for partition `p`; its state is saved back on drop.
    #[inline]
    pub fn reader(&mut self, p: usize) -> PartitionReader<'_> {
        let (start, len) = self.boundaries[p];
        let state = self.states[p];
        PartitionReader {
            data: &self.data[start..start + len],
            state,
            save_to: &mut self.states[p],
        }
    }
}

impl Default for Partitions {
    fn default() -> Self {
        Self::new()
    }
}

/// A borrowed boolean decoder over one residual partition.
pub(crate) struct PartitionReader<'a> {
    data: &'a [u8],
    state: PartitionState,
    save_to: &'a mut PartitionState,
}

impl PartitionReader<'_> {
    #[cold]
    fn load_final_bytes(&mut self) {
        if self.state.pos < self.data.len() {
            self.state.bits += 8;
            self.state.value = u64::from(self.data[self.state.pos]) | (self.state.value << 8);
            self.state.pos += 1;
        } else if !self.state.eof {
            self.state.value <<= 8;
            self.state.bits += 8;
            self.state.eof = true;
        } else {
            self.state.bits = 0;
        }
    }

    #[inline(always)]
    fn load_new_bytes(&mut self) {
        let remaining = self.data.len() - self.state.pos;
        if remaining >= BYTES_PER_LOAD {
            let bits = load_accumulator(&self.data[self.state.pos..]);
            self.state.value = bits | (self.state.value << BITS);
            self.state.bits += BITS;
            self.state.pos += BYTES_PER_LOAD;
        } else {
            self.load_final_bytes();
        }
    }

    /// Decode one boolean, returned as 0 or 1 for arithmetic callers.
    #[inline(always)]
    pub fn get_bit(&mut self, prob: Prob) -> i32 {
        let mut range = self.state.range;
        if self.state.bits < 0 {
            self.load_new_bytes();
        }

        let pos = self.state.bits;
        let split = (range.wrapping_mul(u32::from(prob))) >> 8;
        let value = (self.state.value >> pos) as u32;
        let bit = i32::from(value > split);

        if bit != 0 {
            range -= split;
            self.state.value = self
                .state
                .value
                .wrapping_sub((u64::from(split) + 1) << pos);
        } else {
            range = split + 1;
        }

        let shift = 7 ^ (31 ^ range.leading_zeros() as i32);
        range <<= shift;
        self.state.bits -= shift;
        self.state.range = range.wrapping_sub(1);

        bit
    }

    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        self.state.eof
    }
}

impl Drop for PartitionReader<'_> {
    fn drop(&mut self) {
        *self.save_to = self.state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn flags_follow_high_bits() {
        // At probability 128 the first decision compares the leading byte
        // against the midpoint of the range.
        let mut b = BoolDecoder::new();
        b.init(vec![0xFF; 8]).unwrap();
        assert!(b.read_flag());

        let mut b = BoolDecoder::new();
        b.init(vec![0x00; 8]).unwrap();
        assert!(!b.read_flag());
    }

    #[test]
    fn zero_input_decodes_zero_symbols() {
        let mut b = BoolDecoder::new();
        b.init(vec![0u8; 32]).unwrap();
        for _ in 0..100 {
            assert!(!b.read_flag());
        }
        assert_eq!(b.read_literal(7), 0);
        assert_eq!(b.read_optional_signed_value(4), 0);
        assert!(!b.is_eof());
    }

    #[test]
    fn tail_reads_synthesize_zeros_without_panicking() {
        let mut b = BoolDecoder::new();
        b.init(vec![0x55, 0xAA, 0x55]).unwrap();
        // Far past the end of three bytes; must stay well-defined.
        for _ in 0..10_000 {
            let _ = b.read_flag();
        }
        assert!(b.is_eof());
        assert!(b.check(()).is_err());
    }

    #[test]
    fn eof_not_reported_early() {
        let data: Vec<u8> = (0..64).map(|i| (i * 17 + 31) as u8).collect();
        let mut b = BoolDecoder::new();
        b.init(data).unwrap();
        for _ in 0..50 {
            let _ = b.read_flag();
        }
        assert!(!b.is_eof());
        assert!(b.check(()).is_ok());
    }

    #[test]
    fn empty_init_rejected() {
        let mut b = BoolDecoder::new();
        assert!(matches!(
            b.init(Vec::new()),
            Err(DecodingError::NotEnoughInitData)
        ));
    }

    #[test]
    fn tree_read_takes_left_spine_on_zero_input() {
        use crate::tables::KEYFRAME_YMODE_NODES;
        let mut b = BoolDecoder::new();
        b.init(vec![0u8; 16]).unwrap();
        // Every decision decodes to zero, so the walk ends at the first
        // left leaf: B_PRED (4).
        assert_eq!(b.read_with_tree(&KEYFRAME_YMODE_NODES), crate::tables::B_PRED);
    }

    #[test]
    fn partition_state_round_trips() {
        let data: Vec<u8> = (0..64).map(|i| (i * 13 + 7) as u8).collect();
        let mut parts = Partitions::new();
        let len = data.len();
        parts.init(data, &[(0, len)]);

        let mut first = Vec::new();
        {
            let mut r = parts.reader(0);
            for _ in 0..20 {
                first.push(r.get_bit(128));
            }
        }
        // A fresh reader resumes exactly where the previous one stopped:
        // decoding the same stream in one go must agree.
        let data2: Vec<u8> = (0..64).map(|i| (i * 13 + 7) as u8).collect();
        let mut parts2 = Partitions::new();
        parts2.init(data2, &[(0, 64)]);
        let mut both = Vec::new();
        {
            let mut r = parts2.reader(0);
            for _ in 0..10 {
                both.push(r.get_bit(128));
            }
        }
        {
            let mut r = parts2.reader(0);
            for _ in 0..10 {
                both.push(r.get_bit(128));
            }
        }
        assert_eq!(first[..20], both[..20]);
    }
}
