//! VP8 key-frame decoder core (RFC 6386).
//!
//! Decoding runs in two explicit phases. The first pass walks the
//! macroblock raster: per-macroblock header from partition 0, residual
//! tokens from the frame's residual partitions, dequantization, inverse
//! transform, intra prediction and reconstruction straight into
//! macroblock-aligned plane buffers. The second pass runs the in-loop
//! deblocking filter over the finished planes in the same raster order,
//! which yields pixels identical to the interleaved schedule because the
//! filter only touches the current macroblock and its left/top neighbors.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use byteorder_lite::{ByteOrder, LittleEndian};
use core::array;

use crate::api::DecodingError;
use crate::bit_reader::{BoolDecoder, PartitionReader, Partitions};
use crate::limits::Limits;
use crate::loop_filter;
use crate::prediction::*;
use crate::slice_reader::SliceReader;
use crate::tables::*;
use crate::transform;

/// Luma prediction mode for a whole macroblock.
#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LumaMode {
    /// Mean of the row above and the column to the left.
    #[default]
    DC = DC_PRED,
    /// Each column copies the row above.
    V = V_PRED,
    /// Each row copies the column to the left.
    H = H_PRED,
    /// Propagate second differences ("true motion").
    TM = TM_PRED,
    /// Every 4x4 luma subblock carries its own [`IntraMode`].
    B = B_PRED,
}

impl LumaMode {
    fn from_i8(val: i8) -> Option<Self> {
        Some(match val {
            DC_PRED => Self::DC,
            V_PRED => Self::V,
            H_PRED => Self::H,
            TM_PRED => Self::TM,
            B_PRED => Self::B,
            _ => return None,
        })
    }

    /// The equivalent subblock mode recorded as prediction context for
    /// neighboring B_PRED macroblocks; `None` for B itself.
    fn into_intra(self) -> Option<IntraMode> {
        match self {
            Self::DC => Some(IntraMode::DC),
            Self::V => Some(IntraMode::VE),
            Self::H => Some(IntraMode::HE),
            Self::TM => Some(IntraMode::TM),
            Self::B => None,
        }
    }
}

/// Chroma prediction mode for a macroblock's 8x8 U and V blocks.
#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChromaMode {
    /// Mean of the row above and the column to the left.
    #[default]
    DC = DC_PRED,
    /// Each column copies the row above.
    V = V_PRED,
    /// Each row copies the column to the left.
    H = H_PRED,
    /// Propagate second differences.
    TM = TM_PRED,
}

impl ChromaMode {
    fn from_i8(val: i8) -> Option<Self> {
        Some(match val {
            DC_PRED => Self::DC,
            V_PRED => Self::V,
            H_PRED => Self::H,
            TM_PRED => Self::TM,
            _ => return None,
        })
    }
}

/// Per-subblock intra mode for B_PRED macroblocks.
#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IntraMode {
    #[default]
    DC = B_DC_PRED,
    TM = B_TM_PRED,
    VE = B_VE_PRED,
    HE = B_HE_PRED,
    LD = B_LD_PRED,
    RD = B_RD_PRED,
    VR = B_VR_PRED,
    VL = B_VL_PRED,
    HD = B_HD_PRED,
    HU = B_HU_PRED,
}

impl IntraMode {
    fn from_i8(val: i8) -> Option<Self> {
        Some(match val {
            B_DC_PRED => Self::DC,
            B_TM_PRED => Self::TM,
            B_VE_PRED => Self::VE,
            B_HE_PRED => Self::HE,
            B_LD_PRED => Self::LD,
            B_RD_PRED => Self::RD,
            B_VR_PRED => Self::VR,
            B_VL_PRED => Self::VL,
            B_HD_PRED => Self::HD,
            B_HU_PRED => Self::HU,
            _ => return None,
        })
    }
}

/// Token probability class selector (RFC 6386 section 13.3).
#[repr(usize)]
#[derive(Clone, Copy, PartialEq, Eq)]
enum TokenClass {
    /// Luma blocks whose DC comes from the Y2 block; tokens start at
    /// position 1.
    YAfterY2 = 0,
    /// The second-order luma DC block.
    Y2 = 1,
    /// U and V blocks.
    Chroma = 2,
    /// Luma blocks of B_PRED macroblocks; tokens start at position 0.
    YAll = 3,
}

/// Per-segment dequantization factors and feature adjustments.
#[derive(Clone, Copy, Default)]
pub(crate) struct Segment {
    pub ydc: i16,
    pub yac: i16,
    pub y2dc: i16,
    pub y2ac: i16,
    pub uvdc: i16,
    pub uvac: i16,

    /// False: segment values replace the frame values. True: they are
    /// added to them.
    pub delta_values: bool,
    pub quantizer_level: i8,
    pub loopfilter_level: i8,
}

/// Everything the loop-filter pass needs to know about a decoded
/// macroblock.
#[derive(Default, Clone, Copy)]
struct MacroBlock {
    bpred: [IntraMode; 16],
    luma_mode: LumaMode,
    chroma_mode: ChromaMode,
    segmentid: u8,
    coeffs_skipped: bool,
    non_zero_dct: bool,
}

/// Decode context carried from a finished macroblock to later ones: the
/// bottom submodes (for the row above) or right submodes (for the block
/// to the left), plus the non-zero-coefficient flags laid out as
/// y2, y, y, y, y, u, u, v, v.
#[derive(Default, Clone, Copy)]
struct NeighborContext {
    bpred: [IntraMode; 4],
    complexity: [u8; 9],
}

/// A decoded key frame: planar YUV 4:2:0 at macroblock-aligned
/// resolution plus the true pixel dimensions.
#[derive(Default, Debug, Clone)]
pub struct Frame {
    /// Width of the visible image in pixels.
    pub width: u16,
    /// Height of the visible image in pixels.
    pub height: u16,

    /// Luma plane, `luma_stride()` bytes per row.
    pub ybuf: Vec<u8>,
    /// U chroma plane at half resolution, `chroma_stride()` bytes per row.
    pub ubuf: Vec<u8>,
    /// V chroma plane at half resolution.
    pub vbuf: Vec<u8>,

    /// Bitstream version from the frame tag (profile 0-3).
    pub version: u8,
    /// Whether the frame is flagged for display.
    pub for_display: bool,
    /// Reconstruction clamping type from section 9.2.
    pub pixel_type: u8,

    pub(crate) keyframe: bool,
    /// True selects the simple (luma-only) loop filter.
    pub(crate) filter_type: bool,
    pub(crate) filter_level: u8,
    pub(crate) sharpness_level: u8,
}

impl Frame {
    /// Luma row length in bytes: the width rounded up to whole
    /// macroblocks.
    #[must_use]
    pub const fn luma_stride(&self) -> usize {
        self.width.div_ceil(16) as usize * 16
    }

    /// Chroma row length in bytes.
    #[must_use]
    pub const fn chroma_stride(&self) -> usize {
        self.width.div_ceil(16) as usize * 8
    }

    /// Chroma plane width in visible pixels.
    #[must_use]
    pub const fn chroma_width(&self) -> u16 {
        self.width.div_ceil(2)
    }

    /// Chroma plane height in visible pixels.
    #[must_use]
    pub const fn chroma_height(&self) -> u16 {
        self.height.div_ceil(2)
    }

    /// A visible luma row, cropped to `width`.
    #[must_use]
    pub fn y_row(&self, row: usize) -> &[u8] {
        &self.ybuf[row * self.luma_stride()..][..usize::from(self.width)]
    }

    /// A visible U row, cropped to `chroma_width`.
    #[must_use]
    pub fn u_row(&self, row: usize) -> &[u8] {
        &self.ubuf[row * self.chroma_stride()..][..usize::from(self.chroma_width())]
    }

    /// A visible V row, cropped to `chroma_width`.
    #[must_use]
    pub fn v_row(&self, row: usize) -> &[u8] {
        &self.vbuf[row * self.chroma_stride()..][..usize::from(self.chroma_width())]
    }
}

fn dc_quant(index: i32) -> i16 {
    DC_QUANT[index.clamp(0, 127) as usize]
}

fn ac_quant(index: i32) -> i16 {
    AC_QUANT[index.clamp(0, 127) as usize]
}

/// Position-indexed token probability table: `[class][position][context]`
/// instead of `[class][band][context]`, removing the band lookup from the
/// decode loop. Position 16 is a sentinel copying band 7 so the loop can
/// look one position ahead.
type TokenProbsByPosition = [[[[TreeNode; NUM_DCT_TOKENS - 1]; 3]; 17]; 4];

/// Decode the tokens of one 4x4 block, dequantizing into `output` in
/// scan order. Returns whether any position past `first` decoded a
/// token; that bit is the neighbor context fed to later blocks.
fn read_coefficients(
    reader: &mut PartitionReader<'_>,
    output: &mut [i32],
    probs: &[[[TreeNode; NUM_DCT_TOKENS - 1]; 3]; 17],
    first: usize,
    complexity: usize,
    dcq: i16,
    acq: i16,
) -> Result<bool, DecodingError> {
    debug_assert!(complexity <= 2);
    debug_assert!(output.len() >= 16);

    let mut n = first;
    let mut prob = &probs[n][complexity];

    while n < 16 {
        // Node 0: end-of-block.
        if reader.get_bit(prob[0].prob) == 0 {
            break;
        }

        // Node 1: zero run. A zero writes nothing and drops the context.
        while reader.get_bit(prob[1].prob) == 0 {
            n += 1;
            if n >= 16 {
                if reader.is_eof() {
                    return Err(DecodingError::BitStreamError);
                }
                return Ok(true);
            }
            prob = &probs[n][0];
        }

        let v: i32;
        let next_ctx: usize;

        if reader.get_bit(prob[2].prob) == 0 {
            v = 1;
            next_ctx = 1;
        } else {
            if reader.get_bit(prob[3].prob) == 0 {
                // Small literals 2..4.
                if reader.get_bit(prob[4].prob) == 0 {
                    v = 2;
                } else {
                    v = 3 + reader.get_bit(prob[5].prob);
                }
            } else {
                // Magnitude categories with fixed extra-bit
                // probabilities; bases 5, 7, 11, 19, 35, 67.
                if reader.get_bit(prob[6].prob) == 0 {
                    if reader.get_bit(prob[7].prob) == 0 {
                        v = 5 + reader.get_bit(PROB_DCT_CAT[0][0]);
                    } else {
                        v = 7
                            + 2 * reader.get_bit(PROB_DCT_CAT[1][0])
                            + reader.get_bit(PROB_DCT_CAT[1][1]);
                    }
                } else {
                    let bit1 = reader.get_bit(prob[8].prob);
                    let bit0 = reader.get_bit(prob[9 + bit1 as usize].prob);
                    let cat = (2 * bit1 + bit0) as usize;

                    let cat_probs = &PROB_DCT_CAT[2 + cat];
                    let mut extra = 0i32;
                    for &p in cat_probs.iter() {
                        if p == 0 {
                            break;
                        }
                        extra = extra + extra + reader.get_bit(p);
                    }
                    v = 3 + (8 << cat) + extra;
                }
            }
            next_ctx = 2;
        }

        let signed_v = if reader.get_bit(128) != 0 { -v } else { v };

        let zigzag = ZIGZAG[n] as usize;
        let q = if zigzag > 0 { acq } else { dcq };
        output[zigzag] = signed_v * i32::from(q);

        n += 1;
        if n < 16 {
            prob = &probs[n][next_ctx];
        }
    }

    if reader.is_eof() {
        return Err(DecodingError::BitStreamError);
    }
    Ok(n > first)
}

/// VP8 key-frame decoder.
///
/// Decodes intra (key) frames only; interframes fail fast with
/// [`DecodingError::UnsupportedFeature`].
pub struct Vp8Decoder<'a> {
    r: SliceReader<'a>,
    b: BoolDecoder,

    mbwidth: u16,
    mbheight: u16,
    macroblocks: Vec<MacroBlock>,

    frame: Frame,

    segments_enabled: bool,
    segments_update_map: bool,
    segment: [Segment; MAX_SEGMENTS],

    loop_filter_adjustments_enabled: bool,
    ref_delta: [i32; 4],
    mode_delta: [i32; 4],

    partitions: Partitions,
    num_partitions: u8,

    segment_tree_nodes: [TreeNode; 3],
    token_probs: Box<TokenProbTreeNodes>,
    token_probs_by_pos: Box<TokenProbsByPosition>,

    /// Section 9.11: probability that a macroblock's skip flag is false,
    /// when skip flags are coded at all.
    prob_skip_false: Option<Prob>,

    top: Vec<NeighborContext>,
    left: NeighborContext,

    // Rolling prediction borders (section 12). The left borders carry
    // the above-left corner pixel at index 0.
    top_border_y: Vec<u8>,
    left_border_y: Vec<u8>,
    top_border_u: Vec<u8>,
    left_border_u: Vec<u8>,
    top_border_v: Vec<u8>,
    left_border_v: Vec<u8>,

    // Shared coefficient storage for one macroblock: 16 luma + 4 U + 4 V
    // blocks of 16. Kept all-zero between macroblocks; reconstruction
    // clears each block after use.
    coeff_blocks: [i32; 384],

    limits: Limits,
    stop: Option<&'a dyn enough::Stop>,
}

impl<'a> Vp8Decoder<'a> {
    /// Create a decoder over raw VP8 frame data, positioned at the frame
    /// tag.
    fn new(data: &'a [u8]) -> Self {
        Self {
            r: SliceReader::new(data),
            b: BoolDecoder::new(),

            mbwidth: 0,
            mbheight: 0,
            macroblocks: Vec::new(),

            frame: Frame::default(),

            segments_enabled: false,
            segments_update_map: false,
            segment: array::from_fn(|_| Segment::default()),

            loop_filter_adjustments_enabled: false,
            ref_delta: [0; 4],
            mode_delta: [0; 4],

            partitions: Partitions::new(),
            num_partitions: 1,

            segment_tree_nodes: SEGMENT_TREE_NODE_DEFAULTS,
            token_probs: Box::new(COEFF_PROB_NODES),
            token_probs_by_pos: Box::new([[[[TreeNode::UNINIT; 11]; 3]; 17]; 4]),

            prob_skip_false: None,

            top: Vec::new(),
            left: NeighborContext::default(),

            top_border_y: Vec::new(),
            left_border_y: Vec::new(),
            top_border_u: Vec::new(),
            left_border_u: Vec::new(),
            top_border_v: Vec::new(),
            left_border_v: Vec::new(),

            coeff_blocks: [0i32; 384],

            limits: Limits::default(),
            stop: None,
        }
    }

    /// Decode a key frame.
    pub fn decode_frame(data: &'a [u8]) -> Result<Frame, DecodingError> {
        Self::new(data).decode_frame_()
    }

    /// Decode a key frame with cooperative cancellation, checked between
    /// macroblock rows.
    pub fn decode_frame_with_stop(
        data: &'a [u8],
        stop: Option<&'a dyn enough::Stop>,
    ) -> Result<Frame, DecodingError> {
        let mut decoder = Self::new(data);
        decoder.stop = stop;
        decoder.decode_frame_()
    }

    /// Decode a key frame under the given resource limits.
    pub fn decode_frame_with_limits(
        data: &'a [u8],
        limits: Limits,
    ) -> Result<Frame, DecodingError> {
        let mut decoder = Self::new(data);
        decoder.limits = limits;
        decoder.decode_frame_()
    }

    fn read_segment_updates(&mut self) -> Result<(), DecodingError> {
        // Section 9.3
        self.segments_update_map = self.b.read_flag();
        let update_segment_feature_data = self.b.read_flag();

        if update_segment_feature_data {
            let segment_feature_mode = self.b.read_flag();

            for seg in self.segment.iter_mut() {
                seg.delta_values = !segment_feature_mode;
            }

            for i in 0usize..MAX_SEGMENTS {
                self.segment[i].quantizer_level = self.b.read_optional_signed_value(7) as i8;
            }

            for i in 0usize..MAX_SEGMENTS {
                self.segment[i].loopfilter_level = self.b.read_optional_signed_value(6) as i8;
            }
        }

        if self.segments_update_map {
            for i in 0usize..3 {
                let update = self.b.read_flag();
                let prob = if update { self.b.read_literal(8) } else { 255 };
                self.segment_tree_nodes[i].prob = prob;
            }
        }

        self.b.check(())
    }

    fn read_loop_filter_adjustments(&mut self) -> Result<(), DecodingError> {
        if self.b.read_flag() {
            for i in 0usize..4 {
                self.ref_delta[i] = self.b.read_optional_signed_value(6);
            }
            for i in 0usize..4 {
                self.mode_delta[i] = self.b.read_optional_signed_value(6);
            }
        }

        self.b.check(())
    }

    /// Section 9.6: derive every segment's dequantization factors from
    /// the base index and the five signed deltas.
    fn read_quantization_indices(&mut self) -> Result<(), DecodingError> {
        let yac_abs = self.b.read_literal(7);
        let ydc_delta = self.b.read_optional_signed_value(4);
        let y2dc_delta = self.b.read_optional_signed_value(4);
        let y2ac_delta = self.b.read_optional_signed_value(4);
        let uvdc_delta = self.b.read_optional_signed_value(4);
        let uvac_delta = self.b.read_optional_signed_value(4);

        let n = if self.segments_enabled {
            MAX_SEGMENTS
        } else {
            1
        };
        for i in 0usize..n {
            let base = i32::from(if self.segments_enabled {
                if self.segment[i].delta_values {
                    i16::from(self.segment[i].quantizer_level) + i16::from(yac_abs)
                } else {
                    i16::from(self.segment[i].quantizer_level)
                }
            } else {
                i16::from(yac_abs)
            });

            self.segment[i].ydc = dc_quant(base + ydc_delta);
            self.segment[i].yac = ac_quant(base);

            self.segment[i].y2dc = dc_quant(base + y2dc_delta) * 2;
            // The product can exceed i16 (up to 284 * 155), widen first.
            self.segment[i].y2ac = (i32::from(ac_quant(base + y2ac_delta)) * 155 / 100) as i16;

            self.segment[i].uvdc = dc_quant(base + uvdc_delta);
            self.segment[i].uvac = ac_quant(base + uvac_delta);

            if self.segment[i].y2ac < 8 {
                self.segment[i].y2ac = 8;
            }
            if self.segment[i].uvdc > 132 {
                self.segment[i].uvdc = 132;
            }
        }

        self.b.check(())
    }

    fn update_token_probabilities(&mut self) -> Result<(), DecodingError> {
        for (i, is) in COEFF_UPDATE_PROBS.iter().enumerate() {
            for (j, js) in is.iter().enumerate() {
                for (k, ks) in js.iter().enumerate() {
                    for (t, prob) in ks.iter().enumerate().take(NUM_DCT_TOKENS - 1) {
                        if self.b.read_bool(*prob) {
                            let v = self.b.read_literal(8);
                            self.token_probs[i][j][k][t].prob = v;
                        }
                    }
                }
            }
        }
        self.b.check(())
    }

    /// Rebuild the position-indexed table from the (possibly updated)
    /// banded probabilities.
    fn populate_probs_by_position(&mut self) {
        for class in 0..4 {
            for pos in 0..17 {
                let band = if pos < 16 {
                    COEFF_BANDS[pos] as usize
                } else {
                    7
                };
                for ctx in 0..3 {
                    self.token_probs_by_pos[class][pos][ctx] = self.token_probs[class][band][ctx];
                }
            }
        }
    }

    fn init_partitions(&mut self, n: usize) -> Result<(), DecodingError> {
        let mut all_data = Vec::new();
        let mut boundaries = Vec::with_capacity(n);

        // All n - 1 three-byte size prefixes precede the partition data;
        // the last partition runs to the end of the input.
        if n > 1 {
            let mut sizes = vec![0u8; 3 * (n - 1)];
            self.r.read_exact(&mut sizes)?;

            for s in sizes.chunks(3) {
                let size = LittleEndian::read_u24(s) as usize;
                let start = all_data.len();
                all_data.resize(start + size, 0);
                self.r.read_exact(&mut all_data[start..start + size])?;
                boundaries.push((start, size));
            }
        }

        let start = all_data.len();
        self.r.read_to_end(&mut all_data)?;
        let size = all_data.len() - start;
        boundaries.push((start, size));

        self.partitions.init(all_data, &boundaries);

        Ok(())
    }

    fn read_frame_header(&mut self) -> Result<(), DecodingError> {
        let tag = self.r.read_u24_le()?;

        self.frame.keyframe = tag & 1 == 0;
        if !self.frame.keyframe {
            return Err(DecodingError::UnsupportedFeature(
                "non-keyframe (inter) frames".into(),
            ));
        }

        self.frame.version = ((tag >> 1) & 7) as u8;
        self.frame.for_display = (tag >> 4) & 1 != 0;

        let first_partition_size = tag >> 5;

        let mut magic = [0u8; 3];
        self.r.read_exact(&mut magic)?;
        if magic != [0x9d, 0x01, 0x2a] {
            return Err(DecodingError::Vp8MagicInvalid(magic));
        }

        let w = self.r.read_u16_le()?;
        let h = self.r.read_u16_le()?;

        self.frame.width = w & 0x3FFF;
        self.frame.height = h & 0x3FFF;

        self.limits
            .check_dimensions(u32::from(self.frame.width), u32::from(self.frame.height))?;

        self.mbwidth = self.frame.width.div_ceil(16);
        self.mbheight = self.frame.height.div_ceil(16);

        let mbw = usize::from(self.mbwidth);
        let mbh = usize::from(self.mbheight);

        self.limits
            .check_memory(mbw * 16 * mbh * 16 + 2 * (mbw * 8 * mbh * 8))?;

        self.top = vec![NeighborContext::default(); mbw];
        self.left = NeighborContext::default();
        self.macroblocks = Vec::with_capacity(mbw * mbh);

        self.frame.ybuf = vec![0u8; mbw * 16 * mbh * 16];
        self.frame.ubuf = vec![0u8; mbw * 8 * mbh * 8];
        self.frame.vbuf = vec![0u8; mbw * 8 * mbh * 8];

        // Above-row pixels plus above-right overhang for the last
        // macroblock column.
        self.top_border_y = vec![127u8; mbw * 16 + 16];
        self.left_border_y = vec![129u8; 1 + 16];
        self.top_border_u = vec![127u8; mbw * 8];
        self.left_border_u = vec![129u8; 1 + 8];
        self.top_border_v = vec![127u8; mbw * 8];
        self.left_border_v = vec![129u8; 1 + 8];

        let data = self.r.take_slice(first_partition_size as usize)?.to_vec();
        self.b.init(data)?;

        let color_space = self.b.read_literal(1);
        self.frame.pixel_type = self.b.read_literal(1);
        if color_space != 0 {
            return Err(DecodingError::ColorSpaceInvalid(color_space));
        }

        self.segments_enabled = self.b.read_flag();
        if self.segments_enabled {
            self.read_segment_updates()?;
        }

        self.frame.filter_type = self.b.read_flag();
        self.frame.filter_level = self.b.read_literal(6);
        self.frame.sharpness_level = self.b.read_literal(3);

        self.loop_filter_adjustments_enabled = self.b.read_flag();
        if self.loop_filter_adjustments_enabled {
            self.read_loop_filter_adjustments()?;
        }

        let num_partitions = 1usize << self.b.read_literal(2);
        self.b.check(())?;

        self.num_partitions = num_partitions as u8;
        self.init_partitions(num_partitions)?;

        self.read_quantization_indices()?;

        // Keyframes always refresh the entropy tables; the flag is
        // present in the bitstream regardless.
        let _refresh_entropy = self.b.read_literal(1);

        self.update_token_probabilities()?;
        self.populate_probs_by_position();

        let mb_no_skip_coeff = self.b.read_literal(1);
        self.prob_skip_false = if mb_no_skip_coeff == 1 {
            Some(self.b.read_literal(8))
        } else {
            None
        };
        self.b.check(())?;

        log::debug!(
            "vp8 keyframe: {}x{} ({}x{} macroblocks), {} partition(s), {} filter level {} sharpness {}",
            self.frame.width,
            self.frame.height,
            self.mbwidth,
            self.mbheight,
            self.num_partitions,
            if self.frame.filter_type { "simple" } else { "normal" },
            self.frame.filter_level,
            self.frame.sharpness_level,
        );

        Ok(())
    }

    fn read_macroblock_header(&mut self, mbx: usize) -> Result<MacroBlock, DecodingError> {
        let mut mb = MacroBlock::default();

        if self.segments_enabled && self.segments_update_map {
            mb.segmentid = self.b.read_with_tree(&self.segment_tree_nodes) as u8;
        };

        mb.coeffs_skipped = if let Some(prob) = self.prob_skip_false {
            self.b.read_bool(prob)
        } else {
            false
        };

        let luma = self.b.read_with_tree(&KEYFRAME_YMODE_NODES);
        mb.luma_mode =
            LumaMode::from_i8(luma).ok_or(DecodingError::LumaPredictionModeInvalid(luma))?;

        match mb.luma_mode.into_intra() {
            // B_PRED: sixteen individually coded submodes, each
            // conditioned on its above and left neighbor submodes.
            None => {
                for y in 0usize..4 {
                    for x in 0usize..4 {
                        let top = self.top[mbx].bpred[x];
                        let left = self.left.bpred[y];
                        let intra = self
                            .b
                            .read_with_tree(&KEYFRAME_BPRED_MODE_NODES[top as usize][left as usize]);
                        let bmode = IntraMode::from_i8(intra)
                            .ok_or(DecodingError::IntraPredictionModeInvalid(intra))?;
                        mb.bpred[x + y * 4] = bmode;

                        self.top[mbx].bpred[x] = bmode;
                        self.left.bpred[y] = bmode;
                    }
                }
            }
            Some(mode) => {
                for i in 0usize..4 {
                    mb.bpred[12 + i] = mode;
                    self.left.bpred[i] = mode;
                }
            }
        }

        let chroma = self.b.read_with_tree(&KEYFRAME_UV_MODE_NODES);
        mb.chroma_mode =
            ChromaMode::from_i8(chroma).ok_or(DecodingError::ChromaPredictionModeInvalid(chroma))?;

        // The above context keeps the bottom row of submodes.
        self.top[mbx].bpred = mb.bpred[12..].try_into().unwrap();

        self.b.check(mb)
    }

    /// Decode the residual blocks of one macroblock into
    /// `self.coeff_blocks` (luma 0..16, U 16..20, V 20..24).
    fn read_residual_data(
        &mut self,
        mb: &mut MacroBlock,
        mbx: usize,
        p: usize,
    ) -> Result<(), DecodingError> {
        let sindex = mb.segmentid as usize;
        let Segment {
            ydc,
            yac,
            y2dc,
            y2ac,
            uvdc,
            uvac,
            ..
        } = self.segment[sindex];

        // Field-level borrows: the partition reader, probability table,
        // coefficient storage and neighbor contexts are disjoint.
        let mut reader = self.partitions.reader(p);
        let probs = &*self.token_probs_by_pos;
        let coeff_blocks = &mut self.coeff_blocks;
        let top = &mut self.top[mbx];
        let left = &mut self.left;

        let mut class = if mb.luma_mode == LumaMode::B {
            TokenClass::YAll
        } else {
            TokenClass::Y2
        };

        if class == TokenClass::Y2 {
            let complexity = top.complexity[0] + left.complexity[0];
            let mut block = [0i32; 16];
            let n = read_coefficients(
                &mut reader,
                &mut block,
                &probs[TokenClass::Y2 as usize],
                0,
                complexity as usize,
                y2dc,
                y2ac,
            )?;

            left.complexity[0] = u8::from(n);
            top.complexity[0] = u8::from(n);

            transform::iwht4x4(&mut block);

            // The WHT outputs become the DC terms of the 16 luma blocks.
            for (k, &val) in block.iter().enumerate() {
                coeff_blocks[16 * k] = val;
            }

            class = TokenClass::YAfterY2;
        }

        let first_y = if class == TokenClass::YAfterY2 { 1 } else { 0 };

        for y in 0usize..4 {
            let mut left_ctx = left.complexity[y + 1];
            for x in 0usize..4 {
                let i = x + y * 4;
                let complexity = top.complexity[x + 1] + left_ctx;

                let block_slice = &mut coeff_blocks[i * 16..][..16];
                let n = read_coefficients(
                    &mut reader,
                    block_slice,
                    &probs[class as usize],
                    first_y,
                    complexity as usize,
                    ydc,
                    yac,
                )?;

                if block_slice[0] != 0 || n {
                    mb.non_zero_dct = true;
                }

                left_ctx = u8::from(n);
                top.complexity[x + 1] = u8::from(n);
            }
            left.complexity[y + 1] = left_ctx;
        }

        let chroma_probs = &probs[TokenClass::Chroma as usize];

        // U context lives at complexity offset 5, V at offset 7.
        for &j in &[5usize, 7usize] {
            for y in 0usize..2 {
                let mut left_ctx = left.complexity[y + j];
                for x in 0usize..2 {
                    let i = x + y * 2 + if j == 5 { 16 } else { 20 };
                    let complexity = top.complexity[x + j] + left_ctx;

                    let block_slice = &mut coeff_blocks[i * 16..][..16];
                    let n = read_coefficients(
                        &mut reader,
                        block_slice,
                        chroma_probs,
                        0,
                        complexity as usize,
                        uvdc,
                        uvac,
                    )?;

                    if block_slice[0] != 0 || n {
                        mb.non_zero_dct = true;
                    }

                    left_ctx = u8::from(n);
                    top.complexity[x + j] = u8::from(n);
                }
                left.complexity[y + j] = left_ctx;
            }
        }

        Ok(())
    }

    fn intra_predict_luma(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let stride = LUMA_STRIDE;
        let mw = usize::from(self.mbwidth);
        let mut ws = create_border_luma(mbx, mby, mw, &self.top_border_y, &self.left_border_y);

        match mb.luma_mode {
            LumaMode::V => predict_vpred(&mut ws, 16, 1, 1, stride),
            LumaMode::H => predict_hpred(&mut ws, 16, 1, 1, stride),
            LumaMode::TM => predict_tmpred(&mut ws, 16, 1, 1, stride),
            LumaMode::DC => predict_dcpred(&mut ws, 16, stride, mby != 0, mbx != 0),
            LumaMode::B => {
                // Predict and reconstruct subblock by subblock so later
                // subblocks see their neighbors' reconstructed pixels.
                for sby in 0usize..4 {
                    for sbx in 0usize..4 {
                        let i = sbx + sby * 4;
                        let y0 = sby * 4 + 1;
                        let x0 = sbx * 4 + 1;

                        match mb.bpred[i] {
                            IntraMode::TM => predict_tmpred(&mut ws, 4, x0, y0, stride),
                            IntraMode::VE => predict_bvepred(&mut ws, x0, y0, stride),
                            IntraMode::HE => predict_bhepred(&mut ws, x0, y0, stride),
                            IntraMode::DC => predict_bdcpred(&mut ws, x0, y0, stride),
                            IntraMode::LD => predict_bldpred(&mut ws, x0, y0, stride),
                            IntraMode::RD => predict_brdpred(&mut ws, x0, y0, stride),
                            IntraMode::VR => predict_bvrpred(&mut ws, x0, y0, stride),
                            IntraMode::VL => predict_bvlpred(&mut ws, x0, y0, stride),
                            IntraMode::HD => predict_bhdpred(&mut ws, x0, y0, stride),
                            IntraMode::HU => predict_bhupred(&mut ws, x0, y0, stride),
                        }

                        let rb: &mut [i32; 16] =
                            (&mut self.coeff_blocks[i * 16..][..16]).try_into().unwrap();
                        idct_add_residue_and_clear(&mut ws, rb, y0, x0, stride);
                    }
                }
            }
        }

        if mb.luma_mode != LumaMode::B {
            for y in 0usize..4 {
                for x in 0usize..4 {
                    let i = x + y * 4;
                    let rb: &mut [i32; 16] =
                        (&mut self.coeff_blocks[i * 16..][..16]).try_into().unwrap();
                    idct_add_residue_and_clear(&mut ws, rb, 1 + y * 4, 1 + x * 4, stride);
                }
            }
        }

        // Roll the borders: the corner for the next macroblock is this
        // one's above-row pixel at x = 16.
        self.left_border_y[0] = ws[16];
        for (i, left) in self.left_border_y[1..][..16].iter_mut().enumerate() {
            *left = ws[(i + 1) * stride + 16];
        }
        self.top_border_y[mbx * 16..][..16].copy_from_slice(&ws[16 * stride + 1..][..16]);

        // Publish the reconstructed interior.
        let luma_stride = mw * 16;
        for y in 0usize..16 {
            let dst = (mby * 16 + y) * luma_stride + mbx * 16;
            self.frame.ybuf[dst..][..16].copy_from_slice(&ws[(1 + y) * stride + 1..][..16]);
        }
    }

    fn intra_predict_chroma(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let stride = CHROMA_STRIDE;

        let mut uws = create_border_chroma(mbx, mby, &self.top_border_u, &self.left_border_u);
        let mut vws = create_border_chroma(mbx, mby, &self.top_border_v, &self.left_border_v);

        match mb.chroma_mode {
            ChromaMode::DC => {
                predict_dcpred(&mut uws, 8, stride, mby != 0, mbx != 0);
                predict_dcpred(&mut vws, 8, stride, mby != 0, mbx != 0);
            }
            ChromaMode::V => {
                predict_vpred(&mut uws, 8, 1, 1, stride);
                predict_vpred(&mut vws, 8, 1, 1, stride);
            }
            ChromaMode::H => {
                predict_hpred(&mut uws, 8, 1, 1, stride);
                predict_hpred(&mut vws, 8, 1, 1, stride);
            }
            ChromaMode::TM => {
                predict_tmpred(&mut uws, 8, 1, 1, stride);
                predict_tmpred(&mut vws, 8, 1, 1, stride);
            }
        }

        for y in 0usize..2 {
            for x in 0usize..2 {
                let i = x + y * 2;
                let y0 = 1 + y * 4;
                let x0 = 1 + x * 4;

                let urb: &mut [i32; 16] = (&mut self.coeff_blocks[(16 + i) * 16..][..16])
                    .try_into()
                    .unwrap();
                idct_add_residue_and_clear(&mut uws, urb, y0, x0, stride);

                let vrb: &mut [i32; 16] = (&mut self.coeff_blocks[(20 + i) * 16..][..16])
                    .try_into()
                    .unwrap();
                idct_add_residue_and_clear(&mut vws, vrb, y0, x0, stride);
            }
        }

        set_chroma_border(&mut self.left_border_u, &mut self.top_border_u, &uws, mbx);
        set_chroma_border(&mut self.left_border_v, &mut self.top_border_v, &vws, mbx);

        let chroma_stride = usize::from(self.mbwidth) * 8;
        for y in 0usize..8 {
            let dst = (mby * 8 + y) * chroma_stride + mbx * 8;
            let src = (1 + y) * stride + 1;
            self.frame.ubuf[dst..][..8].copy_from_slice(&uws[src..][..8]);
            self.frame.vbuf[dst..][..8].copy_from_slice(&vws[src..][..8]);
        }
    }

    /// Filter level, interior limit and hev threshold for one macroblock
    /// (sections 15.1 and 15.2).
    fn calculate_filter_parameters(&self, macroblock: &MacroBlock) -> (u8, u8, u8) {
        let segment = &self.segment[macroblock.segmentid as usize];
        let mut filter_level = i32::from(self.frame.filter_level);

        if filter_level == 0 {
            return (0, 0, 0);
        }

        if self.segments_enabled {
            if segment.delta_values {
                filter_level += i32::from(segment.loopfilter_level);
            } else {
                filter_level = i32::from(segment.loopfilter_level);
            }
        }

        filter_level = filter_level.clamp(0, 63);

        if self.loop_filter_adjustments_enabled {
            // Intra frames always use reference slot 0.
            filter_level += self.ref_delta[0];
            if macroblock.luma_mode == LumaMode::B {
                filter_level += self.mode_delta[0];
            }
        }

        let filter_level = filter_level.clamp(0, 63) as u8;

        let mut interior_limit = filter_level;
        if self.frame.sharpness_level > 0 {
            interior_limit >>= if self.frame.sharpness_level > 4 { 2 } else { 1 };
            if interior_limit > 9 - self.frame.sharpness_level {
                interior_limit = 9 - self.frame.sharpness_level;
            }
        }
        if interior_limit == 0 {
            interior_limit = 1;
        }

        let hev_threshold = if self.frame.keyframe {
            match filter_level {
                40.. => 2,
                15.. => 1,
                _ => 0,
            }
        } else {
            match filter_level {
                40.. => 3,
                20.. => 2,
                15.. => 1,
                _ => 0,
            }
        };

        (filter_level, interior_limit, hev_threshold)
    }

    /// Apply the loop filter to one macroblock. Edge order: left
    /// macroblock edge, interior vertical edges, top macroblock edge,
    /// interior horizontal edges.
    fn filter_macroblock(&mut self, mbx: usize, mby: usize, mb: &MacroBlock) {
        let (filter_level, interior_limit, hev_threshold) = self.calculate_filter_parameters(mb);
        if filter_level == 0 {
            return;
        }

        let luma_stride = usize::from(self.mbwidth) * 16;
        let chroma_stride = usize::from(self.mbwidth) * 8;

        let mbedge_limit = (filter_level + 2) * 2 + interior_limit;
        let sub_bedge_limit = filter_level * 2 + interior_limit;

        // Interior edges are skipped when the macroblock decoded no
        // coefficients at all and is not subblock-predicted.
        let filter_interior =
            mb.luma_mode == LumaMode::B || (!mb.coeffs_skipped && mb.non_zero_dct);

        if self.frame.filter_type {
            // Simple filter: luma only.
            if mbx > 0 {
                for y in 0..16 {
                    let point = (mby * 16 + y) * luma_stride + mbx * 16;
                    loop_filter::simple_segment(mbedge_limit, &mut self.frame.ybuf, point, 1);
                }
            }
            if filter_interior {
                for x in (4usize..16).step_by(4) {
                    for y in 0..16 {
                        let point = (mby * 16 + y) * luma_stride + mbx * 16 + x;
                        loop_filter::simple_segment(
                            sub_bedge_limit,
                            &mut self.frame.ybuf,
                            point,
                            1,
                        );
                    }
                }
            }
            if mby > 0 {
                for x in 0..16 {
                    let point = mby * 16 * luma_stride + mbx * 16 + x;
                    loop_filter::simple_segment(
                        mbedge_limit,
                        &mut self.frame.ybuf,
                        point,
                        luma_stride,
                    );
                }
            }
            if filter_interior {
                for y in (4usize..16).step_by(4) {
                    for x in 0..16 {
                        let point = (mby * 16 + y) * luma_stride + mbx * 16 + x;
                        loop_filter::simple_segment(
                            sub_bedge_limit,
                            &mut self.frame.ybuf,
                            point,
                            luma_stride,
                        );
                    }
                }
            }
            return;
        }

        // Normal filter: luma and chroma.
        if mbx > 0 {
            for y in 0..16 {
                let point = (mby * 16 + y) * luma_stride + mbx * 16;
                loop_filter::macroblock_filter(
                    hev_threshold,
                    interior_limit,
                    mbedge_limit,
                    &mut self.frame.ybuf,
                    point,
                    1,
                );
            }
            for y in 0..8 {
                let point = (mby * 8 + y) * chroma_stride + mbx * 8;
                loop_filter::macroblock_filter(
                    hev_threshold,
                    interior_limit,
                    mbedge_limit,
                    &mut self.frame.ubuf,
                    point,
                    1,
                );
                loop_filter::macroblock_filter(
                    hev_threshold,
                    interior_limit,
                    mbedge_limit,
                    &mut self.frame.vbuf,
                    point,
                    1,
                );
            }
        }

        if filter_interior {
            for x in (4usize..16).step_by(4) {
                for y in 0..16 {
                    let point = (mby * 16 + y) * luma_stride + mbx * 16 + x;
                    loop_filter::subblock_filter(
                        hev_threshold,
                        interior_limit,
                        sub_bedge_limit,
                        &mut self.frame.ybuf,
                        point,
                        1,
                    );
                }
            }
            // Chroma has a single interior vertical edge at x = 4.
            for y in 0..8 {
                let point = (mby * 8 + y) * chroma_stride + mbx * 8 + 4;
                loop_filter::subblock_filter(
                    hev_threshold,
                    interior_limit,
                    sub_bedge_limit,
                    &mut self.frame.ubuf,
                    point,
                    1,
                );
                loop_filter::subblock_filter(
                    hev_threshold,
                    interior_limit,
                    sub_bedge_limit,
                    &mut self.frame.vbuf,
                    point,
                    1,
                );
            }
        }

        if mby > 0 {
            for x in 0..16 {
                let point = mby * 16 * luma_stride + mbx * 16 + x;
                loop_filter::macroblock_filter(
                    hev_threshold,
                    interior_limit,
                    mbedge_limit,
                    &mut self.frame.ybuf,
                    point,
                    luma_stride,
                );
            }
            for x in 0..8 {
                let point = mby * 8 * chroma_stride + mbx * 8 + x;
                loop_filter::macroblock_filter(
                    hev_threshold,
                    interior_limit,
                    mbedge_limit,
                    &mut self.frame.ubuf,
                    point,
                    chroma_stride,
                );
                loop_filter::macroblock_filter(
                    hev_threshold,
                    interior_limit,
                    mbedge_limit,
                    &mut self.frame.vbuf,
                    point,
                    chroma_stride,
                );
            }
        }

        if filter_interior {
            for y in (4usize..16).step_by(4) {
                for x in 0..16 {
                    let point = (mby * 16 + y) * luma_stride + mbx * 16 + x;
                    loop_filter::subblock_filter(
                        hev_threshold,
                        interior_limit,
                        sub_bedge_limit,
                        &mut self.frame.ybuf,
                        point,
                        luma_stride,
                    );
                }
            }
            // Chroma has a single interior horizontal edge at y = 4.
            for x in 0..8 {
                let point = (mby * 8 + 4) * chroma_stride + mbx * 8 + x;
                loop_filter::subblock_filter(
                    hev_threshold,
                    interior_limit,
                    sub_bedge_limit,
                    &mut self.frame.ubuf,
                    point,
                    chroma_stride,
                );
                loop_filter::subblock_filter(
                    hev_threshold,
                    interior_limit,
                    sub_bedge_limit,
                    &mut self.frame.vbuf,
                    point,
                    chroma_stride,
                );
            }
        }
    }

    /// Second phase: filter every macroblock in raster order.
    fn filter_frame(&mut self) -> Result<(), DecodingError> {
        if self.frame.filter_level == 0 {
            return Ok(());
        }

        for mby in 0..usize::from(self.mbheight) {
            for mbx in 0..usize::from(self.mbwidth) {
                let mb = self.macroblocks[mby * usize::from(self.mbwidth) + mbx];
                self.filter_macroblock(mbx, mby, &mb);
            }

            if let Some(stop) = self.stop {
                stop.check()?;
            }
        }

        Ok(())
    }

    fn decode_frame_(mut self) -> Result<Frame, DecodingError> {
        self.read_frame_header()?;

        for mby in 0..usize::from(self.mbheight) {
            let p = mby % usize::from(self.num_partitions);
            self.left = NeighborContext::default();

            for mbx in 0..usize::from(self.mbwidth) {
                let mut mb = self.read_macroblock_header(mbx)?;

                if !mb.coeffs_skipped {
                    self.read_residual_data(&mut mb, mbx, p)?;
                } else {
                    // coeff_blocks is already all zero. A skipped
                    // macroblock resets its neighbor contexts, except
                    // the Y2 context of B_PRED blocks, which passes
                    // through untouched.
                    if mb.luma_mode != LumaMode::B {
                        self.left.complexity[0] = 0;
                        self.top[mbx].complexity[0] = 0;
                    }
                    for i in 1usize..9 {
                        self.left.complexity[i] = 0;
                        self.top[mbx].complexity[i] = 0;
                    }
                }

                self.intra_predict_luma(mbx, mby, &mb);
                self.intra_predict_chroma(mbx, mby, &mb);

                self.macroblocks.push(mb);
            }

            self.left_border_y.fill(129u8);
            self.left_border_u.fill(129u8);
            self.left_border_v.fill(129u8);

            if let Some(stop) = self.stop {
                stop.check()?;
            }
        }

        self.filter_frame()?;

        log::debug!("vp8 keyframe decoded: {} macroblocks", self.macroblocks.len());

        Ok(self.frame)
    }
}

/// Roll one chroma plane's borders after reconstructing a macroblock.
fn set_chroma_border(left_border: &mut [u8], top_border: &mut [u8], ws: &[u8], mbx: usize) {
    let stride = CHROMA_STRIDE;

    // The next macroblock's corner is this one's above-row pixel at x = 8.
    left_border[0] = ws[8];
    for (i, left) in left_border[1..][..8].iter_mut().enumerate() {
        *left = ws[(i + 1) * stride + 8];
    }

    top_border[mbx * 8..][..8].copy_from_slice(&ws[8 * stride + 1..][..8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantizer_table_lookup_at_origin() {
        // Index 0 of the DC table is the known constant 4.
        assert_eq!(dc_quant(0), 4);
        assert_eq!(ac_quant(0), 4);
        // Out-of-range indices clamp into the table.
        assert_eq!(dc_quant(-3), 4);
        assert_eq!(dc_quant(500), DC_QUANT[127]);
        assert_eq!(ac_quant(127), 284);
    }

    #[test]
    fn segment_quant_derivation() {
        // Parsing an all-zero header leaves every factor at index 0 and
        // applies the Y2 special cases: DC doubled, AC floored at 8.
        let data = zero_keyframe(16, 16);
        let mut dec = Vp8Decoder::new(&data);
        dec.read_frame_header().unwrap();
        let seg = dec.segment[0];
        assert_eq!(seg.ydc, 4);
        assert_eq!(seg.yac, 4);
        assert_eq!(seg.y2dc, 8);
        assert_eq!(seg.y2ac, 8, "155% of 4 is 6, floored to 8");
        assert_eq!(seg.uvdc, 4);
        assert_eq!(seg.uvac, 4);
    }

    #[test]
    fn eob_only_block_is_all_zero() {
        let mut parts = Partitions::new();
        parts.init(vec![0u8; 16], &[(0, 16)]);
        let mut reader = parts.reader(0);

        let mut probs = [[[TreeNode::UNINIT; 11]; 3]; 17];
        for (pos, row) in probs.iter_mut().enumerate() {
            let band = if pos < 16 { COEFF_BANDS[pos] as usize } else { 7 };
            *row = COEFF_PROB_NODES[0][band];
        }

        let mut output = [0i32; 16];
        // All-zero input decodes the end-of-block branch immediately.
        let n = read_coefficients(&mut reader, &mut output, &probs, 0, 0, 4, 4).unwrap();
        assert!(!n, "no tokens may be reported");
        assert_eq!(output, [0i32; 16]);
    }

    /// Builds a minimal key frame: all-zero partition 0 (B_PRED luma
    /// with all-DC submodes, DC chroma, filter disabled) and an all-zero
    /// residual partition (every block is an immediate end-of-block).
    pub(crate) fn zero_keyframe(width: u16, height: u16) -> Vec<u8> {
        let part0_len: u32 = 192;
        let tag: u32 = part0_len << 5; // keyframe bit 0, version 0
        let mut data = vec![tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
        data.extend_from_slice(&[0x9d, 0x01, 0x2a]);
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&vec![0u8; part0_len as usize]);
        // Residual partition.
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    #[test]
    fn zero_keyframe_decodes_to_known_planes() {
        let data = zero_keyframe(16, 16);
        let frame = Vp8Decoder::decode_frame(&data).unwrap();

        assert_eq!(frame.width, 16);
        assert_eq!(frame.height, 16);

        // All-zero mode bits put the single macroblock in B_PRED with
        // every submode DC. Each 4x4 cell becomes the rounded mean of
        // its boundary pixels; with the synthetic borders (127 above,
        // 129 left) the top subblock row lands on 128 and the rest on
        // 129.
        for y in 0..16 {
            let expected = if y < 4 { 128 } else { 129 };
            assert_eq!(frame.y_row(y), &[expected; 16][..], "luma row {y}");
        }

        // Chroma DC prediction with no neighbors in frame is flat 128.
        for y in 0..8 {
            assert_eq!(frame.u_row(y), &[128u8; 8][..], "u row {y}");
            assert_eq!(frame.v_row(y), &[128u8; 8][..], "v row {y}");
        }
    }

    #[test]
    fn wider_zero_keyframe_rows_match_dc_recurrence() {
        // Two macroblock columns: the same DC recurrence continues
        // across the macroblock boundary via the rolled borders.
        let data = zero_keyframe(32, 16);
        let frame = Vp8Decoder::decode_frame(&data).unwrap();

        // Cell value v[r][c] = (4 + 4*above + 4*left) >> 3 over the 8x4
        // grid of 4x4 cells, above = 127 off the top, left = 129 off the
        // left edge.
        let mut cells = [[0u32; 8]; 4];
        for r in 0..4 {
            for c in 0..8 {
                let above = if r == 0 { 127 } else { cells[r - 1][c] };
                let left = if c == 0 { 129 } else { cells[r][c - 1] };
                cells[r][c] = (4 + 4 * above + 4 * left) >> 3;
            }
        }

        for y in 0..16 {
            for x in 0..32 {
                assert_eq!(
                    u32::from(frame.y_row(y)[x]),
                    cells[y / 4][x / 4],
                    "pixel ({x}, {y})"
                );
            }
        }
    }

    #[test]
    fn simple_filter_touches_only_macroblock_edge_pixels() {
        // Two macroblocks side by side, left plane 120 and right 136,
        // simple filter at level 20. The only active edge is the
        // vertical macroblock boundary (no coefficients decoded, so
        // interior passes are skipped; row 0 has no top neighbor), and
        // the 4-tap adjustment moves exactly one pixel on each side.
        let mut dec = Vp8Decoder::new(&[]);
        dec.mbwidth = 2;
        dec.mbheight = 1;
        dec.frame.width = 32;
        dec.frame.height = 16;
        dec.frame.keyframe = true;
        dec.frame.filter_type = true;
        dec.frame.filter_level = 20;
        dec.frame.sharpness_level = 0;
        dec.macroblocks = vec![MacroBlock::default(); 2];

        dec.frame.ybuf = vec![0u8; 32 * 16];
        for y in 0..16 {
            dec.frame.ybuf[y * 32..][..16].fill(120);
            dec.frame.ybuf[y * 32 + 16..][..16].fill(136);
        }
        dec.frame.ubuf = vec![128u8; 16 * 8];
        dec.frame.vbuf = vec![128u8; 16 * 8];

        dec.filter_frame().unwrap();

        for y in 0..16 {
            let row = &dec.frame.ybuf[y * 32..][..32];
            assert!(row[..15].iter().all(|&p| p == 120), "row {y} left interior");
            assert_eq!(row[15], 124, "row {y} p0");
            assert_eq!(row[16], 132, "row {y} q0");
            assert!(row[17..].iter().all(|&p| p == 136), "row {y} right interior");
        }

        // The simple filter never touches chroma.
        assert!(dec.frame.ubuf.iter().all(|&p| p == 128));
        assert!(dec.frame.vbuf.iter().all(|&p| p == 128));
    }

    #[test]
    fn interframe_is_rejected() {
        let mut data = zero_keyframe(16, 16);
        data[0] |= 1;
        assert!(matches!(
            Vp8Decoder::decode_frame(&data),
            Err(DecodingError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = zero_keyframe(16, 16);
        data[3] = 0x9c;
        assert!(matches!(
            Vp8Decoder::decode_frame(&data),
            Err(DecodingError::Vp8MagicInvalid(_))
        ));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let data = zero_keyframe(16, 16);
        assert!(Vp8Decoder::decode_frame(&data[..8]).is_err());
    }
}
