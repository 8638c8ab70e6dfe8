//! End-to-end key-frame decoding tests over synthetic bitstreams.
//!
//! An all-zero coded payload is a valid key frame: every header flag and
//! literal reads as zero (B_PRED luma with all-DC submodes, DC chroma,
//! loop filter disabled) and every residual block is an immediate
//! end-of-block. The resulting planes follow a closed-form DC-prediction
//! recurrence, which makes exact golden assertions possible without
//! shipping binary fixtures.

use vp8frame::{decode_frame, decode_frame_with_limits, decode_frame_with_stop};
use vp8frame::{DecodingError, Limits, Unstoppable};

/// Minimal key frame: frame tag + start code + dimensions, an all-zero
/// first partition and an all-zero residual partition.
fn zero_keyframe(width: u16, height: u16) -> Vec<u8> {
    let part0_len: u32 = 256;
    let tag: u32 = part0_len << 5; // keyframe bit 0, version 0
    let mut data = vec![tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
    data.extend_from_slice(&[0x9d, 0x01, 0x2a]);
    data.extend_from_slice(&width.to_le_bytes());
    data.extend_from_slice(&height.to_le_bytes());
    data.extend_from_slice(&vec![0u8; part0_len as usize]);
    data.extend_from_slice(&vec![0u8; 256]);
    data
}

/// The 4x4-cell DC recurrence for an all-zero frame: each cell is the
/// rounded mean of its 8 boundary pixels, with 127 above the frame and
/// 129 left of it.
fn dc_cells(cell_cols: usize, cell_rows: usize) -> Vec<Vec<u32>> {
    let mut cells = vec![vec![0u32; cell_cols]; cell_rows];
    for r in 0..cell_rows {
        for c in 0..cell_cols {
            let above = if r == 0 { 127 } else { cells[r - 1][c] };
            let left = if c == 0 { 129 } else { cells[r][c - 1] };
            cells[r][c] = (4 + 4 * above + 4 * left) >> 3;
        }
    }
    cells
}

#[test]
fn single_macroblock_golden() {
    let frame = decode_frame(&zero_keyframe(16, 16)).unwrap();

    assert_eq!((frame.width, frame.height), (16, 16));
    assert_eq!(frame.luma_stride(), 16);
    assert_eq!(frame.chroma_stride(), 8);

    for y in 0..16 {
        let expected = if y < 4 { 128u8 } else { 129 };
        assert_eq!(frame.y_row(y), &[expected; 16][..], "luma row {y}");
    }
    for y in 0..8 {
        assert_eq!(frame.u_row(y), &[128u8; 8][..], "u row {y}");
        assert_eq!(frame.v_row(y), &[128u8; 8][..], "v row {y}");
    }
}

#[test]
fn multi_macroblock_golden() {
    // 3x2 macroblocks; the recurrence crosses macroblock boundaries
    // through the rolled border buffers.
    let frame = decode_frame(&zero_keyframe(48, 32)).unwrap();
    let cells = dc_cells(12, 8);

    for y in 0..32 {
        for x in 0..48 {
            assert_eq!(
                u32::from(frame.y_row(y)[x]),
                cells[y / 4][x / 4],
                "pixel ({x}, {y})"
            );
        }
    }
}

#[test]
fn odd_dimensions_round_up_to_macroblocks() {
    // 17x13 needs a 2x1 macroblock grid; visible rows crop the padding.
    let frame = decode_frame(&zero_keyframe(17, 13)).unwrap();
    assert_eq!((frame.width, frame.height), (17, 13));
    assert_eq!(frame.luma_stride(), 32);
    assert_eq!(frame.ybuf.len(), 32 * 16);
    assert_eq!(frame.y_row(0).len(), 17);
    assert_eq!(frame.u_row(0).len(), 9);
}

#[test]
fn decode_with_stop_token_completes() {
    let frame = decode_frame_with_stop(&zero_keyframe(32, 32), &Unstoppable).unwrap();
    assert_eq!(frame.width, 32);
}

#[test]
fn dimension_limits_are_enforced() {
    let err = decode_frame_with_limits(&zero_keyframe(64, 64), Limits::default().max_dimensions(32, 32));
    assert!(matches!(err, Err(DecodingError::InvalidParameter(_))));

    // At the limit still decodes.
    let ok = decode_frame_with_limits(&zero_keyframe(32, 32), Limits::default().max_dimensions(32, 32));
    assert!(ok.is_ok());
}

#[test]
fn interframe_fails_fast() {
    let mut data = zero_keyframe(16, 16);
    data[0] |= 1;
    assert!(matches!(
        decode_frame(&data),
        Err(DecodingError::UnsupportedFeature(_))
    ));
}

#[test]
fn invalid_start_code_is_rejected() {
    let mut data = zero_keyframe(16, 16);
    data[4] = 0x00;
    assert!(matches!(
        decode_frame(&data),
        Err(DecodingError::Vp8MagicInvalid(_))
    ));
}

#[test]
fn truncated_inputs_error_not_panic() {
    let data = zero_keyframe(16, 16);
    for len in 0..24 {
        assert!(decode_frame(&data[..len]).is_err(), "prefix of {len} bytes");
    }
}

#[test]
fn missing_residual_partition_is_corrupt() {
    // Strip the residual partition entirely: header parsing succeeds but
    // the first coefficient read hits a synthesized end-of-input.
    let part0_len: u32 = 256;
    let tag: u32 = part0_len << 5;
    let mut data = vec![tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
    data.extend_from_slice(&[0x9d, 0x01, 0x2a]);
    data.extend_from_slice(&16u16.to_le_bytes());
    data.extend_from_slice(&16u16.to_le_bytes());
    data.extend_from_slice(&vec![0u8; part0_len as usize]);

    assert!(matches!(
        decode_frame(&data),
        Err(DecodingError::BitStreamError)
    ));
}
