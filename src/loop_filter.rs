//! In-loop deblocking kernels (RFC 6386 section 15).
//!
//! Every kernel operates on an 8-pixel segment `p3 p2 p1 p0 | q0 q1 q2 q3`
//! straddling an edge. `point` indexes `q0` and `stride` is the step
//! across the edge: 1 when filtering a vertical edge, the plane stride
//! when filtering a horizontal edge. Filter math runs in the signed
//! domain (pixel - 128) with saturation to [-128, 127] at every step.

#[inline]
fn c(val: i32) -> i32 {
    val.clamp(-128, 127)
}

/// Pixel value to signed 8-bit domain.
#[inline]
fn u2s(val: u8) -> i32 {
    i32::from(val) - 128
}

/// Signed domain back to a pixel value, saturating.
#[inline]
fn s2u(val: i32) -> u8 {
    (c(val) + 128) as u8
}

/// The 4-tap adjustment shared by every filter variant: moves `p0` and
/// `q0` toward each other by roughly 1/4 (outer taps) or 5/8 (inner only)
/// of the edge difference. Returns the applied `a` for the subblock
/// filter's outer-pixel step.
fn common_adjust(use_outer_taps: bool, pixels: &mut [u8], point: usize, stride: usize) -> i32 {
    let p1 = u2s(pixels[point - 2 * stride]);
    let p0 = u2s(pixels[point - stride]);
    let q0 = u2s(pixels[point]);
    let q1 = u2s(pixels[point + stride]);

    let mut a = c((if use_outer_taps { c(p1 - q1) } else { 0 }) + 3 * (q0 - p0));

    // b balances the rounding of a/8 when the fractional part is exactly
    // one half.
    let b = c(a + 3) >> 3;
    a = c(a + 4) >> 3;

    pixels[point] = s2u(q0 - a);
    pixels[point - stride] = s2u(p0 + b);

    a
}

/// The simple filter's edge test, inclusive at the limit.
#[inline]
fn simple_threshold(edge_limit: i32, pixels: &[u8], point: usize, stride: usize) -> bool {
    let p1 = i32::from(pixels[point - 2 * stride]);
    let p0 = i32::from(pixels[point - stride]);
    let q0 = i32::from(pixels[point]);
    let q1 = i32::from(pixels[point + stride]);

    (p0 - q0).abs() * 2 + (p1 - q1).abs() / 2 <= edge_limit
}

/// Filtering is disabled when any adjacent interior difference exceeds
/// the interior limit, or the edge-straddling group fails the simple
/// threshold.
fn should_filter(
    interior_limit: i32,
    edge_limit: i32,
    pixels: &[u8],
    point: usize,
    stride: usize,
) -> bool {
    let p3 = i32::from(pixels[point - 4 * stride]);
    let p2 = i32::from(pixels[point - 3 * stride]);
    let p1 = i32::from(pixels[point - 2 * stride]);
    let p0 = i32::from(pixels[point - stride]);
    let q0 = i32::from(pixels[point]);
    let q1 = i32::from(pixels[point + stride]);
    let q2 = i32::from(pixels[point + 2 * stride]);
    let q3 = i32::from(pixels[point + 3 * stride]);

    (p0 - q0).abs() * 2 + (p1 - q1).abs() / 2 <= edge_limit
        && (p3 - p2).abs() <= interior_limit
        && (p2 - p1).abs() <= interior_limit
        && (p1 - p0).abs() <= interior_limit
        && (q1 - q0).abs() <= interior_limit
        && (q2 - q1).abs() <= interior_limit
        && (q3 - q2).abs() <= interior_limit
}

/// High edge variance: a difference adjacent to the edge exceeds the
/// threshold, so the wide taps would smear a real feature.
fn high_edge_variance(threshold: i32, pixels: &[u8], point: usize, stride: usize) -> bool {
    let p1 = i32::from(pixels[point - 2 * stride]);
    let p0 = i32::from(pixels[point - stride]);
    let q0 = i32::from(pixels[point]);
    let q1 = i32::from(pixels[point + stride]);

    (p1 - p0).abs() > threshold || (q1 - q0).abs() > threshold
}

/// Simple-filter segment: 4-tap adjustment gated only by the edge test.
pub(crate) fn simple_segment(edge_limit: u8, pixels: &mut [u8], point: usize, stride: usize) {
    if simple_threshold(i32::from(edge_limit), pixels, point, stride) {
        common_adjust(true, pixels, point, stride);
    }
}

/// Normal-filter kernel for subblock-interior edges: the common 4-tap
/// adjustment, plus a half-strength touch on `p1`/`q1` when edge variance
/// is low.
pub(crate) fn subblock_filter(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    if should_filter(
        i32::from(interior_limit),
        i32::from(edge_limit),
        pixels,
        point,
        stride,
    ) {
        let hv = high_edge_variance(i32::from(hev_threshold), pixels, point, stride);
        let a = (common_adjust(hv, pixels, point, stride) + 1) >> 1;
        if !hv {
            pixels[point + stride] = s2u(u2s(pixels[point + stride]) - a);
            pixels[point - 2 * stride] = s2u(u2s(pixels[point - 2 * stride]) + a);
        }
    }
}

/// Normal-filter kernel for macroblock edges: a 6-tap filter over
/// `p2..q2` when edge variance is low, falling back to the 4-tap common
/// adjustment when high.
pub(crate) fn macroblock_filter(
    hev_threshold: u8,
    interior_limit: u8,
    edge_limit: u8,
    pixels: &mut [u8],
    point: usize,
    stride: usize,
) {
    if should_filter(
        i32::from(interior_limit),
        i32::from(edge_limit),
        pixels,
        point,
        stride,
    ) {
        if !high_edge_variance(i32::from(hev_threshold), pixels, point, stride) {
            let p2 = u2s(pixels[point - 3 * stride]);
            let p1 = u2s(pixels[point - 2 * stride]);
            let p0 = u2s(pixels[point - stride]);
            let q0 = u2s(pixels[point]);
            let q1 = u2s(pixels[point + stride]);
            let q2 = u2s(pixels[point + 2 * stride]);

            // w is about twice the edge difference; the taps apply
            // roughly 3/7, 2/7 and 1/7 of it moving outward.
            let w = c(c(p1 - q1) + 3 * (q0 - p0));

            let mut a = (27 * w + 63) >> 7;
            pixels[point] = s2u(q0 - a);
            pixels[point - stride] = s2u(p0 + a);

            a = (18 * w + 63) >> 7;
            pixels[point + stride] = s2u(q1 - a);
            pixels[point - 2 * stride] = s2u(p1 + a);

            a = (9 * w + 63) >> 7;
            pixels[point + 2 * stride] = s2u(q2 - a);
            pixels[point - 3 * stride] = s2u(p2 + a);
        } else {
            common_adjust(true, pixels, point, stride);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // p3 p2 p1 p0 q0 q1 q2 q3 with a 10-step edge between p0 and q0:
    // 2*|p0-q0| + |p1-q1|/2 = 20.
    const SEGMENT: [u8; 8] = [100, 100, 105, 100, 110, 105, 110, 110];

    #[test]
    fn simple_filter_applies_at_limit() {
        // The edge test is inclusive: exactly the limit still filters.
        let mut pixels = SEGMENT;
        simple_segment(20, &mut pixels, 4, 1);
        // a = clamp(0 + 3*(110-100)) = 30, so p0 += (30+3)>>3, q0 -= (30+4)>>3.
        assert_eq!(pixels[3], 104);
        assert_eq!(pixels[4], 106);
        // Outer pixels untouched by the simple filter.
        assert_eq!(pixels[2], 105);
        assert_eq!(pixels[5], 105);
    }

    #[test]
    fn simple_filter_skips_past_limit() {
        let mut pixels = SEGMENT;
        simple_segment(19, &mut pixels, 4, 1);
        assert_eq!(pixels, SEGMENT);
    }

    #[test]
    fn simple_filter_on_flat_segment_is_identity() {
        let mut pixels = [128u8; 8];
        simple_segment(255, &mut pixels, 4, 1);
        assert_eq!(pixels, [128u8; 8]);
    }

    #[test]
    fn subblock_filter_touches_outer_pixels_without_hev() {
        let mut pixels = SEGMENT;
        subblock_filter(60, 10, 40, &mut pixels, 4, 1);
        // hev threshold far above the differences: p1/q1 receive the
        // half-strength adjustment.
        assert_ne!(pixels[2], SEGMENT[2]);
        assert_ne!(pixels[5], SEGMENT[5]);
    }

    #[test]
    fn subblock_filter_respects_interior_limit() {
        // Interior difference |p1-p0| = 5 above a limit of 4 disables
        // the filter entirely.
        let mut pixels = SEGMENT;
        subblock_filter(0, 4, 255, &mut pixels, 4, 1);
        assert_eq!(pixels, SEGMENT);
    }

    #[test]
    fn macroblock_filter_widens_to_p2_q2() {
        let mut pixels = SEGMENT;
        macroblock_filter(60, 10, 40, &mut pixels, 4, 1);
        // Low variance path: six pixels move.
        assert_ne!(pixels[1], SEGMENT[1]);
        assert_ne!(pixels[6], SEGMENT[6]);
        // p3/q3 are read but never written.
        assert_eq!(pixels[0], SEGMENT[0]);
        assert_eq!(pixels[7], SEGMENT[7]);
    }

    #[test]
    fn macroblock_filter_falls_back_on_hev() {
        let mut pixels = SEGMENT;
        macroblock_filter(1, 10, 40, &mut pixels, 4, 1);
        // |p1-p0| = 5 > 1 triggers high edge variance: only the 4-tap
        // adjustment runs, leaving p2/q2 alone.
        assert_eq!(pixels[1], SEGMENT[1]);
        assert_eq!(pixels[6], SEGMENT[6]);
        assert_eq!(pixels[3], 104);
        assert_eq!(pixels[4], 106);
    }

    #[test]
    fn vertical_stride_matches_horizontal() {
        // The same segment laid out down a column must produce the same
        // result via the stride parameter.
        let mut row = SEGMENT;
        simple_segment(20, &mut row, 4, 1);

        let stride = 5;
        let mut col = [0u8; 8 * 5];
        for (i, &p) in SEGMENT.iter().enumerate() {
            col[i * stride] = p;
        }
        simple_segment(20, &mut col, 4 * stride, stride);
        for (i, &expected) in row.iter().enumerate() {
            assert_eq!(col[i * stride], expected, "pixel {i}");
        }
    }
}
