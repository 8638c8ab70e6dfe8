//! Criterion benchmarks for key-frame decoding throughput.
//!
//! Run with: cargo bench --bench decode_bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

/// Synthetic all-zero key frame (B_PRED/DC everywhere, empty residuals).
fn zero_keyframe(width: u16, height: u16) -> Vec<u8> {
    let part0_len: u32 = 16384;
    let tag: u32 = part0_len << 5;
    let mut data = vec![tag as u8, (tag >> 8) as u8, (tag >> 16) as u8];
    data.extend_from_slice(&[0x9d, 0x01, 0x2a]);
    data.extend_from_slice(&width.to_le_bytes());
    data.extend_from_slice(&height.to_le_bytes());
    data.extend_from_slice(&vec![0u8; part0_len as usize]);
    data.extend_from_slice(&vec![0u8; 65536]);
    data
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_keyframe");

    for (w, h) in [(64u16, 64u16), (256, 256), (1024, 1024)] {
        let data = zero_keyframe(w, h);
        group.throughput(Throughput::Elements(u64::from(w) * u64::from(h)));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{w}x{h}")),
            &data,
            |b, data| {
                b.iter(|| vp8frame::decode_frame(black_box(data)).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
