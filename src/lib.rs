//! Decoding of VP8 key frames (intra frames only).
//!
//! This crate implements the intra decoding core of the VP8 video format
//! as defined in RFC 6386: the boolean arithmetic entropy decoder,
//! coefficient token decoding, the inverse DCT and Walsh-Hadamard
//! transforms, intra prediction and the in-loop deblocking filter. VP8
//! key frames are the payload of lossy WebP images; locating that
//! payload inside a RIFF container is a caller concern.
//!
//! Output is planar YUV 4:2:0: a full-resolution luma plane and
//! half-resolution U and V planes, each padded to whole macroblocks,
//! with row accessors cropped to the visible size.
//!
//! ```rust,no_run
//! let data: &[u8] = &[]; // raw VP8 frame data
//! let frame = vp8frame::decode_frame(data)?;
//! println!("{}x{}", frame.width, frame.height);
//! # Ok::<(), vp8frame::DecodingError>(())
//! ```
//!
//! Interframes (motion-compensated prediction) and encoding are out of
//! scope; an interframe tag fails fast with
//! [`DecodingError::UnsupportedFeature`].
//!
//! # no_std
//!
//! The crate is no_std-compatible (requires `alloc`); disable the
//! default `std` feature:
//!
//! ```toml
//! [dependencies]
//! vp8frame = { version = "0.1", default-features = false }
//! ```
//!
//! # Related links
//! * [RFC 6386](https://tools.ietf.org/html/rfc6386) - The VP8 Data
//!   Format and Decoding Guide

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

mod api;
mod bit_reader;
mod limits;
mod loop_filter;
mod prediction;
mod slice_reader;
mod tables;
mod transform;
mod vp8;

pub use api::{decode_frame, decode_frame_with_limits, decode_frame_with_stop, DecodingError};
pub use bit_reader::BoolDecoder;
pub use enough::{Never as Unstoppable, Stop, StopReason};
pub use limits::Limits;
pub use tables::{Prob, TreeNode};
pub use vp8::{ChromaMode, Frame, IntraMode, LumaMode, Vp8Decoder};
