//! # avcdec: An H.264 decode component over an external decoding engine
//!
//! The bitstream is decoded by an [Engine], typically backed by a host accelerator.
//! This crate drives it one work item at a time:
//! - **Session**: The engine context, bound to a picture size and an output [Mode].
//! - **Output**: One pooled output block at a time, either rendered by the host or copied into.
//! - **Pending**: Matches every decoded picture back to the work item that submitted it.
//! - **Component**: The state machine tying it together, handling drain, flush, and end-of-stream.
//!
//! The `ffmpeg` feature provides a software engine for decoding on the CPU.
mod color;
mod component;
mod engine;
mod error;
mod output;
mod params;
mod pending;
mod pool;
mod session;
mod timestamp;
mod work;

pub mod annexb;
pub mod copy;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
mod mock;

pub use color::*;
pub use component::*;
pub use engine::*;
pub use error::*;
pub use output::*;
pub use params::*;
pub use pending::*;
pub use pool::*;
pub use session::*;
pub use timestamp::*;
pub use work::*;
