//! The interface to an external H.264 decoding engine.
//!
//! The engine owns bitstream parsing and reconstruction. We only feed it access units and
//! poll for pictures, either rendered straight into a host buffer or returned as planar memory.

use crate::{HostHandle, Result};

/// Where decoded pictures end up. Fixed for the life of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
	/// Pictures are rendered by the host into a device buffer; nothing is copied.
	Host,
	/// Pictures are returned in engine memory and copied into a mapped buffer.
	Guest,
}

/// The destination for the next retrieved picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
	/// Render into this device buffer.
	Host(HostHandle),
	/// Return the pixels in engine memory.
	Guest,
}

impl Target {
	pub fn mode(&self) -> Mode {
		match self {
			Self::Host(_) => Mode::Host,
			Self::Guest => Mode::Guest,
		}
	}
}

/// The pixels of a decoded picture.
#[derive(Debug, Clone, Copy)]
pub enum Pixels<'a> {
	/// Already resident in the target device buffer.
	Host,
	/// Tightly packed I420, owned by the engine until the next retrieval.
	Planar(&'a [u8]),
}

/// A decoded picture, borrowed from the context that produced it.
#[derive(Debug, Clone, Copy)]
pub struct Picture<'a> {
	/// The marker passed with the access unit that produced this picture.
	pub marker: u64,
	pub width: u32,
	pub height: u32,
	pub pixels: Pixels<'a>,
}

/// A factory for decoding contexts.
pub trait Engine {
	type Context: Context;

	/// Create a context for pictures of `width`x`height`, delivered according to `mode`.
	fn create(&mut self, width: u32, height: u32, mode: Mode) -> Result<Self::Context>;
}

/// A decoding context, bound to a size and a [Mode].
pub trait Context {
	/// Submit bitstream, returning how many bytes were consumed.
	///
	/// The `marker` is returned with every picture this input produces.
	fn decode(&mut self, data: &[u8], marker: u64) -> Result<usize>;

	/// Return the next decoded picture, if one is ready.
	///
	/// Any context can return pictures in engine memory; only host contexts render into a host buffer.
	fn retrieve(&mut self, target: Target) -> Option<Picture<'_>>;

	/// Signal the end of input so buffered reference pictures are released.
	fn flush(&mut self);

	/// Release all engine resources. Called at most once.
	fn destroy(&mut self);
}
