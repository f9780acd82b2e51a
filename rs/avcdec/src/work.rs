//! Work items: one access unit in, zero or more pictures out.

use std::sync::Arc;

use bytes::Bytes;

use crate::{Block, ColorAspects, Status, Timestamp, View};

/// Identifies a work item within the stream.
///
/// The frame index is assigned by the caller and increases monotonically.
/// It doubles as the marker handed to the engine and returned with each picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ordinal {
	pub frame_index: u64,
	pub timestamp: Timestamp,
}

impl Ordinal {
	pub fn new(frame_index: u64, timestamp: Timestamp) -> Self {
		Self { frame_index, timestamp }
	}
}

/// Flags carried on a work item's input or output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
	pub const NONE: Self = Self(0);
	pub const END_OF_STREAM: Self = Self(1 << 1);
	/// More output for the same input will follow.
	pub const INCOMPLETE: Self = Self(1 << 3);
	pub const CODEC_CONFIG: Self = Self(1 << 31);

	pub fn contains(self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn insert(&mut self, other: Self) {
		self.0 |= other.0;
	}

	pub fn bits(self) -> u32 {
		self.0
	}
}

impl std::ops::BitOr for Flags {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self {
		Self(self.0 | rhs.0)
	}
}

impl std::ops::BitAnd for Flags {
	type Output = Self;

	fn bitand(self, rhs: Self) -> Self {
		Self(self.0 & rhs.0)
	}
}

impl std::fmt::Debug for Flags {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut list = f.debug_set();
		if self.contains(Self::END_OF_STREAM) {
			list.entry(&"eos");
		}
		if self.contains(Self::INCOMPLETE) {
			list.entry(&"incomplete");
		}
		if self.contains(Self::CODEC_CONFIG) {
			list.entry(&"config");
		}
		list.finish()
	}
}

/// The visible region of a picture, anchored at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
	pub width: u32,
	pub height: u32,
}

/// A decoded picture handed back to the caller.
#[derive(Debug)]
pub struct GraphicBuffer {
	pub block: Block,
	pub crop: Rect,
	pub color: ColorAspects,
}

impl GraphicBuffer {
	/// Read the picture from the CPU, if the block is CPU visible.
	pub fn view(&self) -> Option<View<'_>> {
		self.block.view()
	}
}

#[derive(Debug, Clone, Default)]
pub struct Input {
	pub ordinal: Ordinal,
	pub flags: Flags,
	pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct Output {
	pub ordinal: Ordinal,
	pub flags: Flags,
	pub buffers: Vec<Arc<GraphicBuffer>>,
}

/// A unit of work: an access unit to decode and the output it produced.
#[derive(Debug, Clone, Default)]
pub struct Work {
	pub input: Input,
	pub output: Output,

	/// Non-zero once the output has been filled in.
	pub worklets_processed: u32,
	pub result: Status,
}

impl Work {
	pub fn new(frame_index: u64, timestamp: Timestamp, data: impl Into<Bytes>) -> Self {
		Self {
			input: Input {
				ordinal: Ordinal::new(frame_index, timestamp),
				flags: Flags::NONE,
				data: data.into(),
			},
			..Default::default()
		}
	}

	/// An empty work item that only signals end-of-stream.
	pub fn eos(frame_index: u64, timestamp: Timestamp) -> Self {
		Self::new(frame_index, timestamp, Bytes::new()).with_flags(Flags::END_OF_STREAM)
	}

	pub fn with_flags(mut self, flags: Flags) -> Self {
		self.input.flags = flags;
		self
	}

	pub fn frame_index(&self) -> u64 {
		self.input.ordinal.frame_index
	}

	pub fn is_eos(&self) -> bool {
		self.input.flags.contains(Flags::END_OF_STREAM)
	}

	pub fn is_done(&self) -> bool {
		self.worklets_processed != 0
	}

	/// The picture attached to the output, if any.
	pub fn picture(&self) -> Option<&GraphicBuffer> {
		self.output.buffers.first().map(Arc::as_ref)
	}

	/// Complete with no picture, carrying only end-of-stream through.
	pub(crate) fn fill_empty(&mut self) {
		self.output.flags = self.input.flags & Flags::END_OF_STREAM;
		self.output.buffers.clear();
		self.output.ordinal = self.input.ordinal;
		self.worklets_processed = 1;
	}

	/// Complete with a picture.
	pub(crate) fn fill(&mut self, buffer: Arc<GraphicBuffer>) {
		self.output.flags = Flags::NONE;
		self.output.buffers.clear();
		self.output.buffers.push(buffer);
		self.output.ordinal = self.input.ordinal;
		self.worklets_processed = 1;
	}

	/// A completed copy of this work item, leaving the original to be completed later.
	pub(crate) fn clone_filled(&self, flags: Flags, buffer: Arc<GraphicBuffer>) -> Self {
		Self {
			input: Input {
				ordinal: self.input.ordinal,
				flags: self.input.flags,
				data: Bytes::new(),
			},
			output: Output {
				ordinal: self.input.ordinal,
				flags,
				buffers: vec![buffer],
			},
			worklets_processed: 1,
			result: Status::Ok,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_flags() {
		let mut flags = Flags::NONE;
		assert!(!flags.contains(Flags::END_OF_STREAM));

		flags.insert(Flags::END_OF_STREAM);
		assert!(flags.contains(Flags::END_OF_STREAM));
		assert!(!flags.contains(Flags::END_OF_STREAM | Flags::INCOMPLETE));
		assert_eq!(flags & Flags::INCOMPLETE, Flags::NONE);
		assert_eq!(format!("{:?}", flags | Flags::INCOMPLETE), r#"{"eos", "incomplete"}"#);
	}

	#[test]
	fn test_fill_empty_keeps_eos() {
		let mut work = Work::eos(9, Timestamp::from_micros(300));
		work.fill_empty();

		assert!(work.is_done());
		assert!(work.output.flags.contains(Flags::END_OF_STREAM));
		assert!(work.output.buffers.is_empty());
		assert_eq!(work.output.ordinal.frame_index, 9);
	}

	#[test]
	fn test_fill_empty_drops_other_flags() {
		let mut work = Work::new(1, Timestamp::ZERO, vec![0u8; 8]).with_flags(Flags::CODEC_CONFIG);
		work.fill_empty();
		assert_eq!(work.output.flags, Flags::NONE);
	}
}
