use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::{Error, Flags, GraphicBuffer, Result, Work};

/// Tracks work items between submission and completion.
///
/// A work item whose picture has not surfaced yet is parked by frame index. When the engine
/// later returns a picture carrying that index, the parked item is completed and queued.
/// Completed items are handed back to the caller in the order they completed.
#[derive(Debug, Default)]
pub struct Pending {
	parked: BTreeMap<u64, Work>,
	done: VecDeque<Work>,

	// The frame index of the last picture delivered.
	last_output: Option<u64>,
}

impl Pending {
	pub fn new() -> Self {
		Self::default()
	}

	/// Hold an incomplete work item until its picture surfaces.
	pub fn park(&mut self, work: Work) {
		let index = work.frame_index();
		tracing::trace!(index, "parking work");

		if let Some(mut previous) = self.parked.insert(index, work) {
			// Two items claiming one index: complete the older one empty instead of losing it.
			tracing::warn!(index, "duplicate frame index");
			previous.fill_empty();
			self.done.push_back(previous);
		}
	}

	/// Queue a completed work item.
	pub fn emit(&mut self, work: Work) {
		if work.picture().is_some() {
			self.delivered(work.frame_index());
		}
		self.done.push_back(work);
	}

	/// Complete the parked item with `index` using `buffer`.
	///
	/// A picture with no matching work item is an error; it is never silently dropped.
	pub fn finish(&mut self, index: u64, buffer: Arc<GraphicBuffer>) -> Result<()> {
		let Some(mut work) = self.parked.remove(&index) else {
			tracing::error!(index, parked = ?self.parked.keys().collect::<Vec<_>>(), "picture for unknown work");
			return Err(Error::UnknownFrame(index));
		};

		work.fill(buffer);
		self.emit(work);

		Ok(())
	}

	/// Queue a completed copy of `work`, leaving the original to be completed later.
	pub fn clone_and_send(&mut self, work: &Work, flags: Flags, buffer: Arc<GraphicBuffer>) {
		let index = work.frame_index();
		tracing::trace!(index, ?flags, "sending cloned completion");

		self.delivered(index);
		self.done.push_back(work.clone_filled(flags, buffer));
	}

	fn delivered(&mut self, index: u64) {
		if let Some(last) = self.last_output {
			if index < last {
				tracing::debug!(index, last, "picture delivered out of order");
			}
		}

		self.last_output = Some(self.last_output.map_or(index, |last| last.max(index)));
	}

	/// Every completed work item, in completion order.
	pub fn take_done(&mut self) -> Vec<Work> {
		self.done.drain(..).collect()
	}

	/// Every parked work item, in frame index order.
	pub fn take_parked(&mut self) -> Vec<Work> {
		std::mem::take(&mut self.parked).into_values().collect()
	}

	pub fn is_parked(&self, index: u64) -> bool {
		self.parked.contains_key(&index)
	}

	pub fn parked(&self) -> usize {
		self.parked.len()
	}

	pub fn done(&self) -> usize {
		self.done.len()
	}

	/// The highest frame index delivered with a picture so far.
	pub fn last_output(&self) -> Option<u64> {
		self.last_output
	}

	/// Forget the delivery counter.
	pub fn reset_output(&mut self) {
		self.last_output = None;
	}

	/// Drop everything, completed items included.
	pub fn clear(&mut self) {
		self.parked.clear();
		self.done.clear();
		self.last_output = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Block, ColorAspects, Memory, Rect, Timestamp};

	fn buffer() -> Arc<GraphicBuffer> {
		Arc::new(GraphicBuffer {
			block: Block::new(16, 16, Memory::new(vec![0; 16 * 24], 16)),
			crop: Rect {
				width: 16,
				height: 16,
			},
			color: ColorAspects::default(),
		})
	}

	fn work(index: u64) -> Work {
		Work::new(index, Timestamp::from_micros(index * 33_333), vec![0u8; 8])
	}

	#[test]
	fn test_finish_parked() {
		let mut pending = Pending::new();
		pending.park(work(0));
		pending.park(work(1));
		assert_eq!(pending.parked(), 2);

		pending.finish(1, buffer()).unwrap();
		assert!(pending.is_parked(0));
		assert!(!pending.is_parked(1));
		assert_eq!(pending.last_output(), Some(1));

		let done = pending.take_done();
		assert_eq!(done.len(), 1);
		assert_eq!(done[0].frame_index(), 1);
		assert!(done[0].is_done());
		assert!(done[0].picture().is_some());
		assert_eq!(done[0].output.ordinal, done[0].input.ordinal);
	}

	#[test]
	fn test_finish_unknown() {
		let mut pending = Pending::new();
		pending.park(work(3));

		assert_eq!(pending.finish(4, buffer()), Err(Error::UnknownFrame(4)));
		assert!(pending.is_parked(3));
		assert_eq!(pending.done(), 0);
	}

	#[test]
	fn test_clone_and_send() {
		let mut pending = Pending::new();
		let original = work(7).with_flags(Flags::END_OF_STREAM);

		pending.clone_and_send(&original, Flags::INCOMPLETE, buffer());
		assert!(!original.is_done());

		let done = pending.take_done();
		assert_eq!(done.len(), 1);
		assert_eq!(done[0].output.flags, Flags::INCOMPLETE);
		assert_eq!(done[0].output.ordinal.frame_index, 7);
		assert_eq!(pending.last_output(), Some(7));
	}

	#[test]
	fn test_duplicate_park_keeps_both() {
		let mut pending = Pending::new();
		pending.park(work(2));
		pending.park(work(2));

		assert_eq!(pending.parked(), 1);
		let done = pending.take_done();
		assert_eq!(done.len(), 1);
		assert!(done[0].picture().is_none());
	}

	#[test]
	fn test_take_parked_in_order() {
		let mut pending = Pending::new();
		for index in [5, 1, 3] {
			pending.park(work(index));
		}

		let indexes: Vec<_> = pending.take_parked().iter().map(Work::frame_index).collect();
		assert_eq!(indexes, vec![1, 3, 5]);
		assert_eq!(pending.parked(), 0);
	}

	#[test]
	fn test_last_output_is_monotonic() {
		let mut pending = Pending::new();
		pending.park(work(1));
		pending.park(work(2));

		pending.finish(2, buffer()).unwrap();
		pending.finish(1, buffer()).unwrap();
		assert_eq!(pending.last_output(), Some(2));

		pending.reset_output();
		assert_eq!(pending.last_output(), None);
		assert_eq!(pending.done(), 2);

		pending.clear();
		assert_eq!(pending.done(), 0);
	}
}
