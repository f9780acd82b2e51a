use std::sync::Arc;

use bytes::Bytes;

use crate::output::align;
use crate::{
	BlockPool, Engine, Error, Flags, GraphicBuffer, Interface, Mode, OutputSlot, Pending, Pixels, Rect, Result, Session,
	Status, Target, Work, copy,
};

/// Inputs shorter than this are not worth submitting to the engine.
const MIN_INPUT_BYTES: usize = 4;

/// How far a drain request reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrainMode {
	/// Nothing to do.
	NoDrain,
	/// Drain this component.
	Component,
	/// Drain this component and signal end-of-stream.
	ComponentWithEos,
	/// Drain every component in the chain. Not supported.
	Chain,
}

/// Why the component stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Halt {
	/// A fatal error occurred; only [Component::release] recovers.
	Error,
	/// End-of-stream was processed; a flush or reset recovers.
	Eos,
}

/// An H.264 decoder component driving an external [Engine].
///
/// Work items go in through [Component::process] and come back out through [Component::take_done],
/// in the order they complete. A work item whose picture is held back by the engine is parked
/// until the picture surfaces, or until a flush returns it.
///
/// Calls are not thread safe; the caller serializes them.
pub struct Component<E: Engine> {
	interface: Interface,
	session: Session<E>,
	slot: OutputSlot,
	pending: Pending,
	halt: Option<Halt>,
}

impl<E: Engine> Component<E> {
	pub fn new(engine: E, interface: Interface) -> Self {
		Self {
			interface,
			session: Session::new(engine),
			slot: OutputSlot::new(),
			pending: Pending::new(),
			halt: None,
		}
	}

	pub fn interface(&self) -> &Interface {
		&self.interface
	}

	pub fn session(&self) -> &Session<E> {
		&self.session
	}

	pub fn pending(&self) -> &Pending {
		&self.pending
	}

	pub fn halted(&self) -> Option<Halt> {
		self.halt
	}

	/// Decode one work item.
	///
	/// The work item is always handed back, either through [Self::take_done] or a later flush.
	/// Its `result` carries the status of this call, which is also returned as an error.
	pub fn process<P: BlockPool>(&mut self, mut work: Work, pool: &mut P) -> Result<()> {
		work.result = Status::Ok;
		work.worklets_processed = 0;
		work.output.flags = work.input.flags;

		let index = work.frame_index();

		if let Some(halt) = self.halt {
			tracing::warn!(index, ?halt, "rejecting work while halted");
			return self.reject(work, Error::Halted);
		}

		if let Err(err) = self.open(pool) {
			return self.reject(work, err);
		}

		tracing::trace!(index, size = work.input.data.len(), flags = ?work.input.flags, "processing work");

		let has_picture = match self.decode(&mut work, pool) {
			Ok(has_picture) => has_picture,
			Err(err) => return self.reject(work, err),
		};

		if work.is_eos() {
			tracing::debug!(index, "draining on end-of-stream");
			if let Err(err) = self.drain_internal(pool, Some(&mut work)) {
				return self.reject(work, err);
			}
			self.signal(Halt::Eos);
		} else if !has_picture {
			work.fill_empty();
			work.worklets_processed = 0;
		}

		work.input.data = Bytes::new();

		if work.is_done() {
			self.pending.emit(work);
		} else {
			self.pending.park(work);
		}

		Ok(())
	}

	/// Emit every picture the engine is holding back.
	pub fn drain<P: BlockPool>(&mut self, mode: DrainMode, pool: &mut P) -> Result<()> {
		match mode {
			DrainMode::NoDrain => {
				tracing::warn!("drain without a drain mode is a no-op");
				return Ok(());
			}
			DrainMode::Chain => {
				tracing::warn!("chained drain is not supported");
				return Err(Error::Unsupported);
			}
			DrainMode::Component | DrainMode::ComponentWithEos => {}
		}

		if self.halt == Some(Halt::Error) {
			tracing::warn!(?mode, "rejecting drain after error");
			return Err(Error::Halted);
		}

		if !self.session.is_open() {
			tracing::debug!(?mode, "nothing to drain");
			return Ok(());
		}

		let res = self.drain_internal(pool, None);
		if let Err(err) = &res {
			if err.is_fatal() {
				self.signal(Halt::Error);
			}
		}

		res
	}

	/// Discard every buffered picture and return the work items still waiting on one.
	///
	/// Clears end-of-stream so decoding may resume.
	pub fn flush(&mut self) -> Result<Vec<Work>> {
		if self.session.is_open() {
			self.flush_session()?;
		}

		let flushed = self.pending.take_parked();
		if !flushed.is_empty() {
			tracing::debug!(count = flushed.len(), "returning flushed work");
		}

		Ok(flushed)
	}

	/// Destroy the decoder context and forget in-flight work.
	///
	/// An error stays signalled; see [Self::release].
	pub fn stop(&mut self) {
		tracing::debug!("stopping");

		self.reset_decoder();
		self.reset_plugin();

		let dropped = self.pending.take_parked();
		if !dropped.is_empty() {
			tracing::debug!(count = dropped.len(), "dropping parked work");
		}
	}

	pub fn reset(&mut self) {
		self.stop();
	}

	/// Release every resource and clear all signalled state.
	pub fn release(&mut self) {
		self.session.destroy();
		self.slot.release();
		self.pending.clear();
		self.halt = None;
	}

	/// Every completed work item, in completion order.
	pub fn take_done(&mut self) -> Vec<Work> {
		self.pending.take_done()
	}

	fn signal(&mut self, halt: Halt) {
		match halt {
			Halt::Error => tracing::error!("signalling error"),
			Halt::Eos => tracing::debug!("signalling end-of-stream"),
		}

		// An error outranks end-of-stream.
		if self.halt != Some(Halt::Error) {
			self.halt = Some(halt);
		}
	}

	/// Complete `work` with the status of `err`.
	fn reject(&mut self, mut work: Work, err: Error) -> Result<()> {
		if err.is_fatal() {
			tracing::error!(index = work.frame_index(), %err, "fatal decode error");
			self.signal(Halt::Error);
		} else {
			tracing::warn!(index = work.frame_index(), %err, "work failed");
		}

		work.result = err.status();
		work.worklets_processed = 1;
		self.pending.emit(work);

		Err(err)
	}

	/// Create the decoder context if needed, probing the pool for the output mode first.
	fn open<P: BlockPool>(&mut self, pool: &mut P) -> Result<Mode> {
		if let Some(mode) = self.session.mode() {
			return Ok(mode);
		}

		let (width, height) = self.interface.size();
		let mode = OutputSlot::probe(pool, width, height)?;
		self.session.create(width, height, mode)?;

		Ok(mode)
	}

	/// Feed the work item's input until too little remains, returning true if any picture surfaced.
	fn decode<P: BlockPool>(&mut self, work: &mut Work, pool: &mut P) -> Result<bool> {
		let data = work.input.data.clone();
		let index = work.frame_index();

		let mut has_picture = false;
		let mut pos = 0;

		while data.len() - pos >= MIN_INPUT_BYTES {
			let target = self.ensure(pool)?;
			let consumed = self.session.feed(&data[pos..], index)?;

			if let Some((marker, buffer)) = self.retrieve(target)? {
				has_picture = true;
				self.finish_work(marker, buffer, Some(&mut *work))?;
			}

			pos += consumed;
		}

		Ok(has_picture)
	}

	/// Flush the context and complete a work item for every picture it returns.
	///
	/// The current work item, if any, is then completed empty to terminate the drain.
	fn drain_internal<P: BlockPool>(&mut self, pool: &mut P, mut work: Option<&mut Work>) -> Result<()> {
		self.session.flush();

		loop {
			let target = self.ensure(pool)?;
			match self.retrieve(target)? {
				Some((marker, buffer)) => self.finish_work(marker, buffer, work.as_deref_mut())?,
				None => break,
			}
		}

		if let Some(work) = work {
			work.fill_empty();
		}

		Ok(())
	}

	fn ensure<P: BlockPool>(&mut self, pool: &mut P) -> Result<Target> {
		let mode = self
			.session
			.mode()
			.ok_or_else(|| Error::Engine("no decoder context".into()))?;
		let (width, height) = self.session.size();

		self.slot.ensure(pool, width, height, mode)
	}

	/// Retrieve the next picture into the held output block and wrap it for the caller.
	fn retrieve(&mut self, target: Target) -> Result<Option<(u64, Arc<GraphicBuffer>)>> {
		let (width, height) = self.session.size();

		let Some(picture) = self.session.retrieve(target) else {
			return Ok(None);
		};
		let marker = picture.marker;

		if (picture.width, picture.height) != (width, height) {
			tracing::error!(
				marker,
				expected = ?(width, height),
				actual = ?(picture.width, picture.height),
				"picture size changed without a reset"
			);
			return Err(Error::SizeMismatch {
				expected: (width, height),
				actual: (picture.width, picture.height),
			});
		}

		match picture.pixels {
			Pixels::Planar(src) => {
				let plane = self.slot.plane()?;
				copy::copy_i420(
					plane.data,
					plane.stride,
					src,
					picture.width as usize,
					picture.height as usize,
				)?;
			}
			Pixels::Host => {}
		}

		let block = self.slot.take().ok_or(Error::Map)?;
		let color = self.interface.color_aspects();

		tracing::debug!(marker, ?block, "picture ready");

		let buffer = GraphicBuffer {
			block,
			crop: Rect { width, height },
			color,
		};

		Ok(Some((marker, Arc::new(buffer))))
	}

	/// Attach a picture to the work item that submitted it.
	fn finish_work(&mut self, index: u64, buffer: Arc<GraphicBuffer>, current: Option<&mut Work>) -> Result<()> {
		match current {
			// More pictures may follow an end-of-stream input, so send a copy and keep the original.
			Some(work) if work.frame_index() == index && work.is_eos() => {
				self.pending.clone_and_send(work, Flags::INCOMPLETE, buffer);
				Ok(())
			}
			Some(work) if work.frame_index() == index => {
				work.fill(buffer);
				Ok(())
			}
			_ => self.pending.finish(index, buffer),
		}
	}

	/// Poll the flushed context to exhaustion, discarding every picture into a scratch buffer.
	fn flush_session(&mut self) -> Result<()> {
		let (width, height) = self.session.size();
		let stride = align(width, OutputSlot::ALIGN) as usize;
		let size = stride * height as usize * 3 / 2;

		let mut scratch = Vec::new();
		if scratch.try_reserve_exact(size).is_err() {
			tracing::error!(size, "failed to allocate flush buffer");
			return Err(Error::NoMemory);
		}
		scratch.resize(size, 0u8);

		self.session.flush();

		let mut discarded = 0;
		while let Some(picture) = self.session.retrieve(Target::Guest) {
			if let Pixels::Planar(src) = picture.pixels {
				let res = copy::copy_i420(
					&mut scratch,
					stride,
					src,
					picture.width as usize,
					picture.height as usize,
				);
				if let Err(err) = res {
					tracing::warn!(%err, marker = picture.marker, "failed to copy flushed picture");
				}
			}
			discarded += 1;
		}

		tracing::debug!(discarded, "flushed decoder");
		self.reset_plugin();

		Ok(())
	}

	/// Destroy the context; the next work item recreates it at the current size.
	fn reset_decoder(&mut self) {
		self.session.destroy();
		self.slot.release();
	}

	fn reset_plugin(&mut self) {
		if self.halt == Some(Halt::Eos) {
			self.halt = None;
		}
		self.pending.reset_output();
	}
}

impl<E: Engine> Drop for Component<E> {
	fn drop(&mut self) {
		self.release();
	}
}
