use std::time::Instant;

use crate::{Context, Engine, Error, Mode, Picture, Result, Target};

/// The lifecycle of a [Session].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
	Uninitialized,
	Configured,
	Decoding,
	Flushing,
	Destroyed,
}

/// Owns the engine's decoding context, bound to one size and one [Mode].
///
/// A different size or mode means destroying the context and creating a new one.
pub struct Session<E: Engine> {
	engine: E,
	context: Option<E::Context>,
	state: State,
	width: u32,
	height: u32,
	mode: Option<Mode>,
}

impl<E: Engine> Session<E> {
	pub fn new(engine: E) -> Self {
		Self {
			engine,
			context: None,
			state: State::Uninitialized,
			width: 0,
			height: 0,
			mode: None,
		}
	}

	pub fn state(&self) -> State {
		self.state
	}

	pub fn is_open(&self) -> bool {
		self.context.is_some()
	}

	/// The mode of the current context, if any.
	pub fn mode(&self) -> Option<Mode> {
		self.context.as_ref().and(self.mode)
	}

	pub fn size(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	/// Create a context, replacing any existing one.
	pub fn create(&mut self, width: u32, height: u32, mode: Mode) -> Result<()> {
		self.destroy();

		tracing::debug!(width, height, ?mode, "creating decoder context");

		let context = self.engine.create(width, height, mode).map_err(|err| {
			tracing::error!(%err, width, height, ?mode, "failed to create decoder context");
			match err {
				Error::Init(_) => err,
				err => Error::Init(err.to_string()),
			}
		})?;

		self.context = Some(context);
		self.state = State::Configured;
		self.width = width;
		self.height = height;
		self.mode = Some(mode);

		Ok(())
	}

	/// Submit bitstream to the context, returning the number of bytes consumed.
	///
	/// Consuming nothing from a non-empty input is an error; the caller would spin forever.
	pub fn feed(&mut self, data: &[u8], marker: u64) -> Result<usize> {
		let context = self
			.context
			.as_mut()
			.ok_or_else(|| Error::Engine("no decoder context".into()))?;

		if data.is_empty() {
			return Ok(0);
		}

		let start = Instant::now();
		let consumed = context.decode(data, marker)?;
		tracing::trace!(marker, size = data.len(), consumed, elapsed = ?start.elapsed(), "decoded");

		if consumed == 0 {
			tracing::error!(marker, size = data.len(), "decoder consumed nothing");
			return Err(Error::Stalled);
		}

		self.state = State::Decoding;

		Ok(consumed.min(data.len()))
	}

	/// Return the next picture, if one is ready.
	///
	/// The picture borrows the context and must be consumed before the next call.
	pub fn retrieve(&mut self, target: Target) -> Option<Picture<'_>> {
		let context = self.context.as_mut()?;
		let picture = context.retrieve(target);

		if picture.is_none() && self.state == State::Flushing {
			self.state = State::Configured;
		}

		picture
	}

	/// Signal end of input; [Self::retrieve] should then be polled until empty.
	pub fn flush(&mut self) {
		if let Some(context) = self.context.as_mut() {
			tracing::debug!("flushing decoder context");
			context.flush();
			self.state = State::Flushing;
		}
	}

	/// Destroy the context. Safe to call in any state, any number of times.
	pub fn destroy(&mut self) {
		if let Some(mut context) = self.context.take() {
			tracing::debug!(width = self.width, height = self.height, "destroying decoder context");
			context.destroy();
			self.state = State::Destroyed;
		}

		self.mode = None;
	}
}

impl<E: Engine> Drop for Session<E> {
	fn drop(&mut self) {
		self.destroy();
	}
}
