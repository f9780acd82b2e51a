use crate::{Block, BlockPool, Error, Mode, PixelFormat, Plane, Result, Target, Usage};

/// Holds at most one output block between pictures.
///
/// The block is fetched lazily, kept while its size still fits, and handed off when a picture
/// completes. It is never held across two different picture sizes.
#[derive(Debug, Default)]
pub struct OutputSlot {
	block: Option<Block>,
}

impl OutputSlot {
	/// Width alignment of the throwaway block used to probe the pool.
	pub const PROBE_ALIGN: u32 = 16;

	/// Width alignment of decoder output blocks.
	pub const ALIGN: u32 = 32;

	pub const FORMAT: PixelFormat = PixelFormat::Yv12;

	pub fn new() -> Self {
		Self::default()
	}

	/// Decide the output mode by fetching and inspecting a throwaway block.
	///
	/// A block with a host handle means the host can render straight into the pool's buffers.
	pub fn probe<P: BlockPool>(pool: &mut P, width: u32, height: u32) -> Result<Mode> {
		let block = pool
			.fetch(align(width, Self::PROBE_ALIGN), height, Self::FORMAT, Usage::DECODER_OUTPUT)
			.inspect_err(|err| tracing::error!(%err, width, height, "failed to fetch probe block"))?;

		let mode = match block.host_handle() {
			Some(handle) => {
				tracing::debug!(%handle, "decoding to host color buffer");
				Mode::Host
			}
			None => {
				tracing::debug!("decoding to guest byte buffer");
				Mode::Guest
			}
		};

		Ok(mode)
	}

	/// Make sure a block fitting `width`x`height` is held, returning where the next picture goes.
	///
	/// Pool failures are returned as-is and never retried.
	pub fn ensure<P: BlockPool>(&mut self, pool: &mut P, width: u32, height: u32, mode: Mode) -> Result<Target> {
		let required = align(width, Self::ALIGN);

		if let Some(block) = &self.block {
			if block.width() < required || block.height() != height {
				tracing::debug!(
					held = ?(block.width(), block.height()),
					required = ?(required, height),
					"releasing mismatched output block"
				);
				self.block = None;
			}
		}

		let block = match self.block.take() {
			Some(block) => block,
			None => {
				let mut block = pool
					.fetch(required, height, Self::FORMAT, Usage::DECODER_OUTPUT)
					.inspect_err(|err| tracing::error!(%err, width = required, height, "failed to fetch output block"))?;

				if mode == Mode::Guest && block.map().is_none() {
					tracing::error!(?block, "failed to map output block");
					return Err(Error::Map);
				}

				tracing::debug!(
					provided = ?(block.width(), block.height()),
					required = ?(required, height),
					"fetched output block"
				);

				block
			}
		};

		let target = match mode {
			Mode::Host => Target::Host(block.host_handle().ok_or(Error::Map)?),
			Mode::Guest => Target::Guest,
		};

		self.block = Some(block);

		Ok(target)
	}

	/// Map the held block for writing.
	pub fn plane(&mut self) -> Result<Plane<'_>> {
		self.block.as_mut().and_then(Block::map).ok_or(Error::Map)
	}

	/// Hand off the held block, leaving the slot empty.
	pub fn take(&mut self) -> Option<Block> {
		self.block.take()
	}

	pub fn release(&mut self) {
		self.block = None;
	}

	pub fn is_held(&self) -> bool {
		self.block.is_some()
	}

	pub fn block(&self) -> Option<&Block> {
		self.block.as_ref()
	}
}

pub(crate) fn align(value: u32, alignment: u32) -> u32 {
	value.next_multiple_of(alignment)
}
