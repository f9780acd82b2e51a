//! Graphic buffer pools.
//!
//! A [BlockPool] hands out [Block]s of a requested size. A block is either resident on the
//! accelerated device, identified by a positive [HostHandle], or backed by memory the CPU can
//! map and write into.

use std::fmt;

/// An opaque handle naming a buffer that lives on the host device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::Debug)]
#[display("{_0}")]
#[debug("host#{_0}")]
pub struct HostHandle(u32);

impl HostHandle {
	/// Returns a handle if the raw value names a device buffer (strictly positive).
	pub fn new(raw: i32) -> Option<Self> {
		u32::try_from(raw).ok().filter(|raw| *raw > 0).map(Self)
	}

	pub fn get(self) -> u32 {
		self.0
	}
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AllocError {
	#[error("pool exhausted")]
	Exhausted,

	#[error("unsupported size {width}x{height}")]
	BadSize { width: u32, height: u32 },

	#[error("pool error: {0}")]
	Other(String),
}

/// The pixel format requested from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PixelFormat {
	/// Flexible YCbCr 4:2:0, the format advertised to clients.
	YCbCr420 = 0x23,
	/// Planar Y, V, U 4:2:0, the format actually fetched for decoding.
	Yv12 = 19,
}

/// Memory usage flags passed to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Usage(u64);

impl Usage {
	pub const CPU_READ: Self = Self(1 << 0);
	pub const CPU_WRITE: Self = Self(1 << 1);
	pub const GPU_DATA_BUFFER: Self = Self(1 << 24);

	/// CPU read/write plus GPU data buffer, used for every decoder output.
	pub const DECODER_OUTPUT: Self = Self(Self::CPU_READ.0 | Self::CPU_WRITE.0 | Self::GPU_DATA_BUFFER.0);

	pub fn contains(self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn bits(self) -> u64 {
		self.0
	}
}

impl std::ops::BitOr for Usage {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self {
		Self(self.0 | rhs.0)
	}
}

/// A writable view of the first plane of a block.
///
/// The view covers every plane: chroma follows luma at `stride * height`.
pub struct Plane<'a> {
	pub data: &'a mut [u8],
	pub stride: usize,
}

/// A read-only view of a mapped block.
pub struct View<'a> {
	pub data: &'a [u8],
	pub stride: usize,
}

/// The storage behind a [Block], implemented by the pool.
pub trait Allocation: Send + Sync {
	/// The raw host handle of this allocation. Zero or negative means none.
	fn host_handle(&self) -> i32;

	/// Map the allocation for CPU writes.
	fn map(&mut self) -> Option<Plane<'_>>;

	/// Read the allocation from the CPU, if it is CPU visible.
	fn view(&self) -> Option<View<'_>> {
		None
	}
}

/// A graphic buffer fetched from a [BlockPool].
pub struct Block {
	width: u32,
	height: u32,
	allocation: Box<dyn Allocation>,
}

impl Block {
	pub fn new(width: u32, height: u32, allocation: impl Allocation + 'static) -> Self {
		Self {
			width,
			height,
			allocation: Box::new(allocation),
		}
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	/// The host handle, if the block is resident on the device.
	pub fn host_handle(&self) -> Option<HostHandle> {
		HostHandle::new(self.allocation.host_handle())
	}

	pub fn map(&mut self) -> Option<Plane<'_>> {
		self.allocation.map()
	}

	pub fn view(&self) -> Option<View<'_>> {
		self.allocation.view()
	}
}

impl fmt::Debug for Block {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Block")
			.field("width", &self.width)
			.field("height", &self.height)
			.field("host", &self.host_handle())
			.finish()
	}
}

/// A source of graphic buffers.
///
/// Fetches are never retried by the decoder; backpressure is the pool owner's problem.
pub trait BlockPool {
	fn fetch(&mut self, width: u32, height: u32, format: PixelFormat, usage: Usage) -> Result<Block, AllocError>;
}

impl<P: BlockPool + ?Sized> BlockPool for &mut P {
	fn fetch(&mut self, width: u32, height: u32, format: PixelFormat, usage: Usage) -> Result<Block, AllocError> {
		(**self).fetch(width, height, format, usage)
	}
}

/// A pool of plain heap memory, producing CPU-mapped 4:2:0 blocks.
///
/// Rows are padded so the stride is a multiple of `align`.
#[derive(Debug, Clone)]
pub struct MemoryPool {
	align: usize,
	fetched: usize,
}

impl MemoryPool {
	pub const DEFAULT_ALIGN: usize = 32;

	pub fn new(align: usize) -> Self {
		Self {
			align: align.max(1),
			fetched: 0,
		}
	}

	/// The number of blocks fetched so far.
	pub fn fetched(&self) -> usize {
		self.fetched
	}
}

impl Default for MemoryPool {
	fn default() -> Self {
		Self::new(Self::DEFAULT_ALIGN)
	}
}

impl BlockPool for MemoryPool {
	fn fetch(&mut self, width: u32, height: u32, _format: PixelFormat, _usage: Usage) -> Result<Block, AllocError> {
		if width == 0 || height == 0 {
			return Err(AllocError::BadSize { width, height });
		}

		let stride = (width as usize).next_multiple_of(self.align);
		let size = stride * height as usize * 3 / 2;

		let mut data = Vec::new();
		data.try_reserve_exact(size).map_err(|_| AllocError::Exhausted)?;
		data.resize(size, 0);

		self.fetched += 1;

		Ok(Block::new(width, height, Memory { data, stride }))
	}
}

/// A heap allocation with a fixed row stride.
pub struct Memory {
	data: Vec<u8>,
	stride: usize,
}

impl Memory {
	pub fn new(data: Vec<u8>, stride: usize) -> Self {
		Self { data, stride }
	}
}

impl Allocation for Memory {
	fn host_handle(&self) -> i32 {
		0
	}

	fn map(&mut self) -> Option<Plane<'_>> {
		Some(Plane {
			data: &mut self.data,
			stride: self.stride,
		})
	}

	fn view(&self) -> Option<View<'_>> {
		Some(View {
			data: &self.data,
			stride: self.stride,
		})
	}
}
