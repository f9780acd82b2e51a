//! A scripted engine and pools for exercising the component without a real decoder.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{
	AllocError, Allocation, Block, BlockPool, Context, Engine, Error, HostHandle, Mode, Picture, PixelFormat, Pixels,
	Plane, Result, Target, Usage, View,
};

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
	/// Pictures trail their access unit by this many decode calls.
	pub delay: usize,
	/// Bytes consumed per decode call, or everything if unset.
	pub chunk: Option<usize>,
	/// Consume nothing.
	pub stall: bool,
	pub fail_init: bool,
	/// Markers that never produce a picture (ex. parameter sets).
	pub silent: Vec<u64>,
	/// Replace the marker of every picture with this value.
	pub bogus_marker: Option<u64>,
	/// Emit pictures at this size instead of the context's.
	pub picture_size: Option<(u32, u32)>,
	/// Return planar pictures cut to half their length.
	pub truncate: bool,
}

#[derive(Debug, Default)]
pub struct MockStats {
	pub created: usize,
	pub destroyed: usize,
	pub flushed: usize,
	pub modes: Vec<Mode>,
	pub decoded: Vec<u64>,
	pub rendered: Vec<HostHandle>,
}

pub struct MockEngine {
	config: MockConfig,
	stats: Arc<Mutex<MockStats>>,
}

impl MockEngine {
	pub fn new(config: MockConfig) -> Self {
		Self {
			config,
			stats: Default::default(),
		}
	}

	pub fn stats(&self) -> Arc<Mutex<MockStats>> {
		self.stats.clone()
	}
}

impl Engine for MockEngine {
	type Context = MockContext;

	fn create(&mut self, width: u32, height: u32, mode: Mode) -> Result<MockContext> {
		if self.config.fail_init {
			return Err(Error::Init("mock refused".into()));
		}

		let mut stats = self.stats.lock();
		stats.created += 1;
		stats.modes.push(mode);

		Ok(MockContext {
			config: self.config.clone(),
			stats: self.stats.clone(),
			width,
			height,
			mode,
			queue: VecDeque::new(),
			remaining: None,
			flushing: false,
			image: Vec::new(),
		})
	}
}

pub struct MockContext {
	config: MockConfig,
	stats: Arc<Mutex<MockStats>>,
	width: u32,
	height: u32,
	mode: Mode,
	queue: VecDeque<u64>,
	// Bytes left of the access unit currently being consumed.
	remaining: Option<(u64, usize)>,
	flushing: bool,
	image: Vec<u8>,
}

impl Context for MockContext {
	fn decode(&mut self, data: &[u8], marker: u64) -> Result<usize> {
		if self.config.stall {
			return Ok(0);
		}

		self.flushing = false;

		let remaining = match self.remaining {
			Some((current, remaining)) if current == marker => remaining,
			_ => data.len(),
		};

		let consumed = self.config.chunk.unwrap_or(data.len()).min(data.len()).min(remaining);
		let remaining = remaining - consumed;

		if remaining > 0 {
			self.remaining = Some((marker, remaining));
			return Ok(consumed);
		}

		self.remaining = None;
		self.stats.lock().decoded.push(marker);

		if !self.config.silent.contains(&marker) {
			self.queue.push_back(marker);
		}

		Ok(consumed)
	}

	fn retrieve(&mut self, target: Target) -> Option<Picture<'_>> {
		if target.mode() == Mode::Host {
			assert_eq!(self.mode, Mode::Host, "host target on a guest context");
		}

		if !self.flushing && self.queue.len() <= self.config.delay {
			return None;
		}

		let marker = self.queue.pop_front()?;
		let marker_out = self.config.bogus_marker.unwrap_or(marker);
		let (width, height) = self.config.picture_size.unwrap_or((self.width, self.height));

		let pixels = match target {
			Target::Host(handle) => {
				self.stats.lock().rendered.push(handle);
				Pixels::Host
			}
			Target::Guest => {
				self.image = picture(marker, width as usize, height as usize);
				if self.config.truncate {
					self.image.truncate(self.image.len() / 2);
				}
				Pixels::Planar(&self.image)
			}
		};

		Some(Picture {
			marker: marker_out,
			width,
			height,
			pixels,
		})
	}

	fn flush(&mut self) {
		self.flushing = true;
		self.stats.lock().flushed += 1;
	}

	fn destroy(&mut self) {
		self.queue.clear();
		self.stats.lock().destroyed += 1;
	}
}

/// The I420 picture the mock produces for a marker.
pub fn picture(marker: u64, width: usize, height: usize) -> Vec<u8> {
	let mut image = Vec::with_capacity(width * height * 3 / 2);
	for row in 0..height {
		for col in 0..width {
			image.push((marker as usize * 7 + row + col) as u8);
		}
	}
	image.resize(width * height * 5 / 4, 0x80u8.wrapping_add(marker as u8));
	image.resize(width * height * 3 / 2, 0x40u8.wrapping_add(marker as u8));
	image
}

/// A pool recording every fetch and tracking outstanding blocks.
pub struct MockPool {
	mode: Mode,
	next_handle: i32,
	live: Arc<AtomicUsize>,
	pub fetches: Vec<(u32, u32)>,
	pub fail: bool,
	pub unmappable: bool,
}

impl MockPool {
	pub fn host() -> Self {
		Self::new(Mode::Host)
	}

	pub fn guest() -> Self {
		Self::new(Mode::Guest)
	}

	fn new(mode: Mode) -> Self {
		Self {
			mode,
			next_handle: 1,
			live: Default::default(),
			fetches: Vec::new(),
			fail: false,
			unmappable: false,
		}
	}

	/// The number of blocks fetched and not yet dropped.
	pub fn live(&self) -> usize {
		self.live.load(Ordering::SeqCst)
	}
}

impl BlockPool for MockPool {
	fn fetch(&mut self, width: u32, height: u32, _format: PixelFormat, usage: Usage) -> Result<Block, AllocError> {
		assert!(usage.contains(Usage::DECODER_OUTPUT));

		if self.fail {
			return Err(AllocError::Exhausted);
		}

		self.fetches.push((width, height));
		self.live.fetch_add(1, Ordering::SeqCst);

		let handle = match self.mode {
			Mode::Host => {
				self.next_handle += 1;
				self.next_handle - 1
			}
			Mode::Guest => 0,
		};

		let stride = width as usize;
		let data = match (self.mode, self.unmappable) {
			(Mode::Guest, false) => Some(vec![0; stride * height as usize * 3 / 2]),
			_ => None,
		};

		Ok(Block::new(
			width,
			height,
			MockAllocation {
				handle,
				data,
				stride,
				live: self.live.clone(),
			},
		))
	}
}

struct MockAllocation {
	handle: i32,
	data: Option<Vec<u8>>,
	stride: usize,
	live: Arc<AtomicUsize>,
}

impl Allocation for MockAllocation {
	fn host_handle(&self) -> i32 {
		self.handle
	}

	fn map(&mut self) -> Option<Plane<'_>> {
		let stride = self.stride;
		self.data.as_mut().map(|data| Plane { data, stride })
	}

	fn view(&self) -> Option<View<'_>> {
		self.data.as_ref().map(|data| View {
			data,
			stride: self.stride,
		})
	}
}

impl Drop for MockAllocation {
	fn drop(&mut self) {
		self.live.fetch_sub(1, Ordering::SeqCst);
	}
}
