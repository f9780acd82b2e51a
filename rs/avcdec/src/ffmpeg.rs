//! A software [Engine] backed by FFmpeg.
//!
//! Pictures are always returned in engine memory, so only [Mode::Guest] is supported.

use ffmpeg_next as ffmpeg;

use crate::{Context, Engine, Error, Mode, Picture, Pixels, Result, Target};

#[derive(Debug, Default)]
pub struct FfmpegEngine;

impl FfmpegEngine {
	pub fn new() -> Self {
		Self
	}
}

impl Engine for FfmpegEngine {
	type Context = FfmpegContext;

	fn create(&mut self, width: u32, height: u32, mode: Mode) -> Result<FfmpegContext> {
		if mode == Mode::Host {
			return Err(Error::Init("host rendering is not supported".into()));
		}

		// Initialize FFmpeg (idempotent)
		ffmpeg::init().map_err(|e| Error::Init(e.to_string()))?;

		let codec = ffmpeg::codec::decoder::find(ffmpeg::codec::Id::H264)
			.ok_or_else(|| Error::Init("no H.264 decoder available".into()))?;

		let decoder = ffmpeg::codec::context::Context::new_with_codec(codec)
			.decoder()
			.video()
			.map_err(|e| Error::Init(format!("not a video codec: {e}")))?;

		tracing::debug!(width, height, "opened ffmpeg decoder");

		Ok(FfmpegContext {
			decoder: Some(decoder),
			frame: ffmpeg::frame::Video::empty(),
			image: Vec::new(),
		})
	}
}

pub struct FfmpegContext {
	decoder: Option<ffmpeg::decoder::Video>,
	frame: ffmpeg::frame::Video,

	// The last retrieved picture, repacked as tight I420.
	image: Vec<u8>,
}

impl FfmpegContext {
	fn decoder(&mut self) -> Result<&mut ffmpeg::decoder::Video> {
		self.decoder
			.as_mut()
			.ok_or_else(|| Error::Engine("decoder destroyed".into()))
	}

	/// Repack the current frame without row padding.
	fn repack(&mut self) -> Option<(u32, u32)> {
		if self.frame.format() != ffmpeg::format::Pixel::YUV420P {
			tracing::warn!(format = ?self.frame.format(), "unsupported pixel format");
			return None;
		}

		let width = self.frame.width() as usize;
		let height = self.frame.height() as usize;

		self.image.clear();
		self.image.reserve(width * height * 3 / 2);

		for (plane, (w, h)) in [(width, height), (width / 2, height / 2), (width / 2, height / 2)]
			.into_iter()
			.enumerate()
		{
			let stride = self.frame.stride(plane);
			let data = self.frame.data(plane);
			for row in 0..h {
				self.image.extend_from_slice(&data[row * stride..][..w]);
			}
		}

		Some((width as u32, height as u32))
	}
}

impl Context for FfmpegContext {
	fn decode(&mut self, data: &[u8], marker: u64) -> Result<usize> {
		let mut packet = ffmpeg::codec::packet::Packet::copy(data);
		packet.set_pts(Some(marker as i64));

		self.decoder()?
			.send_packet(&packet)
			.map_err(|e| Error::Engine(format!("send_packet failed: {e}")))?;

		// FFmpeg always takes the whole packet.
		Ok(data.len())
	}

	fn retrieve(&mut self, target: Target) -> Option<Picture<'_>> {
		if let Target::Host(handle) = target {
			tracing::warn!(%handle, "cannot render into a host buffer");
			return None;
		}

		let (marker, width, height) = loop {
			let decoder = self.decoder.as_mut()?;
			match decoder.receive_frame(&mut self.frame) {
				Ok(()) => {}
				Err(ffmpeg::Error::Eof) => {
					// Fully flushed; reset so the context accepts input again.
					decoder.flush();
					return None;
				}
				// Needs more input.
				Err(ffmpeg::Error::Other { errno }) if errno == libc::EAGAIN => return None,
				Err(err) => {
					tracing::warn!(%err, "failed to receive frame");
					return None;
				}
			}

			// Skip unusable frames rather than ending a drain early.
			let Some(marker) = self.frame.pts().or(self.frame.timestamp()) else {
				tracing::warn!("dropping frame without a timestamp");
				continue;
			};

			match self.repack() {
				Some((width, height)) => break (marker, width, height),
				None => continue,
			}
		};

		Some(Picture {
			marker: marker as u64,
			width,
			height,
			pixels: Pixels::Planar(&self.image),
		})
	}

	fn flush(&mut self) {
		if let Some(decoder) = self.decoder.as_mut() {
			if let Err(err) = decoder.send_eof() {
				tracing::warn!(%err, "failed to flush ffmpeg decoder");
			}
		}
	}

	fn destroy(&mut self) {
		self.decoder = None;
		self.image = Vec::new();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tracing_test::traced_test;

	#[test]
	fn test_host_mode_rejected() {
		let mut engine = FfmpegEngine::new();
		assert!(matches!(engine.create(64, 64, Mode::Host), Err(Error::Init(_))));
	}

	#[test]
	#[traced_test]
	fn test_retrieve_needs_input() {
		let mut engine = FfmpegEngine::new();
		let mut context = engine.create(64, 64, Mode::Guest).unwrap();

		// Nothing submitted yet: the decoder asks for more input, which is not an error.
		assert!(context.retrieve(Target::Guest).is_none());
		assert!(!logs_contain("failed to receive frame"));

		context.destroy();
		assert!(context.retrieve(Target::Guest).is_none());
	}
}
