use std::path::Path;

use bytes::Bytes;

#[cfg(feature = "ffmpeg")]
use {anyhow::Context, std::io::Write};

/// The nominal frame duration used to stamp access units, in microseconds.
#[cfg(feature = "ffmpeg")]
const FRAME_MICROS: u64 = 33_333;

/// Split the stream and check every access unit fits the component's input buffer.
pub fn decode(interface: avcdec::Interface, data: Bytes, output: &Path) -> anyhow::Result<()> {
	let units: Vec<Bytes> = avcdec::annexb::AccessUnits::new(data).collect();
	anyhow::ensure!(!units.is_empty(), "no access units found");

	let max_input = {
		let params = interface.lock();
		tracing::info!(
			name = avcdec::Interface::NAME,
			media_type = avcdec::Interface::MEDIA_TYPE,
			kind = avcdec::Interface::KIND,
			domain = avcdec::Interface::DOMAIN,
			size = ?params.size(),
			format = ?avcdec::Params::PIXEL_FORMAT,
			bit_depth = avcdec::Params::BIT_DEPTH,
			"starting decoder"
		);
		params.max_input_size()
	};

	if let Some((index, size)) = oversized(&units, max_input) {
		anyhow::bail!("access unit {index} is {size} bytes, larger than the {max_input} byte input buffer");
	}

	run(interface, units, output)
}

/// The first access unit larger than `max`, as its index and size.
fn oversized(units: &[Bytes], max: usize) -> Option<(usize, usize)> {
	units
		.iter()
		.enumerate()
		.find(|(_, unit)| unit.len() > max)
		.map(|(index, unit)| (index, unit.len()))
}

#[cfg(not(feature = "ffmpeg"))]
fn run(_interface: avcdec::Interface, _units: Vec<Bytes>, _output: &Path) -> anyhow::Result<()> {
	anyhow::bail!("decoding requires the `ffmpeg` feature; rebuild with `--features ffmpeg`")
}

#[cfg(feature = "ffmpeg")]
fn run(interface: avcdec::Interface, units: Vec<Bytes>, output: &Path) -> anyhow::Result<()> {
	let mut writer = Writer::open(output)?;
	let mut pool = avcdec::MemoryPool::default();
	let mut component = avcdec::Component::new(avcdec::ffmpeg::FfmpegEngine::new(), interface);

	let last = units.len() - 1;
	for (index, unit) in units.into_iter().enumerate() {
		let index = index as u64;
		let mut work = avcdec::Work::new(index, avcdec::Timestamp::from_micros(index * FRAME_MICROS), unit);
		if index == last as u64 {
			work = work.with_flags(avcdec::Flags::END_OF_STREAM);
		}

		let result = component.process(work, &mut pool);
		writer.write_all(component.take_done())?;

		if let Err(err) = result {
			if err.is_fatal() {
				return Err(err).with_context(|| format!("failed to decode access unit {index}"));
			}
			tracing::warn!(index, %err, "access unit failed");
		}
	}

	for work in component.flush().context("failed to flush decoder")? {
		tracing::warn!(index = work.frame_index(), "access unit produced no picture");
	}

	writer.finish()
}

/// Writes completed pictures as tightly packed I420.
#[cfg(feature = "ffmpeg")]
struct Writer {
	out: std::io::BufWriter<Box<dyn Write>>,
	pictures: usize,
	empty: usize,
}

#[cfg(feature = "ffmpeg")]
impl Writer {
	fn open(path: &Path) -> anyhow::Result<Self> {
		let out: Box<dyn Write> = if path == Path::new("-") {
			Box::new(std::io::stdout())
		} else {
			let file = std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
			Box::new(file)
		};

		Ok(Self {
			out: std::io::BufWriter::new(out),
			pictures: 0,
			empty: 0,
		})
	}

	fn write_all(&mut self, done: Vec<avcdec::Work>) -> anyhow::Result<()> {
		for work in done {
			let index = work.frame_index();
			let Some(picture) = work.picture() else {
				tracing::trace!(index, status = ?work.result, "empty completion");
				self.empty += 1;
				continue;
			};

			let view = picture.view().context("picture is not CPU visible")?;
			let width = picture.crop.width as usize;
			let height = picture.crop.height as usize;
			let stride = view.stride;
			let luma = stride * height;

			// Luma, then the two quarter size chroma planes at half stride.
			let planes = [
				(0, stride, width, height),
				(luma, stride / 2, width / 2, height / 2),
				(luma + luma / 4, stride / 2, width / 2, height / 2),
			];

			for (offset, pitch, w, h) in planes {
				for row in 0..h {
					let start = offset + row * pitch;
					let line = view
						.data
						.get(start..start + w)
						.context("picture smaller than its crop")?;
					self.out.write_all(line)?;
				}
			}

			tracing::debug!(index, width, height, flags = ?work.output.flags, "wrote picture");
			self.pictures += 1;
		}

		Ok(())
	}

	fn finish(mut self) -> anyhow::Result<()> {
		self.out.flush()?;
		tracing::info!(pictures = self.pictures, empty = self.empty, "decode complete");
		Ok(())
	}
}
