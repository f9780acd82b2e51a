//! Negotiated component parameters, shared with the caller through an [Interface].

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::{ColorAspects, Error, Matrix, PixelFormat, Primaries, Range, Result, Transfer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
	#[default]
	ConstrainedBaseline,
	Baseline,
	Main,
	ConstrainedHigh,
	ProgressiveHigh,
	High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
pub enum Level {
	#[value(name = "1")]
	#[serde(rename = "1")]
	L1,
	#[value(name = "1b")]
	#[serde(rename = "1b")]
	L1b,
	#[value(name = "1.1")]
	#[serde(rename = "1.1")]
	L1_1,
	#[value(name = "1.2")]
	#[serde(rename = "1.2")]
	L1_2,
	#[value(name = "1.3")]
	#[serde(rename = "1.3")]
	L1_3,
	#[value(name = "2")]
	#[serde(rename = "2")]
	L2,
	#[value(name = "2.1")]
	#[serde(rename = "2.1")]
	L2_1,
	#[value(name = "2.2")]
	#[serde(rename = "2.2")]
	L2_2,
	#[value(name = "3")]
	#[serde(rename = "3")]
	L3,
	#[value(name = "3.1")]
	#[serde(rename = "3.1")]
	L3_1,
	#[value(name = "3.2")]
	#[serde(rename = "3.2")]
	L3_2,
	#[value(name = "4")]
	#[serde(rename = "4")]
	L4,
	#[value(name = "4.1")]
	#[serde(rename = "4.1")]
	L4_1,
	#[value(name = "4.2")]
	#[serde(rename = "4.2")]
	L4_2,
	#[value(name = "5")]
	#[serde(rename = "5")]
	L5,
	#[value(name = "5.1")]
	#[serde(rename = "5.1")]
	L5_1,
	#[value(name = "5.2")]
	#[serde(rename = "5.2")]
	#[default]
	L5_2,
}

/// The parameters of a decoder component.
///
/// Setters validate their input. A rejected value leaves the previous one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
	width: u32,
	height: u32,
	max_width: u32,
	max_height: u32,
	output_delay: u32,
	profile: Profile,
	level: Level,
	default_color: ColorAspects,
	coded_color: ColorAspects,
}

impl Params {
	pub const MIN_SIZE: u32 = 2;
	pub const MAX_SIZE: u32 = 4080;

	pub const DEFAULT_WIDTH: u32 = 320;
	pub const DEFAULT_HEIGHT: u32 = 240;

	pub const DEFAULT_OUTPUT_DELAY: u32 = 8;

	/// 16 reference frames, counted as 32 interlaced fields, plus 2 calls of engine delay.
	pub const MAX_OUTPUT_DELAY: u32 = 34;

	pub const MIN_INPUT_BUFFER_SIZE: usize = 2 * 1024 * 1024;

	/// Bytes consumed per 16x16 macroblock assuming a compression ratio of 2.
	const INPUT_BYTES_PER_MB: usize = 192;

	pub const PIXEL_FORMAT: PixelFormat = PixelFormat::YCbCr420;
	pub const BIT_DEPTH: u8 = 8;

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	pub fn size(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	/// Set the picture size, validating each axis independently.
	///
	/// The max picture size grows to cover the new size.
	pub fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
		let mut rejected = Vec::new();

		if Self::valid_size(width) {
			self.width = width;
		} else {
			rejected.push(format!("width={width}"));
		}

		if Self::valid_size(height) {
			self.height = height;
		} else {
			rejected.push(format!("height={height}"));
		}

		self.update_max_size();

		if !rejected.is_empty() {
			tracing::warn!(?rejected, width = self.width, height = self.height, "rejected picture size");
			return Err(Error::BadValue(rejected.join(", ")));
		}

		Ok(())
	}

	fn valid_size(value: u32) -> bool {
		(Self::MIN_SIZE..=Self::MAX_SIZE).contains(&value) && value % 2 == 0
	}

	pub fn max_size(&self) -> (u32, u32) {
		(self.max_width, self.max_height)
	}

	/// Set the max picture size, never below the current size nor above [Self::MAX_SIZE].
	pub fn set_max_size(&mut self, width: u32, height: u32) {
		self.max_width = width;
		self.max_height = height;
		self.update_max_size();
	}

	fn update_max_size(&mut self) {
		self.max_width = self.max_width.max(self.width).min(Self::MAX_SIZE);
		self.max_height = self.max_height.max(self.height).min(Self::MAX_SIZE);
	}

	/// The largest access unit the caller should submit, derived from the max picture size.
	pub fn max_input_size(&self) -> usize {
		let mbs_wide = self.max_width.div_ceil(16) as usize;
		let mbs_high = self.max_height.div_ceil(16) as usize;
		(mbs_wide * mbs_high * Self::INPUT_BYTES_PER_MB).max(Self::MIN_INPUT_BUFFER_SIZE)
	}

	pub fn output_delay(&self) -> u32 {
		self.output_delay
	}

	pub fn set_output_delay(&mut self, delay: u32) -> Result<()> {
		if delay > Self::MAX_OUTPUT_DELAY {
			return Err(Error::BadValue(format!("output delay={delay}")));
		}

		self.output_delay = delay;
		Ok(())
	}

	pub fn profile(&self) -> Profile {
		self.profile
	}

	pub fn level(&self) -> Level {
		self.level
	}

	/// Accepted as-is; the engine decides what it can decode.
	pub fn set_profile_level(&mut self, profile: Profile, level: Level) {
		self.profile = profile;
		self.level = level;
	}

	pub fn default_color_aspects(&self) -> ColorAspects {
		self.default_color
	}

	pub fn set_default_color_aspects(&mut self, aspects: ColorAspects) {
		self.default_color = aspects;
	}

	pub fn coded_color_aspects(&self) -> ColorAspects {
		self.coded_color
	}

	/// Set the aspects signalled by the stream from raw values, clamping anything unknown.
	pub fn set_coded_color_aspects(&mut self, range: u32, primaries: u32, transfer: u32, matrix: u32) {
		self.coded_color = ColorAspects::from_raw(range, primaries, transfer, matrix);
	}

	/// The aspects attached to output pictures.
	pub fn color_aspects(&self) -> ColorAspects {
		ColorAspects::merge(&self.coded_color, &self.default_color)
	}
}

impl Default for Params {
	fn default() -> Self {
		Self {
			width: Self::DEFAULT_WIDTH,
			height: Self::DEFAULT_HEIGHT,
			max_width: Self::DEFAULT_WIDTH,
			max_height: Self::DEFAULT_HEIGHT,
			output_delay: Self::DEFAULT_OUTPUT_DELAY,
			profile: Profile::default(),
			level: Level::default(),
			default_color: ColorAspects::default(),
			coded_color: ColorAspects::coded_default(),
		}
	}
}

/// A handle to the component's parameters, shared between the caller and the component.
#[derive(Debug, Clone, Default)]
pub struct Interface(Arc<Mutex<Params>>);

impl Interface {
	pub const NAME: &'static str = "c2.goldfish.h264.decoder";
	pub const MEDIA_TYPE: &'static str = "video/avc";
	pub const KIND: &'static str = "decoder";
	pub const DOMAIN: &'static str = "video";

	pub fn new(params: Params) -> Self {
		Self(Arc::new(Mutex::new(params)))
	}

	/// Lock the parameters for a read-modify-write.
	pub fn lock(&self) -> MutexGuard<'_, Params> {
		self.0.lock()
	}

	pub fn size(&self) -> (u32, u32) {
		self.lock().size()
	}

	pub fn color_aspects(&self) -> ColorAspects {
		self.lock().color_aspects()
	}
}

/// Default color aspects, used when the stream leaves a field unspecified.
#[derive(Clone, Debug, Default, clap::Args, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct ColorConfig {
	#[arg(id = "color-range", long = "color-range", env = "AVCDEC_COLOR_RANGE")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub range: Option<Range>,

	#[arg(id = "color-primaries", long = "color-primaries", env = "AVCDEC_COLOR_PRIMARIES")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub primaries: Option<Primaries>,

	#[arg(id = "color-transfer", long = "color-transfer", env = "AVCDEC_COLOR_TRANSFER")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub transfer: Option<Transfer>,

	#[arg(id = "color-matrix", long = "color-matrix", env = "AVCDEC_COLOR_MATRIX")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub matrix: Option<Matrix>,
}

impl ColorConfig {
	fn aspects(&self) -> ColorAspects {
		ColorAspects {
			range: self.range.unwrap_or_default(),
			primaries: self.primaries.unwrap_or_default(),
			transfer: self.transfer.unwrap_or_default(),
			matrix: self.matrix.unwrap_or_default(),
		}
	}
}

/// Configuration for the decoder component.
///
/// Every field is optional so values loaded from a file survive re-applying the command line.
#[derive(Clone, Debug, Default, clap::Parser, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Config {
	/// The picture width in pixels (default: 320).
	#[arg(long, env = "AVCDEC_WIDTH")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub width: Option<u32>,

	/// The picture height in pixels (default: 240).
	#[arg(long, env = "AVCDEC_HEIGHT")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub height: Option<u32>,

	/// The largest picture width the stream may switch to.
	#[arg(long, env = "AVCDEC_MAX_WIDTH")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_width: Option<u32>,

	#[arg(long, env = "AVCDEC_MAX_HEIGHT")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_height: Option<u32>,

	/// The number of pictures the decoder may hold back for reordering (default: 8).
	#[arg(long, env = "AVCDEC_OUTPUT_DELAY")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output_delay: Option<u32>,

	#[arg(long, env = "AVCDEC_PROFILE")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub profile: Option<Profile>,

	#[arg(long, env = "AVCDEC_LEVEL")]
	#[serde(skip_serializing_if = "Option::is_none")]
	pub level: Option<Level>,

	#[command(flatten)]
	#[serde(default)]
	pub color: ColorConfig,
}

impl Config {
	/// Validate the configuration and produce the component's interface.
	pub fn init(self) -> Result<Interface> {
		let mut params = Params::default();

		params.set_size(
			self.width.unwrap_or(Params::DEFAULT_WIDTH),
			self.height.unwrap_or(Params::DEFAULT_HEIGHT),
		)?;

		let (max_width, max_height) = params.max_size();
		params.set_max_size(
			self.max_width.unwrap_or(max_width),
			self.max_height.unwrap_or(max_height),
		);

		if let Some(delay) = self.output_delay {
			params.set_output_delay(delay)?;
		}

		params.set_profile_level(self.profile.unwrap_or_default(), self.level.unwrap_or_default());
		params.set_default_color_aspects(self.color.aspects());

		Ok(Interface::new(params))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::Parser;

	#[test]
	fn test_defaults() {
		let params = Params::default();
		assert_eq!(params.size(), (320, 240));
		assert_eq!(params.max_size(), (320, 240));
		assert_eq!(params.output_delay(), 8);
		assert_eq!(params.profile(), Profile::ConstrainedBaseline);
		assert_eq!(params.level(), Level::L5_2);
		assert_eq!(params.max_input_size(), Params::MIN_INPUT_BUFFER_SIZE);
		assert_eq!(params.color_aspects().range, Range::Limited);
	}

	#[test]
	fn test_set_size_rejects_per_axis() {
		let mut params = Params::default();

		assert!(matches!(params.set_size(641, 480), Err(Error::BadValue(_))));
		assert_eq!(params.size(), (320, 480));

		assert!(params.set_size(0, 4082).is_err());
		assert_eq!(params.size(), (320, 480));

		params.set_size(4080, 2).unwrap();
		assert_eq!(params.size(), (4080, 2));
	}

	#[test]
	fn test_max_size_follows_size() {
		let mut params = Params::default();
		params.set_size(1920, 1080).unwrap();
		assert_eq!(params.max_size(), (1920, 1080));

		params.set_max_size(640, 5000);
		assert_eq!(params.max_size(), (1920, 4080));

		params.set_max_size(3840, 2160);
		assert_eq!(params.max_size(), (3840, 2160));
	}

	#[test]
	fn test_max_input_size() {
		let mut params = Params::default();
		params.set_size(4080, 4080).unwrap();

		// 255 * 255 macroblocks at 192 bytes each.
		assert_eq!(params.max_input_size(), 255 * 255 * 192);
	}

	#[test]
	fn test_output_delay() {
		let mut params = Params::default();
		params.set_output_delay(34).unwrap();
		assert!(params.set_output_delay(35).is_err());
		assert_eq!(params.output_delay(), 34);
	}

	#[test]
	fn test_coded_color_clamps() {
		let mut params = Params::default();
		params.set_default_color_aspects(ColorAspects {
			primaries: Primaries::Bt709,
			..Default::default()
		});
		params.set_coded_color_aspects(1, 0, 1000, 1);

		let aspects = params.color_aspects();
		assert_eq!(aspects.range, Range::Full);
		assert_eq!(aspects.primaries, Primaries::Bt709);
		assert_eq!(aspects.transfer, Transfer::Other);
		assert_eq!(aspects.matrix, Matrix::Bt709);
	}

	#[test]
	fn test_interface_is_shared() {
		let interface = Interface::default();
		let other = interface.clone();

		other.lock().set_size(64, 48).unwrap();
		assert_eq!(interface.size(), (64, 48));
	}

	#[test]
	fn test_config_toml() {
		let toml = r#"
			width = 1280
			height = 720
			level = "3.1"
			profile = "high"
			color.range = "full"
		"#;

		let config: Config = toml::from_str(toml).unwrap();
		let interface = config.init().unwrap();

		let params = interface.lock();
		assert_eq!(params.size(), (1280, 720));
		assert_eq!(params.level(), Level::L3_1);
		assert_eq!(params.profile(), Profile::High);
		assert_eq!(params.default_color_aspects().range, Range::Full);
	}

	#[test]
	fn test_config_unknown_field() {
		assert!(toml::from_str::<Config>("bitrate = 5").is_err());
	}

	#[test]
	fn test_toml_survives_update_from() {
		let mut config: Config = toml::from_str("width = 640\nheight = 480").unwrap();

		// Simulate: TOML loaded, then CLI args re-applied.
		config.update_from(["test", "--height", "360"]);
		assert_eq!(config.width, Some(640));
		assert_eq!(config.height, Some(360));
	}

	#[test]
	fn test_cli() {
		let config = Config::parse_from(["test", "--width", "96", "--output-delay", "2", "--color-matrix", "bt601"]);
		assert_eq!(config.width, Some(96));
		assert_eq!(config.color.matrix, Some(Matrix::Bt601));

		let interface = config.init().unwrap();
		assert_eq!(interface.size(), (96, 240));
		assert_eq!(interface.lock().output_delay(), 2);
	}

	#[test]
	fn test_config_rejects_odd_size() {
		let config = Config::parse_from(["test", "--width", "97"]);
		assert!(matches!(config.init(), Err(Error::BadValue(_))));
	}
}
