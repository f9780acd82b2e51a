//! Color aspects attached to every decoded picture.
//!
//! The stream may signal aspects in its VUI (the *coded* aspects) while the client may
//! provide fallbacks (the *default* aspects). The effective aspects take each coded field
//! unless it is unspecified, in which case the default field is used.

use num_enum::{IntoPrimitive, TryFromPrimitive};

macro_rules! aspect {
	($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal,)* }) => {
		$(#[$meta])*
		#[derive(
			Debug,
			Clone,
			Copy,
			PartialEq,
			Eq,
			Hash,
			TryFromPrimitive,
			IntoPrimitive,
			clap::ValueEnum,
			serde::Serialize,
			serde::Deserialize,
		)]
		#[serde(rename_all = "kebab-case")]
		#[repr(u8)]
		pub enum $name {
			Unspecified = 0,
			$($variant = $value,)*
			Other = 0xff,
		}

		impl Default for $name {
			fn default() -> Self {
				Self::Unspecified
			}
		}

		impl $name {
			/// Convert a raw value, clamping anything unknown to [Self::Other].
			pub fn from_raw(raw: u32) -> Self {
				u8::try_from(raw)
					.ok()
					.and_then(|raw| Self::try_from(raw).ok())
					.unwrap_or(Self::Other)
			}

			pub fn is_unspecified(self) -> bool {
				self == Self::Unspecified
			}

			/// Take `self` unless it is unspecified.
			pub fn or(self, fallback: Self) -> Self {
				if self.is_unspecified() { fallback } else { self }
			}
		}
	};
}

aspect! {
	/// The quantization range of the samples.
	Range {
		Full = 1,
		Limited = 2,
	}
}

aspect! {
	/// The chromaticity coordinates of the source primaries.
	Primaries {
		Bt709 = 1,
		Bt470M = 2,
		Bt601_625 = 3,
		Bt601_525 = 4,
		GenericFilm = 5,
		Bt2020 = 6,
		Rp431 = 7,
		Eg432 = 8,
		Ebu3213 = 9,
	}
}

aspect! {
	/// The opto-electronic transfer characteristics.
	Transfer {
		Linear = 1,
		Srgb = 2,
		Smpte170M = 3,
		Gamma22 = 4,
		Gamma28 = 5,
		St2084 = 6,
		Hlg = 7,
		Smpte240M = 0x40,
		Xvycc = 0x41,
		Bt1361 = 0x42,
		St428 = 0x43,
	}
}

aspect! {
	/// The matrix coefficients used to derive luma and chroma.
	Matrix {
		Bt709 = 1,
		Fcc47_73_682 = 2,
		Bt601 = 3,
		Smpte240M = 4,
		Bt2020 = 5,
		Bt2020Constant = 6,
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColorAspects {
	pub range: Range,
	pub primaries: Primaries,
	pub transfer: Transfer,
	pub matrix: Matrix,
}

impl ColorAspects {
	/// Build aspects from raw field values, clamping unknown values to `Other`.
	pub fn from_raw(range: u32, primaries: u32, transfer: u32, matrix: u32) -> Self {
		Self {
			range: Range::from_raw(range),
			primaries: Primaries::from_raw(primaries),
			transfer: Transfer::from_raw(transfer),
			matrix: Matrix::from_raw(matrix),
		}
	}

	/// The aspects the stream signals when it says nothing: limited range, all else unspecified.
	pub fn coded_default() -> Self {
		Self {
			range: Range::Limited,
			..Default::default()
		}
	}

	/// Merge coded aspects over the defaults, field by field.
	pub fn merge(coded: &Self, default: &Self) -> Self {
		Self {
			range: coded.range.or(default.range),
			primaries: coded.primaries.or(default.primaries),
			transfer: coded.transfer.or(default.transfer),
			matrix: coded.matrix.or(default.matrix),
		}
	}
}
