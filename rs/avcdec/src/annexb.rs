//! Splits an Annex-B H.264 elementary stream into access units.

use bytes::Bytes;

/// The start code prepended to every NAL unit.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// ITU H.264 Table 7-1, NAL unit type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum NalType {
	Unspecified = 0,
	Slice = 1,
	SliceA = 2,
	SliceB = 3,
	SliceC = 4,
	IdrSlice = 5,
	Sei = 6,
	Sps = 7,
	Pps = 8,
	Aud = 9,
	EndOfSequence = 10,
	EndOfStream = 11,
	Filler = 12,
	SpsExt = 13,
	Prefix = 14,
	SubsetSps = 15,
	Dps = 16,
	// 17 -> 18 reserved
	AuxSlice = 19,
	SliceExt = 20,
	SliceExtDepth = 21,
}

impl NalType {
	/// The type of a NAL unit, read from the low 5 bits of its header byte.
	pub fn of(nal: &[u8]) -> Option<Self> {
		let header = nal.first()?;
		Self::try_from(header & 0x1f).ok()
	}

	pub fn is_slice(self) -> bool {
		matches!(self, Self::Slice | Self::IdrSlice)
	}
}

/// Returns true if this NAL unit begins a new access unit once a slice has been seen.
fn starts_access_unit(nal: &[u8]) -> bool {
	match NalType::of(nal) {
		Some(NalType::Aud | NalType::Sps | NalType::Pps | NalType::Sei) => true,
		// first_mb_in_slice is the first ue(v) of the slice header; a leading 1 bit encodes zero.
		Some(NalType::Slice | NalType::IdrSlice) => nal.get(1).is_some_and(|b| b & 0x80 != 0),
		_ => false,
	}
}

/// Find the next start code at or after `from`, returning where it begins and where its NAL begins.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
	let offset = data.get(from..)?.windows(3).position(|w| w == [0, 0, 1])?;
	let mut code = from + offset;
	let payload = code + 3;

	// Absorb the leading zero of a 4 byte start code.
	if code > from && data[code - 1] == 0 {
		code -= 1;
	}

	Some((code, payload))
}

/// Iterate over the NAL units of an Annex-B buffer, without their start codes.
///
/// Anything before the first start code is skipped.
pub fn nals(data: &[u8]) -> impl Iterator<Item = &[u8]> {
	let mut next = find_start_code(data, 0);

	std::iter::from_fn(move || {
		let (_, payload) = next?;
		next = find_start_code(data, payload);
		let end = next.map_or(data.len(), |(code, _)| code);
		Some(&data[payload..end])
	})
}

/// An iterator over the access units of an Annex-B buffer.
///
/// Each access unit keeps its start codes and shares memory with the buffer.
pub struct AccessUnits {
	data: Bytes,
	next: Option<(usize, usize)>,
}

impl AccessUnits {
	pub fn new(data: impl Into<Bytes>) -> Self {
		let data = data.into();
		let next = find_start_code(&data, 0);
		Self { data, next }
	}
}

impl Iterator for AccessUnits {
	type Item = Bytes;

	fn next(&mut self) -> Option<Bytes> {
		let (start, _) = self.next?;

		let mut current = self.next;
		let mut has_slice = false;

		while let Some((code, payload)) = current {
			let following = find_start_code(&self.data, payload);
			let end = following.map_or(self.data.len(), |(code, _)| code);
			let nal = &self.data[payload..end];

			if has_slice && starts_access_unit(nal) {
				self.next = current;
				return Some(self.data.slice(start..code));
			}

			has_slice |= NalType::of(nal).is_some_and(NalType::is_slice);
			current = following;
		}

		self.next = None;
		Some(self.data.slice(start..))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SPS: &[u8] = &[0x67, 0x42, 0xc0, 0x1e];
	const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];
	const AUD: &[u8] = &[0x09, 0xf0];
	// first_mb_in_slice = 0
	const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x21];
	const FIRST: &[u8] = &[0x41, 0x9a, 0x02, 0x03];
	// first_mb_in_slice != 0
	const SECOND: &[u8] = &[0x41, 0x20, 0x05, 0x06];

	fn stream(nals: &[&[u8]]) -> Vec<u8> {
		let mut out = Vec::new();
		for (i, nal) in nals.iter().enumerate() {
			// Alternate between 4 and 3 byte start codes.
			out.extend_from_slice(if i % 2 == 0 { &START_CODE[..] } else { &START_CODE[1..] });
			out.extend_from_slice(nal);
		}
		out
	}

	#[test]
	fn test_nal_type() {
		assert_eq!(NalType::of(SPS), Some(NalType::Sps));
		assert_eq!(NalType::of(IDR), Some(NalType::IdrSlice));
		assert_eq!(NalType::of(&[0x71]), None);
		assert_eq!(NalType::of(&[]), None);
	}

	#[test]
	fn test_nals() {
		let data = stream(&[SPS, PPS, IDR]);
		let nals: Vec<_> = nals(&data).collect();
		assert_eq!(nals, vec![SPS, PPS, IDR]);
	}

	#[test]
	fn test_nals_skips_leading_garbage() {
		let mut data = vec![0xff, 0x12];
		data.extend(stream(&[AUD, FIRST]));
		assert_eq!(nals(&data).count(), 2);
	}

	#[test]
	fn test_access_units() {
		let data = stream(&[SPS, PPS, IDR, FIRST, SECOND, AUD, FIRST, SPS, PPS, IDR]);
		let units: Vec<Vec<_>> = AccessUnits::new(data)
			.map(|unit| nals(&unit).map(NalType::of).collect())
			.collect();

		use NalType::*;
		assert_eq!(
			units,
			vec![
				vec![Some(Sps), Some(Pps), Some(IdrSlice)],
				vec![Some(Slice), Some(Slice)],
				vec![Some(Aud), Some(Slice)],
				vec![Some(Sps), Some(Pps), Some(IdrSlice)],
			]
		);
	}

	#[test]
	fn test_access_units_keep_start_codes() {
		let data = Bytes::from(stream(&[IDR, FIRST]));
		let units: Vec<_> = AccessUnits::new(data.clone()).collect();

		assert_eq!(units.len(), 2);
		assert_eq!(&units[0][..4], &START_CODE);
		assert_eq!(&units[1][..3], &START_CODE[1..]);
		assert_eq!(units[0].len() + units[1].len(), data.len());
	}

	#[test]
	fn test_access_units_empty() {
		assert_eq!(AccessUnits::new(Bytes::new()).count(), 0);
		assert_eq!(AccessUnits::new(vec![1u8, 2, 3]).count(), 0);
	}
}
