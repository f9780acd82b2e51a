//! Copies a tightly packed I420 picture into a strided destination.

use crate::{Error, Result};

/// Copy an I420 picture of `width`x`height` into `dst`, whose rows are `stride` bytes apart.
///
/// The source holds the Y plane followed by the U and V planes at half resolution, without padding.
/// The destination holds Y rows at multiples of `stride`, then U and V rows at multiples of `stride / 2`.
/// Nothing outside the visible rows of each plane is read or written.
pub fn copy_i420(dst: &mut [u8], stride: usize, src: &[u8], width: usize, height: usize) -> Result<()> {
	if width == 0 || height == 0 {
		return Ok(());
	}

	if stride < width {
		return Err(Error::BufferTooSmall);
	}

	let chroma_width = width / 2;
	let chroma_height = height / 2;
	let chroma_stride = stride / 2;

	let src_luma = width * height;
	let src_chroma = chroma_width * chroma_height;
	if src.len() < src_luma + 2 * src_chroma {
		return Err(Error::Engine(format!(
			"picture too small: {} bytes for {width}x{height}",
			src.len()
		)));
	}

	let dst_luma = stride * height;
	let dst_chroma = dst_luma / 4;
	if dst.len() < required(stride, width, height) {
		return Err(Error::BufferTooSmall);
	}

	for row in 0..height {
		let s = row * width;
		let d = row * stride;
		dst[d..d + width].copy_from_slice(&src[s..s + width]);
	}

	for (plane, (src_base, dst_base)) in [(src_luma, dst_luma), (src_luma + src_chroma, dst_luma + dst_chroma)]
		.into_iter()
		.enumerate()
	{
		tracing::trace!(plane, src_base, dst_base, "copying chroma");

		for row in 0..chroma_height {
			let s = src_base + row * chroma_width;
			let d = dst_base + row * chroma_stride;
			dst[d..d + chroma_width].copy_from_slice(&src[s..s + chroma_width]);
		}
	}

	Ok(())
}

/// The minimum destination size for a copy, ending at the last byte of the last V row.
pub fn required(stride: usize, width: usize, height: usize) -> usize {
	let luma = stride * height;
	let chroma_rows = height / 2;
	if chroma_rows == 0 {
		return (height - 1) * stride + width;
	}

	luma + luma / 4 + (chroma_rows - 1) * (stride / 2) + width / 2
}
