use crate::pool::AllocError;

/// A list of possible errors that can occur while decoding.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
	/// The decoding engine could not create a context.
	#[error("failed to initialize decoder: {0}")]
	Init(String),

	/// The engine consumed nothing from a non-empty input.
	#[error("decoder made no progress")]
	Stalled,

	/// The output buffer could not be mapped for CPU writes.
	#[error("failed to map output buffer")]
	Map,

	#[error("allocation failed: {0}")]
	Alloc(#[from] AllocError),

	#[error("output buffer too small")]
	BufferTooSmall,

	/// A picture surfaced at a size other than the context's. A new size requires a reset.
	#[error("picture size mismatch: expected {expected:?}, got {actual:?}")]
	SizeMismatch { expected: (u32, u32), actual: (u32, u32) },

	/// A picture surfaced for a frame index nobody is waiting on.
	#[error("unknown frame index={0}")]
	UnknownFrame(u64),

	// The component has signalled an error or end-of-stream.
	#[error("halted")]
	Halted,

	#[error("unsupported")]
	Unsupported,

	#[error("out of memory")]
	NoMemory,

	#[error("bad value: {0}")]
	BadValue(String),

	#[error("engine error: {0}")]
	Engine(String),
}

impl Error {
	/// The result code surfaced to the caller for this error.
	pub fn status(&self) -> Status {
		match self {
			Self::Init(_)
			| Self::Stalled
			| Self::Map
			| Self::BufferTooSmall
			| Self::SizeMismatch { .. }
			| Self::UnknownFrame(_)
			| Self::Engine(_) => Status::Corrupted,
			Self::Alloc(_) | Self::NoMemory => Status::NoMemory,
			Self::Halted | Self::BadValue(_) => Status::BadValue,
			Self::Unsupported => Status::Omitted,
		}
	}

	/// Returns true if the error leaves the component unusable until it is reset.
	pub fn is_fatal(&self) -> bool {
		self.status() == Status::Corrupted
	}
}

/// The result of a component call, as reported on a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
	#[default]
	Ok,
	Corrupted,
	NoMemory,
	BadValue,
	Omitted,
}

impl Status {
	/// A stable integer code for the status.
	pub fn to_code(self) -> i32 {
		match self {
			Self::Ok => 0,
			Self::BadValue => 1,
			Self::NoMemory => 2,
			Self::Omitted => 3,
			Self::Corrupted => 4,
		}
	}

	/// Decode a status from its integer code.
	pub fn from_code(code: i32) -> Self {
		match code {
			0 => Self::Ok,
			1 => Self::BadValue,
			2 => Self::NoMemory,
			3 => Self::Omitted,
			_ => Self::Corrupted,
		}
	}

	pub fn is_ok(self) -> bool {
		self == Self::Ok
	}
}

impl<T> From<&Result<T>> for Status {
	fn from(res: &Result<T>) -> Self {
		match res {
			Ok(_) => Self::Ok,
			Err(err) => err.status(),
		}
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_taxonomy() {
		assert_eq!(Error::Stalled.status(), Status::Corrupted);
		assert_eq!(Error::Map.status(), Status::Corrupted);
		assert_eq!(Error::UnknownFrame(3).status(), Status::Corrupted);
		assert!(
			Error::SizeMismatch {
				expected: (64, 32),
				actual: (32, 16)
			}
			.is_fatal()
		);
		assert_eq!(Error::Alloc(AllocError::Exhausted).status(), Status::NoMemory);
		assert_eq!(Error::NoMemory.status(), Status::NoMemory);
		assert_eq!(Error::Halted.status(), Status::BadValue);
		assert_eq!(Error::Unsupported.status(), Status::Omitted);

		assert!(Error::Init("nope".into()).is_fatal());
		assert!(!Error::Alloc(AllocError::Exhausted).is_fatal());
		assert!(!Error::Unsupported.is_fatal());
	}

	#[test]
	fn test_status_code() {
		for status in [
			Status::Ok,
			Status::Corrupted,
			Status::NoMemory,
			Status::BadValue,
			Status::Omitted,
		] {
			assert_eq!(Status::from_code(status.to_code()), status);
		}

		assert_eq!(Status::from_code(-1), Status::Corrupted);
	}
}
