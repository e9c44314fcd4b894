//! Fixed-size relay frame

use std::fmt;

use crate::{
    constants::FRAME_SIZE,
    error::{Error, Result},
};

/// A single relay frame
///
/// Every message exchanged with clients and with the hardware is exactly
/// [`FRAME_SIZE`] bytes. The gateway never looks inside a frame.
///
/// ```text
/// ┌───────────────────────────────────────────────┐
/// │                 opaque payload                │
/// │                   36 bytes                    │
/// └───────────────────────────────────────────────┘
/// ```
///
/// # Examples
///
/// ```
/// use canrelay_core::{Frame, FRAME_SIZE};
///
/// let frame = Frame::new([0xAB; FRAME_SIZE]);
/// assert_eq!(frame.as_bytes().len(), 36);
///
/// // Anything that is not exactly one frame long is rejected
/// assert!(Frame::from_slice(&[1, 2, 3]).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_SIZE]);

impl Frame {
    /// Frame size in bytes
    pub const SIZE: usize = FRAME_SIZE;

    /// Create a frame from an owned byte array
    pub const fn new(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a frame from a slice
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrameLength`] unless the slice is exactly
    /// [`FRAME_SIZE`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; FRAME_SIZE] = bytes.try_into().map_err(|_| Error::InvalidFrameLength {
            expected: FRAME_SIZE,
            actual: bytes.len(),
        })?;

        Ok(Self(array))
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }

    /// Lowercase hex rendering, used in trace logs
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; FRAME_SIZE]> for Frame {
    fn from(bytes: [u8; FRAME_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::from_slice(bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
