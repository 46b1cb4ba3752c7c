// Copyright 2023 the taproot developers.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Bounded read and write cursors over caller-owned byte regions.
//!
//! These are the only building blocks the query path uses to consume
//! received datagrams and to produce the response head. Neither type
//! owns its storage, and neither allocates: the [`ReadBuffer`] borrows
//! the received message, and the [`WriteBuffer`] borrows a fixed
//! buffer owned by the caller (in practice, a
//! [`Context`](crate::server::Context)).
//!
//! All multi-octet integers in DNS messages are big-endian on the
//! wire; the accessors here convert explicitly.

use std::fmt;
use std::ops::Index;

////////////////////////////////////////////////////////////////////////
// READ BUFFERS                                                       //
////////////////////////////////////////////////////////////////////////

/// A read cursor over a borrowed byte region.
///
/// Reads advance an internal position and fail with [`OutOfBounds`]
/// when they would pass the end of the region. Absolute indexing (via
/// [`Index`]) is also provided, since response assembly must reach
/// back to the question section after the cursor has moved past it.
#[derive(Debug)]
pub struct ReadBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ReadBuffer<'a> {
    /// Creates a new `ReadBuffer` over `octets`, with the position at
    /// the start of the region.
    pub fn new(octets: &'a [u8]) -> Self {
        Self { octets, position: 0 }
    }

    /// Returns the current position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of octets left to read.
    pub fn available(&self) -> usize {
        self.octets.len() - self.position
    }

    /// Reads a single octet.
    pub fn read_u8(&mut self) -> Result<u8> {
        let octet = *self.octets.get(self.position).ok_or(OutOfBounds)?;
        self.position += 1;
        Ok(octet)
    }

    /// Reads a big-endian 16-bit integer.
    pub fn read_u16(&mut self) -> Result<u16> {
        let octets = self.read_slice(2)?;
        Ok(u16::from_be_bytes([octets[0], octets[1]]))
    }

    /// Reads `n` octets, returning them as a borrowed slice.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(n).ok_or(OutOfBounds)?;
        let slice = self.octets.get(self.position..end).ok_or(OutOfBounds)?;
        self.position = end;
        Ok(slice)
    }

    /// Advances the position by `n` octets without returning them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_slice(n).and(Ok(()))
    }
}

/// Absolute (position-independent) access to the underlying region.
impl Index<usize> for ReadBuffer<'_> {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        &self.octets[index]
    }
}

////////////////////////////////////////////////////////////////////////
// WRITE BUFFERS                                                      //
////////////////////////////////////////////////////////////////////////

/// A write cursor over a borrowed, mutable byte region.
///
/// Writes advance an internal position and fail with [`Overflow`] when
/// the region is exhausted. [`WriteBuffer::reset`] rewinds the cursor
/// so the region can be reused for the next message.
#[derive(Debug)]
pub struct WriteBuffer<'a> {
    octets: &'a mut [u8],
    used: usize,
}

impl<'a> WriteBuffer<'a> {
    /// Creates a new `WriteBuffer` over `octets`, with the position at
    /// the start of the region.
    pub fn new(octets: &'a mut [u8]) -> Self {
        Self { octets, used: 0 }
    }

    /// Returns the number of octets written so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Returns the number of octets still available.
    pub fn remaining(&self) -> usize {
        self.octets.len() - self.used
    }

    /// Rewinds the cursor to the start of the region.
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Writes a single octet.
    pub fn write_u8(&mut self, value: u8) -> Result<(), Overflow> {
        self.write_slice(&[value])
    }

    /// Writes a 16-bit integer in big-endian byte order.
    pub fn write_u16(&mut self, value: u16) -> Result<(), Overflow> {
        self.write_slice(&value.to_be_bytes())
    }

    /// Writes a slice of octets.
    pub fn write_slice(&mut self, octets: &[u8]) -> Result<(), Overflow> {
        let end = self.used.checked_add(octets.len()).ok_or(Overflow)?;
        self.octets
            .get_mut(self.used..end)
            .ok_or(Overflow)?
            .copy_from_slice(octets);
        self.used = end;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a read would pass the end of the region.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct OutOfBounds;

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("read beyond the end of the buffer")
    }
}

impl std::error::Error for OutOfBounds {}

/// An error signaling that a write would pass the end of the region.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Overflow;

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("write beyond the end of the buffer")
    }
}

impl std::error::Error for Overflow {}

/// The type returned by fallible [`ReadBuffer`] methods.
pub type Result<T, E = OutOfBounds> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_buffer_works() {
        let mut buffer = ReadBuffer::new(b"\x12\x34\x56abcd");
        assert_eq!(buffer.available(), 8);
        assert_eq!(buffer.read_u16(), Ok(0x1234));
        assert_eq!(buffer.read_u8(), Ok(0x56));
        assert_eq!(buffer.position(), 3);
        assert_eq!(buffer.read_slice(4), Ok(b"abcd".as_slice()));
        assert_eq!(buffer.available(), 1);
        assert_eq!(buffer.read_u16(), Err(OutOfBounds));
        assert_eq!(buffer.position(), 7);
    }

    #[test]
    fn read_buffer_fails_atomically() {
        let mut buffer = ReadBuffer::new(b"\x01\x02");
        assert_eq!(buffer.read_slice(3), Err(OutOfBounds));
        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.read_u16(), Ok(0x0102));
    }

    #[test]
    fn read_buffer_indexing_is_absolute() {
        let mut buffer = ReadBuffer::new(b"\x0a\x0b\x0c");
        buffer.skip(2).unwrap();
        assert_eq!(buffer[0], 0x0a);
        assert_eq!(buffer[2], 0x0c);
    }

    #[test]
    fn skip_rejects_overrun() {
        let mut buffer = ReadBuffer::new(b"\x00\x00");
        assert_eq!(buffer.skip(3), Err(OutOfBounds));
        assert_eq!(buffer.skip(2), Ok(()));
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn write_buffer_works() {
        let mut region = [0; 8];
        let mut buffer = WriteBuffer::new(&mut region);
        buffer.write_u16(0xabcd).unwrap();
        buffer.write_u8(0xef).unwrap();
        buffer.write_slice(b"xyz").unwrap();
        assert_eq!(buffer.used(), 6);
        assert_eq!(buffer.remaining(), 2);
        assert_eq!(&region[..6], b"\xab\xcd\xefxyz");
    }

    #[test]
    fn write_buffer_rejects_overflow() {
        let mut region = [0; 2];
        let mut buffer = WriteBuffer::new(&mut region);
        assert_eq!(buffer.write_slice(b"abc"), Err(Overflow));
        assert_eq!(buffer.used(), 0);
        buffer.write_u16(0x0102).unwrap();
        assert_eq!(buffer.write_u8(3), Err(Overflow));
    }

    #[test]
    fn write_buffer_reset_rewinds() {
        let mut region = [0; 4];
        let mut buffer = WriteBuffer::new(&mut region);
        buffer.write_u16(0x1122).unwrap();
        buffer.reset();
        assert_eq!(buffer.used(), 0);
        buffer.write_u16(0x3344).unwrap();
        assert_eq!(&region[..2], b"\x33\x44");
    }
}
