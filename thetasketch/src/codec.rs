// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::io;
use std::io::Cursor;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;

pub(crate) mod assert;
pub(crate) mod family;

pub(crate) use self::family::Family;

/// A simple wrapper around a `Vec<u8>` for writing little-endian sketch images.
pub(crate) struct SketchBytes {
    bytes: Vec<u8>,
}

impl SketchBytes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write(&mut self, buf: &[u8]) {
        self.bytes.extend_from_slice(buf);
    }

    /// Appends `n` zero bytes.
    pub fn write_zeros(&mut self, n: usize) {
        self.bytes.resize(self.bytes.len() + n, 0);
    }

    /// Appends `n` zero bytes and returns them for in-place filling.
    pub fn reserve_tail(&mut self, n: usize) -> &mut [u8] {
        let start = self.bytes.len();
        self.write_zeros(n);
        &mut self.bytes[start..]
    }

    pub fn write_u8(&mut self, n: u8) {
        self.bytes.push(n);
    }

    pub fn write_u16_le(&mut self, n: u16) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, n: u32) {
        self.write(&n.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, n: u64) {
        self.write(&n.to_le_bytes());
    }
}

/// A read cursor over a serialized sketch image.
pub(crate) struct SketchSlice<'a> {
    slice: Cursor<&'a [u8]>,
}

impl<'a> SketchSlice<'a> {
    pub fn new(slice: &'a [u8]) -> SketchSlice<'a> {
        SketchSlice {
            slice: Cursor::new(slice),
        }
    }

    /// Moves the cursor to an absolute byte offset.
    pub fn seek(&mut self, offset: usize) {
        self.slice.set_position(offset as u64);
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.slice.read_u8()
    }

    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        self.slice.read_u16::<LittleEndian>()
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        self.slice.read_u32::<LittleEndian>()
    }

    pub fn read_u64_le(&mut self) -> io::Result<u64> {
        self.slice.read_u64::<LittleEndian>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_little_endian() {
        let mut bytes = SketchBytes::with_capacity(15);
        bytes.write_u8(3);
        bytes.write_u16_le(0x93cc);
        bytes.write_u32_le(0xdead_beef);
        bytes.write_u64_le(u64::MAX >> 1);
        let bytes = bytes.into_bytes();
        assert_eq!(bytes.len(), 15);
        assert_eq!(&bytes[..3], &[3, 0xcc, 0x93]);

        let mut slice = SketchSlice::new(&bytes);
        assert_eq!(slice.read_u8().unwrap(), 3);
        assert_eq!(slice.read_u16_le().unwrap(), 0x93cc);
        assert_eq!(slice.read_u32_le().unwrap(), 0xdead_beef);
        assert_eq!(slice.read_u64_le().unwrap(), u64::MAX >> 1);
        assert!(slice.read_u8().is_err());
    }

    #[test]
    fn test_reserve_tail_and_seek() {
        let mut bytes = SketchBytes::with_capacity(8);
        bytes.write_u32_le(1);
        bytes.reserve_tail(4).copy_from_slice(&[9, 8, 7, 6]);
        let bytes = bytes.into_bytes();
        assert_eq!(bytes, vec![1, 0, 0, 0, 9, 8, 7, 6]);

        let mut slice = SketchSlice::new(&bytes);
        slice.seek(4);
        assert_eq!(slice.read_u32_le().unwrap(), 0x0607_0809);
    }
}
