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

use crate::error::Error;

pub(crate) fn insufficient_data(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
    move |_| Error::insufficient_data(tag)
}

/// Maps a stream failure to an error, keeping the I/O error as the source.
pub(crate) fn stream_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
    move |err| match err.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::insufficient_data(tag).set_source(err),
        _ => Error::io(format!("failed to read {tag}"), err),
    }
}

pub(crate) fn ensure_serial_version_in(expected: &[u8], actual: u8) -> Result<(), Error> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(Error::unsupported_serial_version(expected, actual))
    }
}

pub(crate) fn ensure_preamble_longs_in(expected: &[u8], actual: u8) -> Result<(), Error> {
    if expected.contains(&actual) {
        Ok(())
    } else {
        Err(Error::invalid_preamble_longs(expected, actual))
    }
}

pub(crate) fn ensure_min_bytes(actual: usize, expected: usize) -> Result<(), Error> {
    if actual >= expected {
        Ok(())
    } else {
        Err(Error::insufficient_bytes(expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_ensure_helpers() {
        assert!(ensure_serial_version_in(&[1, 2, 3, 4], 4).is_ok());
        let err = ensure_serial_version_in(&[1, 2, 3, 4], 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedDeserializeData);

        assert!(ensure_preamble_longs_in(&[1, 2], 2).is_ok());
        assert!(ensure_preamble_longs_in(&[1, 2], 3).is_err());

        assert!(ensure_min_bytes(16, 16).is_ok());
        let err = ensure_min_bytes(15, 16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }
}
