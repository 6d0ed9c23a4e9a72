// Copyright (c) 2024-present, talus-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub const MAGIC_BYTES: &[u8; 3] = b"LSM";

/// Disk format version
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Version {
    /// Initial version
    V0,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}

impl From<Version> for u16 {
    fn from(value: Version) -> Self {
        match value {
            Version::V0 => 0,
        }
    }
}

impl TryFrom<u16> for Version {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::V0),
            _ => Err(()),
        }
    }
}

impl Version {
    /// Size of the file header in bytes
    #[must_use]
    pub const fn len() -> u8 {
        5
    }

    /// Parses a file header, consisting of the magic bytes
    /// and the format version
    #[must_use]
    pub fn parse_file_header(bytes: &[u8]) -> Option<Self> {
        let first_three = bytes.get(0..3)?;

        if first_three == MAGIC_BYTES {
            let next_two = bytes.get(3..5)?;

            let mut bytes = [0; 2];
            bytes.copy_from_slice(next_two);
            let value = u16::from_be_bytes(bytes);

            value.try_into().ok()
        } else {
            None
        }
    }

    /// Writes the file header
    pub fn write_file_header<W: Write>(self, writer: &mut W) -> std::io::Result<usize> {
        writer.write_all(MAGIC_BYTES)?;
        writer.write_u16::<BigEndian>(u16::from(self))?;
        Ok(Self::len() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn version_round_trip() -> crate::Result<()> {
        let mut bytes = vec![];
        Version::V0.write_file_header(&mut bytes)?;
        assert_eq!(bytes, &[b'L', b'S', b'M', 0, 0]);

        let version = Version::parse_file_header(&bytes);
        assert_eq!(Some(Version::V0), version);

        Ok(())
    }

    #[test]
    fn version_unknown() {
        assert!(Version::parse_file_header(b"LSM\xFF\xFF").is_none());
        assert!(Version::parse_file_header(b"hello").is_none());
        assert!(Version::parse_file_header(b"LS").is_none());
    }
}
