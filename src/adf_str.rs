// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! BCPL strings as used by AmigaDOS: one length byte followed by the
//! characters, no terminator.

use crate::consts::{HT_SIZE, MAX_COMMENT_LEN, MAX_NAME_LEN};
use std::fmt;

/// Reads a BCPL string starting at `p[0]`, clamped to `limit` characters
/// and to the end of the slice.
pub fn read_bcpl(p: &[u8], limit: usize) -> Vec<u8> {
    let len = p.first().map_or(0, |&l| l as usize).min(limit);
    let end = (1 + len).min(p.len());
    p.get(1..end).map(<[u8]>::to_vec).unwrap_or_default()
}

/// Writes a BCPL string into `p`. The caller guarantees that `p` has room
/// for the length byte plus `s.len()` characters.
pub fn write_bcpl(p: &mut [u8], s: &[u8]) {
    p[0] = s.len() as u8;
    p[1..1 + s.len()].copy_from_slice(s);
}

fn to_upper(c: u8) -> u8 {
    c.to_ascii_uppercase()
}

/// A file, directory or volume name (at most 30 characters).
#[derive(Debug, Clone, Default, Eq)]
pub struct FsName {
    bytes: Vec<u8>,
}

impl FsName {
    pub fn new(name: &str) -> Self {
        let mut bytes: Vec<u8> = name
            .bytes()
            .map(|c| if c == b'/' || c == b':' { b'_' } else { c })
            .collect();
        bytes.truncate(MAX_NAME_LEN);
        FsName { bytes }
    }

    pub fn from_bcpl(p: &[u8]) -> Self {
        FsName {
            bytes: read_bcpl(p, MAX_NAME_LEN),
        }
    }

    pub fn write(&self, p: &mut [u8]) {
        write_bcpl(p, &self.bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// AmigaDOS directory hash, already reduced to a bucket index.
    pub fn hash_value(&self) -> usize {
        let mut hash = self.bytes.len() as u32;
        for &c in &self.bytes {
            hash = (hash.wrapping_mul(13).wrapping_add(to_upper(c) as u32)) & 0x7FF;
        }
        (hash % HT_SIZE as u32) as usize
    }
}

impl PartialEq for FsName {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.len() == other.bytes.len()
            && self
                .bytes
                .iter()
                .zip(other.bytes.iter())
                .all(|(&a, &b)| to_upper(a) == to_upper(b))
    }
}

impl fmt::Display for FsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

/// A file or directory comment (at most 79 characters).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsComment {
    bytes: Vec<u8>,
}

impl FsComment {
    pub fn new(comment: &str) -> Self {
        let mut bytes = comment.as_bytes().to_vec();
        bytes.truncate(MAX_COMMENT_LEN);
        FsComment { bytes }
    }

    pub fn from_bcpl(p: &[u8]) -> Self {
        FsComment {
            bytes: read_bcpl(p, MAX_COMMENT_LEN),
        }
    }

    pub fn write(&self, p: &mut [u8]) {
        write_bcpl(p, &self.bytes);
    }
}

impl fmt::Display for FsComment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_rectified_and_truncated() {
        let name = FsName::new("a/b:c");
        assert_eq!(name.to_string(), "a_b_c");

        let long = FsName::new(&"x".repeat(40));
        assert_eq!(long.len(), MAX_NAME_LEN);
    }

    #[test]
    fn test_names_compare_case_insensitive() {
        assert_eq!(FsName::new("Workbench"), FsName::new("WORKBENCH"));
        assert_ne!(FsName::new("Work"), FsName::new("Workbench"));
        assert_eq!(
            FsName::new("startup-sequence").hash_value(),
            FsName::new("Startup-Sequence").hash_value()
        );
    }

    #[test]
    fn test_hash_value() {
        // h = 1; h = (1 * 13 + 'A') & 0x7ff = 78; 78 % 72 = 6
        assert_eq!(FsName::new("a").hash_value(), 6);
        assert!(FsName::new("s").hash_value() < HT_SIZE);
    }

    #[test]
    fn test_bcpl_round_trip() {
        let mut buf = [0u8; 32];
        FsName::new("Empty").write(&mut buf);
        assert_eq!(buf[0], 5);
        assert_eq!(&buf[1..6], b"Empty");
        assert_eq!(FsName::from_bcpl(&buf).to_string(), "Empty");
    }

    #[test]
    fn test_bcpl_length_is_clamped() {
        let mut buf = [b'z'; 40];
        buf[0] = 0xFF;
        assert_eq!(read_bcpl(&buf, MAX_NAME_LEN).len(), MAX_NAME_LEN);
        assert_eq!(read_bcpl(&buf[..4], MAX_NAME_LEN).len(), 3);
    }
}
