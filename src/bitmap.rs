// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! The allocation bitmap. A set bit marks a free block. Boot blocks are not
//! mapped, so the bit for block `n` lives at position `n - 2`.

use crate::adf_blk::{checksum, expect, Block, BlockData, FieldKind};
use crate::check::{ErrorKind, Issue};
use crate::consts::BSIZE;
use crate::error::Result;
use byteorder::{BigEndian, ByteOrder};

const MAP_OFFSET: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapBlock {
    pub nr: u32,
    capacity: u32,
    pub(crate) data: BlockData,
}

/// Byte and bit holding the allocation state of block `n`. Bytes are
/// stored in big-endian long words, so the byte order is reversed inside
/// each group of four.
fn locate(n: u32) -> (usize, u8) {
    let i = (n - 2) as usize;
    let byte = i / 8;
    let permuted = byte ^ 3;
    (MAP_OFFSET + permuted, 1 << (i % 8))
}

impl BitmapBlock {
    /// A bitmap with every block from 2 on marked free.
    pub fn new(nr: u32, capacity: u32) -> Self {
        let mut bm = BitmapBlock {
            nr,
            capacity,
            data: BlockData::new(),
        };
        for n in 2..capacity {
            let (byte, mask) = locate(n);
            bm.data.as_bytes_mut()[byte] |= mask;
        }
        bm.update_checksum();
        bm
    }

    pub fn decode(nr: u32, bytes: &[u8], capacity: u32) -> Result<Self> {
        Ok(BitmapBlock {
            nr,
            capacity,
            data: BlockData::from_bytes(bytes)?,
        })
    }

    pub fn write(&self) -> Vec<u8> {
        let mut bytes = self.data.as_bytes().to_vec();
        let sum = checksum(&bytes, 0);
        BigEndian::write_u32(&mut bytes[0..4], sum);
        bytes
    }

    pub fn checksum(&self) -> u32 {
        checksum(self.data.as_bytes(), 0)
    }

    pub fn stored_checksum(&self) -> u32 {
        self.data.get32(0)
    }

    fn update_checksum(&mut self) {
        let sum = self.checksum();
        self.data.set32(0, sum);
    }

    /// Boot blocks and block numbers past the end of the volume always
    /// read as allocated.
    pub fn is_allocated(&self, n: u32) -> bool {
        if n < 2 || n >= self.capacity {
            return true;
        }
        let (byte, mask) = locate(n);
        self.data.as_bytes()[byte] & mask == 0
    }

    pub fn alloc(&mut self, n: u32, allocate: bool) {
        if n < 2 || n >= self.capacity {
            return;
        }
        let (byte, mask) = locate(n);
        let bytes = self.data.as_bytes_mut();
        if allocate {
            bytes[byte] &= !mask;
        } else {
            bytes[byte] |= mask;
        }
        self.update_checksum();
    }

    pub fn dealloc(&mut self) {
        for n in 2..self.capacity {
            self.alloc(n, false);
        }
    }

    pub fn free_count(&self) -> usize {
        (2..self.capacity).filter(|&n| !self.is_allocated(n)).count()
    }

    pub fn classify(&self, offset: usize) -> FieldKind {
        match offset {
            0..=3 => FieldKind::Checksum,
            o if o < BSIZE => FieldKind::BitmapData,
            _ => FieldKind::Unused,
        }
    }

    pub fn check_field(&self, offset: usize) -> std::result::Result<(), ErrorKind> {
        match offset {
            0..=3 => expect(self.stored_checksum() == self.checksum(), ErrorKind::ChecksumError),
            _ => Ok(()),
        }
    }

    /// Compares the recorded allocation state with the actual block
    /// contents.
    pub fn check(&self, blocks: &[Block]) -> Vec<Issue> {
        let mut issues = Vec::new();
        for block in blocks.iter().skip(2) {
            let nr = block.nr();
            let kind = match (self.is_allocated(nr), block.is_empty()) {
                (true, true) => ErrorKind::AllocatedButEmpty,
                (false, false) => ErrorKind::FreeButOccupied,
                _ => continue,
            };
            issues.push(Issue {
                block: nr,
                offset: 0,
                kind,
            });
        }
        issues
    }
}
