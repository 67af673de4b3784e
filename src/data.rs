// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use crate::adf_blk::{check_ref, expect, BlockData, BlockType, Dialect, FieldKind};
use crate::check::ErrorKind;
use crate::consts::*;
use crate::error::Result;
use crate::volume::Volume;
use byteorder::{BigEndian, ByteOrder};

type CheckResult = std::result::Result<(), ErrorKind>;

/// Checksum of the boot area (blocks 0 and 1). Carries out of bit 31 are
/// added back in and the stored checksum word is skipped.
pub fn boot_checksum(boot: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    for (i, word) in boot.chunks_exact(4).enumerate() {
        if i == 1 {
            continue;
        }
        let (new_sum, carry) = sum.overflowing_add(BigEndian::read_u32(word));
        sum = new_sum.wrapping_add(carry as u32);
    }
    !sum
}

/// One of the two boot blocks. Only block 0 carries the DOS signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootBlock {
    pub nr: u32,
    pub(crate) data: BlockData,
}

impl BootBlock {
    pub fn new(nr: u32, dialect: Dialect) -> Self {
        let mut data = BlockData::new();
        if nr == 0 {
            let bytes = data.as_bytes_mut();
            bytes[0..3].copy_from_slice(DOS_SIGNATURE);
            bytes[3] = dialect.dos_byte();
        }
        BootBlock { nr, data }
    }

    pub fn decode(nr: u32, bytes: &[u8]) -> Result<Self> {
        Ok(BootBlock {
            nr,
            data: BlockData::from_bytes(bytes)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        self.data.as_bytes().to_vec()
    }

    pub fn has_boot_code(&self) -> bool {
        self.nr == 0 && self.data.as_bytes()[12] != 0
    }

    pub fn classify(&self, offset: usize) -> FieldKind {
        match (self.nr, offset) {
            (0, 0..=3) => FieldKind::DosType,
            (0, 4..=7) => FieldKind::Checksum,
            (0, 8..=11) => FieldKind::Unused,
            (_, o) if o < BSIZE => FieldKind::BootCode,
            _ => FieldKind::Unused,
        }
    }

    pub fn check(&self, offset: usize, vol: &Volume) -> CheckResult {
        if self.nr != 0 {
            return Ok(());
        }
        let bytes = self.data.as_bytes();
        match offset {
            0 => expect(
                &bytes[0..3] == DOS_SIGNATURE && bytes[3] == vol.layout().dialect.dos_byte(),
                ErrorKind::FixedValueMismatch,
            ),
            4 if self.has_boot_code() => {
                expect(self.data.get32(1) == vol.boot_checksum(), ErrorKind::ChecksumError)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfsDataBlock {
    pub nr: u32,
    pub(crate) data: BlockData,
}

impl OfsDataBlock {
    /// `seq` counts from 1. Payload beyond one block's worth is dropped.
    pub fn new(nr: u32, file_header: u32, seq: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(BSIZE - OFS_DATA_HEADER_SIZE);
        let mut data = BlockData::new();
        data.set32(0, T_DATA);
        data.set32(1, file_header);
        data.set32(2, seq);
        data.set32(3, len as u32);
        data.as_bytes_mut()[OFS_DATA_HEADER_SIZE..OFS_DATA_HEADER_SIZE + len]
            .copy_from_slice(&payload[..len]);
        data.update_checksum();
        OfsDataBlock { nr, data }
    }

    pub fn file_header_ref(&self) -> u32 {
        self.data.get32(1)
    }

    pub fn seq_num(&self) -> u32 {
        self.data.get32(2)
    }

    pub fn data_size(&self) -> usize {
        (self.data.get32(3) as usize).min(BSIZE - OFS_DATA_HEADER_SIZE)
    }

    pub fn next_data_ref(&self) -> u32 {
        self.data.get32(4)
    }

    pub fn set_next_data_ref(&mut self, value: u32) {
        self.data.set32(4, value);
        self.data.set32(CHECKSUM_WORD as isize, 0);
        self.data.update_checksum();
    }

    pub fn payload(&self) -> &[u8] {
        &self.data.as_bytes()[OFS_DATA_HEADER_SIZE..OFS_DATA_HEADER_SIZE + self.data_size()]
    }

    fn classify(&self, offset: usize) -> FieldKind {
        match offset / 4 {
            0 => FieldKind::TypeId,
            1 => FieldKind::FileHeaderRef,
            2 => FieldKind::DataBlockNumber,
            3 => FieldKind::DataByteCount,
            4 => FieldKind::NextDataRef,
            5 => FieldKind::Checksum,
            w if w < WORDS_PER_BLOCK => FieldKind::Data,
            _ => FieldKind::Unused,
        }
    }

    fn check(&self, offset: usize, vol: &Volume) -> CheckResult {
        let word = offset / 4;
        if word >= OFS_DATA_HEADER_SIZE / 4 {
            return Ok(());
        }
        let value = self.data.get32(word as isize);
        match word {
            0 => expect(value == T_DATA, ErrorKind::TypeIdMismatch),
            1 => check_ref(vol, value, &[BlockType::FileHeader], false),
            2 => expect(value >= 1, ErrorKind::ValueOutOfRange),
            3 => expect(
                (value as usize) <= BSIZE - OFS_DATA_HEADER_SIZE,
                ErrorKind::ValueOutOfRange,
            ),
            4 => check_ref(vol, value, &[BlockType::Data], true),
            _ => expect(value == self.data.checksum(), ErrorKind::ChecksumError),
        }
    }
}

/// FFS data blocks are pure payload without any header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfsDataBlock {
    pub nr: u32,
    pub(crate) data: BlockData,
}

impl FfsDataBlock {
    pub fn new(nr: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(BSIZE);
        let mut data = BlockData::new();
        data.as_bytes_mut()[..len].copy_from_slice(&payload[..len]);
        FfsDataBlock { nr, data }
    }

    pub fn payload(&self) -> &[u8] {
        self.data.as_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataBlock {
    Ofs(OfsDataBlock),
    Ffs(FfsDataBlock),
}

impl DataBlock {
    pub fn decode_ofs(nr: u32, bytes: &[u8]) -> Result<Self> {
        Ok(DataBlock::Ofs(OfsDataBlock {
            nr,
            data: BlockData::from_bytes(bytes)?,
        }))
    }

    pub fn decode_ffs(nr: u32, bytes: &[u8]) -> Result<Self> {
        Ok(DataBlock::Ffs(FfsDataBlock {
            nr,
            data: BlockData::from_bytes(bytes)?,
        }))
    }

    pub fn nr(&self) -> u32 {
        match self {
            DataBlock::Ofs(b) => b.nr,
            DataBlock::Ffs(b) => b.nr,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            DataBlock::Ofs(b) => {
                let mut data = b.data.clone();
                data.set32(CHECKSUM_WORD as isize, 0);
                data.update_checksum();
                data.as_bytes().to_vec()
            }
            DataBlock::Ffs(b) => b.data.as_bytes().to_vec(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            DataBlock::Ofs(b) => b.payload(),
            DataBlock::Ffs(b) => b.payload(),
        }
    }

    /// Only OFS data blocks are chained. FFS blocks report 0.
    pub fn next_data_ref(&self) -> u32 {
        match self {
            DataBlock::Ofs(b) => b.next_data_ref(),
            DataBlock::Ffs(_) => 0,
        }
    }

    pub fn set_next_data_ref(&mut self, value: u32) {
        if let DataBlock::Ofs(b) = self {
            b.set_next_data_ref(value);
        }
    }

    pub fn classify(&self, offset: usize) -> FieldKind {
        match self {
            DataBlock::Ofs(b) => b.classify(offset),
            DataBlock::Ffs(_) if offset < BSIZE => FieldKind::Data,
            DataBlock::Ffs(_) => FieldKind::Unused,
        }
    }

    pub fn check(&self, offset: usize, vol: &Volume, _strict: bool) -> CheckResult {
        match self {
            DataBlock::Ofs(b) => b.check(offset, vol),
            DataBlock::Ffs(_) => Ok(()),
        }
    }
}

/// A block without content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyBlock {
    pub nr: u32,
}

impl EmptyBlock {
    pub fn new(nr: u32) -> Self {
        EmptyBlock { nr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adf_blk::word_sum;

    #[test]
    fn test_boot_block_signature() {
        let boot = BootBlock::new(0, Dialect::Ffs);
        assert_eq!(&boot.encode()[0..4], b"DOS\x01");
        assert!(!boot.has_boot_code());
        assert_eq!(boot.classify(0), FieldKind::DosType);
        assert_eq!(boot.classify(12), FieldKind::BootCode);

        let second = BootBlock::new(1, Dialect::Ffs);
        assert!(second.encode().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_boot_checksum_carry() {
        let mut boot = vec![0u8; 2 * BSIZE];
        boot[0..4].copy_from_slice(&[0xFF; 4]);
        boot[8..12].copy_from_slice(&[0, 0, 0, 2]);
        // 0xFFFFFFFF + 2 wraps to 1, plus the carry gives 2
        assert_eq!(boot_checksum(&boot), !2u32);

        // the checksum word itself does not count
        boot[4..8].copy_from_slice(&[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(boot_checksum(&boot), !2u32);
    }

    #[test]
    fn test_ofs_data_block() {
        let block = OfsDataBlock::new(900, 882, 1, b"hello");
        let bytes = DataBlock::Ofs(block.clone()).encode();
        assert_eq!(&bytes[0..4], &T_DATA.to_be_bytes());
        assert_eq!(&bytes[4..8], &882u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &5u32.to_be_bytes());
        assert_eq!(&bytes[24..29], b"hello");
        assert_eq!(block.payload(), b"hello");
        assert_eq!(word_sum(&bytes), 0);
        assert_eq!(block.classify(0), FieldKind::TypeId);
        assert_eq!(block.classify(24), FieldKind::Data);
    }

    #[test]
    fn test_ofs_payload_is_clamped() {
        let block = OfsDataBlock::new(900, 882, 1, &[7u8; 600]);
        assert_eq!(block.data_size(), BSIZE - OFS_DATA_HEADER_SIZE);
    }

    #[test]
    fn test_ffs_data_block() {
        let block = DataBlock::Ffs(FfsDataBlock::new(900, b"abc"));
        let bytes = block.encode();
        assert_eq!(&bytes[0..3], b"abc");
        assert_eq!(bytes.len(), BSIZE);
        assert_eq!(block.next_data_ref(), 0);
        assert_eq!(block.classify(0), FieldKind::Data);
    }
}
