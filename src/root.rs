// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use crate::adf_blk::{check_ref, expect, expect_zero, word_index, BlockData, BlockType, FieldKind};
use crate::adf_str::FsName;
use crate::adf_time::FsTime;
use crate::check::ErrorKind;
use crate::consts::*;
use crate::entry::check_hash_entry;
use crate::error::Result;
use crate::volume::Volume;

/// The directory anchor of a volume. The header fields are addressed from
/// the start of the block, everything from the hash table on from its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBlock {
    pub nr: u32,
    pub(crate) data: BlockData,
}

impl RootBlock {
    pub fn new(nr: u32, name: &FsName, bitmap: u32) -> Self {
        let now = FsTime::now();
        let mut data = BlockData::new();
        data.set32(0, T_HEADER);
        data.set32(3, HT_SIZE as u32);
        data.set32(W_BM_FLAG, BM_VALID);
        data.set32(W_BM_PAGES, bitmap);
        data.set_time(W_MODIFIED, now);
        data.set_name(name);
        data.set_time(W_VOLUME_ALTERED, now);
        data.set_time(W_CREATED, now);
        data.set32(W_SUBTYPE, ST_ROOT);
        data.update_checksum();
        RootBlock { nr, data }
    }

    pub fn decode(nr: u32, bytes: &[u8]) -> Result<Self> {
        Ok(RootBlock {
            nr,
            data: BlockData::from_bytes(bytes)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        data.set32(0, T_HEADER);
        data.set32(W_SUBTYPE, ST_ROOT);
        data.update_checksum();
        data.as_bytes().to_vec()
    }

    pub fn update_checksum(&mut self) {
        self.data.set32(CHECKSUM_WORD as isize, 0);
        self.data.update_checksum();
    }

    fn set(&mut self, word: isize, value: u32) {
        self.data.set32(word, value);
        self.update_checksum();
    }

    pub fn name(&self) -> FsName {
        self.data.name()
    }

    pub fn set_name(&mut self, name: &FsName) {
        self.data.set_name(name);
        self.update_checksum();
    }

    pub fn creation_date(&self) -> FsTime {
        self.data.time(W_CREATED)
    }

    pub fn set_creation_date(&mut self, t: FsTime) {
        self.data.set_time(W_CREATED, t);
        self.update_checksum();
    }

    pub fn modification_date(&self) -> FsTime {
        self.data.time(W_MODIFIED)
    }

    pub fn set_modification_date(&mut self, t: FsTime) {
        self.data.set_time(W_MODIFIED, t);
        self.update_checksum();
    }

    pub fn hash_table_size(&self) -> u32 {
        self.data.get32(3)
    }

    pub fn hash_ref(&self, bucket: usize) -> u32 {
        if bucket < HT_SIZE {
            self.data.get32(6 + bucket as isize)
        } else {
            0
        }
    }

    pub fn set_hash_ref(&mut self, bucket: usize, value: u32) {
        if bucket < HT_SIZE {
            self.set(6 + bucket as isize, value);
        }
    }

    pub fn bitmap_ref(&self, page: usize) -> u32 {
        if page < BM_PAGES {
            self.data.get32(W_BM_PAGES + page as isize)
        } else {
            0
        }
    }

    pub fn set_bitmap_ref(&mut self, page: usize, value: u32) {
        if page < BM_PAGES {
            self.set(W_BM_PAGES + page as isize, value);
        }
    }

    pub fn classify(&self, offset: usize) -> FieldKind {
        if offset == NAME_OFFSET {
            return FieldKind::BcplStringLength;
        }
        match word_index(offset) {
            0 => FieldKind::TypeId,
            3 => FieldKind::HashTableSize,
            5 => FieldKind::Checksum,
            -122..=-51 => FieldKind::HashRef,
            -50 => FieldKind::BitmapFlag,
            -49..=-25 => FieldKind::BitmapBlockRef,
            -24 => FieldKind::BitmapExtRef,
            -23 => FieldKind::ModifiedDays,
            -22 => FieldKind::ModifiedMins,
            -21 => FieldKind::ModifiedTicks,
            -20..=-13 => FieldKind::BcplString,
            -10 => FieldKind::VolumeAlteredDays,
            -9 => FieldKind::VolumeAlteredMins,
            -8 => FieldKind::VolumeAlteredTicks,
            -7 => FieldKind::CreatedDays,
            -6 => FieldKind::CreatedMins,
            -5 => FieldKind::CreatedTicks,
            -2 => FieldKind::ExtensionRef,
            -1 => FieldKind::SubtypeId,
            _ => FieldKind::Unused,
        }
    }

    pub fn check(&self, offset: usize, vol: &Volume, strict: bool) -> std::result::Result<(), ErrorKind> {
        let word = word_index(offset);
        let value = self.data.get32(word);

        match word {
            0 => expect(value == T_HEADER, ErrorKind::TypeIdMismatch),
            1 | 2 | 4 => expect_zero(&self.data, word, strict),
            3 => expect(value == HT_SIZE as u32, ErrorKind::FixedValueMismatch),
            5 => expect(value == self.data.checksum(), ErrorKind::ChecksumError),
            -122..=-51 => check_hash_entry(vol, (word + 122) as usize, value),
            -50 => expect(value == BM_VALID, ErrorKind::FixedValueMismatch),
            -49 => check_ref(vol, value, &[BlockType::Bitmap], false),
            -48..=-24 => expect(value == 0, ErrorKind::UnexpectedRef),
            -12 | -11 | -4 | -3 | -2 => expect_zero(&self.data, word, strict),
            -1 => expect(value == ST_ROOT, ErrorKind::SubtypeIdMismatch),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adf_blk::word_sum;

    #[test]
    fn test_new_root_layout() {
        let root = RootBlock::new(880, &FsName::new("Workbench"), 881);
        let bytes = root.encode();

        assert_eq!(&bytes[0..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0x48]);
        assert_eq!(&bytes[312..316], &[0xFF; 4]);
        assert_eq!(&bytes[316..320], &881u32.to_be_bytes());
        assert_eq!(bytes[432], 9);
        assert_eq!(&bytes[433..442], b"Workbench");
        assert_eq!(bytes[511], 1);
        assert_eq!(word_sum(&bytes), 0);
    }

    #[test]
    fn test_timestamps() {
        let mut root = RootBlock::new(880, &FsName::new("T"), 881);
        root.set_creation_date(FsTime::new(1, 2, 3));
        root.set_modification_date(FsTime::new(4, 5, 6));
        let bytes = root.encode();
        assert_eq!(&bytes[484..488], &1u32.to_be_bytes());
        assert_eq!(&bytes[420..424], &4u32.to_be_bytes());
        assert_eq!(root.creation_date(), FsTime::new(1, 2, 3));
        assert_eq!(root.modification_date(), FsTime::new(4, 5, 6));
    }

    #[test]
    fn test_classify() {
        let root = RootBlock::new(880, &FsName::new("T"), 881);
        assert_eq!(root.classify(432), FieldKind::BcplStringLength);
        assert_eq!(root.classify(433), FieldKind::BcplString);
        assert_eq!(root.classify(0), FieldKind::TypeId);
        assert_eq!(root.classify(20), FieldKind::Checksum);
        assert_eq!(root.classify(24), FieldKind::HashRef);
        assert_eq!(root.classify(311), FieldKind::HashRef);
        assert_eq!(root.classify(312), FieldKind::BitmapFlag);
        assert_eq!(root.classify(316), FieldKind::BitmapBlockRef);
        assert_eq!(root.classify(484), FieldKind::CreatedDays);
        assert_eq!(root.classify(511), FieldKind::SubtypeId);
    }

    #[test]
    fn test_hash_table_bounds() {
        let mut root = RootBlock::new(880, &FsName::new("T"), 881);
        root.set_hash_ref(71, 1000);
        root.set_hash_ref(72, 1001);
        assert_eq!(root.hash_ref(71), 1000);
        assert_eq!(root.hash_ref(72), 0);
        assert_eq!(&root.encode()[308..312], &1000u32.to_be_bytes());
    }
}
