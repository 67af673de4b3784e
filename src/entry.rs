// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Directory entries (user directories and file headers) and the file
//! extension blocks that continue a header's data block table.

use crate::adf_blk::{check_ref, expect, expect_zero, word_index, BlockData, BlockType, FieldKind};
use crate::adf_str::{FsComment, FsName};
use crate::adf_time::FsTime;
use crate::check::ErrorKind;
use crate::consts::*;
use crate::error::Result;
use crate::volume::Volume;

type CheckResult = std::result::Result<(), ErrorKind>;

/// A hash table slot must be empty or point to an entry whose name hashes
/// to that slot.
pub fn check_hash_entry(vol: &Volume, bucket: usize, value: u32) -> CheckResult {
    if value == 0 {
        return Ok(());
    }
    check_ref(vol, value, &[BlockType::UserDir, BlockType::FileHeader], false)?;
    match vol.block(value).and_then(|b| b.name()) {
        Some(name) => expect(name.hash_value() == bucket, ErrorKind::HashBucketMismatch),
        None => Err(ErrorKind::RefTypeMismatch),
    }
}

fn data_ref_word(index: usize) -> isize {
    W_FIRST_DATA_REF - index as isize
}

fn table_index(word: isize) -> usize {
    (W_FIRST_DATA_REF - word) as usize
}

fn read_data_ref(data: &BlockData, index: usize) -> u32 {
    if index < MAX_DATA_REFS {
        data.get32(data_ref_word(index))
    } else {
        0
    }
}

/// Appends `nr` to the data block table. Returns false if the table is
/// full.
fn push_data_ref(data: &mut BlockData, nr: u32) -> bool {
    let count = data.get32(2) as usize;
    if count >= MAX_DATA_REFS {
        return false;
    }
    data.set32(data_ref_word(count), nr);
    data.set32(2, count as u32 + 1);
    true
}

fn check_data_table(data: &BlockData, vol: &Volume, word: isize) -> CheckResult {
    let value = data.get32(word);
    if table_index(word) < data.get32(2) as usize {
        check_ref(vol, value, &[BlockType::Data], false)
    } else {
        expect(value == 0, ErrorKind::UnexpectedRef)
    }
}

fn restamp(data: &mut BlockData) {
    data.set32(CHECKSUM_WORD as isize, 0);
    data.update_checksum();
}

fn classify_entry_tail(offset: usize) -> FieldKind {
    if offset == COMMENT_OFFSET {
        return FieldKind::BcplCommentLength;
    }
    if offset == NAME_OFFSET {
        return FieldKind::BcplStringLength;
    }
    match word_index(offset) {
        -48 => FieldKind::Protection,
        -46..=-27 => FieldKind::BcplComment,
        -23 => FieldKind::CreatedDays,
        -22 => FieldKind::CreatedMins,
        -21 => FieldKind::CreatedTicks,
        -20..=-13 => FieldKind::BcplString,
        -4 => FieldKind::NextHashRef,
        -3 => FieldKind::ParentDirRef,
        -2 => FieldKind::ExtensionRef,
        -1 => FieldKind::SubtypeId,
        _ => FieldKind::Unused,
    }
}

macro_rules! entry_accessors {
    ($t:ty) => {
        impl $t {
            pub fn name(&self) -> FsName {
                self.data.name()
            }

            pub fn comment(&self) -> FsComment {
                FsComment::from_bcpl(&self.data.as_bytes()[COMMENT_OFFSET..])
            }

            pub fn set_comment(&mut self, comment: &FsComment) {
                let bytes = self.data.as_bytes_mut();
                bytes[COMMENT_OFFSET..COMMENT_OFFSET + 1 + MAX_COMMENT_LEN].fill(0);
                comment.write(&mut bytes[COMMENT_OFFSET..]);
                restamp(&mut self.data);
            }

            pub fn protection(&self) -> u32 {
                self.data.get32(W_PROTECTION)
            }

            pub fn set_protection(&mut self, value: u32) {
                self.data.set32(W_PROTECTION, value);
                restamp(&mut self.data);
            }

            pub fn creation_date(&self) -> FsTime {
                self.data.time(W_MODIFIED)
            }

            pub fn set_creation_date(&mut self, t: FsTime) {
                self.data.set_time(W_MODIFIED, t);
                restamp(&mut self.data);
            }

            pub fn next_hash_ref(&self) -> u32 {
                self.data.get32(W_NEXT_HASH)
            }

            pub fn set_next_hash_ref(&mut self, value: u32) {
                self.data.set32(W_NEXT_HASH, value);
                restamp(&mut self.data);
            }

            pub fn parent_ref(&self) -> u32 {
                self.data.get32(W_PARENT)
            }

            pub fn update_checksum(&mut self) {
                restamp(&mut self.data);
            }
        }
    };
}

fn new_entry(nr: u32, name: &FsName, parent: u32, subtype: u32) -> BlockData {
    let mut data = BlockData::new();
    data.set32(0, T_HEADER);
    data.set32(1, nr);
    data.set_time(W_MODIFIED, FsTime::now());
    data.set_name(name);
    data.set32(W_PARENT, parent);
    data.set32(W_SUBTYPE, subtype);
    data.update_checksum();
    data
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDirBlock {
    pub nr: u32,
    pub(crate) data: BlockData,
}

entry_accessors!(UserDirBlock);

impl UserDirBlock {
    pub fn new(nr: u32, name: &FsName, parent: u32) -> Self {
        UserDirBlock {
            nr,
            data: new_entry(nr, name, parent, ST_USERDIR),
        }
    }

    pub fn decode(nr: u32, bytes: &[u8]) -> Result<Self> {
        Ok(UserDirBlock {
            nr,
            data: BlockData::from_bytes(bytes)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        restamp(&mut data);
        data.as_bytes().to_vec()
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
            self.data.set32(6 + bucket as isize, value);
            restamp(&mut self.data);
        }
    }

    pub fn classify(&self, offset: usize) -> FieldKind {
        match word_index(offset) {
            0 => FieldKind::TypeId,
            1 => FieldKind::SelfRef,
            5 => FieldKind::Checksum,
            -122..=-51 => FieldKind::HashRef,
            _ => classify_entry_tail(offset),
        }
    }

    pub fn check(&self, offset: usize, vol: &Volume, strict: bool) -> CheckResult {
        let word = word_index(offset);
        let value = self.data.get32(word);

        match word {
            0 => expect(value == T_HEADER, ErrorKind::TypeIdMismatch),
            1 => expect(value == self.nr, ErrorKind::MissingSelfRef),
            2..=4 => expect_zero(&self.data, word, strict),
            5 => expect(value == self.data.checksum(), ErrorKind::ChecksumError),
            -122..=-51 => check_hash_entry(vol, (word + 122) as usize, value),
            -50 | -49 | -47 => expect_zero(&self.data, word, strict),
            -4 => check_ref(vol, value, &[BlockType::UserDir, BlockType::FileHeader], true),
            -3 => check_ref(vol, value, &[BlockType::Root, BlockType::UserDir], false),
            -1 => expect(value == ST_USERDIR, ErrorKind::SubtypeIdMismatch),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeaderBlock {
    pub nr: u32,
    pub(crate) data: BlockData,
}

entry_accessors!(FileHeaderBlock);

impl FileHeaderBlock {
    pub fn new(nr: u32, name: &FsName, parent: u32) -> Self {
        FileHeaderBlock {
            nr,
            data: new_entry(nr, name, parent, ST_FILE),
        }
    }

    pub fn decode(nr: u32, bytes: &[u8]) -> Result<Self> {
        Ok(FileHeaderBlock {
            nr,
            data: BlockData::from_bytes(bytes)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        restamp(&mut data);
        data.as_bytes().to_vec()
    }

    pub fn data_block_count(&self) -> usize {
        self.data.get32(2) as usize
    }

    pub fn first_data_ref(&self) -> u32 {
        self.data.get32(4)
    }

    pub fn data_ref(&self, index: usize) -> u32 {
        read_data_ref(&self.data, index)
    }

    /// The data block numbers recorded in this header, in file order.
    pub fn data_refs(&self) -> Vec<u32> {
        let count = self.data_block_count().min(MAX_DATA_REFS);
        (0..count).map(|i| self.data_ref(i)).collect()
    }

    pub fn add_data_ref(&mut self, nr: u32) -> bool {
        if !push_data_ref(&mut self.data, nr) {
            return false;
        }
        if self.data.get32(4) == 0 {
            self.data.set32(4, nr);
        }
        restamp(&mut self.data);
        true
    }

    pub fn byte_size(&self) -> u32 {
        self.data.get32(W_BYTE_SIZE)
    }

    pub fn set_byte_size(&mut self, size: u32) {
        self.data.set32(W_BYTE_SIZE, size);
        restamp(&mut self.data);
    }

    pub fn next_list_ref(&self) -> u32 {
        self.data.get32(W_EXTENSION)
    }

    pub fn set_next_list_ref(&mut self, value: u32) {
        self.data.set32(W_EXTENSION, value);
        restamp(&mut self.data);
    }

    pub fn classify(&self, offset: usize) -> FieldKind {
        match word_index(offset) {
            0 => FieldKind::TypeId,
            1 => FieldKind::SelfRef,
            2 => FieldKind::DataBlockCount,
            4 => FieldKind::FirstDataRef,
            5 => FieldKind::Checksum,
            -122..=-51 => FieldKind::DataBlockRef,
            -47 => FieldKind::FileSize,
            _ => classify_entry_tail(offset),
        }
    }

    pub fn check(&self, offset: usize, vol: &Volume, strict: bool) -> CheckResult {
        let word = word_index(offset);
        let value = self.data.get32(word);
        let capacity = vol.layout().capacity as u64;

        match word {
            0 => expect(value == T_HEADER, ErrorKind::TypeIdMismatch),
            1 => expect(value == self.nr, ErrorKind::MissingSelfRef),
            2 => expect((value as usize) <= MAX_DATA_REFS, ErrorKind::ValueOutOfRange),
            3 => expect_zero(&self.data, word, strict),
            4 => check_ref(vol, value, &[BlockType::Data], true),
            5 => expect(value == self.data.checksum(), ErrorKind::ChecksumError),
            -122..=-51 => check_data_table(&self.data, vol, word),
            -47 => expect((value as u64) <= capacity * BSIZE as u64, ErrorKind::ValueOutOfRange),
            -4 => check_ref(vol, value, &[BlockType::UserDir, BlockType::FileHeader], true),
            -3 => check_ref(vol, value, &[BlockType::Root, BlockType::UserDir], false),
            -2 => check_ref(vol, value, &[BlockType::FileList], true),
            -1 => expect(value == ST_FILE, ErrorKind::SubtypeIdMismatch),
            _ => Ok(()),
        }
    }
}

/// Continues the data block table of a file once the header is full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListBlock {
    pub nr: u32,
    pub(crate) data: BlockData,
}

impl FileListBlock {
    pub fn new(nr: u32, file_header: u32) -> Self {
        let mut data = BlockData::new();
        data.set32(0, T_LIST);
        data.set32(1, nr);
        data.set32(W_PARENT, file_header);
        data.set32(W_SUBTYPE, ST_FILE);
        data.update_checksum();
        FileListBlock { nr, data }
    }

    pub fn decode(nr: u32, bytes: &[u8]) -> Result<Self> {
        Ok(FileListBlock {
            nr,
            data: BlockData::from_bytes(bytes)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        restamp(&mut data);
        data.as_bytes().to_vec()
    }

    pub fn data_block_count(&self) -> usize {
        self.data.get32(2) as usize
    }

    pub fn data_ref(&self, index: usize) -> u32 {
        read_data_ref(&self.data, index)
    }

    pub fn data_refs(&self) -> Vec<u32> {
        let count = self.data_block_count().min(MAX_DATA_REFS);
        (0..count).map(|i| self.data_ref(i)).collect()
    }

    pub fn add_data_ref(&mut self, nr: u32) -> bool {
        let added = push_data_ref(&mut self.data, nr);
        restamp(&mut self.data);
        added
    }

    pub fn file_header_ref(&self) -> u32 {
        self.data.get32(W_PARENT)
    }

    pub fn next_list_ref(&self) -> u32 {
        self.data.get32(W_EXTENSION)
    }

    pub fn set_next_list_ref(&mut self, value: u32) {
        self.data.set32(W_EXTENSION, value);
        restamp(&mut self.data);
    }

    pub fn classify(&self, offset: usize) -> FieldKind {
        match word_index(offset) {
            0 => FieldKind::TypeId,
            1 => FieldKind::SelfRef,
            2 => FieldKind::DataBlockCount,
            5 => FieldKind::Checksum,
            -122..=-51 => FieldKind::DataBlockRef,
            -3 => FieldKind::FileHeaderRef,
            -2 => FieldKind::ExtensionRef,
            -1 => FieldKind::SubtypeId,
            _ => FieldKind::Unused,
        }
    }

    pub fn check(&self, offset: usize, vol: &Volume, strict: bool) -> CheckResult {
        let word = word_index(offset);
        let value = self.data.get32(word);

        match word {
            0 => expect(value == T_LIST, ErrorKind::TypeIdMismatch),
            1 => expect(value == self.nr, ErrorKind::MissingSelfRef),
            2 => expect((value as usize) <= MAX_DATA_REFS, ErrorKind::ValueOutOfRange),
            3 | 4 => expect_zero(&self.data, word, strict),
            5 => expect(value == self.data.checksum(), ErrorKind::ChecksumError),
            -122..=-51 => check_data_table(&self.data, vol, word),
            -50..=-4 => expect_zero(&self.data, word, strict),
            -3 => check_ref(vol, value, &[BlockType::FileHeader], false),
            -2 => check_ref(vol, value, &[BlockType::FileList], true),
            -1 => expect(value == ST_FILE, ErrorKind::SubtypeIdMismatch),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adf_blk::word_sum;

    #[test]
    fn test_user_dir_layout() {
        let dir = UserDirBlock::new(900, &FsName::new("devs"), 880);
        let bytes = dir.encode();
        assert_eq!(&bytes[4..8], &900u32.to_be_bytes());
        assert_eq!(&bytes[500..504], &880u32.to_be_bytes());
        assert_eq!(&bytes[508..512], &ST_USERDIR.to_be_bytes());
        assert_eq!(dir.name().to_string(), "devs");
        assert_eq!(word_sum(&bytes), 0);
    }

    #[test]
    fn test_data_table_is_reversed() {
        let mut fh = FileHeaderBlock::new(882, &FsName::new("f"), 880);
        assert!(fh.add_data_ref(883));
        assert!(fh.add_data_ref(884));
        let bytes = fh.encode();

        assert_eq!(fh.data_block_count(), 2);
        assert_eq!(fh.first_data_ref(), 883);
        assert_eq!(&bytes[308..312], &883u32.to_be_bytes());
        assert_eq!(&bytes[304..308], &884u32.to_be_bytes());
        assert_eq!(fh.data_refs(), vec![883, 884]);
        assert_eq!(word_sum(&bytes), 0);
    }

    #[test]
    fn test_data_table_capacity() {
        let mut list = FileListBlock::new(10, 9);
        for n in 0..MAX_DATA_REFS as u32 {
            assert!(list.add_data_ref(100 + n));
        }
        assert!(!list.add_data_ref(999));
        assert_eq!(list.data_block_count(), MAX_DATA_REFS);
        assert_eq!(list.data_ref(71), 171);
        assert_eq!(list.file_header_ref(), 9);
    }

    #[test]
    fn test_comment_and_protection() {
        let mut fh = FileHeaderBlock::new(882, &FsName::new("f"), 880);
        fh.set_comment(&FsComment::new("hello"));
        fh.set_protection(PROTECTION_FLAG_ARCHIVE);
        assert_eq!(fh.comment().to_string(), "hello");
        assert_eq!(fh.protection(), PROTECTION_FLAG_ARCHIVE);
        assert_eq!(fh.classify(COMMENT_OFFSET), FieldKind::BcplCommentLength);
        assert_eq!(fh.classify(COMMENT_OFFSET + 4), FieldKind::BcplComment);
        assert_eq!(fh.classify(NAME_OFFSET), FieldKind::BcplStringLength);
        assert_eq!(fh.classify(24), FieldKind::DataBlockRef);
        assert_eq!(word_sum(&fh.encode()), 0);
    }
}
