// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! The block tagged union and the helpers shared by all block variants.

use crate::adf_str::FsName;
use crate::adf_time::FsTime;
use crate::bitmap::BitmapBlock;
use crate::check::ErrorKind;
use crate::consts::*;
use crate::data::{BootBlock, DataBlock, EmptyBlock};
use crate::entry::{FileHeaderBlock, FileListBlock, UserDirBlock};
use crate::error::{FsError, Result};
use crate::root::RootBlock;
use crate::volume::Volume;
use byteorder::{BigEndian, ByteOrder};
use log::debug;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dialect {
    #[serde(rename = "OFS")]
    Ofs,
    #[serde(rename = "FFS")]
    Ffs,
}

impl Dialect {
    pub fn from_dos_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Dialect::Ofs),
            1 => Ok(Dialect::Ffs),
            2..=7 => Err(FsError::UnsupportedDialect(format!("DOS{}", b))),
            _ => Err(FsError::FormatMismatch(format!("invalid DOS type byte {:#04x}", b))),
        }
    }

    pub fn dos_byte(self) -> u8 {
        match self {
            Dialect::Ofs => 0,
            Dialect::Ffs => 1,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Ofs => write!(f, "OFS"),
            Dialect::Ffs => write!(f, "FFS"),
        }
    }
}

impl FromStr for Dialect {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OFS" => Ok(Dialect::Ofs),
            "FFS" => Ok(Dialect::Ffs),
            other => Err(FsError::UnsupportedDialect(other.to_string())),
        }
    }
}

/// Volume geometry. Every block that needs to know the shape of the volume
/// receives it from here instead of holding a pointer to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub dialect: Dialect,
    pub capacity: u32,
    pub root: u32,
    pub bitmap: u32,
}

impl Layout {
    pub fn new(dialect: Dialect, capacity: u32) -> Result<Self> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity) {
            return Err(FsError::FormatMismatch(format!(
                "capacity {} outside {}..={}",
                capacity, MIN_CAPACITY, MAX_CAPACITY
            )));
        }
        let root = capacity / 2;
        Ok(Layout {
            dialect,
            capacity,
            root,
            bitmap: root + 1,
        })
    }

    pub fn with_bitmap(self, bitmap: u32) -> Result<Self> {
        if !self.is_block_number(bitmap) {
            return Err(FsError::InvalidBlockNumber(bitmap));
        }
        if bitmap < 2 || bitmap == self.root {
            return Err(FsError::ReservedBlock(bitmap));
        }
        Ok(Layout { bitmap, ..self })
    }

    pub fn is_block_number(&self, nr: u32) -> bool {
        nr < self.capacity
    }

    pub fn is_reserved(&self, nr: u32) -> bool {
        nr < 2 || nr == self.root || nr == self.bitmap
    }

    pub fn is_ofs(&self) -> bool {
        self.dialect == Dialect::Ofs
    }

    /// Number of payload bytes a single data block carries.
    pub fn data_bytes_per_block(&self) -> usize {
        match self.dialect {
            Dialect::Ofs => BSIZE - OFS_DATA_HEADER_SIZE,
            Dialect::Ffs => BSIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockType {
    Empty,
    Boot,
    Root,
    Bitmap,
    UserDir,
    FileHeader,
    FileList,
    Data,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Semantic meaning of a byte inside a block, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Unused,
    DosType,
    BootCode,
    TypeId,
    SubtypeId,
    SelfRef,
    HashTableSize,
    DataBlockCount,
    FirstDataRef,
    Checksum,
    HashRef,
    DataBlockRef,
    BitmapFlag,
    BitmapBlockRef,
    BitmapExtRef,
    BitmapData,
    Protection,
    FileSize,
    BcplStringLength,
    BcplString,
    BcplCommentLength,
    BcplComment,
    ModifiedDays,
    ModifiedMins,
    ModifiedTicks,
    VolumeAlteredDays,
    VolumeAlteredMins,
    VolumeAlteredTicks,
    CreatedDays,
    CreatedMins,
    CreatedTicks,
    NextHashRef,
    ParentDirRef,
    ExtensionRef,
    FileHeaderRef,
    DataBlockNumber,
    DataByteCount,
    NextDataRef,
    Data,
}

/// Translates a byte offset into a long word index. Words of the first 24
/// bytes are counted from the start, all others from the end of the block.
pub fn word_index(offset: usize) -> isize {
    let word = (offset / 4) as isize;
    if offset < 24 {
        word
    } else {
        word - WORDS_PER_BLOCK as isize
    }
}

/// Sum-to-zero checksum over big-endian words, skipping `loc`.
pub fn checksum(buf: &[u8], loc: usize) -> u32 {
    let sum = buf
        .chunks_exact(4)
        .enumerate()
        .filter(|&(i, _)| i != loc)
        .fold(0u32, |acc, (_, w)| acc.wrapping_add(BigEndian::read_u32(w)));
    sum.wrapping_neg()
}

/// Wrapping sum of every word of the block, checksum included.
pub fn word_sum(buf: &[u8]) -> u32 {
    buf.chunks_exact(4)
        .fold(0u32, |acc, w| acc.wrapping_add(BigEndian::read_u32(w)))
}

/// Raw block storage with word accessors. Negative word indices address
/// the block from its end.
#[derive(Clone, PartialEq, Eq)]
pub struct BlockData {
    data: Vec<u8>,
}

impl BlockData {
    pub fn new() -> Self {
        BlockData {
            data: vec![0; BSIZE],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != BSIZE {
            return Err(FsError::FormatMismatch(format!(
                "expected {} bytes per block, got {}",
                BSIZE,
                bytes.len()
            )));
        }
        Ok(BlockData {
            data: bytes.to_vec(),
        })
    }

    pub fn addr(word: isize) -> usize {
        let word = if word < 0 {
            word + WORDS_PER_BLOCK as isize
        } else {
            word
        };
        debug_assert!((0..WORDS_PER_BLOCK as isize).contains(&word));
        word as usize * 4
    }

    pub fn get32(&self, word: isize) -> u32 {
        let p = Self::addr(word);
        BigEndian::read_u32(&self.data[p..p + 4])
    }

    pub fn set32(&mut self, word: isize, value: u32) {
        let p = Self::addr(word);
        BigEndian::write_u32(&mut self.data[p..p + 4], value);
    }

    pub fn time(&self, word: isize) -> FsTime {
        FsTime::read(&self.data[Self::addr(word)..])
    }

    pub fn set_time(&mut self, word: isize, t: FsTime) {
        let p = Self::addr(word);
        t.write(&mut self.data[p..p + 12]);
    }

    pub fn name(&self) -> FsName {
        FsName::from_bcpl(&self.data[NAME_OFFSET..])
    }

    pub fn set_name(&mut self, name: &FsName) {
        self.data[NAME_OFFSET..NAME_OFFSET + 1 + MAX_NAME_LEN + 1].fill(0);
        name.write(&mut self.data[NAME_OFFSET..]);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn checksum(&self) -> u32 {
        checksum(&self.data, CHECKSUM_WORD)
    }

    pub fn update_checksum(&mut self) {
        let value = self.checksum();
        self.set32(CHECKSUM_WORD as isize, value);
    }

    pub fn is_zero(&self, word: isize) -> bool {
        self.get32(word) == 0
    }
}

impl Default for BlockData {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockData({} bytes)", self.data.len())
    }
}

/// Validates a block reference against the volume. `allowed` lists the
/// block types the reference may point to.
pub fn check_ref(
    vol: &Volume,
    value: u32,
    allowed: &[BlockType],
    optional: bool,
) -> std::result::Result<(), ErrorKind> {
    if value == 0 {
        return if optional {
            Ok(())
        } else {
            Err(ErrorKind::RefMissing)
        };
    }
    match vol.block_type(value) {
        None => Err(ErrorKind::RefOutOfRange),
        Some(t) if allowed.contains(&t) => Ok(()),
        Some(_) => Err(ErrorKind::RefTypeMismatch),
    }
}

pub fn expect(cond: bool, kind: ErrorKind) -> std::result::Result<(), ErrorKind> {
    if cond {
        Ok(())
    } else {
        Err(kind)
    }
}

pub fn expect_zero(data: &BlockData, word: isize, strict: bool) -> std::result::Result<(), ErrorKind> {
    expect(!strict || data.is_zero(word), ErrorKind::ExpectedZero)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Boot(BootBlock),
    Root(RootBlock),
    Bitmap(BitmapBlock),
    UserDir(UserDirBlock),
    FileHeader(FileHeaderBlock),
    FileList(FileListBlock),
    Data(DataBlock),
    Empty(EmptyBlock),
}

impl Block {
    pub fn empty(nr: u32) -> Self {
        Block::Empty(EmptyBlock::new(nr))
    }

    /// Creates a block from its on-disk image. Boot and bitmap blocks are
    /// identified by position, all others by their type and subtype words.
    pub fn decode(nr: u32, bytes: &[u8], layout: &Layout) -> Result<Block> {
        if bytes.len() != BSIZE {
            return Err(FsError::FormatMismatch(format!(
                "block {}: expected {} bytes, got {}",
                nr,
                BSIZE,
                bytes.len()
            )));
        }
        if nr < 2 {
            return Ok(Block::Boot(BootBlock::decode(nr, bytes)?));
        }
        if nr == layout.bitmap {
            return Ok(Block::Bitmap(BitmapBlock::decode(nr, bytes, layout.capacity)?));
        }

        let type_id = BigEndian::read_u32(&bytes[0..4]);
        let subtype = BigEndian::read_u32(&bytes[BSIZE - 4..]);

        let block = match (type_id, subtype) {
            (T_HEADER, ST_ROOT) => Block::Root(RootBlock::decode(nr, bytes)?),
            (T_HEADER, ST_USERDIR) => Block::UserDir(UserDirBlock::decode(nr, bytes)?),
            (T_HEADER, ST_FILE) => Block::FileHeader(FileHeaderBlock::decode(nr, bytes)?),
            (T_LIST, ST_FILE) => Block::FileList(FileListBlock::decode(nr, bytes)?),
            _ if bytes.iter().all(|&b| b == 0) => Block::empty(nr),
            _ if layout.dialect == Dialect::Ffs => Block::Data(DataBlock::decode_ffs(nr, bytes)?),
            (T_DATA, _) => Block::Data(DataBlock::decode_ofs(nr, bytes)?),
            _ => {
                return Err(FsError::FormatMismatch(format!(
                    "block {}: unrecognized type id {:#x}",
                    nr, type_id
                )))
            }
        };
        debug!("block {} decoded as {}", nr, block.block_type());
        Ok(block)
    }

    /// Produces the on-disk image with a freshly computed checksum.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Block::Boot(b) => b.encode(),
            Block::Root(b) => b.encode(),
            Block::Bitmap(b) => b.write(),
            Block::UserDir(b) => b.encode(),
            Block::FileHeader(b) => b.encode(),
            Block::FileList(b) => b.encode(),
            Block::Data(b) => b.encode(),
            Block::Empty(_) => vec![0; BSIZE],
        }
    }

    pub fn nr(&self) -> u32 {
        match self {
            Block::Boot(b) => b.nr,
            Block::Root(b) => b.nr,
            Block::Bitmap(b) => b.nr,
            Block::UserDir(b) => b.nr,
            Block::FileHeader(b) => b.nr,
            Block::FileList(b) => b.nr,
            Block::Data(b) => b.nr(),
            Block::Empty(b) => b.nr,
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Boot(_) => BlockType::Boot,
            Block::Root(_) => BlockType::Root,
            Block::Bitmap(_) => BlockType::Bitmap,
            Block::UserDir(_) => BlockType::UserDir,
            Block::FileHeader(_) => BlockType::FileHeader,
            Block::FileList(_) => BlockType::FileList,
            Block::Data(_) => BlockType::Data,
            Block::Empty(_) => BlockType::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Block::Empty(_))
    }

    /// Checksum as stored in the block, or `None` for blocks without one.
    pub fn stored_checksum(&self) -> Option<u32> {
        match self {
            Block::Root(b) => Some(b.data.get32(CHECKSUM_WORD as isize)),
            Block::Bitmap(b) => Some(b.stored_checksum()),
            Block::UserDir(b) => Some(b.data.get32(CHECKSUM_WORD as isize)),
            Block::FileHeader(b) => Some(b.data.get32(CHECKSUM_WORD as isize)),
            Block::FileList(b) => Some(b.data.get32(CHECKSUM_WORD as isize)),
            Block::Data(DataBlock::Ofs(b)) => Some(b.data.get32(CHECKSUM_WORD as isize)),
            _ => None,
        }
    }

    /// Fails with `FsError::ChecksumError` if the stored checksum does not
    /// match the block contents.
    pub fn verify_checksum(&self) -> Result<()> {
        match (self.stored_checksum(), self.checksum()) {
            (Some(stored), Some(computed)) if stored != computed => Err(FsError::ChecksumError {
                block: self.nr(),
                stored,
                computed,
            }),
            _ => Ok(()),
        }
    }

    /// The value that makes the block's word sum zero, or `None` for
    /// blocks without a checksum.
    pub fn checksum(&self) -> Option<u32> {
        match self {
            Block::Root(b) => Some(b.data.checksum()),
            Block::Bitmap(b) => Some(b.checksum()),
            Block::UserDir(b) => Some(b.data.checksum()),
            Block::FileHeader(b) => Some(b.data.checksum()),
            Block::FileList(b) => Some(b.data.checksum()),
            Block::Data(DataBlock::Ofs(b)) => Some(b.data.checksum()),
            _ => None,
        }
    }

    /// Offsets past the end of the block are `Unused`.
    pub fn classify(&self, offset: usize) -> FieldKind {
        if offset >= BSIZE {
            return FieldKind::Unused;
        }
        match self {
            Block::Boot(b) => b.classify(offset),
            Block::Root(b) => b.classify(offset),
            Block::Bitmap(b) => b.classify(offset),
            Block::UserDir(b) => b.classify(offset),
            Block::FileHeader(b) => b.classify(offset),
            Block::FileList(b) => b.classify(offset),
            Block::Data(b) => b.classify(offset),
            Block::Empty(_) => FieldKind::Unused,
        }
    }

    /// Validates the long word containing `offset`. Offsets past the end of
    /// the block are `ValueOutOfRange`.
    pub fn check(&self, offset: usize, vol: &Volume, strict: bool) -> std::result::Result<(), ErrorKind> {
        if offset >= BSIZE {
            return Err(ErrorKind::ValueOutOfRange);
        }
        let offset = offset & !0b11;
        match self {
            Block::Boot(b) => b.check(offset, vol),
            Block::Root(b) => b.check(offset, vol, strict),
            Block::Bitmap(b) => b.check_field(offset),
            Block::UserDir(b) => b.check(offset, vol, strict),
            Block::FileHeader(b) => b.check(offset, vol, strict),
            Block::FileList(b) => b.check(offset, vol, strict),
            Block::Data(b) => b.check(offset, vol, strict),
            Block::Empty(_) => Ok(()),
        }
    }

    /// Runs `check` on every long word and returns the failing offsets.
    pub fn check_all(&self, vol: &Volume, strict: bool) -> Vec<(usize, ErrorKind)> {
        if self.is_empty() {
            return Vec::new();
        }
        (0..BSIZE)
            .step_by(4)
            .filter_map(|offset| self.check(offset, vol, strict).err().map(|e| (offset, e)))
            .collect()
    }

    pub fn name(&self) -> Option<FsName> {
        match self {
            Block::Root(b) => Some(b.name()),
            Block::UserDir(b) => Some(b.name()),
            Block::FileHeader(b) => Some(b.name()),
            _ => None,
        }
    }

    pub fn hash_table_size(&self) -> usize {
        match self {
            Block::Root(_) | Block::UserDir(_) => HT_SIZE,
            _ => 0,
        }
    }

    pub fn hash_ref(&self, bucket: usize) -> u32 {
        match self {
            Block::Root(b) => b.hash_ref(bucket),
            Block::UserDir(b) => b.hash_ref(bucket),
            _ => 0,
        }
    }

    pub fn set_hash_ref(&mut self, bucket: usize, value: u32) {
        match self {
            Block::Root(b) => b.set_hash_ref(bucket, value),
            Block::UserDir(b) => b.set_hash_ref(bucket, value),
            _ => {}
        }
    }

    pub fn next_hash_ref(&self) -> u32 {
        match self {
            Block::UserDir(b) => b.next_hash_ref(),
            Block::FileHeader(b) => b.next_hash_ref(),
            _ => 0,
        }
    }

    pub fn set_next_hash_ref(&mut self, value: u32) {
        match self {
            Block::UserDir(b) => b.set_next_hash_ref(value),
            Block::FileHeader(b) => b.set_next_hash_ref(value),
            _ => {}
        }
    }

    pub fn parent_ref(&self) -> u32 {
        match self {
            Block::UserDir(b) => b.parent_ref(),
            Block::FileHeader(b) => b.parent_ref(),
            Block::FileList(b) => b.file_header_ref(),
            _ => 0,
        }
    }

    pub fn creation_date(&self) -> Option<FsTime> {
        match self {
            Block::Root(b) => Some(b.creation_date()),
            Block::UserDir(b) => Some(b.creation_date()),
            Block::FileHeader(b) => Some(b.creation_date()),
            _ => None,
        }
    }

    /// Blocks that can appear in a directory hash table or chain.
    pub fn is_hashable(&self) -> bool {
        matches!(self, Block::UserDir(_) | Block::FileHeader(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new(Dialect::Ofs, ADF_DD_CAPACITY).unwrap()
    }

    #[test]
    fn test_layout() {
        let l = layout();
        assert_eq!(l.root, 880);
        assert_eq!(l.bitmap, 881);
        assert!(l.is_reserved(0) && l.is_reserved(880) && !l.is_reserved(2));
        assert_eq!(l.data_bytes_per_block(), 488);
        assert!(Layout::new(Dialect::Ffs, 3).is_err());
        assert!(Layout::new(Dialect::Ffs, MAX_CAPACITY + 1).is_err());
        assert!(matches!(l.with_bitmap(880), Err(FsError::ReservedBlock(880))));
    }

    #[test]
    fn test_dialect_from_dos_byte() {
        assert_eq!(Dialect::from_dos_byte(1).unwrap(), Dialect::Ffs);
        assert!(matches!(
            Dialect::from_dos_byte(3),
            Err(FsError::UnsupportedDialect(_))
        ));
        assert!(matches!(
            Dialect::from_dos_byte(9),
            Err(FsError::FormatMismatch(_))
        ));
        assert_eq!("ffs".parse::<Dialect>().unwrap(), Dialect::Ffs);
    }

    #[test]
    fn test_word_index() {
        assert_eq!(word_index(0), 0);
        assert_eq!(word_index(20), 5);
        assert_eq!(word_index(24), -122);
        assert_eq!(word_index(432), -20);
        assert_eq!(word_index(433), -20);
        assert_eq!(word_index(508), -1);
    }

    #[test]
    fn test_checksum_makes_sum_zero() {
        let mut data = BlockData::new();
        data.set32(0, T_HEADER);
        data.set32(-1, ST_ROOT);
        data.set32(40, 0xDEAD_BEEF);
        data.update_checksum();
        assert_eq!(word_sum(data.as_bytes()), 0);
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut bytes = vec![0u8; BSIZE];
        bytes[3] = 0x42;
        let err = Block::decode(100, &bytes, &layout()).unwrap_err();
        assert!(matches!(err, FsError::FormatMismatch(_)));

        let ffs = Layout::new(Dialect::Ffs, ADF_DD_CAPACITY).unwrap();
        let block = Block::decode(100, &bytes, &ffs).unwrap();
        assert_eq!(block.block_type(), BlockType::Data);
    }

    #[test]
    fn test_decode_wrong_size() {
        assert!(matches!(
            Block::decode(5, &[0u8; 100], &layout()),
            Err(FsError::FormatMismatch(_))
        ));
    }

    #[test]
    fn test_offsets_past_block_end() {
        let vol = Volume::new(Dialect::Ofs, "Range", ADF_DD_CAPACITY).unwrap();
        for nr in [0, 2, 880, 881] {
            let block = vol.block(nr).unwrap();
            for offset in [BSIZE, BSIZE + 3, 2000, usize::MAX] {
                assert_eq!(block.classify(offset), FieldKind::Unused);
                assert_eq!(
                    block.check(offset, &vol, true),
                    Err(ErrorKind::ValueOutOfRange)
                );
            }
        }
        assert_eq!(vol.classify(880, 512), Some(FieldKind::Unused));
        assert_eq!(vol.classify(880, 508), Some(FieldKind::SubtypeId));
    }

    #[test]
    fn test_verify_checksum() {
        let vol = Volume::new(Dialect::Ofs, "Sum", ADF_DD_CAPACITY).unwrap();
        let mut bytes = vol.block(880).unwrap().encode();
        assert!(vol.block(880).unwrap().verify_checksum().is_ok());

        bytes[100] ^= 0x10;
        let block = Block::decode(880, &bytes, vol.layout()).unwrap();
        match block.verify_checksum() {
            Err(FsError::ChecksumError {
                block: 880,
                stored,
                computed,
            }) => {
                assert_eq!(stored, BigEndian::read_u32(&bytes[20..24]));
                assert_eq!(computed, block.checksum().unwrap());
                assert_ne!(stored, computed);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(vol.block(2).unwrap().verify_checksum().is_ok());
    }

    #[test]
    fn test_decode_by_position() {
        let zeros = vec![0u8; BSIZE];
        let l = layout();
        assert_eq!(Block::decode(2, &zeros, &l).unwrap().block_type(), BlockType::Empty);
        assert_eq!(Block::decode(881, &zeros, &l).unwrap().block_type(), BlockType::Bitmap);
    }
}
