// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

pub const BSIZE: usize = 512;
pub const WORDS_PER_BLOCK: usize = BSIZE / 4;

pub const ADF_SECTORS_PER_TRACK: usize = 11;
pub const ADF_NUM_TRACKS: usize = 80 * 2;
pub const ADF_DD_CAPACITY: u32 = 1760;
pub const ADF_HD_CAPACITY: u32 = 3520;

pub const MIN_CAPACITY: u32 = 4;
// One bitmap block maps (BSIZE - 4) * 8 blocks, plus the two boot blocks.
pub const MAX_CAPACITY: u32 = ((BSIZE - 4) * 8 + 2) as u32;

pub const HT_SIZE: usize = 72;
pub const MAX_DATA_REFS: usize = WORDS_PER_BLOCK - 56;
pub const BM_PAGES: usize = 25;
pub const BM_VALID: u32 = 0xFFFF_FFFF;

pub const MAX_NAME_LEN: usize = 30;
pub const MAX_COMMENT_LEN: usize = 79;

// Primary block types (word 0)
pub const T_HEADER: u32 = 2;
pub const T_DATA: u32 = 8;
pub const T_LIST: u32 = 16;

// Secondary block types (word -1)
pub const ST_ROOT: u32 = 1;
pub const ST_USERDIR: u32 = 2;
pub const ST_FILE: u32 = (-3i32) as u32;

pub const CHECKSUM_WORD: usize = 5;
pub const OFS_DATA_HEADER_SIZE: usize = 24;

// Byte offsets of BCPL strings
pub const NAME_OFFSET: usize = BSIZE - 80;
pub const COMMENT_OFFSET: usize = BSIZE - 184;

// Long word indices counted from the end of the block
pub const W_BM_FLAG: isize = -50;
pub const W_BM_PAGES: isize = -49;
pub const W_BM_EXT: isize = -24;
pub const W_PROTECTION: isize = -48;
pub const W_BYTE_SIZE: isize = -47;
pub const W_MODIFIED: isize = -23;
pub const W_NAME: isize = -20;
pub const W_VOLUME_ALTERED: isize = -10;
pub const W_CREATED: isize = -7;
pub const W_NEXT_HASH: isize = -4;
pub const W_PARENT: isize = -3;
pub const W_EXTENSION: isize = -2;
pub const W_SUBTYPE: isize = -1;
pub const W_FIRST_DATA_REF: isize = -51;

pub const DOS_SIGNATURE: &[u8; 3] = b"DOS";

pub const SECONDS_PER_DAY: i64 = 86400;
pub const SECONDS_PER_MINUTE: i64 = 60;
pub const TICKS_PER_SECOND: i64 = 50;
// 1978-01-01 relative to the Unix epoch (2922 days)
pub const AMIGA_EPOCH_OFFSET: i64 = 2922 * SECONDS_PER_DAY;

pub const PROTECTION_FLAG_HIDDEN: u32 = 0x80;
pub const PROTECTION_FLAG_SCRIPT: u32 = 0x40;
pub const PROTECTION_FLAG_PURE: u32 = 0x20;
pub const PROTECTION_FLAG_ARCHIVE: u32 = 0x10;
pub const PROTECTION_FLAG_READ: u32 = 0x08;
pub const PROTECTION_FLAG_WRITE: u32 = 0x04;
pub const PROTECTION_FLAG_EXECUTE: u32 = 0x02;
pub const PROTECTION_FLAG_DELETE: u32 = 0x01;

// Safety net for corrupted hash and list chains
pub const SEARCH_LIMIT: usize = 255;
