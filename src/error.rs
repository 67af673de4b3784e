// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("format mismatch: {0}")]
    FormatMismatch(String),
    #[error("checksum error in block {block}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumError { block: u32, stored: u32, computed: u32 },
    #[error("capacity exceeded: {required} blocks required, {available} available")]
    CapacityExceeded { required: usize, available: usize },
    #[error("invalid block number {0}")]
    InvalidBlockNumber(u32),
    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),
    #[error("block {0} is reserved")]
    ReservedBlock(u32),
    #[error("'{0}' not found")]
    NotFound(String),
    #[error("'{0}' already exists")]
    AlreadyExists(String),
    #[error("block {0} is not a directory")]
    NotADirectory(u32),
    #[error("block {0} is not a file")]
    NotAFile(u32),
    #[error("host directory '{0}' is not empty")]
    DirectoryNotEmpty(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
