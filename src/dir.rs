// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Directory and file operations. Every operation names its directory by
//! block number; there is no notion of a current directory.

use crate::adf_blk::Block;
use crate::adf_str::FsName;
use crate::adf_time::FsTime;
use crate::consts::*;
use crate::data::{DataBlock, FfsDataBlock, OfsDataBlock};
use crate::entry::{FileHeaderBlock, FileListBlock, UserDirBlock};
use crate::error::{FsError, Result};
use crate::volume::Volume;
use log::debug;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    /// Path relative to the listed directory, components joined by `/`.
    pub path: String,
    pub block: u32,
    pub is_dir: bool,
    pub size: u32,
    pub protection: u32,
    pub created: FsTime,
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dir {
            write!(f, "{:>8}  {}  {}/", "(dir)", self.created, self.path)
        } else {
            write!(f, "{:>8}  {}  {}", self.size, self.created, self.path)
        }
    }
}

impl Volume {
    pub fn is_dir(&self, nr: u32) -> bool {
        matches!(self.block(nr), Some(Block::Root(_)) | Some(Block::UserDir(_)))
    }

    pub fn is_file(&self, nr: u32) -> bool {
        matches!(self.block(nr), Some(Block::FileHeader(_)))
    }

    pub fn required_data_blocks(&self, size: usize) -> usize {
        size.div_ceil(self.layout().data_bytes_per_block())
    }

    pub fn required_list_blocks(&self, size: usize) -> usize {
        let data = self.required_data_blocks(size);
        if data > MAX_DATA_REFS {
            (data - 1) / MAX_DATA_REFS
        } else {
            0
        }
    }

    /// Blocks needed to store a file of `size` bytes, header included.
    pub fn required_blocks(&self, size: usize) -> usize {
        1 + self.required_data_blocks(size) + self.required_list_blocks(size)
    }

    /// Follows the hash chain starting at `nr` and returns its members.
    fn hash_chain(&self, mut nr: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        while nr != 0 && chain.len() < SEARCH_LIMIT && seen.insert(nr) {
            match self.block(nr) {
                Some(b) if b.is_hashable() => {
                    chain.push(nr);
                    nr = b.next_hash_ref();
                }
                _ => break,
            }
        }
        chain
    }

    /// Entries of a directory, bucket by bucket, in chain order.
    pub fn dir_entries(&self, dir: u32) -> Result<Vec<u32>> {
        let block = self
            .block(dir)
            .filter(|_| self.is_dir(dir))
            .ok_or(FsError::NotADirectory(dir))?;
        Ok((0..block.hash_table_size())
            .flat_map(|bucket| self.hash_chain(block.hash_ref(bucket)))
            .collect())
    }

    /// Looks up `name` in directory `dir`, ignoring case.
    pub fn seek(&self, dir: u32, name: &str) -> Option<u32> {
        let name = FsName::new(name);
        let block = self.block(dir).filter(|_| self.is_dir(dir))?;
        self.hash_chain(block.hash_ref(name.hash_value()))
            .into_iter()
            .find(|&nr| self.block(nr).and_then(Block::name).as_ref() == Some(&name))
    }

    /// Resolves a `/` separated path starting at the root directory.
    pub fn resolve(&self, path: &str) -> Result<u32> {
        let mut nr = self.layout().root;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            nr = self
                .seek(nr, component)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        }
        Ok(nr)
    }

    /// Absolute path of a block, without the volume name. The root
    /// directory yields an empty string.
    pub fn path_of(&self, nr: u32) -> String {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = nr;
        while cur != self.layout().root && seen.insert(cur) {
            match self.block(cur) {
                Some(b) if b.is_hashable() => {
                    if let Some(name) = b.name() {
                        names.push(name.to_string());
                    }
                    cur = b.parent_ref();
                }
                _ => break,
            }
        }
        names.reverse();
        names.join("/")
    }

    pub fn list(&self, dir: u32, recursive: bool) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        self.collect_entries(dir, "", recursive, &mut visited, &mut entries)?;
        Ok(entries)
    }

    fn collect_entries(
        &self,
        dir: u32,
        prefix: &str,
        recursive: bool,
        visited: &mut HashSet<u32>,
        out: &mut Vec<DirEntry>,
    ) -> Result<()> {
        if !visited.insert(dir) {
            return Ok(());
        }
        for nr in self.dir_entries(dir)? {
            let entry = match self.block(nr) {
                Some(Block::UserDir(d)) => DirEntry {
                    name: d.name().to_string(),
                    path: format!("{}{}", prefix, d.name()),
                    block: nr,
                    is_dir: true,
                    size: 0,
                    protection: d.protection(),
                    created: d.creation_date(),
                },
                Some(Block::FileHeader(fh)) => DirEntry {
                    name: fh.name().to_string(),
                    path: format!("{}{}", prefix, fh.name()),
                    block: nr,
                    is_dir: false,
                    size: fh.byte_size(),
                    protection: fh.protection(),
                    created: fh.creation_date(),
                },
                _ => continue,
            };
            let descend = recursive && entry.is_dir;
            let sub_prefix = format!("{}/", entry.path);
            out.push(entry);
            if descend {
                self.collect_entries(nr, &sub_prefix, recursive, visited, out)?;
            }
        }
        Ok(())
    }

    /// Blocks of the file list chain of a file header.
    pub fn file_list_refs(&self, header: u32) -> Vec<u32> {
        let mut lists = Vec::new();
        let mut nr = match self.block(header) {
            Some(Block::FileHeader(fh)) => fh.next_list_ref(),
            _ => return lists,
        };
        while nr != 0 && lists.len() < SEARCH_LIMIT && !lists.contains(&nr) {
            match self.block(nr) {
                Some(Block::FileList(list)) => {
                    lists.push(nr);
                    nr = list.next_list_ref();
                }
                _ => break,
            }
        }
        lists
    }

    /// Data block numbers of a file in file order, collected from the
    /// header and its file list chain.
    pub fn data_block_refs(&self, header: u32) -> Vec<u32> {
        let mut refs = match self.block(header) {
            Some(Block::FileHeader(fh)) => fh.data_refs(),
            _ => return Vec::new(),
        };
        for nr in self.file_list_refs(header) {
            if let Some(Block::FileList(list)) = self.block(nr) {
                refs.extend(list.data_refs());
            }
        }
        refs
    }

    pub fn read_file(&self, nr: u32) -> Result<Vec<u8>> {
        let size = match self.block(nr) {
            Some(Block::FileHeader(fh)) => fh.byte_size() as usize,
            _ => return Err(FsError::NotAFile(nr)),
        };
        let mut contents = Vec::with_capacity(size);
        for data in self.data_block_refs(nr) {
            match self.block(data) {
                Some(Block::Data(block)) => contents.extend_from_slice(block.payload()),
                _ => {
                    return Err(FsError::FormatMismatch(format!(
                        "file header {} references block {} which holds no data",
                        nr, data
                    )))
                }
            }
            if contents.len() >= size {
                break;
            }
        }
        contents.truncate(size);
        Ok(contents)
    }

    fn check_new_entry(&self, parent: u32, name: &FsName) -> Result<()> {
        if !self.is_dir(parent) {
            return Err(FsError::NotADirectory(parent));
        }
        if self.seek(parent, &name.to_string()).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Links entry `nr` into the hash table of `dir`, at the end of the
    /// bucket's chain.
    fn link_entry(&mut self, dir: u32, nr: u32) -> Result<()> {
        let bucket = self
            .block(nr)
            .and_then(Block::name)
            .ok_or(FsError::NotAFile(nr))?
            .hash_value();
        let head = self.block(dir).map_or(0, |b| b.hash_ref(bucket));
        match self.hash_chain(head).last() {
            Some(&last) => {
                if let Some(b) = self.block_mut(last) {
                    b.set_next_hash_ref(nr);
                }
            }
            None => {
                if let Some(b) = self.block_mut(dir) {
                    b.set_hash_ref(bucket, nr);
                }
            }
        }
        Ok(())
    }

    pub fn create_dir(&mut self, parent: u32, name: &str) -> Result<u32> {
        let name = FsName::new(name);
        self.check_new_entry(parent, &name)?;

        let nr = self.allocate(1)?[0];
        self.place(Block::UserDir(UserDirBlock::new(nr, &name, parent)));
        self.link_entry(parent, nr)?;
        debug!("created directory '{}' at block {}", name, nr);
        Ok(nr)
    }

    /// Stores `contents` as a new file in directory `parent` and returns
    /// the block number of its header.
    pub fn create_file(&mut self, parent: u32, name: &str, contents: &[u8]) -> Result<u32> {
        let name = FsName::new(name);
        self.check_new_entry(parent, &name)?;

        let required = self.required_blocks(contents.len());
        let available = self.free_blocks();
        if required > available {
            return Err(FsError::CapacityExceeded {
                required,
                available,
            });
        }

        let header_nr = self.allocate(1)?[0];
        let list_nrs = self.allocate(self.required_list_blocks(contents.len()))?;
        let data_nrs = self.allocate(self.required_data_blocks(contents.len()))?;

        let mut header = FileHeaderBlock::new(header_nr, &name, parent);
        header.set_byte_size(contents.len() as u32);
        let mut lists: Vec<FileListBlock> = list_nrs
            .iter()
            .map(|&nr| FileListBlock::new(nr, header_nr))
            .collect();

        if let Some(first) = lists.first() {
            header.set_next_list_ref(first.nr);
        }
        for i in 1..lists.len() {
            let next = lists[i].nr;
            lists[i - 1].set_next_list_ref(next);
        }

        let ofs = self.layout().is_ofs();
        let chunks = contents.chunks(self.layout().data_bytes_per_block());
        let mut data_blocks: Vec<DataBlock> = Vec::with_capacity(data_nrs.len());
        for (i, (&nr, chunk)) in data_nrs.iter().zip(chunks).enumerate() {
            let block = if ofs {
                DataBlock::Ofs(OfsDataBlock::new(nr, header_nr, i as u32 + 1, chunk))
            } else {
                DataBlock::Ffs(FfsDataBlock::new(nr, chunk))
            };
            if let Some(prev) = data_blocks.last_mut() {
                prev.set_next_data_ref(nr);
            }
            data_blocks.push(block);

            let table = i / MAX_DATA_REFS;
            if table == 0 {
                header.add_data_ref(nr);
            } else {
                lists[table - 1].add_data_ref(nr);
            }
        }

        self.place(Block::FileHeader(header));
        for list in lists {
            self.place(Block::FileList(list));
        }
        for data in data_blocks {
            self.place(Block::Data(data));
        }
        self.link_entry(parent, header_nr)?;

        debug!(
            "created file '{}' ({} bytes) at block {}",
            name,
            contents.len(),
            header_nr
        );
        Ok(header_nr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adf_blk::Dialect;
    use std::collections::HashMap;

    fn volume(dialect: Dialect) -> Volume {
        Volume::new(dialect, "Test", ADF_DD_CAPACITY).unwrap()
    }

    #[test]
    fn test_required_blocks() {
        let ofs = volume(Dialect::Ofs);
        assert_eq!(ofs.required_blocks(0), 1);
        assert_eq!(ofs.required_blocks(488), 2);
        assert_eq!(ofs.required_blocks(489), 3);
        assert_eq!(ofs.required_list_blocks(72 * 488), 0);
        assert_eq!(ofs.required_list_blocks(72 * 488 + 1), 1);

        let ffs = volume(Dialect::Ffs);
        assert_eq!(ffs.required_blocks(512), 2);
        assert_eq!(ffs.required_blocks(145 * 512), 1 + 145 + 2);
    }

    #[test]
    fn test_create_and_seek() {
        let mut vol = volume(Dialect::Ofs);
        let root = vol.layout().root;
        let dir = vol.create_dir(root, "Devs").unwrap();
        let file = vol.create_file(dir, "system-configuration", b"cfg").unwrap();

        assert_eq!(vol.seek(root, "devs"), Some(dir));
        assert_eq!(vol.seek(dir, "SYSTEM-CONFIGURATION"), Some(file));
        assert_eq!(vol.seek(root, "missing"), None);
        assert_eq!(vol.resolve("devs/system-configuration").unwrap(), file);
        assert!(matches!(vol.resolve("devs/nope"), Err(FsError::NotFound(_))));
        assert_eq!(vol.path_of(file), "Devs/system-configuration");
        assert_eq!(vol.path_of(root), "");
    }

    #[test]
    fn test_duplicate_name() {
        let mut vol = volume(Dialect::Ffs);
        let root = vol.layout().root;
        vol.create_file(root, "readme", b"x").unwrap();
        assert!(matches!(
            vol.create_dir(root, "README"),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_not_a_directory() {
        let mut vol = volume(Dialect::Ffs);
        let root = vol.layout().root;
        let file = vol.create_file(root, "f", b"x").unwrap();
        assert!(matches!(
            vol.create_file(file, "g", b"y"),
            Err(FsError::NotADirectory(_))
        ));
        assert!(matches!(vol.read_file(root), Err(FsError::NotAFile(_))));
    }

    #[test]
    fn test_hash_collision_chain() {
        let mut vol = volume(Dialect::Ofs);
        let root = vol.layout().root;
        let mut buckets: HashMap<usize, Vec<String>> = HashMap::new();
        for i in 0..200 {
            let name = format!("f{}", i);
            buckets
                .entry(FsName::new(&name).hash_value())
                .or_default()
                .push(name);
        }
        let (&bucket, same) = buckets.iter().find(|(_, v)| v.len() >= 2).unwrap();

        let first = vol.create_file(root, &same[0], b"1").unwrap();
        let second = vol.create_file(root, &same[1], b"2").unwrap();
        assert_eq!(vol.root().hash_ref(bucket), first);
        assert_eq!(vol.block(first).unwrap().next_hash_ref(), second);
        assert_eq!(vol.seek(root, &same[1]), Some(second));
        assert_eq!(vol.read_file(second).unwrap(), b"2");
    }

    #[test]
    fn test_ofs_file_round_trip() {
        let mut vol = volume(Dialect::Ofs);
        let root = vol.layout().root;
        let contents: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let nr = vol.create_file(root, "data", &contents).unwrap();

        assert_eq!(vol.read_file(nr).unwrap(), contents);
        let refs = vol.data_block_refs(nr);
        assert_eq!(refs.len(), 5);
        match vol.block(refs[0]) {
            Some(Block::Data(DataBlock::Ofs(b))) => {
                assert_eq!(b.seq_num(), 1);
                assert_eq!(b.next_data_ref(), refs[1]);
                assert_eq!(b.file_header_ref(), nr);
            }
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_large_file_uses_list_blocks() {
        let mut vol = volume(Dialect::Ffs);
        let root = vol.layout().root;
        let contents: Vec<u8> = (0..100 * 512u32).map(|i| (i % 253) as u8).collect();
        let nr = vol.create_file(root, "big", &contents).unwrap();

        assert_eq!(vol.file_list_refs(nr).len(), 1);
        assert_eq!(vol.data_block_refs(nr).len(), 100);
        assert_eq!(vol.read_file(nr).unwrap(), contents);
    }

    #[test]
    fn test_list_recursive() {
        let mut vol = volume(Dialect::Ffs);
        let root = vol.layout().root;
        let s = vol.create_dir(root, "s").unwrap();
        vol.create_file(s, "startup-sequence", b"echo hi").unwrap();
        vol.create_file(root, "disk.info", &[0u8; 10]).unwrap();

        let flat = vol.list(root, false).unwrap();
        assert_eq!(flat.len(), 2);

        let all = vol.list(root, true).unwrap();
        assert_eq!(all.len(), 3);
        let script = all.iter().find(|e| e.name == "startup-sequence").unwrap();
        assert_eq!(script.path, "s/startup-sequence");
        assert_eq!(script.size, 7);
        assert!(!script.is_dir);
        assert!(all.iter().any(|e| e.is_dir && e.path == "s"));
    }
}
