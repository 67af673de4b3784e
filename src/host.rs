// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Moving directory trees between the host filesystem and a volume.

use crate::adf_blk::Dialect;
use crate::consts::{ADF_DD_CAPACITY, ADF_HD_CAPACITY};
use crate::error::{FsError, Result};
use crate::volume::Volume;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A host directory tree held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostNode {
    Dir { name: String, children: Vec<HostNode> },
    File { name: String, contents: Vec<u8> },
}

/// One item of a depth-first walk, with its path relative to the walk's
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry<'a> {
    pub path: PathBuf,
    pub is_dir: bool,
    pub contents: &'a [u8],
}

impl HostNode {
    /// Reads `path` recursively. Entries starting with a dot are skipped,
    /// the others are sorted by name.
    pub fn read(path: &Path) -> std::io::Result<HostNode> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !path.is_dir() {
            return Ok(HostNode::File {
                name,
                contents: fs::read(path)?,
            });
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(path)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        paths.retain(|p| {
            !p.file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true)
        });
        paths.sort();

        let children = paths
            .iter()
            .map(|p| HostNode::read(p))
            .collect::<std::io::Result<_>>()?;
        Ok(HostNode::Dir { name, children })
    }

    pub fn name(&self) -> &str {
        match self {
            HostNode::Dir { name, .. } | HostNode::File { name, .. } => name,
        }
    }

    /// Children of this node in depth-first order, parents before their
    /// contents. The node itself is not part of the walk.
    pub fn walk(&self) -> Vec<HostEntry<'_>> {
        let mut out = Vec::new();
        if let HostNode::Dir { children, .. } = self {
            for child in children {
                child.walk_into(PathBuf::new(), &mut out);
            }
        }
        out
    }

    fn walk_into<'a>(&'a self, parent: PathBuf, out: &mut Vec<HostEntry<'a>>) {
        let path = parent.join(self.name());
        match self {
            HostNode::File { contents, .. } => out.push(HostEntry {
                path,
                is_dir: false,
                contents,
            }),
            HostNode::Dir { children, .. } => {
                out.push(HostEntry {
                    path: path.clone(),
                    is_dir: true,
                    contents: &[],
                });
                for child in children {
                    child.walk_into(path.clone(), out);
                }
            }
        }
    }
}

impl Volume {
    /// Blocks needed to store every entry of `tree` below its root.
    pub fn required_blocks_for(&self, tree: &HostNode) -> usize {
        tree.walk()
            .iter()
            .map(|e| {
                if e.is_dir {
                    1
                } else {
                    self.required_blocks(e.contents.len())
                }
            })
            .sum()
    }

    /// Copies the contents of `tree` into the root directory. Either
    /// everything is imported or the volume stays untouched. The root of
    /// `tree` must be a directory.
    pub fn import_directory(&mut self, tree: &HostNode) -> Result<()> {
        if let HostNode::File { name, .. } = tree {
            return Err(FsError::FormatMismatch(format!(
                "'{}' is a file, not a directory",
                name
            )));
        }
        let required = self.required_blocks_for(tree);
        let available = self.free_blocks();
        if required > available {
            return Err(FsError::CapacityExceeded {
                required,
                available,
            });
        }

        let mut staged = self.clone();
        let root = staged.layout().root;
        let mut dirs: HashMap<PathBuf, u32> = HashMap::new();
        let entries = tree.walk();

        for entry in &entries {
            let parent = match entry.path.parent() {
                Some(p) if !p.as_os_str().is_empty() => dirs
                    .get(p)
                    .copied()
                    .ok_or_else(|| FsError::NotFound(p.display().to_string()))?,
                _ => root,
            };
            let name = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if entry.is_dir {
                let nr = staged.create_dir(parent, &name)?;
                dirs.insert(entry.path.clone(), nr);
            } else {
                staged.create_file(parent, &name, entry.contents)?;
            }
            debug!("imported {}", entry.path.display());
        }

        *self = staged;
        info!("imported {} item(s) using {} block(s)", entries.len(), required);
        Ok(())
    }

    pub fn import_host_dir(&mut self, path: &Path) -> Result<()> {
        let tree = HostNode::read(path)?;
        self.import_directory(&tree)
    }

    /// Builds a new volume from a host directory, using a double density
    /// disk if the contents fit and a high density disk otherwise.
    pub fn from_host_dir(dialect: Dialect, name: &str, path: &Path) -> Result<Volume> {
        let tree = HostNode::read(path)?;
        let mut vol = Volume::new(dialect, name, ADF_DD_CAPACITY)?;
        if vol.required_blocks_for(&tree) > vol.free_blocks() {
            vol = Volume::new(dialect, name, ADF_HD_CAPACITY)?;
        }
        vol.import_directory(&tree)?;
        Ok(vol)
    }

    /// Writes the contents of directory `dir` into the host directory
    /// `path`, which must be empty or not exist yet. Returns the number of
    /// items written.
    pub fn export_directory(&self, dir: u32, path: &Path) -> Result<usize> {
        if path.exists() && fs::read_dir(path)?.next().is_some() {
            return Err(FsError::DirectoryNotEmpty(path.display().to_string()));
        }
        fs::create_dir_all(path)?;

        let entries = self.list(dir, true)?;
        for entry in &entries {
            let target = path.join(&entry.path);
            if entry.is_dir {
                fs::create_dir_all(&target)?;
            } else {
                fs::write(&target, self.read_file(entry.block)?)?;
            }
        }
        info!("exported {} item(s) to {}", entries.len(), path.display());
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> HostNode {
        HostNode::Dir {
            name: "disk".to_string(),
            children: vec![
                HostNode::Dir {
                    name: "c".to_string(),
                    children: vec![HostNode::File {
                        name: "dir".to_string(),
                        contents: vec![1; 1000],
                    }],
                },
                HostNode::File {
                    name: "readme".to_string(),
                    contents: b"hello".to_vec(),
                },
            ],
        }
    }

    #[test]
    fn test_walk_order() {
        let tree = sample_tree();
        let walk = tree.walk();
        let paths: Vec<_> = walk.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("c"),
                PathBuf::from("c/dir"),
                PathBuf::from("readme")
            ]
        );
        assert!(walk[0].is_dir);
        assert_eq!(walk[2].contents, b"hello");
    }

    #[test]
    fn test_import_directory() {
        let mut vol = Volume::new(Dialect::Ofs, "Import", ADF_DD_CAPACITY).unwrap();
        let free = vol.free_blocks();
        let tree = sample_tree();
        let required = vol.required_blocks_for(&tree);
        // c: 1, c/dir: 1 + 3, readme: 1 + 1
        assert_eq!(required, 7);

        vol.import_directory(&tree).unwrap();
        assert_eq!(vol.free_blocks(), free - required);
        let nr = vol.resolve("c/dir").unwrap();
        assert_eq!(vol.read_file(nr).unwrap(), vec![1; 1000]);
        assert!(vol.check(true).is_clean());
    }

    #[test]
    fn test_import_name_clash_rolls_back() {
        let mut vol = Volume::new(Dialect::Ffs, "Clash", ADF_DD_CAPACITY).unwrap();
        let tree = HostNode::Dir {
            name: "x".to_string(),
            children: vec![
                HostNode::File {
                    name: "a".to_string(),
                    contents: vec![0; 10],
                },
                HostNode::File {
                    name: "A".to_string(),
                    contents: vec![0; 10],
                },
            ],
        };
        let before = vol.export_image();
        assert!(matches!(
            vol.import_directory(&tree),
            Err(FsError::AlreadyExists(_))
        ));
        assert_eq!(vol.export_image(), before);
    }

    #[test]
    fn test_import_rejects_plain_file() {
        let host = tempfile::tempdir().unwrap();
        let file = host.path().join("single.txt");
        fs::write(&file, b"not a tree").unwrap();

        let mut vol = Volume::new(Dialect::Ofs, "Plain", ADF_DD_CAPACITY).unwrap();
        let before = vol.export_image();
        assert!(matches!(
            vol.import_host_dir(&file),
            Err(FsError::FormatMismatch(_))
        ));
        assert!(matches!(
            Volume::from_host_dir(Dialect::Ofs, "Plain", &file),
            Err(FsError::FormatMismatch(_))
        ));
        assert_eq!(vol.export_image(), before);
    }

    #[test]
    fn test_host_round_trip() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join("libs")).unwrap();
        fs::write(src.path().join("libs/icon.library"), vec![7u8; 3000]).unwrap();
        fs::write(src.path().join("Disk.info"), b"info").unwrap();
        fs::write(src.path().join(".hidden"), b"skip me").unwrap();

        let vol = Volume::from_host_dir(Dialect::Ffs, "RoundTrip", src.path()).unwrap();
        assert_eq!(vol.capacity(), ADF_DD_CAPACITY);
        assert!(vol.seek(vol.layout().root, ".hidden").is_none());

        let dst = tempfile::tempdir().unwrap();
        let out = dst.path().join("out");
        assert_eq!(vol.export_directory(vol.layout().root, &out).unwrap(), 3);
        assert_eq!(fs::read(out.join("libs/icon.library")).unwrap(), vec![7u8; 3000]);
        assert_eq!(fs::read(out.join("Disk.info")).unwrap(), b"info");

        assert!(matches!(
            vol.export_directory(vol.layout().root, &out),
            Err(FsError::DirectoryNotEmpty(_))
        ));
    }
}
