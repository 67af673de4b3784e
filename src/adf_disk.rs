// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

//! Raw sector containers. An ADF file is nothing but the sectors of a disk
//! in ascending order.

use crate::consts::{ADF_DD_CAPACITY, ADF_HD_CAPACITY, BSIZE};
use crate::error::{FsError, Result};
use crate::volume::Volume;
use log::debug;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use zip::ZipArchive;

/// Anything that can read and write 512 byte sectors.
pub trait SectorDevice {
    fn num_sectors(&self) -> usize;
    fn read_sector(&self, sector: usize) -> io::Result<&[u8]>;
    fn write_sector(&mut self, sector: usize, data: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdfImage {
    data: Vec<u8>,
}

impl AdfImage {
    /// A blank image of `sectors` sectors.
    pub fn new(sectors: usize) -> Self {
        AdfImage {
            data: vec![0; sectors * BSIZE],
        }
    }

    /// Accepts double and high density floppy images.
    pub fn from_bytes(data: &[u8]) -> io::Result<Self> {
        let dd = ADF_DD_CAPACITY as usize * BSIZE;
        let hd = ADF_HD_CAPACITY as usize * BSIZE;
        if data.len() != dd && data.len() != hd {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Invalid ADF size: expected {} or {} bytes, got {} bytes",
                    dd,
                    hd,
                    data.len()
                ),
            ));
        }
        Ok(AdfImage {
            data: data.to_vec(),
        })
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        AdfImage::from_bytes(&data)
    }

    /// Extracts an ADF from a ZIP archive. Without a name the first entry
    /// ending in `.adf` is taken.
    pub fn load_from_zip(zip_data: &[u8], adf_filename: Option<&str>) -> io::Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(zip_data))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let wanted = match adf_filename {
                Some(name) => file.name() == name,
                None => file.name().to_ascii_lowercase().ends_with(".adf"),
            };
            if wanted {
                debug!("loading {} from zip archive", file.name());
                let mut adf_data = Vec::new();
                file.read_to_end(&mut adf_data)?;
                return AdfImage::from_bytes(&adf_data);
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "ADF file not found in ZIP archive",
        ))
    }

    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(&self.data)?;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl SectorDevice for AdfImage {
    fn num_sectors(&self) -> usize {
        self.data.len() / BSIZE
    }

    fn read_sector(&self, sector: usize) -> io::Result<&[u8]> {
        let offset = sector * BSIZE;
        self.data.get(offset..offset + BSIZE).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector {} out of range", sector),
            )
        })
    }

    fn write_sector(&mut self, sector: usize, data: &[u8]) -> io::Result<()> {
        if data.len() != BSIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Invalid sector data size",
            ));
        }
        let offset = sector * BSIZE;
        match self.data.get_mut(offset..offset + BSIZE) {
            Some(dst) => {
                dst.copy_from_slice(data);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector {} out of range", sector),
            )),
        }
    }
}

impl Volume {
    pub fn from_device(dev: &dyn SectorDevice) -> Result<Volume> {
        let mut image = Vec::with_capacity(dev.num_sectors() * BSIZE);
        for sector in 0..dev.num_sectors() {
            image.extend_from_slice(dev.read_sector(sector)?);
        }
        Volume::from_image(&image)
    }

    /// Writes every block to `dev`, which must have exactly as many
    /// sectors as the volume has blocks.
    pub fn write_to(&self, dev: &mut dyn SectorDevice) -> Result<()> {
        if dev.num_sectors() != self.capacity() as usize {
            return Err(FsError::CapacityExceeded {
                required: self.capacity() as usize,
                available: dev.num_sectors(),
            });
        }
        for (sector, data) in self.export_image().chunks_exact(BSIZE).enumerate() {
            dev.write_sector(sector, data)?;
        }
        Ok(())
    }

    pub fn from_adf_file(path: &Path) -> Result<Volume> {
        Volume::from_device(&AdfImage::from_file(path)?)
    }

    pub fn to_adf_image(&self) -> Result<AdfImage> {
        let mut image = AdfImage::new(self.capacity() as usize);
        self.write_to(&mut image)?;
        Ok(image)
    }
}
