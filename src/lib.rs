/*
Copyright 2022 Volker Schwaberow <volker@schwaberow.de>
Permission is hereby granted, free of charge, to any person obtaining a
copy of this software and associated documentation files (the
"Software"), to deal in the Software without restriction, including without
limitation the rights to use, copy, modify, merge, publish, distribute,
sublicense, and/or sell copies of the Software, and to permit persons to whom the
Software is furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be
included in all copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR
OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE,
ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
DEALINGS IN THE SOFTWARE.
Author(s): Volker Schwaberow
*/

//! Reading, writing and checking Amiga OFS/FFS volumes.

pub mod adf_blk;
pub mod adf_disk;
pub mod adf_str;
pub mod adf_time;
pub mod bitmap;
pub mod check;
pub mod consts;
pub mod data;
pub mod dir;
pub mod entry;
pub mod error;
pub mod host;
pub mod root;
pub mod volume;

pub use adf_blk::{Block, BlockType, Dialect, FieldKind, Layout};
pub use adf_disk::{AdfImage, SectorDevice};
pub use check::{ErrorKind, Issue, Report};
pub use dir::DirEntry;
pub use error::{FsError, Result};
pub use host::{HostEntry, HostNode};
pub use volume::{Volume, VolumeInfo};
