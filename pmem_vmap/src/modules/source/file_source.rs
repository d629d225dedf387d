/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::{
    fs::{remove_file, File},
    os::unix::fs::MetadataExt,
    os::unix::io::AsRawFd,
    path::Path,
};

use libc::{c_void, mmap, MAP_FAILED, MAP_FIXED, MAP_SHARED, PROT_READ, PROT_WRITE};

use super::{SourceId, SourceModule};
use crate::error::MapError;
use crate::granularity::Granularity;
use crate::util::{get_page_size, is_aligned};

/// A regular file as mapping source, page granular.
pub struct FileSource {
    file: File,

    /// offset into the file this source starts at
    start: usize,

    /// bytes available from `start` to the end of the file
    available: usize,

    id: SourceId,

    /// path of a file this source created itself, save for removing it later
    owned_path: Option<String>,
}

impl FileSource {
    /// Opens an existing file as a mapping source.
    pub fn open(filepath: &str) -> std::io::Result<Self> {
        let file = File::options().read(true).write(true).open(filepath)?;

        Self::from_file(file, None)
    }

    /// Creates a new file of `size` bytes and uses it as a mapping source.
    ///
    /// The file is removed again when the source is dropped; mappings that
    /// are still in place keep the data alive until they are gone too.
    pub fn create(filepath: String, size: usize) -> std::io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .truncate(true)
            .create(true)
            .open(filepath.clone())?;

        file.set_len(size as u64)?;

        Self::from_file(file, Some(filepath))
    }

    fn from_file(file: File, owned_path: Option<String>) -> std::io::Result<Self> {
        let meta = file.metadata()?;

        Ok(Self {
            start: 0,
            available: meta.len() as usize,
            id: SourceId {
                device: meta.dev(),
                inode: meta.ino(),
            },
            file,
            owned_path,
        })
    }

    /// Narrows the source to the sub-range starting at `offset`.
    ///
    /// The resulting file offset has to stay placeable, so it must be a
    /// multiple of the source alignment.
    pub fn slice_from(mut self, offset: usize) -> Result<Self, MapError> {
        if offset > self.available {
            return Err(MapError::InsufficientSpace {
                offset,
                length: 0,
                limit: self.available,
            });
        }
        if !is_aligned(self.start + offset, self.alignment()) {
            return Err(MapError::InvalidGranularity {
                offset,
                length: 0,
                unit: self.alignment(),
            });
        }

        self.start += offset;
        self.available -= offset;

        Ok(self)
    }
}

impl SourceModule for FileSource {
    fn available_size(&self) -> usize {
        self.available
    }

    fn alignment(&self) -> usize {
        get_page_size()
    }

    fn granularity(&self) -> Granularity {
        Granularity::Page
    }

    fn id(&self) -> SourceId {
        self.id
    }

    unsafe fn map_at(&self, addr: *mut u8, length: usize) -> std::io::Result<()> {
        let base = mmap(
            addr as *mut c_void,
            length,
            PROT_READ | PROT_WRITE,
            MAP_SHARED | MAP_FIXED,
            self.file.as_raw_fd(),
            self.start as libc::off_t,
        );
        if base == MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        if let Some(path) = self.owned_path.take() {
            // live mappings keep the inode, only the directory entry goes
            if remove_file(Path::new(&path)).is_err() {
                log::warn!("could not remove source file {}", path);
            }
        }
    }
}
