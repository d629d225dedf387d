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

use std::{fs::File, os::unix::fs::MetadataExt, os::unix::io::AsRawFd};

use libc::{c_void, mmap, MAP_FAILED, MAP_FIXED, MAP_SHARED, PROT_READ, PROT_WRITE};

use super::{SourceId, SourceModule};
use crate::granularity::Granularity;
use crate::modules::shutdown_state::ShutdownState;

/// A device DAX region as mapping source, cache line granular.
///
/// Region size, required mapping alignment and the shutdown counter
/// snapshot come from the device layer that opened the device; digging
/// them out of sysfs is not this crate's business.
pub struct DevDaxSource {
    file: File,
    size: usize,
    alignment: usize,
    id: SourceId,
    sds: Option<ShutdownState>,
}

impl DevDaxSource {
    pub fn new(
        file: File,
        size: usize,
        alignment: usize,
        sds: Option<ShutdownState>,
    ) -> std::io::Result<Self> {
        let meta = file.metadata()?;

        Ok(Self {
            size,
            alignment,
            id: SourceId {
                device: meta.rdev(),
                inode: meta.ino(),
            },
            file,
            sds,
        })
    }
}

impl SourceModule for DevDaxSource {
    fn available_size(&self) -> usize {
        self.size
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn granularity(&self) -> Granularity {
        Granularity::CacheLine
    }

    fn id(&self) -> SourceId {
        self.id
    }

    fn shutdown_state(&self) -> Option<ShutdownState> {
        self.sds
    }

    unsafe fn map_at(&self, addr: *mut u8, length: usize) -> std::io::Result<()> {
        let base = mmap(
            addr as *mut c_void,
            length,
            PROT_READ | PROT_WRITE,
            MAP_SHARED | MAP_FIXED,
            self.file.as_raw_fd(),
            0,
        );
        if base == MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }

        Ok(())
    }
}
