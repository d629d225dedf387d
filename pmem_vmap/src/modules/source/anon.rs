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

use std::sync::atomic::{AtomicU64, Ordering};

use libc::{
    c_void, mmap, MAP_ANONYMOUS, MAP_FAILED, MAP_FIXED, MAP_PRIVATE, PROT_READ, PROT_WRITE,
};

use super::{SourceId, SourceModule};
use crate::granularity::Granularity;
use crate::modules::shutdown_state::ShutdownState;
use crate::util::get_page_size;

/// synthetic device number for sources without a backing object
const ANON_DEVICE: u64 = u64::MAX;

static NEXT_ANON_INODE: AtomicU64 = AtomicU64::new(1);

/// A volatile, anonymously backed mapping source.
///
/// Useful as a stand-in wherever real backing hardware is not around: the
/// granularity class is chosen freely and a fake shutdown counter can be
/// attached.
pub struct AnonSource {
    size: usize,
    granularity: Granularity,
    id: SourceId,
    sds: Option<ShutdownState>,
}

impl AnonSource {
    /// Page granular volatile source of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::with_granularity(size, Granularity::Page)
    }

    pub fn with_granularity(size: usize, granularity: Granularity) -> Self {
        Self {
            size,
            granularity,
            id: SourceId {
                device: ANON_DEVICE,
                inode: NEXT_ANON_INODE.fetch_add(1, Ordering::Relaxed),
            },
            sds: None,
        }
    }

    /// Pretends this source sits on a device with a shutdown counter.
    pub fn set_shutdown_state(&mut self, sds: ShutdownState) {
        self.sds = Some(sds);
    }
}

impl SourceModule for AnonSource {
    fn available_size(&self) -> usize {
        self.size
    }

    fn alignment(&self) -> usize {
        // anonymous memory is placed by the paging unit
        get_page_size()
    }

    fn granularity(&self) -> Granularity {
        self.granularity
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
            MAP_PRIVATE | MAP_ANONYMOUS | MAP_FIXED,
            -1,
            0,
        );
        if base == MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }

        Ok(())
    }
}
