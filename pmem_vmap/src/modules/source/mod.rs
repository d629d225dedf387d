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

mod anon;
mod dev_dax;
mod file_source;

pub use anon::AnonSource;
pub use dev_dax::DevDaxSource;
pub use file_source::FileSource;

use crate::granularity::Granularity;
use crate::modules::shutdown_state::ShutdownState;

/// Identity of a backing object.
///
/// For file and device sources this is the (device, inode) pair of the
/// underlying object; the shutdown state records are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId {
    pub device: u64,
    pub inode: u64,
}

/// A backing object mappings can be placed over.
///
/// The mapping layer never inspects the content behind a source, it only
/// consumes the size, alignment and granularity metadata and asks the
/// source to establish the page table entries for a range it already owns.
pub trait SourceModule {
    /// Number of bytes this source can back.
    ///
    /// If the source is a sub-range of its underlying object, the source
    /// side offset is already subtracted here.
    fn available_size(&self) -> usize;

    /// Placement alignment the source requires for mapped sub-ranges, e.g.
    /// the page size for files or the device alignment for device DAX.
    fn alignment(&self) -> usize;

    /// Granularity class of the backing medium.
    fn granularity(&self) -> Granularity;

    fn id(&self) -> SourceId;

    /// Snapshot of the unsafe shutdown counter, if the medium keeps one.
    fn shutdown_state(&self) -> Option<ShutdownState> {
        None
    }

    /// Establishes the real page table mapping for `[addr, addr + length)`.
    ///
    /// ### Safety
    ///
    /// `addr` has to point into address space the caller exclusively owns
    /// with at least `length` bytes of room, and `length` has to be bounded
    /// by [`SourceModule::available_size`].
    unsafe fn map_at(&self, addr: *mut u8, length: usize) -> std::io::Result<()>;
}
