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

use log::{info, trace};

use crate::error::MapError;
use crate::granularity::placement_is_valid;
use crate::mapping::{self, Mapping};
use crate::modules::shutdown_state;
use crate::modules::source::SourceModule;
use crate::region_map::RegionEntry;
use crate::registry;

/// Handle to a live virtual address space reservation: a contiguous range
/// owned exclusively by its creator, into which mappings are placed at
/// caller chosen offsets.
///
/// The handle is a plain value; copies refer to the same reservation. Using
/// a handle after [`VmReservation::delete`] reports
/// [`MapError::ReservationNotFound`] instead of touching address space that
/// may belong to somebody else by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmReservation {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
    base: usize,
    size: usize,
}

impl VmReservation {
    /// Reserves `size` bytes of virtual address space, rounded up to whole
    /// pages, placed at exactly `hint` if one is given.
    ///
    /// The range belongs exclusively to this reservation until
    /// [`VmReservation::delete`]; no other reservation or mapping can claim
    /// any byte of it in between.
    pub fn create(size: usize, hint: Option<usize>) -> Result<Self, MapError> {
        let (slot, generation, base, size) = registry::reserve(size, hint)?;

        info!("reserved {:#x} (+{:#x} bytes)", base, size);

        Ok(Self {
            slot,
            generation,
            base,
            size,
        })
    }

    /// Releases the reservation and hands its address range back for reuse.
    ///
    /// All mappings have to be unmapped beforehand; nothing is force
    /// unmapped here.
    pub fn delete(self) -> Result<(), MapError> {
        registry::release(self.slot, self.generation)?;

        info!("released reservation {:#x} (+{:#x} bytes)", self.base, self.size);

        Ok(())
    }

    /// Start of the reserved range.
    pub fn address(&self) -> *mut u8 {
        self.base as *mut u8
    }

    /// Byte length of the reserved range.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of mappings currently placed in this reservation.
    pub fn active_count(&self) -> Result<usize, MapError> {
        let record = registry::resolve(self.slot, self.generation)?;
        let state = record.state.lock().unwrap();

        Ok(state.active)
    }

    /// Places a mapping of `source` at `offset` inside this reservation.
    ///
    /// A `length` of 0 maps the whole source. The placement has to fit the
    /// reservation and the source, satisfy the source's alignment rules and
    /// stay clear of every mapping already in place; intersections of any
    /// extent are rejected, exactly adjacent neighbors are fine. Validation
    /// and insertion happen atomically with respect to all other map/unmap
    /// calls on this reservation.
    pub fn map<S: SourceModule>(
        &self,
        offset: usize,
        length: usize,
        source: &S,
    ) -> Result<Mapping, MapError> {
        let record = registry::resolve(self.slot, self.generation)?;

        let length = if length == 0 {
            source.available_size()
        } else {
            length
        };
        if length == 0 {
            return Err(MapError::InsufficientSpace {
                offset,
                length: 0,
                limit: record.size,
            });
        }
        match offset.checked_add(length) {
            Some(end) if end <= record.size => {}
            _ => {
                return Err(MapError::InsufficientSpace {
                    offset,
                    length,
                    limit: record.size,
                })
            }
        }
        if length > source.available_size() {
            return Err(MapError::InsufficientSpace {
                offset,
                length,
                limit: source.available_size(),
            });
        }

        let unit = source.granularity().alignment_unit().max(source.alignment());
        if !placement_is_valid(offset, length, unit) {
            return Err(MapError::InvalidGranularity {
                offset,
                length,
                unit,
            });
        }

        let mut state = record.state.lock().unwrap();
        if !state.open {
            return Err(MapError::ReservationNotFound);
        }
        if let Some((existing, _)) = state.map.find(offset, length) {
            return Err(MapError::MappingOverlap {
                offset,
                length,
                existing,
            });
        }

        let addr = record.base + offset;
        unsafe { source.map_at(addr as *mut u8, length) }.map_err(|err| {
            log::warn!("establishing {:#x} (+{:#x} bytes) failed: {}", addr, length, err);
            MapError::ResourceExhausted(err)
        })?;

        state.map.insert(
            offset,
            RegionEntry {
                length,
                granularity: source.granularity(),
                source: source.id(),
            },
        );
        state.active += 1;
        debug_assert_eq!(state.active, state.map.len());

        let new_mapping = Mapping::new(self, offset, length, source.granularity());
        mapping::register_range(addr, new_mapping);
        shutdown_state::register(source.id(), source.shutdown_state());
        drop(state);

        trace!("mapped {:#x} (+{:#x} bytes) at offset {:#x}", addr, length, offset);

        Ok(new_mapping)
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<(usize, usize)> {
        let record = registry::resolve(self.slot, self.generation).unwrap();
        let state = record.state.lock().unwrap();

        state
            .map
            .iter()
            .map(|(offset, entry)| (offset, entry.length))
            .collect()
    }
}
