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

use std::collections::BTreeMap;
use std::sync::RwLock;

use log::trace;

use crate::error::MapError;
use crate::granularity::Granularity;
use crate::modules::shutdown_state;
use crate::os;
use crate::registry;
use crate::reservation::VmReservation;

/// One established placement inside a reservation.
///
/// A plain value handle; it never outlives its bookkeeping, since deleting
/// the owning reservation is blocked while mappings exist, and operations
/// through an already unmapped handle report [`MapError::MappingNotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    reservation: VmReservation,
    offset: usize,
    length: usize,
    granularity: Granularity,
}

/// Every mapping established through this crate, keyed by its absolute
/// address. Mirrors the per reservation region maps on the process level;
/// feeds [`find_mapping`] and the shutdown state lookup.
static MAPPED_RANGES: RwLock<BTreeMap<usize, Mapping>> = RwLock::new(BTreeMap::new());

pub(crate) fn register_range(addr: usize, mapping: Mapping) {
    MAPPED_RANGES.write().unwrap().insert(addr, mapping);
}

pub(crate) fn unregister_range(addr: usize) {
    MAPPED_RANGES.write().unwrap().remove(&addr);
}

/// Finds the earliest mapping established through this crate that overlaps
/// `[addr, addr + length)`, if any.
pub fn find_mapping(addr: *const u8, length: usize) -> Option<Mapping> {
    let start = addr as usize;
    let end = start.saturating_add(length);
    let ranges = MAPPED_RANGES.read().unwrap();

    if let Some((base, mapping)) = ranges.range(..=start).next_back() {
        if base + mapping.size() > start {
            return Some(*mapping);
        }
    }

    ranges.range(start..end).next().map(|(_, mapping)| *mapping)
}

impl Mapping {
    pub(crate) fn new(
        reservation: &VmReservation,
        offset: usize,
        length: usize,
        granularity: Granularity,
    ) -> Self {
        Self {
            reservation: *reservation,
            offset,
            length,
            granularity,
        }
    }

    /// Start of the mapped range.
    pub fn address(&self) -> *mut u8 {
        (self.reservation.address() as usize + self.offset) as *mut u8
    }

    /// Offset of this mapping inside its reservation.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte length of the mapped range.
    pub fn size(&self) -> usize {
        self.length
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// The reservation this mapping was placed in.
    pub fn reservation(&self) -> VmReservation {
        self.reservation
    }

    /// Tears the mapping down and hands its range back to the reservation.
    ///
    /// The range stays reserved and is immediately available for a new
    /// mapping, including one at the identical offset and length.
    pub fn unmap(self) -> Result<(), MapError> {
        let record = registry::resolve(self.reservation.slot, self.reservation.generation)
            .map_err(|_| MapError::MappingNotFound {
                offset: self.offset,
            })?;

        let mut state = record.state.lock().unwrap();
        if !state.open {
            return Err(MapError::MappingNotFound {
                offset: self.offset,
            });
        }

        let source = match state.map.get(self.offset) {
            Some(entry) if entry.length == self.length => entry.source,
            _ => {
                return Err(MapError::MappingNotFound {
                    offset: self.offset,
                })
            }
        };

        let addr = record.base + self.offset;
        os::rereserve_range(addr, self.length).map_err(MapError::ResourceExhausted)?;

        state.map.remove(self.offset, self.length);
        state.active -= 1;
        debug_assert_eq!(state.active, state.map.len());

        unregister_range(addr);
        shutdown_state::unregister(source);
        drop(state);

        trace!("unmapped {:#x} (+{:#x} bytes)", addr, self.length);

        Ok(())
    }
}
