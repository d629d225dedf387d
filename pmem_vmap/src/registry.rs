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
use std::sync::{Arc, Mutex, RwLock};

use crate::error::MapError;
use crate::os::{self, ReserveFailure};
use crate::region_map::RegionMap;
use crate::util::{align_up, get_page_size, is_aligned};

/// The registry owned side of one reservation.
pub(crate) struct ReservationRecord {
    pub(crate) base: usize,
    pub(crate) size: usize,
    pub(crate) state: Mutex<RegionState>,
}

/// Everything guarded by the per reservation lock: the region map, the live
/// mapping count and the open flag. Overlap check and insertion happen in
/// one critical section on this lock.
pub(crate) struct RegionState {
    pub(crate) map: RegionMap,
    pub(crate) active: usize,

    /// cleared on delete, so calls racing on an already resolved record
    /// fail instead of touching released address space
    pub(crate) open: bool,
}

struct Slot {
    generation: u32,
    record: Option<Arc<ReservationRecord>>,
}

/// Process wide bookkeeping of all live reservations.
///
/// Initialized on first use and never torn down; a reservation leaked by
/// its owner keeps its address range until the process exits. The registry
/// lock covers create/delete bookkeeping and handle resolution only, so
/// map/unmap traffic on different reservations never meets here.
///
/// Handles address slots by index plus generation; a slot reused after a
/// delete invalidates all handles to the previous occupant.
struct ReservationRegistry {
    slots: Vec<Slot>,
    free_slots: Vec<usize>,

    /// reservation base address -> slot index
    by_base: BTreeMap<usize, usize>,
}

static REGISTRY: RwLock<ReservationRegistry> = RwLock::new(ReservationRegistry::new());

impl ReservationRegistry {
    const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            by_base: BTreeMap::new(),
        }
    }

    fn lookup(&self, slot: u32, generation: u32) -> Result<Arc<ReservationRecord>, MapError> {
        let slot = self
            .slots
            .get(slot as usize)
            .ok_or(MapError::ReservationNotFound)?;
        if slot.generation != generation {
            return Err(MapError::ReservationNotFound);
        }

        slot.record.clone().ok_or(MapError::ReservationNotFound)
    }

    /// Whether `[addr, addr + size)` intersects any registered reservation.
    fn overlaps(&self, addr: usize, size: usize) -> bool {
        // reservations are disjoint, so checking the closest one below the
        // range end is enough
        if let Some((_, &index)) = self.by_base.range(..addr + size).next_back() {
            let record = self.slots[index].record.as_ref().unwrap();
            return record.base + record.size > addr;
        }

        false
    }

    fn insert(&mut self, record: Arc<ReservationRecord>) -> (u32, u32) {
        let base = record.base;
        let index = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index].record = Some(record);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                self.slots.len() - 1
            }
        };
        self.by_base.insert(base, index);

        (index as u32, self.slots[index].generation)
    }

    fn remove(&mut self, index: usize, base: usize) {
        let slot = &mut self.slots[index];
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(index);
        self.by_base.remove(&base);
    }
}

pub(crate) fn resolve(slot: u32, generation: u32) -> Result<Arc<ReservationRecord>, MapError> {
    REGISTRY.read().unwrap().lookup(slot, generation)
}

/// Claims an address range and registers it as a new reservation.
///
/// With a hint the exact range has to be free of other reservations and of
/// any mapping already in place; the former is answered from the registry,
/// the latter by the kernel probe (a pre-existing mapping the registry has
/// never seen still fails the probe). Without a hint the kernel picks the
/// range, so placement follows the platform's mmap search order.
pub(crate) fn reserve(size: usize, hint: Option<usize>) -> Result<(u32, u32, usize, usize), MapError> {
    let page = get_page_size();

    if size == 0 {
        return Err(MapError::InsufficientSpace {
            offset: 0,
            length: 0,
            limit: 0,
        });
    }
    if let Some(addr) = hint {
        if !is_aligned(addr, page) {
            return Err(MapError::InvalidGranularity {
                offset: addr,
                length: size,
                unit: page,
            });
        }
    }

    let size = match size.checked_add(page - 1) {
        Some(_) => align_up(size, page),
        None => return Err(MapError::OutOfAddressSpace { size }),
    };

    if let Some(addr) = hint {
        if addr.checked_add(size).is_none() {
            return Err(MapError::OutOfAddressSpace { size });
        }
        if REGISTRY.read().unwrap().overlaps(addr, size) {
            return Err(MapError::AddressRangeBusy { addr, size });
        }
    }

    let base = os::reserve_range(hint, size).map_err(|failure| match failure {
        ReserveFailure::Busy => MapError::AddressRangeBusy {
            addr: hint.unwrap_or(0),
            size,
        },
        ReserveFailure::NoSpace => MapError::OutOfAddressSpace { size },
        ReserveFailure::Os(err) => MapError::ResourceExhausted(err),
    })?;

    let record = Arc::new(ReservationRecord {
        base,
        size,
        state: Mutex::new(RegionState {
            map: RegionMap::new(),
            active: 0,
            open: true,
        }),
    });

    let (slot, generation) = REGISTRY.write().unwrap().insert(record);

    Ok((slot, generation, base, size))
}

/// Deletes a reservation and releases its range, failing while mappings are
/// still in place.
pub(crate) fn release(slot: u32, generation: u32) -> Result<(), MapError> {
    let mut registry = REGISTRY.write().unwrap();
    let record = registry.lookup(slot, generation)?;

    {
        let mut state = record.state.lock().unwrap();
        if state.active != 0 {
            return Err(MapError::ReservationNotEmpty {
                active: state.active,
            });
        }

        // releasing under the state lock keeps a concurrent map call that
        // already resolved this record from racing the teardown
        os::release_range(record.base, record.size).map_err(MapError::ResourceExhausted)?;
        state.open = false;
    }

    registry.remove(slot as usize, record.base);

    Ok(())
}
