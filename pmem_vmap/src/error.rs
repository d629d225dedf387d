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

use thiserror::Error;

/// Errors returned by reservation and mapping operations.
///
/// Every error is reported synchronously and leaves all bookkeeping exactly
/// as it was before the call. Nothing is retried internally; retrying with
/// a different address hint after [`MapError::AddressRangeBusy`] is caller
/// policy.
#[derive(Debug, Error)]
pub enum MapError {
    /// The requested reservation range collides with an existing
    /// reservation or with a mapping that is already in place.
    #[error("address range {addr:#x} (+{size:#x} bytes) is busy")]
    AddressRangeBusy { addr: usize, size: usize },

    /// No free address range of the requested size exists.
    #[error("no free address range of {size:#x} bytes found")]
    OutOfAddressSpace { size: usize },

    /// The reservation still holds mappings; nothing is force unmapped.
    #[error("reservation still holds {active} mappings")]
    ReservationNotEmpty { active: usize },

    /// The requested range does not fit the reservation or exceeds what the
    /// backing source provides.
    #[error("range {offset:#x} (+{length:#x} bytes) exceeds the available {limit:#x} bytes")]
    InsufficientSpace {
        offset: usize,
        length: usize,
        limit: usize,
    },

    /// Offset or length violate the alignment the backing medium requires.
    #[error("offset {offset:#x} or length {length:#x} is not a multiple of {unit:#x}")]
    InvalidGranularity {
        offset: usize,
        length: usize,
        unit: usize,
    },

    /// The requested range intersects a mapping already placed in the same
    /// reservation.
    #[error("range {offset:#x} (+{length:#x} bytes) overlaps the mapping at offset {existing:#x}")]
    MappingOverlap {
        offset: usize,
        length: usize,
        existing: usize,
    },

    /// The unmap target is not registered (anymore) in its reservation.
    #[error("no mapping registered at offset {offset:#x}")]
    MappingNotFound { offset: usize },

    /// The handle refers to a reservation that was deleted.
    #[error("reservation handle does not refer to a live reservation")]
    ReservationNotFound,

    /// The operating system refused the underlying mapping call.
    #[error("mapping syscall failed: {0}")]
    ResourceExhausted(#[source] std::io::Error),
}
