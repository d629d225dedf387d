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

use std::io;
use std::ptr::null_mut;

use libc::{
    c_void, mmap, munmap, EEXIST, ENOMEM, MAP_ANONYMOUS, MAP_FAILED, MAP_FIXED,
    MAP_FIXED_NOREPLACE, MAP_PRIVATE, PROT_NONE,
};

pub(crate) enum ReserveFailure {
    /// the requested range is occupied by some other mapping
    Busy,
    /// no free range of the requested size exists
    NoSpace,
    Os(io::Error),
}

/// Reserves `size` bytes of address space without committing memory.
///
/// The range is claimed with an anonymous `PROT_NONE` mapping, which keeps
/// every other address space user out of it until it is released again.
/// With a hint the exact range is requested via `MAP_FIXED_NOREPLACE`; a
/// kernel that does not know the flag hands out some other free range
/// instead of failing, which the returned-address comparison below turns
/// into the same busy result.
pub(crate) fn reserve_range(hint: Option<usize>, size: usize) -> Result<usize, ReserveFailure> {
    let (addr, flags) = match hint {
        Some(addr) => (
            addr as *mut c_void,
            MAP_PRIVATE | MAP_ANONYMOUS | MAP_FIXED_NOREPLACE,
        ),
        None => (null_mut(), MAP_PRIVATE | MAP_ANONYMOUS),
    };

    let base = unsafe { mmap(addr, size, PROT_NONE, flags, -1, 0) };
    if base == MAP_FAILED {
        let err = io::Error::last_os_error();
        return Err(match err.raw_os_error() {
            Some(EEXIST) => ReserveFailure::Busy,
            Some(ENOMEM) => ReserveFailure::NoSpace,
            _ => ReserveFailure::Os(err),
        });
    }

    if let Some(requested) = hint {
        if base as usize != requested {
            // kernel ignored the hint, so the requested range is taken
            unsafe { munmap(base, size) };
            return Err(ReserveFailure::Busy);
        }
    }

    Ok(base as usize)
}

/// Gives the range back to the operating system.
pub(crate) fn release_range(addr: usize, size: usize) -> io::Result<()> {
    if unsafe { munmap(addr as *mut c_void, size) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Puts the anonymous `PROT_NONE` backing in place again for
/// `[addr, addr + size)`.
///
/// Used when a mapping inside a reservation is torn down: the hole has to
/// stay under the reservation's exclusive ownership, so it is replaced
/// instead of unmapped.
pub(crate) fn rereserve_range(addr: usize, size: usize) -> io::Result<()> {
    let base = unsafe {
        mmap(
            addr as *mut c_void,
            size,
            PROT_NONE,
            MAP_PRIVATE | MAP_ANONYMOUS | MAP_FIXED,
            -1,
            0,
        )
    };
    if base == MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
