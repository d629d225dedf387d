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

use libc::{sysconf, _SC_PAGE_SIZE};

pub(crate) fn get_page_size() -> usize {
    unsafe { sysconf(_SC_PAGE_SIZE) as usize }
}

/// Line size of the first level data cache, or the common 64 bytes if the
/// platform does not report one.
pub(crate) fn get_cache_line_size() -> usize {
    let size = unsafe { sysconf(libc::_SC_LEVEL1_DCACHE_LINESIZE) };
    if size <= 0 {
        64
    } else {
        size as usize
    }
}

/// efficient way to calculate: ceil(x / y)
pub(crate) fn ceil_div(x: usize, y: usize) -> usize {
    (x + y - 1) / y
}

/// rounds `x` up to the next multiple of `unit`
pub(crate) fn align_up(x: usize, unit: usize) -> usize {
    ceil_div(x, unit) * unit
}

pub(crate) fn is_aligned(x: usize, unit: usize) -> bool {
    x % unit == 0
}
