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

use crate::util::{get_cache_line_size, get_page_size, is_aligned};

/// Granularity class of a backing medium.
///
/// Regular files on a page cache backed filesystem store in page sized
/// units; direct access persistent memory stores in cache line sized units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Page,
    CacheLine,
}

impl Granularity {
    /// Smallest unit a mapped sub-range may be aligned to on a medium of
    /// this class.
    pub fn alignment_unit(self) -> usize {
        match self {
            Granularity::Page => get_page_size(),
            Granularity::CacheLine => get_cache_line_size(),
        }
    }
}

/// Checks a candidate placement against an alignment unit.
///
/// Both the offset and the length have to be multiples of the unit. A
/// placement spanning a whole reservation reduces to the reservation's own
/// bounds, which are page rounded by construction, so it passes for every
/// unit up to the page size.
pub fn placement_is_valid(offset: usize, length: usize, unit: usize) -> bool {
    is_aligned(offset, unit) && is_aligned(length, unit)
}
