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

use crate::modules::source::FileSource;
use crate::VmReservation;

mod mapping;

pub(crate) const MIB: usize = 1024 * 1024;

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fixed, well spaced addresses for tests that place reservations or direct
/// mappings by hint.
///
/// They sit far below where the kernel hands out automatic placements, so
/// concurrently running tests cannot steal a range between a release and
/// the re-claim that a scenario depends on. Every caller uses its own
/// index.
pub(crate) fn test_address(index: usize) -> usize {
    0x1000_0000_0000 + index * 0x1_0000_0000
}

pub(crate) fn get_test_file_source(test_name: &str, size: usize) -> FileSource {
    FileSource::create(format!("/tmp/{}.tmp", test_name), size).unwrap()
}

/// Scans a reservation and checks every bookkeeping invariant: mappings
/// sorted and pairwise disjoint, all inside the reservation, and the active
/// count equal to the number of live mappings.
pub(crate) fn check_invariants(reservation: &VmReservation) {
    let ranges = reservation.snapshot();

    let mut previous_end = 0;
    for (offset, length) in &ranges {
        assert!(
            *offset >= previous_end,
            "mappings overlap at offset {:#x}",
            offset
        );
        assert!(
            offset + length <= reservation.size(),
            "mapping at {:#x} leaves the reservation",
            offset
        );
        previous_end = offset + length;
    }

    assert_eq!(reservation.active_count().unwrap(), ranges.len());
}
