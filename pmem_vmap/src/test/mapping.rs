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

use std::slice;

use super::{check_invariants, get_test_file_source, init_logging, MIB};
use crate::modules::shutdown_state::{device_state, DeviceState, ShutdownState};
use crate::modules::source::{AnonSource, DevDaxSource, FileSource, SourceModule};
use crate::util::get_page_size;
use crate::{find_mapping, Granularity, MapError, VmReservation};

#[test]
fn test_map_whole_file() {
    init_logging();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();
    let source = get_test_file_source("test_map_whole_file", size);
    let mapping = reservation.map(0, 0, &source).unwrap();

    assert_eq!(mapping.address(), reservation.address());
    assert_eq!(mapping.size(), size);
    assert_eq!(mapping.granularity(), Granularity::Page);
    assert_eq!(reservation.active_count().unwrap(), 1);

    // the mapping is real file backed memory
    let data = unsafe { slice::from_raw_parts_mut(mapping.address(), mapping.size()) };
    data[0] = 0xab;
    data[size - 1] = 0xcd;
    assert_eq!(data[0], 0xab);
    assert_eq!(data[size - 1], 0xcd);

    check_invariants(&reservation);
    mapping.unmap().unwrap();
    reservation.delete().unwrap();
}

#[test]
fn test_map_part_of_file() {
    init_logging();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();
    // narrow the source to its upper half
    let source = get_test_file_source("test_map_part_of_file", size)
        .slice_from(8 * MIB)
        .unwrap();
    assert_eq!(source.available_size(), 8 * MIB);

    let mapping = reservation.map(4 * MIB, 0, &source).unwrap();
    assert_eq!(mapping.offset(), 4 * MIB);
    assert_eq!(mapping.size(), 8 * MIB);

    mapping.unmap().unwrap();
    reservation.delete().unwrap();
}

#[test]
fn test_full_overlap() {
    init_logging();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();
    let first = get_test_file_source("test_full_overlap_first", size);
    let second = get_test_file_source("test_full_overlap_second", size);

    let mapping = reservation.map(0, 0, &first).unwrap();
    assert!(matches!(
        reservation.map(0, 0, &second),
        Err(MapError::MappingOverlap { existing: 0, .. })
    ));
    // the failed map changed nothing
    assert_eq!(reservation.active_count().unwrap(), 1);
    check_invariants(&reservation);

    mapping.unmap().unwrap();
    reservation.delete().unwrap();
}

#[test]
fn test_partial_overlap_below_and_above() {
    init_logging();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();
    let middle = reservation
        .map(4 * MIB, 8 * MIB, &AnonSource::new(8 * MIB))
        .unwrap();

    // overlap from below
    assert!(matches!(
        reservation.map(0, 6 * MIB, &AnonSource::new(6 * MIB)),
        Err(MapError::MappingOverlap { .. })
    ));
    // overlap from above
    assert!(matches!(
        reservation.map(10 * MIB, 6 * MIB, &AnonSource::new(6 * MIB)),
        Err(MapError::MappingOverlap { .. })
    ));
    // full containment
    assert!(matches!(
        reservation.map(6 * MIB, 2 * MIB, &AnonSource::new(2 * MIB)),
        Err(MapError::MappingOverlap { .. })
    ));
    check_invariants(&reservation);

    // exactly adjacent on both sides is no intersection
    let below = reservation
        .map(0, 4 * MIB, &AnonSource::new(4 * MIB))
        .unwrap();
    let above = reservation
        .map(12 * MIB, 4 * MIB, &AnonSource::new(4 * MIB))
        .unwrap();
    check_invariants(&reservation);

    for mapping in [below, middle, above] {
        mapping.unmap().unwrap();
    }
    reservation.delete().unwrap();
}

#[test]
fn test_insufficient_space() {
    init_logging();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();

    // a 20 MiB file does not fit a 16 MiB reservation when mapped whole
    let big = get_test_file_source("test_insufficient_space_big", 20 * MIB);
    assert!(matches!(
        reservation.map(0, 0, &big),
        Err(MapError::InsufficientSpace { .. })
    ));

    // a range reaching past the reservation end
    assert!(matches!(
        reservation.map(12 * MIB, 8 * MIB, &AnonSource::new(8 * MIB)),
        Err(MapError::InsufficientSpace { .. })
    ));

    // more than the source provides
    assert!(matches!(
        reservation.map(0, 2 * MIB, &AnonSource::new(MIB)),
        Err(MapError::InsufficientSpace { .. })
    ));

    // offset + length overflowing
    assert!(matches!(
        reservation.map(usize::MAX - MIB, 2 * MIB, &AnonSource::new(2 * MIB)),
        Err(MapError::InsufficientSpace { .. })
    ));

    assert_eq!(reservation.active_count().unwrap(), 0);
    reservation.delete().unwrap();
}

#[test]
fn test_invalid_granularity() {
    init_logging();
    let page = get_page_size();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();

    // cache line granular medium whose placement unit is still the page:
    // a sub-offset aligned to the cache line but not to the page is invalid
    let source = AnonSource::with_granularity(size, Granularity::CacheLine);
    assert!(matches!(
        reservation.map(page + 64, page, &source),
        Err(MapError::InvalidGranularity { .. })
    ));

    // an unaligned length is invalid too
    assert!(matches!(
        reservation.map(0, page + 64, &source),
        Err(MapError::InvalidGranularity { .. })
    ));

    // the whole reservation span reduces to the page rounded outer bounds
    let mapping = reservation.map(0, 0, &source).unwrap();
    assert_eq!(mapping.size(), size);

    mapping.unmap().unwrap();
    reservation.delete().unwrap();
}

#[test]
fn test_unmap_then_remap_is_idempotent() {
    init_logging();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();
    let source = get_test_file_source("test_unmap_then_remap", 4 * MIB);

    let first = reservation.map(4 * MIB, 0, &source).unwrap();
    let address = first.address();
    first.unmap().unwrap();

    // the identical placement is available again and indistinguishable
    let second = reservation.map(4 * MIB, 0, &source).unwrap();
    assert_eq!(second.address(), address);
    assert_eq!(second, first);

    second.unmap().unwrap();
    reservation.delete().unwrap();
}

#[test]
fn test_double_unmap() {
    init_logging();

    let reservation = VmReservation::create(MIB, None).unwrap();
    let mapping = reservation.map(0, 0, &AnonSource::new(MIB)).unwrap();
    let copy = mapping;

    mapping.unmap().unwrap();
    assert!(matches!(
        copy.unmap(),
        Err(MapError::MappingNotFound { offset: 0 })
    ));

    reservation.delete().unwrap();
}

#[test]
fn test_map_unmap_multiple_files() {
    init_logging();
    let slice_size = 4 * MIB;

    let reservation = VmReservation::create(16 * MIB, None).unwrap();

    let sources: Vec<_> = (0..4)
        .map(|index| {
            get_test_file_source(&format!("test_map_multiple_{}", index), slice_size)
        })
        .collect();

    let mut mappings: Vec<_> = sources
        .iter()
        .enumerate()
        .map(|(index, source)| reservation.map(index * slice_size, 0, source).unwrap())
        .collect();
    assert_eq!(reservation.active_count().unwrap(), 4);
    check_invariants(&reservation);

    // punch a hole in the middle and fill it again
    mappings.remove(1).unmap().unwrap();
    check_invariants(&reservation);
    mappings.push(reservation.map(slice_size, 0, &sources[1]).unwrap());
    assert_eq!(reservation.active_count().unwrap(), 4);
    check_invariants(&reservation);

    for mapping in mappings {
        mapping.unmap().unwrap();
    }
    assert_eq!(reservation.active_count().unwrap(), 0);
    reservation.delete().unwrap();
}

#[test]
fn test_find_mapping() {
    init_logging();
    let page = get_page_size();
    let size = 16 * MIB;

    let reservation = VmReservation::create(size, None).unwrap();
    let mapping = reservation
        .map(4 * MIB, 4 * MIB, &AnonSource::new(4 * MIB))
        .unwrap();

    assert_eq!(find_mapping(mapping.address(), 1), Some(mapping));
    // an address in the middle of the mapping finds it as well
    let inner = (mapping.address() as usize + 2 * MIB) as *const u8;
    assert_eq!(find_mapping(inner, page), Some(mapping));
    // reserved but unmapped space finds nothing
    assert_eq!(find_mapping(reservation.address(), 4 * MIB), None);

    mapping.unmap().unwrap();
    assert_eq!(find_mapping(mapping.address(), 1), None);

    reservation.delete().unwrap();
}

#[test]
fn test_open_existing_file() {
    init_logging();
    let path = "/tmp/test_open_existing_file.tmp";

    let file = std::fs::File::create(path).unwrap();
    file.set_len((4 * MIB) as u64).unwrap();
    drop(file);

    let source = FileSource::open(path).unwrap();
    assert_eq!(source.available_size(), 4 * MIB);

    let reservation = VmReservation::create(4 * MIB, None).unwrap();
    let mapping = reservation.map(0, 0, &source).unwrap();
    mapping.unmap().unwrap();
    reservation.delete().unwrap();

    // opening never takes ownership of the file
    assert!(std::path::Path::new(path).exists());
    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_dev_dax_source() {
    init_logging();
    let page = get_page_size();
    let size = 4 * MIB;

    // a regular file standing in for the character device; the metadata is
    // injected by the caller either way
    let path = "/tmp/test_dev_dax_source.tmp";
    let file = std::fs::File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .unwrap();
    file.set_len(size as u64).unwrap();

    let source = DevDaxSource::new(file, size, page, Some(ShutdownState { usc: 3 })).unwrap();
    assert_eq!(source.granularity(), Granularity::CacheLine);

    let reservation = VmReservation::create(size, None).unwrap();

    // the device alignment keeps sub-page placements out
    assert!(matches!(
        reservation.map(64, page, &source),
        Err(MapError::InvalidGranularity { .. })
    ));

    let mapping = reservation.map(0, 0, &source).unwrap();
    assert_eq!(mapping.granularity(), Granularity::CacheLine);
    assert_eq!(device_state(source.id()), Some(DeviceState::Clean));

    mapping.unmap().unwrap();
    assert_eq!(device_state(source.id()), None);

    reservation.delete().unwrap();
    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_shutdown_state_tracking() {
    init_logging();

    let mut source = AnonSource::new(MIB);
    source.set_shutdown_state(ShutdownState { usc: 7 });
    let id = source.id();

    let reservation = VmReservation::create(2 * MIB, None).unwrap();
    assert_eq!(device_state(id), None);

    let mapping = reservation.map(0, 0, &source).unwrap();
    assert_eq!(device_state(id), Some(DeviceState::Clean));

    mapping.unmap().unwrap();
    assert_eq!(device_state(id), None);

    // plain files carry no shutdown counter and are never tracked
    let file_source = get_test_file_source("test_shutdown_state_file", MIB);
    let mapping = reservation.map(0, 0, &file_source).unwrap();
    assert_eq!(device_state(file_source.id()), None);
    mapping.unmap().unwrap();

    reservation.delete().unwrap();
}
