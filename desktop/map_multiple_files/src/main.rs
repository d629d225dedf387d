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

use env_logger::{Builder, Env};
use pmem_vmap::{modules::source::FileSource, VmReservation};

const FILE_COUNT: usize = 4;
const FILE_SIZE: usize = 1024 * 1024;

// Reserves one contiguous address range and places several file backed
// mappings side by side in it, so the files appear as one continuous
// memory area.
fn main() {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Info)
        .format_module_path(false)
        .init();

    let reservation = VmReservation::create(FILE_COUNT * FILE_SIZE, None).unwrap();
    log::info!(
        "reservation at {:p}, {} bytes",
        reservation.address(),
        reservation.size()
    );

    let mut sources = Vec::new();
    let mut mappings = Vec::new();
    for index in 0..FILE_COUNT {
        let source = FileSource::create(
            format!("/tmp/map_multiple_files_{}.data", index),
            FILE_SIZE,
        )
        .unwrap();

        let mapping = reservation.map(index * FILE_SIZE, 0, &source).unwrap();

        // fill each slice with a distinct byte so the layout is visible
        let data = unsafe { slice::from_raw_parts_mut(mapping.address(), mapping.size()) };
        data.fill(b'a' + index as u8);

        sources.push(source);
        mappings.push(mapping);
    }

    // the whole reservation now reads as one contiguous area
    let combined =
        unsafe { slice::from_raw_parts(reservation.address(), reservation.size()) };
    for (index, chunk) in combined.chunks(FILE_SIZE).enumerate() {
        println!(
            "slice {} at {:p} starts with '{}'",
            index,
            chunk.as_ptr(),
            chunk[0] as char
        );
    }

    for mapping in mappings {
        mapping.unmap().unwrap();
    }
    reservation.delete().unwrap();

    log::info!("all mappings gone, reservation released");
}
