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

use std::collections::{btree_map::Entry, BTreeMap};
use std::sync::Mutex;

use crate::modules::source::SourceId;

/// Snapshot of a device's unsafe shutdown counter, reported by the source
/// layer at map time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownState {
    pub usc: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// The shutdown counter did not move since the device was first mapped.
    Clean,
    /// The counter moved between mappings of the device; its content needs
    /// an integrity check before it can be trusted.
    Dirty,
}

struct SdsRecord {
    usc: u64,
    refs: usize,
    clean: bool,
}

/// One record per device with live mappings. A record is dropped with the
/// last mapping of its device, so the tracked state has mapping lifetime.
static RECORDS: Mutex<BTreeMap<SourceId, SdsRecord>> = Mutex::new(BTreeMap::new());

/// Called for every mapping created on a source; sources without a shutdown
/// counter pass `None` and are not tracked.
pub(crate) fn register(id: SourceId, state: Option<ShutdownState>) {
    let Some(state) = state else {
        return;
    };

    let mut records = RECORDS.lock().unwrap();
    match records.entry(id) {
        Entry::Vacant(vacant) => {
            vacant.insert(SdsRecord {
                usc: state.usc,
                refs: 1,
                clean: true,
            });
        }
        Entry::Occupied(mut occupied) => {
            let record = occupied.get_mut();
            record.refs += 1;
            if record.usc != state.usc {
                log::warn!(
                    "shutdown counter of device {}:{} moved from {} to {}",
                    id.device,
                    id.inode,
                    record.usc,
                    state.usc
                );
                record.usc = state.usc;
                record.clean = false;
            }
        }
    }
}

/// Called for every mapping teardown; a no-op for untracked sources.
pub(crate) fn unregister(id: SourceId) {
    let mut records = RECORDS.lock().unwrap();
    if let Some(record) = records.get_mut(&id) {
        record.refs -= 1;
        if record.refs == 0 {
            records.remove(&id);
        }
    }
}

/// State of a device across its current mappings.
///
/// `None` if no mapping of the device is live or the device does not keep a
/// shutdown counter. The mapping layer only maintains this lookup, judging
/// what a dirty device means is up to the caller.
pub fn device_state(id: SourceId) -> Option<DeviceState> {
    let records = RECORDS.lock().unwrap();

    records.get(&id).map(|record| {
        if record.clean {
            DeviceState::Clean
        } else {
            DeviceState::Dirty
        }
    })
}
