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

use crate::granularity::Granularity;
use crate::modules::source::SourceId;

#[derive(Debug, Clone)]
pub(crate) struct RegionEntry {
    pub(crate) length: usize,
    pub(crate) granularity: Granularity,
    pub(crate) source: SourceId,
}

/// The mappings of one reservation, keyed by their offset.
///
/// Backed by an ordered map so that overlap and neighbor queries stay
/// logarithmic in the number of mappings.
#[derive(Debug)]
pub(crate) struct RegionMap {
    entries: BTreeMap<usize, RegionEntry>,
}

impl RegionMap {
    pub(crate) const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Finds the earliest mapping intersecting `[offset, offset + length)`.
    ///
    /// Intersection is ordinary half open interval overlap: touching ranges
    /// do not intersect.
    pub(crate) fn find(&self, offset: usize, length: usize) -> Option<(usize, &RegionEntry)> {
        let end = offset.saturating_add(length);

        self.find_prior_or_eq(offset)
            .or_else(|| self.find_later(offset, end))
    }

    /// mapping starting at `offset` or before it that reaches past `offset`
    fn find_prior_or_eq(&self, offset: usize) -> Option<(usize, &RegionEntry)> {
        let (start, entry) = self.entries.range(..=offset).next_back()?;
        if start + entry.length <= offset {
            return None;
        }

        Some((*start, entry))
    }

    /// mapping starting inside `(offset, end)`
    fn find_later(&self, offset: usize, end: usize) -> Option<(usize, &RegionEntry)> {
        let (start, entry) = self.entries.range(offset..end).next()?;

        Some((*start, entry))
    }

    pub(crate) fn get(&self, offset: usize) -> Option<&RegionEntry> {
        self.entries.get(&offset)
    }

    pub(crate) fn insert(&mut self, offset: usize, entry: RegionEntry) {
        debug_assert!(self.find(offset, entry.length).is_none());

        self.entries.insert(offset, entry);
    }

    /// Removes the entry placed at exactly `offset` with exactly `length`
    /// bytes.
    pub(crate) fn remove(&mut self, offset: usize, length: usize) -> Option<RegionEntry> {
        match self.entries.get(&offset) {
            Some(entry) if entry.length == length => self.entries.remove(&offset),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &RegionEntry)> {
        self.entries.iter().map(|(offset, entry)| (*offset, entry))
    }
}
