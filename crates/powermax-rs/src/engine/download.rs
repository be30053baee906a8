// crates/powermax-rs/src/engine/download.rs
//! Bookkeeping for the EEPROM download phase: which ranges were requested,
//! and which of them the panel has actually delivered.

use crate::mmap::MemoryMap;
use alloc::vec::Vec;

/// Half-page granularity of the generic tiling requests.
pub(crate) const TILE_LEN: u16 = 0x80;

/// Highest main-image page the engine will tile. The panel declares its
/// geometry in the download-info reply; captures from PowerMax Pro class
/// panels never exceed this.
pub(crate) const MAX_MAIN_PAGE: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DownloadRange {
    pub page: u8,
    pub offset: u8,
    pub len: u16,
}

/// The set of EEPROM ranges requested from the panel. Download completeness
/// is judged against this set, so swapping in a different capture means
/// changing only the request sites.
#[derive(Debug, Default)]
pub(crate) struct DownloadTracker {
    ranges: Vec<DownloadRange>,
}

impl DownloadTracker {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Records a requested range.
    pub fn request(&mut self, page: u8, offset: u8, len: u16) {
        self.ranges.push(DownloadRange { page, offset, len });
    }

    /// First requested range the image does not fully back yet.
    pub fn first_missing(&self, map: &MemoryMap) -> Option<DownloadRange> {
        self.ranges
            .iter()
            .copied()
            .find(|r| !map.range_present(r.page, r.offset, r.len as usize))
    }

    /// True once every requested range is present in the image.
    pub fn is_complete(&self, map: &MemoryMap) -> bool {
        !self.ranges.is_empty() && self.first_missing(map).is_none()
    }

    /// The generic page tiling for a main image of `last_page + 1` pages.
    pub fn main_tiles(last_page: u8) -> impl Iterator<Item = DownloadRange> {
        (0..=last_page.min(MAX_MAIN_PAGE)).flat_map(|page| {
            [
                DownloadRange { page, offset: 0x00, len: TILE_LEN },
                DownloadRange { page, offset: 0x80, len: TILE_LEN },
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness_requires_every_range() {
        let mut tracker = DownloadTracker::new();
        tracker.request(0x00, 0x00, 0x80);
        tracker.request(0x02, 0x00, 0x1E0);

        let mut map = MemoryMap::new();
        assert!(!tracker.is_complete(&map));

        map.write(0x00, 0x00, &[0; 0x80]);
        let missing = tracker.first_missing(&map).unwrap();
        assert_eq!((missing.page, missing.offset), (0x02, 0x00));

        map.write(0x02, 0x00, &[0; 0x1E0]);
        assert!(tracker.is_complete(&map));
    }

    #[test]
    fn empty_tracker_is_never_complete() {
        let tracker = DownloadTracker::new();
        let map = MemoryMap::new();
        assert!(!tracker.is_complete(&map));
    }

    #[test]
    fn tiling_is_capped_at_the_known_geometry() {
        let tiles: alloc::vec::Vec<_> = DownloadTracker::main_tiles(0xFF).collect();
        assert_eq!(tiles.len(), 2 * (MAX_MAIN_PAGE as usize + 1));
        assert_eq!(tiles[0], DownloadRange { page: 0, offset: 0, len: TILE_LEN });
        assert_eq!(tiles.last().unwrap().page, MAX_MAIN_PAGE);
    }
}
