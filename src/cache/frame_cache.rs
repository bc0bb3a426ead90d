//! # Frame Cache
//!
//! The ordered, bounded sliding window of recent raw frames described in
//! spec §3/§4.1. Keys (`frame_index`) are strictly monotonic on the write
//! side; reads come from the Reconstructor (cache-miss retry), the
//! De-duplicator (re-running motion on future frames) and the Event
//! Recorder (fetching frames for a pinned clip range) while the Dispatcher
//! writes — so every public method takes `&self`, not `&mut self`, and
//! locks internally.
//!
//! Eviction is oldest-first and only runs when the map exceeds `max_cache`
//! (spec §4.1: "asynchronously evict the oldest half, never blocking
//! ingest"). A key with a positive pin count is never evicted — the Event
//! Recorder pins the range it has promised to write before it starts
//! writing, and unpins it once the clip is flushed (spec §3, invariant 5).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::model::Frame;

struct Inner {
    frames: BTreeMap<u64, Frame>,
    pins: HashMap<u64, u32>,
    max_cache: usize,
    drops: u64,
}

/// Shared, cloneable handle to one channel's Frame Cache. Clones are `Arc`
/// bumps — every task holding a `FrameCache` sees the same underlying map.
#[derive(Clone)]
pub struct FrameCache {
    inner: Arc<Mutex<Inner>>,
}

/// RAII guard returned by [`FrameCache::pin_range`]. Dropping it unpins the
/// range, mirroring the Recorder's `Flushing -> Idle` transition (spec §4.5)
/// without requiring every call site to remember to unpin on every exit
/// path (including panics/early-return on write failure, spec §7.5).
pub struct PinGuard {
    cache: FrameCache,
    start: u64,
    end: u64,
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.cache.unpin_range(self.start, self.end);
    }
}

impl FrameCache {
    pub fn new(max_cache: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                frames: BTreeMap::new(),
                pins: HashMap::new(),
                max_cache,
                drops: 0,
            })),
        }
    }

    /// Insert a frame. Panics if `frame_index` is not strictly greater than
    /// the highest key already present — the Dispatcher is the sole writer
    /// and spec §5 requires the write side to be "globally monotonic and
    /// gap-free", so a violation here is a Dispatcher bug, not a runtime
    /// condition to recover from.
    pub fn insert(&self, frame: Frame) {
        let mut inner = self.inner.lock().unwrap();
        if let Some((&last, _)) = inner.frames.iter().next_back() {
            assert!(
                frame.frame_index > last,
                "frame_index must be strictly monotonic: got {} after {last}",
                frame.frame_index
            );
        }
        inner.frames.insert(frame.frame_index, frame);
    }

    /// `true` if eviction should run (spec §4.1: "if the cache exceeds
    /// `max_cache`, asynchronously evict the oldest half").
    pub fn needs_eviction(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.frames.len() > inner.max_cache
    }

    /// Evict the oldest half of unpinned entries. Called from a background
    /// task spawned by the Dispatcher so it never blocks ingest.
    pub fn evict_oldest_half(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let target = inner.frames.len() / 2;
        let mut removed = 0;
        let evictable: Vec<u64> = inner
            .frames
            .keys()
            .copied()
            .filter(|k| !inner.pins.contains_key(k))
            .take(target)
            .collect();
        for key in evictable {
            inner.frames.remove(&key);
            removed += 1;
        }
        removed
    }

    pub fn get(&self, frame_index: u64) -> Option<Frame> {
        self.inner.lock().unwrap().frames.get(&frame_index).cloned()
    }

    /// The nearest frame at or before `frame_index`, used by the Event
    /// Recorder to fill missing indices (spec §4.5 ordering guarantee:
    /// "filled from the nearest prior cached raw frame").
    pub fn get_nearest_prior(&self, frame_index: u64) -> Option<Frame> {
        let inner = self.inner.lock().unwrap();
        inner
            .frames
            .range(..=frame_index)
            .next_back()
            .map(|(_, f)| f.clone())
    }

    pub fn highest_index(&self) -> Option<u64> {
        self.inner.lock().unwrap().frames.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pin an inclusive range so it survives eviction sweeps, returning a
    /// guard that unpins it on drop.
    pub fn pin_range(&self, start: u64, end: u64) -> PinGuard {
        {
            let mut inner = self.inner.lock().unwrap();
            for k in start..=end {
                *inner.pins.entry(k).or_insert(0) += 1;
            }
        }
        PinGuard {
            cache: self.clone(),
            start,
            end,
        }
    }

    fn unpin_range(&self, start: u64, end: u64) {
        let mut inner = self.inner.lock().unwrap();
        for k in start..=end {
            if let Some(count) = inner.pins.get_mut(&k) {
                *count -= 1;
                if *count == 0 {
                    inner.pins.remove(&k);
                }
            }
        }
    }

    pub fn is_pinned(&self, frame_index: u64) -> bool {
        self.inner.lock().unwrap().pins.contains_key(&frame_index)
    }

    pub fn record_drop(&self) {
        self.inner.lock().unwrap().drops += 1;
    }

    pub fn drop_count(&self) -> u64 {
        self.inner.lock().unwrap().drops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(idx: u64) -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, idx)
    }

    #[test]
    #[should_panic(expected = "strictly monotonic")]
    fn insert_rejects_non_monotonic_index() {
        let cache = FrameCache::new(10);
        cache.insert(frame(5));
        cache.insert(frame(5));
    }

    #[test]
    fn pinned_keys_survive_eviction() {
        let cache = FrameCache::new(4);
        for i in 1..=8 {
            cache.insert(frame(i));
        }
        let guard = cache.pin_range(1, 2);
        assert!(cache.needs_eviction());
        cache.evict_oldest_half();
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_some());
        drop(guard);
    }

    #[test]
    fn unpin_via_drop_allows_future_eviction() {
        let cache = FrameCache::new(4);
        for i in 1..=8 {
            cache.insert(frame(i));
        }
        {
            let _guard = cache.pin_range(1, 1);
        } // dropped here, unpinning
        cache.evict_oldest_half();
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn nearest_prior_fills_gaps() {
        let cache = FrameCache::new(10);
        cache.insert(frame(1));
        cache.insert(frame(5));
        let nearest = cache.get_nearest_prior(4).unwrap();
        assert_eq!(nearest.frame_index, 1);
    }

    #[test]
    fn eviction_only_removes_oldest_half() {
        let cache = FrameCache::new(4);
        for i in 1..=8 {
            cache.insert(frame(i));
        }
        let removed = cache.evict_oldest_half();
        assert_eq!(removed, 4);
        assert!(cache.get(1).is_none());
        assert!(cache.get(8).is_some());
    }
}
