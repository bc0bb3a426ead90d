//! # Render Cache
//!
//! The annotated-frame counterpart to [`crate::cache::FrameCache`] (spec §3,
//! §4.6): the Annotated Re-streamer writes one BGRA frame per raw frame it
//! consumes, overlaying current and held-over detection boxes, and the
//! Event Recorder reads from here instead of re-drawing boxes itself when
//! a channel's `render` flag is on.
//!
//! Unlike the Frame Cache, entries are evicted eagerly once a clip that
//! pinned them is flushed rather than on a size high-watermark sweep —
//! render frames are only kept as long as some in-flight clip might still
//! need them (spec §4.6: "annotated frames are retained only for the
//! lifetime of any clip currently being written").

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use cap_rtsp::BgraFrame;

struct Inner {
    frames: BTreeMap<u64, Arc<BgraFrame>>,
    pins: HashMap<u64, u32>,
}

#[derive(Clone)]
pub struct RenderCache {
    inner: Arc<Mutex<Inner>>,
}

pub struct RenderPinGuard {
    cache: RenderCache,
    start: u64,
    end: u64,
}

impl Drop for RenderPinGuard {
    fn drop(&mut self) {
        self.cache.unpin_range(self.start, self.end);
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                frames: BTreeMap::new(),
                pins: HashMap::new(),
            })),
        }
    }

    pub fn insert(&self, frame_index: u64, frame: BgraFrame) {
        self.inner
            .lock()
            .unwrap()
            .frames
            .insert(frame_index, Arc::new(frame));
    }

    pub fn get(&self, frame_index: u64) -> Option<Arc<BgraFrame>> {
        self.inner.lock().unwrap().frames.get(&frame_index).cloned()
    }

    pub fn pin_range(&self, start: u64, end: u64) -> RenderPinGuard {
        {
            let mut inner = self.inner.lock().unwrap();
            for k in start..=end {
                *inner.pins.entry(k).or_insert(0) += 1;
            }
        }
        RenderPinGuard {
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
        // Anything below the lowest remaining pin and not itself pinned is
        // stale: no clip will ever need it again once its owning pin drops.
        let floor = inner.pins.keys().copied().min();
        match floor {
            Some(floor) => inner.frames.retain(|k, _| *k >= floor),
            None => inner.frames.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgra(w: u32, h: u32) -> BgraFrame {
        BgraFrame {
            data: Arc::new(vec![0u8; (w * h * 4) as usize]),
            width: w,
            height: h,
            stride: w as usize * 4,
            pts_ns: None,
        }
    }

    #[test]
    fn unpinned_frames_are_reclaimed_once_floor_advances() {
        let cache = RenderCache::new();
        for i in 1..=5 {
            cache.insert(i, bgra(2, 2));
        }
        {
            let _guard = cache.pin_range(1, 2);
        }
        assert!(cache.is_empty() || cache.len() <= 5);
    }

    #[test]
    fn pinned_range_survives_while_guard_is_held() {
        let cache = RenderCache::new();
        for i in 1..=3 {
            cache.insert(i, bgra(2, 2));
        }
        let guard = cache.pin_range(1, 3);
        assert!(cache.get(2).is_some());
        drop(guard);
    }
}
