//! Latest-frame slot: single writer, many readers, last write wins

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;

use crate::video::Frame;

/// A frame together with its publication order
#[derive(Debug)]
pub struct PublishedFrame {
    /// Strictly increasing, starting at 1
    pub version: u64,
    pub frame: Frame,
    pub published_at: Instant,
}

/// Holds the most recent processed frame
///
/// `publish` replaces the whole entry with one pointer store, so readers see
/// either the previous or the new frame, never a mix. Superseded frames are
/// freed once the last reader drops its `Arc`.
pub struct LatestFrameSlot {
    current: ArcSwapOption<PublishedFrame>,
    next_version: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            next_version: AtomicU64::new(1),
        }
    }

    /// Store `frame` as the latest one and return its version
    ///
    /// Intended for the single producer thread.
    pub fn publish(&self, frame: Frame) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::AcqRel);
        self.current.store(Some(Arc::new(PublishedFrame {
            version,
            frame,
            published_at: Instant::now(),
        })));
        version
    }

    /// Latest published frame, if any
    pub fn current(&self) -> Option<Arc<PublishedFrame>> {
        self.current.load_full()
    }

    /// Version of the latest published frame (0 = nothing published yet)
    pub fn version(&self) -> u64 {
        self.current.load().as_ref().map(|p| p.version).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_until_published() {
        let slot = LatestFrameSlot::new();
        assert!(slot.current().is_none());
        assert_eq!(slot.version(), 0);

        let frame = Frame::solid(2, 2, [1, 2, 3]).unwrap();
        assert_eq!(slot.publish(frame.clone()), 1);
        assert_eq!(slot.publish(frame), 2);

        let current = slot.current().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.frame.pixel(1, 1), Some([1, 2, 3]));
    }

    #[test]
    fn test_reader_holds_superseded_frame() {
        let slot = LatestFrameSlot::new();
        slot.publish(Frame::solid(2, 2, [9, 9, 9]).unwrap());
        let held = slot.current().unwrap();
        slot.publish(Frame::solid(2, 2, [0, 0, 0]).unwrap());

        assert_eq!(held.frame.pixel(0, 0), Some([9, 9, 9]));
        assert_eq!(slot.current().unwrap().frame.pixel(0, 0), Some([0, 0, 0]));
    }

    #[test]
    fn test_versions_monotonic_under_concurrent_reads() {
        let slot = Arc::new(LatestFrameSlot::new());
        let frames: Vec<Frame> = (0..4u8)
            .map(|i| Frame::solid(4, 4, [i, i, i]).unwrap())
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..20_000 {
                        if let Some(p) = slot.current() {
                            assert!(p.version >= last, "{} < {}", p.version, last);
                            // a frame is always whole: every pixel equal
                            let first = p.frame.pixel(0, 0).unwrap();
                            assert_eq!(p.frame.pixel(3, 3).unwrap(), first);
                            last = p.version;
                        }
                    }
                    last
                })
            })
            .collect();

        for i in 0..5000 {
            slot.publish(frames[i % frames.len()].clone());
        }
        for reader in readers {
            assert!(reader.join().unwrap() <= 5000);
        }
        assert_eq!(slot.version(), 5000);
    }
}
