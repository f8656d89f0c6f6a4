#![forbid(unsafe_code)]

//! Bounded cache of assembled color-delta sequences.
//!
//! The diff loop re-derives the same handful of `(fg, bg, needs-bg-reset)`
//! deltas over and over; this LRU keeps the assembled strings around. It is
//! purely an allocation-avoidance layer — the renderer is correct with a
//! zero-capacity cache.
//!
//! Map plus an order queue: each touch stamps the entry and records the
//! stamp in the queue; eviction pops queue entries until one's stamp still
//! matches the map, which is the genuine least-recently-used key.

use std::collections::{HashMap, VecDeque};

use crate::ansi;
use crate::color::PackedColor;

/// Cache key: the color pair plus whether the delta needs the `49` prefix.
type Key = (PackedColor, PackedColor, bool);

/// Maximum number of cached deltas.
pub const SGR_CACHE_CAP: usize = 1024;

/// LRU cache from color-delta key to the assembled escape sequence.
#[derive(Debug)]
pub struct SgrCache {
    entries: HashMap<Key, (String, u64)>,
    order: VecDeque<(Key, u64)>,
    stamp: u64,
    cap: usize,
}

impl SgrCache {
    /// A cache with the standard capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(SGR_CACHE_CAP)
    }

    /// A cache bounded at `cap` entries. `cap == 0` disables caching.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            stamp: 0,
            cap,
        }
    }

    /// The delta sequence for this key, assembling and caching on miss.
    pub fn delta(&mut self, fg: PackedColor, bg: PackedColor, reset_bg: bool) -> &str {
        let key = (fg, bg, reset_bg);
        self.stamp += 1;
        let stamp = self.stamp;

        if !self.entries.contains_key(&key) {
            if self.cap == 0 {
                // cap 0: a single scratch entry, replaced on every miss.
                self.entries.clear();
                self.order.clear();
            } else if self.entries.len() >= self.cap {
                self.evict_one();
            }
            let seq = ansi::color_delta(fg, bg, reset_bg);
            self.entries.insert(key, (seq, stamp));
        } else if let Some(entry) = self.entries.get_mut(&key) {
            entry.1 = stamp;
        }
        self.order.push_back((key, stamp));
        self.trim_order();

        &self.entries[&key].0
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Remove the least recently used entry.
    fn evict_one(&mut self) {
        while let Some((key, stamp)) = self.order.pop_front() {
            match self.entries.get(&key) {
                // Stamp matches: this queue record is the key's latest
                // touch, so the key is the genuine LRU.
                Some((_, live)) if *live == stamp => {
                    self.entries.remove(&key);
                    return;
                }
                // Stale record from an earlier touch; skip it.
                _ => {}
            }
        }
    }

    /// Keep the order queue from growing unboundedly on repeated hits.
    fn trim_order(&mut self) {
        let limit = self.cap.saturating_mul(4).max(64);
        while self.order.len() > limit {
            if let Some((key, stamp)) = self.order.pop_front() {
                if matches!(self.entries.get(&key), Some((_, live)) if *live == stamp) {
                    // Still the live record; re-stamp so it survives.
                    self.stamp += 1;
                    let fresh = self.stamp;
                    if let Some(entry) = self.entries.get_mut(&key) {
                        entry.1 = fresh;
                    }
                    self.order.push_back((key, fresh));
                }
            }
        }
    }
}

impl Default for SgrCache {
    fn default() -> Self {
        Self::new()
    }
}
