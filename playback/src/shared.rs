//! State shared between the control and render contexts
//!
//! Flags use release/acquire ordering. Counters are relaxed: they are
//! diagnostics only and never gate behaviour.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Flags, the published playhead, and render diagnostics
#[derive(Debug, Default)]
pub struct PlaybackShared {
    /// Set by the control context; the renderer observes it on its next cycle
    should_stop: AtomicBool,
    /// Set by the renderer once it has returned the terminal signal
    stopped: AtomicBool,
    /// Global sample index just past the most recent render cycle
    playhead: AtomicU64,

    cycles: AtomicU64,
    blocks_received: AtomicU64,
    blocks_played: AtomicU64,
    overflows: AtomicU64,
    stale_blocks: AtomicU64,
    underrun_samples: AtomicU64,
    restarts: AtomicU64,
    queued_blocks: AtomicUsize,
}

impl PlaybackShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether the renderer has reached its terminal state
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn publish_playhead(&self, global_sample: u64) {
        self.playhead.store(global_sample, Ordering::Release);
    }

    /// Global sample clock as last seen by the renderer
    pub fn playhead(&self) -> u64 {
        self.playhead.load(Ordering::Acquire)
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block_received(&self) {
        self.blocks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_block_played(&self) {
        self.blocks_played.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_block(&self) {
        self.stale_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_underrun(&self, samples: usize) {
        if samples > 0 {
            self.underrun_samples
                .fetch_add(samples as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }


    pub(crate) fn set_queued_blocks(&self, queued: usize) {
        self.queued_blocks.store(queued, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            playhead: self.playhead(),
            cycles: self.cycles.load(Ordering::Relaxed),
            blocks_received: self.blocks_received.load(Ordering::Relaxed),
            blocks_played: self.blocks_played.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            stale_blocks: self.stale_blocks.load(Ordering::Relaxed),
            underrun_samples: self.underrun_samples.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            queued_blocks: self.queued_blocks.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`PlaybackShared`] counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub playhead: u64,
    /// Render invocations that got past the stop check
    pub cycles: u64,
    /// Blocks moved from the command queue into the ring
    pub blocks_received: u64,
    /// Blocks popped after being played through
    pub blocks_played: u64,
    /// Blocks evicted by drop-oldest, in the ring or the ingest backlog
    pub overflows: u64,
    /// Blocks discarded because they ended before the playhead
    pub stale_blocks: u64,
    /// Output samples left silent while active
    pub underrun_samples: u64,
    /// Epoch restarts applied by the renderer
    pub restarts: u64,
    /// Blocks in the ring at the end of the last cycle
    pub queued_blocks: usize,
}

impl PlaybackStats {
    /// Counter increments since `earlier`; gauges keep their current value
    pub fn since(&self, earlier: &PlaybackStats) -> PlaybackStats {
        PlaybackStats {
            playhead: self.playhead,
            cycles: self.cycles.saturating_sub(earlier.cycles),
            blocks_received: self.blocks_received.saturating_sub(earlier.blocks_received),
            blocks_played: self.blocks_played.saturating_sub(earlier.blocks_played),
            overflows: self.overflows.saturating_sub(earlier.overflows),
            stale_blocks: self.stale_blocks.saturating_sub(earlier.stale_blocks),
            underrun_samples: self.underrun_samples.saturating_sub(earlier.underrun_samples),
            restarts: self.restarts.saturating_sub(earlier.restarts),
            queued_blocks: self.queued_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_round_trip() {
        let shared = PlaybackShared::new();
        assert!(!shared.stop_requested());
        assert!(!shared.is_stopped());
        shared.request_stop();
        assert!(shared.stop_requested());
        assert!(!shared.is_stopped());
        shared.mark_stopped();
        assert!(shared.is_stopped());
    }

    #[test]
    fn test_stats_since() {
        let shared = PlaybackShared::new();
        shared.record_overflow();
        shared.record_underrun(64);
        let first = shared.stats();

        shared.record_overflow();
        shared.record_overflow();
        shared.record_underrun(0);
        shared.record_underrun(10);
        shared.set_queued_blocks(3);
        shared.publish_playhead(512);

        let delta = shared.stats().since(&first);
        assert_eq!(delta.overflows, 2);
        assert_eq!(delta.underrun_samples, 10);
        assert_eq!(delta.queued_blocks, 3);
        assert_eq!(delta.playhead, 512);
    }
}
