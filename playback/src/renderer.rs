//! Render-context loop
//!
//! Invoked by the host audio callback with the global sample index of the
//! first output sample. Nothing here locks, allocates, logs or panics; every
//! anomaly is reported through atomic counters and silent output samples.

use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapCons, HeapProd};

use crate::params::StreamParams;
use crate::pipeline::Command;
use crate::ring::BlockRing;
use crate::shared::PlaybackShared;

/// Sample types the renderer can write
pub trait OutputSample: Copy {
    const SILENCE: Self;

    fn from_f64(value: f64) -> Self;
}

impl OutputSample for f32 {
    const SILENCE: Self = 0.0;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl OutputSample for f64 {
    const SILENCE: Self = 0.0;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Lifecycle of a renderer: `Idle -> Active -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// No parameter set received yet; output is left untouched
    Idle,
    /// Parameters present; blocks are played
    Active,
    /// Terminal; every further call returns `false`
    Stopped,
}

enum Lookup {
    Sample(f64),
    /// Next block starts after the target
    Pending,
    /// Ring is empty
    Exhausted,
}

/// Consumer side of the playback pipeline
pub struct RealtimeRenderer {
    commands: HeapCons<Command>,
    /// Replaced parameter sets, handed back so they are freed off this thread
    retired: HeapProd<Box<StreamParams>>,
    blocks: BlockRing,
    params: Option<Box<StreamParams>>,
    shared: Arc<PlaybackShared>,
    state: RendererState,
}

impl RealtimeRenderer {
    pub(crate) fn new(
        commands: HeapCons<Command>,
        retired: HeapProd<Box<StreamParams>>,
        blocks: BlockRing,
        shared: Arc<PlaybackShared>,
    ) -> Self {
        Self {
            commands,
            retired,
            blocks,
            params: None,
            shared,
            state: RendererState::Idle,
        }
    }

    /// Render one cycle starting at global sample `global_sample`
    ///
    /// Returns `false` once a stop has been requested; the host should then
    /// tear the unit down. Output samples with no covering block are silent.
    pub fn render<S: OutputSample>(&mut self, global_sample: u64, output: &mut [S]) -> bool {
        if self.state == RendererState::Stopped || self.shared.stop_requested() {
            if self.state != RendererState::Stopped {
                self.state = RendererState::Stopped;
                self.shared.mark_stopped();
            }
            return false;
        }

        self.shared.record_cycle();
        self.drain_commands();

        if self.params.is_some() {
            self.state = RendererState::Active;
            self.drop_stale(global_sample);
            self.fill(global_sample, output);
        } else {
            self.state = RendererState::Idle;
        }

        self.shared.publish_playhead(global_sample.saturating_add(output.len() as u64));
        self.shared.set_queued_blocks(self.blocks.len());
        true
    }

    /// Apply every command queued before this call
    ///
    /// `render` does this itself; hosts only need it to inspect the ring
    /// without rendering.
    pub fn drain_commands(&mut self) {
        // Bounded by what was pending on entry so a busy producer cannot stall the cycle
        let pending = self.commands.occupied_len();
        for _ in 0..pending {
            let Some(command) = self.commands.try_pop() else {
                break;
            };
            match command {
                Command::Restart => {
                    self.blocks.clear();
                    self.shared.record_restart();
                }
                Command::Block(block) => {
                    self.shared.record_block_received();
                    if self.blocks.push(block).is_err() {
                        self.shared.record_overflow();
                    }
                }
                Command::Params(params) => {
                    if let Some(old) = self.params.replace(params) {
                        // Only freed here if the control side stopped collecting
                        let _ = self.retired.try_push(old);
                    }
                }
            }
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Parameter set active for the current cycle
    pub fn params(&self) -> Option<&StreamParams> {
        self.params.as_deref()
    }

    /// Blocks waiting to be played
    pub fn queued(&self) -> &BlockRing {
        &self.blocks
    }

    pub fn shared(&self) -> &Arc<PlaybackShared> {
        &self.shared
    }

    /// Discard leading blocks that end at or before the playhead
    fn drop_stale(&mut self, global_sample: u64) {
        while let Some(block) = self.blocks.peek() {
            if block.end_sample() > global_sample {
                break;
            }
            let _ = self.blocks.pop();
            self.shared.record_stale_block();
        }
    }

    fn fill<S: OutputSample>(&mut self, global_sample: u64, output: &mut [S]) {
        let mut silent = 0;
        let mut exhausted_at = None;
        for (i, out) in output.iter_mut().enumerate() {
            match self.advance_to(global_sample.saturating_add(i as u64)) {
                Lookup::Sample(value) => *out = S::from_f64(value),
                Lookup::Pending => {
                    // Data for this position has not arrived; do not skip ahead
                    *out = S::SILENCE;
                    silent += 1;
                }
                Lookup::Exhausted => {
                    exhausted_at = Some(i);
                    break;
                }
            }
        }
        if let Some(start) = exhausted_at {
            let rest = &mut output[start..];
            rest.fill(S::SILENCE);
            silent += rest.len();
        }
        self.shared.record_underrun(silent);
    }

    /// Pop blocks that end before `target`, then look `target` up in the oldest
    fn advance_to(&mut self, target: u64) -> Lookup {
        loop {
            let Some(block) = self.blocks.peek() else {
                return Lookup::Exhausted;
            };
            if target >= block.end_sample() {
                let _ = self.blocks.pop();
                self.shared.record_block_played();
                continue;
            }
            return match block.sample_at(target) {
                Some(value) => Lookup::Sample(value),
                None => Lookup::Pending,
            };
        }
    }
}
