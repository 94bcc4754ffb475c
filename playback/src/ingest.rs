//! Control-context entry point
//!
//! Turns incoming messages into commands for the renderer. Epoch math happens
//! here so the render context only ever sees global sample indices.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapCons, HeapProd};
use tracing::{debug, trace, warn};

use crate::block::Block;
use crate::error::IngestError;
use crate::message::IngestMessage;
use crate::params::StreamParams;
use crate::pipeline::Command;
use crate::shared::{PlaybackShared, PlaybackStats};
use crate::sse::SseEvent;

/// Base of the current stream epoch
///
/// Captured from the global sample clock whenever a chunk with local offset 0
/// arrives. Only the control context reads or writes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockEpoch {
    pub sample_offset: u64,
}

impl ClockEpoch {
    /// Global index of a sample `local_offset` samples into this epoch, or
    /// `None` past the end of the clock
    #[inline]
    pub fn global_start(&self, local_offset: u64) -> Option<u64> {
        self.sample_offset.checked_add(local_offset)
    }
}

/// Producer side of the playback pipeline
///
/// Never blocks and never refuses a command for lack of room. Commands the
/// queue cannot take yet wait in a local backlog, which is flushed on every
/// call. A backlog holding more blocks than the ring can keep evicts its
/// oldest block, as the ring would. Hosts that go quiet while a backlog is
/// pending call [`flush`](Self::flush) periodically.
pub struct StreamIngest {
    commands: HeapProd<Command>,
    /// Commands waiting for queue space, oldest first
    backlog: VecDeque<Command>,
    backlog_blocks: usize,
    block_capacity: usize,
    /// Parameter sets the renderer has replaced, freed here
    retired: HeapCons<Box<StreamParams>>,
    shared: Arc<PlaybackShared>,
    epoch: ClockEpoch,
}

impl StreamIngest {
    pub(crate) fn new(
        commands: HeapProd<Command>,
        retired: HeapCons<Box<StreamParams>>,
        block_capacity: usize,
        shared: Arc<PlaybackShared>,
    ) -> Self {
        Self {
            commands,
            backlog: VecDeque::new(),
            backlog_blocks: 0,
            block_capacity: block_capacity.max(1),
            retired,
            shared,
            epoch: ClockEpoch::default(),
        }
    }

    /// Apply one decoded message
    pub fn handle(&mut self, message: IngestMessage) -> Result<(), IngestError> {
        match message {
            IngestMessage::Stop => {
                self.stop();
                Ok(())
            }
            IngestMessage::Params(params) => self.set_params(params),
            IngestMessage::Buffer { start, samples } => self.push_buffer(start, samples),
        }
    }

    /// Decode and apply a JSON control message
    ///
    /// Malformed messages are logged and returned; nothing reaches the renderer.
    pub fn handle_json(&mut self, text: &str) -> Result<(), IngestError> {
        let message = IngestMessage::from_json(text).inspect_err(|e| {
            warn!("Ignoring malformed control message: {}", e);
        })?;
        self.handle(message)
    }

    /// Apply a server-sent event from the upstream stream
    ///
    /// Keep-alives and unrelated event types are accepted and ignored.
    pub fn handle_event(&mut self, event: SseEvent) -> Result<(), IngestError> {
        let message = event.into_message().inspect_err(|e| {
            warn!("Ignoring malformed stream event: {}", e);
        })?;
        match message {
            Some(message) => self.handle(message),
            None => Ok(()),
        }
    }

    /// Ask the renderer to stop; it returns the terminal signal on its next cycle
    pub fn stop(&mut self) {
        if !self.shared.stop_requested() {
            debug!("Stop requested at sample {}", self.shared.playhead());
        }
        self.shared.request_stop();
        self.backlog.clear();
        self.backlog_blocks = 0;
    }

    /// Replace the active parameter set
    pub fn set_params(&mut self, params: StreamParams) -> Result<(), IngestError> {
        self.ensure_running()?;
        params.validate().inspect_err(|e| warn!("Rejecting params: {}", e))?;
        debug!(
            "Updating params: {} Hz, {} samples per block",
            params.audio_sample_rate, params.audio_block_size
        );
        self.enqueue(Command::Params(Box::new(params)));
        Ok(())
    }

    /// Queue a chunk that starts `local_offset` samples into the current epoch
    ///
    /// `local_offset == 0` starts a new epoch: the current global sample clock
    /// becomes the epoch base and every block still queued from the previous
    /// epoch is discarded.
    pub fn push_buffer(&mut self, local_offset: u64, samples: Vec<f64>) -> Result<(), IngestError> {
        self.ensure_running()?;
        if samples.is_empty() {
            warn!("Ignoring empty buffer at offset {}", local_offset);
            return Err(IngestError::Malformed("empty sample buffer".into()));
        }

        let epoch = if local_offset == 0 {
            ClockEpoch {
                sample_offset: self.shared.playhead(),
            }
        } else {
            self.epoch
        };
        let start_sample = epoch
            .global_start(local_offset)
            .filter(|start| start.checked_add(samples.len() as u64).is_some())
            .ok_or_else(|| {
                warn!("Ignoring buffer at offset {} past the sample clock", local_offset);
                IngestError::Malformed(format!(
                    "buffer at offset {local_offset} overflows the sample clock"
                ))
            })?;

        if local_offset == 0 {
            self.epoch = epoch;
            debug!("New stream epoch at sample {}", epoch.sample_offset);
            self.enqueue(Command::Restart);
        }

        let block = Block::new(start_sample, samples);
        trace!(
            "Queueing block [{}, {})",
            block.start_sample(),
            block.end_sample()
        );
        self.enqueue(Command::Block(block));
        Ok(())
    }

    /// Move backlogged commands into the queue and free retired parameter sets
    pub fn flush(&mut self) {
        while self.retired.try_pop().is_some() {}

        while let Some(command) = self.backlog.pop_front() {
            let is_block = matches!(command, Command::Block(_));
            if let Err(command) = self.commands.try_push(command) {
                self.backlog.push_front(command);
                break;
            }
            if is_block {
                self.backlog_blocks -= 1;
            }
        }
    }

    pub fn epoch(&self) -> ClockEpoch {
        self.epoch
    }

    pub fn shared(&self) -> &Arc<PlaybackShared> {
        &self.shared
    }

    pub fn stats(&self) -> PlaybackStats {
        self.shared.stats()
    }

    /// Commands not yet applied by the renderer, queued or backlogged
    pub fn pending_commands(&self) -> usize {
        self.commands.occupied_len() + self.backlog.len()
    }

    /// Commands waiting for room in the queue
    pub fn backlogged_commands(&self) -> usize {
        self.backlog.len()
    }

    /// Whether the renderer has acknowledged the stop
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Reporter that logs render diagnostics from this control context
    pub fn diagnostics(&self, interval: Duration) -> DiagnosticsReporter {
        DiagnosticsReporter::new(Arc::clone(&self.shared), interval)
    }

    fn ensure_running(&self) -> Result<(), IngestError> {
        if self.shared.stop_requested() {
            return Err(IngestError::Stopped);
        }
        Ok(())
    }

    fn enqueue(&mut self, command: Command) {
        self.flush();
        let command = if self.backlog.is_empty() {
            match self.commands.try_push(command) {
                Ok(()) => return,
                Err(command) => {
                    trace!("Command queue full, backlogging");
                    command
                }
            }
        } else {
            command
        };

        match &command {
            Command::Restart => {
                // Blocks of the previous epoch would be cleared on arrival anyway
                self.backlog.retain(|c| !matches!(c, Command::Block(_)));
                self.backlog_blocks = 0;
            }
            Command::Block(_) => self.backlog_blocks += 1,
            Command::Params(_) => {}
        }
        self.backlog.push_back(command);

        if self.backlog_blocks > self.block_capacity {
            self.evict_oldest_backlogged_block();
        }
    }

    /// Drop-oldest for blocks the ring has not seen yet
    fn evict_oldest_backlogged_block(&mut self) {
        let Some(index) = self
            .backlog
            .iter()
            .position(|c| matches!(c, Command::Block(_)))
        else {
            return;
        };
        if let Some(Command::Block(block)) = self.backlog.remove(index) {
            trace!("Backlog full, dropping block at {}", block.start_sample());
        }
        self.backlog_blocks -= 1;
        self.shared.record_overflow();
    }
}

/// Periodic logger for render-side counters
///
/// The renderer only bumps atomics; this runs in the control context and turns
/// them into log lines.
pub struct DiagnosticsReporter {
    shared: Arc<PlaybackShared>,
    interval: Duration,
    last: PlaybackStats,
    last_log_time: Instant,
}

impl DiagnosticsReporter {
    pub fn new(shared: Arc<PlaybackShared>, interval: Duration) -> Self {
        Self {
            shared,
            interval,
            last: PlaybackStats::default(),
            last_log_time: Instant::now(),
        }
    }

    /// Log if the interval has elapsed; returns the reported delta
    pub fn maybe_log(&mut self) -> Option<PlaybackStats> {
        if self.last_log_time.elapsed() < self.interval {
            return None;
        }
        Some(self.report())
    }

    /// Log counter changes since the previous report and return them
    pub fn report(&mut self) -> PlaybackStats {
        let current = self.shared.stats();
        let delta = current.since(&self.last);

        if delta.overflows > 0 {
            warn!(
                "Block ring overflow: {} oldest blocks dropped",
                delta.overflows
            );
        }
        if delta.underrun_samples > 0 {
            debug!(
                "Underrun: {} samples rendered as silence",
                delta.underrun_samples
            );
        }
        debug!(
            "PLAYBACK: playhead={}, cycles={}, received={}, played={}, stale={}, \
             restarts={}, queued={}",
            delta.playhead,
            delta.cycles,
            delta.blocks_received,
            delta.blocks_played,
            delta.stale_blocks,
            delta.restarts,
            delta.queued_blocks
        );

        self.last = current;
        self.last_log_time = Instant::now();
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineOptions, pipeline};
    use crate::renderer::RealtimeRenderer;

    fn starts(renderer: &RealtimeRenderer) -> Vec<u64> {
        renderer.queued().iter().map(Block::start_sample).collect()
    }

    // =============================================================
    // Overflow (drop-oldest, never refuse)
    // =============================================================

    #[test]
    fn test_capacity_plus_one_evicts_oldest() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions {
            block_capacity: 4,
            command_capacity: 0,
        });
        for k in 0..5u64 {
            ingest.push_buffer(k * 8, vec![1.0; 8]).unwrap();
        }
        assert_eq!(ingest.backlogged_commands(), 0);

        renderer.drain_commands();
        assert_eq!(starts(&renderer), vec![8, 16, 24, 32]);
        assert_eq!(ingest.stats().overflows, 1);
    }

    #[test]
    fn test_default_pipeline_takes_a_burst_without_rendering() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
        for k in 0..1100u64 {
            ingest.push_buffer(k * 4, vec![0.5; 4]).unwrap();
        }

        renderer.drain_commands();
        assert_eq!(renderer.queued().len(), 1100);
        assert_eq!(renderer.queued().iter().last().map(Block::start_sample), Some(4396));
        assert_eq!(ingest.stats().overflows, 0);
    }

    #[test]
    fn test_backlog_evicts_its_oldest_block() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions {
            block_capacity: 2,
            command_capacity: 0,
        });
        // Queue holds 4: restart + three blocks
        for k in 0..3u64 {
            ingest.push_buffer(k * 4, vec![1.0; 4]).unwrap();
        }
        for k in 3..6u64 {
            ingest.push_buffer(k * 4, vec![1.0; 4]).unwrap();
        }
        assert_eq!(ingest.backlogged_commands(), 2);
        assert_eq!(ingest.pending_commands(), 6);
        assert_eq!(ingest.stats().overflows, 1);

        renderer.drain_commands();
        ingest.flush();
        renderer.drain_commands();
        assert_eq!(starts(&renderer), vec![16, 20]);
        assert_eq!(ingest.pending_commands(), 0);
    }

    #[test]
    fn test_restart_is_never_refused_when_queue_is_full() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions {
            block_capacity: 2,
            command_capacity: 0,
        });
        for k in 0..4u64 {
            ingest.push_buffer(k * 4, vec![1.0; 4]).unwrap();
        }
        assert_eq!(ingest.backlogged_commands(), 1);

        // New epoch while the queue is full: stale backlog blocks go, restart waits
        ingest.push_buffer(0, vec![9.0; 4]).unwrap();
        assert_eq!(ingest.backlogged_commands(), 2);

        renderer.drain_commands();
        ingest.flush();
        renderer.drain_commands();
        assert_eq!(starts(&renderer), vec![0]);
        assert_eq!(renderer.queued().peek().unwrap().samples(), &[9.0; 4]);
        assert_eq!(ingest.stats().restarts, 2);
    }

    #[test]
    fn test_stop_discards_backlog() {
        let (mut ingest, _renderer) = pipeline(PipelineOptions {
            block_capacity: 1,
            command_capacity: 0,
        });
        for k in 0..4u64 {
            ingest.push_buffer(k, vec![1.0]).unwrap();
        }
        assert!(ingest.backlogged_commands() > 0);

        ingest.stop();
        assert_eq!(ingest.backlogged_commands(), 0);
        assert!(matches!(ingest.push_buffer(4, vec![1.0]), Err(IngestError::Stopped)));
    }

    // =============================================================
    // Sample clock bounds
    // =============================================================

    #[test]
    fn test_offset_past_clock_end_is_malformed() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
        ingest.set_params(StreamParams::default()).unwrap();
        ingest.push_buffer(0, vec![0.0]).unwrap();

        let err = ingest.push_buffer(u64::MAX - 2, vec![1.0; 4]).unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(ingest.pending_commands(), 3);

        // Ending exactly at the clock end is still addressable
        ingest.push_buffer(u64::MAX - 4, vec![1.0; 4]).unwrap();
        let mut out = [0.5f32; 8];
        assert!(renderer.render(4, &mut out));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_epoch_base_counts_toward_clock_end() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
        let mut out = [0.0f32; 128];
        assert!(renderer.render(0, &mut out));

        ingest.push_buffer(0, vec![1.0]).unwrap();
        assert_eq!(ingest.epoch().sample_offset, 128);
        assert_eq!(ingest.epoch().global_start(u64::MAX - 64), None);
        assert!(
            ingest
                .push_buffer(u64::MAX - 64, vec![1.0])
                .unwrap_err()
                .is_malformed()
        );
    }

    // =============================================================
    // Parameter sets
    // =============================================================

    #[test]
    fn test_replaced_params_come_back_to_control_side() {
        let (mut ingest, mut renderer) = pipeline(PipelineOptions::default());
        ingest.set_params(StreamParams::default()).unwrap();
        let mut out = [0.0f32; 4];
        assert!(renderer.render(0, &mut out));

        let next = StreamParams {
            audio_block_size: 256,
            ..StreamParams::default()
        };
        ingest.set_params(next.clone()).unwrap();
        assert!(renderer.render(4, &mut out));
        assert_eq!(renderer.params(), Some(&next));
        assert_eq!(ingest.retired.occupied_len(), 1);

        ingest.flush();
        assert_eq!(ingest.retired.occupied_len(), 0);
    }
}
