//! Wiring between the control and render contexts

use std::sync::Arc;

use ringbuf::HeapRb;
use ringbuf::traits::Split;

use crate::block::Block;
use crate::ingest::StreamIngest;
use crate::params::StreamParams;
use crate::renderer::RealtimeRenderer;
use crate::ring::BlockRing;
use crate::shared::PlaybackShared;
use crate::{DEFAULT_BLOCK_CAPACITY, DEFAULT_COMMAND_CAPACITY};

/// Replaced parameter sets awaiting release by the control context
const RETIRED_PARAMS_CAPACITY: usize = 16;

/// Work handed from [`StreamIngest`] to [`RealtimeRenderer`]
///
/// Applied in queue order at the start of a render cycle.
#[derive(Debug)]
pub(crate) enum Command {
    /// Discard every queued block (new epoch)
    Restart,
    Block(Block),
    Params(Box<StreamParams>),
}

/// Sizes of the pipeline's fixed buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Blocks held by the render-side ring
    pub block_capacity: usize,
    /// Commands that can be queued between two render cycles; raised to at
    /// least `block_capacity + 2` so a full ring's worth of blocks plus a
    /// restart and a parameter set always fit
    pub command_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

/// Build a connected ingest/renderer pair
///
/// Everything the render context touches is allocated here, up front.
pub fn pipeline(options: PipelineOptions) -> (StreamIngest, RealtimeRenderer) {
    let block_capacity = options.block_capacity.max(1);
    let command_capacity = options.command_capacity.max(block_capacity + 2);
    let (commands, command_rx) = HeapRb::<Command>::new(command_capacity).split();
    let (retired_tx, retired) = HeapRb::<Box<StreamParams>>::new(RETIRED_PARAMS_CAPACITY).split();
    let shared = Arc::new(PlaybackShared::new());

    let ingest = StreamIngest::new(commands, retired, block_capacity, Arc::clone(&shared));
    let renderer = RealtimeRenderer::new(
        command_rx,
        retired_tx,
        BlockRing::new(block_capacity),
        shared,
    );
    (ingest, renderer)
}
