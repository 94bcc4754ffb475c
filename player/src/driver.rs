//! Bridges an interleaved device callback to the mono renderer
//!
//! Owns the global sample clock: a frame counter advanced by every callback,
//! whether or not anything was audible.

use bonk_playback::RealtimeRenderer;

/// Per-stream callback state, moved into the audio callback
pub struct CallbackDriver {
    renderer: RealtimeRenderer,
    /// Mono window, sized once to the render quantum
    scratch: Vec<f32>,
    channels: usize,
    /// Global sample index of the next frame
    clock: u64,
    finished: bool,
}

impl CallbackDriver {
    pub fn new(renderer: RealtimeRenderer, channels: usize, render_quantum: usize) -> Self {
        Self {
            renderer,
            scratch: vec![0.0; render_quantum.max(1)],
            channels: channels.max(1),
            clock: 0,
            finished: false,
        }
    }

    /// Fill an interleaved device buffer
    ///
    /// The buffer is rendered in quanta of at most the render quantum; each mono
    /// sample is written to every channel. Returns `false` once the renderer
    /// has stopped, after which only silence is written.
    pub fn process<T: Copy>(&mut self, data: &mut [T], convert: impl Fn(f32) -> T) -> bool {
        let quantum = self.scratch.len();
        for frames in data.chunks_mut(quantum * self.channels) {
            let n = frames.len() / self.channels;
            let window = &mut self.scratch[..n];
            // Device buffers are not zeroed; the renderer may leave samples untouched
            window.fill(0.0);
            if !self.finished && !self.renderer.render(self.clock, window) {
                self.finished = true;
                window.fill(0.0);
            }

            for (frame, &sample) in frames.chunks_mut(self.channels).zip(window.iter()) {
                frame.fill(convert(sample));
            }
            // Trailing partial frame, if the device ever hands one over
            let whole = n * self.channels;
            frames[whole..].fill(convert(0.0));

            self.clock += n as u64;
        }
        !self.finished
    }

    /// Global sample index of the next frame to render
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
