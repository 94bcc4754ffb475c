//! Timestamped sample blocks

/// An immutable span of mono samples addressed by global sample index
///
/// `start_sample` is already resolved against the stream epoch when the block
/// is built, so the render context never does epoch math.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    start_sample: u64,
    samples: Box<[f64]>,
}

impl Block {
    pub fn new(start_sample: u64, samples: Vec<f64>) -> Self {
        Self {
            start_sample,
            samples: samples.into_boxed_slice(),
        }
    }

    /// First global sample index covered by this block
    #[inline]
    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    /// One past the last global sample index covered by this block,
    /// saturating at the end of the clock
    #[inline]
    pub fn end_sample(&self) -> u64 {
        self.start_sample.saturating_add(self.samples.len() as u64)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Whether `target` falls inside `[start_sample, end_sample)`
    #[inline]
    pub fn covers(&self, target: u64) -> bool {
        target >= self.start_sample && target < self.end_sample()
    }

    /// Sample at absolute index `target`, or `None` outside the block
    #[inline]
    pub fn sample_at(&self, target: u64) -> Option<f64> {
        let offset = target.checked_sub(self.start_sample)?;
        self.samples.get(usize::try_from(offset).ok()?).copied()
    }
}
