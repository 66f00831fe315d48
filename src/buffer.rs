//! Audio buffers passed to the plugin's process function. Every audio port is a single channel, so
//! buffers are indexed by port.

/// Per-port audio buffers for a single block. The backing storage is allocated once when
/// processing is set up, and blocks only ever use the first [`frames()`][Self::frames()] samples of
/// each port so nothing needs to be allocated on the render context.
#[derive(Debug, Default)]
pub struct AudioBuffers {
    frames: usize,
    max_frames: usize,
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
}

impl AudioBuffers {
    /// Allocate buffers for `num_inputs` input ports and `num_outputs` output ports with room for
    /// `max_frames` samples per port.
    pub fn new(num_inputs: usize, num_outputs: usize, max_frames: usize) -> Self {
        Self {
            frames: 0,
            max_frames,
            inputs: vec![vec![0.0; max_frames]; num_inputs],
            outputs: vec![vec![0.0; max_frames]; num_outputs],
        }
    }

    /// The number of samples in the current block.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The largest block these buffers can hold.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// The samples for input port `port` in the current block.
    ///
    /// # Panics
    ///
    /// Panics if `port` is out of bounds.
    pub fn input(&self, port: usize) -> &[f32] {
        &self.inputs[port][..self.frames]
    }

    /// The samples for output port `port` in the current block.
    ///
    /// # Panics
    ///
    /// Panics if `port` is out of bounds.
    pub fn output(&mut self, port: usize) -> &mut [f32] {
        &mut self.outputs[port][..self.frames]
    }

    /// Borrow an input and an output port at the same time, for in-place style processing.
    pub fn input_output(&mut self, input: usize, output: usize) -> (&[f32], &mut [f32]) {
        let frames = self.frames;
        (
            &self.inputs[input][..frames],
            &mut self.outputs[output][..frames],
        )
    }

    /// Set the length of the current block, clamped to the allocated size. Returns the actual
    /// number of frames.
    pub(crate) fn set_frames(&mut self, frames: usize) -> usize {
        self.frames = frames.min(self.max_frames);
        self.frames
    }

    pub(crate) fn input_mut(&mut self, port: usize) -> &mut [f32] {
        &mut self.inputs[port][..self.frames]
    }

    pub(crate) fn output_ref(&self, port: usize) -> &[f32] {
        &self.outputs[port][..self.frames]
    }

    /// Zero the current block of every output port.
    pub(crate) fn clear_outputs(&mut self) {
        let frames = self.frames;
        for output in &mut self.outputs {
            output[..frames].fill(0.0);
        }
    }
}
