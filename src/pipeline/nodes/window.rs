//! Segmenter: cuts the `main` stream into fixed-size windows.

use crate::pipeline::buffer::PortBuffers;
use crate::pipeline::error::{ConfigError, PipelineResult};
use crate::pipeline::node::Processor;
use crate::pipeline::port;
use crate::pipeline::registry::NodeSpec;

/// Emits every complete window of `window_size` samples, concatenated, and
/// advances by `step` samples per window.
///
/// With `step > window_size` the samples between windows are skipped, even
/// when they have not arrived yet.
#[derive(Debug, Clone)]
pub struct WindowNode {
    window_size: usize,
    step: usize,
    /// Samples still to drop before the next window starts.
    skip: usize,
}

impl WindowNode {
    pub fn new(window_size: usize, step: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            step: step.max(1),
            skip: 0,
        }
    }

    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let params = spec.params();
        let window_size = params.positive_usize("window_size", None)?;
        let step = params.positive_usize("step", Some(window_size))?;
        Ok(Self::new(window_size, step))
    }

    fn drop_skipped(&mut self, input: &mut PortBuffers) {
        if self.skip == 0 {
            return;
        }
        let main = input.entry(port::MAIN);
        let dropped = self.skip.min(main.count());
        main.splice(0, dropped);
        self.skip -= dropped;
    }
}

impl Processor for WindowNode {
    fn inputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn outputs(&self) -> Vec<String> {
        port::port_list(&[port::MAIN])
    }

    fn is_processing_condition_satisfied(&self, input: &PortBuffers) -> bool {
        input.count(port::MAIN) >= self.skip + self.window_size
    }

    fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
        let mut out = PortBuffers::new();
        self.drop_skipped(input);
        while self.skip == 0 && input.count(port::MAIN) >= self.window_size {
            let main = input.entry(port::MAIN);
            let mut window = main.splice(0, self.window_size.min(self.step));
            if self.step < self.window_size {
                // Overlapping: the tail stays buffered for the next window.
                let tail = main.splice(0, self.window_size - self.step);
                window.extend(&tail)?;
                let mut rest = tail;
                rest.extend(main)?;
                *main = rest;
            } else {
                self.skip = self.step - self.window_size;
            }
            out.entry(port::MAIN).extend(&window)?;
            self.drop_skipped(input);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer::TimeSeriesBuffer;

    fn feed(node: &mut WindowNode, input: &mut PortBuffers, values: &[f64]) -> Option<Vec<f64>> {
        input
            .entry(port::MAIN)
            .extend(&TimeSeriesBuffer::from_channel(10.0, "x", values.to_vec()))
            .unwrap();
        if !node.is_processing_condition_satisfied(input) {
            return None;
        }
        let out = node.process(input).unwrap();
        out.get(port::MAIN)
            .and_then(|b| b.data_on_channel("x"))
            .map(<[f64]>::to_vec)
    }

    #[test]
    fn test_tumbling_windows() {
        let mut node = WindowNode::new(3, 3);
        let mut input = PortBuffers::new();
        assert_eq!(feed(&mut node, &mut input, &[1.0, 2.0]), None);
        assert_eq!(
            feed(&mut node, &mut input, &[3.0, 4.0, 5.0, 6.0, 7.0]),
            Some(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        );
        assert_eq!(input.count(port::MAIN), 1);
    }

    #[test]
    fn test_overlapping_windows() {
        let mut node = WindowNode::new(4, 2);
        let mut input = PortBuffers::new();
        assert_eq!(
            feed(&mut node, &mut input, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            Some(vec![1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 5.0, 6.0])
        );
        assert_eq!(
            input.get(port::MAIN).unwrap().data_on_channel("x"),
            Some(&[5.0, 6.0][..])
        );
    }

    #[test]
    fn test_step_beyond_window_skips_samples() {
        let mut node = WindowNode::new(2, 3);
        let mut input = PortBuffers::new();
        assert_eq!(feed(&mut node, &mut input, &[1.0, 2.0]), Some(vec![1.0, 2.0]));
        assert_eq!(feed(&mut node, &mut input, &[3.0, 4.0]), None);
        assert_eq!(feed(&mut node, &mut input, &[5.0]), Some(vec![4.0, 5.0]));
    }
}
