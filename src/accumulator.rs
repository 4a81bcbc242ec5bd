//! Dataframe accumulation
//!
//! This module groups consecutive frames into dataframes of a fixed size.
//! Capture sessions use non-overlapping batches; classify sessions use an
//! overlapping window that advances by one frame per emitted dataframe.

use crate::types::{Dataframe, Frame};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How the buffer behaves once it holds a full dataframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStrategy {
    /// Emit the buffer and start over empty
    Batch,
    /// Emit a copy of the buffer and evict the oldest frame
    Sliding,
}

/// Bounded frame buffer
#[derive(Debug, Clone)]
pub struct DataframeAccumulator {
    buffer: VecDeque<Frame>,
    dataframe_size: usize,
    strategy: WindowStrategy,
}

impl DataframeAccumulator {
    /// Create an accumulator; a zero size is treated as one
    pub fn new(dataframe_size: usize, strategy: WindowStrategy) -> Self {
        let dataframe_size = dataframe_size.max(1);
        Self {
            buffer: VecDeque::with_capacity(dataframe_size),
            dataframe_size,
            strategy,
        }
    }

    pub fn batch(dataframe_size: usize) -> Self {
        Self::new(dataframe_size, WindowStrategy::Batch)
    }

    pub fn sliding(dataframe_size: usize) -> Self {
        Self::new(dataframe_size, WindowStrategy::Sliding)
    }

    /// Push a frame, returning a dataframe when the buffer becomes full
    pub fn push(&mut self, frame: Frame) -> Option<Dataframe> {
        self.buffer.push_back(frame);

        if self.buffer.len() < self.dataframe_size {
            return None;
        }

        match self.strategy {
            WindowStrategy::Batch => Some(self.buffer.drain(..).collect()),
            WindowStrategy::Sliding => {
                let window: Dataframe = self.buffer.iter().cloned().collect();
                self.buffer.pop_front();
                Some(window)
            }
        }
    }

    /// Frames currently buffered
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn dataframe_size(&self) -> usize {
        self.dataframe_size
    }

    pub fn strategy(&self) -> WindowStrategy {
        self.strategy
    }

    /// Drop any partially collected dataframe
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(tag: f32) -> Frame {
        vec![tag, tag]
    }

    #[test]
    fn test_batch_completes_exactly_one_dataframe() {
        let mut acc = DataframeAccumulator::batch(10);

        for i in 0..9 {
            assert!(acc.push(frame(i as f32)).is_none());
        }
        assert_eq!(acc.len(), 9);

        let dataframe = acc.push(frame(9.0)).unwrap();
        assert_eq!(dataframe.len(), 10);
        assert_eq!(dataframe[0], frame(0.0));
        assert_eq!(dataframe[9], frame(9.0));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_batch_dataframes_do_not_overlap() {
        let mut acc = DataframeAccumulator::batch(3);
        let emitted: Vec<Dataframe> = (0..7).filter_map(|i| acc.push(frame(i as f32))).collect();

        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[1][0], frame(3.0));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_sliding_window_advances_by_one() {
        let mut acc = DataframeAccumulator::sliding(10);

        for i in 1..10 {
            assert!(acc.push(frame(i as f32)).is_none());
        }

        let first = acc.push(frame(10.0)).unwrap();
        let first_tags: Vec<f32> = first.iter().map(|f| f[0]).collect();
        assert_eq!(first_tags, (1..=10).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(acc.len(), 9);

        let second = acc.push(frame(11.0)).unwrap();
        let second_tags: Vec<f32> = second.iter().map(|f| f[0]).collect();
        assert_eq!(second_tags, (2..=11).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let mut acc = DataframeAccumulator::batch(0);
        assert_eq!(acc.dataframe_size(), 1);
        assert_eq!(acc.push(frame(1.0)), Some(vec![frame(1.0)]));
    }

    #[test]
    fn test_clear() {
        let mut acc = DataframeAccumulator::sliding(4);
        acc.push(frame(1.0));
        acc.push(frame(2.0));
        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.strategy(), WindowStrategy::Sliding);
    }
}
