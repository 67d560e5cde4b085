//! Output ports and the frame emission seam.
//!
//! The chain element produces zero or more step frames followed by exactly one
//! final frame, in strict step order. Emissions are pushed through a
//! [`FrameSink`] as they are produced; the engine never buffers or queues
//! frames of its own, so the sink's backpressure is the host's.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::frame::Frame;

/// A typed output channel of the chain element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputPort {
    /// Intermediate output of step `i` (1-based), ports `step1`..`step10`.
    Step(usize),
    /// The terminal chain-complete frame.
    Final,
}

impl std::fmt::Display for OutputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputPort::Step(step) => write!(f, "step{step}"),
            OutputPort::Final => f.write_str("final"),
        }
    }
}

/// One frame leaving the element on one port.
#[derive(Debug, Clone)]
pub struct Emission {
    pub port: OutputPort,
    pub frame: Frame,
}

/// Receives frames from the chain element as they are produced.
///
/// A failing sink aborts the execution: once the host stops accepting frames
/// there is nobody left to observe the chain.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one emission to the host.
    async fn emit(&self, emission: Emission) -> Result<()>;
}

#[async_trait]
impl FrameSink for Box<dyn FrameSink> {
    async fn emit(&self, emission: Emission) -> Result<()> {
        (**self).emit(emission).await
    }
}

/// A sink delivering emissions through a bounded channel.
///
/// The host iterates the receiving half, seeing frames in emission order; a
/// full channel suspends the chain until the host catches up.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Emission>,
}

impl ChannelSink {
    /// Wrap an existing channel sender.
    pub fn new(tx: mpsc::Sender<Emission>) -> Self {
        Self { tx }
    }

    /// Create a bounded channel and its sink in one call.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Emission>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn emit(&self, emission: Emission) -> Result<()> {
        self.tx
            .send(emission)
            .await
            .map_err(|_| Error::Emit("output channel closed".to_string()))
    }
}
