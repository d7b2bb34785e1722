//! In-process fabric backed by Tokio channels.
//!
//! Every ordered pair of ranks gets a dedicated unbounded channel, so a
//! group of N endpoints is wired from N * (N - 1) channels. The endpoints
//! are meant to be moved into one task per rank; the group then runs inside
//! a single process with no sockets involved, which is the fastest way to
//! exercise the patterns and the default fabric for tests.

use crate::topology::{GroupIdentity, Rank, TopologyError};
use crate::transport::mesh::{Frame, FrameSink, FrameSource, MeshTransport};
use crate::transport::TransportError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// A group endpoint wired over in-process channels.
pub type ChannelTransport = MeshTransport<ChannelSink, ChannelSource>;

/// Sending side of the channel to one peer.
#[derive(Debug)]
pub struct ChannelSink {
    rank: Rank,
    peer: Rank,
    tx: mpsc::UnboundedSender<Frame>,
}

/// Receiving side of the channel from one peer.
#[derive(Debug)]
pub struct ChannelSource {
    rank: Rank,
    peer: Rank,
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Disconnected {
            rank: self.rank,
            peer: self.peer,
        })
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv_frame(&mut self) -> Result<Frame, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Disconnected {
            rank: self.rank,
            peer: self.peer,
        })
    }
}

/// Builder for a fully wired in-process group.
pub struct ChannelFabric;

impl ChannelFabric {
    /// Wire a complete group of `size` endpoints.
    ///
    /// The returned vector is indexed by rank. Dropping an endpoint closes
    /// its channels; peers still receiving from it observe
    /// [`TransportError::Disconnected`].
    pub fn build(size: u32) -> Result<Vec<ChannelTransport>, TopologyError> {
        if size == 0 {
            return Err(TopologyError::EmptyGroup);
        }
        let mut sinks: Vec<BTreeMap<Rank, ChannelSink>> =
            (0..size).map(|_| BTreeMap::new()).collect();
        let mut sources: Vec<BTreeMap<Rank, ChannelSource>> =
            (0..size).map(|_| BTreeMap::new()).collect();
        for from in 0..size {
            for to in 0..size {
                if from == to {
                    continue;
                }
                let (tx, rx) = mpsc::unbounded_channel();
                sinks[from as usize].insert(
                    to,
                    ChannelSink {
                        rank: from,
                        peer: to,
                        tx,
                    },
                );
                sources[to as usize].insert(
                    from,
                    ChannelSource {
                        rank: to,
                        peer: from,
                        rx,
                    },
                );
            }
        }
        sinks
            .into_iter()
            .zip(sources)
            .enumerate()
            .map(|(rank, (sinks, sources))| {
                Ok(MeshTransport::new(
                    GroupIdentity::new(rank as Rank, size)?,
                    sinks,
                    sources,
                ))
            })
            .collect()
    }
}
