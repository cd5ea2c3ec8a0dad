//! In-process mesh connecting any number of parties, one byte queue per
//! `(from, to, tag)` triple. Backs the simulation helper and the tests.

use std::sync::Arc;

use crate::channel::{Channel, ChannelError, Recv, Tag};
use crate::queue::ByteQueue;

/// The channel endpoint of one party in an in-process mesh.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    party: usize,
    store: Arc<Store>,
}

#[derive(Debug)]
struct Store {
    size: usize,
    queues: Vec<ByteQueue>,
}

impl Store {
    fn queue(&self, from: usize, to: usize, tag: Tag) -> &ByteQueue {
        let tag = Tag::ALL.iter().position(|t| *t == tag).expect("known tag");
        &self.queues[(from * self.size + to) * Tag::ALL.len() + tag]
    }
}

impl MemoryChannel {
    /// Creates a fully-connected mesh for `parties` participants and returns
    /// one endpoint per party.
    pub fn channels(parties: usize) -> Vec<MemoryChannel> {
        let store = Arc::new(Store {
            size: parties,
            queues: (0..parties * parties * Tag::ALL.len())
                .map(|_| ByteQueue::new())
                .collect(),
        });
        (0..parties)
            .map(|party| MemoryChannel {
                party,
                store: Arc::clone(&store),
            })
            .collect()
    }

    /// The local party this endpoint belongs to.
    pub fn party(&self) -> usize {
        self.party
    }

    fn check(&self, party: usize) -> Result<(), ChannelError> {
        if party >= self.store.size || party == self.party {
            return Err(ChannelError::InvalidParty {
                party,
                size: self.store.size,
            });
        }
        Ok(())
    }
}

impl Channel for MemoryChannel {
    type Recv = Recv;

    fn send_to(&self, to: usize, tag: Tag, data: Vec<u8>) -> Result<(), ChannelError> {
        self.check(to)?;
        self.store.queue(self.party, to, tag).push(&data)?;
        Ok(())
    }

    fn recv_from(&self, from: usize, tag: Tag, len: usize) -> Recv {
        if let Err(err) = self.check(from) {
            return Recv::failed(err);
        }
        Recv::from(self.store.queue(from, self.party, tag).pop(len))
    }

    fn close(&self) {
        // Close this party's inbound queues; its pending reads fail, and
        // peers writing to it observe the closure on their next send.
        for from in 0..self.store.size {
            if from == self.party {
                continue;
            }
            for tag in Tag::ALL {
                self.store.queue(from, self.party, tag).close();
            }
        }
    }
}
