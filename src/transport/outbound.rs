//! Thread-safe outbound packet queue.
//!
//! Any thread may enqueue; only the I/O loop drains. Draining takes a bounded
//! batch under the lock and hands it back so the socket writes happen with the
//! lock released.

use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::protocol::types::PeerId;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Upper bound on entries written per I/O cycle
pub const MAX_DRAIN_BATCH: usize = 20;

/// A packet waiting to be written to one recipient.
#[derive(Debug, Clone)]
pub struct OutboundEntry {
    pub packet: Packet,
    pub recipient: PeerId,
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: Mutex<VecDeque<OutboundEntry>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<OutboundEntry>>> {
        self.entries.lock().map_err(|_| ProtocolError::LockPoisoned)
    }

    pub fn enqueue(&self, packet: Packet, recipient: PeerId) -> Result<()> {
        self.lock()?.push_back(OutboundEntry { packet, recipient });
        Ok(())
    }

    /// Remove up to `max_count` entries (capped at [`MAX_DRAIN_BATCH`]) in
    /// enqueue order.
    pub fn drain_batch(&self, max_count: usize) -> Result<Vec<OutboundEntry>> {
        let mut entries = self.lock()?;
        let take = max_count.min(MAX_DRAIN_BATCH).min(entries.len());
        Ok(entries.drain(..take).collect())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything still queued, returning how many entries were discarded
    pub fn clear(&self) -> usize {
        match self.lock() {
            Ok(mut entries) => {
                let dropped = entries.len();
                entries.clear();
                dropped
            }
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::core::packet::{PacketType, PacketWriter};
    use std::sync::Arc;
    use std::thread;

    fn numbered(n: i32) -> Packet {
        let mut writer = PacketWriter::new(PacketType::PlayerMove);
        writer.write_int(n).unwrap();
        writer.finish()
    }

    fn number_of(entry: &OutboundEntry) -> i32 {
        entry.packet.reader().read_int().unwrap()
    }

    #[test]
    fn test_small_batches_preserve_order() {
        let queue = OutboundQueue::new();
        for n in 1..=3 {
            queue.enqueue(numbered(n), 1).unwrap();
        }

        let mut written = Vec::new();
        loop {
            let batch = queue.drain_batch(2).unwrap();
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 2);
            written.extend(batch.iter().map(number_of));
        }
        assert_eq!(written, vec![1, 2, 3]);
    }

    #[test]
    fn test_batch_is_capped() {
        let queue = OutboundQueue::new();
        for n in 0..50 {
            queue.enqueue(numbered(n), 2).unwrap();
        }
        assert_eq!(queue.drain_batch(1000).unwrap().len(), MAX_DRAIN_BATCH);
        assert_eq!(queue.len(), 30);
        assert_eq!(queue.clear(), 30);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_enqueuers_keep_per_sender_order() {
        let queue = Arc::new(OutboundQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|recipient| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for n in 0..100 {
                        queue.enqueue(numbered(n), recipient).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut last = [-1i32; 4];
        let mut total = 0;
        loop {
            let batch = queue.drain_batch(MAX_DRAIN_BATCH).unwrap();
            if batch.is_empty() {
                break;
            }
            for entry in &batch {
                let n = number_of(entry);
                assert!(n > last[entry.recipient]);
                last[entry.recipient] = n;
                total += 1;
            }
        }
        assert_eq!(total, 400);
    }
}
