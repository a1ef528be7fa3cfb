//! Property-based tests for rust_duplex_transport using proptest

use bytes::BytesMut;
use proptest::prelude::*;
use rust_duplex_transport::{
    CorrelationSequencer, DuplexQueue, Message, TransportError, MAX_MESSAGE_SIZE,
};

/// A step against the queue: `true` puts the next message, `false` takes one
fn ops_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..400)
}

fn seq_of(msg: &Message) -> usize {
    String::from_utf8_lossy(msg.body()).parse().unwrap()
}

// ============================================================================
// Duplex Queue FIFO Tests
// ============================================================================

proptest! {
    /// Any interleaving of puts and takes yields arrival order
    #[test]
    fn test_queue_fifo_any_interleaving(capacity in 0usize..16, ops in ops_strategy()) {
        let queue = DuplexQueue::new(capacity);
        let mut next_put = 0usize;
        let mut next_take = 0usize;

        for put in ops {
            if put {
                queue.put(Message::new(next_put.to_string())).unwrap();
                next_put += 1;
            } else if let Some(msg) = queue.try_take().unwrap() {
                prop_assert_eq!(seq_of(&msg), next_take);
                next_take += 1;
            } else {
                prop_assert_eq!(next_take, next_put);
            }

            // Primary never exceeds its capacity
            prop_assert!(queue.primary_len() <= capacity);
            prop_assert_eq!(queue.len(), next_put - next_take);
        }

        // Closing still hands out what is buffered, in order
        queue.close();
        while let Ok(Some(msg)) = queue.try_take() {
            prop_assert_eq!(seq_of(&msg), next_take);
            next_take += 1;
        }
        prop_assert_eq!(next_take, next_put);
    }

    /// Overflow only fills once primary is full; nothing is ever dropped
    #[test]
    fn test_queue_never_drops(capacity in 1usize..32, count in 0usize..200) {
        let queue = DuplexQueue::new(capacity);
        for i in 0..count {
            queue.put(Message::new(i.to_string())).unwrap();
        }

        let stats = queue.stats();
        prop_assert_eq!(stats.depth, count);
        prop_assert_eq!(stats.primary, count.min(capacity));
        prop_assert_eq!(stats.overflow, count.saturating_sub(capacity));
        prop_assert_eq!(stats.overflowed as usize, count.saturating_sub(capacity));
    }
}

// ============================================================================
// Frame Stream Tests (Network Edge Cases)
// ============================================================================

proptest! {
    /// Frames split at arbitrary read boundaries decode in order
    #[test]
    fn test_frames_across_arbitrary_chunks(
        bodies in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8),
        chunk in 1usize..32,
    ) {
        let mut stream = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            let msg = Message::new(body.clone()).header_entry("Seq", i.to_string());
            stream.extend_from_slice(&msg.encode().unwrap());
        }

        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in stream.chunks(chunk) {
            buf.extend_from_slice(piece);
            while let Some(msg) = Message::decode(&mut buf).unwrap() {
                decoded.push(msg);
            }
        }

        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded.len(), bodies.len());
        for (i, (msg, body)) in decoded.iter().zip(&bodies).enumerate() {
            let seq = i.to_string();
            prop_assert_eq!(msg.get_header("Seq"), Some(seq.as_str()));
            prop_assert_eq!(msg.body().as_ref(), body.as_slice());
        }
    }

    /// Decode rejects length prefixes above the frame limit
    #[test]
    fn test_decode_rejects_oversized_length(excess in 1u32..1000) {
        let size = MAX_MESSAGE_SIZE as u32 + excess;

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&size.to_be_bytes());
        buf.extend_from_slice(&[0u8; 100]);

        prop_assert!(matches!(
            Message::decode(&mut buf),
            Err(TransportError::MessageTooLarge(_, MAX_MESSAGE_SIZE))
        ));
    }
}

// ============================================================================
// Correlation Sequencer Tests
// ============================================================================

proptest! {
    #[test]
    fn test_sequencer_strictly_increasing(count in 1usize..500) {
        let seq = CorrelationSequencer::new();
        let mut last = seq.current();
        for _ in 0..count {
            let id = seq.next();
            prop_assert!(id > last);
            last = id;
        }
        prop_assert_eq!(seq.current(), count as u64);
    }
}
