//! Bounded frame channel with drop-oldest overflow
//!
//! Every hop in the pipeline (producer → broadcast group → viewer) goes
//! through one of these. A send never waits: when the queue is full the
//! oldest frame is discarded to make room, so a slow consumer only ever loses
//! frames and never holds up the sender or grows memory.
//!
//! ```text
//!   send(F5) on a full queue of capacity 4
//!
//!   [F1 F2 F3 F4]  ->  [F2 F3 F4 F5]   (F1 dropped)
//! ```
//!
//! The channel is single-producer, single-consumer. Dropping either half
//! closes it; the receiver still drains queued frames before seeing the close.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

/// Result of a non-blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame queued without loss
    Queued,
    /// Queue was full; the oldest frame was discarded
    DroppedOldest,
    /// Channel is closed; the frame was discarded
    Closed,
}

/// Error from [`FrameReceiver::try_recv`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing queued right now
    Empty,
    /// Closed and fully drained
    Closed,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
    dropped: u64,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            drop(state);
            self.notify.notify_one();
        }
    }
}

/// Create a channel holding at most `capacity` frames (minimum 1)
pub fn channel<T>(capacity: usize) -> (FrameSender<T>, FrameReceiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            closed: false,
            dropped: 0,
        }),
        notify: Notify::new(),
        capacity,
    });

    (
        FrameSender {
            shared: Arc::clone(&shared),
        },
        FrameReceiver { shared },
    )
}

/// Sending half
pub struct FrameSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameSender<T> {
    /// Queue a frame, discarding the oldest one if the queue is full
    pub fn send(&self, item: T) -> SendOutcome {
        let mut state = self.shared.lock();
        if state.closed {
            return SendOutcome::Closed;
        }

        let outcome = if state.queue.len() >= self.shared.capacity {
            state.queue.pop_front();
            state.dropped += 1;
            SendOutcome::DroppedOldest
        } else {
            SendOutcome::Queued
        };
        state.queue.push_back(item);
        drop(state);

        self.shared.notify.notify_one();
        outcome
    }

    /// Close the channel; queued frames stay readable
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of queued frames
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Frames discarded by the drop-oldest policy so far
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl<T> Drop for FrameSender<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T> std::fmt::Debug for FrameSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender")
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// Receiving half
pub struct FrameReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameReceiver<T> {
    /// Wait for the next frame; `None` once closed and drained
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Closed) => return None,
                // Single consumer: a notify between the check and the await
                // leaves a permit behind, so no wakeup is lost.
                Err(TryRecvError::Empty) => self.shared.notify.notified().await,
            }
        }
    }

    /// Take the next frame without waiting
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let mut state = self.shared.lock();
        match state.queue.pop_front() {
            Some(item) => Ok(item),
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Close the channel from the receiving side
    pub fn close(&mut self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl<T> Drop for FrameReceiver<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<T> std::fmt::Debug for FrameReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReceiver")
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_send_within_capacity() {
        let (tx, mut rx) = channel(4);

        assert_eq!(tx.send(1), SendOutcome::Queued);
        assert_eq!(tx.send(2), SendOutcome::Queued);
        assert_eq!(tx.len(), 2);

        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Ok(2));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let capacity = 4;
        let (tx, mut rx) = channel(capacity);

        for i in 0..capacity {
            assert_eq!(tx.send(i), SendOutcome::Queued);
        }
        assert_eq!(tx.send(capacity), SendOutcome::DroppedOldest);

        assert_eq!(tx.len(), capacity);
        assert_eq!(tx.dropped(), 1);

        let drained: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sustained_overflow_keeps_newest_in_order() {
        let (tx, mut rx) = channel(3);
        for i in 0..100 {
            tx.send(i);
            assert!(tx.len() <= 3);
        }

        let drained: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(drained, vec![97, 98, 99]);
        assert_eq!(rx.dropped(), 97);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let (tx, _rx) = channel::<u8>(0);
        assert_eq!(tx.capacity(), 1);
    }

    #[test]
    fn test_drop_sender_closes_after_drain() {
        let (tx, mut rx) = channel(4);
        tx.send("a");
        drop(tx);

        assert_eq!(rx.try_recv(), Ok("a"));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = channel(4);
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(tx.send(1), SendOutcome::Closed);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_send() {
        let (tx, mut rx) = channel(4);

        let reader = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(42u32);

        assert_eq!(reader.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_recv_wakes_on_close() {
        let (tx, mut rx) = channel::<u32>(4);

        let reader = tokio::spawn(async move { rx.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.close();

        assert_eq!(reader.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recv_preserves_order() {
        let (tx, mut rx) = channel(64);

        let writer = tokio::spawn(async move {
            for i in 0..1000u32 {
                tx.send(i);
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut last = None;
        while let Some(i) = rx.recv().await {
            if let Some(prev) = last {
                assert!(i > prev, "received {} after {}", i, prev);
            }
            last = Some(i);
        }
        writer.await.unwrap();
        assert_eq!(last, Some(999));
    }
}
