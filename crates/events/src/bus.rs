//! Fan-out of committed events to read-model builders.
//!
//! Publication happens after the store append, so the store stays the record
//! of truth and a lost message can be recovered by replaying it. Delivery is
//! at-least-once; consumers skip positions they have already applied.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

/// One consumer's view of a bus. Every subscription sees every message
/// published after it was created.
///
/// Iterating blocks between messages and ends once the bus is dropped, so a
/// projection worker is just `for envelope in bus.subscribe() { .. }`.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Next message if one is already queued.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl<M> Iterator for Subscription<M> {
    type Item = M;

    fn next(&mut self) -> Option<M> {
        self.receiver.recv().ok()
    }
}

/// Publish/subscribe seam between the command side and the projections.
///
/// A failed `publish` leaves the events committed; the dispatcher reports it
/// as a publish error rather than rolling anything back.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        B::publish(self, message)
    }

    fn subscribe(&self) -> Subscription<M> {
        B::subscribe(self)
    }
}
