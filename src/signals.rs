//! In-process publish/subscribe used to keep sibling views coherent.
//!
//! Publishing never calls back into subscribers. Each subscription owns an
//! inbox that its holder drains when convenient, so a view can publish a
//! signal it is itself subscribed to without re-entering its own handlers.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
    AnalysesUpdated,
    PlansUpdated,
    PaymentUpdated,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Self::AnalysesUpdated, Self::PlansUpdated, Self::PaymentUpdated];

    pub fn name(self) -> &'static str {
        match self {
            Self::AnalysesUpdated => "analyses-updated",
            Self::PlansUpdated => "plans-updated",
            Self::PaymentUpdated => "payment-updated",
        }
    }
}

pub trait SignalPublisher {
    fn publish(&self, signal: Signal);
}

type Inbox = Rc<RefCell<VecDeque<Signal>>>;

struct Listener {
    id: u64,
    interests: Vec<Signal>,
    inbox: Inbox,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<Listener>,
}

/// Cheap to clone; clones share the same listener table.
#[derive(Clone, Default)]
pub struct SignalBus {
    inner: Rc<RefCell<BusInner>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, interests: &[Signal]) -> Subscription {
        let inbox: Inbox = Rc::default();
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.listeners.push(Listener {
            id,
            interests: interests.to_vec(),
            inbox: Rc::clone(&inbox),
        });
        Subscription {
            id,
            bus: Rc::downgrade(&self.inner),
            inbox,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }
}

impl SignalPublisher for SignalBus {
    fn publish(&self, signal: Signal) {
        let inner = self.inner.borrow();
        let mut delivered = 0;
        for listener in &inner.listeners {
            if listener.interests.contains(&signal) {
                listener.inbox.borrow_mut().push_back(signal);
                delivered += 1;
            }
        }
        debug!(signal = signal.name(), delivered, "signal published");
    }
}

/// Unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    bus: Weak<RefCell<BusInner>>,
    inbox: Inbox,
}

impl Subscription {
    pub fn drain(&self) -> Vec<Signal> {
        self.inbox.borrow_mut().drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.inbox.borrow().len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.borrow_mut().listeners.retain(|l| l.id != self.id);
        }
    }
}
