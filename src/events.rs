//! In-process observer registry keyed by a stable event id.
//!
//! `raise` synchronously calls every handler currently registered for an
//! event's id, in insertion order. `listen` returns a scoped subscription
//! that unregisters its handler when dropped, so a caller never has to
//! remember to clean up by hand. The bus is reference-counted rather than
//! borrowed: a `Subscription` needs to outlive arbitrary other uses of the
//! same bus (e.g. a logging listener registered before a training loop that
//! goes on to call `raise` many times), which a literal `&mut` borrow
//! captured for the subscription's lifetime cannot express.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Stable identifier for an event kind, derived from a string hash at
/// compile time via `EventId::of`. Using a hash rather than an incrementing
/// discriminant keeps the id stable across builds that add or remove event
/// kinds, matching the source's string-keyed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub const fn of(name: &str) -> Self {
        // FNV-1a, evaluated at const-eval time so each event's id is a
        // compile-time constant rather than something computed per-raise.
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x100000001b3;
        let bytes = name.as_bytes();
        let mut hash = FNV_OFFSET;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        EventId(hash)
    }
}

/// The three concrete events the training driver raises.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    EpochStarted { epoch: u32, total: u32 },
    SampleProcessed { index: u32, total: u32 },
    EpochCompleted { epoch: u32, total: u32, cost: f32 },
}

impl Event {
    pub const EPOCH_STARTED: EventId = EventId::of("EpochStarted");
    pub const SAMPLE_PROCESSED: EventId = EventId::of("SampleProcessed");
    pub const EPOCH_COMPLETED: EventId = EventId::of("EpochCompleted");

    pub fn id(&self) -> EventId {
        match self {
            Event::EpochStarted { .. } => Event::EPOCH_STARTED,
            Event::SampleProcessed { .. } => Event::SAMPLE_PROCESSED,
            Event::EpochCompleted { .. } => Event::EPOCH_COMPLETED,
        }
    }
}

type HandlerId = u64;
type Handler = Box<dyn FnMut(&Event)>;

struct Inner {
    next_handler_id: HandlerId,
    handlers: BTreeMap<EventId, BTreeMap<HandlerId, Handler>>,
}

/// Registry of event handlers. Cloning an `EventBus` yields another handle
/// onto the same registry, not an independent copy. Not reentrancy-safe: a
/// handler must not raise an event or add/remove handlers from within
/// another handler's call (§5).
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<RefCell<Inner>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            inner: Rc::new(RefCell::new(Inner { next_handler_id: 0, handlers: BTreeMap::new() })),
        }
    }

    /// Registers `handler` for `event_id`. The returned `Subscription`
    /// unregisters the handler when dropped; dropping it early is the only
    /// supported way to stop listening.
    pub fn listen(&self, event_id: EventId, handler: impl FnMut(&Event) + 'static) -> Subscription {
        let handler_id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_handler_id;
            inner.next_handler_id += 1;
            inner.handlers.entry(event_id).or_default().insert(id, Box::new(handler));
            id
        };
        Subscription { bus: self.inner.clone(), event_id, handler_id }
    }

    /// Synchronously invokes every handler registered for `event.id()`, in
    /// ascending handler-id order (i.e. insertion order).
    pub fn raise(&self, event: Event) {
        let mut inner = self.inner.borrow_mut();
        if let Some(table) = inner.handlers.get_mut(&event.id()) {
            for handler in table.values_mut() {
                handler(&event);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII handle returned by `EventBus::listen`. Unregisters its handler on
/// drop; there is no explicit `unsubscribe` call.
pub struct Subscription {
    bus: Rc<RefCell<Inner>>,
    event_id: EventId,
    handler_id: HandlerId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.bus.try_borrow_mut() {
            if let Some(table) = inner.handlers.get_mut(&self.event_id) {
                table.remove(&self.handler_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn handlers_fire_in_insertion_order() {
        let bus = EventBus::new();
        let order = Rc::new(StdRefCell::new(Vec::new()));

        let o1 = order.clone();
        let _s1 = bus.listen(Event::EPOCH_STARTED, move |_| o1.borrow_mut().push(1));
        let o2 = order.clone();
        let _s2 = bus.listen(Event::EPOCH_STARTED, move |_| o2.borrow_mut().push(2));

        bus.raise(Event::EpochStarted { epoch: 0, total: 1 });
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn dropped_subscription_stops_receiving_events() {
        let bus = EventBus::new();
        let calls = Rc::new(StdRefCell::new(0));
        let c = calls.clone();
        let sub = bus.listen(Event::SAMPLE_PROCESSED, move |_| *c.borrow_mut() += 1);
        bus.raise(Event::SampleProcessed { index: 0, total: 1 });
        drop(sub);
        bus.raise(Event::SampleProcessed { index: 1, total: 1 });
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn only_matching_event_id_is_delivered() {
        let bus = EventBus::new();
        let calls = Rc::new(StdRefCell::new(0));
        let c = calls.clone();
        let _sub = bus.listen(Event::EPOCH_COMPLETED, move |_| *c.borrow_mut() += 1);
        bus.raise(Event::EpochStarted { epoch: 0, total: 1 });
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn a_clone_shares_the_same_registry_as_its_source() {
        let bus = EventBus::new();
        let clone = bus.clone();
        let calls = Rc::new(StdRefCell::new(0));
        let c = calls.clone();
        let _sub = bus.listen(Event::EPOCH_STARTED, move |_| *c.borrow_mut() += 1);
        clone.raise(Event::EpochStarted { epoch: 0, total: 1 });
        assert_eq!(*calls.borrow(), 1);
    }
}
