//! # Event bus
//!
//! Three fixed topics, each with an ordered subscriber list. Subscribing
//! returns a [`ListenerId`]; the same closure registered twice gets two ids and
//! is called twice. Emission is synchronous, in insertion order, and works on a
//! snapshot of the list, so a handler may subscribe, unsubscribe or start
//! another operation without disturbing the current fan-out.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use store::User;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Authenticating,
    Authenticated,
    Unauthenticated,
}

/// What subscribers receive.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthEvent {
    Authenticating,
    Authenticated(User),
    Unauthenticated,
}

impl AuthEvent {
    pub fn topic(&self) -> Topic {
        match self {
            AuthEvent::Authenticating => Topic::Authenticating,
            AuthEvent::Authenticated(_) => Topic::Authenticated,
            AuthEvent::Unauthenticated => Topic::Unauthenticated,
        }
    }
}

/// Handle for removing one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Rc<dyn Fn(&AuthEvent)>;

#[derive(Default)]
pub struct EventBus {
    next_id: Cell<u64>,
    topics: RefCell<HashMap<Topic, Vec<(ListenerId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, topic: Topic, handler: impl Fn(&AuthEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.topics
            .borrow_mut()
            .entry(topic)
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    /// Remove one subscription, or every subscription on `topic` when
    /// `listener` is `None`.
    pub fn off(&self, topic: Topic, listener: Option<ListenerId>) {
        let mut topics = self.topics.borrow_mut();
        match listener {
            Some(id) => {
                if let Some(handlers) = topics.get_mut(&topic) {
                    handlers.retain(|(existing, _)| *existing != id);
                }
            }
            None => {
                topics.remove(&topic);
            }
        }
    }

    pub fn emit(&self, event: &AuthEvent) {
        let handlers: Vec<Handler> = self
            .topics
            .borrow()
            .get(&event.topic())
            .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.topics.borrow().get(&topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self.topics.borrow();
        f.debug_map()
            .entries(topics.iter().map(|(topic, handlers)| (topic, handlers.len())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&AuthEvent)>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let calls = calls.clone();
            move |name: &str| -> Box<dyn Fn(&AuthEvent)> {
                let calls = calls.clone();
                let name = name.to_string();
                Box::new(move |_: &AuthEvent| calls.borrow_mut().push(name.clone()))
            }
        };
        (calls, make)
    }

    #[test]
    fn test_emit_in_insertion_order() {
        let bus = EventBus::new();
        let (calls, make) = recorder();
        bus.on(Topic::Authenticated, make("a"));
        bus.on(Topic::Authenticated, make("b"));
        bus.on(Topic::Unauthenticated, make("other"));

        bus.emit(&AuthEvent::Authenticated(json!("tester")));
        assert_eq!(*calls.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicates_and_removal_by_id() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0));
        let handler = {
            let count = count.clone();
            move |_: &AuthEvent| count.set(count.get() + 1)
        };
        let first = bus.on(Topic::Authenticating, handler.clone());
        bus.on(Topic::Authenticating, handler);
        assert_eq!(bus.listener_count(Topic::Authenticating), 2);

        bus.emit(&AuthEvent::Authenticating);
        assert_eq!(count.get(), 2);

        bus.off(Topic::Authenticating, Some(first));
        bus.emit(&AuthEvent::Authenticating);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_off_without_handler_clears_topic() {
        let bus = EventBus::new();
        let (calls, make) = recorder();
        bus.on(Topic::Unauthenticated, make("a"));
        bus.on(Topic::Unauthenticated, make("b"));
        bus.on(Topic::Authenticating, make("kept"));

        bus.off(Topic::Unauthenticated, None);
        bus.emit(&AuthEvent::Unauthenticated);
        bus.emit(&AuthEvent::Authenticating);
        assert_eq!(*calls.borrow(), vec!["kept"]);

        // Clearing an empty topic is a no-op
        bus.off(Topic::Authenticated, None);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let bus = Rc::new(EventBus::new());
        let (calls, make) = recorder();
        {
            let inner_bus = bus.clone();
            let late = make("late");
            let late: Rc<dyn Fn(&AuthEvent)> = Rc::from(late);
            bus.on(Topic::Authenticating, move |_| {
                let late = late.clone();
                inner_bus.on(Topic::Authenticating, move |e| late(e));
            });
        }
        bus.emit(&AuthEvent::Authenticating);
        assert!(calls.borrow().is_empty());
        bus.emit(&AuthEvent::Authenticating);
        assert_eq!(*calls.borrow(), vec!["late"]);
    }
}
