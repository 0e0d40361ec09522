use std::fmt;

use crate::storage::SlotRecord;

/// Lifecycle notification fired by the save manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveEvent {
    NewGame { slot: u32, record: SlotRecord },
    /// `slot` is `None` for the in-memory session save.
    Saved { slot: Option<u32>, record: SlotRecord },
    Loaded { slot: u32, record: SlotRecord },
}

impl SaveEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewGame { .. } => "new_game",
            Self::Saved { .. } => "saved",
            Self::Loaded { .. } => "loaded",
        }
    }

    pub fn record(&self) -> &SlotRecord {
        match self {
            Self::NewGame { record, .. } | Self::Saved { record, .. } | Self::Loaded { record, .. } => {
                record
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&SaveEvent)>;

#[derive(Default)]
pub struct EventDispatcher {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn subscribe(&mut self, listener: impl FnMut(&SaveEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        before != self.listeners.len()
    }

    /// Delivers to listeners in subscription order.
    pub fn emit(&mut self, event: &SaveEvent) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let seen = Rc::new(RefCell::new(Vec::<&'static str>::new()));
        let mut dispatcher = EventDispatcher::default();
        let first = {
            let seen = Rc::clone(&seen);
            dispatcher.subscribe(move |event| seen.borrow_mut().push(event.kind()))
        };
        let event = SaveEvent::Saved {
            slot: None,
            record: SlotRecord::new("SavedGameState"),
        };

        dispatcher.emit(&event);
        assert!(dispatcher.unsubscribe(first));
        dispatcher.emit(&event);

        assert_eq!(*seen.borrow(), vec!["saved"]);
        assert!(!dispatcher.unsubscribe(first));
        assert!(dispatcher.is_empty());
    }
}
