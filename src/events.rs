use std::sync::{Arc, Mutex};

/// Notification topics broadcast by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    TodayChanged,
    ScheduledChanged,
}

type Listener = Box<dyn Fn() + Send>;

/// Fire-and-observe broadcast channel. Events carry no payload and are
/// delivered synchronously in the emitter's execution context; listeners must
/// not subscribe or emit re-entrantly.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Vec<(Topic, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic, listener: impl Fn() + Send + 'static) {
        self.listeners
            .lock()
            .unwrap()
            .push((topic, Box::new(listener)));
    }

    pub fn emit(&self, topic: Topic) {
        let listeners = self.listeners.lock().unwrap();
        for (t, listener) in listeners.iter() {
            if *t == topic {
                listener();
            }
        }
    }
}
