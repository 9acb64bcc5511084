use super::event::Event;
use crate::sync::Arc;
use crossbeam::deque::{Injector, Steal, Worker};

/// A consumer of an [super::EventChannel].
///
/// Events have to be `fetch`ed in batches from the channel before they can be `pop`ped.
///
pub struct EventConsumer {
    channel: Arc<Injector<Event>>,
    queue: Worker<Event>,
}

impl EventConsumer {
    pub fn new(channel: Arc<Injector<Event>>, queue: Worker<Event>) -> Self {
        Self { channel, queue }
    }

    pub fn fetch(&self) {
        while let Steal::Retry = self.channel.steal_batch(&self.queue) {}
    }

    pub fn pop(&self) -> Option<Event> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.fetch();
        self.queue.is_empty()
    }

    /// Fetch and pop every event currently in the channel.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = vec![];
        loop {
            self.fetch();
            match self.pop() {
                Some(event) => events.push(event),
                None if self.channel.is_empty() => break,
                None => continue,
            }
        }
        events
    }
}

impl Iterator for &EventConsumer {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}
