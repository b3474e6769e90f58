use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ToolId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation events, one channel per tool.
pub struct NotifyHub {
    channels: DashMap<ToolId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a tool. Creates the channel if needed.
    pub fn subscribe(&self, tool_id: ToolId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(tool_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an event. No-op if nobody is listening.
    pub fn send(&self, tool_id: ToolId, event: &Event) {
        if let Some(sender) = self.channels.get(&tool_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose receivers are all gone. Returns how many went.
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        before.saturating_sub(self.channels.len())
    }
}
