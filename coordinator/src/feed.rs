use monitor_protocol::ChangeSignal;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast channel carrying domain change signals to every subscriber.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeSignal>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `signal`; returns how many subscribers will see it.
    pub fn publish(&self, signal: ChangeSignal) -> usize {
        self.sender.send(signal).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSignal> {
        self.sender.subscribe()
    }
}
