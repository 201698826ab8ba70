//! Platform lifecycle signals consumed by the logger.

use tokio::sync::broadcast;

/// Buffered signals per subscriber before older ones are dropped.
const SIGNAL_CAPACITY: usize = 16;

/// Host visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Signal raised by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    /// Network connectivity came back.
    Online,
    /// Visibility changed; `Hidden` may be the last chance to send anything.
    Visibility(Visibility),
}

/// Broadcast point for platform signals, owned by the host.
#[derive(Debug, Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<PlatformSignal>,
}

impl SignalHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformSignal> {
        self.tx.subscribe()
    }

    /// Raise a signal. Returns the number of subscribers that will see it.
    pub fn emit(&self, signal: PlatformSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn online(&self) -> usize {
        self.emit(PlatformSignal::Online)
    }

    pub fn hidden(&self) -> usize {
        self.emit(PlatformSignal::Visibility(Visibility::Hidden))
    }

    pub fn visible(&self) -> usize {
        self.emit(PlatformSignal::Visibility(Visibility::Visible))
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}
