//! Progress events published by the sync engines.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Blocks,
    Validation,
    Deploys,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Validation => "validation",
            Self::Deploys => "deploys",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    /// Given up after retries; a later cycle picks it up again.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { phase: Phase, total: u64 },
    Advanced { phase: Phase, outcome: ItemOutcome },
    Finished { phase: Phase },
}

/// Cloneable sender side; a disabled handle drops every event.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressHandle {
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = self.tx.as_ref() {
            // Reporter gone means nobody is watching.
            let _ = tx.send(event);
        }
    }

    pub fn started(&self, phase: Phase, total: u64) {
        self.emit(ProgressEvent::Started { phase, total });
    }

    pub fn advanced(&self, phase: Phase, outcome: ItemOutcome) {
        self.emit(ProgressEvent::Advanced { phase, outcome });
    }

    pub fn finished(&self, phase: Phase) {
        self.emit(ProgressEvent::Finished { phase });
    }
}
