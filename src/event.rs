use tokio::sync::mpsc;

/// Which stream a process line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Severity of an engine message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Final state of a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Item ran and succeeded
    Completed,
    /// Item ran and failed
    Failed,
    /// Item was not permitted or an upstream item failed
    Skipped,
    /// Item type has no local execution
    NotExecuted,
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::NotExecuted => write!(f, "not executed"),
        }
    }
}

/// Final state of a DAG
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DagState {
    Completed,
    Failed,
}

impl std::fmt::Display for DagState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Events emitted while a project executes.
#[derive(Debug, Clone)]
pub enum Event {
    /// An item started executing
    ExecStarted { item_name: String },
    /// An item finished
    ExecFinished { item_name: String, state: ItemState },
    /// A line printed by a tool process
    ProcessMsg {
        item_name: String,
        stream: OutputStream,
        line: String,
    },
    /// A message from the engine about an item
    EventMsg {
        item_name: String,
        level: MessageLevel,
        text: String,
    },
    /// All items of a DAG are done
    DagFinished { dag_index: usize, state: DagState },
}

/// Sender for execution events.
///
/// If constructed with `noop()`, all sends are silently dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSender {
    pub fn new(sender: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            inner: Some(sender),
        }
    }

    /// Create a sender with a fresh channel, returning the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn noop() -> Self {
        Self { inner: None }
    }

    pub fn emit(&self, event: Event) {
        if let Some(ref sender) = self.inner {
            let _ = sender.send(event);
        }
    }

    /// Emit an engine message about an item
    pub fn message(&self, item_name: &str, level: MessageLevel, text: impl Into<String>) {
        self.emit(Event::EventMsg {
            item_name: item_name.to_string(),
            level,
            text: text.into(),
        });
    }

    /// Returns true if this sender is connected (not noop).
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_drops_events() {
        let sender = EventSender::noop();
        assert!(!sender.is_active());
        sender.message("Tool", MessageLevel::Info, "ignored");
    }

    #[test]
    fn channel_delivers_in_order() {
        let (sender, mut rx) = EventSender::channel();
        sender.emit(Event::ExecStarted {
            item_name: "Tool".into(),
        });
        sender.message("Tool", MessageLevel::Warning, "careful");

        assert!(matches!(rx.try_recv().unwrap(), Event::ExecStarted { item_name } if item_name == "Tool"));
        match rx.try_recv().unwrap() {
            Event::EventMsg { level, text, .. } => {
                assert_eq!(level, MessageLevel::Warning);
                assert_eq!(text, "careful");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
