//! Cooperative cancellation for outbound calls.
//!
//! A call can be aborted by two independent sources: the caller's `AbortSignal` and
//! the call's own timeout. Both feed the same small state machine; whichever event
//! arrives first moves it to `Aborted`, later events are ignored.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Caller-side handle that triggers cancellation.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self) {
        self.signal.sender.send_replace(true);
    }
}

/// Read side of an `AbortController`. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self {
            sender: Arc::new(watch::Sender::new(false)),
        }
    }
}

impl AbortSignal {
    pub fn aborted(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the controller aborts. Each pending call holds one listener
    /// for the duration of this future.
    pub async fn cancelled(&self) {
        let mut rx = self.sender.subscribe();
        let _ = rx.wait_for(|aborted| *aborted).await;
    }

    /// Number of calls currently listening on this signal.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortSource {
    Caller,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortEvent {
    CallerCancel,
    TimeoutFired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortState {
    Pending,
    Aborted(AbortSource),
}

impl AbortState {
    pub fn on_event(self, event: AbortEvent) -> Self {
        match (self, event) {
            (AbortState::Pending, AbortEvent::CallerCancel) => {
                AbortState::Aborted(AbortSource::Caller)
            }
            (AbortState::Pending, AbortEvent::TimeoutFired) => {
                AbortState::Aborted(AbortSource::Timeout)
            }
            // first one wins
            (aborted @ AbortState::Aborted(_), _) => aborted,
        }
    }
}

/// OR-composition of the caller's signal and a timeout.
///
/// The timer and the signal listener only exist inside `fired()`; dropping that
/// future (the call finished first) releases both.
#[derive(Debug)]
pub struct ComposedAbort {
    state: AbortState,
    caller: Option<AbortSignal>,
    timeout: Duration,
}

impl ComposedAbort {
    pub fn new(caller: Option<AbortSignal>, timeout: Duration) -> Self {
        Self {
            state: AbortState::Pending,
            caller,
            timeout,
        }
    }

    pub fn state(&self) -> AbortState {
        self.state
    }

    pub async fn fired(&mut self) -> AbortSource {
        if let AbortState::Aborted(source) = self.state {
            return source;
        }

        let event = match &self.caller {
            Some(signal) if signal.aborted() => AbortEvent::CallerCancel,
            Some(signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => AbortEvent::CallerCancel,
                    _ = tokio::time::sleep(self.timeout) => AbortEvent::TimeoutFired,
                }
            }
            None => {
                tokio::time::sleep(self.timeout).await;
                AbortEvent::TimeoutFired
            }
        };

        self.state = self.state.on_event(event);
        match self.state {
            AbortState::Aborted(source) => source,
            // on_event never leaves Pending for these events
            AbortState::Pending => AbortSource::Timeout,
        }
    }
}
