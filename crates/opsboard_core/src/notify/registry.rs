//! In-process mutation listener registry.

use crate::notify::MutationEvent;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Listener registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerRegistryError {
    InvalidListenerId(String),
    DuplicateListenerId(String),
}

impl Display for ListenerRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidListenerId(value) => write!(f, "listener id is invalid: {value}"),
            Self::DuplicateListenerId(value) => {
                write!(f, "listener id already registered: {value}")
            }
        }
    }
}

impl Error for ListenerRegistryError {}

/// External collaborator interested in successful mutations.
///
/// Implementations must not assume delivery: the core never retries and
/// never blocks a mutation on listener outcome.
pub trait MutationListener: Send + Sync {
    /// Stable id used for registration and dispatch logging.
    fn listener_id(&self) -> &str;
    /// Handles one event; a returned error is logged and dropped.
    fn on_mutation(&self, event: &MutationEvent) -> Result<(), String>;
}

/// Runtime listener registry.
#[derive(Default, Clone)]
pub struct ListenerRegistry {
    listeners: BTreeMap<String, Arc<dyn MutationListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one listener.
    pub fn register(
        &mut self,
        listener: Arc<dyn MutationListener>,
    ) -> Result<(), ListenerRegistryError> {
        let listener_id = listener.listener_id().trim().to_string();
        if !is_valid_listener_id(&listener_id) {
            return Err(ListenerRegistryError::InvalidListenerId(listener_id));
        }
        if self.listeners.contains_key(listener_id.as_str()) {
            return Err(ListenerRegistryError::DuplicateListenerId(listener_id));
        }

        self.listeners.insert(listener_id, listener);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns sorted listener ids.
    pub fn listener_ids(&self) -> Vec<String> {
        self.listeners.keys().cloned().collect()
    }

    /// Dispatches one event to every listener, fire-and-forget.
    ///
    /// Listener failures are logged per listener and never propagate.
    pub fn notify_all(&self, event: &MutationEvent) {
        for (listener_id, listener) in &self.listeners {
            match listener.on_mutation(event) {
                Ok(()) => {
                    debug!(
                        "event=notify_dispatch module=notify status=ok listener={} mutation={}",
                        listener_id,
                        event.name()
                    );
                }
                Err(err) => {
                    warn!(
                        "event=notify_dispatch module=notify status=error listener={} mutation={} error={}",
                        listener_id,
                        event.name(),
                        err
                    );
                }
            }
        }
    }
}

fn is_valid_listener_id(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::{ListenerRegistry, ListenerRegistryError, MutationListener};
    use crate::notify::MutationEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct CountingListener {
        listener_id: String,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl MutationListener for CountingListener {
        fn listener_id(&self) -> &str {
            &self.listener_id
        }

        fn on_mutation(&self, _event: &MutationEvent) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn sample_event() -> MutationEvent {
        MutationEvent::RecordCreated {
            app_id: Uuid::nil(),
            record_id: Uuid::nil(),
            record_number: 1,
        }
    }

    #[test]
    fn rejects_invalid_or_duplicate_listener_id() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::new();

        let invalid = registry.register(Arc::new(CountingListener {
            listener_id: "Mail Hook".to_string(),
            calls: calls.clone(),
            fail: false,
        }));
        assert!(matches!(
            invalid,
            Err(ListenerRegistryError::InvalidListenerId(_))
        ));

        registry
            .register(Arc::new(CountingListener {
                listener_id: "mail_hook".to_string(),
                calls: calls.clone(),
                fail: false,
            }))
            .expect("first listener should register");
        let duplicate = registry.register(Arc::new(CountingListener {
            listener_id: "mail_hook".to_string(),
            calls,
            fail: false,
        }));
        assert!(matches!(
            duplicate,
            Err(ListenerRegistryError::DuplicateListenerId(_))
        ));
    }

    #[test]
    fn failing_listener_does_not_stop_dispatch() {
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let healthy_calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::new();
        registry
            .register(Arc::new(CountingListener {
                listener_id: "failing".to_string(),
                calls: failing_calls.clone(),
                fail: true,
            }))
            .expect("failing listener should register");
        registry
            .register(Arc::new(CountingListener {
                listener_id: "healthy".to_string(),
                calls: healthy_calls.clone(),
                fail: false,
            }))
            .expect("healthy listener should register");

        registry.notify_all(&sample_event());

        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy_calls.load(Ordering::SeqCst), 1);
    }
}
