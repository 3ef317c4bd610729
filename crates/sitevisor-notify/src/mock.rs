//! Mock implementations for testing

use crate::error::{NotifyError, Result};
use crate::event::CommandEvent;
use crate::Notifier;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A mock notifier that records everything sent through it
#[derive(Default)]
pub struct MockNotifier {
    messages: Arc<Mutex<Vec<String>>>,
    events: Arc<Mutex<Vec<CommandEvent>>>,
    call_count: AtomicUsize,
    should_fail: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock notifier that always fails
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    pub async fn was_event_type_sent(&self, event_type: &str) -> bool {
        self.events
            .lock()
            .await
            .iter()
            .any(|e| e.event_type() == event_type)
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(NotifyError::webhook("Mock failure"));
        }
        self.messages.lock().await.push(message.to_string());
        Ok(())
    }

    async fn send_event(&self, event: &CommandEvent) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(NotifyError::webhook("Mock failure"));
        }
        self.messages.lock().await.push(event.format_message());
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_notifier_records_events() {
        let notifier = MockNotifier::new();
        notifier
            .send_event(&CommandEvent::GaveUp {
                site: "demo".to_string(),
                command: "worker".to_string(),
                restarts: 3,
            })
            .await
            .unwrap();
        notifier.send("plain").await.unwrap();

        assert_eq!(notifier.call_count(), 2);
        assert!(notifier.was_event_type_sent("gave_up").await);
        assert_eq!(notifier.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_notifier_fails_when_configured() {
        let notifier = MockNotifier::failing();
        assert!(notifier.send("test").await.is_err());
        assert_eq!(notifier.call_count(), 1);
    }
}
