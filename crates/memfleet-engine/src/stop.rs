//! One-shot stop signal shared by the poll loop, the stats task and the
//! orchestrator.
//!
//! The first trigger wins; later triggers are ignored, so a fleet stop is
//! requested exactly once per run.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The user asked to stop
    UserRequested,
    /// The error policy fired on a worker
    ErrorDetected { index: usize },
    /// Every active worker finished
    AllFinished,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRequested => write!(f, "stopped by user"),
            Self::ErrorDetected { index } => write!(f, "error detected by worker #{}", index + 1),
            Self::AllFinished => write!(f, "all workers finished"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopSwitch {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl Default for StopSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSwitch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the switch. Returns true only for the first trigger.
    pub fn trigger(&self, reason: StopReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until the switch is triggered.
    pub async fn wait(&self) -> StopReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives in `self`, so the channel cannot close here
            if rx.changed().await.is_err() {
                return StopReason::UserRequested;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_trigger_wins() {
        let switch = StopSwitch::new();
        assert!(!switch.is_triggered());

        assert!(switch.trigger(StopReason::ErrorDetected { index: 2 }));
        assert!(!switch.trigger(StopReason::UserRequested));
        assert!(!switch.trigger(StopReason::AllFinished));

        assert_eq!(switch.reason(), Some(StopReason::ErrorDetected { index: 2 }));
    }

    #[tokio::test]
    async fn test_wait_sees_trigger_from_clone() {
        let switch = StopSwitch::new();
        let waiter = {
            let switch = switch.clone();
            tokio::spawn(async move { switch.wait().await })
        };

        tokio::task::yield_now().await;
        switch.trigger(StopReason::AllFinished);

        assert_eq!(waiter.await.unwrap(), StopReason::AllFinished);
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let switch = StopSwitch::new();
        switch.trigger(StopReason::UserRequested);
        assert_eq!(switch.wait().await, StopReason::UserRequested);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            StopReason::ErrorDetected { index: 0 }.to_string(),
            "error detected by worker #1"
        );
        assert_eq!(
            serde_json::to_string(&StopReason::AllFinished).unwrap(),
            r#"{"reason":"all_finished"}"#
        );
    }
}
