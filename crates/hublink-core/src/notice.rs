// ── Notice bus ──
//
// Short-lived, user-facing notifications tied to a specific command.
// Owned by the controller and handed by reference to the dispatcher and
// media controls; the CLI (or any UI) subscribes and renders them.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::media::MediaAction;

const NOTICE_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The hub reported the state an optimistic command aimed for.
    Confirmed {
        entity_id: String,
        state: String,
        confirmed_at: DateTime<Utc>,
    },
    /// No confirming event inside the window; the overlay was reverted.
    CommandExpired {
        entity_id: String,
        restored_state: String,
    },
    /// The command never reached the hub; the overlay was reverted.
    SendFailed {
        entity_id: String,
        restored_state: Option<String>,
        reason: String,
    },
    /// Outstanding optimistic commands were dropped ahead of a resync.
    PendingCleared { count: usize },
    /// A media transport command went unconfirmed and was sent again.
    MediaRetried {
        entity_id: String,
        action: MediaAction,
    },
}

impl Notice {
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::Confirmed { entity_id, .. }
            | Self::CommandExpired { entity_id, .. }
            | Self::SendFailed { entity_id, .. }
            | Self::MediaRetried { entity_id, .. } => Some(entity_id),
            Self::PendingCleared { .. } => None,
        }
    }

    /// Whether this should be rendered as a problem.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::CommandExpired { .. } | Self::SendFailed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::Confirmed {
                entity_id, state, ..
            } => format!("{entity_id} is now {state}"),
            Self::CommandExpired {
                entity_id,
                restored_state,
            } => format!("{entity_id}: command expired, state restored to {restored_state}"),
            Self::SendFailed {
                entity_id,
                restored_state: Some(state),
                reason,
            } => format!("{entity_id}: connection error, state restored to {state} ({reason})"),
            Self::SendFailed {
                entity_id,
                restored_state: None,
                reason,
            } => format!("{entity_id}: connection error ({reason})"),
            Self::PendingCleared { count } => {
                format!("{count} pending command(s) dropped for resync")
            }
            Self::MediaRetried { entity_id, action } => {
                format!("{entity_id}: {action} not confirmed, retried")
            }
        }
    }
}

/// Broadcast fan-out for [`Notice`]s. Publishing with no subscribers is
/// not an error.
#[derive(Debug, Clone)]
pub struct NoticeBus {
    tx: broadcast::Sender<Notice>,
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        Self { tx }
    }

    pub fn publish(&self, notice: Notice) {
        tracing::trace!(?notice, "notice");
        let _ = self.tx.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entity() {
        let expired = Notice::CommandExpired {
            entity_id: "light.kitchen".into(),
            restored_state: "off".into(),
        };
        assert!(expired.is_error());
        assert_eq!(
            expired.message(),
            "light.kitchen: command expired, state restored to off"
        );
        assert_eq!(expired.entity_id(), Some("light.kitchen"));

        let cleared = Notice::PendingCleared { count: 2 };
        assert!(!cleared.is_error());
        assert_eq!(cleared.entity_id(), None);
    }

    #[tokio::test]
    async fn subscribers_receive_published_notices() {
        let bus = NoticeBus::new();
        bus.publish(Notice::PendingCleared { count: 0 });

        let mut rx = bus.subscribe();
        bus.publish(Notice::PendingCleared { count: 1 });
        assert_eq!(rx.recv().await.unwrap(), Notice::PendingCleared { count: 1 });
    }
}
