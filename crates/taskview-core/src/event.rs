//! Change notifications and their wire frames.
//!
//! Frames are JSON sent as the `data:` payload of Server-Sent Events:
//! `{"type": "connected"}`, `{"type": "tasks-updated", "timestamp": ...}`,
//! `{"type": "prds-updated", "timestamp": ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical source of a change. Each channel debounces independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Tasks,
    Documents,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Tasks, Channel::Documents];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Tasks => "tasks",
            Channel::Documents => "documents",
        }
    }
}

/// One coalesced change on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    pub channel: Channel,
    pub timestamp: DateTime<Utc>,
}

impl ChangeNotification {
    pub fn now(channel: Channel) -> Self {
        Self {
            channel,
            timestamp: Utc::now(),
        }
    }
}

/// Frame pushed over the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventFrame {
    /// First frame on every new stream
    Connected,
    TasksUpdated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    PrdsUpdated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl EventFrame {
    /// The notification this frame carries, if any. Frames without a
    /// timestamp are stamped with the receive time.
    pub fn notification(&self) -> Option<ChangeNotification> {
        let (channel, timestamp) = match self {
            EventFrame::Connected => return None,
            EventFrame::TasksUpdated { timestamp } => (Channel::Tasks, timestamp),
            EventFrame::PrdsUpdated { timestamp } => (Channel::Documents, timestamp),
        };
        Some(ChangeNotification {
            channel,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        })
    }
}

impl From<ChangeNotification> for EventFrame {
    fn from(notification: ChangeNotification) -> Self {
        let timestamp = Some(notification.timestamp);
        match notification.channel {
            Channel::Tasks => EventFrame::TasksUpdated { timestamp },
            Channel::Documents => EventFrame::PrdsUpdated { timestamp },
        }
    }
}
