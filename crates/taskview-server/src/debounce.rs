//! Per-channel debouncing of raw file changes.
//!
//! Every `record` call pushes the channel's deadline out to `now + window`.
//! When a deadline passes without another `record`, one `ChangeNotification`
//! is emitted for that channel. Channels never share a timer.

use std::collections::BTreeMap;
use std::time::Duration;

use taskview_core::{ChangeNotification, Channel};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

/// Handle used to record raw changes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Debouncer {
    record_tx: mpsc::UnboundedSender<Channel>,
}

impl Debouncer {
    /// Spawn the debouncing task on the current runtime.
    ///
    /// The task ends once every handle is dropped and pending deadlines have
    /// fired.
    pub fn spawn(window: Duration) -> (Self, mpsc::UnboundedReceiver<ChangeNotification>) {
        let (record_tx, record_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        tokio::spawn(run(window, record_rx, notify_tx));

        (Self { record_tx }, notify_rx)
    }

    /// Record one raw change on `channel`, arming or re-arming its timer.
    pub fn record(&self, channel: Channel) {
        if self.record_tx.send(channel).is_err() {
            debug!("Debouncer stopped, dropping {} change", channel.name());
        }
    }
}

async fn run(
    window: Duration,
    mut record_rx: mpsc::UnboundedReceiver<Channel>,
    notify_tx: mpsc::UnboundedSender<ChangeNotification>,
) {
    let mut deadlines: BTreeMap<Channel, Instant> = BTreeMap::new();
    let mut closed = false;

    loop {
        let next = deadlines.values().min().copied();
        if closed && next.is_none() {
            break;
        }

        tokio::select! {
            received = record_rx.recv(), if !closed => match received {
                Some(channel) => {
                    trace!("Arming {} debounce", channel.name());
                    deadlines.insert(channel, Instant::now() + window);
                }
                None => closed = true,
            },
            _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                let now = Instant::now();
                let due: Vec<Channel> = deadlines
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(channel, _)| *channel)
                    .collect();

                for channel in due {
                    deadlines.remove(&channel);
                    debug!("Debounce window elapsed for {}", channel.name());
                    if notify_tx.send(ChangeNotification::now(channel)).is_err() {
                        return;
                    }
                }
            }
        }
    }
}
