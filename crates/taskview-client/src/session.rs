//! Drives a `ClientSession` from a stream of event frames.

use taskview_core::{
    ChangeNotification, Channel, ClientSession, DataSource, EventFrame, Interaction,
    ReconcileError, ReconcileOutcome, Renderer,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Owns one session together with its data source and renderer.
///
/// Frames are handled strictly one at a time in arrival order.
pub struct SessionDriver<S, R> {
    session: ClientSession,
    source: S,
    renderer: R,
    connections: usize,
    loaded: bool,
}

impl<S: DataSource, R: Renderer> SessionDriver<S, R> {
    pub fn new(session: ClientSession, source: S, renderer: R) -> Self {
        Self {
            session,
            source,
            renderer,
            connections: 0,
            loaded: false,
        }
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Load everything from scratch. Returns whether it succeeded.
    pub async fn load(&mut self) -> bool {
        self.loaded = self
            .session
            .load(&self.source, &mut self.renderer)
            .await
            .is_ok();
        self.loaded
    }

    pub async fn interact(&mut self, interaction: Interaction) -> Result<(), ReconcileError> {
        self.session
            .interact(interaction, &self.source, &mut self.renderer)
            .await
    }

    /// Apply one frame. Returns the outcome of every reconcile it caused.
    pub async fn handle_frame(&mut self, frame: EventFrame) -> Vec<ReconcileOutcome> {
        match frame.notification() {
            Some(notification) => {
                if !self.loaded {
                    self.load().await;
                    return Vec::new();
                }
                self.reconcile(notification).await.into_iter().collect()
            }
            None => {
                self.connections += 1;
                if !self.loaded {
                    self.load().await;
                    return Vec::new();
                }
                if self.connections == 1 {
                    return Vec::new();
                }

                // Changes may have happened while disconnected
                info!("Reconnected, resynchronizing");
                let mut outcomes = Vec::new();
                for channel in Channel::ALL {
                    if let Some(outcome) = self.reconcile(ChangeNotification::now(channel)).await {
                        outcomes.push(outcome);
                    }
                }
                outcomes
            }
        }
    }

    async fn reconcile(&mut self, notification: ChangeNotification) -> Option<ReconcileOutcome> {
        match self
            .session
            .reconcile(notification, &self.source, &mut self.renderer)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Keeping previous view: {}", e);
                None
            }
        }
    }

    /// Handle frames until the sender side closes.
    pub async fn run(mut self, mut frames: mpsc::Receiver<EventFrame>) -> Self {
        while let Some(frame) = frames.recv().await {
            debug!("Handling {:?}", frame);
            self.handle_frame(frame).await;
        }
        debug!("Event source closed");
        self
    }
}
