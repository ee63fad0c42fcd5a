//! Generic runtime for sync orchestration.
//!
//! The Runtime drives the client event loop, coordinating between:
//! - [`SyncClient`]: the sync state machine
//! - [`Driver`]: platform-specific channel I/O
//! - [`NotificationService`]: the REST side of the notification feed
//!
//! Infrastructure actions (open, close, emit, feed calls) are executed here.
//! Everything else is returned to the caller as a view update.

use std::collections::VecDeque;

use festsync_core::Environment;

use crate::{
    ClientAction, ClientError, ClientEvent, Driver, SyncClient,
    service::{NotificationService, execute_feed_action},
};

/// Generic runtime that owns a client and executes its actions.
///
/// # Type Parameters
///
/// - `D`: Platform-specific channel driver
/// - `E`: Environment for time
/// - `S`: Notification service implementation
pub struct Runtime<D, E, S>
where
    D: Driver,
    E: Environment,
    S: NotificationService,
{
    driver: D,
    client: SyncClient<E>,
    service: S,
}

impl<D, E, S> Runtime<D, E, S>
where
    D: Driver,
    E: Environment,
    S: NotificationService,
{
    /// Create a runtime around an existing client.
    pub fn new(driver: D, client: SyncClient<E>, service: S) -> Self {
        Self { driver, client, service }
    }

    /// Client state, read-only.
    pub fn client(&self) -> &SyncClient<E> {
        &self.client
    }

    /// Underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Underlying driver, mutable (for fault injection in tests).
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Notification service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Feed one event through the client and execute the resulting actions.
    ///
    /// Follow-up events (fetch completions, transport failures) are fed
    /// back until the queue drains. Returns the view updates.
    ///
    /// Feed actions run inline: each REST call is awaited before the next
    /// action, and channel events wait in the driver until the following
    /// [`Self::poll`]. An unread count through the default
    /// [`NotificationService::count_unread`] costs one request per hundred
    /// unread notifications.
    ///
    /// # Errors
    ///
    /// Returns whatever the client rejects the event with. Follow-up events
    /// already queued are still processed before returning.
    pub async fn dispatch(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let actions = self.client.handle(event)?;

        let mut updates = Vec::new();
        let mut queue = VecDeque::new();
        self.execute(actions, &mut updates, &mut queue).await;

        while let Some(event) = queue.pop_front() {
            match self.client.handle(event) {
                Ok(actions) => self.execute(actions, &mut updates, &mut queue).await,
                Err(error) => tracing::warn!(%error, "follow-up event rejected"),
            }
        }

        Ok(updates)
    }

    /// Drain inbound events, then tick.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SessionEnded` after logout.
    pub async fn poll(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let mut updates = Vec::new();

        while self.driver.is_open() {
            let Some(inbound) = self.driver.recv().await else {
                break;
            };
            updates.extend(self.dispatch(ClientEvent::Inbound(inbound)).await?);
        }

        let now = self.client.env().now();
        updates.extend(self.dispatch(ClientEvent::Tick { now }).await?);
        Ok(updates)
    }

    /// End the session and close the channel.
    pub fn logout(&mut self) -> Vec<ClientAction> {
        let mut updates = Vec::new();
        for action in self.client.logout() {
            match action {
                ClientAction::Close { reason } => self.driver.close(&reason),
                other => updates.push(other),
            }
        }
        updates
    }

    async fn execute(
        &mut self,
        actions: Vec<ClientAction>,
        updates: &mut Vec<ClientAction>,
        queue: &mut VecDeque<ClientEvent<E::Instant>>,
    ) {
        for action in actions {
            match action {
                ClientAction::Open { identity } => {
                    if let Err(error) = self.driver.open(&identity).await {
                        tracing::warn!(%error, user_id = identity.user_id, "open failed");
                        queue.push_back(ClientEvent::TransportClosed { reason: error.to_string() });
                    }
                },
                ClientAction::Close { reason } => self.driver.close(&reason),
                ClientAction::Emit(event) => {
                    let name = event.name();
                    if let Err(error) = self.driver.send(event).await {
                        tracing::warn!(%error, event = name, "emit failed");
                        queue.push_back(ClientEvent::TransportClosed { reason: error.to_string() });
                    }
                },
                ClientAction::Feed(action) => {
                    if let Some(done) = execute_feed_action(&self.service, action).await {
                        queue.push_back(done);
                    }
                },
                update @ (ClientAction::LiveChanged(_)
                | ClientAction::LogUpdated { .. }
                | ClientAction::Scroll { .. }
                | ClientAction::TypingChanged { .. }
                | ClientAction::SendStalled { .. }
                | ClientAction::FeedUpdated
                | ClientAction::BackendError { .. }) => updates.push(update),
            }
        }
    }
}
