//! A simulated deployment: several clients, one backend, one clock.
//!
//! Each client is a full [`Runtime`] over a [`SimDriver`], so the same
//! orchestration code as production executes every action. The world
//! applies [`SimOp`]s, lets traffic settle, and snapshots everything for
//! invariant checks.

use std::time::Duration;

use festsync_client::{
    ClientAction, ClientError, ClientEvent, Driver, LocalFile, Runtime, SyncClient, SyncConfig,
};
use festsync_core::Identity;
use festsync_proto::ConversationId;
use thiserror::Error;

use crate::{
    InvariantRegistry, SimDriver, SimEnv, SimInstant, SimNotificationService, SimOp, SimUploader,
    SystemSnapshot, Violation,
    invariants::ClientSnapshot,
    operation::CONVERSATIONS,
    sim_server::{SharedBackend, create_shared_backend, lock_backend},
};

/// Upper bound on poll rounds while waiting for traffic to drain.
const MAX_SETTLE_ROUNDS: usize = 64;

/// Runtime type every simulated client runs on.
pub type SimRuntime = Runtime<SimDriver, SimEnv, SimNotificationService>;

/// Counters collected while running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Operations applied.
    pub steps: u64,
    /// Events the client refused (offline history, upload failures, ...).
    pub rejected: u64,
    /// View updates produced.
    pub view_updates: u64,
    /// Sends reported as stalled.
    pub stalled_sends: u64,
    /// Backend errors surfaced to the user.
    pub backend_errors: u64,
}

/// A run stopped on an invariant violation.
#[derive(Error, Debug)]
#[error("invariant violated at step {step} ({op}): {}", describe(.violations))]
pub struct SimFailure {
    /// Step that broke the invariant (0 for the final quiescent check).
    pub step: u64,
    /// Operation applied at that step.
    pub op: String,
    /// Everything that failed.
    pub violations: Vec<Violation>,
}

fn describe(violations: &[Violation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Simulated deployment.
pub struct SimWorld {
    env: SimEnv,
    config: SyncConfig,
    backend: SharedBackend,
    notifications: SimNotificationService,
    uploader: SimUploader,
    clients: Vec<SimRuntime>,
    stats: SimStats,
}

impl SimWorld {
    /// Create a world with default configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, SyncConfig::default())
    }

    /// Create a world with custom configuration.
    pub fn with_config(seed: u64, config: SyncConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let backend = create_shared_backend(env.clone());
        Self {
            env,
            config,
            backend,
            notifications: SimNotificationService::new(),
            uploader: SimUploader::new("https://cdn.fest.example"),
            clients: Vec::new(),
            stats: SimStats::default(),
        }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Shared backend.
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Notification service.
    pub fn notifications(&self) -> &SimNotificationService {
        &self.notifications
    }

    /// Counters so far.
    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the world has no clients.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Client state at `index`.
    pub fn client(&self, index: usize) -> &SyncClient<SimEnv> {
        self.clients[index].client()
    }

    /// Runtime at `index`, for direct fault injection.
    pub fn runtime_mut(&mut self, index: usize) -> &mut SimRuntime {
        &mut self.clients[index]
    }

    /// Log a new user in and join every conversation. Does not connect.
    ///
    /// Returns the client's index; its user id is `index + 1`.
    pub async fn add_client(&mut self, display_name: &str) -> usize {
        let index = self.clients.len();
        let identity = Identity::new(index as u64 + 1, display_name);
        let client = SyncClient::login(self.env.clone(), identity, &self.config);
        let driver = SimDriver::new(self.backend.clone());
        self.clients.push(Runtime::new(driver, client, self.notifications.clone()));

        let join = ClientEvent::JoinConversations { conversation_ids: CONVERSATIONS.to_vec() };
        let _ = self.dispatch(index, join).await;
        index
    }

    /// Feed one event to a client and record the outcome.
    ///
    /// Returns the view updates, or the rejection.
    pub async fn dispatch(
        &mut self,
        index: usize,
        event: ClientEvent<SimInstant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let result = self.clients[index].dispatch(event).await;
        self.record(index, &result);
        result
    }

    /// Poll every client until no deliveries are pending.
    pub async fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            for index in 0..self.clients.len() {
                let result = self.clients[index].poll().await;
                self.record(index, &result);
            }
            if self.quiet() {
                return;
            }
        }
        tracing::warn!(rounds = MAX_SETTLE_ROUNDS, "traffic did not settle");
    }

    /// Advance virtual time, then let every client tick.
    pub async fn advance(&mut self, by: Duration) {
        self.env.advance(by);
        self.settle().await;
    }

    /// Apply one operation and let traffic settle.
    pub async fn apply(&mut self, op: &SimOp) {
        if self.clients.is_empty() {
            return;
        }
        self.stats.steps += 1;
        let count = self.clients.len();
        let at = |client: usize| client % count;

        match *op {
            SimOp::Connect { client } => {
                let _ = self.dispatch(at(client), ClientEvent::Connect).await;
            },
            SimOp::Disconnect { client } => {
                let _ = self.dispatch(at(client), ClientEvent::Disconnect).await;
            },
            SimOp::DropConnection { client } => {
                if let Some(runtime) = self.clients.get(at(client)) {
                    runtime.driver().drop_connection("reset by peer");
                }
            },
            SimOp::SetReachable(reachable) => lock_backend(&self.backend).set_reachable(reachable),
            SimOp::Open { client, conversation_id } => {
                let _ = self
                    .dispatch(at(client), ClientEvent::OpenConversation { conversation_id })
                    .await;
            },
            SimOp::Close { client, conversation_id } => {
                let _ = self
                    .dispatch(at(client), ClientEvent::CloseConversation { conversation_id })
                    .await;
            },
            SimOp::Send { client, conversation_id } => {
                let content = format!("message {} from {}", self.stats.steps, at(client) + 1);
                let _ = self
                    .dispatch(at(client), ClientEvent::SendMessage { conversation_id, content })
                    .await;
            },
            SimOp::SendFile { client, conversation_id, image } => {
                self.send_file(at(client), conversation_id, image).await;
            },
            SimOp::Type { client, conversation_id } => {
                let _ = self.dispatch(at(client), ClientEvent::Typing { conversation_id }).await;
            },
            SimOp::Scroll { client, distance_px } => {
                let event = ClientEvent::Scrolled { distance_from_bottom_px: distance_px };
                let _ = self.dispatch(at(client), event).await;
            },
            SimOp::Bootstrap { client, filter } => {
                let _ = self.dispatch(at(client), ClientEvent::BootstrapFeed { filter }).await;
            },
            SimOp::LoadMore { client } => {
                let _ = self.dispatch(at(client), ClientEvent::LoadMoreNotifications).await;
            },
            SimOp::MarkRead { client, nth } => {
                let target = self.clients.get(at(client)).and_then(|runtime| {
                    let items = runtime.client().feed().items();
                    items.get(nth % items.len().max(1)).map(|n| n.id)
                });
                if let Some(notification_id) = target {
                    let event = ClientEvent::MarkNotificationRead { notification_id };
                    let _ = self.dispatch(at(client), event).await;
                }
            },
            SimOp::MarkAllRead { client } => {
                let _ = self.dispatch(at(client), ClientEvent::MarkAllNotificationsRead).await;
            },
            SimOp::ClearNotifications { client } => {
                let _ = self.dispatch(at(client), ClientEvent::ClearNotifications).await;
            },
            SimOp::Publish { client } => {
                let user_id = at(client) as u64 + 1;
                let push =
                    self.notifications.publish(user_id, "announcement", "stage schedule changed");
                lock_backend(&self.backend).deliver(user_id, push);
            },
            SimOp::FailService { calls } => self.notifications.fail_next(calls),
            SimOp::Advance { millis } => {
                self.env.advance(Duration::from_millis(millis));
            },
        }

        self.settle().await;
    }

    /// Bring every client back online and let all timers run out.
    pub async fn quiesce(&mut self) {
        lock_backend(&self.backend).set_reachable(true);
        for index in 0..self.clients.len() {
            if !self.clients[index].client().is_live() {
                let _ = self.dispatch(index, ClientEvent::Connect).await;
            }
        }
        self.settle().await;

        let linger = self.config.typing_staleness.max(self.config.stalled_send_after);
        self.advance(linger + Duration::from_millis(1)).await;
    }

    /// Capture every client and the backend.
    pub fn snapshot(&self) -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::empty()
            .with_backend(&lock_backend(&self.backend), self.config.history_page_size);
        for runtime in &self.clients {
            snapshot.add_client(ClientSnapshot::from_client(runtime.client()));
        }
        snapshot
    }

    /// Run `steps` random operations, checking invariants after each, then
    /// quiesce and check convergence.
    ///
    /// # Errors
    ///
    /// The first [`SimFailure`] encountered.
    pub async fn run(&mut self, steps: u64) -> Result<SimStats, SimFailure> {
        let standard = InvariantRegistry::standard();
        for step in 1..=steps {
            let op = SimOp::random(&self.env, self.clients.len());
            tracing::trace!(step, %op, "applying");
            self.apply(&op).await;

            if let Err(violations) = standard.check_all(&self.snapshot()) {
                return Err(SimFailure { step, op: op.to_string(), violations });
            }
        }

        self.quiesce().await;
        InvariantRegistry::quiescent()
            .check_all(&self.snapshot())
            .map_err(|violations| SimFailure { step: 0, op: "quiesce".into(), violations })?;
        Ok(self.stats)
    }

    async fn send_file(&mut self, index: usize, conversation_id: ConversationId, image: bool) {
        let file = if image {
            LocalFile {
                file_name: "stage-map.png".into(),
                mime_type: "image/png".into(),
                bytes: vec![0; 256],
            }
        } else {
            LocalFile {
                file_name: "booth-plan.pdf".into(),
                mime_type: "application/pdf".into(),
                bytes: vec![0; 512],
            }
        };

        let binder = self.clients[index].client().binder().clone();
        match binder.upload_and_bind(&self.uploader, conversation_id, &file).await {
            Ok(bound) => {
                let _ = self.dispatch(index, ClientEvent::SendAttachment(bound)).await;
            },
            Err(error) => {
                tracing::debug!(%error, "attachment rejected");
                self.stats.rejected += 1;
            },
        }
    }

    fn quiet(&self) -> bool {
        let backend = lock_backend(&self.backend);
        self.clients.iter().all(|runtime| {
            !runtime.driver().is_open() || backend.pending(runtime.client().user_id()) == 0
        })
    }

    fn record(&mut self, index: usize, result: &Result<Vec<ClientAction>, ClientError>) {
        match result {
            Ok(updates) => {
                for update in updates {
                    self.stats.view_updates += 1;
                    match update {
                        ClientAction::SendStalled { conversation_id, .. } => {
                            tracing::debug!(client = index, conversation_id, "send stalled");
                            self.stats.stalled_sends += 1;
                        },
                        ClientAction::BackendError { reason } => {
                            tracing::debug!(client = index, %reason, "backend error");
                            self.stats.backend_errors += 1;
                        },
                        _ => {},
                    }
                }
            },
            Err(error) => {
                tracing::debug!(client = index, %error, "event rejected");
                self.stats.rejected += 1;
            },
        }
    }
}
