//! Runtime services and shared state for vk-warden.

use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::{Instrument, error, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{MessageId, PeerId, Res, UserId, Void},
    },
    interaction::chat_event,
    service::{chat::ChatClient, db::DbClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the database client, chat client, process state, and
/// configuration. It is designed to be trivially cloneable, allowing it to be
/// passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The chat client instance.
    pub chat: ChatClient,
    /// Process-lifetime state shared by all handlers.
    pub state: AppState,
    /// Bounded pool every handler runs on.
    pub pool: WorkerPool,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the database.
        let db = DbClient::surreal(&config).await?;

        // Initialize the chat client.
        let chat = ChatClient::vk(&config)?;

        Ok(Self::with_services(config, db, chat))
    }

    /// Create a runtime around already constructed services.
    pub fn with_services(config: Config, db: DbClient, chat: ChatClient) -> Self {
        let pool = WorkerPool::new(config.max_concurrent_tasks);

        Self {
            config,
            db,
            chat,
            state: AppState::default(),
            pool,
        }
    }

    /// Runs the ingestion loop until interrupted.
    pub async fn start(&self) -> Void {
        let deletions = self.spawn_deletion_queue();

        info!("Listening for events ...");

        tokio::select! {
            _ = self.ingest() => {},
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutting down ...");
            }
        }

        deletions.abort();

        Ok(())
    }

    async fn ingest(&self) {
        let backoff = Duration::from_secs(self.config.error_backoff_secs);

        loop {
            match self.chat.poll_events().await {
                Ok(messages) => {
                    for message in messages {
                        chat_event::handle_message(self.clone(), message);
                    }
                }
                Err(err) => {
                    error!("Error while polling events: {}", err);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn spawn_deletion_queue(&self) -> JoinHandle<()> {
        let runtime = self.clone();
        let interval = Duration::from_millis(self.config.delete_queue_interval_ms);

        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(interval);

                loop {
                    ticker.tick().await;
                    runtime.drain_deletions().await;
                }
            }
            .in_current_span(),
        )
    }

    /// Deletes every queued message, returning how many were deleted.
    pub async fn drain_deletions(&self) -> usize {
        let pending = self.state.take_deletions();
        let mut deleted = 0;

        for (peer_id, message_id) in pending {
            if self.chat.delete_message(peer_id, message_id).await {
                deleted += 1;
            } else {
                warn!("Dropping message {} in {} after every deletion attempt failed.", message_id, peer_id);
            }
        }

        deleted
    }
}

// Process state.

#[derive(Default)]
struct StateInner {
    last_command: HashMap<UserId, Instant>,
    quiet: bool,
    pending_deletions: Vec<(PeerId, MessageId)>,
}

/// Process-lifetime state: command cooldowns, the quiet-mode flag, and the
/// pending-deletion queue, all behind one lock.
///
/// Nothing here is persisted; a restart resets it.
#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<Mutex<StateInner>>,
}

impl AppState {
    /// Admits a command from `user_id` if its last admitted command is at least `cooldown` old.
    ///
    /// Only admitted commands are stamped, so a rejected attempt never extends the window.
    pub fn try_command_at(&self, user_id: UserId, now: Instant, cooldown: Duration) -> bool {
        let mut inner = self.inner.lock();

        if let Some(last) = inner.last_command.get(&user_id)
            && now.saturating_duration_since(*last) < cooldown
        {
            return false;
        }

        inner.last_command.insert(user_id, now);
        true
    }

    pub fn try_command(&self, user_id: UserId, cooldown: Duration) -> bool {
        self.try_command_at(user_id, Instant::now(), cooldown)
    }

    pub fn is_quiet(&self) -> bool {
        self.inner.lock().quiet
    }

    /// Flips quiet mode, returning the new value.
    pub fn toggle_quiet(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.quiet = !inner.quiet;
        inner.quiet
    }

    pub fn queue_deletion(&self, peer_id: PeerId, message_id: MessageId) {
        self.inner.lock().pending_deletions.push((peer_id, message_id));
    }

    /// Takes everything queued so far, leaving the queue empty.
    pub fn take_deletions(&self) -> Vec<(PeerId, MessageId)> {
        std::mem::take(&mut self.inner.lock().pending_deletions)
    }
}

// Worker pool.

/// A bounded pool of tokio tasks.
///
/// Submission never waits; the task itself waits for a permit, so the
/// ingestion loop is never blocked by slow handlers.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Spawns `task` once a permit is free.
    pub fn submit<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();

        tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };

                task.await;
            }
            .in_current_span(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn cooldown_rejects_inside_window_without_restamping() {
        let state = AppState::default();
        let cooldown = Duration::from_secs(3);
        let start = Instant::now();

        assert!(state.try_command_at(1, start, cooldown));
        assert!(!state.try_command_at(1, start + Duration::from_secs(2), cooldown));
        assert!(state.try_command_at(1, start + Duration::from_secs(3), cooldown));
    }

    #[test]
    fn cooldown_is_per_user() {
        let state = AppState::default();
        let cooldown = Duration::from_secs(3);
        let now = Instant::now();

        assert!(state.try_command_at(1, now, cooldown));
        assert!(state.try_command_at(2, now, cooldown));
    }

    #[test]
    fn quiet_mode_toggles() {
        let state = AppState::default();

        assert!(!state.is_quiet());
        assert!(state.toggle_quiet());
        assert!(state.is_quiet());
        assert!(!state.toggle_quiet());
    }

    #[test]
    fn deletion_queue_drains_once() {
        let state = AppState::default();

        state.queue_deletion(2_000_000_001, 10);
        state.queue_deletion(2_000_000_001, 11);

        assert_eq!(state.take_deletions(), vec![(2_000_000_001, 10), (2_000_000_001, 11)]);
        assert!(state.take_deletions().is_empty());
    }

    #[tokio::test]
    async fn worker_pool_runs_every_task() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let handles = (0..5)
            .map(|_| {
                let counter = counter.clone();
                pool.submit(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }
}
