use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::pubsub::{SessionEvent, TokenBus};
use crate::store::SessionStore;

/// Hex-encoded OS randomness. 16 bytes gives 128 bits, far more than a
/// client could brute-force within one rotation interval.
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// The one background task that keeps every active session's token fresh.
///
/// Spawned once at startup; the returned handle owns the task and is the
/// only way to stop it. One task drives all sessions, so rotations for a
/// single session are strictly ordered by the tick sequence.
pub struct TokenRotator {
    store: Arc<SessionStore>,
    bus: Arc<TokenBus>,
    interval: Duration,
    token_bytes: usize,
}

impl TokenRotator {
    pub fn new(
        store: Arc<SessionStore>,
        bus: Arc<TokenBus>,
        interval: Duration,
        token_bytes: usize,
    ) -> Self {
        Self {
            store,
            bus,
            interval,
            token_bytes,
        }
    }

    /// One rotation pass over every known session. Sessions are handled
    /// independently; a session closed or removed mid-pass is skipped
    /// without touching the rest.
    pub fn tick(&self) {
        let mut rotated = 0usize;
        for session_id in self.store.session_ids() {
            let token = generate_token(self.token_bytes);
            // The store refuses the write once the session is closed, so
            // a close racing with this tick never revives the token.
            if self.store.rotate_token(&session_id, &token) {
                self.bus
                    .publish(&session_id, SessionEvent::TokenRotated { token });
                rotated += 1;
            }
        }
        if rotated > 0 {
            debug!("Rotated tokens for {} active session(s)", rotated);
        }
    }

    pub fn spawn(self) -> RotatorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                "Token rotator started (interval: {:?}, token bytes: {})",
                self.interval, self.token_bytes
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("Token rotator shutting down");
                        break;
                    }
                    _ = sleep(self.interval) => {
                        self.tick();
                    }
                }
            }
        });

        RotatorHandle { shutdown_tx, task }
    }
}

/// Owned handle to the rotation task. Dropping it without calling
/// `shutdown` leaves the task running for the life of the runtime.
pub struct RotatorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RotatorHandle {
    /// Cooperative stop: signalled between ticks, awaited to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}
