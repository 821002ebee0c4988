//! Helpers shared by the integration tests.

use std::time::Duration;

use game_server::GameServer;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::info;

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A server stepping on a background task until told to stop.
pub struct ServerLoop {
    handle: JoinHandle<anyhow::Result<GameServer>>,
    stop: oneshot::Sender<()>,
}

impl ServerLoop {
    /// Accepts `clients` connections, then steps every `interval` until
    /// [`ServerLoop::stop`] is called.
    pub fn spawn(mut server: GameServer, clients: usize, dt: f32, interval: Duration) -> Self {
        let (stop, mut stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            for _ in 0..clients {
                server.accept_one().await?;
            }
            while stop_rx.try_recv().is_err() {
                server.step(dt).await?;
                tokio::time::sleep(interval).await;
            }
            info!(ticks = server.tick(), "Server loop stopped");
            Ok(server)
        });
        Self { handle, stop }
    }

    /// Stops stepping and hands the server back for inspection.
    pub async fn stop(self) -> anyhow::Result<GameServer> {
        let _ = self.stop.send(());
        self.handle.await?
    }
}
