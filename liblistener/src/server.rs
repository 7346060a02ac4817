use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ListenerConfig;
use crate::session::{ConnId, Session};

/// Pause after a failed accept, so a persistent error (e.g. out of file
/// descriptors) does not spin the event loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct Listener {
    inner: TcpListener,
    idle_timeout: Duration,
    next_id: u64,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> io::Result<Self> {
        let inner = TcpListener::bind(config.addr()).await?;
        Ok(Listener {
            inner,
            idle_timeout: config.idle_timeout(),
            next_id: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// Accepts until `cancel` fires. Each connection becomes its own task on
    /// the current runtime and the acceptor goes straight back to waiting.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("listener stopping");
                    break;
                }
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = ConnId(self.next_id);
                        self.next_id += 1;
                        debug!("[{id}] accepted from {peer}");
                        let session = Session::new(id, stream, self.idle_timeout);
                        tokio::spawn(session.run());
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }
}

/// Runs a listener on a single-threaded event loop owned by the calling
/// thread, until `cancel` fires or the process receives Ctrl-C. Meant to be
/// the body of one long-lived work item.
pub fn serve_blocking(config: &ListenerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build listener event loop")?;

    runtime.block_on(async {
        let listener = Listener::bind(config)
            .await
            .with_context(|| format!("failed to bind {}", config.addr()))?;
        info!("listening on {}", listener.local_addr()?);

        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        listener.run(cancel).await;
        Ok(())
    })
}
