use anyhow::anyhow;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::state::ServerState;

// Pause after a failed accept so a persistent failure (e.g. out of file
// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    state: ServerState,
    config: Arc<ServerConfig>,
    tls: Option<TlsAcceptor>,
    permits: Arc<Semaphore>,
}

impl Server {
    /// Loads TLS material and binds the listener. Any failure here is fatal
    /// for the process.
    pub async fn bind(config: ServerConfig, state: ServerState) -> Result<Self, ServerError> {
        let tls = config.tls.as_ref().map(|tls| tls.acceptor()).transpose()?;

        let listener = TcpListener::bind(&config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen.clone(),
                source,
            })?;

        info!(
            addr = %listener.local_addr()?,
            tls = tls.is_some(),
            max_connections = config.max_connections,
            "listening"
        );

        Ok(Self {
            listener,
            state,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config: Arc::new(config),
            tls,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Accepts connections until `shutdown` resolves. Connections already
    /// being served are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (socket, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let conn = self.state.connection_opened();
            let span = info_span!("conn", id = conn.id(), %peer);

            let state = self.state.clone();
            let config = Arc::clone(&self.config);
            let tls = self.tls.clone();

            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _conn = conn;

                    debug!("accepted");
                    if let Err(err) = serve(&state, &config, tls, socket).await {
                        warn!("connection error: {err:#}");
                    }
                    debug!("closed");
                }
                .instrument(span),
            );
        }

        info!(
            active = self.state.active_connections(),
            accepted = self.state.accepted_total(),
            "listener stopped"
        );

        Ok(())
    }
}

async fn serve(
    state: &ServerState,
    config: &ServerConfig,
    tls: Option<TlsAcceptor>,
    socket: TcpStream,
) -> anyhow::Result<()> {
    let Some(acceptor) = tls else {
        return crate::conn::handle(state, config, socket).await;
    };

    let handshake = acceptor.accept(socket);
    let stream = match config.read_timeout {
        Some(limit) => tokio::time::timeout(limit, handshake)
            .await
            .map_err(|_| anyhow!("TLS handshake timed out"))?,
        None => handshake.await,
    }
    .map_err(|err| anyhow!("TLS handshake failed: {err}"))?;

    crate::conn::handle(state, config, stream).await
}
