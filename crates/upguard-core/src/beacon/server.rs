//! Installer-side beacon server and info publication.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Utc;
use tokio::{
    io::BufReader,
    net::{UnixListener, UnixStream},
    sync::oneshot,
};
use uuid::Uuid;

use super::{
    protocol::{read_frame, write_frame, BeaconRequest, BeaconResponse, BeaconStatus},
    BeaconError,
};
use crate::{
    config::ScopePaths,
    install_info::{InstallationInfo, PublishedInstallation},
    scope::ScopeIdentity,
};

/// Idle time after which a client connection is dropped
const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Liveness beacon served by a running installer.
///
/// The beacon answers from its own thread and runtime, so an installer
/// busy with blocking work (or running a single-threaded runtime) still
/// answers probes.
///
/// Dropping the beacon stops serving and removes the socket file. Info
/// records it published are left in place; readers reject them once this
/// session stops answering.
#[derive(Debug)]
pub struct StatusBeacon {
    status: BeaconStatus,
    socket_path: PathBuf,
    info_path: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    /// Resolves (with an error) once the beacon thread has exited
    stopped: Option<oneshot::Receiver<()>>,
}

impl StatusBeacon {
    /// Bind the scope's socket and start answering probes.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if a live beacon already answers on the socket
    /// - `BindFailed` if the socket directory or socket cannot be set up
    /// - `WorkerFailed` if the beacon thread cannot be started
    pub async fn start(scope: ScopeIdentity, paths: &ScopePaths) -> Result<Self, BeaconError> {
        let socket_path = paths.beacon_socket.clone();
        let bind_err = |e: io::Error| BeaconError::BindFailed {
            path: paths.beacon_socket.clone(),
            source: e.into(),
        };

        if let Some(dir) = socket_path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(bind_err)?;
        }
        clear_stale_socket(&socket_path).await?;

        let listener = std::os::unix::net::UnixListener::bind(&socket_path).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;

        let status = BeaconStatus {
            scope,
            pid: std::process::id(),
            session: Uuid::new_v4(),
            started_at: Utc::now(),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stopped_tx, stopped_rx) = oneshot::channel::<()>();
        let serve_status = status.clone();
        let spawned = std::thread::Builder::new()
            .name("upguard-beacon".to_string())
            .spawn(move || {
                run_worker(listener, serve_status, shutdown_rx, ready_tx);
                drop(stopped_tx);
            });

        let ready = match spawned {
            Ok(_) => ready_rx
                .await
                .unwrap_or_else(|_| Err(io::Error::other("beacon thread exited before serving"))),
            Err(e) => Err(e),
        };
        if let Err(e) = ready {
            remove_socket(&socket_path);
            return Err(BeaconError::WorkerFailed { source: e.into() });
        }

        tracing::info!(
            scope = %status.scope,
            session = %status.session,
            socket = %socket_path.display(),
            "Status beacon started"
        );

        Ok(Self {
            status,
            socket_path,
            info_path: paths.info_file.clone(),
            shutdown: Some(shutdown_tx),
            stopped: Some(stopped_rx),
        })
    }

    #[must_use]
    pub const fn status(&self) -> &BeaconStatus {
        &self.status
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Publish (or re-publish) the installation info for this session.
    pub async fn publish(&self, info: &InstallationInfo) -> Result<(), BeaconError> {
        if info.host_identity != self.status.scope {
            return Err(BeaconError::ScopeMismatch {
                expected: self.status.scope.clone(),
                found: info.host_identity.clone(),
            });
        }

        let record = PublishedInstallation {
            session: self.status.session,
            pid: self.status.pid,
            info: info.clone(),
        };
        record.write(&self.info_path).await?;

        tracing::info!(
            scope = %self.status.scope,
            version = %info.update_version,
            stage = %info.stage,
            "Published installation info"
        );
        Ok(())
    }

    /// Stop serving and wait for the beacon thread to exit.
    pub async fn shutdown(mut self) {
        self.signal_stop();
        if let Some(stopped) = self.stopped.take() {
            // The sender is only ever dropped, so an error means "exited"
            let _ = stopped.await;
        }
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Receiver gone means the loop already exited
            let _ = tx.send(());
        }
    }
}

impl Drop for StatusBeacon {
    fn drop(&mut self) {
        self.signal_stop();
        remove_socket(&self.socket_path);
        tracing::debug!(scope = %self.status.scope, "Status beacon stopped");
    }
}

fn remove_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            socket = %path.display(),
            error = %e,
            "Failed to remove beacon socket"
        ),
    }
}

/// Remove a socket file left by a dead beacon; refuse if one still answers.
async fn clear_stale_socket(path: &Path) -> Result<(), BeaconError> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(BeaconError::BindFailed {
                path: path.to_path_buf(),
                source: e.into(),
            })
        }
    }

    match UnixStream::connect(path).await {
        Ok(_) => {
            return Err(BeaconError::AlreadyRunning {
                path: path.to_path_buf(),
            })
        }
        Err(e) => match socket_liveness(e.kind()) {
            SocketLiveness::Gone => {}
            SocketLiveness::Live => {
                return Err(BeaconError::AlreadyRunning {
                    path: path.to_path_buf(),
                })
            }
            SocketLiveness::Unknown => {
                return Err(BeaconError::BindFailed {
                    path: path.to_path_buf(),
                    source: e.into(),
                })
            }
        },
    }

    tracing::debug!(socket = %path.display(), "Removing stale beacon socket");
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BeaconError::BindFailed {
            path: path.to_path_buf(),
            source: e.into(),
        }),
    }
}

/// What a failed connect says about whoever owns an existing socket file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketLiveness {
    /// Nobody listens: safe to unlink
    Gone,
    /// A listener exists but could not take us (full backlog)
    Live,
    Unknown,
}

fn socket_liveness(kind: io::ErrorKind) -> SocketLiveness {
    match kind {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => SocketLiveness::Gone,
        io::ErrorKind::WouldBlock => SocketLiveness::Live,
        _ => SocketLiveness::Unknown,
    }
}

/// Body of the beacon thread: a private runtime that only serves the socket.
fn run_worker(
    listener: std::os::unix::net::UnixListener,
    status: BeaconStatus,
    shutdown: oneshot::Receiver<()>,
    ready: oneshot::Sender<io::Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    runtime.block_on(async move {
        match UnixListener::from_std(listener) {
            Ok(listener) => {
                let _ = ready.send(Ok(()));
                serve(listener, status, shutdown).await;
            }
            Err(e) => {
                let _ = ready.send(Err(e));
            }
        }
    });
    // Dropping the runtime here cancels any open connection handlers
}

async fn serve(listener: UnixListener, status: BeaconStatus, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let status = status.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &status).await {
                            tracing::debug!(error = %e, "Beacon connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Beacon accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}

async fn handle_connection(stream: UnixStream, status: &BeaconStatus) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let frame = tokio::time::timeout(CONNECTION_IDLE_TIMEOUT, read_frame(&mut reader))
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::TimedOut))??;

        let Some(line) = frame else {
            return Ok(());
        };

        let response = match serde_json::from_str::<BeaconRequest>(line.trim()) {
            Ok(BeaconRequest::Ping) => BeaconResponse::Pong(status.clone()),
            Err(e) => BeaconResponse::Error {
                message: format!("invalid request: {e}"),
            },
        };
        write_frame(&mut write_half, &response).await?;
    }
}
