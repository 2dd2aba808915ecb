//! Install status prober.
//!
//! Answers "is an installer running for this application, and what is it
//! installing?" without touching the update lock. Liveness comes from the
//! installer's status beacon; the descriptor comes from the durable record
//! and is only trusted when its session matches the live beacon.
//!
//! Every probe fails soft: any fault resolves to "not running" / "no info"
//! so a broken probe can never hold an installation up.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::{
    io::BufReader,
    net::UnixStream,
    runtime::Handle,
    task::JoinHandle,
    time::Instant,
};

use crate::{
    beacon::{
        protocol::{read_frame, write_frame},
        BeaconRequest, BeaconResponse, BeaconStatus,
    },
    config::Config,
    error::IoErrorKind,
    install_info::{InstallationInfo, PublishedInstallation},
    scope::ScopeIdentity,
};

/// Why a probe was inconclusive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Nothing answers on the beacon socket
    #[error("no installer beacon at {path}: {source}")]
    Unreachable {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Beacon accepted but did not answer in time
    #[error("installer beacon at {path} did not answer within {timeout_ms} ms")]
    TimedOut { path: PathBuf, timeout_ms: u64 },

    /// Beacon answered something we could not understand
    #[error("installer beacon protocol error: {0}")]
    Protocol(String),

    /// Beacon answered for another application
    #[error("beacon answered for '{found}' instead of '{expected}'")]
    ScopeMismatch {
        expected: ScopeIdentity,
        found: ScopeIdentity,
    },
}

/// Derived installation status; computed fresh on every probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStatus {
    Idle,
    /// Info is absent until the installer publishes it
    InstallerRunning(Option<InstallationInfo>),
}

impl InstallStatus {
    #[must_use]
    pub const fn is_installer_running(&self) -> bool {
        matches!(self, Self::InstallerRunning(_))
    }

    #[must_use]
    pub const fn installation_info(&self) -> Option<&InstallationInfo> {
        match self {
            Self::InstallerRunning(info) => info.as_ref(),
            Self::Idle => None,
        }
    }
}

/// Read-only status queries, bounded by `probe.timeout_ms`.
#[derive(Debug, Clone)]
pub struct InstallStatusProber {
    config: Config,
}

impl InstallStatusProber {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Ask the scope's beacon who is running.
    pub async fn ping(&self, host: &ScopeIdentity) -> Result<BeaconStatus, ProbeError> {
        self.ping_until(host, self.deadline()).await
    }

    /// Whether an installer for `host` is alive right now.
    ///
    /// Advisory only: `false` does not mean the update lock is free.
    pub async fn probe_installer_running(&self, host: &ScopeIdentity) -> bool {
        match self.ping(host).await {
            Ok(status) => {
                tracing::debug!(%host, pid = status.pid, "Installer is running");
                true
            }
            Err(e) => {
                tracing::debug!(%host, reason = %e, "No running installer");
                false
            }
        }
    }

    /// The installation info published by the running installer, if any.
    ///
    /// May be `None` while [`probe_installer_running`](Self::probe_installer_running)
    /// says `true`: the installer may not have published yet.
    pub async fn probe_installer_update_item(
        &self,
        host: &ScopeIdentity,
    ) -> Option<InstallationInfo> {
        match self.query(host).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(%host, reason = %e, "No installation info: installer not reachable");
                None
            }
        }
    }

    pub async fn install_status(&self, host: &ScopeIdentity) -> InstallStatus {
        match self.query(host).await {
            Ok(info) => InstallStatus::InstallerRunning(info),
            Err(e) => {
                tracing::debug!(%host, reason = %e, "Install status idle");
                InstallStatus::Idle
            }
        }
    }

    /// Run [`probe_installer_running`](Self::probe_installer_running) on
    /// `runtime` and hand the answer to `completion`.
    ///
    /// `completion` runs on whichever runtime worker finishes the probe;
    /// re-dispatch from it if you need a particular thread. Aborting the
    /// returned handle drops the completion uncalled.
    pub fn spawn_probe_installer_running<F>(
        &self,
        runtime: &Handle,
        host: ScopeIdentity,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let prober = self.clone();
        runtime.spawn(async move { completion(prober.probe_installer_running(&host).await) })
    }

    /// Completion-handler form of
    /// [`probe_installer_update_item`](Self::probe_installer_update_item);
    /// same delivery rules as
    /// [`spawn_probe_installer_running`](Self::spawn_probe_installer_running).
    pub fn spawn_probe_installer_update_item<F>(
        &self,
        runtime: &Handle,
        host: ScopeIdentity,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Option<InstallationInfo>) + Send + 'static,
    {
        let prober = self.clone();
        runtime.spawn(async move { completion(prober.probe_installer_update_item(&host).await) })
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.probe.timeout()
    }

    async fn ping_until(
        &self,
        host: &ScopeIdentity,
        deadline: Instant,
    ) -> Result<BeaconStatus, ProbeError> {
        let socket = self.config.paths_for(host).beacon_socket;

        let status = tokio::time::timeout_at(deadline, exchange(&socket))
            .await
            .map_err(|_| ProbeError::TimedOut {
                path: socket.clone(),
                timeout_ms: self.config.probe.timeout_ms,
            })??;

        if status.scope != *host {
            return Err(ProbeError::ScopeMismatch {
                expected: host.clone(),
                found: status.scope,
            });
        }

        Ok(status)
    }

    /// Ping, then read the published record with whatever is left of the
    /// same timeout. A record that cannot be read in time counts as absent.
    async fn query(&self, host: &ScopeIdentity) -> Result<Option<InstallationInfo>, ProbeError> {
        let deadline = self.deadline();
        let status = self.ping_until(host, deadline).await?;

        match tokio::time::timeout_at(deadline, self.published_info(host, &status)).await {
            Ok(info) => Ok(info),
            Err(_) => {
                tracing::debug!(%host, "Installation record not read within the probe timeout");
                Ok(None)
            }
        }
    }

    async fn published_info(
        &self,
        host: &ScopeIdentity,
        status: &BeaconStatus,
    ) -> Option<InstallationInfo> {
        let info_path = self.config.paths_for(host).info_file;
        let record = PublishedInstallation::read(&info_path).await?;

        if record.session != status.session {
            tracing::debug!(
                %host,
                record_session = %record.session,
                live_session = %status.session,
                "Ignoring installation info from an earlier installer"
            );
            return None;
        }
        if record.info.host_identity != *host {
            tracing::debug!(%host, found = %record.info.host_identity, "Ignoring foreign installation info");
            return None;
        }

        Some(record.info)
    }
}

/// One ping round-trip over the beacon socket.
async fn exchange(socket: &Path) -> Result<BeaconStatus, ProbeError> {
    let stream = UnixStream::connect(socket)
        .await
        .map_err(|e| ProbeError::Unreachable {
            path: socket.to_path_buf(),
            source: e.into(),
        })?;
    let (read_half, mut write_half) = stream.into_split();

    write_frame(&mut write_half, &BeaconRequest::Ping)
        .await
        .map_err(|e| ProbeError::Protocol(format!("failed to send ping: {e}")))?;

    let mut reader = BufReader::new(read_half);
    let line = read_frame(&mut reader)
        .await
        .map_err(|e| ProbeError::Protocol(format!("failed to read reply: {e}")))?
        .ok_or_else(|| ProbeError::Protocol("beacon closed without answering".to_string()))?;

    match serde_json::from_str::<BeaconResponse>(line.trim()) {
        Ok(BeaconResponse::Pong(status)) => Ok(status),
        Ok(BeaconResponse::Error { message }) => Err(ProbeError::Protocol(message)),
        Err(e) => Err(ProbeError::Protocol(format!("malformed reply: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use uuid::Uuid;

    use super::*;
    use crate::{beacon::BeaconError, beacon::StatusBeacon, install_info::InstallStage};

    fn setup() -> Result<(TempDir, Config, ScopeIdentity), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let mut config = Config::rooted_at(dir.path());
        config.probe.timeout_ms = 200;
        Ok((dir, config, ScopeIdentity::new("com.example.App")?))
    }

    #[tokio::test]
    async fn test_no_installer_is_idle() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let prober = InstallStatusProber::new(config);

        assert!(!prober.probe_installer_running(&scope).await);
        assert_eq!(prober.probe_installer_update_item(&scope).await, None);
        assert_eq!(prober.install_status(&scope).await, InstallStatus::Idle);
        assert!(matches!(
            prober.ping(&scope).await,
            Err(ProbeError::Unreachable { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_running_before_and_after_publish() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let prober = InstallStatusProber::new(config.clone());
        let beacon = StatusBeacon::start(scope.clone(), &config.paths_for(&scope)).await?;

        assert!(prober.probe_installer_running(&scope).await);
        assert_eq!(prober.probe_installer_update_item(&scope).await, None);
        assert_eq!(
            prober.install_status(&scope).await,
            InstallStatus::InstallerRunning(None)
        );

        let info = InstallationInfo::new(scope.clone(), "2.0.1").with_stage(InstallStage::Extracting);
        beacon.publish(&info).await?;
        assert_eq!(prober.probe_installer_update_item(&scope).await, Some(info.clone()));

        let installing = info.with_stage(InstallStage::Installing);
        beacon.publish(&installing).await?;
        let status = prober.install_status(&scope).await;
        assert_eq!(status.installation_info(), Some(&installing));
        Ok(())
    }

    #[tokio::test]
    async fn test_ping_reports_beacon_identity() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let prober = InstallStatusProber::new(config.clone());
        let beacon = StatusBeacon::start(scope.clone(), &config.paths_for(&scope)).await?;

        let status = prober.ping(&scope).await?;
        assert_eq!(&status, beacon.status());
        assert_eq!(status.pid, std::process::id());
        Ok(())
    }

    #[tokio::test]
    async fn test_stops_reporting_after_shutdown() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let prober = InstallStatusProber::new(config.clone());

        let beacon = StatusBeacon::start(scope.clone(), &config.paths_for(&scope)).await?;
        beacon
            .publish(&InstallationInfo::new(scope.clone(), "2.0"))
            .await?;
        beacon.shutdown().await;

        assert!(!prober.probe_installer_running(&scope).await);
        assert_eq!(prober.probe_installer_update_item(&scope).await, None);

        let beacon = StatusBeacon::start(scope.clone(), &config.paths_for(&scope)).await?;
        drop(beacon);
        assert!(!prober.probe_installer_running(&scope).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_record_is_not_reported() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let paths = config.paths_for(&scope);
        let prober = InstallStatusProber::new(config.clone());

        // Left behind by an installer that crashed
        PublishedInstallation {
            session: Uuid::new_v4(),
            pid: u32::MAX - 1,
            info: InstallationInfo::new(scope.clone(), "1.9"),
        }
        .write(&paths.info_file)
        .await?;

        assert_eq!(prober.probe_installer_update_item(&scope).await, None);

        let _beacon = StatusBeacon::start(scope.clone(), &paths).await?;
        assert!(prober.probe_installer_running(&scope).await);
        assert_eq!(prober.probe_installer_update_item(&scope).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_dead_socket_reports_idle_and_is_reclaimed() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let paths = config.paths_for(&scope);
        let prober = InstallStatusProber::new(config.clone());

        // Simulate a crashed installer: the socket file outlives its listener
        std::fs::create_dir_all(&config.runtime_dir)?;
        drop(std::os::unix::net::UnixListener::bind(&paths.beacon_socket)?);
        assert!(paths.beacon_socket.exists());

        let started = Instant::now();
        assert!(!prober.probe_installer_running(&scope).await);
        assert!(started.elapsed() < Duration::from_secs(1));

        let _beacon = StatusBeacon::start(scope.clone(), &paths).await?;
        assert!(prober.probe_installer_running(&scope).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_second_live_beacon_is_refused() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let paths = config.paths_for(&scope);

        let _first = StatusBeacon::start(scope.clone(), &paths).await?;
        let second = StatusBeacon::start(scope.clone(), &paths).await;
        assert!(matches!(second, Err(BeaconError::AlreadyRunning { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_publish_rejects_foreign_info() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let beacon = StatusBeacon::start(scope.clone(), &config.paths_for(&scope)).await?;

        let foreign = InstallationInfo::new(ScopeIdentity::new("com.example.Other")?, "1.0");
        assert!(matches!(
            beacon.publish(&foreign).await,
            Err(BeaconError::ScopeMismatch { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_scopes_are_independent() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let other = ScopeIdentity::new("com.example.Other")?;
        let prober = InstallStatusProber::new(config.clone());

        let _beacon = StatusBeacon::start(scope.clone(), &config.paths_for(&scope)).await?;
        assert!(prober.probe_installer_running(&scope).await);
        assert!(!prober.probe_installer_running(&other).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_silent_beacon_times_out() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let paths = config.paths_for(&scope);
        let prober = InstallStatusProber::new(config.clone());

        std::fs::create_dir_all(&config.runtime_dir)?;
        let listener = tokio::net::UnixListener::bind(&paths.beacon_socket)?;
        let silent = tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(stream);
            }
        });

        let started = Instant::now();
        assert!(matches!(
            prober.ping(&scope).await,
            Err(ProbeError::TimedOut { timeout_ms: 200, .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));

        silent.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_garbage_reply_is_inconclusive() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let paths = config.paths_for(&scope);
        let prober = InstallStatusProber::new(config.clone());

        std::fs::create_dir_all(&config.runtime_dir)?;
        let listener = tokio::net::UnixListener::bind(&paths.beacon_socket)?;
        let rogue = tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(b"hello\n").await;
            }
        });

        assert!(matches!(
            prober.ping(&scope).await,
            Err(ProbeError::Protocol(_))
        ));
        rogue.abort();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_completion_handlers_deliver_results() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let prober = InstallStatusProber::new(config.clone());
        let beacon = StatusBeacon::start(scope.clone(), &config.paths_for(&scope)).await?;
        let info = InstallationInfo::new(scope.clone(), "3.0");
        beacon.publish(&info).await?;

        let (running_tx, running_rx) = tokio::sync::oneshot::channel();
        let _running = prober.spawn_probe_installer_running(
            &Handle::current(),
            scope.clone(),
            move |running| {
                let _ = running_tx.send(running);
            },
        );
        assert!(running_rx.await?);

        let (info_tx, info_rx) = tokio::sync::oneshot::channel();
        let _item = prober.spawn_probe_installer_update_item(
            &Handle::current(),
            scope.clone(),
            move |item| {
                let _ = info_tx.send(item);
            },
        );
        assert_eq!(info_rx.await?, Some(info));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_aborted_completions_are_never_called() -> Result<(), Box<dyn std::error::Error>> {
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        };

        let (_dir, config, scope) = setup()?;
        let paths = config.paths_for(&scope);
        let prober = InstallStatusProber::new(config.clone());

        // Accepts and never answers, so both probes would run to the timeout
        std::fs::create_dir_all(&config.runtime_dir)?;
        let listener = tokio::net::UnixListener::bind(&paths.beacon_socket)?;
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let called = Arc::new(AtomicBool::new(false));
        let running_flag = Arc::clone(&called);
        let running = prober.spawn_probe_installer_running(
            &Handle::current(),
            scope.clone(),
            move |_| running_flag.store(true, Ordering::SeqCst),
        );
        let item_flag = Arc::clone(&called);
        let item = prober.spawn_probe_installer_update_item(
            &Handle::current(),
            scope.clone(),
            move |_| item_flag.store(true, Ordering::SeqCst),
        );

        running.abort();
        item.abort();
        assert!(running.await.is_err_and(|e| e.is_cancelled()));
        assert!(item.await.is_err_and(|e| e.is_cancelled()));

        // Well past the probe timeout: nothing was delivered late either
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!called.load(Ordering::SeqCst));

        silent.abort();
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_record_read_is_bounded_by_timeout() -> Result<(), Box<dyn std::error::Error>> {
        let (_dir, config, scope) = setup()?;
        let paths = config.paths_for(&scope);
        let prober = InstallStatusProber::new(config.clone());
        let _beacon = StatusBeacon::start(scope.clone(), &paths).await?;

        // A FIFO without a writer: opening it for reading blocks
        std::fs::create_dir_all(&config.state_dir)?;
        let made = std::process::Command::new("mkfifo")
            .arg(&paths.info_file)
            .status()?;
        assert!(made.success());

        let started = Instant::now();
        let status = prober.install_status(&scope).await;
        let elapsed = started.elapsed();

        // Release the stuck reader so the runtime can shut down
        let writer = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&paths.info_file)?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(writer);

        assert_eq!(status, InstallStatus::InstallerRunning(None));
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
        Ok(())
    }
}
