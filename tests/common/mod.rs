//! Shared integration-test harness: running the `smartcross` binary and
//! hosting decision services in-process.

#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use smartcross::api::{AppState, build_router};
use smartcross::config::schema::{TieBreak, Timing};
use smartcross::scenarios::ScenarioRegistry;
use smartcross::traffic::score::ScoreCache;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// How long to wait for a spawned server to answer `/healthz`.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Path to the compiled binary.
pub fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_smartcross")
}

/// Path to a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Runs the binary to completion with `--quiet` appended.
#[allow(clippy::missing_panics_doc)]
pub fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .arg("--quiet")
        .output()
        .expect("failed to run smartcross")
}

/// Runs the binary with `input` piped to stdin.
#[allow(clippy::missing_panics_doc)]
pub fn run_with_stdin(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(bin())
        .args(args)
        .arg("--quiet")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn smartcross");
    child
        .stdin
        .take()
        .expect("stdin not captured")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for smartcross")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Reserves a free local port by binding and immediately releasing it.
#[allow(clippy::missing_panics_doc)]
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

/// A `smartcross serve` child process, killed on drop.
pub struct ServeProcess {
    child: tokio::process::Child,
    pub base_url: String,
}

impl ServeProcess {
    /// Spawns `serve` on a free port and waits until `/healthz` answers.
    #[allow(clippy::missing_panics_doc)]
    pub async fn spawn(extra: &[&str]) -> Self {
        let port = free_port();
        let bind = format!("127.0.0.1:{port}");
        let child = tokio::process::Command::new(bin())
            .args(["serve", "--bind", &bind, "--quiet"])
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn smartcross serve");

        let process = Self {
            child,
            base_url: format!("http://{bind}"),
        };
        process.wait_ready().await;
        process
    }

    async fn wait_ready(&self) {
        let client = reqwest::Client::new();
        let url = format!("{}/healthz", self.base_url);
        let ready = tokio::time::timeout(STARTUP_TIMEOUT, async {
            loop {
                if let Ok(resp) = client.get(&url).send().await {
                    if resp.status().is_success() {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        ready.expect("server did not become ready");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends SIGTERM-equivalent shutdown by killing the child.
    pub async fn stop(mut self) {
        let _ = self.child.kill().await;
    }
}

/// An in-process HTTP service hosting the local heuristic.
pub struct InProcessService {
    pub addr: SocketAddr,
    cancel: CancellationToken,
}

impl InProcessService {
    /// Serves the standard router on an ephemeral port.
    #[allow(clippy::missing_panics_doc)]
    pub async fn start() -> Self {
        let state = Arc::new(AppState {
            timing: Timing::default(),
            tie_break: TieBreak::FavorA,
            max_body_bytes: 64 * 1024,
            registry: Arc::new(ScenarioRegistry::builtin().expect("built-in scenarios")),
            scores: Arc::new(ScoreCache::new(Duration::from_secs(5), Some(7))),
            simulation: None,
        });
        Self::start_router(build_router(state)).await
    }

    /// Serves an arbitrary router on an ephemeral port.
    #[allow(clippy::missing_panics_doc)]
    pub async fn start_router(router: axum::Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .ok();
        });
        Self { addr, cancel }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for InProcessService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
