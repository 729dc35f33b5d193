//! Health probe logic.
//!
//! A job is probed with the service's custom health-check executable when
//! one is configured, otherwise with a plain HTTP request. The script
//! result maps onto exactly one [`Decision`]; only a script that could not
//! be run at all falls back to the HTTP probe.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, error, info};

use servicegrid_core::{ConfigResult, ServiceGridConfig};
use servicegrid_state::{Service, ServiceJob};

/// Result of running a custom health-check executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Exited 0.
    Passed,
    /// Exited nonzero, or was killed by a signal (`code` is `None`).
    Failed { code: Option<i32> },
    /// Did not finish within the timeout and was killed.
    TimedOut,
    /// Could not be spawned or waited on.
    Unavailable(String),
}

/// What a script outcome means for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Healthy,
    Unhealthy,
    /// Run the built-in probe instead.
    FallBack,
}

impl ScriptOutcome {
    pub fn decision(&self) -> Decision {
        match self {
            ScriptOutcome::Passed => Decision::Healthy,
            ScriptOutcome::Failed { .. } | ScriptOutcome::TimedOut => Decision::Unhealthy,
            ScriptOutcome::Unavailable(_) => Decision::FallBack,
        }
    }
}

/// Result of the built-in HTTP probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint answered with any HTTP response.
    Healthy,
    /// Connection, handshake, or request failed, or timed out.
    Failed,
}

/// Decides whether one job is healthy.
pub trait HealthProbe: Send + Sync {
    fn probe(&self, service: &Service, job: &ServiceJob) -> impl Future<Output = bool> + Send;
}

/// The production prober: custom script first, HTTP probe otherwise.
#[derive(Debug, Clone)]
pub struct Prober {
    script_timeout: Duration,
    probe_timeout: Duration,
    probe_path: String,
}

impl Prober {
    pub fn new(script_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            script_timeout,
            probe_timeout,
            probe_path: "/".to_string(),
        }
    }

    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    pub fn from_config(config: &ServiceGridConfig) -> ConfigResult<Self> {
        Ok(Self::new(
            config.health.script_timeout()?,
            config.health.probe_timeout()?,
        )
        .with_probe_path(config.health.probe_path.clone()))
    }
}

impl HealthProbe for Prober {
    async fn probe(&self, service: &Service, job: &ServiceJob) -> bool {
        let address = job.address();

        if let Some(ref script) = service.health_check_script {
            let outcome =
                run_health_script(script, &address, &service.id, self.script_timeout).await;
            match outcome.decision() {
                Decision::Healthy => {
                    debug!(service = %service.id, %address, "custom health check passed");
                    return true;
                }
                Decision::Unhealthy => {
                    if outcome == ScriptOutcome::TimedOut {
                        error!(
                            service = %service.id,
                            %address,
                            timeout = ?self.script_timeout,
                            "custom health check timed out"
                        );
                    } else {
                        debug!(service = %service.id, %address, ?outcome, "custom health check failed");
                    }
                    return false;
                }
                Decision::FallBack => {
                    info!(
                        service = %service.id,
                        script = %script.display(),
                        ?outcome,
                        "custom health check unavailable, falling back to http probe"
                    );
                }
            }
        }

        http_probe(&address, &self.probe_path, self.probe_timeout).await == ProbeResult::Healthy
    }
}

/// Run `<script> <host:port> <service-id>` with a hard timeout.
///
/// The child is killed and reaped on timeout. Output is discarded.
pub async fn run_health_script(
    script: &Path,
    address: &str,
    service_id: &str,
    timeout: Duration,
) -> ScriptOutcome {
    let mut child = match Command::new(script)
        .arg(address)
        .arg(service_id)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return ScriptOutcome::Unavailable(e.to_string()),
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => ScriptOutcome::Passed,
        Ok(Ok(status)) => ScriptOutcome::Failed {
            code: status.code(),
        },
        Ok(Err(e)) => {
            let _ = child.kill().await;
            ScriptOutcome::Unavailable(e.to_string())
        }
        Err(_) => {
            // `kill` also waits, so the child does not linger as a zombie.
            if let Err(e) = child.kill().await {
                debug!(script = %script.display(), error = %e, "failed to kill timed out health check");
            }
            ScriptOutcome::TimedOut
        }
    }
}

/// Perform an HTTP probe against `address` (`host:port`).
///
/// Any response counts as healthy, whatever its status code. Connection
/// errors and timeouts return `Failed`.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "servicegrid-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "invalid health probe request");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe answered");
                ProbeResult::Healthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%uri, "health probe timed out");
            ProbeResult::Failed
        }
    }
}
