//! Small runtime helpers shared across subsystems.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::metrics;

/// Wait for Ctrl-C (or SIGTERM on unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            debug!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                debug!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Run a fallible probe under a hard deadline.
///
/// Returns `None` when the probe times out or fails; the caller decides
/// what an indeterminate answer means.
pub async fn call_with_deadline<F, T, E>(label: &str, deadline: Duration, probe: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(deadline, probe).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            debug!(probe = label, error = %e, "Probe failed");
            None
        }
        Err(_) => {
            debug!(probe = label, deadline_ms = deadline.as_millis() as u64, "Probe timed out");
            metrics::inc_probe_timeouts(label);
            None
        }
    }
}

/// Convert fractional seconds to a `Duration`, clamping negatives and NaN to zero.
pub fn secs_f64(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_returns_value() {
        let result =
            call_with_deadline("ok", Duration::from_millis(100), async { Ok::<_, String>(7) })
                .await;
        assert_eq!(result, Some(7));
    }

    #[tokio::test]
    async fn deadline_swallows_errors() {
        let result = call_with_deadline("err", Duration::from_millis(100), async {
            Err::<u8, _>("boom".to_string())
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_times_out() {
        let result = call_with_deadline("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, String>(true)
        })
        .await;
        assert_eq!(result, None);
    }

    #[test]
    fn secs_f64_clamps() {
        assert_eq!(secs_f64(-1.0), Duration::ZERO);
        assert_eq!(secs_f64(f64::NAN), Duration::ZERO);
        assert_eq!(secs_f64(1.5), Duration::from_millis(1500));
    }
}
