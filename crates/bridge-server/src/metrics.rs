//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle that renders `/metrics`. Call once, before any session
/// starts; a second install fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Sessions started (counter).
pub const SESSIONS_TOTAL: &str = "sessions_total";
/// Sessions currently running (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Upstream reconnects scheduled after an unexpected close (counter).
pub const UPSTREAM_RECONNECTS_TOTAL: &str = "upstream_reconnects_total";
/// Frames relayed (counter, labels: direction).
pub const FRAMES_RELAYED_TOTAL: &str = "frames_relayed_total";
/// Interruption and turn-completion signals seen upstream (counter, labels: signal).
pub const UPSTREAM_SIGNALS_TOTAL: &str = "upstream_signals_total";
/// Failed memory writes (counter, labels: kind).
pub const MEMORY_WRITE_FAILURES_TOTAL: &str = "memory_write_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            SESSIONS_TOTAL,
            SESSIONS_ACTIVE,
            UPSTREAM_RECONNECTS_TOTAL,
            FRAMES_RELAYED_TOTAL,
            UPSTREAM_SIGNALS_TOTAL,
            MEMORY_WRITE_FAILURES_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
