//! Prometheus recorder for the provisioning run
//!
//! The binary is short-lived, so metrics are rendered into the log at exit
//! rather than served.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("task_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_duration_renders_as_histogram() {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        task_service::metrics::record_run(task_service::TaskStatus::Success, 42.0);

        let output = handle.render();
        assert!(output.contains("task_duration_seconds_bucket"), "{output}");
        assert!(output.contains("le=\"60\""), "{output}");
        assert!(output.contains("le=\"+Inf\""), "{output}");
    }
}
