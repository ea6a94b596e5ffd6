//! Detached task metrics regression tests

use super::helpers::*;
use bulwark_core::spawn_detached;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn detached_failures_are_counted() {
    init_recorder();

    spawn_detached("metrics_cleanup", async { Err::<(), _>("disk full") })
        .await
        .unwrap();

    assert_counter_exists("detached_task_failures_total");
    assert_metric_has_label("detached_task_failures_total", "operation", "metrics_cleanup");
}
