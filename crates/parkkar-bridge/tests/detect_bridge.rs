//! Detect-mode bridge against shell-script detectors
#![cfg(unix)]

mod common;

use common::{
    capture_logs, config, config_with_grace, warnings_for, Fixture, RecordingNotifier,
};
use parkkar_bridge::{start_detection, DetectSummary, JobPool, LaunchError};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[tokio::test]
async fn test_counts_forwarded_in_order_and_noise_dropped() {
    capture_logs();
    let fx = Fixture::new();
    let script = fx.script("lot.sh", "printf '12\\ngarbage\\n11\\n'\n");
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();

    let handle = start_detection(
        &fx.launcher(),
        &pool,
        "lot-a",
        script,
        notifier.clone(),
        &config(8192),
    )
    .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(
        summary,
        DetectSummary {
            readings: 2,
            rejected: 1,
            delivery_failures: 0,
        }
    );
    assert_eq!(
        notifier.counts(),
        vec![("lot-a".to_string(), 12), ("lot-a".to_string(), 11)]
    );
    assert_eq!(
        warnings_for("lot-a"),
        vec![r#"[lot-a] Non-integer output: "garbage""#.to_string()]
    );
    assert_eq!(pool.running("lot-a"), 0);
}

#[tokio::test]
async fn test_notifier_failures_do_not_stop_the_relay() {
    let fx = Fixture::new();
    let script = fx.script("lot.sh", "echo 4\necho 3\necho 2\n");
    let notifier = Arc::new(RecordingNotifier::rejecting());
    let pool = JobPool::new();

    let handle = start_detection(
        &fx.launcher(),
        &pool,
        "lot-b",
        script,
        notifier.clone(),
        &config(8192),
    )
    .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.readings, 3);
    assert_eq!(summary.delivery_failures, 3);
    assert_eq!(notifier.counts().len(), 3);
}

#[tokio::test]
async fn test_noisy_stderr_does_not_block_stdout() {
    let fx = Fixture::new();
    // well beyond a pipe buffer on stderr before the only count
    let script = fx.script("lot.sh", "head -c 300000 /dev/zero >&2\necho 5\n");
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();

    let handle = start_detection(
        &fx.launcher(),
        &pool,
        "lot-c",
        script,
        notifier.clone(),
        &config(8192),
    )
    .unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("relay finished")
        .unwrap();

    assert_eq!(summary.readings, 1);
    assert_eq!(notifier.counts(), vec![("lot-c".to_string(), 5)]);
}

#[tokio::test]
async fn test_lingering_process_is_killed_after_grace_period() {
    let fx = Fixture::new();
    // closes stdout, ignores SIGTERM and keeps running
    let script = fx.script("lot.sh", "trap '' TERM\necho 9\nexec sleep 30 >&-\n");
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();

    let handle = start_detection(
        &fx.launcher(),
        &pool,
        "lot-d",
        script,
        notifier.clone(),
        &config(8192),
    )
    .unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("relay finished within grace period")
        .unwrap();

    assert_eq!(summary.readings, 1);
}

#[tokio::test]
async fn test_detector_outliving_its_output_gets_sigterm() {
    let fx = Fixture::new();
    let script = fx.script(
        "lot.sh",
        concat!(
            "trap 'echo term > marker; exit 0' TERM\n",
            "echo 6\n",
            "exec 1>&-\n",
            "while :; do sleep 0.05; done\n",
        ),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();
    let grace = config_with_grace(8192, 3000);

    let started = Instant::now();
    let handle = start_detection(
        &fx.launcher(),
        &pool,
        "lot-h",
        script,
        notifier.clone(),
        &grace,
    )
    .unwrap();
    let summary = handle.await.unwrap();

    assert_eq!(summary.readings, 1);
    assert!(started.elapsed() < Duration::from_secs(2));
    let marker = std::fs::read_to_string(fx.dir.path().join("marker")).unwrap();
    assert_eq!(marker.trim(), "term");
}

#[tokio::test]
async fn test_overlong_line_is_rejected_and_skipped() {
    capture_logs();
    let fx = Fixture::new();
    let script = fx.script("lot.sh", "head -c 100000 /dev/zero | tr '\\0' 7\necho\necho 5\n");
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();

    let summary = start_detection(
        &fx.launcher(),
        &pool,
        "lot-i",
        script,
        notifier.clone(),
        &config(8192),
    )
    .unwrap()
    .await
    .unwrap();

    assert_eq!(summary.readings, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(notifier.counts(), vec![("lot-i".to_string(), 5)]);
    let warnings = warnings_for("lot-i");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("longer than 1024 bytes"));
}

#[tokio::test]
async fn test_launch_failure_is_returned() {
    let fx = Fixture::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();

    let missing = start_detection(
        &fx.launcher(),
        &pool,
        "lot-e",
        "absent.sh",
        notifier.clone(),
        &config(8192),
    );
    assert!(matches!(missing, Err(LaunchError::ScriptMissing(_))));

    let script = fx.script("lot.sh", "echo 1\n");
    let no_interpreter = start_detection(
        &fx.broken_launcher(),
        &pool,
        "lot-e",
        script,
        notifier.clone(),
        &config(8192),
    );
    assert!(matches!(no_interpreter, Err(LaunchError::InterpreterNotFound(_))));

    assert_eq!(pool.running_total(), 0);
    assert!(notifier.counts().is_empty());
}

#[tokio::test]
async fn test_same_lot_twice_runs_two_independent_jobs() {
    let fx = Fixture::new();
    let script = fx.script("lot.sh", "echo 7\n");
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();
    let launcher = fx.launcher();

    let first = start_detection(
        &launcher,
        &pool,
        "lot-f",
        script.clone(),
        notifier.clone(),
        &config(8192),
    )
    .unwrap();
    let second = start_detection(
        &launcher,
        &pool,
        "lot-f",
        script,
        notifier.clone(),
        &config(8192),
    )
    .unwrap();

    assert_eq!(first.await.unwrap().readings, 1);
    assert_eq!(second.await.unwrap().readings, 1);
    assert_eq!(
        notifier.counts(),
        vec![("lot-f".to_string(), 7), ("lot-f".to_string(), 7)]
    );
    assert_eq!(pool.running("lot-f"), 0);
}

#[tokio::test]
async fn test_detect_mode_does_not_pass_stream_flag() {
    let fx = Fixture::new();
    // prints 1 only when invoked without arguments
    let script = fx.script("lot.sh", "if [ $# -eq 0 ]; then echo 1; else echo bad; fi\n");
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = JobPool::new();

    let summary = start_detection(
        &fx.launcher(),
        &pool,
        "lot-g",
        script,
        notifier.clone(),
        &config(8192),
    )
    .unwrap()
    .await
    .unwrap();

    assert_eq!(summary.readings, 1);
    assert_eq!(summary.rejected, 0);
}
