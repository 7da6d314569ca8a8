mod common;

use chrono::{Local, TimeZone};
use common::{fast_config, steady_backend, write_prompts, FakeRuntime, Reply};
use dyno_core::prelude::ShutdownHandle;
use dyno_runner::prelude::{run_benchmark, BenchmarkPlan, ModelPhase};
use dyno_summary_model::{
    load_summary_runs, AggregatePayload, ResultRecord, RunId, RESULT_HEADER, RUN_SUMMARY_FILE,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn plan(output: &TempDir, models: &[&str]) -> BenchmarkPlan {
    let started_at = Local.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
    BenchmarkPlan {
        run_id: RunId::from_start_time(&started_at),
        started_at,
        host: "127.0.0.1:11435".to_string(),
        models: models.iter().map(|m| m.to_string()).collect(),
        prompts_dir: output.path().join("prompts"),
        output_dir: output.path().to_path_buf(),
        lifecycle: fast_config(),
        telemetry_interval: Duration::from_millis(10),
        cooldown: Duration::from_millis(5),
        show_progress: false,
        write_report: true,
    }
}

fn read_records(path: &Path) -> Vec<ResultRecord> {
    csv::Reader::from_path(path)
        .unwrap()
        .deserialize()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn a_run_writes_sinks_manifest_and_payload() {
    let output = tempfile::tempdir().unwrap();
    let plan = plan(&output, &["m1", "m2"]);
    write_prompts(
        &plan.prompts_dir,
        &[("t1.txt", "first prompt"), ("t2.txt", "second prompt")],
    );
    let runtime = FakeRuntime::new()
        .failing_pull("m1", u32::MAX)
        .installed("m2:latest", 4 * 1024 * 1024 * 1024)
        .reply("second prompt", Reply::Timeout(Duration::from_secs(180)));

    let report = run_benchmark(&plan, &runtime, steady_backend(), &ShutdownHandle::new()).unwrap();

    // The failing model does not stop the run.
    assert_eq!(
        report
            .outcomes
            .iter()
            .map(|o| (o.model.as_str(), o.phase))
            .collect::<Vec<_>>(),
        vec![("m1", ModelPhase::Failed), ("m2", ModelPhase::Done)]
    );

    let result_sink = plan.results_dir().join("benchmark_results_20250101_100000.csv");
    let records = read_records(&result_sink);
    assert_eq!(
        records
            .iter()
            .map(|r| (r.model.as_str(), r.test_case.as_str(), r.output.as_str()))
            .collect::<Vec<_>>(),
        vec![("m2", "t1.txt", "OK"), ("m2", "t2.txt", "TIMEOUT")]
    );

    let telemetry_sink = plan.telemetry_dir().join("gpu_usage_20250101_100000.csv");
    let header = csv::Reader::from_path(&telemetry_sink)
        .unwrap()
        .headers()
        .unwrap()
        .clone();
    assert_eq!(header.get(2), Some("util_gpu_pct"));

    let runs = load_summary_runs(&output.path().join(RUN_SUMMARY_FILE)).unwrap();
    assert_eq!(runs, vec![report.summary.clone()]);
    assert_eq!(runs[0].run_id.as_str(), "20250101_100000");
    assert_eq!(runs[0].telemetry_backend.as_deref(), Some("fake"));
    assert!(!runs[0].aborted);
    assert_eq!(runs[0].outcomes[0].phase, "failed");
    assert_eq!(runs[0].outcomes[0].ping_attempts, 3);
    assert_eq!(runs[0].outcomes[1].stop.as_deref(), Some("confirmed"));
    assert_eq!(runs[0].outcomes[1].tests_timed_out, 1);

    let payload_path = report.payload_path.unwrap();
    assert_eq!(
        payload_path,
        plan.results_dir().join("benchmark_payload_20250101_100000.json")
    );
    let payload: AggregatePayload =
        serde_json::from_str(&std::fs::read_to_string(payload_path).unwrap()).unwrap();
    let run = "benchmark_results_20250101_100000.csv";
    let t1 = payload.model_summary(run, "t1.txt", "m2").unwrap();
    assert_eq!((t1.duration_s, t1.count), (2.0, 1));
    let t2 = payload.model_summary(run, "t2.txt", "m2").unwrap();
    assert_eq!((t2.duration_s, t2.count), (180.0, 1));
    assert!(payload.model_summary(run, "t1.txt", "m1").is_none());
    assert!(payload.telemetry.contains_key(run));
}

#[test]
fn no_report_skips_the_payload() {
    let output = tempfile::tempdir().unwrap();
    let plan = BenchmarkPlan {
        write_report: false,
        ..plan(&output, &["m1"])
    };
    write_prompts(&plan.prompts_dir, &[("t1.txt", "prompt")]);

    let report =
        run_benchmark(&plan, &FakeRuntime::new(), steady_backend(), &ShutdownHandle::new())
            .unwrap();

    assert_eq!(report.payload_path, None);
    assert_eq!(
        read_records(&plan.results_dir().join("benchmark_results_20250101_100000.csv")).len(),
        1
    );
}

#[test]
fn missing_prompts_still_process_every_model() {
    let output = tempfile::tempdir().unwrap();
    let plan = plan(&output, &["m1", "m2"]);
    let runtime = FakeRuntime::new();

    let report = run_benchmark(&plan, &runtime, steady_backend(), &ShutdownHandle::new()).unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes.iter().all(|o| o.reached_stopping()));
    assert_eq!(runtime.count("stop m1"), 1);
    assert_eq!(runtime.count("stop m2"), 1);

    // Only the header, so the payload has an empty entry for the run.
    let content = std::fs::read_to_string(
        plan.results_dir().join("benchmark_results_20250101_100000.csv"),
    )
    .unwrap();
    assert_eq!(content.trim_end(), RESULT_HEADER.join(","));
    assert!(report.payload_path.is_some());
}

#[test]
fn an_abort_stops_the_current_model_and_starts_no_other() {
    let output = tempfile::tempdir().unwrap();
    let plan = plan(&output, &["m1", "m2"]);
    write_prompts(
        &plan.prompts_dir,
        &[("t1.txt", "fine"), ("t2.txt", "abort"), ("t3.txt", "never")],
    );
    let shutdown_handle = ShutdownHandle::new();
    let runtime = FakeRuntime::new()
        .reply("abort", Reply::Abort)
        .aborting_with(shutdown_handle.clone());

    let report = run_benchmark(&plan, &runtime, steady_backend(), &shutdown_handle).unwrap();

    assert!(report.summary.aborted);
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].aborted);
    assert_eq!(runtime.count("stop m1"), 1);
    assert_eq!(runtime.count("pull m2"), 0);

    let records =
        read_records(&plan.results_dir().join("benchmark_results_20250101_100000.csv"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].test_case, "t1.txt");

    let runs = load_summary_runs(&output.path().join(RUN_SUMMARY_FILE)).unwrap();
    assert!(runs[0].aborted);
}

#[test]
fn manifest_lines_accumulate_across_runs() {
    let output = tempfile::tempdir().unwrap();
    let first = plan(&output, &["m1"]);
    let started_at = Local.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
    let second = BenchmarkPlan {
        run_id: RunId::from_start_time(&started_at),
        started_at,
        ..plan(&output, &["m1"])
    };
    write_prompts(&first.prompts_dir, &[("t1.txt", "prompt")]);

    for plan in [&first, &second] {
        run_benchmark(plan, &FakeRuntime::new(), steady_backend(), &ShutdownHandle::new()).unwrap();
    }

    let runs = load_summary_runs(&output.path().join(RUN_SUMMARY_FILE)).unwrap();
    assert_eq!(
        runs.iter().map(|r| r.run_id.as_str()).collect::<Vec<_>>(),
        vec!["20250101_100000", "20250102_100000"]
    );

    let payload_path = output
        .path()
        .join("results")
        .join("benchmark_payload_20250102_100000.json");
    let payload: AggregatePayload =
        serde_json::from_str(&std::fs::read_to_string(payload_path).unwrap()).unwrap();
    assert_eq!(payload.runs.len(), 2);
}
