#![cfg(unix)]

use biobench_core::errors::TaskError;
use biobench_core::{Device, ModelHandle};
use biobench_tasks::{builtin_registry, NEWT, PLANTNET};
use serde_json::{json, Value};

fn model() -> ModelHandle {
    ModelHandle::new("open-clip", "RN50/openai", Device::Cpu)
}

fn run(task: &str, args: Value) -> Result<biobench_core::BenchmarkReport, TaskError> {
    let registry = builtin_registry().unwrap();
    let task = registry.get(task).unwrap();
    let config = task.prepare(&args, Device::Cpu)?;
    task.run(&model(), &config)
}

fn sh(script: &str) -> Value {
    json!(["sh", "-c", script])
}

#[test]
fn harness_scores_become_a_report() {
    let script = r#"
cat > /dev/null
echo '{"id": "a", "score": 1.0, "split": "train"}'
echo ''
echo '{"id": "b", "score": false, "split": "train"}'
echo '{"id": "c", "score": true, "split": "test", "info": {"label": "zebra"}}'
"#;
    let report = run(NEWT, json!({"harness": sh(script)})).unwrap();
    assert_eq!(report.name, "newt");
    assert_eq!(report.examples.len(), 3);
    assert_eq!(report.splits["train"], 0.5);
    assert_eq!(report.splits["test"], 1.0);
    assert_eq!(report.examples[2].info["label"], "zebra");
}

#[test]
fn harness_receives_task_model_and_config() {
    let script = r#"
input=$(cat)
case "$input" in
  *'"task":"plantnet"'*'"ckpt":"RN50/openai","device":"cpu"'*'"datadir":"/data/plantnet"'*)
    echo '{"id": "ok", "score": 1}' ;;
  *) echo '{"id": "mismatch", "score": 0}' ;;
esac
"#;
    let report = run(
        PLANTNET,
        json!({"datadir": "/data/plantnet", "harness": sh(script)}),
    )
    .unwrap();
    assert_eq!(report.examples[0].id, "ok");
}

#[test]
fn n_examples_truncates() {
    let script = "cat > /dev/null; for i in 1 2 3 4 5; do echo \"{\\\"id\\\": $i, \\\"score\\\": 1}\"; done";
    let report = run(NEWT, json!({"n_examples": 2, "harness": sh(script)})).unwrap();
    let ids: Vec<&str> = report.examples.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[test]
fn failing_harness_is_a_task_failure() {
    let err = run(
        NEWT,
        json!({"harness": sh("cat > /dev/null; echo 'CUDA out of memory' >&2; exit 7")}),
    )
    .unwrap_err();
    match err {
        TaskError::Failed { task, message } => {
            assert_eq!(task, "newt");
            assert!(message.contains("CUDA out of memory"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_line_names_the_line() {
    let script = r#"cat > /dev/null; echo '{"id": "a", "score": 1}'; echo 'oops'"#;
    let err = run(NEWT, json!({"harness": sh(script)})).unwrap_err();
    assert!(err.to_string().contains("line 2"), "{err}");
}

#[test]
fn out_of_range_score_is_rejected() {
    let script = r#"cat > /dev/null; echo '{"id": "a", "score": 3}'"#;
    let err = run(NEWT, json!({"harness": sh(script)})).unwrap_err();
    assert!(err.to_string().contains("outside [0, 1]"), "{err}");
}

#[test]
fn silent_harness_is_an_empty_report() {
    let err = run(NEWT, json!({"harness": sh("cat > /dev/null")})).unwrap_err();
    assert_eq!(
        err,
        TaskError::EmptyReport {
            task: "newt".into()
        }
    );
}

#[test]
fn harness_ignoring_its_input_still_scores() {
    let datadir = "d".repeat(256 * 1024);
    let script = r#"echo '{"id": "a", "score": 1}'"#;
    let report = run(NEWT, json!({"datadir": datadir, "harness": sh(script)})).unwrap();
    assert_eq!(report.examples.len(), 1);
}

#[test]
fn unknown_field_is_invalid_config() {
    let err = run(NEWT, json!({"harnes": ["true"]})).unwrap_err();
    assert!(matches!(err, TaskError::InvalidConfig { .. }));
}
