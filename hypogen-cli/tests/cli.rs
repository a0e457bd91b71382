use clap::Parser;
use hypogen::{BackendKind, EvalMetrics, InferenceStyle, RunConfig, SolverKind, UpdateStyle};
use hypogen_agent::{LlmClient, MockBackend};
use hypogen_cli::commands::{self, SeedResult};
use hypogen_cli::{Cli, Command};
use std::path::Path;
use std::sync::Arc;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("hypogen").chain(args.iter().copied())).unwrap()
}

#[test]
fn generate_flags_override_config() {
    let cli = parse(&[
        "generate",
        "--task-config",
        "task.yaml",
        "--update-style",
        "sampling",
        "--max-num-hypotheses",
        "7",
        "-k",
        "3",
        "--alpha",
        "0.25",
        "--only-best-hypothesis",
        "--sample-num-to-restart-from",
        "40",
        "--backend",
        "mock",
    ]);
    let Command::Generate(args) = cli.command else {
        panic!("expected generate");
    };

    let mut config = RunConfig::default();
    config.update.num_epochs = 3;
    args.apply(&mut config);

    assert_eq!(config.update.style, UpdateStyle::Sampling);
    assert_eq!(config.update.max_num_hypotheses, 7);
    assert_eq!(config.update.k, 3);
    assert_eq!(config.update.alpha, 0.25);
    assert!(config.update.only_best_hypothesis);
    assert_eq!(config.update.sample_num_to_restart_from, Some(40));
    assert_eq!(config.update.num_epochs, 3);
    assert_eq!(config.model.backend, BackendKind::Mock);
}

#[test]
fn infer_flags() {
    let cli = parse(&[
        "--config",
        "run.toml",
        "infer",
        "--task-config",
        "task.yaml",
        "--hypothesis-file",
        "bank.json",
        "--seeds",
        "1,2,3",
        "--use-valid",
        "--inference-style",
        "one_step_adaptive",
        "--solver",
        "greedy",
    ]);
    assert_eq!(cli.config.as_deref(), Some(Path::new("run.toml")));
    let Command::Infer(args) = cli.command else {
        panic!("expected infer");
    };
    assert_eq!(args.seeds, vec![1, 2, 3]);
    assert!(args.use_valid);

    let mut config = RunConfig::default();
    args.apply(&mut config);
    assert_eq!(config.inference.style, InferenceStyle::OneStepAdaptive);
    assert_eq!(config.inference.solver, SolverKind::Greedy);
}

#[test]
fn rejects_unknown_style() {
    let result = Cli::try_parse_from([
        "hypogen",
        "infer",
        "--task-config",
        "t.yaml",
        "--hypothesis-file",
        "b.json",
        "--inference-style",
        "psychic",
    ]);
    assert!(result.is_err());
}

fn write_task(dir: &Path) -> std::path::PathBuf {
    std::fs::write(
        dir.join("train.json"),
        r#"{"item": ["apple", "kale", "pear", "leek"], "label": ["fruit", "veg", "fruit", "veg"]}"#,
    )
    .unwrap();
    let path = dir.join("task.yaml");
    std::fs::write(&path, "task_name: produce\ntrain_data_path: train.json\n").unwrap();
    path
}

#[tokio::test]
async fn generate_with_mock_backend_writes_final_bank() {
    let dir = tempfile::tempdir().unwrap();
    let task = write_task(dir.path());
    let out = dir.path().join("out");
    let cli = parse(&[
        "generate",
        "--task-config",
        task.to_str().unwrap(),
        "--backend",
        "mock",
        "--output-dir",
        out.to_str().unwrap(),
        "--num-train",
        "4",
        "--num-init",
        "2",
        "--init-batch-size",
        "2",
        "--update-batch-size",
        "2",
    ]);
    let Command::Generate(args) = cli.command else {
        panic!("expected generate");
    };

    let path = commands::generate(RunConfig::default(), &args).await.unwrap();
    assert!(path.starts_with(&out));
    assert!(path.to_string_lossy().contains("sample_final"));
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");

    // Nothing to predict with.
    let cli = parse(&[
        "infer",
        "--task-config",
        task.to_str().unwrap(),
        "--backend",
        "mock",
        "--hypothesis-file",
        path.to_str().unwrap(),
    ]);
    let Command::Infer(args) = cli.command else {
        panic!("expected infer");
    };
    assert!(commands::infer(RunConfig::default(), &args).await.is_err());
}

#[test]
fn missing_config_file_is_an_error() {
    assert!(commands::load_config(Some(Path::new("/nonexistent/run.toml"))).is_err());
    assert_eq!(commands::load_config(None).unwrap().seed, 49);
}

#[tokio::test]
async fn unreachable_backend_is_reported() {
    let down = LlmClient::new(Arc::new(MockBackend::new("offline").with_available(false)));
    let err = commands::ensure_available(&down).await.unwrap_err();
    assert!(err.to_string().contains("offline"));

    let up = LlmClient::new(Arc::new(MockBackend::default()));
    assert!(commands::ensure_available(&up).await.is_ok());
}

#[test]
fn seed_metrics_are_averaged() {
    let result = |seed, accuracy, macro_f1| SeedResult {
        seed,
        metrics: EvalMetrics {
            accuracy,
            macro_f1,
            wrong_indices: vec![],
        },
    };
    let mean = commands::average(&[result(1, 0.5, 0.4), result(2, 1.0, 0.8)]).unwrap();

    assert!((mean.accuracy - 0.75).abs() < 1e-12);
    assert!((mean.macro_f1 - 0.6).abs() < 1e-12);
    assert!(commands::average(&[]).is_none());
}
