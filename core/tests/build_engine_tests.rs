use anvil_core::graph::RuleGraph;
use anvil_core::observers::BuildObserver;
use anvil_core::rules::{Aggregate, BuildRule, GenFile, Tool};
use anvil_core::*;
use assert_fs::prelude::*;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn t(s: &str) -> BuildTarget {
    s.parse().unwrap()
}

fn config(root: &Path) -> Config {
    Config::builder()
        .workspace_root(root)
        .output_root(root.join("out"))
        .artifact_cache_root(root.join("cache"))
        .max_local_workers(2)
        .build()
        .unwrap()
}

fn copy_tool() -> Tool {
    Tool::new("cp").arg("{{SRC}}").arg("{{OUT}}")
}

fn gen_file(target: &str, input: &str, tool: Tool) -> BuildRule {
    let rule = GenFile::builder()
        .input(input)
        .import_path("com.x")
        .tool(tool)
        .build()
        .unwrap();
    BuildRule::new(t(target), vec![], rule)
}

fn aggregate(target: &str, deps: &[&str]) -> BuildRule {
    BuildRule::new(t(target), deps.iter().map(|d| t(d)).collect(), Aggregate::new())
}

fn engine(root: &Path, rules: Vec<BuildRule>) -> BuildEngine {
    let config = config(root);
    let graph = RuleGraph::new(rules, &config.output_paths()).unwrap();
    BuildEngine::with_local_cache(config, graph)
}

#[tokio::test]
async fn generated_files_are_built_once_and_then_fetched() {
    let root = assert_fs::TempDir::new().unwrap();
    root.child("Foo.idl").write_str("service Foo{}").unwrap();
    let mut engine = engine(root.path(), vec![gen_file("//gen:foo", "Foo.idl", copy_tool())]);

    let first = engine.build(&[t("//gen:foo")]).await.unwrap();
    assert!(first.is_success());
    assert_eq!(first.cache_status(&t("//gen:foo")), Some(CacheStatus::Fresh));
    root.child("out/gen/gen/foo__/com/x/Foo.java")
        .assert("service Foo{}");

    std::fs::remove_dir_all(root.path().join("out/gen")).unwrap();

    let second = engine.build(&[t("//gen:foo")]).await.unwrap();
    assert!(second.is_success());
    assert_eq!(second.cache_status(&t("//gen:foo")), Some(CacheStatus::Cached));
    assert_eq!(second.rule_key(&t("//gen:foo")), first.rule_key(&t("//gen:foo")));
    root.child("out/gen/gen/foo__/com/x/Foo.java")
        .assert("service Foo{}");
}

#[tokio::test]
async fn changing_an_input_changes_the_rule_key() {
    let root = assert_fs::TempDir::new().unwrap();
    let input = root.child("Foo.idl");
    input.write_str("service Foo{}").unwrap();
    let mut engine = engine(root.path(), vec![gen_file("//gen:foo", "Foo.idl", copy_tool())]);

    let first = engine.build(&[t("//gen:foo")]).await.unwrap();
    input.write_str("service Foo{ rpc Bar(); }").unwrap();
    let second = engine.build(&[t("//gen:foo")]).await.unwrap();

    assert_ne!(second.rule_key(&t("//gen:foo")), first.rule_key(&t("//gen:foo")));
    assert_eq!(second.cache_status(&t("//gen:foo")), Some(CacheStatus::Fresh));
    root.child("out/gen/gen/foo__/com/x/Foo.java")
        .assert("service Foo{ rpc Bar(); }");
}

/// Copies like `copy_tool`, and appends a line to `log` every time it runs.
fn logging_copy_tool(log: &Path) -> Tool {
    Tool::new("/bin/sh")
        .arg("-c")
        .arg("cp \"$0\" \"$1\" && echo built >> \"$2\"")
        .arg("{{SRC}}")
        .arg("{{OUT}}")
        .arg(log.to_string_lossy())
}

#[tokio::test]
async fn diamonds_build_every_rule_once() {
    let root = assert_fs::TempDir::new().unwrap();
    root.child("A.idl").write_str("service A{}").unwrap();
    let log = root.path().join("builds.log");
    let mut engine = engine(
        root.path(),
        vec![
            gen_file("//gen:a", "A.idl", logging_copy_tool(&log)),
            aggregate("//agg:b", &["//gen:a"]),
            aggregate("//agg:c", &["//gen:a"]),
            aggregate("//agg:d", &["//agg:b", "//agg:c"]),
        ],
    );

    let report = engine.build(&[t("//agg:d")]).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.outcomes().count(), 4);
    assert_eq!(report.count(CacheStatus::Fresh), 4);
    root.child("out/gen/agg/b__/gen/a__/com/x/A.java")
        .assert("service A{}");
    root.child("out/gen/agg/d__/agg/c__/gen/a__/com/x/A.java")
        .assert("service A{}");
    assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn failures_only_affect_their_dependents() {
    let root = assert_fs::TempDir::new().unwrap();
    root.child("Good.idl").write_str("service Good{}").unwrap();
    root.child("Bad.idl").write_str("service Bad{}").unwrap();
    let mut engine = engine(
        root.path(),
        vec![
            gen_file("//gen:good", "Good.idl", copy_tool()),
            gen_file("//gen:bad", "Bad.idl", Tool::new("false")),
            aggregate("//app:bin", &["//gen:bad", "//gen:good"]),
            aggregate("//app:other", &["//gen:good"]),
        ],
    );

    let report = engine
        .build(&[t("//app:bin"), t("//app:other")])
        .await
        .unwrap();

    assert!(!report.is_success());
    assert!(matches!(
        report.outcome(&t("//gen:bad")),
        Some(RuleState::Failed(failure)) if matches!(**failure, BuildFailure::StepFailed(_))
    ));
    assert!(matches!(
        report.outcome(&t("//app:bin")),
        Some(RuleState::DependencyFailed { dep }) if *dep == t("//gen:bad")
    ));
    assert!(report.outcome(&t("//app:other")).unwrap().is_success());
    assert!(report.outcome(&t("//gen:good")).unwrap().is_success());

    let causes: Vec<&BuildTarget> = report.root_causes().map(|(target, _)| target).collect();
    assert_eq!(causes, vec![&t("//gen:bad")]);
    assert!(!root.path().join("out/gen/app/bin__").exists());
}

#[tokio::test]
async fn missing_inputs_fail_the_rule() {
    let root = assert_fs::TempDir::new().unwrap();
    let mut engine = engine(root.path(), vec![gen_file("//gen:foo", "Foo.idl", copy_tool())]);

    let report = engine.build(&[t("//gen:foo")]).await.unwrap();

    let (target, failure) = report.root_causes().next().unwrap();
    assert_eq!(target, &t("//gen:foo"));
    assert!(failure.is_input_unavailable());
}

#[tokio::test]
async fn unknown_targets_are_rejected_before_building() {
    let root = assert_fs::TempDir::new().unwrap();
    let mut engine = engine(root.path(), vec![aggregate("//agg:a", &[])]);

    let err = engine.build(&[t("//agg:a"), t("//nope:nope")]).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownTarget(target) if target == t("//nope:nope")));
}

#[tokio::test]
async fn disabling_the_cache_always_rebuilds() {
    let root = assert_fs::TempDir::new().unwrap();
    root.child("Foo.idl").write_str("service Foo{}").unwrap();
    let config = Config::builder()
        .workspace_root(root.path())
        .output_root(root.path().join("out"))
        .enable_artifact_cache(false)
        .build()
        .unwrap();
    let graph = RuleGraph::new(
        vec![gen_file("//gen:foo", "Foo.idl", copy_tool())],
        &config.output_paths(),
    )
    .unwrap();
    let mut engine = BuildEngine::with_local_cache(config, graph);

    engine.build(&[t("//gen:foo")]).await.unwrap();
    let second = engine.build(&[t("//gen:foo")]).await.unwrap();

    assert_eq!(second.cache_status(&t("//gen:foo")), Some(CacheStatus::Fresh));
    assert!(!root.path().join("out/cache").exists());
}

#[derive(Clone, Default)]
struct Recorder {
    saw_success: Arc<AtomicBool>,
}

#[async_trait]
impl BuildObserver for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn on_build_finished(&self, report: Arc<BuildReport>) -> anyhow::Result<()> {
        self.saw_success.store(report.is_success(), Ordering::SeqCst);
        Ok(())
    }
}

struct Broken;

#[async_trait]
impl BuildObserver for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn on_build_finished(&self, _report: Arc<BuildReport>) -> anyhow::Result<()> {
        anyhow::bail!("could not reach the stats server")
    }
}

struct Panics;

#[async_trait]
impl BuildObserver for Panics {
    fn name(&self) -> &str {
        "panics"
    }

    async fn on_build_finished(&self, _report: Arc<BuildReport>) -> anyhow::Result<()> {
        panic!("observer bug")
    }
}

#[tokio::test]
async fn observers_can_not_change_the_outcome() {
    let root = assert_fs::TempDir::new().unwrap();
    let recorder = Recorder::default();
    let config = config(root.path());
    let graph = RuleGraph::new(vec![aggregate("//agg:a", &[])], &config.output_paths()).unwrap();
    let mut engine = BuildEngine::with_local_cache(config, graph)
        .with_observer(Broken)
        .with_observer(Panics)
        .with_observer(recorder.clone());

    let report = engine.build(&[t("//agg:a")]).await.unwrap();
    engine.wait_for_observers().await;

    assert!(report.is_success());
    assert!(recorder.saw_success.load(Ordering::SeqCst));
}
