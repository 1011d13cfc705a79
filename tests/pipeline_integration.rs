//! Integration tests for the pipeline.
//!
//! Commands are answered by a scripted process runner that simulates the
//! package manager and the Cypress CLI on a temp home directory, so these
//! tests need neither node nor network access.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serial_test::serial;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use cypress_ci::runner::RESULTS_FILE_VAR;
use cypress_ci::{
    ActionConfig, CiContext, CommandSpec, DetachedProcess, DirCacheStore, Error, FinalState,
    ModuleRunner, NetworkPoller, ProcessRunner, Result, Stage, TestOrchestrator,
};

/// Pretends to be npm, npx and node.
struct ScriptedRunner {
    home: std::path::PathBuf,
    results_json: String,
    log: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn new(home: &Path, results_json: &str) -> Self {
        Self {
            home: home.to_path_buf(),
            results_json: results_json.to_string(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<()> {
        self.log.lock().unwrap().push(command.display());

        match (command.executable.as_str(), command.args.first().map(String::as_str)) {
            ("npm", Some("ci")) => {
                let npm = self.home.join(".npm");
                std::fs::create_dir_all(&npm)?;
                std::fs::write(npm.join("_cacache"), "packages")?;
            }
            ("npx", Some("cypress")) if command.args.get(1).map(String::as_str) == Some("verify") => {
                let binary = self.home.join(".cache").join("Cypress").join("13.6.0");
                std::fs::create_dir_all(&binary)?;
                std::fs::write(binary.join("Cypress"), "binary")?;
            }
            ("node", _) => {
                let (_, path) = command
                    .env
                    .iter()
                    .find(|(k, _)| k == RESULTS_FILE_VAR)
                    .ok_or_else(|| Error::Config("results file not passed".to_string()))?;
                std::fs::write(path, &self.results_json)?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn start(&self, command: &CommandSpec) -> Result<DetachedProcess> {
        self.log.lock().unwrap().push(format!("start {}", command.display()));
        Ok(DetachedProcess {
            pid: None,
            command_line: command.display(),
        })
    }
}

const PASSING: &str = r#"{
    "status": "finished",
    "totalTests": 3, "totalPassed": 3, "totalFailed": 0, "totalSkipped": 0,
    "totalDuration": 4200, "runUrl": "", "cypressVersion": "13.6.0",
    "runs": [{"spec": {"name": "home.cy.js", "relative": "cypress/e2e/home.cy.js"},
              "stats": {"tests": 3, "passes": 3, "failures": 0, "skipped": 0, "duration": 4200}}]
}"#;

const FAILING: &str = r#"{
    "status": "finished",
    "totalTests": 3, "totalPassed": 1, "totalFailed": 2, "totalSkipped": 0,
    "totalDuration": 4200, "runUrl": "https://cloud.cypress.io/projects/p/runs/8",
    "runs": [{"spec": {"name": "home.cy.js"},
              "stats": {"tests": 3, "passes": 1, "failures": 2, "skipped": 0, "duration": 4200}}]
}"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().expect("failed to create workspace");
    std::fs::write(
        dir.path().join("package-lock.json"),
        r#"{"name": "app", "lockfileVersion": 3}"#,
    )
    .expect("failed to write lockfile");
    dir
}

fn orchestrator(
    config: ActionConfig,
    workspace: &Path,
    home: &Path,
    cache_root: &Path,
    processes: Arc<ScriptedRunner>,
) -> TestOrchestrator {
    let context = CiContext::local(workspace, home);
    TestOrchestrator::new(
        config,
        context,
        processes,
        Arc::new(DirCacheStore::new(cache_root)),
        None,
    )
    .with_runner(Box::new(ModuleRunner::new().with_results_dir(home)))
    .with_poller(NetworkPoller::new().with_interval(Duration::from_millis(50)))
}

/// Empties the runner home, as a fresh CI machine would have it.
fn wipe_home(home: &Path) {
    for entry in std::fs::read_dir(home).expect("failed to read home") {
        let path = entry.expect("failed to read home entry").path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path).expect("failed to wipe home");
        } else {
            std::fs::remove_file(&path).expect("failed to wipe home");
        }
    }
}

fn install_only() -> ActionConfig {
    ActionConfig {
        run_tests: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn second_run_restores_both_caches() {
    let workspace = workspace();
    let home = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();

    // First job: cold caches.
    let first = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    let outcome = orchestrator(
        install_only(),
        workspace.path(),
        home.path(),
        cache_root.path(),
        first.clone(),
    )
    .run()
    .await;
    assert_eq!(outcome.final_state(), FinalState::Done);
    assert!(first.commands().contains(&"npx cypress verify".to_string()));

    // Second job on a fresh machine sharing the cache store.
    wipe_home(home.path());
    let second = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    let outcome = orchestrator(
        install_only(),
        workspace.path(),
        home.path(),
        cache_root.path(),
        second.clone(),
    )
    .run()
    .await;

    assert_eq!(outcome.final_state(), FinalState::Done);
    assert_eq!(second.commands(), vec!["npm ci", "npx cypress cache list"]);
}

#[tokio::test]
async fn restore_brings_back_each_cache_folder() {
    let workspace = workspace();
    let home = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();

    let first = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    orchestrator(
        install_only(),
        workspace.path(),
        home.path(),
        cache_root.path(),
        first,
    )
    .run()
    .await;

    wipe_home(home.path());
    // A no-op install, so only the restore can bring the folders back.
    let config = ActionConfig {
        install_command: Some("false".to_string()),
        ..install_only()
    };
    let second = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    orchestrator(config, workspace.path(), home.path(), cache_root.path(), second).run().await;

    assert!(home.path().join(".cache/Cypress/13.6.0/Cypress").is_file());
    assert!(home.path().join(".npm/_cacache").is_file());
    assert!(!home.path().join(".npm/13.6.0").exists());
}

#[tokio::test]
async fn pinned_cache_key_keeps_both_caches() {
    let workspace = workspace();
    let home = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();
    let config = ActionConfig {
        cache_key: Some("pinned".to_string()),
        ..install_only()
    };

    let first = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    let outcome = orchestrator(
        config.clone(),
        workspace.path(),
        home.path(),
        cache_root.path(),
        first,
    )
    .run()
    .await;
    assert_eq!(outcome.final_state(), FinalState::Done);

    wipe_home(home.path());
    let second = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    let outcome = orchestrator(
        config,
        workspace.path(),
        home.path(),
        cache_root.path(),
        second.clone(),
    )
    .run()
    .await;

    assert_eq!(outcome.final_state(), FinalState::Done);
    assert_eq!(second.commands(), vec!["npm ci", "npx cypress cache list"]);
    assert!(home.path().join(".npm/_cacache").is_file());
    assert!(!home.path().join(".npm/13.6.0").exists());
    assert!(home.path().join(".cache/Cypress/13.6.0/Cypress").is_file());
    assert!(!home.path().join(".cache/Cypress/_cacache").exists());
}

#[tokio::test]
async fn lockfile_change_invalidates_dependency_cache() {
    let workspace = workspace();
    let home = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();

    let processes = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    orchestrator(
        install_only(),
        workspace.path(),
        home.path(),
        cache_root.path(),
        processes,
    )
    .run()
    .await;

    std::fs::write(
        workspace.path().join("package-lock.json"),
        r#"{"name": "app", "lockfileVersion": 3, "packages": {}}"#,
    )
    .unwrap();

    wipe_home(home.path());
    let processes = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    orchestrator(
        install_only(),
        workspace.path(),
        home.path(),
        cache_root.path(),
        processes.clone(),
    )
    .run()
    .await;

    // The binary cache still restores by prefix, the dependency cache misses.
    assert!(home.path().join(".cache/Cypress/13.6.0/Cypress").is_file());
    assert!(processes
        .commands()
        .contains(&"npx cypress verify".to_string()));
}

#[tokio::test]
#[serial]
async fn full_pipeline_succeeds_with_module_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let workspace = workspace();
    let home = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();
    let processes = Arc::new(ScriptedRunner::new(home.path(), PASSING));
    let config = ActionConfig {
        build: Some("npm run build".to_string()),
        start: Some("npm start".to_string()),
        wait_on: Some(server.uri()),
        wait_on_timeout: 5,
        ..Default::default()
    };

    let mut orchestrator = orchestrator(
        config,
        workspace.path(),
        home.path(),
        cache_root.path(),
        processes.clone(),
    );
    let outcome = orchestrator.run().await;

    assert_eq!(outcome.final_state(), FinalState::Done);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(outcome.dashboard_url.as_deref(), Some(""));
    assert_eq!(
        outcome.run_outcome.as_ref().and_then(|o| o.results()).map(|r| r.total_tests),
        Some(3)
    );

    let commands = processes.commands();
    assert!(commands.contains(&"npm run build".to_string()));
    assert!(commands.contains(&"start npm start".to_string()));
    assert!(commands.iter().any(|c| c.starts_with("node -e")));
}

#[tokio::test]
#[serial]
async fn failing_tests_fail_the_run_and_skip_report() {
    let workspace = workspace();
    let home = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();
    let processes = Arc::new(ScriptedRunner::new(home.path(), FAILING));
    let config = ActionConfig {
        install: false,
        comment_on_pull_request: true,
        ..Default::default()
    };

    let outcome = orchestrator(
        config,
        workspace.path(),
        home.path(),
        cache_root.path(),
        processes,
    )
    .run()
    .await;

    assert_eq!(outcome.final_state(), FinalState::Failed(Stage::RunTests));
    assert_eq!(outcome.exit_code(), 1);
    assert!(!outcome.completed.contains(&Stage::Report));
    assert_eq!(
        outcome.dashboard_url.as_deref(),
        Some("https://cloud.cypress.io/projects/p/runs/8")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn system_runner_executes_build_in_working_directory() {
    use cypress_ci::SystemProcessRunner;

    let workspace = workspace();
    let app = workspace.path().join("app");
    std::fs::create_dir(&app).unwrap();
    let home = TempDir::new().unwrap();
    let cache_root = TempDir::new().unwrap();

    let config = ActionConfig {
        working_directory: Some("app".into()),
        install: false,
        run_tests: false,
        build: Some(r#"sh -c "echo $CI > built.txt""#.to_string()),
        ..Default::default()
    };

    let mut orchestrator = TestOrchestrator::new(
        config,
        CiContext::local(workspace.path(), home.path()),
        Arc::new(SystemProcessRunner::new()),
        Arc::new(DirCacheStore::new(cache_root.path())),
        None,
    );
    let outcome = orchestrator.run().await;

    assert_eq!(outcome.final_state(), FinalState::Done);
    let built = std::fs::read_to_string(app.join("built.txt")).unwrap();
    assert_eq!(built.trim(), "1");
}
