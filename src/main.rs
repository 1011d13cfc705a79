//! cypress-ci CLI
//!
//! Runs the pipeline with inputs from `INPUT_*` variables, or from a TOML
//! file given as the first argument.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cypress_ci::{
    error_annotation, unknown_inputs, ActionConfig, CacheStore, CiContext, DirCacheStore, GhCli,
    RepoApi, Result, SystemProcessRunner, TestOrchestrator, Validate,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(PathBuf::from);

    let code = match run(config_path.as_deref()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "failed to start");
            println!("{}", error_annotation(&e.to_string()));
            1
        }
    };

    std::process::exit(code);
}

async fn run(config_path: Option<&Path>) -> Result<i32> {
    let config = match config_path {
        Some(path) => {
            tracing::info!(path = ?path, "loading configuration file");
            ActionConfig::from_toml_file(path)?
        }
        None => {
            for name in unknown_inputs(std::env::vars().map(|(name, _)| name)) {
                tracing::warn!(variable = %name, "ignoring unknown input");
            }
            ActionConfig::from_env()?
        }
    };

    for warning in config.validate().into_result()? {
        tracing::warn!("{}", warning);
    }

    let context = CiContext::from_env()?;

    let cache_root = match &config.cache_dir {
        Some(dir) => dir.clone(),
        None => context
            .cache_paths
            .cypress
            .parent()
            .map(|cache| cache.join("cypress-ci"))
            .unwrap_or_else(|| context.workspace.join(".cypress-ci-cache")),
    };
    let cache: Arc<dyn CacheStore> = Arc::new(DirCacheStore::new(cache_root));

    // GITHUB_TOKEN from the job environment wins over the input.
    let api: Option<Arc<dyn RepoApi>> = context
        .token
        .clone()
        .or_else(|| config.github_token.clone())
        .map(|token| Arc::new(GhCli::new(token)) as Arc<dyn RepoApi>);

    let mut orchestrator = TestOrchestrator::new(
        config,
        context,
        Arc::new(SystemProcessRunner::new()),
        cache,
        api,
    );
    let outcome = orchestrator.run().await;

    if let Some((stage, error)) = &outcome.failure {
        tracing::error!(stage = %stage, error = %error, "pipeline failed");
        println!("{}", error_annotation(&error.to_string()));
    } else {
        tracing::info!(stages = outcome.completed.len(), "pipeline finished");
    }

    Ok(outcome.exit_code())
}
