use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use newsrag::config::Config;
use newsrag::factory::ServiceFactory;
use newsrag::semantic::{load_documents, BuildReport, IndexPaths};
use newsrag::server;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct BuildSummary {
    #[serde(flatten)]
    report: BuildReport,
    index_path: PathBuf,
    metadata_path: PathBuf,
}

pub fn handle_build(config: &Config, csv: Option<PathBuf>, no_progress: bool) -> Result<()> {
    let dataset = config.resolve(csv.as_ref().unwrap_or(&config.index.dataset_path));
    let documents = load_documents(&dataset, &config.index.id_column, &config.index.text_column)
        .with_context(|| format!("failed to load {}", dataset.display()))?;
    log::info!("loaded {} documents from {}", documents.len(), dataset.display());

    let builder = ServiceFactory::index_builder(config, !no_progress)?;
    let (store, report) = builder.build(documents)?;

    let paths = IndexPaths::from_config(config);
    store.save(&paths, &builder.model_id())?;

    print_json(&BuildSummary {
        report,
        index_path: paths.index,
        metadata_path: paths.metadata,
    })
}

pub fn handle_search(config: &Config, query: String, k: Option<usize>) -> Result<()> {
    let router = ServiceFactory::router(config)?;
    let k = k.unwrap_or(config.router.default_k);

    let hits = router.search_internal(&query, k)?;
    print_json(&hits)
}

pub fn handle_web(
    config: &Config,
    query: String,
    k: Option<usize>,
    max_chars: Option<usize>,
) -> Result<()> {
    let router = ServiceFactory::router(config)?;
    let k = k.unwrap_or(config.router.default_k);
    let max_chars = max_chars.unwrap_or(config.router.default_max_chars);

    let items = router.search_web(&query, k, max_chars)?;
    print_json(&items)
}

pub fn handle_ask(
    config: &Config,
    query: String,
    k: Option<usize>,
    max_chars: Option<usize>,
) -> Result<()> {
    let router = ServiceFactory::router(config)?;
    let k = k.unwrap_or(config.router.default_k);
    let max_chars = max_chars.unwrap_or(config.router.default_max_chars);

    let evidence = router.get_answer(&query, k, max_chars)?;
    print_json(&evidence)
}

pub fn handle_serve(config: &Config, addr: Option<String>) -> Result<()> {
    let router = Arc::new(ServiceFactory::router(config)?);

    // keep serving without an index; answers fail until `build` has run
    if let Err(err) = router.internal().open() {
        log::warn!("internal index unavailable: {err}");
    }

    server::start_daemon(router.clone(), config, addr)
}
