pub mod embed;
pub mod relay;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use sift_config::SharedConfig;
use sift_providers::{embedding::HttpEmbedder, graph::HttpGraphStore};
use sift_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = sift_cli::VERSION,
	rename_all = "kebab",
	styles = sift_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = sift_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let shared = SharedConfig::new(config);
	let cfg = shared.snapshot();
	let embed_db = Db::connect(&cfg.storage.postgres).await?;

	embed_db.ensure_schema(cfg.providers.embedding.dimensions).await?;

	let relay_db = Db::connect(&cfg.storage.postgres).await?;
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let embed_state = embed::EmbedState {
		db: embed_db,
		cfg: shared.clone(),
		embedder: Arc::new(HttpEmbedder::new(shared.clone())),
	};
	let relay_state = relay::RelayState {
		db: relay_db,
		cfg: shared.clone(),
		graph: Arc::new(HttpGraphStore::new(shared.clone())),
	};
	let embed_handle = tokio::spawn(embed::run_embedding_worker(embed_state, shutdown_rx.clone()));
	let relay_handle = tokio::spawn(relay::run_relay_worker(relay_state, shutdown_rx));

	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutdown signal received. Draining in-flight work.");

	let _ = shutdown_tx.send(true);
	let _ = embed_handle.await;
	let _ = relay_handle.await;

	Ok(())
}
