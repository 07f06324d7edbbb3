pub mod source_text;
pub mod worker;

mod error;

pub use error::{Error, Result};
pub use worker::{IndexOutcome, IndexingWorker, WorkerHandle};

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quill_providers::HttpEmbeddingClient;
use quill_queue::PgChannel;
use quill_storage::{PgStore, db::Db};

#[derive(Debug, Parser)]
#[command(
	version = quill_cli::VERSION,
	rename_all = "kebab",
	styles = quill_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub config: quill_cli::ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = quill_config::load(&args.config.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.storage.vector.dim).await?;

	let store = Arc::new(PgStore::new(db.clone(), &config.storage.vector));
	let channel = PgChannel::new(db, &config.queue);
	let embedding = Arc::new(HttpEmbeddingClient::new(config.providers.embedding.clone())?);
	let worker = IndexingWorker::new(store, embedding, &config.worker);
	let handle = worker.consume(&channel).await?;

	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutdown requested; draining in-flight messages.");

	handle.shutdown().await?;

	Ok(())
}
