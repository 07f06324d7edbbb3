use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use quill_queue::PgChannel;
use quill_service::{
	AskRequest, IndexingProducer, Providers, QuillService, ReindexRequest, SearchRequest,
};
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
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Print the notes nearest to a query.
	Search { query: String },
	/// Answer a question from the indexed notes.
	Ask { question: String },
	/// Queue embedding rebuilds for notes.
	Reindex {
		#[arg(long = "note", value_name = "UUID")]
		note_ids: Vec<Uuid>,
		#[arg(long, value_name = "UUID")]
		notebook: Option<Uuid>,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = quill_config::load(&args.config.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.storage.vector.dim).await?;

	let store = Arc::new(PgStore::new(db.clone(), &config.storage.vector));
	let producer = IndexingProducer::new(Arc::new(PgChannel::new(db, &config.queue)));
	let service = QuillService::new(store, Providers::from_config(&config.providers)?, producer)
		.with_retrieval(config.retrieval.clone())
		.with_actor(config.worker.actor.clone());
	let json = match args.command {
		Command::Search { query } => {
			let res = service.search(SearchRequest { query }).await?;

			serde_json::to_string_pretty(&res)?
		},
		Command::Ask { question } => {
			let res = service.ask(AskRequest { question }).await?;

			serde_json::to_string_pretty(&res)?
		},
		Command::Reindex { note_ids, notebook } => {
			if note_ids.is_empty() && notebook.is_none() {
				return Err(eyre::eyre!("reindex requires --note or --notebook."));
			}

			let res = service.reindex(ReindexRequest { note_ids, notebook_id: notebook }).await?;

			serde_json::to_string_pretty(&res)?
		},
	};

	println!("{json}");

	Ok(())
}
