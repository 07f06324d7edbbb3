use clap::Parser;

use quill_query::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	quill_query::run(Args::parse()).await
}
