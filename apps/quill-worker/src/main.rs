use clap::Parser;

use quill_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	quill_worker::run(Args::parse()).await
}
