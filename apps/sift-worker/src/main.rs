use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	sift_worker::run(sift_worker::Args::parse()).await
}
