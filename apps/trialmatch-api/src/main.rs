use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = trialmatch_api::Args::parse();
	trialmatch_api::run(args).await
}
