use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = lading::cli::LadingArgs::parse();

    lading::run(args).await
}
