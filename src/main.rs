use anyhow::Result;
use clap::Parser;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(
    name = "storyvoice",
    version,
    about = "Storybook page pipeline: OCR layout, translation and narration audio"
)]
struct Cli {
    /// Address to bind the HTTP server on
    #[arg(short = 'a', long = "addr", default_value = "0.0.0.0:8000")]
    addr: String,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    storyvoice::logging::init(cli.verbose)?;
    let settings = storyvoice::load_settings(cli.read_settings.as_deref().map(Path::new))?;
    storyvoice::server::run_server(settings, cli.addr).await
}
