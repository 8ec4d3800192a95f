mod app;
mod cart;
mod catalog;
mod config;
mod db;
mod event;
mod gateway;
mod logging;
mod notify;
mod prompt;
mod splash;
mod storefront;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "carvao")]
#[command(about = "Offline-first storefront for Carvão Express charcoal delivery")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/carvao/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin that relative URLs resolve against
  #[arg(long)]
  origin: Option<String>,

  #[command(subcommand)]
  command: app::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };

  // Logs go to a file so stdout stays clean for command output
  let _guard = logging::init(&config.data_dir()?.join("logs"))?;

  let app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}
