mod api;
mod classify;
mod config;
mod core;
mod cron;
mod delivery;
mod provider;
mod reminders;
mod scheduler;
mod store;
mod tasks;
mod traits;
mod types;
mod validator;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
mod testing;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("notifyd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                println!("notifyd {}", env!("CARGO_PKG_VERSION"));
                println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
                println!("Usage: notifyd [OPTIONS]\n");
                println!("Options:");
                println!("  -h, --help       Print help");
                println!("  -V, --version    Print version");
                println!("\nConfiguration is read from config.toml in the working directory;");
                println!("built-in defaults apply when the file is absent.");
                return Ok(());
            }
            other => {
                eprintln!("Unknown option '{}'. Try --help.", other);
                std::process::exit(2);
            }
        }
    }

    let config_path = PathBuf::from("config.toml");
    let config = if config_path.exists() {
        config::AppConfig::load(&config_path)?
    } else {
        tracing::warn!("No config.toml found, starting with built-in defaults");
        config::AppConfig::default()
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(crate::core::run(config))
}
