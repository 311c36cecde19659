use clap::{Parser, Subcommand};
use log::error;
use omnifs_core::Config;
use omnifs_engine::{ImageFormatter, OmniFs};
use std::path::PathBuf;
use std::process::ExitCode;

mod dispatch;
mod protocol;
mod server;

#[derive(Parser)]
#[command(name = "omnifs")]
#[command(about = "Single-image network file system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh image from a configuration file
    Format {
        /// Path of the image to create
        image: PathBuf,
        /// Configuration file
        config: PathBuf,
    },
    /// Serve an existing image over TCP
    Serve {
        /// Path of the image to serve
        image: PathBuf,
        /// Configuration file
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Format { image, config } => {
            let config = match Config::from_file(&config) {
                Ok(config) => config,
                Err(e) => {
                    error!("{}", e);
                    eprintln!("Format failed: {}", e);
                    return ExitCode::from(1);
                }
            };
            match ImageFormatter::format(&image, &config) {
                Ok(()) => {
                    println!("Formatted {}", image.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{}", e);
                    eprintln!("Format failed: {}", e);
                    ExitCode::from(1)
                }
            }
        }
        Commands::Serve { image, config } => {
            let config = match Config::from_file(&config) {
                Ok(config) => config,
                Err(e) => {
                    error!("{}", e);
                    eprintln!("Initialization failed: {}", e);
                    return ExitCode::from(2);
                }
            };
            let engine = match OmniFs::init(&image) {
                Ok(engine) => engine,
                Err(e) => {
                    error!("{}", e);
                    eprintln!("Initialization failed: {}", e);
                    return ExitCode::from(2);
                }
            };
            let server = server::Server::new(engine, config.server.clone());
            if let Err(e) = server.run() {
                error!("{}", e);
                eprintln!("Server stopped: {}", e);
                return ExitCode::from(2);
            }
            ExitCode::SUCCESS
        }
    }
}
