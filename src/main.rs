//! isarest CLI - ISA metadata conversion and validation service
//!
//! # Main Commands
//!
//! ```bash
//! isarest serve                      # Start HTTP server (port 5000)
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! isarest validate-design config.json  # Run the design limits engine
//! isarest pack study/ -o study.zip     # Zip a directory the way responses do
//! isarest conversions                  # Show supported conversion pairs
//! ```

use clap::{Parser, Subcommand};
use isarest::config::Config;
use isarest::convert::CONVERSIONS;
use isarest::{validate, StudyDesignConfig};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "isarest")]
#[command(about = "REST service for ISA metadata conversion and validation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides ISAREST_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the study-design limits engine on a config file
    ValidateDesign {
        /// Study design config JSON file
        input: PathBuf,
    },

    /// Zip a directory using the response packaging rules
    Pack {
        /// Directory to pack
        input: PathBuf,

        /// Output zip file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show supported conversion pairs
    Conversions,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(port).await,
        Commands::ValidateDesign { input } => cmd_validate_design(&input),
        Commands::Pack { input, output } => cmd_pack(&input, &output),
        Commands::Conversions => cmd_conversions(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    isarest::server::start_server(config).await
}

fn cmd_validate_design(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Checking design: {}", input.display());

    let content = fs::read_to_string(input)?;
    let config: StudyDesignConfig = serde_json::from_str(&content)?;
    let limits = Config::from_env().limits;

    match validate(&config, &limits) {
        None => {
            eprintln!("Design is within configured limits");
            Ok(())
        }
        Some(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            std::process::exit(1);
        }
    }
}

fn cmd_pack(input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = isarest::archive::pack(input)?;
    fs::write(output, &bytes)?;
    eprintln!("Packed {} into {} ({} bytes)", input.display(), output.display(), bytes.len());
    Ok(())
}

fn cmd_conversions() -> Result<(), Box<dyn std::error::Error>> {
    for conversion in CONVERSIONS {
        println!(
            "{} -> {}  (input: {})",
            conversion.source, conversion.target, conversion.input_mimetype
        );
    }
    Ok(())
}
