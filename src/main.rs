mod client;
mod commands;
mod config;
mod fhir;
mod files;
mod hl7;
mod validate;

use crate::fhir::mapper::MappingError;
use crate::validate::ValidationErrors;
use clap::{Parser, Subcommand};
use config::AppConfig;
use log::{debug, error};
use std::path::PathBuf;
use std::process;

/// HL7v2 ADT^A01 / ORU^R01 to FHIR R4 transaction bundles
#[derive(Parser, Debug)]
#[command(name = "hl7-to-fhir", version, about, long_about = None)]
struct Cli {
    /// Path to the yaml configuration file
    #[arg(short, long, default_value = "app.yaml", env = "HL7_TO_FHIR_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Read the server capability statement
    PingFhir,
    /// Print the normalized view of a message
    Inspect { file: PathBuf },
    /// Validate a message and print what was extracted
    Validate { file: PathBuf },
    /// Print the mapped FHIR resources without sending them
    Map { file: PathBuf },
    /// Validate, map, write the bundle and post it as a transaction
    Ingest {
        file: PathBuf,
        /// Write the bundle but do not contact the server
        #[arg(long)]
        dry_run: bool,
    },
    /// Look up a Patient by MRN
    GetPatient { mrn: String },
    /// Look up an Encounter by visit number
    GetEncounter { visit: String },
    /// List Observations for a patient MRN
    GetObservations { mrn: String },
}

async fn run(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::PingFhir => commands::ping_fhir(config).await,
        Commands::Inspect { file } => commands::inspect(&file).await,
        Commands::Validate { file } => commands::validate(config, &file).await,
        Commands::Map { file } => commands::map(config, &file).await,
        Commands::Ingest { file, dry_run } => {
            commands::ingest(config, &file, dry_run).await.map(|_| ())
        }
        Commands::GetPatient { mrn } => commands::get_patient(config, &mrn).await,
        Commands::GetEncounter { visit } => commands::get_encounter(config, &visit).await,
        Commands::GetObservations { mrn } => commands::get_observations(config, &mrn).await,
    }
}

fn validation_errors(err: &anyhow::Error) -> Option<&ValidationErrors> {
    match err.downcast_ref::<MappingError>() {
        Some(MappingError::Validation(errors)) => Some(errors),
        _ => err.downcast_ref::<ValidationErrors>(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::new(&cli.config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("ERROR: Failed to parse app settings: {e}");
            process::exit(1);
        }
    };
    let env = env_logger::Env::default().filter_or("RUST_LOG", config.app.log_level.clone());
    env_logger::init_from_env(env);
    debug!("Running {:?} with config {}", cli.command, cli.config);

    if let Err(e) = run(cli.command, &config).await {
        match validation_errors(&e) {
            Some(errors) => {
                eprintln!("ERROR: Validation failed");
                for v in errors.iter() {
                    eprintln!("- {}: {}", v.code, v.message);
                    if let Some(location) = v.location() {
                        debug!("{} reported at {location}", v.code);
                    }
                }
            }
            None => {
                error!("{e:?}");
                eprintln!("ERROR: Unhandled failure: {e}");
            }
        }
        process::exit(1);
    }
}
