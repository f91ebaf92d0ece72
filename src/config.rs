use config::{Config, ConfigError, Environment, File};
use serde_derive::{Deserialize, Serialize};

const ENV_PREFIX: &str = "HL7_TO_FHIR";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct App {
    pub(crate) log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct Server {
    pub(crate) base_url: String,
    /// request timeout in seconds
    pub(crate) timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct ResourceConfig {
    pub(crate) system: String,
    pub(crate) profile: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct Fhir {
    pub(crate) server: Server,
    /// IANA zone HL7 timestamps are read in
    pub(crate) timezone: String,
    pub(crate) patient: ResourceConfig,
    pub(crate) encounter: ResourceConfig,
    pub(crate) observation: ResourceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct Output {
    pub(crate) dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub(crate) struct AppConfig {
    pub(crate) app: App,
    pub(crate) fhir: Fhir,
    pub(crate) output: Output,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app: App {
                log_level: "info".into(),
            },
            fhir: Fhir {
                server: Server {
                    base_url: "http://localhost:8080/fhir".into(),
                    timeout: 20,
                },
                timezone: "UTC".into(),
                patient: ResourceConfig {
                    system: "http://hospital.example.org/identifiers/mrn".into(),
                    profile: None,
                },
                encounter: ResourceConfig {
                    system: "http://hospital.example.org/identifiers/visit-number".into(),
                    profile: None,
                },
                observation: ResourceConfig {
                    system: "http://hospital.example.org/identifiers/observation".into(),
                    profile: None,
                },
            },
            output: Output {
                dir: "out/fhir".into(),
            },
        }
    }
}

impl AppConfig {
    /// Defaults, then the yaml file (if any), then `HL7_TO_FHIR_SECTION__KEY` environment
    /// variables.
    pub(crate) fn new(file: &str) -> Result<Self, ConfigError> {
        Self::builder(file)
            .add_source(environment())
            .build()?
            .try_deserialize()
    }

    fn builder(file: &str) -> config::ConfigBuilder<config::builder::DefaultState> {
        Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).unwrap_or_default())
            .add_source(File::with_name(file).required(false))
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
