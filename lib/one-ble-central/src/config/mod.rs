use std::path::Path;
use std::time::Duration;

use figment::Figment;
#[cfg(feature = "config_env")]
use figment::providers::Env;
#[cfg(feature = "config_json")]
use figment::providers::Json;
#[cfg(feature = "config_yaml")]
use figment::providers::Yaml;
#[cfg(any(feature = "config_yaml", feature = "config_json"))]
use figment::providers::{Data, Format};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as, skip_serializing_none};
use thiserror::Error;

#[cfg(test)]
mod test;

#[derive(Debug, Error)]
pub enum ConfigParsingError {
    #[error("Parsing error: `{0}`")]
    GeneralParsingError(String),
}

#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CentralConfig {
    /// Identifier under which the platform restores this session after a restart.
    pub restoration_id: Option<String>,
    /// Pause after entering `Ready` before dependent operations run.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub ready_delay: Duration,
    pub event_capacity: usize,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub connect_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub scan_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub read_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub write_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub write_and_listen_timeout: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub operation_timeout: Option<Duration>,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            restoration_id: None,
            ready_delay: Duration::from_millis(50),
            event_capacity: 64,
            connect_timeout: None,
            scan_timeout: None,
            read_timeout: None,
            write_timeout: None,
            write_and_listen_timeout: None,
            operation_timeout: None,
        }
    }
}

pub enum InputFormat {
    #[cfg(feature = "config_yaml")]
    Yaml(Data<Yaml>),
    #[cfg(feature = "config_json")]
    Json(Data<Json>),
}

impl InputFormat {
    #[cfg(feature = "config_yaml")]
    pub fn yaml_file(p: impl AsRef<Path>) -> InputFormat {
        InputFormat::Yaml(Yaml::file(p))
    }

    #[cfg(feature = "config_yaml")]
    pub fn yaml_str(s: impl AsRef<str>) -> InputFormat {
        InputFormat::Yaml(Yaml::string(s.as_ref()))
    }

    #[cfg(feature = "config_json")]
    pub fn json_file(p: impl AsRef<Path>) -> InputFormat {
        InputFormat::Json(Json::file(p))
    }

    #[cfg(feature = "config_json")]
    pub fn json_str(s: impl AsRef<str>) -> InputFormat {
        InputFormat::Json(Json::string(s.as_ref()))
    }
}

impl CentralConfig {
    pub fn from_files(files: &[impl AsRef<Path>]) -> Result<Self, ConfigParsingError> {
        let mut inputs: Vec<InputFormat> = Vec::with_capacity(files.len());

        for path in files {
            #[cfg(feature = "config_yaml")]
            if path
                .as_ref()
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml")
            {
                inputs.push(InputFormat::yaml_file(path));
                continue;
            }

            #[cfg(feature = "config_json")]
            if path.as_ref().extension() == Some("json".as_ref()) {
                inputs.push(InputFormat::json_file(path));
                continue;
            }

            return Err(ConfigParsingError::GeneralParsingError(format!(
                "Unsupported file or missing file extension: {:?}",
                path.as_ref().to_str()
            )));
        }

        CentralConfig::parse(inputs)
    }

    #[cfg(feature = "config_yaml")]
    pub fn from_yaml(
        configs: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, ConfigParsingError> {
        CentralConfig::parse(configs.into_iter().map(InputFormat::yaml_str))
    }

    /// Merges `inputs` in order, then `BLE_` prefixed environment variables.
    pub fn parse(inputs: impl IntoIterator<Item = InputFormat>) -> Result<Self, ConfigParsingError> {
        let mut figment = Figment::new();

        for data in inputs {
            figment = match data {
                #[cfg(feature = "config_yaml")]
                InputFormat::Yaml(content) => figment.merge(content),
                #[cfg(feature = "config_json")]
                InputFormat::Json(content) => figment.merge(content),
            };
        }

        #[cfg(feature = "config_env")]
        {
            figment = figment.merge(Env::prefixed("BLE_").split("__").lowercase(false));
        }

        figment
            .extract::<CentralConfig>()
            .map_err(|e| ConfigParsingError::GeneralParsingError(e.to_string()))
    }
}
