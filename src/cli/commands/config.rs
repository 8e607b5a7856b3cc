//! `testplane config`: print the effective configuration.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput<'a> {
    pub config: &'a Config,
}

impl CommandOutput for ConfigOutput<'_> {
    fn to_human(&self) -> String {
        serde_yaml::to_string(self.config).unwrap_or_default()
    }
}

pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    output(&ConfigOutput { config }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_output_shapes() {
        let config = Config::default();
        let out = ConfigOutput { config: &config };

        let json = out.to_json();
        assert_eq!(json["controller"]["poll_interval_ms"], 250);
        assert_eq!(json["logging"]["level"], "info");

        let yaml = out.to_human();
        assert!(yaml.contains("suite_requeue_interval_ms: 1000"));
    }
}
