use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::CliError;

/// Prefix shared by every setting the harvester reads.
const PREFIX: &str = "HARVEST_";

/// Environment variable manager that loads from the process and `.env` files.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
    sensitive_patterns: Vec<&'static str>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self::from_vars(std::env::vars().filter(|(key, _)| key.starts_with(PREFIX)))
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
            sensitive_patterns: vec!["SECRET", "TOKEN", "PASSWORD", "DATABASE_URL"],
        }
    }

    /// Load variables from a .env file. File values override the process environment.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)?;
        Ok(())
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Logs which settings are present, hiding the values of credentials.
    pub fn log_loaded(&self) {
        let mut keys: Vec<&String> = self.vars.keys().collect();
        keys.sort();
        for key in keys {
            if self.is_sensitive(key) {
                debug!(key = %key, "Loaded setting (redacted)");
            } else {
                debug!(key = %key, value = %self.vars[key], "Loaded setting");
            }
        }
    }

    fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive_patterns
            .iter()
            .any(|pattern| key.contains(pattern))
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::Config(format!(
                    "Invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars
                .insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }

        value.to_string()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}
