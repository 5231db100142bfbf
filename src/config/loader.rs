//! Configuration loader
//!
//! Loading pipeline:
//! 1. Size check and raw read
//! 2. Environment variable expansion (on raw text)
//! 3. YAML parsing and typed deserialization
//! 4. Validation
//! 5. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::schema::SmartcrossConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Options for the configuration loader.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Limits for configuration size.
    pub config_limits: ConfigLimits,
}

/// Limits for configuration size to prevent resource exhaustion.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum number of user scenarios.
    pub max_scenarios: usize,

    /// Maximum number of segments per scenario timeline.
    pub max_segments: usize,

    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_scenarios: env_or("SMARTCROSS_MAX_SCENARIOS", 64),
            max_segments: env_or("SMARTCROSS_MAX_SEGMENTS", 256),
            max_config_size: env_or("SMARTCROSS_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<SmartcrossConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Loads a configuration file and returns the frozen configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or too large, if an
    /// environment reference is unresolvable, if YAML parsing fails, or if
    /// validation reports errors.
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let limit = self.options.config_limits.max_config_size;
        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > limit {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {limit} bytes"),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_from_str_at(&raw, path)
    }

    /// Loads configuration from an in-memory YAML string.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), minus file access errors.
    pub fn load_from_str(&self, raw: &str) -> Result<LoadResult, ConfigError> {
        self.load_from_str_at(raw, Path::new("<inline>"))
    }

    fn load_from_str_at(&self, raw: &str, path: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw, path)?;
        warnings.extend(env_sub.warnings);

        // An empty file is a valid "all defaults" configuration.
        let config: SmartcrossConfig = if substituted.trim().is_empty() {
            SmartcrossConfig::default()
        } else {
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?
        };

        let result = Validator::new().validate(&config, &self.options.config_limits);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors: result.errors,
            });
        }
        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Substitution
// ============================================================================

/// Expands `${VAR}`, `${VAR:-default}`, `${VAR:?message}` and `$$`.
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    fn substitute(&mut self, raw_yaml: &str, source_path: &Path) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(raw_yaml.len());
        let mut chars = raw_yaml.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();
                    let spec = Self::parse_var_spec(&mut chars, source_path)?;
                    match std::env::var(&spec.name) {
                        Ok(value) => result.push_str(&value),
                        Err(_) => match spec.fallback {
                            Fallback::Default(default) => result.push_str(&default),
                            Fallback::Required(message) => {
                                return Err(ConfigError::EnvVarNotSet {
                                    var: spec.name,
                                    location: message,
                                });
                            }
                            Fallback::Empty => {
                                self.warnings.push(LoadWarning {
                                    message: format!(
                                        "Environment variable '{}' is not set, using empty string",
                                        spec.name
                                    ),
                                    location: Some(source_path.display().to_string()),
                                });
                            }
                        },
                    }
                }
                _ => result.push(c),
            }
        }

        Ok(result)
    }

    fn parse_var_spec(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        source_path: &Path,
    ) -> Result<VarSpec, ConfigError> {
        let mut name = String::new();

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(VarSpec {
                        name,
                        fallback: Fallback::Empty,
                    });
                }
                ':' => match chars.peek() {
                    Some('-') => {
                        chars.next();
                        let default = Self::read_until_close(chars, &name, source_path)?;
                        return Ok(VarSpec {
                            name,
                            fallback: Fallback::Default(default),
                        });
                    }
                    Some('?') => {
                        chars.next();
                        let message = Self::read_until_close(chars, &name, source_path)?;
                        return Ok(VarSpec {
                            name,
                            fallback: Fallback::Required(message),
                        });
                    }
                    _ => name.push(':'),
                },
                _ => name.push(c),
            }
        }

        Err(unclosed(&name, source_path))
    }

    /// Reads until the matching `}`, allowing nested braces.
    fn read_until_close(
        chars: &mut std::iter::Peekable<std::str::Chars>,
        name: &str,
        source_path: &Path,
    ) -> Result<String, ConfigError> {
        let mut value = String::new();
        let mut depth = 1;

        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(value);
                    }
                }
                _ => {}
            }
            value.push(c);
        }

        Err(unclosed(name, source_path))
    }
}

struct VarSpec {
    name: String,
    fallback: Fallback,
}

enum Fallback {
    Empty,
    Default(String),
    Required(String),
}

fn unclosed(name: &str, source_path: &Path) -> ConfigError {
    ConfigError::ParseError {
        path: PathBuf::from(source_path),
        line: None,
        message: format!("Unclosed environment variable reference: ${{{name}"),
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ClearanceMode, TieBreak};
    use std::io::Write;

    fn loader() -> ConfigLoader {
        ConfigLoader::new(LoaderOptions::default())
    }

    #[test]
    fn empty_string_loads_defaults() {
        let result = loader().load_from_str("").unwrap();
        assert_eq!(*result.config, SmartcrossConfig::default());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn loads_sections_from_yaml() {
        let yaml = r"
timing:
  min_green_ms: 5000
  max_green_ms: 40000
tie_break: alternate
clearance:
  mode: pedestrian
  pause_ms: 6000
";
        let result = loader().load_from_str(yaml).unwrap();
        let config = &result.config;
        assert_eq!(config.timing.min_green_ms, 5_000);
        assert_eq!(config.timing.max_green_ms, 40_000);
        assert_eq!(config.timing.max_wait_s, 90.0);
        assert_eq!(config.tie_break, TieBreak::Alternate);
        assert_eq!(config.clearance, ClearanceMode::Pedestrian { pause_ms: 6_000 });
    }

    #[test]
    fn default_substitution_applies() {
        let yaml = "decision:\n  timeout_ms: ${SMARTCROSS_TEST_UNSET_TIMEOUT:-1500}\n";
        let result = loader().load_from_str(yaml).unwrap();
        assert_eq!(result.config.decision.timeout_ms, 1_500);
    }

    #[test]
    fn required_variable_errors_when_unset() {
        let yaml = "decision:\n  url: ${SMARTCROSS_TEST_UNSET_URL:?decision.url}\n";
        let err = loader().load_from_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotSet { .. }));
    }

    #[test]
    fn missing_variable_warns() {
        let yaml = "simulation:\n  scenario: free${SMARTCROSS_TEST_UNSET_SUFFIX}\n";
        let result = loader().load_from_str(yaml).unwrap();
        assert_eq!(result.config.simulation.scenario, "free");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let mut sub = EnvSubstitution::new();
        let out = sub.substitute("price: $$5", Path::new("x")).unwrap();
        assert_eq!(out, "price: $5");
    }

    #[test]
    fn unclosed_reference_is_a_parse_error() {
        let err = loader().load_from_str("a: ${OOPS").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_yaml_reports_parse_error() {
        let err = loader().load_from_str("timing: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn validation_errors_are_surfaced() {
        let err = loader()
            .load_from_str("timing:\n  min_green_ms: 0\n")
            .unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => {
                assert!(errors.iter().any(|e| e.path == "timing.min_green_ms"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn validation_warnings_become_load_warnings() {
        let yaml = "clearance:\n  mode: yellow-all-red\n  yellow_ms: 3000\n  all_red_ms: 0\n";
        let result = loader().load_from_str(yaml).unwrap();
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.location.as_deref() == Some("clearance.all_red_ms"))
        );
    }

    #[test]
    fn load_from_file_strips_bom() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\u{feff}tie_break: alternate\n").unwrap();
        let result = loader().load(file.path()).unwrap();
        assert_eq!(result.config.tie_break, TieBreak::Alternate);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = loader()
            .load(Path::new("/nonexistent/smartcross.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", "#".repeat(64)).unwrap();
        let options = LoaderOptions {
            config_limits: ConfigLimits {
                max_config_size: 16,
                ..ConfigLimits::default()
            },
        };
        let err = ConfigLoader::new(options).load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
