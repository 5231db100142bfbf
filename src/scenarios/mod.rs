//! Built-in traffic scenarios.
//!
//! Arrival timelines embedded in the binary at compile time so that
//! `smartcross simulate --scenario rush` works without a config file.
//! User scenarios from the configuration are layered on top by
//! [`ScenarioRegistry`] and take precedence over a built-in of the same id.

use std::path::PathBuf;
use std::sync::LazyLock;

use crate::config::schema::ScenarioDefinition;
use crate::error::ConfigError;

// ============================================================================
// Types
// ============================================================================

/// A built-in scenario embedded in the binary.
pub struct BuiltinScenario {
    /// Identifier, also the `scenarioId` sent with each decision.
    pub name: &'static str,

    /// Short human-readable description.
    pub description: &'static str,

    /// Tags for filtering.
    pub tags: &'static [&'static str],

    /// Raw YAML content (embedded at compile time).
    pub yaml: &'static str,
}

impl BuiltinScenario {
    /// Parses the embedded YAML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` if the YAML is malformed.
    pub fn definition(&self) -> Result<ScenarioDefinition, ConfigError> {
        serde_yaml::from_str(self.yaml).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from(format!("<builtin:{}>", self.name)),
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

static BUILTIN_SCENARIOS: LazyLock<Vec<BuiltinScenario>> = LazyLock::new(|| {
    vec![
        BuiltinScenario {
            name: "free",
            description: "Light, balanced traffic on every approach",
            tags: &["balanced", "light"],
            yaml: include_str!("../../scenarios/free.yaml"),
        },
        BuiltinScenario {
            name: "rush",
            description: "Commuter peak with a heavier north/south corridor",
            tags: &["peak", "asymmetric", "looping"],
            yaml: include_str!("../../scenarios/rush.yaml"),
        },
        BuiltinScenario {
            name: "incident",
            description: "Lane blockage upstream; longest queue is served first with a raised cap",
            tags: &["override", "asymmetric"],
            yaml: include_str!("../../scenarios/incident.yaml"),
        },
        BuiltinScenario {
            name: "stadium",
            description: "Event egress surge on the east/west arterial",
            tags: &["peak", "surge", "looping"],
            yaml: include_str!("../../scenarios/stadium.yaml"),
        },
        BuiltinScenario {
            name: "night",
            description: "Sparse overnight traffic",
            tags: &["light"],
            yaml: include_str!("../../scenarios/night.yaml"),
        },
    ]
});

/// Finds a built-in scenario by exact name.
#[must_use]
pub fn find_scenario(name: &str) -> Option<&'static BuiltinScenario> {
    BUILTIN_SCENARIOS.iter().find(|s| s.name == name)
}

/// Lists built-in scenarios, optionally filtered by tag.
#[must_use]
pub fn list_scenarios(tag: Option<&str>) -> Vec<&'static BuiltinScenario> {
    BUILTIN_SCENARIOS
        .iter()
        .filter(|s| tag.is_none_or(|t| s.tags.contains(&t)))
        .collect()
}

/// Suggests a similar built-in name for typo correction.
#[must_use]
pub fn suggest_scenario(input: &str) -> Option<String> {
    closest(input, BUILTIN_SCENARIOS.iter().map(|s| s.name))
}

/// All built-in names in registry order.
#[must_use]
pub fn list_scenario_names() -> Vec<&'static str> {
    BUILTIN_SCENARIOS.iter().map(|s| s.name).collect()
}

fn closest<'a>(input: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    candidates
        .map(|name| (name, strsim::damerau_levenshtein(input, name)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(name, _)| name.to_string())
}

// ============================================================================
// Resolved Scenarios
// ============================================================================

/// Built-in and configured scenarios, parsed and keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    scenarios: Vec<ScenarioDefinition>,
}

impl ScenarioRegistry {
    /// Built-ins only.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` if an embedded scenario is malformed.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::with_custom(&[])
    }

    /// Configured scenarios first, followed by built-ins they do not shadow.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` if an embedded scenario is malformed.
    pub fn with_custom(custom: &[ScenarioDefinition]) -> Result<Self, ConfigError> {
        let mut scenarios = custom.to_vec();
        for builtin in BUILTIN_SCENARIOS.iter() {
            if !custom.iter().any(|c| c.id == builtin.name) {
                scenarios.push(builtin.definition()?);
            }
        }
        Ok(Self { scenarios })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ScenarioDefinition> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// Looks up `id`, with a typo suggestion on failure.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownScenario` if no scenario has that id.
    pub fn resolve(&self, id: &str) -> Result<&ScenarioDefinition, ConfigError> {
        self.get(id).ok_or_else(|| ConfigError::UnknownScenario {
            id: id.to_string(),
            suggestion: self.suggest(id),
        })
    }

    #[must_use]
    pub fn suggest(&self, input: &str) -> Option<String> {
        closest(input, self.scenarios.iter().map(|s| s.id.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScenarioDefinition> {
        self.scenarios.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
