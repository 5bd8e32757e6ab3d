// Migration Scripts
//
// Versioned, immutable units of work. A script set is validated once,
// when the migrator is built, and never reordered afterwards.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ordering key of a migration. Level 0 means "nothing applied".
pub type Level = u64;

/// One migration: a level and the statements that bring the store to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawScript")]
pub struct MigrationScript {
    level: Level,
    #[serde(rename = "up")]
    statements: Vec<String>,
}

/// Script documents accept `up` as a single statement or a list.
#[derive(Deserialize)]
struct RawScript {
    level: Level,
    up: Up,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Up {
    One(String),
    Many(Vec<String>),
}

impl From<RawScript> for MigrationScript {
    fn from(raw: RawScript) -> Self {
        let statements = match raw.up {
            Up::One(statement) => vec![statement],
            Up::Many(statements) => statements,
        };
        Self {
            level: raw.level,
            statements,
        }
    }
}

impl MigrationScript {
    pub fn new<I, T>(level: Level, statements: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            level,
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

/// Validated, caller-ordered collection of scripts.
///
/// Guarantees:
/// - at least one script
/// - every script has at least one statement
/// - no level 0, no duplicate levels
/// - levels strictly ascending in supplied order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSet {
    scripts: Vec<MigrationScript>,
}

impl ScriptSet {
    pub fn new(scripts: Vec<MigrationScript>) -> Result<Self, ConfigError> {
        if scripts.is_empty() {
            return Err(ConfigError::NoScripts);
        }

        let mut seen = HashSet::with_capacity(scripts.len());
        for script in &scripts {
            if script.level == 0 {
                return Err(ConfigError::ZeroLevel);
            }
            if script.statements.is_empty() {
                return Err(ConfigError::EmptyScript {
                    level: script.level,
                });
            }
            if !seen.insert(script.level) {
                return Err(ConfigError::DuplicateLevel {
                    level: script.level,
                });
            }
        }

        if let Some(pair) = scripts.windows(2).find(|pair| pair[0].level > pair[1].level) {
            return Err(ConfigError::OutOfOrder {
                previous: pair[0].level,
                level: pair[1].level,
            });
        }

        tracing::debug!(scripts = scripts.len(), "migration scripts validated");
        Ok(Self { scripts })
    }

    /// Parse a JSON array of `{ "level": n, "up": "..." | ["...", ...] }`.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let scripts: Vec<MigrationScript> = serde_json::from_str(json)?;
        Self::new(scripts)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationScript> {
        self.scripts.iter()
    }

    pub fn as_slice(&self) -> &[MigrationScript] {
        &self.scripts
    }

    /// Highest level available in the set.
    pub fn latest(&self) -> Level {
        self.scripts.iter().map(|s| s.level).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl TryFrom<Vec<MigrationScript>> for ScriptSet {
    type Error = ConfigError;

    fn try_from(scripts: Vec<MigrationScript>) -> Result<Self, Self::Error> {
        Self::new(scripts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_multiple_statements() {
        let json = r#"
        [
          { "level": 1, "up": "create table t (a int)" },
          { "level": 3, "up": ["update t set a = 3", "insert into t values (99)"] }
        ]
        "#;

        let set = ScriptSet::from_json_str(json).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].statements(), ["create table t (a int)"]);
        assert_eq!(set.as_slice()[1].statements().len(), 2);
        assert_eq!(set.latest(), 3);
    }

    #[test]
    fn empty_set_is_rejected() {
        let err = ScriptSet::new(vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::NoScripts));
    }

    #[test]
    fn duplicate_level_is_rejected() {
        let err = ScriptSet::new(vec![
            MigrationScript::new(1, ["a"]),
            MigrationScript::new(2, ["b"]),
            MigrationScript::new(1, ["c"]),
        ])
        .unwrap_err();

        assert!(matches!(err, ConfigError::DuplicateLevel { level: 1 }));
    }

    #[test]
    fn script_without_statements_is_rejected() {
        let err = ScriptSet::new(vec![MigrationScript::new(4, Vec::<String>::new())]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyScript { level: 4 }));
    }

    #[test]
    fn level_zero_is_rejected() {
        let err = ScriptSet::new(vec![MigrationScript::new(0, ["a"])]).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLevel));
    }

    #[test]
    fn out_of_order_set_is_rejected() {
        let err = ScriptSet::new(vec![
            MigrationScript::new(3, ["c"]),
            MigrationScript::new(1, ["a"]),
            MigrationScript::new(2, ["b"]),
        ])
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::OutOfOrder {
                previous: 3,
                level: 1
            }
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = ScriptSet::from_json_str(r#"[{ "level": "one" }]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
