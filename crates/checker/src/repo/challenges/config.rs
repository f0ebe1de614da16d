// SPDX-FileCopyrightText: 2026 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CHALLENGE_FILE: &str = "challenge.yml";
pub const CATEGORY_FILE: &str = "category.yml";

/// Flag name used for challenges written in the single-flag form.
pub const LEGACY_FLAG_NAME: &str = "flag";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to parse challenge {id} in {path}: {source}")]
    Entry {
        path: PathBuf,
        id: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path} is not a mapping")]
    NotAMapping { path: PathBuf },
    #[error("{path} contains a non-string challenge id")]
    InvalidKey { path: PathBuf },
    #[error("Challenge {id} in {path} has no flags")]
    NoFlags { path: PathBuf, id: String },
}

/// Single challenge per file, identified by a top-level `id`.
#[derive(Deserialize, Debug, Clone)]
struct LegacyChallengeFile {
    id: String,
    name: String,
    difficulty: String,
    flag: String,
    value: u32,
    connection_strings: Vec<String>,
    #[serde(default)]
    dynamic_flag: bool,
    #[serde(default)]
    description: Option<String>,
}

/// One entry of a file that maps identities to challenges.
#[derive(Deserialize, Debug, Clone)]
struct ChallengeEntry {
    name: String,
    difficulty: String,
    flags: BTreeMap<String, String>,
    value: u32,
    connection_strings: Vec<String>,
    #[serde(default)]
    dynamic_flag: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    pub id: String,
    pub name: String,
    pub difficulty: String,
    pub value: u32,
    pub flags: BTreeMap<String, String>,
    /// Whether the record came from the single-flag form
    pub legacy: bool,
    pub dynamic_flag: bool,
    pub connection_strings: Vec<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub banner: Option<String>,
}

impl From<LegacyChallengeFile> for ChallengeRecord {
    fn from(file: LegacyChallengeFile) -> Self {
        ChallengeRecord {
            id: file.id,
            name: file.name,
            difficulty: file.difficulty,
            value: file.value,
            flags: BTreeMap::from([(LEGACY_FLAG_NAME.to_string(), file.flag)]),
            legacy: true,
            dynamic_flag: file.dynamic_flag,
            connection_strings: file.connection_strings,
            description: file.description,
        }
    }
}

impl ChallengeEntry {
    fn into_record(self, id: String) -> ChallengeRecord {
        ChallengeRecord {
            id,
            name: self.name,
            difficulty: self.difficulty,
            value: self.value,
            flags: self.flags,
            legacy: false,
            dynamic_flag: self.dynamic_flag,
            connection_strings: self.connection_strings,
            description: self.description,
        }
    }
}

/// Parses a challenge file in either form. `path` is only used for error messages.
pub fn parse_challenge_config(
    content: &str,
    path: &Path,
) -> Result<Vec<ChallengeRecord>, ConfigError> {
    let parse_err = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let document: serde_yaml::Value = serde_yaml::from_str(content).map_err(parse_err)?;
    let serde_yaml::Value::Mapping(mapping) = document else {
        return Err(ConfigError::NotAMapping {
            path: path.to_path_buf(),
        });
    };

    let records = if mapping.contains_key("id") {
        let legacy: LegacyChallengeFile =
            serde_yaml::from_value(serde_yaml::Value::Mapping(mapping)).map_err(parse_err)?;
        vec![ChallengeRecord::from(legacy)]
    } else {
        let mut records = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let serde_yaml::Value::String(id) = key else {
                return Err(ConfigError::InvalidKey {
                    path: path.to_path_buf(),
                });
            };
            let entry: ChallengeEntry =
                serde_yaml::from_value(value).map_err(|source| ConfigError::Entry {
                    path: path.to_path_buf(),
                    id: id.clone(),
                    source,
                })?;
            records.push(entry.into_record(id));
        }
        records
    };

    if let Some(record) = records.iter().find(|r| r.flags.is_empty()) {
        return Err(ConfigError::NoFlags {
            path: path.to_path_buf(),
            id: record.id.clone(),
        });
    }
    Ok(records)
}

pub fn load_challenge_config(path: &Path) -> Result<Vec<ChallengeRecord>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_challenge_config(&content, path)
}

pub fn load_category_config(path: &Path) -> Result<CategoryRecord, ConfigError> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_reader(file).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_challenge() {
        let content = r#"
id: 5b0c2b0e-8f59-4bb4-9a43-3d1a4b7f7f11
name: Buffer overflow
difficulty: easy
flag: CTF{overflow}
value: 100
connection_strings:
  - "nc {{IP}} {{PORT}}"
"#;
        let records = parse_challenge_config(content, Path::new("challenge.yml")).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert!(record.legacy);
        assert!(!record.dynamic_flag);
        assert_eq!(record.name, "Buffer overflow");
        assert_eq!(record.flags.get(LEGACY_FLAG_NAME).unwrap(), "CTF{overflow}");
        assert_eq!(record.connection_strings, vec!["nc {{IP}} {{PORT}}"]);
        assert_eq!(record.description, None);
    }

    #[test]
    fn test_parse_multi_challenge_keeps_file_order() {
        let content = r#"
zeta:
  name: Second part
  difficulty: hard
  flags:
    F2: "ctf{z}"
    F1: "ctf{y}"
  value: 300
  connection_strings: []
alpha:
  name: First part
  difficulty: easy
  flags:
    F1: "ctf{x}"
  value: 100
  connection_strings: []
  dynamic_flag: true
"#;
        let records = parse_challenge_config(content, Path::new("challenge.yml")).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
        assert!(!records[0].legacy);
        let flag_names: Vec<_> = records[0].flags.keys().map(String::as_str).collect();
        assert_eq!(flag_names, vec!["F1", "F2"]);
        assert!(records[1].dynamic_flag);
    }

    #[test]
    fn test_missing_required_field() {
        let content = r#"
id: abc
name: No flag here
difficulty: easy
value: 100
connection_strings: []
"#;
        let err = parse_challenge_config(content, Path::new("challenge.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("flag"));
    }

    #[test]
    fn test_missing_field_in_entry_names_the_entry() {
        let content = r#"
broken:
  name: Broken
  flags:
    F1: "ctf{x}"
  value: 100
  connection_strings: []
"#;
        let err = parse_challenge_config(content, Path::new("challenge.yml")).unwrap_err();
        match err {
            ConfigError::Entry { id, .. } => assert_eq!(id, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_entry_without_flags_is_rejected() {
        let content = r#"
empty:
  name: Empty
  difficulty: easy
  flags: {}
  value: 100
  connection_strings: []
"#;
        let err = parse_challenge_config(content, Path::new("challenge.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::NoFlags { .. }));
    }

    #[test]
    fn test_scalar_document_is_rejected() {
        let err = parse_challenge_config("just a string", Path::new("challenge.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping { .. }));
    }

    #[test]
    fn test_load_category() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATEGORY_FILE);
        std::fs::write(&path, "id: cat-1\nname: Web\nbanner: web.png\n").unwrap();
        let category = load_category_config(&path).unwrap();
        assert_eq!(
            category,
            CategoryRecord {
                id: "cat-1".to_string(),
                name: "Web".to_string(),
                banner: Some("web.png".to_string()),
            }
        );
        std::fs::write(&path, "id: cat-2\nname: Misc\n").unwrap();
        assert_eq!(load_category_config(&path).unwrap().banner, None);
        assert!(matches!(
            load_category_config(&dir.path().join("missing.yml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
