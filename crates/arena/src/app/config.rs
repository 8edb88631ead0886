use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use effects::{CollisionPair, CollisionRegistry};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::abilities::{FIRE_BURST, FROST_LINE, WATER_SHOT};
use super::activation::EffectCatalog;

#[derive(Debug, Error)]
pub(crate) enum CollisionConfigError {
    #[error("failed to read collision config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse collision config {path} at {location}: {source}")]
    Parse {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("collision config {path} names unknown effect `{name}` at {location}")]
    UnknownEffect {
        path: PathBuf,
        name: String,
        location: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CollisionConfigFile {
    collisions: Vec<CollisionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CollisionEntry {
    first: String,
    second: String,
    #[serde(default)]
    remove_first: bool,
    #[serde(default)]
    remove_second: bool,
}

/// Pairs used when no collision config file is configured.
pub(crate) fn default_collision_registry() -> CollisionRegistry {
    CollisionRegistry::from_pairs([
        CollisionPair::new(WATER_SHOT, WATER_SHOT, true, true),
        CollisionPair::new(WATER_SHOT, FIRE_BURST, true, false),
        CollisionPair::new(FROST_LINE, FIRE_BURST, true, false),
    ])
}

pub(crate) fn load_collision_registry(
    path: &Path,
    catalog: &EffectCatalog,
) -> Result<CollisionRegistry, CollisionConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| CollisionConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let registry = parse_collision_registry(&raw, path, catalog)?;
    info!(path = %path.display(), pairs = registry.len(), "collision_config_loaded");
    Ok(registry)
}

fn parse_collision_registry(
    raw: &str,
    path: &Path,
    catalog: &EffectCatalog,
) -> Result<CollisionRegistry, CollisionConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let file: CollisionConfigFile = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|error| {
            let location = display_location(error.path().to_string());
            CollisionConfigError::Parse {
                path: path.to_path_buf(),
                location,
                source: error.into_inner(),
            }
        })?;

    let mut pairs = Vec::with_capacity(file.collisions.len());
    for (index, entry) in file.collisions.iter().enumerate() {
        let resolve = |name: &str, field: &str| {
            catalog
                .kind(name)
                .ok_or_else(|| CollisionConfigError::UnknownEffect {
                    path: path.to_path_buf(),
                    name: name.to_string(),
                    location: format!("collisions[{index}].{field}"),
                })
        };
        pairs.push(CollisionPair::new(
            resolve(&entry.first, "first")?,
            resolve(&entry.second, "second")?,
            entry.remove_first,
            entry.remove_second,
        ));
    }
    Ok(CollisionRegistry::from_pairs(pairs))
}

fn display_location(path: String) -> String {
    if path.is_empty() || path == "." {
        "document root".to_string()
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn catalog() -> EffectCatalog {
        EffectCatalog::with_builtin()
    }

    #[test]
    fn loads_pairs_and_collapses_mirrored_duplicates() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{
                "collisions": [
                    {{ "first": "water_shot", "second": "fire_burst", "remove_first": true }},
                    {{ "first": "fire_burst", "second": "water_shot", "remove_second": true }},
                    {{ "first": "frost_line", "second": "water_shot" }}
                ]
            }}"#
        )
        .expect("write config");

        let registry = load_collision_registry(file.path(), &catalog()).expect("config loads");
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.pairs()[0],
            CollisionPair::new(WATER_SHOT, FIRE_BURST, true, false)
        );
        assert!(registry.find(WATER_SHOT, FROST_LINE).is_some());
    }

    #[test]
    fn missing_file_reports_read_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("collisions.json");

        let error = load_collision_registry(&missing, &catalog()).expect_err("missing file");
        assert!(matches!(error, CollisionConfigError::Read { .. }));
    }

    #[test]
    fn parse_error_names_the_offending_field() {
        let raw = r#"{ "collisions": [ { "first": "water_shot", "second": 7 } ] }"#;

        let error = parse_collision_registry(raw, Path::new("inline.json"), &catalog())
            .expect_err("bad type");
        match error {
            CollisionConfigError::Parse { location, .. } => {
                assert_eq!(location, "collisions[0].second");
            }
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn unknown_effect_names_are_rejected() {
        let raw = r#"{ "collisions": [ { "first": "water_shot", "second": "lava_wave" } ] }"#;

        let error = parse_collision_registry(raw, Path::new("inline.json"), &catalog())
            .expect_err("unknown kind");
        assert!(
            matches!(error, CollisionConfigError::UnknownEffect { ref name, ref location, .. }
                if name == "lava_wave" && location == "collisions[0].second")
        );
    }

    #[test]
    fn default_registry_covers_builtin_interactions() {
        let registry = default_collision_registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.find(FIRE_BURST, FROST_LINE).copied(),
            Some(CollisionPair::new(FROST_LINE, FIRE_BURST, true, false))
        );
    }
}
