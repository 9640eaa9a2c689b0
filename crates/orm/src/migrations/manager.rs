//! Migration Manager - File system operations for migrations
//!
//! Discovers migration files and generates new ones. Migrations are ordered by
//! the lexical order of their ordering keys, with the full filename breaking
//! ties. Keys compare as text, so they must be fixed-width or otherwise
//! lexically sortable (`10_c.sql` sorts before `2_b.sql`).

use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::definitions::{Migration, MIGRATION_EXTENSION};
use crate::config::MigrationConfig;
use crate::error::{OrmError, OrmResult};

/// Migration manager for discovering and creating migrations
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    /// Create a new migration manager with default configuration
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.config.migrations_dir
    }

    /// Create a new timestamped migration file and return its path
    pub fn create_migration(&self, name: &str) -> OrmResult<PathBuf> {
        self.create_migration_at(name, Utc::now())
    }

    /// Create a new migration file using `now` as the ordering key source.
    ///
    /// The key is the millisecond epoch of `now`, bumped forward until no file
    /// in the directory already uses it.
    pub fn create_migration_at(&self, name: &str, now: DateTime<Utc>) -> OrmResult<PathBuf> {
        let clean_name = sanitize_migration_name(name)?;
        let dir = self.migrations_dir();

        fs::create_dir_all(dir).map_err(|e| OrmError::Discovery {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let used_keys = self.existing_ordering_keys()?;
        let mut timestamp = now.timestamp_millis();
        while used_keys.contains(&timestamp.to_string()) {
            timestamp += 1;
        }

        let filename = format!("{}_{}.{}", timestamp, clean_name, MIGRATION_EXTENSION);
        let filepath = dir.join(&filename);

        fs::write(&filepath, migration_template(&clean_name, now))?;

        tracing::info!(migration = %filename, "Created migration file");
        Ok(filepath)
    }

    /// Discover all migration files, sorted lexically by ordering key and then
    /// by full filename for equal keys.
    ///
    /// A missing directory is created, so a fresh project yields an empty list.
    pub fn load_migrations(&self) -> OrmResult<Vec<Migration>> {
        let dir = self.migrations_dir();
        let discovery_err = |path: &Path, e: std::io::Error| OrmError::Discovery {
            path: path.to_path_buf(),
            source: e,
        };

        fs::create_dir_all(dir).map_err(|e| discovery_err(dir, e))?;

        let mut migrations = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| discovery_err(dir, e))? {
            let entry = entry.map_err(|e| discovery_err(dir, e))?;
            let path = entry.path();

            if !has_migration_extension(&path) {
                continue;
            }

            let file_type = entry.file_type().map_err(|e| discovery_err(&path, e))?;
            if file_type.is_dir() {
                continue;
            }

            let name = entry.file_name().into_string().map_err(|raw| {
                OrmError::Validation(format!(
                    "Migration filename {:?} is not valid UTF-8",
                    raw
                ))
            })?;

            let content = fs::read_to_string(&path).map_err(|e| discovery_err(&path, e))?;
            let (ordering_key, description) = parse_migration_filename(&name);

            migrations.push(Migration {
                ordering_key,
                description,
                name,
                path,
                content,
            });
        }

        migrations.sort_by(|a, b| {
            a.ordering_key
                .cmp(&b.ordering_key)
                .then_with(|| a.name.cmp(&b.name))
        });
        warn_on_duplicate_keys(&migrations);

        tracing::debug!(
            dir = %dir.display(),
            count = migrations.len(),
            "Discovered migration files"
        );
        Ok(migrations)
    }

    fn existing_ordering_keys(&self) -> OrmResult<HashSet<String>> {
        Ok(self
            .load_migrations()?
            .into_iter()
            .map(|migration| migration.ordering_key)
            .collect())
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

fn has_migration_extension(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == MIGRATION_EXTENSION)
}

/// Split `<orderingKey>_<description>.sql` into its ordering key and a
/// human-readable description. A filename without `_` is all ordering key.
pub fn parse_migration_filename(filename: &str) -> (String, String) {
    let stem = filename
        .strip_suffix(MIGRATION_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(filename);

    match stem.split_once('_') {
        Some((key, rest)) => (key.to_string(), rest.replace('_', " ").trim().to_string()),
        None => (stem.to_string(), String::new()),
    }
}

/// Lowercase the name, replace every character outside `[a-z0-9]` with `_`
/// and collapse runs of `_`
pub fn sanitize_migration_name(name: &str) -> OrmResult<String> {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static REPEATED: OnceLock<Regex> = OnceLock::new();

    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-z0-9]").expect("valid regex"));
    let repeated = REPEATED.get_or_init(|| Regex::new(r"_+").expect("valid regex"));

    let lowered = name.to_lowercase();
    let replaced = invalid.replace_all(&lowered, "_");
    let clean = repeated.replace_all(&replaced, "_").into_owned();

    if !clean.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(OrmError::Validation(format!(
            "Migration name '{}' has no usable characters (expected letters or digits)",
            name
        )));
    }

    Ok(clean)
}

fn migration_template(clean_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {name}\n\
         -- Created at: {created}\n\
         \n\
         -- UP Migration\n\
         BEGIN;\n\
         \n\
         -- Add your SQL commands here\n\
         -- Example: CREATE TABLE example (id SERIAL PRIMARY KEY, name VARCHAR(255));\n\
         \n\
         COMMIT;\n\
         \n\
         -- DOWN Migration (reference only, never executed)\n\
         -- BEGIN;\n\
         -- DROP TABLE IF EXISTS example;\n\
         -- COMMIT;\n",
        name = clean_name,
        created = now.to_rfc3339(),
    )
}

fn warn_on_duplicate_keys(migrations: &[Migration]) {
    for pair in migrations.windows(2) {
        if pair[0].ordering_key == pair[1].ordering_key {
            tracing::warn!(
                ordering_key = %pair[0].ordering_key,
                first = %pair[0].name,
                second = %pair[1].name,
                "Duplicate migration ordering key; applying in filename order within the key"
            );
        }
    }
}
