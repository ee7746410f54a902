pub mod catalog;
pub mod codegen;
pub mod config;
pub mod error;
pub mod meta;
pub mod naming;
pub mod relations;
pub mod runtime;
pub mod types;

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;

use crate::catalog::Catalog;
use crate::codegen::GenOptions;
use crate::config::GenConfig;
use crate::meta::Registry;
use crate::relations::IncludeClosure;
use crate::types::TypeTable;

pub use error::Error;

/// Load and normalize a generator config file.
pub fn load_config(path: &str) -> Result<GenConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path))?;
    GenConfig::from_toml(&text).with_context(|| format!("invalid config file {}", path))
}

/// Run every metadata phase in order: types, tables, inferred and explicit
/// relationships, include closures.
pub fn build_model(
    config: &GenConfig,
    catalog: &dyn Catalog,
) -> Result<(Registry, IncludeClosure), Error> {
    let catalog_types = meta::catalog_types(config, catalog)?;
    let types = TypeTable::default().with_overrides(&config.type_overrides, &catalog_types)?;

    let mut registry = meta::build_registry(config, catalog, &types)?;
    tracing::info!("loaded metadata for {} tables", registry.tables.len());
    relations::infer_references(&mut registry)?;
    relations::attach_explicit_belongs_to(&mut registry, config)?;

    let closure = IncludeClosure::build(&registry);
    Ok((registry, closure))
}

/// Generate the client module source for `config` against `catalog`.
pub fn generate_code(config: &GenConfig, catalog: &dyn Catalog) -> Result<String, Error> {
    let (registry, closure) = build_model(config, catalog)?;
    let options = GenOptions {
        instrument: config.instrument,
        ..GenOptions::default()
    };
    Ok(codegen::generate_client(&registry, &closure, &options))
}

/// `NAME` matches when the variable is set and non-empty; `NAME=regex` when
/// the whole value matches `regex`.
pub fn var_pattern_matches(pattern: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<bool> {
    let (name, re) = match pattern.split_once('=') {
        Some((name, re)) => (name.trim(), Some(re)),
        None => (pattern.trim(), None),
    };
    let Some(value) = lookup(name) else {
        return Ok(false);
    };
    match re {
        None => Ok(!value.is_empty()),
        Some(re) => {
            let re = Regex::new(&format!("^(?:{})$", re))
                .with_context(|| format!("invalid pattern in '{}'", pattern))?;
            Ok(re.is_match(&value))
        }
    }
}

/// Generation runs unless a disable pattern matches or an enable pattern
/// fails to.
pub fn generation_enabled(
    enable: &[String],
    disable: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<bool> {
    for pattern in disable {
        if var_pattern_matches(pattern, &lookup)? {
            tracing::info!("doing nothing because disable var '{}' matched", pattern);
            return Ok(false);
        }
    }
    for pattern in enable {
        if !var_pattern_matches(pattern, &lookup)? {
            tracing::info!("doing nothing because enable var '{}' failed to match", pattern);
            return Ok(false);
        }
    }
    Ok(true)
}

/// `$NAME` reads the connection string from the environment.
pub fn expand_conn(conn: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    match conn.strip_prefix('$') {
        Some(var) => lookup(var).filter(|v| !v.is_empty()),
        None => Some(conn.to_string()),
    }
}

/// Connect with the first candidate that answers `SELECT 1`, falling back to
/// `DATABASE_URL` when no candidates are given.
pub async fn connect_first(candidates: &[String]) -> Result<sqlx::PgPool> {
    let mut candidates = candidates.to_vec();
    if candidates.is_empty() {
        candidates.push("$DATABASE_URL".to_string());
    }
    for candidate in &candidates {
        let Some(url) = expand_conn(candidate, |v| std::env::var(v).ok()) else {
            tracing::debug!("connection string '{}' is empty", candidate);
            continue;
        };
        let pool = match sqlx::PgPool::connect(&url).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::debug!("connection '{}' failed: {}", candidate, e);
                continue;
            }
        };
        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => {
                tracing::info!("connected using '{}'", candidate);
                return Ok(pool);
            }
            Err(e) => tracing::debug!("connection '{}' failed liveness probe: {}", candidate, e),
        }
    }
    anyhow::bail!("unable to connect with any of the provided connection strings")
}
