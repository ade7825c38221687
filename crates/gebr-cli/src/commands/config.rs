//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use gebr_core::config::{self, GebrConfig};

use crate::output::{print_error, print_info, print_success, print_warning};

fn config_file(config_path: Option<&PathBuf>) -> PathBuf {
    config_path.cloned().unwrap_or_else(config::default_config_path)
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Value at a dotted key such as `comm.ssh_program`
pub fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

/// Interpret a command-line value as the most specific TOML type
pub fn parse_value(value: &str) -> toml::Value {
    if let Ok(b) = value.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = value.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = value.parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(value.to_string())
    }
}

/// Print the configuration file, or the defaults when there is none
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = config_file(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Defaults in effect (run 'gebr config init' to write them):");
        println!();
        println!("{}", toml::to_string_pretty(&GebrConfig::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);
    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = config_file(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &GebrConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

/// Print one value
pub fn config_get(config_path: Option<&PathBuf>, key: &str) -> Result<()> {
    let path = config_file(config_path);
    if !path.exists() {
        anyhow::bail!("Config file not found: {:?}", path);
    }

    let table = read_table(&path)?;
    match lookup(&table, key) {
        Some(toml::Value::String(s)) => println!("{}", s),
        Some(toml::Value::Table(t)) => print!("{}", toml::to_string_pretty(t)?),
        Some(value) => println!("{}", value),
        None => anyhow::bail!("Key not found: {}", key),
    }
    Ok(())
}

/// Set one value, creating the file and intermediate tables as needed.
/// The result must still load as a valid configuration.
pub fn config_set(config_path: Option<&PathBuf>, key: &str, value: &str) -> Result<()> {
    let path = config_file(config_path);
    let mut table = if path.exists() {
        read_table(&path)?
    } else {
        toml::Table::new()
    };

    let (parents, last) = match key.rsplit_once('.') {
        Some((parents, last)) => (parents.split('.').collect::<Vec<_>>(), last),
        None => (Vec::new(), key),
    };
    if last.is_empty() {
        anyhow::bail!("Invalid key: {:?}", key);
    }

    let mut current = &mut table;
    for part in parents {
        current = current
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("Cannot navigate to key: {}", key))?;
    }
    current.insert(last.to_string(), parse_value(value));

    let content = toml::to_string_pretty(&table)?;
    let _: GebrConfig = toml::from_str(&content).with_context(|| format!("Invalid value for {}", key))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Set {} = {}", key, value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_nested() {
        let table: toml::Table = toml::from_str("[comm]\nssh_program = \"ssh\"\n").unwrap();
        assert_eq!(
            lookup(&table, "comm.ssh_program").and_then(|v| v.as_str()),
            Some("ssh")
        );
        assert!(lookup(&table, "comm.missing").is_none());
        assert!(lookup(&table, "comm.ssh_program.deeper").is_none());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), toml::Value::Boolean(true));
        assert_eq!(parse_value("30"), toml::Value::Integer(30));
        assert_eq!(parse_value("0.5"), toml::Value::Float(0.5));
        assert_eq!(parse_value("/bin/sh"), toml::Value::String("/bin/sh".into()));
    }

    #[test]
    fn test_set_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        config_set(Some(&path), "daemon.job_shell", "/bin/bash").unwrap();
        config_set(Some(&path), "cli.max_retries", "3").unwrap();

        let config: GebrConfig = config::load_config(&path).unwrap();
        assert_eq!(config.daemon.job_shell, "/bin/bash");
        assert_eq!(config.cli.max_retries, 3);
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        assert!(config_set(Some(&path), "cli.max_retries", "many").is_err());
        assert!(!path.exists());
    }
}
