mod logging;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dynint_api::{Integration, Payload};
use dynint_connectors::ReqwestTransport;
use dynint_core::{
    CONFIG_FILE_NAME, ConfigError, IntegrationCatalog, default_config_dir, demo_catalog,
    load_catalog_from_dir, write_default_config_files,
};
use dynint_runtime::Integrations;
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "dynint", about = "Trigger automation services through named integrations")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `dynint_runtime=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write the default integrations.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// List resolvable integration types
    List,
    /// List configured integration entries
    Entries,
    /// Execute a trigger through a configured entry
    Exec {
        entry: String,
        #[arg(long)]
        trigger: String,
        /// Payload field; values that parse as JSON are sent as JSON
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
        /// Whole payload as a JSON object; `--arg` fields are merged on top
        #[arg(long)]
        payload: Option<String>,
    },
    /// Query the status of a triggered process
    Status { entry: String, process_id: String },
    /// Cancel a triggered process
    Cancel { entry: String, process_id: String },
    /// Probe reachability of an entry's service
    Test { entry: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref())?;
    let cfg_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
    let json_mode = cli.json;

    match cli.command {
        Commands::Init { force } => {
            let path = cfg_dir.join(CONFIG_FILE_NAME);
            if force && path.exists() {
                fs::remove_file(&path)?;
            }
            let written = write_default_config_files(&cfg_dir)?;
            let text = format!("Init complete: {}", written.display());
            pout(
                json_mode,
                json!({"message": "init complete", "config_file": written}),
                &text,
            )
        }
        Commands::List => {
            let session = Session::open(&cfg_dir)?;
            let available = session.integrations.available();
            let text = available
                .iter()
                .map(|(name, type_id)| format!("{name:<24} {type_id}"))
                .collect::<Vec<_>>()
                .join("\n");
            pout(json_mode, serde_json::to_value(&available)?, &text)
        }
        Commands::Entries => {
            let catalog = load_catalog(&cfg_dir)?;
            let entries: Vec<Value> = catalog
                .integrations
                .values()
                .map(|e| {
                    json!({
                        "id": e.id,
                        "integration": e.integration,
                        "base_url": e.config.base_url(),
                    })
                })
                .collect();
            let text = catalog
                .integrations
                .values()
                .map(|e| format!("{:<16} {}", e.id, e.integration))
                .collect::<Vec<_>>()
                .join("\n");
            pout(json_mode, Value::Array(entries), &text)
        }
        Commands::Exec {
            entry,
            trigger,
            args,
            payload,
        } => {
            let payload = build_payload(payload.as_deref(), args)?;
            let adapter = Session::open(&cfg_dir)?.adapter(&entry)?;
            let result = adapter.execute(&trigger, &payload)?;
            let text = format!(
                "Triggered {trigger} via {entry}: process {} ({})",
                result.process_id.as_deref().unwrap_or("-"),
                result.status
            );
            pout(json_mode, serde_json::to_value(&result)?, &text)
        }
        Commands::Status { entry, process_id } => {
            let adapter = Session::open(&cfg_dir)?.adapter(&entry)?;
            let result = adapter.get_status(&process_id)?;
            let text = format!("Process {process_id}: {}", result.status);
            pout(json_mode, serde_json::to_value(&result)?, &text)
        }
        Commands::Cancel { entry, process_id } => {
            let adapter = Session::open(&cfg_dir)?.adapter(&entry)?;
            let cancelled = adapter.cancel(&process_id);
            let text = if cancelled {
                format!("Process {process_id} cancelled")
            } else {
                format!("Process {process_id} was not cancelled")
            };
            pout(
                json_mode,
                json!({"process_id": process_id, "cancelled": cancelled}),
                &text,
            )
        }
        Commands::Test { entry } => {
            let adapter = Session::open(&cfg_dir)?.adapter(&entry)?;
            let reachable = adapter.test_connection();
            let text = if reachable {
                format!("{entry} ({}) is reachable", adapter.name())
            } else {
                format!("{entry} ({}) is not reachable", adapter.name())
            };
            pout(
                json_mode,
                json!({"entry": entry, "integration": adapter.name(), "reachable": reachable}),
                &text,
            )
        }
    }
}

/// Loaded catalog plus a registry wired to the real HTTP transport.
struct Session {
    catalog: IntegrationCatalog,
    integrations: Integrations,
}

impl Session {
    fn open(dir: &Path) -> anyhow::Result<Self> {
        let catalog = load_catalog(dir)?;
        let transport = Arc::new(ReqwestTransport::new()?);
        let integrations = Integrations::from_settings(&catalog.settings, transport);
        Ok(Self {
            catalog,
            integrations,
        })
    }

    fn adapter(&self, entry: &str) -> anyhow::Result<Box<dyn Integration>> {
        Ok(self.integrations.call_entry(self.catalog.entry(entry)?)?)
    }
}

/// Catalog from `dir`, or the demo catalog when no file exists yet.
fn load_catalog(dir: &Path) -> anyhow::Result<IntegrationCatalog> {
    match load_catalog_from_dir(dir) {
        Ok(catalog) => Ok(catalog),
        Err(ConfigError::Io { path, source }) if source.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path, "no config file, using demo catalog");
            Ok(demo_catalog())
        }
        Err(e) => Err(e.into()),
    }
}

fn build_payload(base: Option<&str>, args: Vec<(String, String)>) -> anyhow::Result<Payload> {
    let mut payload = match base {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--payload must be a JSON object"),
        },
        None => Payload::new(),
    };
    for (key, raw) in args {
        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        payload.insert(key, value);
    }
    Ok(payload)
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| "must be KEY=VALUE".to_string())?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

pub fn pout(json_mode: bool, value: Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_val_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn payload_merges_args_over_base() {
        let payload = build_payload(
            Some(r#"{"order": 1, "note": "x"}"#),
            vec![
                ("order".into(), "2".into()),
                ("name".into(), "acme".into()),
                ("tags".into(), r#"["a"]"#.into()),
            ],
        )
        .unwrap();
        assert_eq!(
            Value::Object(payload),
            json!({"order": 2, "note": "x", "name": "acme", "tags": ["a"]})
        );
        assert!(build_payload(Some("[1]"), vec![]).is_err());
    }

    #[test]
    fn missing_config_falls_back_to_demo() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = load_catalog(dir.path()).unwrap();
        assert!(catalog.integrations.contains_key("local"));
    }

    #[test]
    fn unreadable_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        let err = load_catalog(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME), "{err}");
    }

    #[test]
    fn broken_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "search_paths = [").unwrap();
        assert!(load_catalog(dir.path()).is_err());
    }
}
