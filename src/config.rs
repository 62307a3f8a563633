use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_MAX_RESTARTS: u64 = 15;
pub const DEFAULT_MIN_UPTIME: &str = "1s";

/// One application entry as it appears in a config file or a START
/// request. Unset fields fall back to daemon-side defaults when the
/// record is created.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppSpec {
    pub name: String,
    pub script: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub instances: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub exec_mode: String,
    #[serde(default)]
    pub watch: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watch_ignore: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log_file: Option<PathBuf>,
    #[serde(default)]
    pub max_restarts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_uptime: Option<String>,
}

/// Config file document: `{ "apps": [ ... ] }`, JSON or YAML.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    pub apps: Vec<AppSpec>,
}

pub fn is_config_path(path: &str) -> bool {
    matches!(
        Path::new(path).extension().and_then(|e| e.to_str()),
        Some("json") | Some("yml") | Some("yaml")
    )
}

/// Load and validate a config file. Format is chosen by extension;
/// unknown extensions try JSON first, then YAML.
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::ConfigInvalid(format!(
            "config file does not exist: {}",
            path.display()
        )));
    }

    let data = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let config: Config = match ext.as_str() {
        "json" => serde_json::from_str(&data)
            .map_err(|err| Error::ConfigInvalid(format!("failed to parse config: {err}")))?,
        "yml" | "yaml" => serde_yaml::from_str(&data)
            .map_err(|err| Error::ConfigInvalid(format!("failed to parse config: {err}")))?,
        _ => match serde_json::from_str(&data) {
            Ok(config) => config,
            Err(_) => serde_yaml::from_str(&data)
                .map_err(|err| Error::ConfigInvalid(format!("failed to parse config: {err}")))?,
        },
    };

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.apps.is_empty() {
        return Err(Error::ConfigInvalid("no apps defined".to_string()));
    }

    let mut names = HashSet::new();
    for (index, app) in config.apps.iter().enumerate() {
        if app.name.is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "app {index}: name must not be empty"
            )));
        }
        if app.script.is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "app '{}': script must not be empty",
                app.name
            )));
        }
        if !names.insert(app.name.as_str()) {
            return Err(Error::ConfigInvalid(format!(
                "duplicate app name '{}'",
                app.name
            )));
        }
        if !Path::new(&app.script).exists() {
            return Err(Error::ConfigInvalid(format!(
                "app '{}': script does not exist: {}",
                app.name, app.script
            )));
        }
        if !app.exec_mode.is_empty() && app.exec_mode != "fork" && app.exec_mode != "cluster" {
            return Err(Error::ConfigInvalid(format!(
                "app '{}': unsupported exec_mode: {}",
                app.name, app.exec_mode
            )));
        }
        if let Some(uptime) = &app.min_uptime {
            crate::helpers::duration::parse(uptime).map_err(|err| {
                Error::ConfigInvalid(format!("app '{}': {err}", app.name))
            })?;
        }
    }

    Ok(())
}

/// Save a config document, YAML for .yml/.yaml paths, JSON otherwise.
pub fn save(config: &Config, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let data = match ext.as_str() {
        "yml" | "yaml" => serde_yaml::to_string(config)
            .map_err(|err| Error::ConfigInvalid(format!("failed to encode config: {err}")))?,
        _ => serde_json::to_string_pretty(config)
            .map_err(|err| Error::ConfigInvalid(format!("failed to encode config: {err}")))?,
    };

    fs::write(path, data)?;
    Ok(())
}

/// Write an example config a user can edit into shape.
pub fn generate_template(path: &Path) -> Result<()> {
    let template = Config {
        apps: vec![AppSpec {
            name: "example-app".to_string(),
            script: "./app.js".to_string(),
            args: vec!["--port".to_string(), "3000".to_string()],
            cwd: Some(PathBuf::from("/path/to/app")),
            env: BTreeMap::from([
                ("NODE_ENV".to_string(), "production".to_string()),
                ("PORT".to_string(), "3000".to_string()),
            ]),
            instances: 2,
            exec_mode: "cluster".to_string(),
            watch: true,
            watch_ignore: vec!["node_modules".to_string(), "logs".to_string()],
            log_file: Some(PathBuf::from("./logs/app.log")),
            error_log_file: Some(PathBuf::from("./logs/app-error.log")),
            max_restarts: 10,
            min_uptime: Some("10s".to_string()),
        }],
    };

    save(&template, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\nexit 0").unwrap();
        path.display().to_string()
    }

    fn app(name: &str, script: &str) -> AppSpec {
        AppSpec {
            name: name.to_string(),
            script: script.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_empty_apps() {
        let err = validate(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("no apps"));
    }

    #[test]
    fn test_validate_missing_name() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "a.sh");
        let config = Config {
            apps: vec![app("", &script)],
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "a.sh");
        let config = Config {
            apps: vec![app("dup", &script), app("dup", &script)],
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_missing_script() {
        let config = Config {
            apps: vec![app("web", "/nonexistent/script.sh")],
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_bad_exec_mode() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "a.sh");
        let mut spec = app("web", &script);
        spec.exec_mode = "threads".to_string();
        let config = Config { apps: vec![spec] };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("exec_mode"));
    }

    #[test]
    fn test_load_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "a.sh");

        let json_path = dir.path().join("apps.json");
        fs::write(
            &json_path,
            format!(r#"{{"apps":[{{"name":"web","script":"{script}"}}]}}"#),
        )
        .unwrap();
        let config = load(&json_path).unwrap();
        assert_eq!(config.apps.len(), 1);
        assert_eq!(config.apps[0].name, "web");

        let yaml_path = dir.path().join("apps.yml");
        fs::write(
            &yaml_path,
            format!("apps:\n  - name: worker\n    script: {script}\n"),
        )
        .unwrap();
        let config = load(&yaml_path).unwrap();
        assert_eq!(config.apps[0].name, "worker");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(Path::new("/nonexistent/apps.json")).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn test_template_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ecosystem.config.json");
        generate_template(&path).unwrap();

        let data = fs::read_to_string(&path).unwrap();
        let config: Config = serde_json::from_str(&data).unwrap();
        assert_eq!(config.apps[0].name, "example-app");
        assert_eq!(config.apps[0].instances, 2);
    }
}
