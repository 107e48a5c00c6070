use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::slx::DEFAULT_SLX_VERSION;

/// File name searched for when locating compiler configuration.
pub const CONFIG_FILE_NAME: &str = "aqsl.toml";

/// The resolved compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Version written after `AQSIS_V`.
    pub version: String,
    /// Extension of generated programs, without the dot.
    pub extension: String,
    /// Where generated programs go; `None` means next to the input.
    pub output_dir: Option<PathBuf>,
    /// Directory of the `aqsl.toml` this came from, if any.
    pub root_dir: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_SLX_VERSION.to_string(),
            extension: default_extension(),
            output_dir: None,
            root_dir: None,
        }
    }
}

impl CompilerConfig {
    /// Output path for a shader named `shader_name` compiled from `input`.
    pub fn output_path(&self, input: &Path, shader_name: &str) -> PathBuf {
        let dir = match self.output_dir {
            Some(ref dir) => dir.clone(),
            None => input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        dir.join(format!("{}.{}", shader_name, self.extension))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompilerSection {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    extension: Option<String>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
}

/// Raw TOML structure for deserialization.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    compiler: CompilerSection,
}

fn default_extension() -> String {
    "slx".to_string()
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read aqsl.toml: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid aqsl.toml: {0}")]
    ParseError(String),
    #[error("invalid aqsl.toml: [compiler] {0} must not be empty")]
    EmptyField(&'static str),
}

/// Walk up from `start_dir` looking for `aqsl.toml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate an `aqsl.toml` from a file path.
pub fn load_config(path: &Path) -> Result<CompilerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let root_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    parse_config(&content, root_dir)
}

/// Parse and validate configuration text. Relative output directories are
/// resolved against `root_dir`.
pub fn parse_config(content: &str, root_dir: PathBuf) -> Result<CompilerConfig, ConfigError> {
    let raw: RawConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    let section = raw.compiler;

    let mut config = CompilerConfig::default();
    if let Some(version) = section.version {
        if version.trim().is_empty() {
            return Err(ConfigError::EmptyField("version"));
        }
        config.version = version;
    }
    if let Some(extension) = section.extension {
        let extension = extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(ConfigError::EmptyField("extension"));
        }
        config.extension = extension;
    }
    config.output_dir = section.output_dir.map(|dir| {
        if dir.is_absolute() {
            dir
        } else {
            root_dir.join(dir)
        }
    });
    config.root_dir = Some(root_dir);
    Ok(config)
}

/// Find and load configuration for an input file. A missing `aqsl.toml`
/// yields the defaults.
pub fn find_and_load_config(input: &Path) -> Result<CompilerConfig, ConfigError> {
    let start_dir = input.parent().unwrap_or_else(|| Path::new("."));
    match find_config(start_dir) {
        Some(path) => load_config(&path),
        None => Ok(CompilerConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("", PathBuf::from("/proj")).unwrap();
        assert_eq!(config.version, DEFAULT_SLX_VERSION);
        assert_eq!(config.extension, "slx");
        assert_eq!(config.output_dir, None);
        assert_eq!(config.root_dir, Some(PathBuf::from("/proj")));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[compiler]
version = "2.0.0"
extension = ".slo"
output_dir = "shaders"
"#;
        let config = parse_config(toml, PathBuf::from("/proj")).unwrap();
        assert_eq!(config.version, "2.0.0");
        assert_eq!(config.extension, "slo");
        assert_eq!(config.output_dir, Some(PathBuf::from("/proj/shaders")));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let toml = r#"
[compiler]
optimise = true
"#;
        let err = parse_config(toml, PathBuf::from(".")).unwrap_err().to_string();
        assert!(err.contains("invalid aqsl.toml"), "got: {}", err);
    }

    #[test]
    fn empty_version_is_rejected() {
        let toml = r#"
[compiler]
version = "  "
"#;
        let err = parse_config(toml, PathBuf::from(".")).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyField("version")));
    }

    #[test]
    fn output_path_defaults_next_to_input() {
        let config = CompilerConfig::default();
        let path = config.output_path(Path::new("units/plastic.json"), "plastic");
        assert_eq!(path, PathBuf::from("units/plastic.slx"));
    }

    #[test]
    fn output_path_uses_configured_dir() {
        let config = parse_config("[compiler]\noutput_dir = \"/out\"\n", PathBuf::from("."))
            .unwrap();
        let path = config.output_path(Path::new("a/b.json"), "matte");
        assert_eq!(path, PathBuf::from("/out/matte.slx"));
    }
}
