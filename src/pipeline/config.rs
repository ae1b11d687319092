//! Pipeline configuration.
//!
//! Settings are read once at startup from a sectioned TOML file whose
//! sections mirror the classic `config.ini` layout (`[paths]`, `[git]`,
//! `[docker]`, `[azure]`, ...). The raw file is deserialised into
//! `Raw*` section structs, required keys are checked, defaults are applied
//! and the result is frozen into a [`PipelineConfig`] that is shared
//! read-only with every stage.
//!
//! Unknown sections and keys are rejected. String values must be quoted,
//! so an unquoted `REPO_PATH = /work/x` carried over from an INI file fails
//! with [`ConfigError::Parse`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default number of completion requests issued by the generator.
pub const DEFAULT_PROMPT_COUNT: usize = 3;
/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Default system message of the fixed conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Assistant is a large language model trained by OpenAI.";
/// Default user message of the fixed conversation.
pub const DEFAULT_USER_PROMPT: &str = "What are the main benefits of using Azure OpenAI?";
/// Artifact directory, relative to `REPO_PATH`.
pub const DEFAULT_OUTPUT_DIR: &str = "dreamweavers/metadata";
/// Compose descriptor, relative to `REPO_PATH`.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yaml";
/// Compose service the post-processing command runs in.
pub const DEFAULT_SERVICE_NAME: &str = "container_service_name";
const DEFAULT_PYTHON: &str = "python3.10";
const DEFAULT_MANIFEST: &str = "requirements.txt";
const DEFAULT_PUSH_BRANCH: &str = "main";
const DEFAULT_DOCKERFILE: &str = "Dockerfile";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has wrongly typed values.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required key is absent or empty.
    #[error("Missing required key {key} in section [{section}]")]
    MissingKey {
        section: &'static str,
        key: &'static str,
    },

    /// A key has a value outside its allowed set.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    paths: Option<RawPaths>,
    git: Option<RawGit>,
    setup: Option<RawSetup>,
    docker: Option<RawDocker>,
    azure: Option<RawAzure>,
    generator: Option<RawGenerator>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
struct RawPaths {
    repo_path: Option<String>,
    local_repo_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
struct RawGit {
    upstream_repo_url: Option<String>,
    upstream_branch: Option<String>,
    push_branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
struct RawSetup {
    python: Option<String>,
    manifest: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
struct RawDocker {
    mode: Option<String>,
    compose_file: Option<String>,
    service_name: Option<String>,
    image_name: Option<String>,
    build_context: Option<String>,
    dockerfile: Option<String>,
    exec_command: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAzure {
    #[serde(rename = "AZURE_API_KEY")]
    api_key: Option<String>,
    #[serde(rename = "AZURE_API_BASE")]
    api_base: Option<String>,
    #[serde(rename = "AZURE_API_VERSION")]
    api_version: Option<String>,
    #[serde(rename = "AZURE_OPENAI_ENDPOINT")]
    openai_endpoint: Option<String>,
    #[serde(rename = "AZURE_OPENAI_API_KEY")]
    openai_api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
struct RawGenerator {
    count: Option<usize>,
    model: Option<String>,
    system_prompt: Option<String>,
    user_prompt: Option<String>,
    output_dir: Option<String>,
    timeout_secs: Option<u64>,
}

/// Upstream and origin settings for the local fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSettings {
    /// URL of the canonical upstream repository.
    pub upstream_url: String,
    /// Upstream branch the fork is rebased onto.
    pub upstream_branch: String,
    /// Branch pushed to `origin` after the rebase.
    pub push_branch: String,
}

/// Dependency installation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSettings {
    /// Python interpreter used to run `pip`.
    pub python: String,
    /// Manifest file name, relative to the local clone.
    pub manifest: String,
}

/// How the container environment is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerMode {
    /// `docker compose up --build -d` against a descriptor file.
    Compose,
    /// Engine API image build followed by a detached container run.
    Direct,
}

impl std::str::FromStr for DockerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compose" => Ok(DockerMode::Compose),
            "direct" => Ok(DockerMode::Direct),
            other => Err(ConfigError::InvalidValue {
                key: "docker.MODE".to_string(),
                message: format!("expected 'compose' or 'direct', got '{other}'"),
            }),
        }
    }
}

impl fmt::Display for DockerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerMode::Compose => write!(f, "compose"),
            DockerMode::Direct => write!(f, "direct"),
        }
    }
}

/// Container environment settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSettings {
    pub mode: DockerMode,
    /// Absolute path of the compose descriptor.
    pub compose_file: PathBuf,
    /// Compose service the post-processing command runs in.
    pub service_name: String,
    /// Image tag built and run in direct mode.
    pub image_name: Option<String>,
    /// Absolute path of the build context in direct mode.
    pub build_context: PathBuf,
    /// Dockerfile name inside the build context.
    pub dockerfile: String,
    /// Post-processing command run inside the environment.
    pub exec_command: Vec<String>,
}

/// API credentials.
///
/// Never exported to the process environment; handed to child processes
/// and containers explicitly through [`AzureCredentials::env_vars`].
#[derive(Clone, PartialEq, Eq)]
pub struct AzureCredentials {
    pub api_key: String,
    pub api_base: String,
    pub api_version: String,
    pub openai_endpoint: String,
    pub openai_api_key: String,
}

impl AzureCredentials {
    /// Environment variables expected by the tools running downstream.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        vec![
            ("AZURE_API_KEY".to_string(), self.api_key.clone()),
            ("AZURE_API_BASE".to_string(), self.api_base.clone()),
            ("AZURE_API_VERSION".to_string(), self.api_version.clone()),
            (
                "AZURE_OPENAI_ENDPOINT".to_string(),
                self.openai_endpoint.clone(),
            ),
            (
                "AZURE_OPENAI_API_KEY".to_string(),
                self.openai_api_key.clone(),
            ),
        ]
    }
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("openai_endpoint", &self.openai_endpoint)
            .field("openai_api_key", &"<redacted>")
            .finish()
    }
}

/// Completion fan-out settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    /// Number of concurrent completion requests.
    pub count: usize,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    /// Absolute directory the `prompt<index>.json` files are written to.
    pub output_dir: PathBuf,
    /// Client-side timeout for each request.
    pub timeout: Duration,
}

/// Immutable configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the project holding the compose file and artifact directory.
    pub repo_path: PathBuf,
    /// Local clone of the fork.
    pub local_repo_path: PathBuf,
    pub git: GitSettings,
    pub setup: SetupSettings,
    pub docker: DockerSettings,
    pub azure: AzureCredentials,
    pub generator: GeneratorSettings,
}

impl PipelineConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if a
    /// required key is missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let config = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let paths = raw.paths.unwrap_or_default();
        let git = raw.git.unwrap_or_default();
        let setup = raw.setup.unwrap_or_default();
        let docker = raw.docker.unwrap_or_default();
        let azure = raw.azure.unwrap_or_default();
        let generator = raw.generator.unwrap_or_default();

        let repo_path = PathBuf::from(required(paths.repo_path, "paths", "REPO_PATH")?);
        let local_repo_path = PathBuf::from(required(
            paths.local_repo_path,
            "paths",
            "LOCAL_REPO_PATH",
        )?);

        let git = GitSettings {
            upstream_url: required(git.upstream_repo_url, "git", "UPSTREAM_REPO_URL")?,
            upstream_branch: required(git.upstream_branch, "git", "UPSTREAM_BRANCH")?,
            push_branch: or_default(git.push_branch, DEFAULT_PUSH_BRANCH),
        };

        let setup = SetupSettings {
            python: or_default(setup.python, DEFAULT_PYTHON),
            manifest: or_default(setup.manifest, DEFAULT_MANIFEST),
        };

        let mode = match docker.mode {
            Some(mode) => mode.parse()?,
            None => DockerMode::Compose,
        };
        let docker = DockerSettings {
            mode,
            compose_file: repo_path.join(or_default(docker.compose_file, DEFAULT_COMPOSE_FILE)),
            service_name: or_default(docker.service_name, DEFAULT_SERVICE_NAME),
            image_name: docker.image_name.filter(|s| !s.trim().is_empty()),
            build_context: repo_path.join(or_default(docker.build_context, ".")),
            dockerfile: or_default(docker.dockerfile, DEFAULT_DOCKERFILE),
            exec_command: docker.exec_command.unwrap_or_else(|| {
                vec!["python".to_string(), "submission_formatting.py".to_string()]
            }),
        };

        let azure = AzureCredentials {
            api_key: required(azure.api_key, "azure", "AZURE_API_KEY")?,
            api_base: required(azure.api_base, "azure", "AZURE_API_BASE")?,
            api_version: required(azure.api_version, "azure", "AZURE_API_VERSION")?,
            openai_endpoint: required(azure.openai_endpoint, "azure", "AZURE_OPENAI_ENDPOINT")?,
            openai_api_key: required(azure.openai_api_key, "azure", "AZURE_OPENAI_API_KEY")?,
        };

        let generator = GeneratorSettings {
            count: generator.count.unwrap_or(DEFAULT_PROMPT_COUNT),
            model: or_default(generator.model, DEFAULT_MODEL),
            system_prompt: or_default(generator.system_prompt, DEFAULT_SYSTEM_PROMPT),
            user_prompt: or_default(generator.user_prompt, DEFAULT_USER_PROMPT),
            output_dir: repo_path.join(or_default(generator.output_dir, DEFAULT_OUTPUT_DIR)),
            timeout: Duration::from_secs(generator.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        };

        Ok(Self {
            repo_path,
            local_repo_path,
            git,
            setup,
            docker,
            azure,
            generator,
        })
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator.count == 0 {
            return Err(ConfigError::ValidationFailed(
                "generator.COUNT must be greater than 0".to_string(),
            ));
        }

        if self.generator.timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "generator.TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.docker.exec_command.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "docker.EXEC_COMMAND cannot be empty".to_string(),
            ));
        }

        if self.docker.mode == DockerMode::Direct && self.docker.image_name.is_none() {
            return Err(ConfigError::MissingKey {
                section: "docker",
                key: "IMAGE_NAME",
            });
        }

        Ok(())
    }

    /// The URL completion requests are posted to.
    pub fn completions_url(&self) -> String {
        format!(
            "{}/completions",
            self.azure.openai_endpoint.trim_end_matches('/')
        )
    }
}

fn required(
    value: Option<String>,
    section: &'static str,
    key: &'static str,
) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingKey { section, key })
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[paths]
REPO_PATH = "/work/dreamweaver"
LOCAL_REPO_PATH = "/work/fork"

[git]
UPSTREAM_REPO_URL = "https://github.com/example-user/example-repo.git"
UPSTREAM_BRANCH = "main"

[azure]
AZURE_API_KEY = "key-1"
AZURE_API_BASE = "https://example.openai.azure.com"
AZURE_API_VERSION = "2024-02-01"
AZURE_OPENAI_ENDPOINT = "https://example.openai.azure.com/openai/"
AZURE_OPENAI_API_KEY = "key-2"
"#;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.repo_path, PathBuf::from("/work/dreamweaver"));
        assert_eq!(config.local_repo_path, PathBuf::from("/work/fork"));
        assert_eq!(config.git.upstream_branch, "main");
        assert_eq!(config.git.push_branch, "main");
        assert_eq!(config.setup.python, "python3.10");
        assert_eq!(config.setup.manifest, "requirements.txt");
        assert_eq!(config.docker.mode, DockerMode::Compose);
        assert_eq!(
            config.docker.compose_file,
            PathBuf::from("/work/dreamweaver/docker-compose.yaml")
        );
        assert_eq!(config.docker.service_name, "container_service_name");
        assert_eq!(
            config.docker.exec_command,
            vec!["python", "submission_formatting.py"]
        );
        assert_eq!(config.generator.count, 3);
        assert_eq!(config.generator.model, "gpt-3.5-turbo");
        assert_eq!(
            config.generator.output_dir,
            PathBuf::from("/work/dreamweaver/dreamweavers/metadata")
        );
        assert_eq!(config.generator.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_completions_url_strips_trailing_slash() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(
            config.completions_url(),
            "https://example.openai.azure.com/openai/completions"
        );
    }

    #[test]
    fn test_missing_required_key_fails() {
        let text = MINIMAL.replace("UPSTREAM_BRANCH = \"main\"\n", "");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingKey {
                section: "git",
                key: "UPSTREAM_BRANCH"
            }
        ));
    }

    #[test]
    fn test_empty_required_value_counts_as_missing() {
        let text = MINIMAL.replace("AZURE_OPENAI_API_KEY = \"key-2\"", "AZURE_OPENAI_API_KEY = \"  \"");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingKey {
                section: "azure",
                key: "AZURE_OPENAI_API_KEY"
            }
        ));
    }

    #[test]
    fn test_missing_section_fails() {
        let err = PipelineConfig::from_toml_str("[paths]\nREPO_PATH = \"/x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { section: "paths", key: "LOCAL_REPO_PATH" }));
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let text = format!("{MINIMAL}\n[docker]\nMODE = \"swarm\"\n");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_direct_mode_requires_image() {
        let text = format!("{MINIMAL}\n[docker]\nMODE = \"direct\"\n");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingKey {
                section: "docker",
                key: "IMAGE_NAME"
            }
        ));

        let text = format!(
            "{MINIMAL}\n[docker]\nMODE = \"Direct\"\nIMAGE_NAME = \"dw:latest\"\nBUILD_CONTEXT = \"docker\"\n"
        );
        let config = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.docker.mode, DockerMode::Direct);
        assert_eq!(config.docker.image_name.as_deref(), Some("dw:latest"));
        assert_eq!(
            config.docker.build_context,
            PathBuf::from("/work/dreamweaver/docker")
        );
    }

    #[test]
    fn test_zero_count_rejected() {
        let text = format!("{MINIMAL}\n[generator]\nCOUNT = 0\n");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    }

    #[test]
    fn test_generator_overrides() {
        let text = format!(
            "{MINIMAL}\n[generator]\nCOUNT = 5\nMODEL = \"gpt-4o\"\nOUTPUT_DIR = \"/tmp/out\"\nTIMEOUT_SECS = 10\n"
        );
        let config = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.generator.count, 5);
        assert_eq!(config.generator.model, "gpt-4o");
        assert_eq!(config.generator.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.generator.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_credentials_are_redacted_in_debug() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        let debug = format!("{:?}", config.azure);
        assert!(!debug.contains("key-1"));
        assert!(!debug.contains("key-2"));
        assert!(debug.contains("2024-02-01"));
    }

    #[test]
    fn test_env_vars_cover_all_credentials() {
        let config = PipelineConfig::from_toml_str(MINIMAL).unwrap();
        let vars = config.azure.env_vars();
        let names: Vec<&str> = vars.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "AZURE_API_KEY",
                "AZURE_API_BASE",
                "AZURE_API_VERSION",
                "AZURE_OPENAI_ENDPOINT",
                "AZURE_OPENAI_API_KEY"
            ]
        );
        assert_eq!(vars[4].1, "key-2");
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dreamweaver.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.git.upstream_url, "https://github.com/example-user/example-repo.git");
    }

    #[test]
    fn test_misspelled_optional_key_rejected() {
        let text = format!("{MINIMAL}\n[generator]\nTIMEOUT = 5\n");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
        assert!(err.to_string().contains("TIMEOUT"));

        let text = format!("{MINIMAL}\n[generator]\nMODEL_NAME = \"gpt-4o\"\n");
        assert!(matches!(
            PipelineConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_section_and_azure_key_rejected() {
        let text = format!("{MINIMAL}\n[dockr]\nMODE = \"compose\"\n");
        assert!(matches!(
            PipelineConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));

        let text = MINIMAL.replace("AZURE_API_KEY = \"key-1\"", "AZURE_API_KEY = \"key-1\"\nAZURE_KEY = \"x\"");
        assert!(matches!(
            PipelineConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unquoted_ini_value_fails_to_parse() {
        let text = MINIMAL.replace("REPO_PATH = \"/work/dreamweaver\"", "REPO_PATH = /work/dreamweaver");
        assert!(matches!(
            PipelineConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }
}
