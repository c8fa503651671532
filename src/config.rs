// ABOUTME: Connection settings and credential discovery with precedence chain
// ABOUTME: CLI flag → YAML settings file → environment variable

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Static connection parameters of one service client.
///
/// Set once at client construction and never mutated afterwards.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_scheme() -> String {
    "https".into()
}

fn default_verify_tls() -> bool {
    true
}

impl Connection {
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Self {
        Connection {
            host: host.into(),
            scheme: default_scheme(),
            token: token.into(),
            cookie: None,
            verify_tls: true,
            timeout_secs: None,
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Root URL of the service, without trailing slash.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host.trim_end_matches('/'))
    }

    /// Configured cookie, treating an empty string as absent.
    pub fn session_cookie(&self) -> Option<&str> {
        self.cookie.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceKind {
    Growi,
    Knowledge,
}

impl ServiceKind {
    fn env_prefix(self) -> &'static str {
        match self {
            ServiceKind::Growi => "GROWI",
            ServiceKind::Knowledge => "KNOWLEDGE",
        }
    }

    fn token_var(self) -> &'static str {
        match self {
            ServiceKind::Growi => "GROWI_ACCESS_TOKEN",
            ServiceKind::Knowledge => "KNOWLEDGE_PRIVATE_TOKEN",
        }
    }
}

/// Partial connection as it appears in the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub verify_tls: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub growi: ConnectionSettings,
    #[serde(default)]
    pub knowledge: ConnectionSettings,
}

impl Settings {
    pub fn for_service(&self, service: ServiceKind) -> &ConnectionSettings {
        match service {
            ServiceKind::Growi => &self.growi,
            ServiceKind::Knowledge => &self.knowledge,
        }
    }
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };

    let content = fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid settings file {}: {}", path.display(), e)))
}

/// Merges CLI overrides, the settings file and the environment.
pub fn resolve_connection(
    service: ServiceKind,
    settings: &Settings,
    overrides: &ConnectionSettings,
) -> Result<Connection> {
    let file = settings.for_service(service);
    let prefix = service.env_prefix();

    let host = pick(&overrides.host, &file.host, &format!("{}_HOST", prefix)).ok_or_else(|| {
        Error::Config(format!(
            "No host for {:?}. Provide via --host, settings file, or {}_HOST env var",
            service, prefix
        ))
    })?;

    let token = pick(&overrides.token, &file.token, service.token_var()).ok_or_else(|| {
        Error::Auth(format!(
            "No access token found. Provide via --token, settings file, or {} env var",
            service.token_var()
        ))
    })?;

    let cookie = pick(&overrides.cookie, &file.cookie, &format!("{}_COOKIE", prefix));

    Ok(Connection {
        host,
        scheme: overrides
            .scheme
            .clone()
            .or_else(|| file.scheme.clone())
            .unwrap_or_else(default_scheme),
        token,
        cookie,
        verify_tls: overrides.verify_tls.or(file.verify_tls).unwrap_or(true),
        timeout_secs: overrides.timeout_secs.or(file.timeout_secs),
    })
}

fn pick(flag: &Option<String>, file: &Option<String>, var: &str) -> Option<String> {
    [flag, file]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty())
        .cloned()
        .or_else(|| env::var(var).ok().filter(|v| !v.is_empty()))
}
