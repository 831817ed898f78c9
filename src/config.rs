use std::{collections::HashMap, io, path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use config::{Config as ConfigBuilder, Environment};
use secrecy::SecretString;
use serde::Deserialize;

use crate::dokploy_client::DEFAULT_TIMEOUT;

const ENV_PREFIX: &str = "DOKPLOY";
const ENV_FILES: [&str; 2] = [".env.local", ".env"];

#[derive(Debug, Deserialize)]
struct RawSettings {
    url: Option<String>,
    api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Connection settings, built once at startup.
#[derive(Debug)]
pub struct Settings {
    pub url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

/// Read `DOKPLOY_*` pairs from a dotenv file. A missing file is not an
/// error; an unreadable one is.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = match dotenvy::from_filename_iter(path) {
        Ok(iter) => iter,
        Err(dotenvy::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.with_context(|| format!("failed to parse {}", path.display()))?;
        if key.starts_with(ENV_PREFIX) {
            vars.insert(key, value);
        }
    }
    Ok(vars)
}

/// Merge the dotenv files found in `dir`; `.env.local` wins over `.env`.
pub fn read_env_files(dir: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    // later files are lower priority
    for file in ENV_FILES.iter().rev() {
        vars.extend(read_env_file(&dir.join(file))?);
    }
    Ok(vars)
}

impl Settings {
    /// Layer `.env.local`/`.env` from the working directory, then the
    /// process environment, then the command line. Dotenv files are read,
    /// never exported.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let file_vars = read_env_files(Path::new("."))?;
        Self::build(
            file_vars,
            Environment::with_prefix(ENV_PREFIX),
            overrides,
        )
    }

    /// Same layering as [`Settings::load`] with both env layers given as maps.
    pub fn from_sources(
        file_vars: HashMap<String, String>,
        process_vars: HashMap<String, String>,
        overrides: &Overrides,
    ) -> Result<Self> {
        Self::build(
            file_vars,
            Environment::with_prefix(ENV_PREFIX).source(Some(process_vars)),
            overrides,
        )
    }

    fn build(
        file_vars: HashMap<String, String>,
        process: Environment,
        overrides: &Overrides,
    ) -> Result<Self> {
        let raw: RawSettings = ConfigBuilder::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).source(Some(file_vars)))
            .add_source(process)
            .set_override_option("url", overrides.url.clone())?
            .set_override_option("api_key", overrides.api_key.clone())?
            .set_override_option("timeout_secs", overrides.timeout_secs)?
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        let url = raw.url.map(|s| s.trim().to_string()).unwrap_or_default();
        if url.is_empty() {
            bail!("Dokploy URL is required (--url or DOKPLOY_URL)");
        }
        let api_key = raw.api_key.map(|s| s.trim().to_string()).unwrap_or_default();
        if api_key.is_empty() {
            bail!("Dokploy API key is required (--key or DOKPLOY_API_KEY)");
        }
        if raw.timeout_secs == 0 {
            bail!("timeout must be at least one second");
        }

        Ok(Self {
            url,
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(raw.timeout_secs),
        })
    }
}
