use std::path::Path;

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use sso_session::{FileTokenStorage, SsoConfig};

/// Environment prefix; `SSO__HTTP__REQUEST_TIMEOUT=5s` sets `http.request_timeout`
pub const ENV_PREFIX: &str = "SSO__";

/// Values given on the command line, applied last
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub sso_url: Option<String>,
    pub in_memory: bool,
}

impl Overrides {
    fn apply(&self, config: &mut SsoConfig) {
        if let Some(url) = &self.api_url {
            config.api_url.clone_from(url);
        }
        if let Some(url) = &self.sso_url {
            config.sso_url.clone_from(url);
        }
        if self.in_memory {
            config.storage_path = None;
        }
    }
}

/// Built-in defaults: tokens persist under the platform data directory
fn defaults() -> SsoConfig {
    SsoConfig {
        storage_path: FileTokenStorage::default_path(),
        ..SsoConfig::default()
    }
}

fn layered(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::new().merge(Serialized::defaults(defaults()));
    if let Some(path) = path {
        if !path.is_file() {
            bail!("config file does not exist: {}", path.display());
        }
        figment = figment.merge(Yaml::file(path));
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

/// Layered configuration: defaults, then the YAML file, then `SSO__*`
/// environment variables, then command-line overrides. Not validated, so
/// an incomplete configuration can still be printed.
pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<SsoConfig> {
    let mut config: SsoConfig = layered(path)?
        .extract()
        .context("failed to load configuration")?;
    overrides.apply(&mut config);
    Ok(config)
}

/// [`resolve`] followed by validation
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<SsoConfig> {
    let config = resolve(path, overrides)?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    const SAMPLE: &str = r"
api_url: https://api.example.com
sso_url: https://sso.example.com
refresh_timeout: 10s
http:
  request_timeout: 15s
  allow_insecure_http: false
";

    fn write_sample(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("sso.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn sample_document_matches_schema() {
        let config: SsoConfig = serde_saphyr::from_str(SAMPLE).unwrap();
        assert_eq!(config.refresh_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.http.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn yaml_layer_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        let config = load(Some(&path), &Overrides::default()).unwrap();

        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.refresh_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.http.max_body_size, SsoConfig::default().http.max_body_size);
        assert_eq!(config.storage_path, FileTokenStorage::default_path());
    }

    #[test]
    fn cli_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        let overrides = Overrides {
            api_url: Some("https://staging-api.example.com".into()),
            sso_url: None,
            in_memory: true,
        };
        let config = load(Some(&path), &overrides).unwrap();

        assert_eq!(config.api_url, "https://staging-api.example.com");
        assert_eq!(config.sso_url, "https://sso.example.com");
        assert_eq!(config.storage_path, None);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.yaml")), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sso.yaml");
        std::fs::write(&path, "api_url: https://a.example\nsso_url: https://b.example\ntimeout: 3s\n")
            .unwrap();

        assert!(load(Some(&path), &Overrides::default()).is_err());
    }

    #[test]
    fn incomplete_configuration_still_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sso.yaml");
        std::fs::write(&path, "refresh_timeout: 5s\n").unwrap();

        let config = resolve(Some(&path), &Overrides::default()).unwrap();
        assert_eq!(config.refresh_timeout, Some(Duration::from_secs(5)));
        assert!(config.api_url.is_empty());

        let err = load(Some(&path), &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn invalid_urls_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let overrides = Overrides {
            sso_url: Some("sso.example.com".into()),
            ..Overrides::default()
        };

        let err = load(Some(&path), &overrides).unwrap_err();
        assert!(format!("{err:#}").contains("sso_url"));
    }
}
