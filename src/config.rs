use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const ENV_API_ENDPOINT: &str = "CLOUDFLARE_API_ENDPOINT";
pub const ENV_API_KEY: &str = "CLOUDFLARE_API_KEY";
pub const ENV_EMAIL: &str = "CLOUDFLARE_EMAIL";
pub const ENV_ZONE_ID: &str = "CLOUDFLARE_ZONE_ID";
pub const ENV_DNS_NAME: &str = "CLOUDFLARE_DNS_NAME";
pub const ENV_DNS_RECORD_ID: &str = "CLOUDFLARE_DNS_RECORD_ID";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cloudflare: CloudflareConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound for a single call to the DNS provider.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// The single DNS record this relay keeps up to date.
///
/// Missing values are kept as empty strings; they only surface as a bad
/// request to the provider, never as a startup failure.
#[derive(Clone, Default, Deserialize)]
pub struct CloudflareConfig {
    #[serde(default)]
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub dns_name: String,
    #[serde(default)]
    pub dns_record_id: String,
}

// Keep the API key out of logs.
impl fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("api_key", &"<REDACTED>")
            .field("email", &self.email)
            .field("zone_id", &self.zone_id)
            .field("dns_name", &self.dns_name)
            .field("dns_record_id", &self.dns_record_id)
            .finish()
    }
}

impl CloudflareConfig {
    /// `<endpoint>/zones/<zone_id>/dns_records/<record_id>`, with exactly one
    /// slash between segments.
    pub fn record_url(&self) -> String {
        format!(
            "{}/zones/{}/dns_records/{}",
            self.api_endpoint.trim_end_matches('/'),
            self.zone_id.trim_matches('/'),
            self.dns_record_id.trim_matches('/'),
        )
    }

    pub fn missing_keys(&self) -> Vec<&'static str> {
        [
            (ENV_API_ENDPOINT, &self.api_endpoint),
            (ENV_API_KEY, &self.api_key),
            (ENV_EMAIL, &self.email),
            (ENV_ZONE_ID, &self.zone_id),
            (ENV_DNS_NAME, &self.dns_name),
            (ENV_DNS_RECORD_ID, &self.dns_record_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| key)
        .collect()
    }

    fn fields_mut(&mut self) -> [(&'static str, &mut String); 6] {
        [
            (ENV_API_ENDPOINT, &mut self.api_endpoint),
            (ENV_API_KEY, &mut self.api_key),
            (ENV_EMAIL, &mut self.email),
            (ENV_ZONE_ID, &mut self.zone_id),
            (ENV_DNS_NAME, &mut self.dns_name),
            (ENV_DNS_RECORD_ID, &mut self.dns_record_id),
        ]
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Server defaults plus whatever the lookup yields for the `CLOUDFLARE_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_env(lookup);
        config
    }

    /// Overrides Cloudflare settings with every non-empty variable the lookup
    /// knows about. A blank export leaves the file value in place.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, field) in self.cloudflare.fields_mut() {
            match lookup(key) {
                Some(value) if !value.is_empty() => *field = value,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn cloudflare(endpoint: &str, zone_id: &str, record_id: &str) -> CloudflareConfig {
        CloudflareConfig {
            api_endpoint: endpoint.to_string(),
            zone_id: zone_id.to_string(),
            dns_record_id: record_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn reads_all_cloudflare_variables() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_API_ENDPOINT, "https://api.cloudflare.com/client/v4"),
            (ENV_API_KEY, "secret"),
            (ENV_EMAIL, "admin@example.com"),
            (ENV_ZONE_ID, "zone123"),
            (ENV_DNS_NAME, "home.example.com"),
            (ENV_DNS_RECORD_ID, "record456"),
        ]));

        assert_eq!(config.cloudflare.api_endpoint, "https://api.cloudflare.com/client/v4");
        assert_eq!(config.cloudflare.api_key, "secret");
        assert_eq!(config.cloudflare.email, "admin@example.com");
        assert_eq!(config.cloudflare.zone_id, "zone123");
        assert_eq!(config.cloudflare.dns_name, "home.example.com");
        assert_eq!(config.cloudflare.dns_record_id, "record456");
        assert!(config.cloudflare.missing_keys().is_empty());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn missing_variables_become_empty_strings() {
        let config = Config::from_lookup(lookup_from(&[(ENV_ZONE_ID, "zone123")]));

        assert_eq!(config.cloudflare.api_key, "");
        assert_eq!(config.cloudflare.dns_record_id, "");
        assert_eq!(
            config.cloudflare.missing_keys(),
            vec![ENV_API_ENDPOINT, ENV_API_KEY, ENV_EMAIL, ENV_DNS_NAME, ENV_DNS_RECORD_ID]
        );
    }

    #[test]
    fn record_url_joins_segments() {
        let cf = cloudflare("https://api.cloudflare.com/client/v4", "zone123", "record456");
        assert_eq!(
            cf.record_url(),
            "https://api.cloudflare.com/client/v4/zones/zone123/dns_records/record456"
        );
    }

    #[test]
    fn record_url_ignores_stray_slashes() {
        let cf = cloudflare("https://api.cloudflare.com/client/v4//", "/zone123/", "record456/");
        assert_eq!(
            cf.record_url(),
            "https://api.cloudflare.com/client/v4/zones/zone123/dns_records/record456"
        );
    }

    #[test]
    fn debug_hides_api_key() {
        let cf = CloudflareConfig {
            api_key: "super-secret-token".to_string(),
            ..Default::default()
        };
        let printed = format!("{:?}", cf);
        assert!(!printed.contains("super-secret-token"));
        assert!(printed.contains("<REDACTED>"));
    }

    #[test]
    fn parses_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9090

            [cloudflare]
            api_endpoint = "https://api.cloudflare.com/client/v4"
            zone_id = "zone123"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.cloudflare.zone_id, "zone123");
        assert_eq!(config.cloudflare.email, "");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            [cloudflare]
            zone_id = "from-file"
            dns_name = "file.example.com"
            "#,
        )
        .unwrap();

        config.apply_env(lookup_from(&[(ENV_ZONE_ID, "from-env")]));

        assert_eq!(config.cloudflare.zone_id, "from-env");
        assert_eq!(config.cloudflare.dns_name, "file.example.com");
    }

    #[test]
    fn blank_environment_keeps_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            [cloudflare]
            api_key = "from-file"
            zone_id = "zone123"
            "#,
        )
        .unwrap();

        config.apply_env(lookup_from(&[(ENV_API_KEY, ""), (ENV_ZONE_ID, "")]));

        assert_eq!(config.cloudflare.api_key, "from-file");
        assert_eq!(config.cloudflare.zone_id, "zone123");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/relay.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/relay.toml"));
    }
}
