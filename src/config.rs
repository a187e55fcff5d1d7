use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

use crate::otp::DEFAULT_OTP_TTL_SECS;
use crate::storage::VideosDirSink;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    pub auth: AuthConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    /// Origin of the UI dev server, allowed through CORS when set
    pub dev_server_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingConfig {
    /// Where finished recordings land; platform videos dir when unset
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub email_api_url: String,
    /// Sign-in emails fail with a configuration error until this is set
    pub email_api_key: Option<String>,
    pub email_from: String,
    pub otp_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Capture backend name, resolved by `PlatformFactory`
    pub backend: String,
    /// Synthetic screen names for the simulated backend
    #[serde(default)]
    pub screens: Vec<String>,
}

impl Config {
    /// Load configuration: built-in defaults, then an optional config file,
    /// then `DESKCAST_*` environment overrides (`DESKCAST_SERVICE__HTTP__PORT`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("service.name", "deskcast")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 4830)?
            .set_default("auth.email_api_url", "https://api.resend.com/emails")?
            .set_default("auth.email_from", "Deskcast <sign-in@deskcast.app>")?
            .set_default("auth.otp_ttl_secs", DEFAULT_OTP_TTL_SECS)?
            .set_default("platform.backend", "simulated")?;

        builder = match path {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder.add_source(config::File::with_name("config/deskcast").required(false)),
        };

        let settings = builder
            .add_source(config::Environment::with_prefix("DESKCAST").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }

    pub fn output_dir(&self) -> PathBuf {
        match &self.recording.output_dir {
            Some(dir) => PathBuf::from(dir),
            None => VideosDirSink::default_dir(),
        }
    }

    /// Where the usage ledger document lives.
    pub fn ledger_path(&self) -> PathBuf {
        match dirs::data_dir() {
            Some(data) => data.join("deskcast").join("usage.json"),
            None => PathBuf::from("deskcast-usage.json"),
        }
    }

    pub fn otp_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.auth.otp_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_config_file() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.service.name, "deskcast");
        assert_eq!(config.bind_addr(), "127.0.0.1:4830");
        assert_eq!(config.platform.backend, "simulated");
        assert_eq!(config.auth.otp_ttl_secs, DEFAULT_OTP_TTL_SECS);
        assert!(config.auth.email_api_key.is_none());
        assert!(config.recording.output_dir.is_none());
        assert!(config.platform.screens.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deskcast.toml");
        std::fs::write(
            &path,
            "[service.http]\nbind = \"0.0.0.0\"\nport = 9001\n\n[recording]\noutput_dir = \"/tmp/caps\"\n",
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:9001");
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/caps"));
        // Untouched sections keep their defaults
        assert_eq!(config.service.name, "deskcast");
    }
}
