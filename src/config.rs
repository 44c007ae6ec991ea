use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr, time::Duration};
use url::Url;
use uuid::Uuid;

/// Longest signed-URL lifetime accepted; GCS V4 signatures cap out at 7 days.
pub const MAX_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const DEFAULT_ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://your-server-ip:3000",
    "https://your-domain.com",
];

/// Which blob store backs the proxy.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Google Cloud Storage bucket.
    Gcs,
    /// Amazon S3 or an S3-compatible bucket.
    S3,
    /// Process-local store, for development and tests.
    Memory,
}

/// Key for HMAC-signing in-memory download links. Never printed.
#[derive(Clone)]
pub struct SigningSecret(pub Vec<u8>);

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(***)")
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub bucket: String,
    pub credentials_path: String,
    pub url_ttl: Duration,
    pub call_timeout: Duration,
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: Option<usize>,
    pub public_url: Url,
    pub signing_secret: SigningSecret,
    pub verify_writes: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Storage proxy for a cloud image bucket")]
pub struct Args {
    /// Host to bind to (overrides STORAGE_PROXY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STORAGE_PROXY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Blob store backend (overrides STORAGE_PROXY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Bucket holding the objects (overrides BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Service account key file for GCS (overrides GOOGLE_APPLICATION_CREDENTIALS)
    #[arg(long)]
    pub credentials: Option<String>,

    /// Lifetime of generated download URLs (overrides STORAGE_PROXY_URL_TTL_SECS)
    #[arg(long)]
    pub url_ttl_secs: Option<u64>,

    /// Deadline for each backend call (overrides STORAGE_PROXY_CALL_TIMEOUT_SECS)
    #[arg(long)]
    pub call_timeout_secs: Option<u64>,

    /// CORS origins, comma separated (overrides STORAGE_PROXY_ALLOWED_ORIGINS)
    #[arg(long, value_delimiter = ',')]
    pub allowed_origins: Option<Vec<String>>,

    /// Reject request bodies above this size (overrides STORAGE_PROXY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Externally reachable base URL of this service (overrides STORAGE_PROXY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Re-read object metadata after every upload (overrides STORAGE_PROXY_VERIFY_WRITES)
    #[arg(long)]
    pub verify_writes: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge parsed CLI args over values found through `lookup`.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = lookup("STORAGE_PROXY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "STORAGE_PROXY_PORT")?.unwrap_or(8000);
        let env_backend = match lookup("STORAGE_PROXY_BACKEND") {
            Some(value) => <BackendKind as ValueEnum>::from_str(&value, true)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("parsing STORAGE_PROXY_BACKEND value `{}`", value))?,
            None => BackendKind::Gcs,
        };
        let env_bucket = lookup("BUCKET_NAME").unwrap_or_else(|| "my-poc-images-bucket".into());
        let env_credentials =
            lookup("GOOGLE_APPLICATION_CREDENTIALS").unwrap_or_else(|| "key.json".into());
        let env_ttl = parse_var(&lookup, "STORAGE_PROXY_URL_TTL_SECS")?.unwrap_or(900);
        let env_timeout = parse_var(&lookup, "STORAGE_PROXY_CALL_TIMEOUT_SECS")?.unwrap_or(30);
        let env_origins = lookup("STORAGE_PROXY_ALLOWED_ORIGINS").map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        let env_max_upload = parse_var(&lookup, "STORAGE_PROXY_MAX_UPLOAD_BYTES")?;
        let env_public_url = lookup("STORAGE_PROXY_PUBLIC_URL");
        let env_verify = parse_var(&lookup, "STORAGE_PROXY_VERIFY_WRITES")?.unwrap_or(false);

        // --- Merge ---
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);

        let url_ttl = Duration::from_secs(args.url_ttl_secs.unwrap_or(env_ttl));
        if url_ttl.is_zero() || url_ttl > MAX_URL_TTL {
            bail!(
                "download URL ttl must be between 1s and {}s, got {}s",
                MAX_URL_TTL.as_secs(),
                url_ttl.as_secs()
            );
        }

        let call_timeout = Duration::from_secs(args.call_timeout_secs.unwrap_or(env_timeout));
        if call_timeout.is_zero() {
            bail!("backend call timeout must be at least 1s");
        }

        let public_url_raw = args
            .public_url
            .or(env_public_url)
            .unwrap_or_else(|| format!("http://{}:{}", host, port));
        let public_url = Url::parse(&public_url_raw)
            .with_context(|| format!("parsing public url `{}`", public_url_raw))?;

        let signing_secret = match lookup("STORAGE_PROXY_SIGNING_SECRET") {
            Some(secret) if !secret.is_empty() => SigningSecret(secret.into_bytes()),
            _ => SigningSecret(
                [Uuid::new_v4().into_bytes(), Uuid::new_v4().into_bytes()].concat(),
            ),
        };

        Ok(Self {
            host,
            port,
            backend: args.backend.unwrap_or(env_backend),
            bucket: args.bucket.unwrap_or(env_bucket),
            credentials_path: args.credentials.unwrap_or(env_credentials),
            url_ttl,
            call_timeout,
            allowed_origins: args
                .allowed_origins
                .or(env_origins)
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.map(String::from).into()),
            max_upload_bytes: args.max_upload_bytes.or(env_max_upload),
            public_url,
            signing_secret,
            verify_writes: args.verify_writes || env_verify,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("storage-proxy").chain(argv.iter().copied())).unwrap()
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env_or_flags() {
        let cfg = AppConfig::resolve(args(&[]), |_| None).unwrap();

        assert_eq!(cfg.addr(), "0.0.0.0:8000");
        assert_eq!(cfg.backend, BackendKind::Gcs);
        assert_eq!(cfg.bucket, "my-poc-images-bucket");
        assert_eq!(cfg.credentials_path, "key.json");
        assert_eq!(cfg.url_ttl, Duration::from_secs(900));
        assert_eq!(cfg.call_timeout, Duration::from_secs(30));
        assert_eq!(cfg.allowed_origins.len(), 4);
        assert_eq!(cfg.max_upload_bytes, None);
        assert_eq!(cfg.public_url.as_str(), "http://0.0.0.0:8000/");
        assert_eq!(cfg.signing_secret.0.len(), 32);
        assert!(!cfg.verify_writes);
    }

    #[test]
    fn env_values_are_used() {
        let env = env_of(&[
            ("STORAGE_PROXY_PORT", "9100"),
            ("STORAGE_PROXY_BACKEND", "S3"),
            ("BUCKET_NAME", "gallery"),
            ("STORAGE_PROXY_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("STORAGE_PROXY_MAX_UPLOAD_BYTES", "1048576"),
            ("STORAGE_PROXY_SIGNING_SECRET", "s3cr3t"),
            ("STORAGE_PROXY_VERIFY_WRITES", "true"),
        ]);
        let cfg = AppConfig::resolve(args(&[]), env).unwrap();

        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.backend, BackendKind::S3);
        assert_eq!(cfg.bucket, "gallery");
        assert_eq!(cfg.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(cfg.max_upload_bytes, Some(1_048_576));
        assert_eq!(cfg.signing_secret.0, b"s3cr3t");
        assert!(cfg.verify_writes);
    }

    #[test]
    fn flags_override_env() {
        let env = env_of(&[
            ("STORAGE_PROXY_HOST", "10.0.0.1"),
            ("STORAGE_PROXY_BACKEND", "gcs"),
            ("BUCKET_NAME", "from-env"),
        ]);
        let cfg = AppConfig::resolve(
            args(&[
                "--host",
                "127.0.0.1",
                "--backend",
                "memory",
                "--bucket",
                "from-flag",
                "--allowed-origins",
                "http://x.test,http://y.test",
                "--public-url",
                "https://gallery.example.com",
            ]),
            env,
        )
        .unwrap();

        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.bucket, "from-flag");
        assert_eq!(cfg.allowed_origins, vec!["http://x.test", "http://y.test"]);
        assert_eq!(cfg.public_url.as_str(), "https://gallery.example.com/");
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = AppConfig::resolve(args(&[]), env_of(&[("STORAGE_PROXY_PORT", "eighty")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("STORAGE_PROXY_PORT"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = AppConfig::resolve(args(&[]), env_of(&[("STORAGE_PROXY_BACKEND", "ftp")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("STORAGE_PROXY_BACKEND"));
    }

    #[test]
    fn ttl_and_timeout_bounds() {
        assert!(AppConfig::resolve(args(&["--url-ttl-secs", "0"]), |_| None).is_err());
        assert!(AppConfig::resolve(args(&["--url-ttl-secs", "604801"]), |_| None).is_err());
        assert!(AppConfig::resolve(args(&["--url-ttl-secs", "604800"]), |_| None).is_ok());
        assert!(AppConfig::resolve(args(&["--call-timeout-secs", "0"]), |_| None).is_err());
    }

    #[test]
    fn secret_is_not_printed() {
        let env = env_of(&[("STORAGE_PROXY_SIGNING_SECRET", "hunter2")]);
        let cfg = AppConfig::resolve(args(&[]), env).unwrap();
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
