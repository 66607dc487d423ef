use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub enum PdsMode {
    Single,
    Multi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PdsConfig {
    pub hostname: String,
    pub port: u16,
    pub public_url: String,
    #[serde(default = "default_plc_url")]
    pub plc_directory_url: String,
    pub handle_domain: String,
    pub jwt: JwtConfig,
    /// HKDF input key material used to derive the AES-256-GCM key that
    /// wraps signing keys and rotation keys at rest. Must be at least 32
    /// bytes; startup-fatal if shorter.
    pub key_encryption_secret: String,
    pub database: DatabaseConfig,
    pub blobs: BlobsConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default = "default_mode")]
    pub mode: PdsMode,
    /// URL of the AppView service for proxying unknown XRPC methods.
    #[serde(default)]
    pub appview_url: Option<String>,
    /// DID of the AppView service (used as JWT audience in service auth).
    #[serde(default)]
    pub appview_did: Option<String>,
    /// URL of the relay/BGS to notify via requestCrawl after writes.
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Optional TLS configuration for automatic Let's Encrypt certificates.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default)]
    pub social_login: SocialLoginConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobsConfig {
    pub path: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Domains to obtain certificates for, e.g. ["pds.example.com"]
    pub domains: Vec<String>,
    /// ACME contact email, e.g. "admin@example.com"
    pub contact_email: String,
    /// Directory to cache certificates (default: "data/certs")
    #[serde(default = "default_cert_cache")]
    pub cert_cache: String,
    /// Use Let's Encrypt production directory (default: false = staging)
    #[serde(default)]
    pub production: bool,
}

/// Client credentials for the social-login collaborator. The core never
/// performs the OAuth dance itself; it only consumes the verified
/// `(provider, provider_id, email, suggested_username)` tuple these
/// providers hand back to the server crate's login callback.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SocialLoginConfig {
    pub github: Option<OAuthClientConfig>,
    pub google: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Tuning for this server's own OAuth 2.0 authorization server (C10),
/// distinct from the social-login client config above.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_par_ttl")]
    pub par_ttl_secs: i64,
    #[serde(default = "default_code_ttl")]
    pub code_ttl_secs: i64,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: i64,
    #[serde(default = "default_dpop_max_age")]
    pub dpop_max_age_secs: i64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            par_ttl_secs: default_par_ttl(),
            code_ttl_secs: default_code_ttl(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
            dpop_max_age_secs: default_dpop_max_age(),
        }
    }
}

fn default_par_ttl() -> i64 {
    60
}

fn default_code_ttl() -> i64 {
    600
}

fn default_access_ttl() -> i64 {
    15 * 60
}

fn default_refresh_ttl() -> i64 {
    90 * 24 * 60 * 60
}

fn default_dpop_max_age() -> i64 {
    300
}

fn default_cert_cache() -> String {
    "data/certs".to_string()
}

fn default_mode() -> PdsMode {
    PdsMode::Single
}

fn default_plc_url() -> String {
    "https://plc.directory".to_string()
}

fn default_max_blob_size() -> usize {
    5 * 1024 * 1024
}

impl PdsConfig {
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("LEAF_PDS_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), figment::Error> {
        if self.jwt.access_secret.len() < 32 {
            return Err(figment::Error::from(
                "jwt.access_secret must be at least 32 characters".to_string(),
            ));
        }
        if self.key_encryption_secret.len() < 32 {
            return Err(figment::Error::from(
                "key_encryption_secret must be at least 32 characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Maximum size, in bytes, of a single repository record value.
pub const MAX_RECORD_SIZE: usize = 150 * 1024;
