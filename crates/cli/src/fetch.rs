//! Remote archive retrieval over HTTP(S) with basic auth.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use flex_core::config::FetchConfig;
use flex_core::{Error, Result};
use flex_ingestion::ArchiveKind;
use reqwest::blocking::Client;
use tracing::{debug, info};

/// Credentials and endpoint for one archive server.
pub struct Remote {
    client: Client,
    base: String,
    user: String,
    password: String,
}

impl Remote {
    /// Build a client for `host`. The password comes from the environment
    /// variable named in `config.password_env` (a `.env` file is honoured),
    /// otherwise from a hidden prompt.
    pub fn connect(host: &str, port: Option<u16>, user: &str, config: &FetchConfig) -> Result<Self> {
        let password = resolve_password(&config.password_env, user, host)?;
        let client = Client::builder()
            .build()
            .map_err(|e| Error::connection(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base: base_url(&config.scheme, host, port.unwrap_or(config.port)),
            user: user.to_string(),
            password,
        })
    }

    /// Full URL of a remote path.
    pub fn url(&self, remote_path: &str) -> String {
        format!("{}/{}", self.base, remote_path.trim_start_matches('/'))
    }

    /// Download the archive at `remote_path` into `staging`, keeping its
    /// file name. Unsupported archive kinds fail before any transfer.
    pub fn fetch_archive(&self, remote_path: &str, staging: &Path) -> Result<PathBuf> {
        let name = remote_file_name(remote_path)?;
        ArchiveKind::from_path(Path::new(name))?;
        let dest = staging.join(name);
        self.download(remote_path, &dest)?;
        Ok(dest)
    }

    /// Download `remote_path` into `dest`. No retries.
    fn download(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        let url = self.url(remote_path);
        debug!(%url, "requesting");
        let mut response = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::connection(format!("{url}: {e}")))?;

        let mut file = BufWriter::new(File::create(dest)?);
        let bytes = response
            .copy_to(&mut file)
            .map_err(|e| Error::connection(format!("{url}: {e}")))?;
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        info!(%url, bytes, dest = %dest.display(), "downloaded");
        Ok(bytes)
    }
}

fn resolve_password(env_name: &str, user: &str, host: &str) -> Result<String> {
    dotenvy::dotenv().ok();
    if let Ok(password) = std::env::var(env_name) {
        return Ok(password);
    }
    rpassword::prompt_password(format!("password for {user}@{host}: ")).map_err(Error::from)
}

/// `scheme://host[:port]`, omitting the scheme's default port.
pub fn base_url(scheme: &str, host: &str, port: u16) -> String {
    match (scheme, port) {
        ("https", 443) | ("http", 80) => format!("{scheme}://{host}"),
        _ => format!("{scheme}://{host}:{port}"),
    }
}

/// Basename of a remote path, used for the local archive name.
pub fn remote_file_name(remote_path: &str) -> Result<&str> {
    remote_path
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::config(format!("remote path {remote_path:?} has no file name")))
}
