use reqwest::blocking::Client;
use reqwest::{Certificate, Identity};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::{file_matches, DownloadRequest, Downloader, LookasideError, Prober};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    pub timeout: Duration,
    /// PEM file holding the client certificate and its PKCS#8 key
    pub client_cert: Option<PathBuf>,
    /// PEM bundle of extra trusted CAs
    pub ca_cert: Option<PathBuf>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            client_cert: None,
            ca_cert: None,
        }
    }
}

/// Blocking HTTP access to a lookaside cache
pub struct HttpLookaside {
    client: Client,
}

impl HttpLookaside {
    pub fn new(options: &HttpOptions) -> Result<Self, LookasideError> {
        let mut builder = Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("rpkg/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &options.client_cert {
            let pem = read_pem(path)?;
            let (certs, key) = split_pem(&pem);
            if certs.is_empty() || key.is_empty() {
                return Err(LookasideError::Config(format!(
                    "{} must contain a certificate and a PKCS#8 private key",
                    path.display()
                )));
            }
            let identity = Identity::from_pkcs8_pem(certs.as_bytes(), key.as_bytes())
                .map_err(|e| LookasideError::Config(format!("{}: {}", path.display(), e)))?;
            builder = builder.identity(identity);
        }

        if let Some(path) = &options.ca_cert {
            let pem = read_pem(path)?;
            let bundle = Certificate::from_pem_bundle(pem.as_bytes())
                .map_err(|e| LookasideError::Config(format!("{}: {}", path.display(), e)))?;
            for cert in bundle {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| LookasideError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    fn download_error(url: &str, message: impl Into<String>) -> LookasideError {
        LookasideError::Download {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

fn read_pem(path: &Path) -> Result<String, LookasideError> {
    fs::read_to_string(path).map_err(|source| LookasideError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Splits a combined PEM file into its certificate blocks and its private key block
fn split_pem(pem: &str) -> (String, String) {
    enum Block {
        Outside,
        Certificate,
        Key,
        Other,
    }

    let mut certs = String::new();
    let mut key = String::new();
    let mut block = Block::Outside;

    for line in pem.lines() {
        if line.starts_with("-----BEGIN ") {
            block = if line.contains("PRIVATE KEY") {
                Block::Key
            } else if line.contains("CERTIFICATE") {
                Block::Certificate
            } else {
                Block::Other
            };
        }
        let target = match block {
            Block::Certificate => Some(&mut certs),
            Block::Key => Some(&mut key),
            Block::Outside | Block::Other => None,
        };
        if let Some(target) = target {
            target.push_str(line);
            target.push('\n');
        }
        if line.starts_with("-----END ") {
            block = Block::Outside;
        }
    }
    (certs, key)
}

impl Prober for HttpLookaside {
    fn head_status(&self, url: &str) -> Result<u16, LookasideError> {
        let response = self
            .client
            .head(url)
            .send()
            .map_err(|e| Self::download_error(url, e.to_string()))?;
        let status = response.status().as_u16();
        debug!(%url, status, "HEAD");
        Ok(status)
    }
}

impl Downloader for HttpLookaside {
    fn fetch(&self, url: &str, request: &DownloadRequest) -> Result<(), LookasideError> {
        let destination = &request.destination;
        if file_matches(destination, request.hash_algorithm, &request.hash) {
            debug!(destination = %destination.display(), "Already downloaded, skipping");
            return Ok(());
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Self::download_error(url, e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::download_error(url, format!("HTTP {}", response.status())));
        }

        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_error = |source| LookasideError::Io {
            path: destination.clone(),
            source,
        };
        let mut partial = tempfile::Builder::new()
            .prefix(".rpkg-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(io_error)?;

        let mut hasher = request.hash_algorithm.hasher();
        let mut buf = [0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| Self::download_error(url, e.to_string()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            partial.write_all(&buf[..n]).map_err(io_error)?;
            written += n as u64;
        }
        partial.flush().map_err(io_error)?;

        let actual = hasher.finish();
        if !actual.eq_ignore_ascii_case(request.hash.trim()) {
            // dropping `partial` removes the temp file
            return Err(LookasideError::ChecksumMismatch {
                path: destination.clone(),
                expected: request.hash.clone(),
                actual,
            });
        }

        partial
            .persist(destination)
            .map_err(|e| io_error(e.error))?;
        debug!(destination = %destination.display(), bytes = written, "Download verified");
        Ok(())
    }
}
