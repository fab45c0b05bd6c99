//! Merchant client certificates for mutual TLS.
//!
//! Refund, reverse and the statement downloads must present the merchant's
//! client certificate in production. A [`CertificateSource`] says where the
//! PEM material comes from; [`CertificateStore`] holds the TLS-enabled HTTP
//! client built from it and can be attached eagerly or lazily on first use.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

/// Errors raised while loading or installing a client certificate.
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    /// The endpoint needs a certificate and none is configured.
    #[error("a client certificate is required for `{operation}` but none is configured")]
    Missing {
        /// Operation that needed the certificate.
        operation: String,
    },

    /// A PEM file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The certificate/key pair is not valid PEM.
    #[error("invalid client certificate or key: {0}")]
    Identity(#[source] reqwest::Error),

    /// The root CA is not valid PEM.
    #[error("invalid root certificate: {0}")]
    RootCa(#[source] reqwest::Error),

    /// The TLS-enabled HTTP client could not be built.
    #[error("failed to build TLS client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Where one piece of PEM material comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum PemSource {
    /// In-memory PEM bytes.
    Content(Vec<u8>),
    /// A PEM file on disk, read when the certificate is attached.
    File(PathBuf),
}

impl PemSource {
    async fn load(&self) -> Result<Vec<u8>, CertificateError> {
        match self {
            Self::Content(bytes) => Ok(bytes.clone()),
            Self::File(path) => tokio::fs::read(path).await.map_err(|source| CertificateError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

impl fmt::Debug for PemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(bytes) => write!(f, "Content(<{} bytes>)", bytes.len()),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Client certificate, private key and optional root CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSource {
    /// PEM-encoded client certificate chain.
    pub cert: PemSource,
    /// PEM-encoded private key (PKCS#8, PKCS#1 or SEC1).
    pub key: PemSource,
    /// Extra trusted root CA, added on top of the platform roots.
    pub root_ca: Option<PemSource>,
}

impl CertificateSource {
    /// Builds a source from in-memory PEM.
    #[must_use]
    pub fn from_pem(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            cert: PemSource::Content(cert.into()),
            key: PemSource::Content(key.into()),
            root_ca: None,
        }
    }

    /// Builds a source from PEM files, read at attach time.
    #[must_use]
    pub fn from_files(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: PemSource::File(cert.into()),
            key: PemSource::File(key.into()),
            root_ca: None,
        }
    }

    /// Adds a root CA to trust.
    #[must_use]
    pub fn with_root_ca(mut self, root_ca: PemSource) -> Self {
        self.root_ca = Some(root_ca);
        self
    }

    async fn load(&self) -> Result<PemBundle, CertificateError> {
        let mut identity = self.cert.load().await?;
        if !identity.ends_with(b"\n") {
            identity.push(b'\n');
        }
        identity.extend(self.key.load().await?);
        let root_ca = match &self.root_ca {
            Some(root_ca) => Some(root_ca.load().await?),
            None => None,
        };
        Ok(PemBundle { identity, root_ca })
    }
}

/// PEM material read from a [`CertificateSource`]: certificate chain
/// followed by the key, plus the optional root CA.
struct PemBundle {
    identity: Vec<u8>,
    root_ca: Option<Vec<u8>>,
}

/// An HTTP client that presents the merchant certificate.
#[derive(Debug, Clone)]
pub struct MutualTls {
    client: reqwest::Client,
}

impl MutualTls {
    /// Loads `source` and builds a TLS-enabled client with the given request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError`] if the material cannot be read or parsed.
    pub async fn build(source: &CertificateSource, timeout: Duration) -> Result<Self, CertificateError> {
        Self::from_bundle(&source.load().await?, timeout)
    }

    fn from_bundle(bundle: &PemBundle, timeout: Duration) -> Result<Self, CertificateError> {
        let identity =
            reqwest::Identity::from_pem(&bundle.identity).map_err(CertificateError::Identity)?;

        let mut builder = reqwest::Client::builder().identity(identity).timeout(timeout);
        if let Some(root_ca) = &bundle.root_ca {
            let root = reqwest::Certificate::from_pem(root_ca).map_err(CertificateError::RootCa)?;
            builder = builder.add_root_certificate(root);
        }
        let client = builder.build().map_err(CertificateError::Build)?;
        Ok(Self { client })
    }

    /// The HTTP client to dispatch certificate-protected calls with.
    #[must_use]
    pub const fn http_client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Holds the active [`MutualTls`] client, if any.
///
/// Reads are concurrent. Installing a certificate builds the client outside
/// the lock and swaps it in, so the last completed attach wins.
#[derive(Debug)]
pub struct CertificateStore {
    timeout: Duration,
    state: RwLock<Option<Arc<MutualTls>>>,
}

impl CertificateStore {
    /// Creates an empty store whose clients use `timeout` per request.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: RwLock::new(None),
        }
    }

    /// The installed client, if any.
    pub async fn current(&self) -> Option<Arc<MutualTls>> {
        self.state.read().await.clone()
    }

    /// Returns `true` once a certificate has been installed.
    pub async fn is_attached(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Builds a client from `source` and installs it, replacing any previous
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError`] if the material is unusable; the
    /// previously installed client, if any, stays in place.
    pub async fn attach(&self, source: &CertificateSource) -> Result<Arc<MutualTls>, CertificateError> {
        let tls = Arc::new(MutualTls::build(source, self.timeout).await?);
        *self.state.write().await = Some(Arc::clone(&tls));
        Ok(tls)
    }

    /// Returns the installed client, installing one from `fallback` if none
    /// is present yet. Concurrent callers share a single build; PEM files
    /// are read before the store is locked.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Missing`] when nothing is installed and no
    /// fallback is given, or the build error of the fallback.
    pub async fn get_or_attach(
        &self,
        operation: &str,
        fallback: Option<&CertificateSource>,
    ) -> Result<Arc<MutualTls>, CertificateError> {
        if let Some(tls) = self.current().await {
            return Ok(tls);
        }
        let Some(source) = fallback else {
            return Err(CertificateError::Missing {
                operation: operation.to_owned(),
            });
        };
        let bundle = source.load().await?;
        let mut guard = self.state.write().await;
        if let Some(tls) = guard.as_ref() {
            return Ok(Arc::clone(tls));
        }
        let tls = Arc::new(MutualTls::from_bundle(&bundle, self.timeout)?);
        *guard = Some(Arc::clone(&tls));
        drop(guard);

        #[cfg(feature = "telemetry")]
        tracing::info!(operation, "client certificate attached on first use");

        Ok(tls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT: &[u8] = include_bytes!("../testdata/client_cert.pem");
    const KEY: &[u8] = include_bytes!("../testdata/client_key.pem");

    fn testdata(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
    }

    #[tokio::test]
    async fn builds_from_pem_content() {
        let source = CertificateSource::from_pem(CERT, KEY);
        assert!(MutualTls::build(&source, Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn builds_from_pem_files() {
        let source =
            CertificateSource::from_files(testdata("client_cert.pem"), testdata("client_key.pem"));
        assert!(MutualTls::build(&source, Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let source = CertificateSource::from_files(testdata("nope.pem"), testdata("client_key.pem"));
        let err = MutualTls::build(&source, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CertificateError::Io { ref path, .. } if path.ends_with("nope.pem")));
    }

    #[tokio::test]
    async fn malformed_pem_is_rejected() {
        let source = CertificateSource::from_pem(b"not a certificate".to_vec(), b"nor a key".to_vec());
        let err = MutualTls::build(&source, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CertificateError::Identity(_)));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_are_not_blocked_while_files_are_read() {
        let fifo = std::env::temp_dir().join(format!("wxpay-cert-{}.pem", std::process::id()));
        std::fs::remove_file(&fifo).ok();
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());

        let store = Arc::new(CertificateStore::new(Duration::from_secs(5)));
        let source = CertificateSource::from_files(&fifo, testdata("client_key.pem"));
        let attach = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get_or_attach("refund", Some(&source)).await })
        };

        // The read of the FIFO blocks until a writer shows up.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let current = tokio::time::timeout(Duration::from_millis(200), store.current()).await;
        assert!(matches!(current, Ok(None)));

        let writer = fifo.clone();
        tokio::task::spawn_blocking(move || std::fs::write(writer, CERT))
            .await
            .unwrap()
            .unwrap();
        assert!(attach.await.unwrap().is_ok());
        assert!(store.is_attached().await);
        std::fs::remove_file(&fifo).unwrap();
    }

    #[test]
    fn debug_does_not_print_key_material() {
        let source = CertificateSource::from_pem(CERT, KEY);
        let debug = format!("{source:?}");
        assert!(!debug.contains("PRIVATE KEY"));
        assert!(debug.contains("bytes>"));
    }

    #[tokio::test]
    async fn get_or_attach_without_source_is_missing() {
        let store = CertificateStore::new(Duration::from_secs(5));
        let err = store.get_or_attach("refund", None).await.unwrap_err();
        assert!(matches!(err, CertificateError::Missing { ref operation } if operation == "refund"));
        assert!(!store.is_attached().await);
    }

    #[tokio::test]
    async fn failed_attach_keeps_previous_client() {
        let store = CertificateStore::new(Duration::from_secs(5));
        let good = store.attach(&CertificateSource::from_pem(CERT, KEY)).await.unwrap();
        let bad = CertificateSource::from_pem(b"garbage".to_vec(), KEY);
        assert!(store.attach(&bad).await.is_err());
        let current = store.current().await.unwrap();
        assert!(Arc::ptr_eq(&good, &current));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_lazy_attach_builds_once() {
        let store = Arc::new(CertificateStore::new(Duration::from_secs(5)));
        let source = CertificateSource::from_pem(CERT, KEY);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let source = source.clone();
                tokio::spawn(async move { store.get_or_attach("refund", Some(&source)).await })
            })
            .collect();

        let mut clients = Vec::new();
        for task in tasks {
            clients.push(task.await.unwrap().unwrap());
        }
        let first = &clients[0];
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, first)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attach_leaves_one_client_installed() {
        let store = Arc::new(CertificateStore::new(Duration::from_secs(5)));
        let source = CertificateSource::from_pem(CERT, KEY);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let source = source.clone();
                tokio::spawn(async move { store.attach(&source).await })
            })
            .collect();

        let mut installed = Vec::new();
        for task in tasks {
            installed.push(task.await.unwrap().unwrap());
        }
        let current = store.current().await.unwrap();
        assert!(installed.iter().any(|c| Arc::ptr_eq(c, &current)));
    }
}
