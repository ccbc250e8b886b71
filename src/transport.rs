use async_trait::async_trait;
use log::debug;
use std::{io, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};
use url::Url;

use crate::config::{PollSettings, WatchConfig};
use crate::error::{Error, Result};

const CURL: &str = "curl";
const ACCEPT_LANGUAGE: &str = "Accept-Language: de-DE,de;q=0.9";

/// Endpoints derived from the watch config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchUrls {
    /// Page visited to seed cookies, also sent as `Referer`.
    pub product: Url,
    pub availability: Url,
}

impl WatchUrls {
    /// # Errors
    ///
    /// Returns [`Error::UrlParse`] if the ids produce an unparseable URL.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let product = match &config.product_url {
            Some(url) => url.clone(),
            None => Url::parse(&format!(
                "https://www.zara.com/de/de/\
                 mantel-mit-wollanteil-und-kunstfellkragen-zw-collection-p03736251.html\
                 ?v1={}",
                config.product_id
            ))?,
        };
        let availability = Url::parse(&format!(
            "https://www.zara.com/itxrest/1/catalog/store/{}/product/id/{}/availability",
            config.store_id, config.product_id
        ))?;
        Ok(Self {
            product,
            availability,
        })
    }
}

/// The two HTTP operations the watch loop needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Visits the product page to refresh session cookies.
    async fn seed(&self) -> Result<()>;

    /// Fetches the availability body; `None` when the request failed.
    async fn check(&self) -> Option<String>;
}

/// Captured result of one curl invocation.
#[derive(Debug)]
pub struct CurlOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CurlOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs curl with `args`, optionally feeding `stdin`. The child is killed if
/// the returned future is dropped.
///
/// # Errors
///
/// Returns [`Error::TransportMissing`] if curl is not on `PATH`, or an I/O
/// error if the process could not be driven.
pub async fn run_curl(args: &[String], stdin: Option<&[u8]>) -> Result<CurlOutput> {
    let mut command = Command::new(CURL);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(map_spawn_error)?;
    let pipe = child.stdin.take();
    // The pipe is dropped when the upload finishes, which signals EOF to curl
    let upload = async move {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            pipe.write_all(input).await?;
        }
        Ok::<(), io::Error>(())
    };
    // Output must drain while uploading or a full pipe stalls both sides
    let (upload, output) = tokio::join!(upload, child.wait_with_output());
    let output = output?;
    // curl may exit before reading everything; its status says why
    if let Err(e) = upload
        && e.kind() != io::ErrorKind::BrokenPipe
    {
        return Err(e.into());
    }

    Ok(CurlOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Fails with [`Error::TransportMissing`] when curl cannot be executed.
///
/// # Errors
///
/// See above; other spawn failures are reported as I/O errors.
pub async fn ensure_curl_available() -> Result<()> {
    let status = Command::new(CURL)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(map_spawn_error)?;
    debug!("curl --version exited with {status}");
    Ok(())
}

fn map_spawn_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::NotFound {
        Error::TransportMissing
    } else {
        Error::Io(err)
    }
}

/// [`Transport`] backed by the curl binary and an on-disk cookie jar.
pub struct CurlTransport {
    urls: WatchUrls,
    settings: PollSettings,
}

impl CurlTransport {
    #[must_use]
    pub fn new(urls: WatchUrls, settings: PollSettings) -> Self {
        Self { urls, settings }
    }

    fn proxy_args(&self) -> Vec<String> {
        self.settings
            .proxy
            .as_ref()
            .map(|proxy| vec!["--proxy".to_string(), proxy.clone()])
            .unwrap_or_default()
    }

    fn timeout_args(&self) -> [String; 4] {
        [
            "--connect-timeout".to_string(),
            self.settings.connect_timeout_secs.to_string(),
            "--max-time".to_string(),
            self.settings.max_time_secs.to_string(),
        ]
    }

    fn jar(&self) -> String {
        self.settings.cookie_jar.display().to_string()
    }

    pub(crate) fn seed_args(&self) -> Vec<String> {
        let mut args = vec!["-sS".to_string(), "-o".to_string(), "/dev/null".to_string()];
        args.extend(self.proxy_args());
        args.extend([
            "-c".to_string(),
            self.jar(),
            "-b".to_string(),
            self.jar(),
            self.urls.product.to_string(),
            "-H".to_string(),
            format!("User-Agent: {}", self.settings.user_agent),
            "-H".to_string(),
            ACCEPT_LANGUAGE.to_string(),
        ]);
        args.extend(self.timeout_args());
        args
    }

    pub(crate) fn check_args(&self) -> Vec<String> {
        let mut args = vec!["-sS".to_string()];
        args.extend(self.proxy_args());
        args.extend([
            "-b".to_string(),
            self.jar(),
            self.urls.availability.to_string(),
            "-H".to_string(),
            format!("User-Agent: {}", self.settings.user_agent),
            "-H".to_string(),
            "Accept: */*".to_string(),
            "-H".to_string(),
            format!("Referer: {}", self.urls.product),
            "-H".to_string(),
            ACCEPT_LANGUAGE.to_string(),
        ]);
        args.extend(self.timeout_args());
        args
    }
}

#[async_trait]
impl Transport for CurlTransport {
    async fn seed(&self) -> Result<()> {
        let output = run_curl(&self.seed_args(), None).await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::SeedFailed {
                code: output.code,
                stderr: output.stderr,
            })
        }
    }

    async fn check(&self) -> Option<String> {
        match run_curl(&self.check_args(), None).await {
            Ok(output) if output.success() => Some(output.stdout),
            Ok(output) => {
                debug!("check failed (rc={:?}): {}", output.code, output.stderr);
                None
            }
            Err(e) => {
                debug!("check could not run curl: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn watch_config(product_url: Option<&str>) -> WatchConfig {
        WatchConfig {
            product_id: 3_736_251,
            store_id: 11_766,
            watch_skus: BTreeSet::from([491_652_552]),
            valid_states: BTreeSet::from(["in_stock".to_string()]),
            product_url: product_url.map(|u| Url::parse(u).unwrap()),
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            user_agent: "test-agent".into(),
            proxy: None,
            cookie_jar: PathBuf::from("/tmp/jar.txt"),
            connect_timeout_secs: 3,
            max_time_secs: 9,
            ..PollSettings::default()
        }
    }

    #[test]
    fn test_availability_url_uses_store_and_product() {
        let urls = WatchUrls::from_config(&watch_config(None)).unwrap();
        assert_eq!(
            urls.availability.as_str(),
            "https://www.zara.com/itxrest/1/catalog/store/11766/product/id/3736251/availability"
        );
        assert!(urls.product.as_str().ends_with("p03736251.html?v1=3736251"));
    }

    #[test]
    fn test_configured_product_url_wins() {
        let urls =
            WatchUrls::from_config(&watch_config(Some("https://www.zara.com/es/es/x-p1.html")))
                .unwrap();
        assert_eq!(urls.product.as_str(), "https://www.zara.com/es/es/x-p1.html");
    }

    #[test]
    fn test_check_args_send_referer_and_reuse_jar() {
        let urls = WatchUrls::from_config(&watch_config(None)).unwrap();
        let product = urls.product.to_string();
        let transport = CurlTransport::new(urls, settings());
        let args = transport.check_args();

        assert_eq!(args[0], "-sS");
        assert!(!args.contains(&"--proxy".to_string()));
        assert!(!args.contains(&"-c".to_string()));
        assert!(args.windows(2).any(|w| w == ["-b", "/tmp/jar.txt"]));
        assert!(args.contains(&format!("Referer: {product}")));
        assert!(args.contains(&"User-Agent: test-agent".to_string()));
        assert!(args.windows(2).any(|w| w == ["--max-time", "9"]));
    }

    #[test]
    fn test_seed_args_write_jar_and_honor_proxy() {
        let urls = WatchUrls::from_config(&watch_config(None)).unwrap();
        let transport = CurlTransport::new(
            urls,
            PollSettings {
                proxy: Some("socks5://127.0.0.1:9050".into()),
                ..settings()
            },
        );
        let args = transport.seed_args();

        assert_eq!(&args[..3], ["-sS", "-o", "/dev/null"]);
        assert!(args.windows(2).any(|w| w == ["--proxy", "socks5://127.0.0.1:9050"]));
        assert!(args.windows(2).any(|w| w == ["-c", "/tmp/jar.txt"]));
        assert!(args.windows(2).any(|w| w == ["--connect-timeout", "3"]));
    }

    #[ignore = "This test requires curl"]
    #[tokio::test]
    async fn test_large_upload_does_not_stall() {
        // Larger than any pipe buffer, uploaded to a local file:// target
        let input = vec![b'x'; 4 * 1024 * 1024];
        let dir = tempfile::tempdir().unwrap();
        let sink = dir.path().join("upload.bin");
        let args = vec![
            "-sS".to_string(),
            "-T".to_string(),
            "-".to_string(),
            format!("file://{}", sink.display()),
        ];
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            run_curl(&args, Some(&input)),
        )
        .await
        .expect("curl upload stalled")
        .unwrap();
        assert!(output.success(), "curl failed: {}", output.stderr);
        assert_eq!(std::fs::metadata(&sink).unwrap().len(), input.len() as u64);
    }

    #[test]
    fn test_missing_binary_is_transport_missing() {
        let err = map_spawn_error(io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, Error::TransportMissing));
        let err = map_spawn_error(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io(_)));
    }

    #[ignore = "This test requires curl and network access"]
    #[tokio::test]
    async fn test_curl_is_available() {
        assert!(ensure_curl_available().await.is_ok());
    }
}
