//! Safe HTTP fetching with per-hop validation.
//!
//! Every hop of a redirect chain goes through the full validator, and the
//! connection for that hop is pinned to exactly the addresses that were
//! validated. Automatic redirects are off; this module drives the chain.

use std::error::Error as StdError;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy as RedirectPolicy;
use reqwest::{Client, StatusCode};
use tokio::time::Instant;
use url::Url;

use crate::error::{Error, TimeoutStage};
use crate::extract::{ExtractError, TextExtractor};
use crate::options::FetchOptions;
use crate::resolve::{Resolver, SystemResolver};
use crate::validate::{ValidatedTarget, Validator};

/// One request/response exchange in a redirect chain.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    /// The validated target this hop connected to.
    pub target: ValidatedTarget,

    /// Status code the server answered this hop with.
    pub status: StatusCode,

    /// Absolute URL from the `Location` header, if this hop redirected.
    pub redirect_to: Option<String>,
}

/// A successfully fetched document.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Response body, never larger than the configured cap.
    pub body: Bytes,

    /// Status of the terminal response. Not necessarily 2xx.
    pub status: StatusCode,

    /// Raw `Content-Type` header value.
    pub content_type: Option<String>,

    /// `Content-Length` as announced by the server, if any.
    pub content_length: Option<u64>,

    /// URL of the terminal hop.
    pub url: Url,

    /// Every hop taken, the terminal one last.
    pub chain: Vec<FetchAttempt>,
}

impl FetchResult {
    /// Media type without parameters, lowercased (`text/html`).
    pub fn mime_type(&self) -> Option<String> {
        let content_type = self.content_type.as_deref()?;
        let mime = content_type.split(';').next()?.trim();
        (!mime.is_empty()).then(|| mime.to_ascii_lowercase())
    }

    /// Number of redirects followed.
    pub fn redirects(&self) -> usize {
        self.chain.len().saturating_sub(1)
    }

    /// Turn a 4xx/5xx terminal status into [`Error::HttpStatus`].
    pub fn error_for_status(self) -> Result<Self, Error> {
        if self.status.is_client_error() || self.status.is_server_error() {
            return Err(Error::HttpStatus {
                url: self.url.to_string(),
                status: self.status.as_u16(),
            });
        }
        Ok(self)
    }

    /// Hand the unmodified payload to a text extractor.
    pub fn extract_with<E>(&self, extractor: &E) -> Result<String, ExtractError>
    where
        E: TextExtractor + ?Sized,
    {
        extractor.extract(&self.body, self.content_type.as_deref())
    }
}

enum Hop {
    Redirect {
        status: StatusCode,
        location: String,
    },
    Terminal {
        status: StatusCode,
        content_type: Option<String>,
        content_length: Option<u64>,
        body: Bytes,
    },
}

/// SSRF-resistant fetcher.
///
/// Holds no mutable state; share one across tasks freely.
///
/// # Example
///
/// ```rust,no_run
/// use safe_fetch::{FetchOptions, Fetcher};
///
/// # async fn example() -> Result<(), safe_fetch::Error> {
/// let fetcher = Fetcher::new(FetchOptions::default().with_max_body_bytes(1024 * 1024));
/// let result = fetcher.fetch("https://example.com/article").await?;
/// println!("{} bytes of {:?}", result.body.len(), result.mime_type());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Fetcher {
    validator: Validator,
    options: FetchOptions,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(FetchOptions::default())
    }
}

impl Fetcher {
    /// Fetcher using the system DNS configuration.
    pub fn new(options: FetchOptions) -> Self {
        Self::with_resolver(options, Arc::new(SystemResolver))
    }

    /// Fetcher using a custom resolver.
    pub fn with_resolver(options: FetchOptions, resolver: Arc<dyn Resolver>) -> Self {
        let validator = Validator::new(resolver, options.policy.clone(), options.resolve_timeout);
        Self { validator, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Fetch a URL, validating every hop before connecting.
    ///
    /// Policy rejections, `TooManyRedirects` and `PayloadTooLarge` are final.
    /// Only `NetworkError` and `Timeout` are worth a retry, and a retry must
    /// call this method again so validation starts from scratch.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, Error> {
        let deadline = Instant::now() + self.options.overall_timeout;
        match tokio::time::timeout_at(deadline, self.follow_chain(url)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%url, timeout = ?self.options.overall_timeout, "fetch deadline exceeded");
                Err(Error::timeout(url, TimeoutStage::Overall))
            }
        }
    }

    /// Blocking version of [`Fetcher::fetch`].
    ///
    /// Inside a Tokio runtime this needs the multi-threaded flavor.
    pub fn fetch_blocking(&self, url: &str) -> Result<FetchResult, Error> {
        crate::block_on(url, self.fetch(url))
    }

    async fn follow_chain(&self, url: &str) -> Result<FetchResult, Error> {
        let max_redirects = u32::from(self.options.max_redirects);
        let mut current = url.to_string();
        let mut chain: Vec<FetchAttempt> = Vec::new();
        let mut redirects: u32 = 0;

        loop {
            let target = self.validator.validate(&current).await?;

            let hop = tokio::time::timeout(self.options.hop_timeout, self.exchange(&target))
                .await
                .map_err(|_| Error::timeout(target.url.as_str(), TimeoutStage::Hop))??;

            match hop {
                Hop::Redirect { status, location } => {
                    let next = resolve_redirect_url(&target.url, &location)?;
                    tracing::debug!(
                        from = %target.url,
                        to = %next,
                        %status,
                        hop = redirects,
                        "following redirect"
                    );
                    chain.push(FetchAttempt {
                        target,
                        status,
                        redirect_to: Some(next.clone()),
                    });

                    redirects += 1;
                    if redirects > max_redirects {
                        return Err(Error::TooManyRedirects {
                            url: url.to_string(),
                            max: self.options.max_redirects,
                        });
                    }
                    current = next;
                }
                Hop::Terminal {
                    status,
                    content_type,
                    content_length,
                    body,
                } => {
                    tracing::info!(
                        url = %target.url,
                        %status,
                        bytes = body.len(),
                        redirects,
                        "fetched"
                    );
                    let final_url = target.url.clone();
                    chain.push(FetchAttempt {
                        target,
                        status,
                        redirect_to: None,
                    });
                    return Ok(FetchResult {
                        body,
                        status,
                        content_type,
                        content_length,
                        url: final_url,
                        chain,
                    });
                }
            }
        }
    }

    /// One request against the pinned addresses, body included for terminal responses.
    async fn exchange(&self, target: &ValidatedTarget) -> Result<Hop, Error> {
        let url = target.url.as_str();
        let client = self.client_for(target)?;

        let response = client
            .get(target.url.clone())
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;
        let status = response.status();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|l| !l.is_empty());
            if let Some(location) = location {
                return Ok(Hop::Redirect {
                    status,
                    location: location.to_string(),
                });
            }
            // No usable Location: nothing to follow, treat as terminal.
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let content_length = response.content_length();
        let max = self.options.max_body_bytes;

        if let Some(size) = content_length {
            if size > max {
                return Err(Error::PayloadTooLarge {
                    url: url.to_string(),
                    size,
                    max,
                });
            }
        }

        let body = read_capped(response.bytes_stream(), max, url).await?;

        Ok(Hop::Terminal {
            status,
            content_type,
            content_length,
            body,
        })
    }

    fn client_for(&self, target: &ValidatedTarget) -> Result<Client, Error> {
        let mut builder = Client::builder()
            .redirect(RedirectPolicy::none())
            // A proxy would resolve the hostname itself.
            .no_proxy()
            .user_agent(self.options.user_agent.as_str())
            .dns_resolver(Arc::new(RefuseUnpinned));

        if !target.is_ip_literal() {
            // Dial the validated addresses; Host and SNI keep the hostname.
            builder = builder.resolve_to_addrs(&target.host, &target.socket_addrs());
        }

        builder
            .build()
            .map_err(|e| Error::network(target.url.as_str(), format!("failed to build HTTP client: {e}")))
    }
}

/// Fallback DNS for the HTTP client: every lookup fails.
///
/// Pinned hosts are answered by the client's override table before this is
/// consulted, so reaching it means something tried to resolve a name that was
/// never validated.
struct RefuseUnpinned;

impl Resolve for RefuseUnpinned {
    fn resolve(&self, name: Name) -> Resolving {
        let err: Box<dyn StdError + Send + Sync> =
            format!("refusing to resolve unvalidated host {}", name.as_str()).into();
        Box::pin(std::future::ready(Err::<Addrs, _>(err)))
    }
}

/// Read a body stream, failing as soon as it grows past `max` bytes.
pub(crate) async fn read_capped<S, E>(stream: S, max: u64, url: &str) -> Result<Bytes, Error>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::network(url, format!("failed to read body: {e}")))?;

        let size = body.len() as u64 + chunk.len() as u64;
        if size > max {
            return Err(Error::PayloadTooLarge {
                url: url.to_string(),
                size,
                max,
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(body))
}

fn transport_error(url: &str, e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        return Error::timeout(url, TimeoutStage::Hop);
    }
    // reqwest's Display omits the cause (refused, TLS, ...), so walk the chain.
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    Error::network(url, message)
}

/// Resolve a (possibly relative) `Location` against the current URL.
fn resolve_redirect_url(base: &Url, location: &str) -> Result<String, Error> {
    let resolved = base
        .join(location)
        .map_err(|e| Error::invalid_url(location, format!("bad redirect location: {e}")))?;
    Ok(resolved.to_string())
}

/// Fetch a URL with default options and the system resolver.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> Result<(), safe_fetch::Error> {
/// let page = safe_fetch::fetch("https://example.com/article").await?;
/// println!("{} bytes, {:?}", page.body.len(), page.content_type);
/// # Ok(())
/// # }
/// ```
pub async fn fetch(url: &str) -> Result<FetchResult, Error> {
    Fetcher::default().fetch(url).await
}

/// Synchronous version of [`fetch`].
pub fn fetch_sync(url: &str) -> Result<FetchResult, Error> {
    Fetcher::default().fetch_blocking(url)
}
