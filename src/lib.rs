//! # safe-fetch
//!
//! SSRF-resistant URL fetching.
//!
//! `safe-fetch` retrieves a user-supplied URL without ever connecting to a
//! private, loopback, link-local, reserved or otherwise non-global address,
//! including through redirects:
//!
//! - every hostname is resolved to its full address set, and **every** address
//!   must be globally routable
//! - the connection is pinned to the validated addresses (no second lookup)
//! - automatic redirects are disabled; each hop is validated from scratch
//! - redirect count, body size, per-hop time and total time are all bounded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use safe_fetch::{FetchOptions, Fetcher};
//!
//! # async fn example() -> Result<(), safe_fetch::Error> {
//! let fetcher = Fetcher::new(FetchOptions::default());
//! match fetcher.fetch("https://example.com/article").await {
//!     Ok(page) => println!("{} bytes of {:?}", page.body.len(), page.content_type),
//!     Err(e) if e.is_retryable() => eprintln!("try again later: {}", e.user_message()),
//!     Err(e) => eprintln!("{}", e.user_message()),
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;

mod classify;
mod error;
mod extract;
mod fetch;
mod options;
mod policy;
mod resolve;
mod safe_url;
mod validate;

pub use classify::{classify, classify_hostname, BlockReason, Classification};
pub use error::{Error, ErrorKind, TimeoutStage, BLOCKED_MESSAGE, TRANSPORT_MESSAGE};
pub use extract::{ExtractError, PlainText, TextExtractor};
pub use fetch::{fetch, fetch_sync, FetchAttempt, FetchResult, Fetcher};
pub use options::{
    FetchOptions, DEFAULT_HOP_TIMEOUT, DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_REDIRECTS,
    DEFAULT_OVERALL_TIMEOUT, DEFAULT_RESOLVE_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use policy::{Policy, PolicyBuilder};
pub use resolve::{ResolveError, Resolver, StaticResolver, SystemResolver};
pub use safe_url::{SafeUrl, MAX_URL_LENGTH};
pub use validate::{validate, validate_sync, ResolvedAddress, ValidatedTarget, Validator};

/// Run a future to completion from synchronous code.
///
/// Uses the current runtime when there is one (multi-threaded flavor only),
/// otherwise spins up a temporary one.
pub(crate) fn block_on<T, F>(url: &str, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        tokio::task::block_in_place(|| handle.block_on(future))
    } else {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| Error::network(url, format!("failed to start runtime: {e}")))?;
        rt.block_on(future)
    }
}
