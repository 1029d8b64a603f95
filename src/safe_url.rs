//! URL parsing and normalization, before any I/O happens.

use std::net::IpAddr;

use url::{Host, Url};

use crate::Error;

/// Longest URL accepted, in bytes.
pub const MAX_URL_LENGTH: usize = 2048;

/// A parsed URL that passed the syntactic checks.
///
/// Nothing here has touched the network. Use
/// [`validate`](crate::validate()) to resolve and classify the host.
#[derive(Debug, Clone)]
pub struct SafeUrl {
    inner: Url,
    host: String,
    ip: Option<IpAddr>,
}

impl SafeUrl {
    /// Parse and normalize a URL string.
    ///
    /// Rejects:
    /// - inputs over [`MAX_URL_LENGTH`] and malformed URLs ([`Error::InvalidUrl`])
    /// - schemes other than http/https ([`Error::UnsupportedScheme`])
    /// - any userinfo, even a bare username ([`Error::CredentialsInUrl`])
    /// - octal, hexadecimal, decimal and short-form IPv4 hosts ([`Error::InvalidUrl`])
    pub fn parse(input: &str) -> Result<Self, Error> {
        if input.len() > MAX_URL_LENGTH {
            return Err(Error::invalid_url(
                truncate(input),
                format!("URL is {} bytes (max {MAX_URL_LENGTH})", input.len()),
            ));
        }

        // Must run on the raw text: Url::parse silently canonicalizes these.
        reject_non_standard_ip_in_raw_url(input)?;

        let mut url = Url::parse(input).map_err(|e| Error::invalid_url(input, e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(Error::UnsupportedScheme {
                    url: input.to_string(),
                    scheme: scheme.to_string(),
                });
            }
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::CredentialsInUrl {
                url: input.to_string(),
            });
        }

        let (host, ip) = match url.host() {
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if domain.is_empty() {
                    return Err(Error::invalid_url(input, "empty hostname"));
                }
                (domain, None)
            }
            Some(Host::Ipv4(v4)) => (v4.to_string(), Some(IpAddr::V4(v4))),
            Some(Host::Ipv6(v6)) => (v6.to_string(), Some(IpAddr::V6(v6))),
            None => return Err(Error::invalid_url(input, "URL must have a host")),
        };

        // Keep the connection key and the validated name identical.
        if ip.is_none() && url.host_str() != Some(host.as_str()) {
            url.set_host(Some(&host))
                .map_err(|e| Error::invalid_url(input, e.to_string()))?;
        }

        Ok(Self {
            inner: url,
            host,
            ip,
        })
    }

    /// Normalized hostname, without IPv6 brackets or a trailing dot.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The address, when the host is an IP literal.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    /// Port, defaulting to 80 for http and 443 for https.
    pub fn port(&self) -> u16 {
        self.inner.port_or_known_default().unwrap_or(80)
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    pub fn is_https(&self) -> bool {
        self.inner.scheme() == "https"
    }

    pub fn as_url(&self) -> &Url {
        &self.inner
    }

    pub fn into_url(self) -> Url {
        self.inner
    }
}

fn truncate(input: &str) -> String {
    input.chars().take(64).collect()
}

/// Reject non-standard IPv4 encodings in the raw URL's authority.
fn reject_non_standard_ip_in_raw_url(url: &str) -> Result<(), Error> {
    let lower = url.to_ascii_lowercase();
    let Some(after_scheme) = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"))
    else {
        return Ok(());
    };

    let authority_end = after_scheme
        .find(['/', '?', '#', '\\'])
        .unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);

    if host_port.starts_with('[') {
        return Ok(());
    }
    let host = host_port.rsplit_once(':').map_or(host_port, |(h, _)| h);
    let host = host.trim_end_matches('.');

    match non_standard_ip_encoding(host) {
        Some(kind) => Err(Error::invalid_url(
            url,
            format!("{kind} IP encoding not allowed"),
        )),
        None => Ok(()),
    }
}

/// Name the encoding if `host` is an IPv4 address written in a non-dotted-quad form.
fn non_standard_ip_encoding(host: &str) -> Option<&'static str> {
    if host.is_empty() {
        return None;
    }
    let parts: Vec<&str> = host.split('.').collect();
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if parts.iter().any(|p| p.starts_with("0x")) {
        return Some("hexadecimal");
    }

    if parts.len() == 1 {
        // 2130706433 == 127.0.0.1
        if all_digits(host) {
            return Some("decimal");
        }
        // 7f000001, but not plain words like "cafe"
        if host.bytes().all(|b| b.is_ascii_hexdigit()) && host.bytes().any(|b| b.is_ascii_digit()) {
            return Some("hexadecimal");
        }
        return None;
    }

    if !parts.iter().all(|p| all_digits(p)) {
        return None;
    }
    // 127.1, 127.0.1
    if parts.len() < 4 {
        return Some("short-form");
    }
    // 0177.0.0.1
    if parts.iter().any(|p| p.len() > 1 && p.starts_with('0')) {
        return Some("octal");
    }
    None
}
