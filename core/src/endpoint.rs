//! REST endpoint normalization.
//!
//! # Design
//! Operators configure the decision service loosely (`gate:8080/check`,
//! `//gate/check`, `https://gate/check`). `Endpoint::parse` turns that into
//! one canonical absolute URL, once, at construction. The result is
//! immutable and reused for every dispatch.
//!
//! The split into scheme / authority / path / query / fragment is done by
//! hand rather than through `url::Url`, because WHATWG parsing rewrites
//! things this normalizer must keep (an empty path stays empty) and rejects
//! inputs it must repair (`host:8080path`). `url` is still used as the final
//! validator so a normalized endpoint is always something an HTTP client can
//! dial.

use std::fmt;

use crate::error::ConfigError;

/// A normalized absolute endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    raw: String,
    url: String,
    scheme: String,
    authority: String,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

impl Endpoint {
    /// Normalize `raw` into an absolute URL.
    ///
    /// Fails with `ConfigError::EmptyEndpoint` for empty or blank input and
    /// with `ConfigError::InvalidEndpoint` when the result has no host or is
    /// not a URL at all.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else if trimmed.starts_with("//") {
            format!("http:{trimmed}")
        } else {
            format!("http://{trimmed}")
        };

        let invalid = |reason: &str| ConfigError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = with_scheme
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme delimiter"))?;
        if !is_valid_scheme(scheme) {
            return Err(invalid("malformed scheme"));
        }
        let scheme = scheme.to_ascii_lowercase();

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, remainder) = rest.split_at(authority_end);

        let (remainder, fragment) = match remainder.split_once('#') {
            Some((before, frag)) => (before, Some(frag.to_string())),
            None => (remainder, None),
        };
        let (path, query) = match remainder.split_once('?') {
            Some((before, q)) => (before, Some(q.to_string())),
            None => (remainder, None),
        };

        let (authority, glued) = split_glued_port(authority);
        let mut path = format!("{glued}{path}");

        if host_of(&authority).is_empty() {
            return Err(invalid("missing host"));
        }
        if !path.is_empty() && !path.starts_with('/') {
            path.insert(0, '/');
        }

        let mut url = format!("{scheme}://{authority}{path}");
        if let Some(q) = &query {
            url.push('?');
            url.push_str(q);
        }
        if let Some(f) = &fragment {
            url.push('#');
            url.push_str(f);
        }

        url::Url::parse(&url).map_err(|e| invalid(&e.to_string()))?;

        tracing::info!(endpoint = %url, "normalized REST endpoint");

        Ok(Self {
            raw: raw.to_string(),
            url,
            scheme,
            authority,
            path,
            query,
            fragment,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// The string this endpoint was configured with.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host without userinfo or port. IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        host_of(&self.authority)
    }

    pub fn port(&self) -> Option<u16> {
        port_of(&self.authority).and_then(|p| p.parse().ok())
    }

    /// May be empty: `http://host:8080` has no path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Normalize `raw` and return only the canonical URL string.
pub fn normalize_endpoint(raw: &str) -> Result<String, ConfigError> {
    Endpoint::parse(raw).map(|e| e.url)
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// `host:port` without the userinfo part.
fn host_port(authority: &str) -> &str {
    authority.rsplit_once('@').map_or(authority, |(_, hp)| hp)
}

/// Byte offset of the `:` separating host and port, skipping IPv6 literals.
fn port_colon(host_port: &str) -> Option<usize> {
    let search_from = host_port.rfind(']').unwrap_or(0);
    host_port[search_from..].rfind(':').map(|i| i + search_from)
}

fn host_of(authority: &str) -> &str {
    let hp = host_port(authority);
    match port_colon(hp) {
        Some(i) => &hp[..i],
        None => hp,
    }
}

fn port_of(authority: &str) -> Option<&str> {
    let hp = host_port(authority);
    port_colon(hp).map(|i| &hp[i + 1..]).filter(|p| !p.is_empty())
}

/// Split `host:8080path` into (`host:8080`, `path`). Authorities whose port
/// is all digits (or absent) come back unchanged with an empty remainder.
fn split_glued_port(authority: &str) -> (String, String) {
    let Some(port) = port_of(authority) else {
        return (authority.to_string(), String::new());
    };
    let digits = port.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || digits == port.len() {
        return (authority.to_string(), String::new());
    }
    let cut = authority.len() - port.len() + digits;
    (authority[..cut].to_string(), authority[cut..].to_string())
}
