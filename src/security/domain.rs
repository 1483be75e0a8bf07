use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

const WILDCARD_PREFIX: &str = "*.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainParseError {
    #[error("domain `{0}` must start with a scheme, e.g. https://")]
    MissingScheme(String),

    #[error("domain `{0}` is not a valid origin: {1}")]
    InvalidUrl(String, String),

    #[error("domain `{0}` must be a bare origin without path, query or credentials")]
    NotAnOrigin(String),

    #[error("domain `{0}` has a misplaced wildcard; only a leading `*.` is allowed")]
    InvalidWildcard(String),
}

/// Scheme, host and port only: no path, query, fragment or credentials.
pub(crate) fn is_bare_origin(url: &Url) -> bool {
    matches!(url.path(), "" | "/")
        && url.query().is_none()
        && url.fragment().is_none()
        && url.username().is_empty()
        && url.password().is_none()
}

/// A trusted origin pattern.
///
/// Written as `scheme://host[:port]`. A host prefixed with `*.` also accepts
/// the bare host and every subdomain of it. Without a port any port matches;
/// with one, the candidate's effective port (scheme default included) must
/// equal it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    scheme: String,
    host: String,
    port: Option<u16>,
    include_subdomains: bool,
}

impl Domain {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn includes_subdomains(&self) -> bool {
        self.include_subdomains
    }

    /// Pure and total: any URL yields a definite answer.
    pub fn matches(&self, candidate: &Url) -> bool {
        if candidate.scheme() != self.scheme {
            return false;
        }

        let Some(host) = candidate.host_str() else {
            return false;
        };
        if !self.host_matches(host) {
            return false;
        }

        match self.port {
            Some(port) => candidate.port_or_known_default() == Some(port),
            None => true,
        }
    }

    /// Parses `origin` first; anything unparsable is a non-match.
    pub fn matches_origin(&self, origin: &str) -> bool {
        Url::parse(origin).map_or(false, |url| self.matches(&url))
    }

    fn host_matches(&self, host: &str) -> bool {
        if host == self.host {
            return true;
        }
        self.include_subdomains
            && host
                .strip_suffix(self.host.as_str())
                .map_or(false, |label| label.len() > 1 && label.ends_with('.'))
    }
}

impl FromStr for Domain {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .filter(|(scheme, _)| !scheme.is_empty())
            .ok_or_else(|| DomainParseError::MissingScheme(raw.to_string()))?;

        let (include_subdomains, rest) = match rest.strip_prefix(WILDCARD_PREFIX) {
            Some(stripped) => (true, stripped),
            None => (false, rest),
        };
        if rest.contains('*') {
            return Err(DomainParseError::InvalidWildcard(raw.to_string()));
        }

        let url = Url::parse(&format!("{scheme}://{rest}"))
            .map_err(|e| DomainParseError::InvalidUrl(raw.to_string(), e.to_string()))?;

        if !is_bare_origin(&url) {
            return Err(DomainParseError::NotAnOrigin(raw.to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DomainParseError::NotAnOrigin(raw.to_string()))?;

        // Url drops a port equal to the scheme default; keep what was written.
        let port = url.port().or_else(|| {
            rest.trim_end_matches('/')
                .rsplit_once(':')
                .and_then(|(_, p)| p.parse::<u16>().ok())
        });

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port,
            include_subdomains,
        })
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if self.include_subdomains {
            f.write_str(WILDCARD_PREFIX)?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

impl Serialize for Domain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
