//! SMB connection strings
//!
//! `[smb://][domain;][user@]server[/share[/path]]`

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "smb://";

/// Parsed connection string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmbUrl {
    pub domain: Option<String>,
    pub user: Option<String>,
    pub server: Option<String>,
    pub share: Option<String>,
    /// Share-relative path, without the leading slash
    pub path: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl SmbUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = match url.get(..SCHEME.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => &url[SCHEME.len()..],
            _ if url.contains("://") => {
                return Err(Error::InvalidUrl(format!("{}: not an smb:// URL", url)))
            }
            _ => url,
        };

        let (authority, location) = match rest.split_once('/') {
            Some((authority, location)) => (authority, location),
            None => (rest, ""),
        };

        let (domain, authority) = match authority.split_once(';') {
            Some((domain, remainder)) => (non_empty(domain), remainder),
            None => (None, authority),
        };
        let (user, server) = match authority.rsplit_once('@') {
            Some((user, server)) => (non_empty(user), server),
            None => (None, authority),
        };
        if server.is_empty() {
            return Err(Error::InvalidUrl(format!("{}: missing server", url)));
        }

        let (share, path) = match location.split_once('/') {
            Some((share, path)) => (share, path),
            None => (location, ""),
        };
        if share.is_empty() && !path.is_empty() {
            return Err(Error::InvalidUrl(format!("{}: path without a share", url)));
        }

        Ok(Self {
            domain,
            user,
            server: Some(server.to_string()),
            share: non_empty(share),
            path: non_empty(path.trim_end_matches('/')),
        })
    }
}

impl FromStr for SmbUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SmbUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SCHEME)?;
        if let Some(domain) = &self.domain {
            write!(f, "{};", domain)?;
        }
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        f.write_str(self.server.as_deref().unwrap_or_default())?;
        if let Some(share) = &self.share {
            write!(f, "/{}", share)?;
            if let Some(path) = &self.path {
                write!(f, "/{}", path)?;
            }
        }
        Ok(())
    }
}
