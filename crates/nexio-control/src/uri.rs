//! Typed device and target URIs
//!
//! The control plane moves structured data around inside URI strings
//! (backing device sizes, share ports, subsystem NQNs). These types parse
//! a URI once at the boundary; everything downstream works on the typed
//! record and never re-parses.

use crate::error::{Error, Result};
use std::fmt;
use url::Url;

/// Backing scheme of a locally created bdev
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BdevScheme {
    /// Memory-backed device
    Malloc,
    /// Null driver device (discards writes, reads zeroes)
    Null,
}

impl BdevScheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malloc => "malloc",
            Self::Null => "null",
        }
    }
}

/// A local bdev creation URI, e.g. `malloc:///disk0?size_mb=100`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BdevUri {
    scheme: BdevScheme,
    name: String,
    size_mb: u64,
    blk_size: Option<u32>,
}

impl BdevUri {
    /// Memory-backed device of `size_mb` MiB
    #[must_use]
    pub fn malloc(name: impl Into<String>, size_mb: u64) -> Self {
        Self {
            scheme: BdevScheme::Malloc,
            name: name.into(),
            size_mb,
            blk_size: None,
        }
    }

    /// Null-driver device with an explicit block size
    #[must_use]
    pub fn null(name: impl Into<String>, blk_size: u32, size_mb: u64) -> Self {
        Self {
            scheme: BdevScheme::Null,
            name: name.into(),
            size_mb,
            blk_size: Some(blk_size),
        }
    }

    /// Parse a bdev URI into its typed form
    pub fn parse(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|e| Error::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = match parsed.scheme() {
            "malloc" => BdevScheme::Malloc,
            "null" => BdevScheme::Null,
            other => {
                return Err(Error::InvalidUri {
                    uri: uri.to_string(),
                    reason: format!("unsupported scheme {other:?}"),
                });
            }
        };

        let name = parsed.path().trim_start_matches('/').to_string();
        if name.is_empty() {
            return Err(Error::InvalidUri {
                uri: uri.to_string(),
                reason: "missing device name".to_string(),
            });
        }

        let mut size_mb = None;
        let mut blk_size = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "size_mb" => size_mb = value.parse::<u64>().ok(),
                "blk_size" => blk_size = value.parse::<u32>().ok(),
                _ => {}
            }
        }

        let size_mb = size_mb.ok_or_else(|| Error::InvalidUri {
            uri: uri.to_string(),
            reason: "missing or invalid size_mb".to_string(),
        })?;

        Ok(Self {
            scheme,
            name,
            size_mb,
            blk_size,
        })
    }

    #[must_use]
    pub const fn scheme(&self) -> BdevScheme {
        self.scheme
    }

    /// Node-local device name (the URI path)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn size_mb(&self) -> u64 {
        self.size_mb
    }

    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_mb << 20
    }

    #[must_use]
    pub const fn blk_size(&self) -> Option<u32> {
        self.blk_size
    }
}

impl fmt::Display for BdevUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:///{}", self.scheme.as_str(), self.name)?;
        match self.blk_size {
            Some(blk) => write!(f, "?blk_size={blk}&size_mb={}", self.size_mb),
            None => write!(f, "?size_mb={}", self.size_mb),
        }
    }
}

/// A published target URI, e.g. `nvmf://10.0.0.3:4420/nqn.2019-05.io.nexio:uuid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUri {
    host: String,
    port: u16,
    nqn: String,
}

impl TargetUri {
    /// Parse a device URI as returned by nexus publish
    pub fn parse(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|e| Error::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "nvmf" {
            return Err(Error::InvalidUri {
                uri: uri.to_string(),
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
            });
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidUri {
                uri: uri.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();

        let port = parsed.port().ok_or_else(|| Error::InvalidUri {
            uri: uri.to_string(),
            reason: "missing port".to_string(),
        })?;

        let nqn = parsed.path().trim_start_matches('/').to_string();
        if nqn.is_empty() {
            return Err(Error::InvalidUri {
                uri: uri.to_string(),
                reason: "missing subsystem NQN".to_string(),
            });
        }

        Ok(Self { host, port, nqn })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Subsystem NQN identifying the target
    #[must_use]
    pub fn nqn(&self) -> &str {
        &self.nqn
    }
}

impl fmt::Display for TargetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nvmf://{}:{}/{}", self.host, self.port, self.nqn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malloc_uri_round_trips() {
        let uri = BdevUri::malloc("disk0", 100);
        assert_eq!(uri.to_string(), "malloc:///disk0?size_mb=100");
        assert_eq!(BdevUri::parse(&uri.to_string()).unwrap(), uri);
        assert_eq!(uri.size_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn null_uri_round_trips() {
        let uri = BdevUri::null("null7", 512, 100);
        assert_eq!(uri.to_string(), "null:///null7?blk_size=512&size_mb=100");
        let parsed = BdevUri::parse(&uri.to_string()).unwrap();
        assert_eq!(parsed, uri);
        assert_eq!(parsed.blk_size(), Some(512));
    }

    #[test]
    fn bdev_uri_rejects_unknown_scheme() {
        assert!(matches!(
            BdevUri::parse("aio:///dev/sda?size_mb=100"),
            Err(Error::InvalidUri { .. })
        ));
    }

    #[test]
    fn bdev_uri_requires_size() {
        assert!(matches!(
            BdevUri::parse("malloc:///disk0"),
            Err(Error::InvalidUri { .. })
        ));
    }

    #[test]
    fn target_uri_parses_nqn() {
        let uri = TargetUri::parse(
            "nvmf://10.0.0.3:4420/nqn.2019-05.io.nexio:3ae73410-6136-4430-a7b5-cbec9fe2d273",
        )
        .unwrap();
        assert_eq!(uri.host(), "10.0.0.3");
        assert_eq!(uri.port(), 4420);
        assert_eq!(
            uri.nqn(),
            "nqn.2019-05.io.nexio:3ae73410-6136-4430-a7b5-cbec9fe2d273"
        );
    }

    #[test]
    fn target_uri_requires_port() {
        assert!(matches!(
            TargetUri::parse("nvmf://10.0.0.3/nqn.2019-05.io.nexio:x"),
            Err(Error::InvalidUri { .. })
        ));
    }
}
