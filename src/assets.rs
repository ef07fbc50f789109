//! Trusted remote image hosts for the asset pipeline.
//!
//! Static declaration consulted by the front-end build; nothing here is
//! invoked by the authentication flow.

/// Production object-storage host for course imagery.
pub const DEFAULT_IMAGE_HOST: &str = "ethio-learners-lms.t3.storage.dev";

use serde::Serialize;

/// A remote host pattern trusted for image optimization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePattern {
    pub protocol: String,
    pub hostname: String,
    /// `None` means the protocol's default port.
    pub port: Option<u16>,
}

impl RemotePattern {
    pub fn https(hostname: &str) -> Self {
        Self {
            protocol: "https".into(),
            hostname: hostname.into(),
            port: None,
        }
    }

    pub fn matches(&self, protocol: &str, hostname: &str, port: Option<u16>) -> bool {
        self.protocol.eq_ignore_ascii_case(protocol)
            && self.hostname.eq_ignore_ascii_case(hostname)
            && self.port == port
    }
}

/// Allow-list of remote image hosts; read-only after startup.
#[derive(Debug, Clone)]
pub struct ImageHostAllowList {
    patterns: Vec<RemotePattern>,
}

impl ImageHostAllowList {
    /// The default list plus any extra hosts from configuration.
    pub fn new(extra_hosts: &[String]) -> Self {
        let mut patterns = vec![RemotePattern::https(DEFAULT_IMAGE_HOST)];
        patterns.extend(extra_hosts.iter().map(|h| RemotePattern::https(h)));
        Self { patterns }
    }

    pub fn is_trusted(&self, protocol: &str, hostname: &str, port: Option<u16>) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches(protocol, hostname, port))
    }

    pub fn patterns(&self) -> &[RemotePattern] {
        &self.patterns
    }
}
