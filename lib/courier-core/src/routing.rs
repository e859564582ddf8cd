//! Routing key grammar for `Host` based routing

use crate::{CoreError, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Which `Host` header grammar identifies the target service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingGrammar {
    /// `<service>.<rest-of-domain>`, routed to the first published port
    #[default]
    ServiceOnly,
    /// `<service>.<port>.<rest-of-domain>`, routed to the published mapping of `<port>`
    ServiceAndPort,
}

impl RoutingGrammar {
    fn pattern(self) -> &'static str {
        match self {
            RoutingGrammar::ServiceOnly => r"^([a-zA-Z0-9-]+)\.",
            RoutingGrammar::ServiceAndPort => r"^([a-zA-Z0-9-]+)\.([0-9]+)\.",
        }
    }

    /// Compile the grammar into a matcher
    pub fn matcher(self) -> Result<RoutingMatcher> {
        let regex = Regex::new(self.pattern())
            .map_err(|e| CoreError::InvalidConfiguration(format!("routing pattern: {}", e)))?;
        Ok(RoutingMatcher { regex })
    }
}

impl FromStr for RoutingGrammar {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "service" | "service-only" => Ok(RoutingGrammar::ServiceOnly),
            "service-port" | "service-and-port" => Ok(RoutingGrammar::ServiceAndPort),
            other => Err(CoreError::InvalidConfiguration(format!(
                "unknown routing grammar: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for RoutingGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingGrammar::ServiceOnly => write!(f, "service"),
            RoutingGrammar::ServiceAndPort => write!(f, "service-port"),
        }
    }
}

/// Compiled routing grammar
#[derive(Debug, Clone)]
pub struct RoutingMatcher {
    regex: Regex,
}

impl RoutingMatcher {
    /// Extract the routing key from a `Host` header value
    pub fn parse(&self, host: &str) -> Result<RoutingKey> {
        let malformed = || CoreError::RoutingKeyMalformed(host.to_string());
        let captures = self.regex.captures(host).ok_or_else(malformed)?;

        let service = captures
            .get(1)
            .ok_or_else(malformed)?
            .as_str()
            .to_ascii_lowercase();

        let port = match captures.get(2) {
            Some(segment) => Some(segment.as_str().parse::<u16>().map_err(|_| malformed())?),
            None => None,
        };

        Ok(RoutingKey { service, port })
    }
}

/// The part of a `Host` header that identifies a backend service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKey {
    pub service: String,
    /// Requested published port, only set by `RoutingGrammar::ServiceAndPort`
    pub port: Option<u16>,
}

impl RoutingKey {
    pub fn parse(host: &str, grammar: RoutingGrammar) -> Result<Self> {
        grammar.matcher()?.parse(host)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}.{}", self.service, port),
            None => write!(f, "{}", self.service),
        }
    }
}
