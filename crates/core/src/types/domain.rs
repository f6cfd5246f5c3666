//! Domain name type and registrar routing.
//!
//! Routing between the two registrar backends is a pure function of the
//! domain string: the local ccTLD goes to the national registry over EPP,
//! everything else goes through the reseller API. Keeping the rule here,
//! away from any I/O, makes it trivially deterministic and testable.

use core::fmt;

use serde::{Deserialize, Serialize};

/// The ccTLD served by the local EPP registry.
pub const LOCAL_CCTLD: &str = ".rw";

/// Errors that can occur when parsing a [`DomainName`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum DomainNameError {
    /// The input string is empty.
    #[error("domain name cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("domain name must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input has no dot, so it has no TLD to route on.
    #[error("domain name must contain a TLD (e.g. example.com)")]
    MissingTld,
    /// The input contains whitespace or other disallowed characters.
    #[error("domain name contains invalid character: {0:?}")]
    InvalidCharacter(char),
}

/// A fully qualified domain name, stored lowercased.
///
/// ## Constraints
///
/// - Length: 1-253 characters
/// - At least one dot separating a label from a TLD
/// - Letters, digits, hyphens, and dots only (IDNs arrive punycoded)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    const MAX_LENGTH: usize = 253;

    /// Parse and normalize a domain name.
    ///
    /// # Errors
    ///
    /// Returns [`DomainNameError`] if the input is empty, too long, has no
    /// TLD, or contains characters outside `[a-z0-9.-]`.
    pub fn parse(input: &str) -> Result<Self, DomainNameError> {
        let normalized = input.trim().to_lowercase();

        if normalized.is_empty() {
            return Err(DomainNameError::Empty);
        }
        if normalized.len() > Self::MAX_LENGTH {
            return Err(DomainNameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-')
        {
            return Err(DomainNameError::InvalidCharacter(bad));
        }
        if !normalized.contains('.') || normalized.ends_with('.') {
            return Err(DomainNameError::MissingTld);
        }

        Ok(Self(normalized))
    }

    /// The domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The TLD suffix including the leading dot (e.g. `".com"`).
    ///
    /// For multi-label domains this is everything after the first label,
    /// so `shop.example.co.uk` yields `.example.co.uk`; suffix matching in
    /// [`Registrar::for_domain`] only cares about the trailing ccTLD.
    #[must_use]
    pub fn tld(&self) -> &str {
        self.0.find('.').map_or("", |idx| {
            self.0.get(idx..).unwrap_or_default()
        })
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which registrar backend serves a domain.
///
/// A sum type matched once at the orchestrator's entry, per the routing
/// rule: the local ccTLD registers through the national EPP registry, all
/// other TLDs through the reseller API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registrar {
    /// National ccTLD registry, spoken to over EPP.
    LocalRegistry,
    /// Third-party reseller HTTP API for all other TLDs.
    Reseller,
}

impl Registrar {
    /// Select the registrar for a domain. Pure function of the string.
    #[must_use]
    pub fn for_domain(domain: &DomainName) -> Self {
        if domain.as_str().ends_with(LOCAL_CCTLD) {
            Self::LocalRegistry
        } else {
            Self::Reseller
        }
    }
}

impl fmt::Display for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalRegistry => write!(f, "local_registry"),
            Self::Reseller => write!(f, "reseller"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let domain = DomainName::parse("  Example.RW ").expect("valid");
        assert_eq!(domain.as_str(), "example.rw");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(DomainName::parse("").is_err());
        assert!(DomainName::parse("no-tld").is_err());
        assert!(DomainName::parse("trailing.").is_err());
        assert!(DomainName::parse("spa ce.com").is_err());
    }

    #[test]
    fn test_tld_extraction() {
        let domain = DomainName::parse("example.co.uk").expect("valid");
        assert_eq!(domain.tld(), ".co.uk");
    }

    #[test]
    fn test_routing_is_deterministic() {
        let local = DomainName::parse("umurava.rw").expect("valid");
        let foreign = DomainName::parse("umurava.com").expect("valid");

        for _ in 0..3 {
            assert_eq!(Registrar::for_domain(&local), Registrar::LocalRegistry);
            assert_eq!(Registrar::for_domain(&foreign), Registrar::Reseller);
        }
    }

    #[test]
    fn test_routing_matches_suffix_not_substring() {
        // ".rw" must match as a suffix; a domain merely containing "rw"
        // routes to the reseller.
        let domain = DomainName::parse("rwanda-tours.com").expect("valid");
        assert_eq!(Registrar::for_domain(&domain), Registrar::Reseller);

        let nested = DomainName::parse("shop.kigali.rw").expect("valid");
        assert_eq!(Registrar::for_domain(&nested), Registrar::LocalRegistry);
    }
}
