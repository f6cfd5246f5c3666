//! Registrar client contract and backend routing.
//!
//! Two registrar backends sit behind one trait so the orchestrator can
//! treat them identically:
//!
//! - [`epp::EppClient`] - the national ccTLD registry, spoken to over EPP
//!   (XML frames on a TLS stream).
//! - [`reseller::ResellerClient`] - a third-party reseller HTTP API for
//!   every other TLD.
//!
//! Ordinary registrar outcomes (accepted, rejected, "domain taken") are
//! values: [`RegistrarResponse`] with a `success` flag. [`RegistrarError`]
//! is reserved for transport-level trouble (timeouts, TLS failures,
//! unparseable responses); callers at the item boundary convert those into
//! ordinary registration failures too, so both kinds enter the same retry
//! path and neither aborts sibling items.

pub mod epp;
pub mod reseller;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kivu_core::{ContactSnapshot, DomainName, Registrar};

pub use epp::EppClient;
pub use reseller::ResellerClient;

/// Errors that can occur talking to a registrar backend.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// TCP/TLS connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call did not complete within the request timeout.
    #[error("registrar request timed out after {0} seconds")]
    Timeout(u64),

    /// HTTP request failed (reseller backend).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error on the EPP stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The response could not be parsed.
    #[error("unparseable registrar response: {0}")]
    Parse(String),

    /// The session-level handshake (greeting/login) failed.
    #[error("registrar session error: {0}")]
    Session(String),

    /// Backend credentials are missing or rejected.
    #[error("registrar authentication failed: {0}")]
    Authentication(String),
}

/// Uniform outcome of a registrar mutation.
///
/// Both backends reduce their provider-specific responses to this shape;
/// `success == false` carries the provider's rejection text in `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarResponse {
    /// Whether the operation was accepted by the registrar.
    pub success: bool,
    /// Human-readable provider message (error text on rejection).
    pub message: String,
    /// Provider's handle for the domain, when one was issued.
    pub domain_id: Option<String>,
    /// Amount the provider charged, when reported.
    pub charged_amount: Option<Decimal>,
    /// Provider-side order/transaction ID, when reported.
    pub provider_order_id: Option<String>,
}

impl RegistrarResponse {
    /// A rejection carrying only a message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            domain_id: None,
            charged_amount: None,
            provider_order_id: None,
        }
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    /// Whether the domain can be registered.
    pub available: bool,
    /// Provider reason text.
    pub reason: String,
}

/// Registry-side information about a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainInfo {
    /// The domain queried.
    pub domain: String,
    /// Registry status flags (e.g. `clientTransferProhibited`).
    pub statuses: Vec<String>,
    /// Registrant handle, when disclosed.
    pub registrant: Option<String>,
    /// Creation date as reported by the registry.
    pub created_date: Option<String>,
    /// Expiry date as reported by the registry.
    pub expiry_date: Option<String>,
}

/// Parameters for a domain registration.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// Domain to register.
    pub domain: DomainName,
    /// Contact handles for the four registrar roles.
    pub contacts: ContactSnapshot,
    /// Term in years.
    pub years: i32,
    /// Nameservers to set at creation; empty means provider defaults.
    pub nameservers: Vec<String>,
}

/// Capability interface over a registrar backend.
///
/// Every call is a blocking network round-trip with a client-side timeout.
/// Callers must not hold a database transaction open across any of these.
#[async_trait]
pub trait RegistrarClient: Send + Sync {
    /// Check whether domains are available for registration.
    async fn check_availability(
        &self,
        domains: &[DomainName],
    ) -> Result<Vec<(DomainName, Availability)>, RegistrarError>;

    /// Register a new domain.
    async fn register_domain(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrarResponse, RegistrarError>;

    /// Renew an existing registration.
    async fn renew_domain(
        &self,
        domain: &DomainName,
        years: i32,
    ) -> Result<RegistrarResponse, RegistrarError>;

    /// Transfer a domain in from another registrar.
    async fn transfer_domain(
        &self,
        domain: &DomainName,
        auth_code: &str,
        contacts: &ContactSnapshot,
    ) -> Result<RegistrarResponse, RegistrarError>;

    /// Replace the domain's nameserver set.
    async fn update_nameservers(
        &self,
        domain: &DomainName,
        nameservers: &[String],
    ) -> Result<RegistrarResponse, RegistrarError>;

    /// Enable or disable the registrar transfer lock.
    async fn set_domain_lock(
        &self,
        domain: &DomainName,
        locked: bool,
    ) -> Result<RegistrarResponse, RegistrarError>;

    /// Fetch registry-side information about a domain.
    async fn get_domain_info(&self, domain: &DomainName) -> Result<DomainInfo, RegistrarError>;
}

/// Routes each call to the backend selected by the pure TLD rule.
///
/// Holds both production clients; selection is `Registrar::for_domain`,
/// matched once per call, and depends on nothing but the domain string.
pub struct RegistrarRouter {
    local: EppClient,
    reseller: ResellerClient,
}

impl RegistrarRouter {
    /// Create a router over the two production backends.
    #[must_use]
    pub const fn new(local: EppClient, reseller: ResellerClient) -> Self {
        Self { local, reseller }
    }

    fn backend(&self, domain: &DomainName) -> &dyn RegistrarClient {
        match Registrar::for_domain(domain) {
            Registrar::LocalRegistry => &self.local,
            Registrar::Reseller => &self.reseller,
        }
    }
}

#[async_trait]
impl RegistrarClient for RegistrarRouter {
    async fn check_availability(
        &self,
        domains: &[DomainName],
    ) -> Result<Vec<(DomainName, Availability)>, RegistrarError> {
        // Availability checks can span TLDs; split the batch per backend.
        let mut results = Vec::with_capacity(domains.len());
        let (local, foreign): (Vec<_>, Vec<_>) = domains
            .iter()
            .cloned()
            .partition(|d| Registrar::for_domain(d) == Registrar::LocalRegistry);

        if !local.is_empty() {
            results.extend(self.local.check_availability(&local).await?);
        }
        if !foreign.is_empty() {
            results.extend(self.reseller.check_availability(&foreign).await?);
        }
        Ok(results)
    }

    async fn register_domain(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrarResponse, RegistrarError> {
        self.backend(&request.domain).register_domain(request).await
    }

    async fn renew_domain(
        &self,
        domain: &DomainName,
        years: i32,
    ) -> Result<RegistrarResponse, RegistrarError> {
        self.backend(domain).renew_domain(domain, years).await
    }

    async fn transfer_domain(
        &self,
        domain: &DomainName,
        auth_code: &str,
        contacts: &ContactSnapshot,
    ) -> Result<RegistrarResponse, RegistrarError> {
        self.backend(domain)
            .transfer_domain(domain, auth_code, contacts)
            .await
    }

    async fn update_nameservers(
        &self,
        domain: &DomainName,
        nameservers: &[String],
    ) -> Result<RegistrarResponse, RegistrarError> {
        self.backend(domain)
            .update_nameservers(domain, nameservers)
            .await
    }

    async fn set_domain_lock(
        &self,
        domain: &DomainName,
        locked: bool,
    ) -> Result<RegistrarResponse, RegistrarError> {
        self.backend(domain).set_domain_lock(domain, locked).await
    }

    async fn get_domain_info(&self, domain: &DomainName) -> Result<DomainInfo, RegistrarError> {
        self.backend(domain).get_domain_info(domain).await
    }
}

/// Rewrite provider error text for the "domain no longer available" case.
///
/// Customers race each other for names; a registrar "object exists" or
/// "not available" rejection between cart and checkout deserves a clearer
/// message than the raw provider text.
#[must_use]
pub fn normalize_rejection(domain: &DomainName, message: &str) -> String {
    let lowered = message.to_lowercase();
    if lowered.contains("not available")
        || lowered.contains("already registered")
        || lowered.contains("object exists")
    {
        format!(
            "The domain {domain} is no longer available. It may have been registered by someone \
             else while you were completing your order."
        )
    } else {
        message.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rejection_rewrites_taken_domains() {
        let domain = DomainName::parse("example.com").expect("valid");
        let msg = normalize_rejection(&domain, "2302 Object exists");
        assert!(msg.contains("no longer available"));

        let msg = normalize_rejection(&domain, "Domain not available for registration");
        assert!(msg.contains("no longer available"));
    }

    #[test]
    fn test_normalize_rejection_keeps_other_errors() {
        let domain = DomainName::parse("example.com").expect("valid");
        let msg = normalize_rejection(&domain, "Invalid registrant contact");
        assert_eq!(msg, "Invalid registrant contact");
    }

    #[test]
    fn test_rejected_constructor() {
        let response = RegistrarResponse::rejected("nope");
        assert!(!response.success);
        assert_eq!(response.message, "nope");
        assert!(response.domain_id.is_none());
    }
}
