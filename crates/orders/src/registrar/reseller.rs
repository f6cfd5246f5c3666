//! Reseller registrar HTTP API client (non-local TLDs).
//!
//! The reseller exposes a command-style HTTP API: every call is a GET with
//! `Command=namecheap.domains.*` plus credentials in the query string, and
//! every response is an `<ApiResponse Status="OK|ERROR">` XML envelope.
//! Rejections come back as `<Error Number="..">text</Error>` entries and
//! are surfaced as ordinary unsuccessful [`RegistrarResponse`]s; transport
//! and parse trouble becomes [`RegistrarError`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, instrument};

use kivu_core::{ContactSnapshot, DomainName};

use crate::config::ResellerConfig;

use super::{
    Availability, DomainInfo, RegistrarClient, RegistrarError, RegistrarResponse,
    RegistrationRequest,
};

/// Reseller API client.
#[derive(Clone)]
pub struct ResellerClient {
    client: reqwest::Client,
    config: std::sync::Arc<ResellerConfig>,
}

impl ResellerClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrarError::Connection`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: ResellerConfig) -> Result<Self, RegistrarError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RegistrarError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            config: std::sync::Arc::new(config),
        })
    }

    /// Issue one API command with the shared credential parameters.
    async fn command(
        &self,
        command: &str,
        params: &[(&str, String)],
    ) -> Result<wire::Envelope, RegistrarError> {
        let mut query: Vec<(&str, String)> = vec![
            ("ApiUser", self.config.api_user.clone()),
            ("ApiKey", self.config.api_key.expose_secret().to_owned()),
            ("UserName", self.config.username.clone()),
            ("ClientIp", self.config.client_ip.clone()),
            ("Command", command.to_owned()),
        ];
        query.extend(params.iter().map(|(k, v)| (*k, v.clone())));

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(command, %status, bytes = body.len(), "reseller API response");

        if !status.is_success() {
            return Err(RegistrarError::Session(format!(
                "API request failed with status {status}"
            )));
        }
        if body.is_empty() {
            return Err(RegistrarError::Parse("empty response from API".to_owned()));
        }

        wire::parse_envelope(&body)
    }

    fn rejection(envelope: &wire::Envelope) -> RegistrarResponse {
        RegistrarResponse::rejected(envelope.error_text())
    }
}

#[async_trait]
impl RegistrarClient for ResellerClient {
    #[instrument(skip(self), fields(count = domains.len()))]
    async fn check_availability(
        &self,
        domains: &[DomainName],
    ) -> Result<Vec<(DomainName, Availability)>, RegistrarError> {
        let list = domains
            .iter()
            .map(DomainName::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let envelope = self
            .command("namecheap.domains.check", &[("DomainList", list)])
            .await?;
        if !envelope.ok {
            return Err(RegistrarError::Session(envelope.error_text()));
        }

        let checked = wire::elements(&envelope.body, "DomainCheckResult")?;
        Ok(domains
            .iter()
            .map(|domain| {
                let availability = checked
                    .iter()
                    .find(|attrs| {
                        attrs
                            .get("Domain")
                            .is_some_and(|d| d.eq_ignore_ascii_case(domain.as_str()))
                    })
                    .map_or_else(
                        || Availability {
                            available: false,
                            reason: "not present in API response".to_owned(),
                        },
                        |attrs| Availability {
                            available: attrs
                                .get("Available")
                                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
                            reason: attrs
                                .get("Description")
                                .cloned()
                                .unwrap_or_else(|| "domain check completed".to_owned()),
                        },
                    );
                (domain.clone(), availability)
            })
            .collect())
    }

    #[instrument(skip(self, request), fields(domain = %request.domain))]
    async fn register_domain(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrarResponse, RegistrarError> {
        let mut params = vec![
            ("DomainName", request.domain.to_string()),
            ("Years", request.years.to_string()),
            ("RegistrantId", request.contacts.registrant.to_string()),
            ("AdminId", request.contacts.admin.to_string()),
            ("TechId", request.contacts.tech.to_string()),
            ("AuxBillingId", request.contacts.billing.to_string()),
        ];
        if !request.nameservers.is_empty() {
            params.push(("Nameservers", request.nameservers.join(",")));
        }

        let envelope = self.command("namecheap.domains.create", &params).await?;
        if !envelope.ok {
            return Ok(Self::rejection(&envelope));
        }

        let result = wire::first_element(&envelope.body, "DomainCreateResult")?;
        let registered = result
            .get("Registered")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if registered {
            Ok(RegistrarResponse {
                success: true,
                message: format!("Domain {} registered", request.domain),
                domain_id: result.get("DomainID").cloned(),
                charged_amount: result
                    .get("ChargedAmount")
                    .and_then(|v| v.parse().ok()),
                provider_order_id: result.get("OrderID").cloned(),
            })
        } else {
            Ok(RegistrarResponse::rejected(
                result
                    .get("Description")
                    .cloned()
                    .unwrap_or_else(|| "registration was not accepted".to_owned()),
            ))
        }
    }

    #[instrument(skip(self), fields(domain = %domain))]
    async fn renew_domain(
        &self,
        domain: &DomainName,
        years: i32,
    ) -> Result<RegistrarResponse, RegistrarError> {
        let envelope = self
            .command(
                "namecheap.domains.renew",
                &[
                    ("DomainName", domain.to_string()),
                    ("Years", years.to_string()),
                ],
            )
            .await?;
        if !envelope.ok {
            return Ok(Self::rejection(&envelope));
        }

        let result = wire::first_element(&envelope.body, "DomainRenewResult")?;
        let renewed = result
            .get("Renew")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if renewed {
            Ok(RegistrarResponse {
                success: true,
                message: format!("Domain {domain} renewed"),
                domain_id: result.get("DomainID").cloned(),
                charged_amount: result
                    .get("ChargedAmount")
                    .and_then(|v| v.parse().ok()),
                provider_order_id: result.get("OrderID").cloned(),
            })
        } else {
            Ok(RegistrarResponse::rejected("renewal was not accepted"))
        }
    }

    #[instrument(skip(self, contacts), fields(domain = %domain))]
    async fn transfer_domain(
        &self,
        domain: &DomainName,
        auth_code: &str,
        contacts: &ContactSnapshot,
    ) -> Result<RegistrarResponse, RegistrarError> {
        let envelope = self
            .command(
                "namecheap.domains.transfer.create",
                &[
                    ("DomainName", domain.to_string()),
                    ("EPPCode", auth_code.to_owned()),
                    ("RegistrantId", contacts.registrant.to_string()),
                ],
            )
            .await?;
        if !envelope.ok {
            return Ok(Self::rejection(&envelope));
        }

        let result = wire::first_element(&envelope.body, "DomainTransferCreateResult")?;
        let accepted = result
            .get("Transfer")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if accepted {
            Ok(RegistrarResponse {
                success: true,
                message: format!("Transfer of {domain} initiated"),
                domain_id: None,
                charged_amount: result
                    .get("ChargedAmount")
                    .and_then(|v| v.parse().ok()),
                provider_order_id: result.get("TransferID").cloned(),
            })
        } else {
            Ok(RegistrarResponse::rejected("transfer was not accepted"))
        }
    }

    #[instrument(skip(self, nameservers), fields(domain = %domain))]
    async fn update_nameservers(
        &self,
        domain: &DomainName,
        nameservers: &[String],
    ) -> Result<RegistrarResponse, RegistrarError> {
        let Some((sld, tld)) = domain.as_str().split_once('.') else {
            return Ok(RegistrarResponse::rejected(format!(
                "cannot split {domain} into SLD and TLD"
            )));
        };
        let envelope = self
            .command(
                "namecheap.domains.dns.setCustom",
                &[
                    ("SLD", sld.to_owned()),
                    ("TLD", tld.to_owned()),
                    ("Nameservers", nameservers.join(",")),
                ],
            )
            .await?;
        if !envelope.ok {
            return Ok(Self::rejection(&envelope));
        }
        Ok(RegistrarResponse {
            success: true,
            message: format!("Nameservers updated for {domain}"),
            domain_id: None,
            charged_amount: None,
            provider_order_id: None,
        })
    }

    #[instrument(skip(self), fields(domain = %domain, locked))]
    async fn set_domain_lock(
        &self,
        domain: &DomainName,
        locked: bool,
    ) -> Result<RegistrarResponse, RegistrarError> {
        let action = if locked { "LOCK" } else { "UNLOCK" };
        let envelope = self
            .command(
                "namecheap.domains.setRegistrarLock",
                &[
                    ("DomainName", domain.to_string()),
                    ("LockAction", action.to_owned()),
                ],
            )
            .await?;
        if !envelope.ok {
            return Ok(Self::rejection(&envelope));
        }
        Ok(RegistrarResponse {
            success: true,
            message: format!("Registrar lock {action} applied to {domain}"),
            domain_id: None,
            charged_amount: None,
            provider_order_id: None,
        })
    }

    #[instrument(skip(self), fields(domain = %domain))]
    async fn get_domain_info(&self, domain: &DomainName) -> Result<DomainInfo, RegistrarError> {
        let envelope = self
            .command(
                "namecheap.domains.getinfo",
                &[("DomainName", domain.to_string())],
            )
            .await?;
        if !envelope.ok {
            return Err(RegistrarError::Session(envelope.error_text()));
        }

        let result = wire::first_element(&envelope.body, "DomainGetInfoResult")?;
        Ok(DomainInfo {
            domain: domain.to_string(),
            statuses: result
                .get("Status")
                .map(|s| vec![s.clone()])
                .unwrap_or_default(),
            registrant: result.get("OwnerName").cloned(),
            created_date: result.get("CreatedDate").cloned(),
            expiry_date: result.get("ExpiredDate").cloned(),
        })
    }
}

/// Reseller XML envelope parsing.
mod wire {
    use super::{HashMap, RegistrarError};
    use quick_xml::Reader;
    use quick_xml::events::Event;

    /// Parsed `<ApiResponse>` envelope. `body` keeps the raw XML for the
    /// command-specific attribute extractors.
    #[derive(Debug)]
    pub struct Envelope {
        pub ok: bool,
        pub errors: Vec<(String, String)>,
        pub body: String,
    }

    impl Envelope {
        /// Error text joined for failure records: `"[2030280] text; …"`.
        pub fn error_text(&self) -> String {
            if self.errors.is_empty() {
                return "API returned an error with no detail".to_owned();
            }
            self.errors
                .iter()
                .map(|(number, text)| format!("[{number}] {text}"))
                .collect::<Vec<_>>()
                .join("; ")
        }
    }

    pub fn parse_envelope(xml: &str) -> Result<Envelope, RegistrarError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut ok = None;
        let mut errors = Vec::new();
        let mut in_error: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e) | Event::Empty(e)) => {
                    let name = e.local_name().as_ref().to_vec();
                    if name == b"ApiResponse" {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"Status" {
                                let value = attr
                                    .unescape_value()
                                    .map_err(|e| RegistrarError::Parse(e.to_string()))?;
                                ok = Some(value.eq_ignore_ascii_case("ok"));
                            }
                        }
                    } else if name == b"Error" {
                        let mut number = String::new();
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"Number" {
                                number = attr
                                    .unescape_value()
                                    .map_err(|e| RegistrarError::Parse(e.to_string()))?
                                    .into_owned();
                            }
                        }
                        in_error = Some(number);
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some(number) = in_error.take() {
                        let text = t
                            .unescape()
                            .map_err(|e| RegistrarError::Parse(e.to_string()))?;
                        errors.push((number, text.into_owned()));
                    }
                }
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"Error" {
                        // An empty <Error/> still counts.
                        if let Some(number) = in_error.take() {
                            errors.push((number, String::new()));
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RegistrarError::Parse(e.to_string())),
            }
        }

        let ok = ok.ok_or_else(|| {
            RegistrarError::Parse("response carries no <ApiResponse Status>".to_owned())
        })?;
        Ok(Envelope {
            ok,
            errors,
            body: xml.to_owned(),
        })
    }

    /// Attribute maps of every element named `element`.
    pub fn elements(
        xml: &str,
        element: &str,
    ) -> Result<Vec<HashMap<String, String>>, RegistrarError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut found = Vec::new();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e) | Event::Empty(e)) => {
                    if e.local_name().as_ref() == element.as_bytes() {
                        let mut attrs = HashMap::new();
                        for attr in e.attributes().flatten() {
                            let key =
                                String::from_utf8_lossy(attr.key.local_name().as_ref())
                                    .into_owned();
                            let value = attr
                                .unescape_value()
                                .map_err(|e| RegistrarError::Parse(e.to_string()))?
                                .into_owned();
                            attrs.insert(key, value);
                        }
                        found.push(attrs);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RegistrarError::Parse(e.to_string())),
            }
        }
        Ok(found)
    }

    /// Attribute map of the first element named `element`.
    pub fn first_element(
        xml: &str,
        element: &str,
    ) -> Result<HashMap<String, String>, RegistrarError> {
        elements(xml, element)?.into_iter().next().ok_or_else(|| {
            RegistrarError::Parse(format!("response carries no <{element}>"))
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const CREATE_OK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="OK" xmlns="http://api.namecheap.com/xml.response">
  <Errors/>
  <CommandResponse Type="namecheap.domains.create">
    <DomainCreateResult Domain="example.com" Registered="true" ChargedAmount="10.87"
        DomainID="9007" OrderID="196074" TransactionID="380716" />
  </CommandResponse>
</ApiResponse>"#;

        const CREATE_ERROR: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="ERROR" xmlns="http://api.namecheap.com/xml.response">
  <Errors>
    <Error Number="2033409">Domain is not available for registration</Error>
  </Errors>
</ApiResponse>"#;

        const CHECK: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ApiResponse Status="OK" xmlns="http://api.namecheap.com/xml.response">
  <Errors/>
  <CommandResponse Type="namecheap.domains.check">
    <DomainCheckResult Domain="free.com" Available="true" />
    <DomainCheckResult Domain="taken.com" Available="false" Description="Domain is taken" />
  </CommandResponse>
</ApiResponse>"#;

        #[test]
        fn test_parse_ok_envelope() {
            let envelope = parse_envelope(CREATE_OK).expect("parses");
            assert!(envelope.ok);
            assert!(envelope.errors.is_empty());
        }

        #[test]
        fn test_parse_error_envelope() {
            let envelope = parse_envelope(CREATE_ERROR).expect("parses");
            assert!(!envelope.ok);
            assert_eq!(
                envelope.error_text(),
                "[2033409] Domain is not available for registration"
            );
        }

        #[test]
        fn test_create_result_attributes() {
            let result = first_element(CREATE_OK, "DomainCreateResult").expect("present");
            assert_eq!(result.get("Registered").map(String::as_str), Some("true"));
            assert_eq!(result.get("DomainID").map(String::as_str), Some("9007"));
            assert_eq!(
                result.get("ChargedAmount").map(String::as_str),
                Some("10.87")
            );
        }

        #[test]
        fn test_check_results() {
            let results = elements(CHECK, "DomainCheckResult").expect("parses");
            assert_eq!(results.len(), 2);
            assert_eq!(
                results[1].get("Description").map(String::as_str),
                Some("Domain is taken")
            );
        }

        #[test]
        fn test_missing_status_is_parse_error() {
            assert!(parse_envelope("<Nope/>").is_err());
        }
    }
}
