//! EPP client for the local ccTLD registry.
//!
//! EPP (Extensible Provisioning Protocol, RFC 5730-5733) is XML over a
//! long-lived TLS stream with 4-byte length-prefixed frames. Each call
//! here opens a fresh session (connect, greeting, login), issues one
//! command, and drops the connection; registrations are rare enough that
//! session reuse is not worth the reconnect/keepalive bookkeeping.
//!
//! Result codes 1000/1001 are success (1001 = action pending, which for
//! registration means the registry accepted the create); everything else
//! is carried back as a rejection with the registry's message text, so the
//! orchestrator can record it verbatim on the failure record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, instrument};

use kivu_core::{ContactSnapshot, DomainName};

use crate::config::EppConfig;

use super::{
    Availability, DomainInfo, RegistrarClient, RegistrarError, RegistrarResponse,
    RegistrationRequest,
};

/// Result codes the registry reports as success.
const SUCCESS_CODES: [u16; 2] = [1000, 1001];

/// EPP client for the local registry.
#[derive(Clone)]
pub struct EppClient {
    config: Arc<EppConfig>,
    connector: TlsConnector,
}

impl EppClient {
    /// Create a client from configuration.
    ///
    /// Builds the TLS connector once with the webpki root set; individual
    /// calls open their own sessions.
    #[must_use]
    pub fn new(config: EppConfig) -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            config: Arc::new(config),
            connector: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Open a session: connect, swallow the greeting, log in.
    async fn session(&self) -> Result<EppSession, RegistrarError> {
        let address = (self.config.host.clone(), self.config.port);
        let tcp = timeout(self.timeout(), TcpStream::connect(address))
            .await
            .map_err(|_| RegistrarError::Timeout(self.config.timeout_secs))?
            .map_err(|e| RegistrarError::Connection(e.to_string()))?;

        let server_name = ServerName::try_from(self.config.host.clone())
            .map_err(|e| RegistrarError::Connection(format!("invalid server name: {e}")))?;
        let tls = timeout(self.timeout(), self.connector.connect(server_name, tcp))
            .await
            .map_err(|_| RegistrarError::Timeout(self.config.timeout_secs))?
            .map_err(|e| RegistrarError::Connection(e.to_string()))?;

        let mut session = EppSession {
            stream: tls,
            timeout: self.timeout(),
        };

        // Server speaks first.
        let greeting = session.read_frame().await?;
        debug!(bytes = greeting.len(), "EPP greeting received");

        let login = frames::login(
            &self.config.username,
            self.config.password.expose_secret(),
        );
        let response = session.command(&login).await?;
        if !SUCCESS_CODES.contains(&response.code) {
            return Err(RegistrarError::Authentication(format!(
                "login rejected ({}): {}",
                response.code, response.message
            )));
        }

        Ok(session)
    }

    async fn run(&self, frame: String) -> Result<parse::EppResponse, RegistrarError> {
        let mut session = self.session().await?;
        let response = session.command(&frame).await;
        session.logout().await;
        response
    }
}

#[async_trait]
impl RegistrarClient for EppClient {
    #[instrument(skip(self), fields(count = domains.len()))]
    async fn check_availability(
        &self,
        domains: &[DomainName],
    ) -> Result<Vec<(DomainName, Availability)>, RegistrarError> {
        let response = self.run(frames::check(domains)).await?;
        if !SUCCESS_CODES.contains(&response.code) {
            return Err(RegistrarError::Session(format!(
                "check rejected ({}): {}",
                response.code, response.message
            )));
        }

        let checked = parse::check_results(&response.body)?;
        Ok(domains
            .iter()
            .map(|domain| {
                let availability = checked
                    .iter()
                    .find(|(name, _, _)| name == domain.as_str())
                    .map_or_else(
                        || Availability {
                            available: false,
                            reason: "not present in registry response".to_owned(),
                        },
                        |(_, available, reason)| Availability {
                            available: *available,
                            reason: reason.clone().unwrap_or_else(|| "ok".to_owned()),
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
        let frame = frames::create(
            &request.domain,
            &request.contacts,
            request.years,
            &request.nameservers,
            &self.config.contact_prefix,
        );
        let response = self.run(frame).await?;

        if SUCCESS_CODES.contains(&response.code) {
            Ok(RegistrarResponse {
                success: true,
                message: response.message,
                // The registry does not issue a separate handle; the name is it.
                domain_id: Some(request.domain.to_string()),
                charged_amount: None,
                provider_order_id: response.transaction_id,
            })
        } else {
            Ok(RegistrarResponse::rejected(format!(
                "{} ({})",
                response.message, response.code
            )))
        }
    }

    #[instrument(skip(self), fields(domain = %domain))]
    async fn renew_domain(
        &self,
        domain: &DomainName,
        years: i32,
    ) -> Result<RegistrarResponse, RegistrarError> {
        // Renew frames carry the current expiry date; fetch it first.
        let info = self.get_domain_info(domain).await?;
        let Some(expiry) = info.expiry_date else {
            return Ok(RegistrarResponse::rejected(format!(
                "registry reported no expiry date for {domain}"
            )));
        };
        let expiry_date = expiry.get(..10).unwrap_or(&expiry);

        let response = self.run(frames::renew(domain, expiry_date, years)).await?;
        if SUCCESS_CODES.contains(&response.code) {
            Ok(RegistrarResponse {
                success: true,
                message: response.message,
                domain_id: Some(domain.to_string()),
                charged_amount: None,
                provider_order_id: response.transaction_id,
            })
        } else {
            Ok(RegistrarResponse::rejected(format!(
                "{} ({})",
                response.message, response.code
            )))
        }
    }

    #[instrument(skip(self, contacts), fields(domain = %domain))]
    async fn transfer_domain(
        &self,
        domain: &DomainName,
        auth_code: &str,
        contacts: &ContactSnapshot,
    ) -> Result<RegistrarResponse, RegistrarError> {
        let _ = contacts; // transfers keep the registry-side contacts until approval
        let response = self.run(frames::transfer(domain, auth_code)).await?;
        if SUCCESS_CODES.contains(&response.code) {
            Ok(RegistrarResponse {
                success: true,
                message: response.message,
                domain_id: Some(domain.to_string()),
                charged_amount: None,
                provider_order_id: response.transaction_id,
            })
        } else {
            Ok(RegistrarResponse::rejected(format!(
                "{} ({})",
                response.message, response.code
            )))
        }
    }

    #[instrument(skip(self, nameservers), fields(domain = %domain))]
    async fn update_nameservers(
        &self,
        domain: &DomainName,
        nameservers: &[String],
    ) -> Result<RegistrarResponse, RegistrarError> {
        // The registry replaces the host set via remove-all/add; fetch the
        // current set first so the removal names the right hosts.
        let info_response = self.run(frames::info(domain)).await?;
        let current = parse::nameservers(&info_response.body)?;

        let response = self
            .run(frames::update_nameservers(domain, &current, nameservers))
            .await?;
        if SUCCESS_CODES.contains(&response.code) {
            Ok(RegistrarResponse {
                success: true,
                message: response.message,
                domain_id: None,
                charged_amount: None,
                provider_order_id: response.transaction_id,
            })
        } else {
            Ok(RegistrarResponse::rejected(format!(
                "{} ({})",
                response.message, response.code
            )))
        }
    }

    #[instrument(skip(self), fields(domain = %domain, locked))]
    async fn set_domain_lock(
        &self,
        domain: &DomainName,
        locked: bool,
    ) -> Result<RegistrarResponse, RegistrarError> {
        let response = self.run(frames::set_lock(domain, locked)).await?;
        if SUCCESS_CODES.contains(&response.code) {
            Ok(RegistrarResponse {
                success: true,
                message: response.message,
                domain_id: None,
                charged_amount: None,
                provider_order_id: response.transaction_id,
            })
        } else {
            Ok(RegistrarResponse::rejected(format!(
                "{} ({})",
                response.message, response.code
            )))
        }
    }

    #[instrument(skip(self), fields(domain = %domain))]
    async fn get_domain_info(&self, domain: &DomainName) -> Result<DomainInfo, RegistrarError> {
        let response = self.run(frames::info(domain)).await?;
        if !SUCCESS_CODES.contains(&response.code) {
            return Err(RegistrarError::Session(format!(
                "info rejected ({}): {}",
                response.code, response.message
            )));
        }
        parse::domain_info(domain.as_str(), &response.body)
    }
}

/// One live EPP session over TLS.
struct EppSession {
    stream: TlsStream<TcpStream>,
    timeout: Duration,
}

impl EppSession {
    /// Send one command frame and read its response.
    async fn command(&mut self, frame: &str) -> Result<parse::EppResponse, RegistrarError> {
        self.write_frame(frame).await?;
        let body = self.read_frame().await?;
        parse::response(&body)
    }

    /// Best-effort logout; session teardown failures are not interesting.
    async fn logout(&mut self) {
        if let Err(e) = self.write_frame(frames::LOGOUT).await {
            debug!(error = %e, "EPP logout failed");
        }
    }

    async fn write_frame(&mut self, frame: &str) -> Result<(), RegistrarError> {
        let total = u32::try_from(frame.len() + 4)
            .map_err(|_| RegistrarError::Parse("frame too large".to_owned()))?;
        let write = async {
            self.stream.write_all(&total.to_be_bytes()).await?;
            self.stream.write_all(frame.as_bytes()).await?;
            self.stream.flush().await
        };
        timeout(self.timeout, write)
            .await
            .map_err(|_| RegistrarError::Timeout(self.timeout.as_secs()))?
            .map_err(RegistrarError::Io)
    }

    async fn read_frame(&mut self) -> Result<String, RegistrarError> {
        let read = async {
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).await?;
            let total = u32::from_be_bytes(header) as usize;
            let body_len = total.saturating_sub(4);
            let mut body = vec![0u8; body_len];
            self.stream.read_exact(&mut body).await?;
            Ok::<_, std::io::Error>(body)
        };
        let body = timeout(self.timeout, read)
            .await
            .map_err(|_| RegistrarError::Timeout(self.timeout.as_secs()))?
            .map_err(RegistrarError::Io)?;
        String::from_utf8(body).map_err(|e| RegistrarError::Parse(e.to_string()))
    }
}

/// EPP command frame builders.
///
/// Frames are assembled with `format!` against the RFC 5731 schema; all
/// interpolated values pass through [`xml_escape`] first.
mod frames {
    use kivu_core::{ContactSnapshot, DomainName};

    pub const LOGOUT: &str = concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        r#"<epp xmlns="urn:ietf:params:xml:ns:epp-1.0"><command><logout/></command></epp>"#
    );

    pub fn xml_escape(value: &str) -> String {
        value
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&apos;")
    }

    fn envelope(command: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><epp xmlns="urn:ietf:params:xml:ns:epp-1.0"><command>{command}<clTRID>kivu-{}</clTRID></command></epp>"#,
            chrono::Utc::now().timestamp_micros()
        )
    }

    pub fn login(username: &str, password: &str) -> String {
        envelope(&format!(
            r#"<login><clID>{}</clID><pw>{}</pw><options><version>1.0</version><lang>en</lang></options><svcs><objURI>urn:ietf:params:xml:ns:domain-1.0</objURI><objURI>urn:ietf:params:xml:ns:host-1.0</objURI><objURI>urn:ietf:params:xml:ns:contact-1.0</objURI></svcs></login>"#,
            xml_escape(username),
            xml_escape(password),
        ))
    }

    pub fn check(domains: &[DomainName]) -> String {
        let names: String = domains
            .iter()
            .map(|d| format!("<domain:name>{}</domain:name>", xml_escape(d.as_str())))
            .collect();
        envelope(&format!(
            r#"<check><domain:check xmlns:domain="urn:ietf:params:xml:ns:domain-1.0">{names}</domain:check></check>"#
        ))
    }

    pub fn create(
        domain: &DomainName,
        contacts: &ContactSnapshot,
        years: i32,
        nameservers: &[String],
        contact_prefix: &str,
    ) -> String {
        let ns_block = if nameservers.is_empty() {
            String::new()
        } else {
            let hosts: String = nameservers
                .iter()
                .map(|ns| format!("<domain:hostObj>{}</domain:hostObj>", xml_escape(ns)))
                .collect();
            format!("<domain:ns>{hosts}</domain:ns>")
        };

        envelope(&format!(
            r#"<create><domain:create xmlns:domain="urn:ietf:params:xml:ns:domain-1.0"><domain:name>{name}</domain:name><domain:period unit="y">{years}</domain:period>{ns}<domain:registrant>{prefix}{registrant}</domain:registrant><domain:contact type="admin">{prefix}{admin}</domain:contact><domain:contact type="tech">{prefix}{tech}</domain:contact><domain:contact type="billing">{prefix}{billing}</domain:contact></domain:create></create>"#,
            name = xml_escape(domain.as_str()),
            years = years,
            ns = ns_block,
            prefix = xml_escape(contact_prefix),
            registrant = contacts.registrant,
            admin = contacts.admin,
            tech = contacts.tech,
            billing = contacts.billing,
        ))
    }

    pub fn renew(domain: &DomainName, current_expiry: &str, years: i32) -> String {
        envelope(&format!(
            r#"<renew><domain:renew xmlns:domain="urn:ietf:params:xml:ns:domain-1.0"><domain:name>{}</domain:name><domain:curExpDate>{}</domain:curExpDate><domain:period unit="y">{years}</domain:period></domain:renew></renew>"#,
            xml_escape(domain.as_str()),
            xml_escape(current_expiry),
        ))
    }

    pub fn transfer(domain: &DomainName, auth_code: &str) -> String {
        envelope(&format!(
            r#"<transfer op="request"><domain:transfer xmlns:domain="urn:ietf:params:xml:ns:domain-1.0"><domain:name>{}</domain:name><domain:authInfo><domain:pw>{}</domain:pw></domain:authInfo></domain:transfer></transfer>"#,
            xml_escape(domain.as_str()),
            xml_escape(auth_code),
        ))
    }

    pub fn info(domain: &DomainName) -> String {
        envelope(&format!(
            r#"<info><domain:info xmlns:domain="urn:ietf:params:xml:ns:domain-1.0"><domain:name hosts="all">{}</domain:name></domain:info></info>"#,
            xml_escape(domain.as_str()),
        ))
    }

    pub fn update_nameservers(
        domain: &DomainName,
        current: &[String],
        replacement: &[String],
    ) -> String {
        let rem = if current.is_empty() {
            String::new()
        } else {
            let hosts: String = current
                .iter()
                .map(|ns| format!("<domain:hostObj>{}</domain:hostObj>", xml_escape(ns)))
                .collect();
            format!("<domain:rem><domain:ns>{hosts}</domain:ns></domain:rem>")
        };
        let add = if replacement.is_empty() {
            String::new()
        } else {
            let hosts: String = replacement
                .iter()
                .map(|ns| format!("<domain:hostObj>{}</domain:hostObj>", xml_escape(ns)))
                .collect();
            format!("<domain:add><domain:ns>{hosts}</domain:ns></domain:add>")
        };
        envelope(&format!(
            r#"<update><domain:update xmlns:domain="urn:ietf:params:xml:ns:domain-1.0"><domain:name>{}</domain:name>{add}{rem}</domain:update></update>"#,
            xml_escape(domain.as_str()),
        ))
    }

    pub fn set_lock(domain: &DomainName, locked: bool) -> String {
        let op = if locked { "add" } else { "rem" };
        envelope(&format!(
            r#"<update><domain:update xmlns:domain="urn:ietf:params:xml:ns:domain-1.0"><domain:name>{}</domain:name><domain:{op}><domain:status s="clientTransferProhibited"/></domain:{op}></domain:update></update>"#,
            xml_escape(domain.as_str()),
        ))
    }
}

/// EPP response parsing.
mod parse {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    use super::super::{DomainInfo, RegistrarError};

    /// Parsed response envelope. `body` keeps the raw XML for the
    /// command-specific extractors.
    #[derive(Debug)]
    pub struct EppResponse {
        pub code: u16,
        pub message: String,
        pub transaction_id: Option<String>,
        pub body: String,
    }

    pub fn response(xml: &str) -> Result<EppResponse, RegistrarError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut code: Option<u16> = None;
        let mut message = String::new();
        let mut transaction_id = None;
        let mut current = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = e.local_name().as_ref().to_vec();
                    if name == b"result" && code.is_none() {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"code" {
                                let value = attr
                                    .unescape_value()
                                    .map_err(|e| RegistrarError::Parse(e.to_string()))?;
                                code = value.parse().ok();
                            }
                        }
                    }
                    current = name;
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| RegistrarError::Parse(e.to_string()))?;
                    if current == b"msg" && message.is_empty() {
                        message = text.into_owned();
                    } else if current == b"svTRID" && transaction_id.is_none() {
                        transaction_id = Some(text.into_owned());
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RegistrarError::Parse(e.to_string())),
            }
        }

        let code = code.ok_or_else(|| {
            RegistrarError::Parse("response carries no <result> code".to_owned())
        })?;
        Ok(EppResponse {
            code,
            message,
            transaction_id,
            body: xml.to_owned(),
        })
    }

    /// Extract `(name, available, reason)` triples from a check response.
    pub fn check_results(
        xml: &str,
    ) -> Result<Vec<(String, bool, Option<String>)>, RegistrarError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut results = Vec::new();
        let mut current = Vec::new();
        let mut pending: Option<(String, bool)> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    current = e.local_name().as_ref().to_vec();
                    if current == b"name" {
                        let mut available = false;
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"avail" {
                                let value = attr
                                    .unescape_value()
                                    .map_err(|e| RegistrarError::Parse(e.to_string()))?;
                                available = value == "1" || value == "true";
                            }
                        }
                        pending = Some((String::new(), available));
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| RegistrarError::Parse(e.to_string()))?
                        .into_owned();
                    if current == b"name" {
                        if let Some((name, available)) = pending.take() {
                            debug_assert!(name.is_empty());
                            results.push((text, available, None));
                        }
                    } else if current == b"reason" {
                        if let Some(last) = results.last_mut() {
                            last.2 = Some(text);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RegistrarError::Parse(e.to_string())),
            }
        }
        Ok(results)
    }

    /// Extract the host set from an info response.
    pub fn nameservers(xml: &str) -> Result<Vec<String>, RegistrarError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut hosts = Vec::new();
        let mut current = Vec::new();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => current = e.local_name().as_ref().to_vec(),
                Ok(Event::Text(t)) => {
                    if current == b"hostObj" {
                        let text = t
                            .unescape()
                            .map_err(|e| RegistrarError::Parse(e.to_string()))?;
                        hosts.push(text.into_owned());
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RegistrarError::Parse(e.to_string())),
            }
        }
        Ok(hosts)
    }

    /// Build a [`DomainInfo`] from an info response.
    pub fn domain_info(domain: &str, xml: &str) -> Result<DomainInfo, RegistrarError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut info = DomainInfo {
            domain: domain.to_owned(),
            statuses: Vec::new(),
            registrant: None,
            created_date: None,
            expiry_date: None,
        };
        let mut current = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e) | Event::Empty(e)) => {
                    current = e.local_name().as_ref().to_vec();
                    if current == b"status" {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"s" {
                                let value = attr
                                    .unescape_value()
                                    .map_err(|e| RegistrarError::Parse(e.to_string()))?;
                                info.statuses.push(value.into_owned());
                            }
                        }
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| RegistrarError::Parse(e.to_string()))?
                        .into_owned();
                    match current.as_slice() {
                        b"registrant" => info.registrant = Some(text),
                        b"crDate" => info.created_date = Some(text),
                        b"exDate" => info.expiry_date = Some(text),
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(RegistrarError::Parse(e.to_string())),
            }
        }
        Ok(info)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const CREATE_OK: &str = r#"<?xml version="1.0"?>
<epp xmlns="urn:ietf:params:xml:ns:epp-1.0">
  <response>
    <result code="1000"><msg>Command completed successfully</msg></result>
    <resData>
      <domain:creData xmlns:domain="urn:ietf:params:xml:ns:domain-1.0">
        <domain:name>example.rw</domain:name>
        <domain:crDate>2026-06-01T00:00:00.0Z</domain:crDate>
        <domain:exDate>2027-06-01T00:00:00.0Z</domain:exDate>
      </domain:creData>
    </resData>
    <trID><clTRID>kivu-1</clTRID><svTRID>SRV-42</svTRID></trID>
  </response>
</epp>"#;

        const CREATE_TAKEN: &str = r#"<?xml version="1.0"?>
<epp xmlns="urn:ietf:params:xml:ns:epp-1.0">
  <response>
    <result code="2302"><msg>Object exists</msg></result>
    <trID><svTRID>SRV-43</svTRID></trID>
  </response>
</epp>"#;

        const CHECK: &str = r#"<?xml version="1.0"?>
<epp xmlns="urn:ietf:params:xml:ns:epp-1.0">
  <response>
    <result code="1000"><msg>Command completed successfully</msg></result>
    <resData>
      <domain:chkData xmlns:domain="urn:ietf:params:xml:ns:domain-1.0">
        <domain:cd><domain:name avail="1">free.rw</domain:name></domain:cd>
        <domain:cd><domain:name avail="0">taken.rw</domain:name><domain:reason>In use</domain:reason></domain:cd>
      </domain:chkData>
    </resData>
  </response>
</epp>"#;

        const INFO: &str = r#"<?xml version="1.0"?>
<epp xmlns="urn:ietf:params:xml:ns:epp-1.0">
  <response>
    <result code="1000"><msg>Command completed successfully</msg></result>
    <resData>
      <domain:infData xmlns:domain="urn:ietf:params:xml:ns:domain-1.0">
        <domain:name>example.rw</domain:name>
        <domain:status s="clientTransferProhibited"/>
        <domain:registrant>C-100</domain:registrant>
        <domain:ns><domain:hostObj>ns1.kivudomains.rw</domain:hostObj></domain:ns>
        <domain:crDate>2024-01-01T00:00:00.0Z</domain:crDate>
        <domain:exDate>2027-01-01T00:00:00.0Z</domain:exDate>
      </domain:infData>
    </resData>
  </response>
</epp>"#;

        #[test]
        fn test_parse_success_envelope() {
            let parsed = response(CREATE_OK).expect("parses");
            assert_eq!(parsed.code, 1000);
            assert_eq!(parsed.message, "Command completed successfully");
            assert_eq!(parsed.transaction_id.as_deref(), Some("SRV-42"));
        }

        #[test]
        fn test_parse_object_exists() {
            let parsed = response(CREATE_TAKEN).expect("parses");
            assert_eq!(parsed.code, 2302);
            assert_eq!(parsed.message, "Object exists");
        }

        #[test]
        fn test_parse_check_results() {
            let results = check_results(CHECK).expect("parses");
            assert_eq!(results.len(), 2);
            assert_eq!(results[0], ("free.rw".to_owned(), true, None));
            assert_eq!(
                results[1],
                ("taken.rw".to_owned(), false, Some("In use".to_owned()))
            );
        }

        #[test]
        fn test_parse_domain_info() {
            let info = domain_info("example.rw", INFO).expect("parses");
            assert_eq!(info.statuses, vec!["clientTransferProhibited"]);
            assert_eq!(info.registrant.as_deref(), Some("C-100"));
            assert_eq!(info.expiry_date.as_deref(), Some("2027-01-01T00:00:00.0Z"));
            assert_eq!(
                nameservers(INFO).expect("parses"),
                vec!["ns1.kivudomains.rw"]
            );
        }

        #[test]
        fn test_missing_result_code_is_parse_error() {
            assert!(response("<epp><response/></epp>").is_err());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::frames;
    use kivu_core::{ContactId, ContactSnapshot, DomainName};

    #[test]
    fn test_create_frame_escapes_and_prefixes() {
        let domain = DomainName::parse("example.rw").expect("valid");
        let contacts = ContactSnapshot::single(ContactId::new(12));
        let frame = frames::create(&domain, &contacts, 2, &[], "KV");
        assert!(frame.contains("<domain:name>example.rw</domain:name>"));
        assert!(frame.contains(r#"<domain:period unit="y">2</domain:period>"#));
        assert!(frame.contains("<domain:registrant>KV12</domain:registrant>"));
        assert!(!frame.contains("<domain:ns>"));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(frames::xml_escape("a&b<c>"), "a&amp;b&lt;c&gt;");
    }
}
