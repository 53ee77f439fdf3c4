//! vSphere SOAP (vim25) client with cookie-based session authentication.
//!
//! Talks to vCenter / ESXi via `https://{host}/sdk`. The session cookie
//! (`vmware_soap_session`) is kept in the reqwest cookie store.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};

use crate::config::ServiceEndpoint;
use crate::error::{InventoryError, InventoryErrorKind, InventoryResult};
use crate::session::{CertificateChain, InventorySession, VimRequest, VimResponse};
use crate::tls;
use crate::types::{ObjectKind, ObjectReference, PropertyRecord, ServiceContent};
use crate::vim25::{self, XmlNode};

/// vSphere SOAP API client. One instance per invocation.
pub struct VsphereClient {
    client: Client,
    endpoint: ServiceEndpoint,
    content: ServiceContent,
    timeout: Duration,
    user: Option<String>,
}

impl VsphereClient {
    /// Connect, fetch the service content and log in with the
    /// endpoint's credentials (if any).
    pub async fn connect(endpoint: ServiceEndpoint, timeout: Duration) -> InventoryResult<Self> {
        let client = Self::http_client(&endpoint, timeout)?;
        let sdk_url = endpoint.sdk_url();

        let response = Self::post(&client, &sdk_url, "RetrieveServiceContent", vim25::retrieve_service_content())
            .await
            .map_err(|e| match e.kind {
                InventoryErrorKind::Timeout => e,
                _ => InventoryError::connection(format!("Cannot connect with {sdk_url}: {}", e.message)),
            })?;
        let content = vim25::parse_service_content(&response)?;
        log::debug!(
            "{} {} (API {}) at {sdk_url}",
            content.about.full_name,
            content.about.api_type,
            content.about.api_version
        );

        let mut this = Self {
            client,
            endpoint,
            content,
            timeout,
            user: None,
        };
        if this.endpoint.username.is_empty() {
            log::warn!("No credentials for {sdk_url}; continuing unauthenticated");
        } else {
            this.login().await?;
        }
        Ok(this)
    }

    fn http_client(endpoint: &ServiceEndpoint, timeout: Duration) -> InventoryResult<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        headers.insert("SOAPAction", HeaderValue::from_static(vim25::SOAP_ACTION));
        Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .danger_accept_invalid_certs(endpoint.insecure)
            .timeout(timeout)
            .build()
            .map_err(|e| InventoryError::connection(format!("Failed to build HTTP client: {e}")))
    }

    /// Logged-in user, if a login was performed.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    // ── Session management ──────────────────────────────────────────

    async fn login(&mut self) -> InventoryResult<()> {
        let body = vim25::login(
            &self.content.session_manager,
            &self.endpoint.username,
            &self.endpoint.password,
        );
        let response = self.send("Login", body).await.map_err(|e| match e.kind {
            InventoryErrorKind::AuthenticationError => e,
            _ => InventoryError::auth(format!("Login failed: {e}")),
        })?;
        let user = response
            .child("returnval")
            .and_then(|r| r.child_text("userName"))
            .unwrap_or(&self.endpoint.username)
            .to_string();
        log::info!("Connected to {} as {user}", self.endpoint.sdk_url());
        self.user = Some(user);
        Ok(())
    }

    /// End the session. Failures are logged and otherwise ignored.
    pub async fn logout(&mut self) {
        if self.user.take().is_none() {
            return;
        }
        let body = vim25::logout(&self.content.session_manager);
        match self.send("Logout", body).await {
            Ok(_) => log::debug!("Logged out of {}", self.endpoint.sdk_url()),
            Err(e) => log::warn!("Logout from {} failed: {e}", self.endpoint.sdk_url()),
        }
    }

    // ── HTTP helpers ────────────────────────────────────────────────

    async fn send(&self, method: &str, body: String) -> InventoryResult<XmlNode> {
        Self::post(&self.client, &self.endpoint.sdk_url(), method, body).await
    }

    async fn post(client: &Client, url: &str, method: &str, body: String) -> InventoryResult<XmlNode> {
        log::debug!("{method} -> {url} ({} bytes)", body.len());
        let resp = client.post(url).body(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        log::trace!("{method} <- {status}:\n{text}");

        // Faults arrive as 500 with a SOAP body.
        if status.is_success() || status == StatusCode::INTERNAL_SERVER_ERROR {
            match vim25::decode(&text) {
                Ok(node) => return Ok(node),
                Err(e) if status.is_success() => return Err(e),
                Err(e) if e.kind != InventoryErrorKind::ParseError => return Err(e),
                Err(_) => {}
            }
        }
        Err(InventoryError::api(
            status.as_u16(),
            format!("{method} failed with HTTP {status}"),
        ))
    }

    async fn retrieve(
        &self,
        kind: ObjectKind,
        objects: &[ObjectReference],
        properties: &[String],
    ) -> InventoryResult<Vec<PropertyRecord>> {
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        let collector = &self.content.property_collector;
        let body = vim25::retrieve_properties_ex(collector, kind, objects, properties);
        let response = self.send("RetrievePropertiesEx", body).await?;
        let (mut records, mut token) = vim25::parse_retrieve_result(&response)?;
        while let Some(t) = token.take() {
            log::debug!("Continuing {kind} retrieval ({} so far)", records.len());
            let body = vim25::continue_retrieve_properties_ex(collector, &t);
            let response = self.send("ContinueRetrievePropertiesEx", body).await?;
            let (more, next) = vim25::parse_retrieve_result(&response)?;
            records.extend(more);
            token = next;
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl InventorySession for VsphereClient {
    fn service_content(&self) -> &ServiceContent {
        &self.content
    }

    fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    async fn issue_call(&self, request: VimRequest) -> InventoryResult<VimResponse> {
        match request {
            VimRequest::CreateContainerView {
                container,
                kinds,
                recursive,
            } => {
                let body = vim25::create_container_view(
                    &self.content.view_manager,
                    &container,
                    &kinds,
                    recursive,
                );
                let response = self.send("CreateContainerView", body).await?;
                Ok(VimResponse::Reference(vim25::parse_reference_return(&response)?))
            }
            VimRequest::DestroyView { view } => {
                self.send("DestroyView", vim25::destroy_view(&view)).await?;
                Ok(VimResponse::Empty)
            }
            VimRequest::RetrieveProperties {
                kind,
                objects,
                properties,
            } => Ok(VimResponse::Objects(
                self.retrieve(kind, &objects, &properties).await?,
            )),
            VimRequest::AcquireCloneTicket => {
                let body = vim25::acquire_clone_ticket(&self.content.session_manager);
                let response = self.send("AcquireCloneTicket", body).await?;
                Ok(VimResponse::Ticket(vim25::parse_string_return(&response)?))
            }
        }
    }

    async fn probe_tls(&self) -> InventoryResult<CertificateChain> {
        tls::probe_certificate_chain(
            &self.endpoint.host,
            self.endpoint.tls_port(),
            self.endpoint.insecure,
            self.timeout,
        )
        .await
    }
}
