//! Console hand-off: clone ticket, server thumbprint and launch URL.
//!
//! Every hand-off gathers fresh trust material. Clone tickets are
//! single-use, so nothing here is cached between entities.

use url::form_urlencoded;

use crate::config::DEFAULT_CONSOLE_PORT;
use crate::error::{InventoryError, InventoryErrorKind, InventoryResult};
use crate::session::{CancelSignal, InventorySession, VimRequest, VimResponse};
use crate::tls;
use crate::types::{ConsoleLink, ConsoleTicket, FingerprintAlgorithm, PropertyRecord};

/// How long the service honours a fresh clone ticket, by convention.
pub const TICKET_VALIDITY_SECS: u64 = 60;

/// Produces console links for one session.
pub struct ConsoleHandoff<'a, S: InventorySession + ?Sized> {
    session: &'a S,
    cancel: CancelSignal,
    console_port: u16,
    algorithm: FingerprintAlgorithm,
}

impl<'a, S: InventorySession + ?Sized> ConsoleHandoff<'a, S> {
    pub fn new(session: &'a S, cancel: CancelSignal) -> Self {
        Self {
            session,
            cancel,
            console_port: DEFAULT_CONSOLE_PORT,
            algorithm: FingerprintAlgorithm::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.console_port = port;
        self
    }

    pub fn with_algorithm(mut self, algorithm: FingerprintAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Ask the service for a single-use ticket cloning this session.
    pub async fn clone_session(&self) -> InventoryResult<String> {
        let request = VimRequest::AcquireCloneTicket;
        let ticket = self
            .cancel
            .guard(request.method(), self.session.issue_call(request))
            .await
            .and_then(VimResponse::into_ticket)
            .map_err(|e| passthrough_or(e, |m| InventoryError::clone_failed(m)))?;
        if ticket.trim().is_empty() {
            return Err(InventoryError::clone_failed(
                "AcquireCloneTicket returned an empty ticket",
            ));
        }
        log::trace!("Clone ticket from {}: {ticket}", self.service_host());
        Ok(ticket)
    }

    /// Thumbprint of the leaf certificate the service presents.
    pub async fn server_fingerprint(&self) -> InventoryResult<String> {
        let chain = self
            .cancel
            .guard("TLS probe", self.session.probe_tls())
            .await
            .map_err(|e| passthrough_or(e, |m| InventoryError::fingerprint(m)))?;
        let leaf = chain
            .leaf()
            .ok_or_else(|| InventoryError::fingerprint("TLS probe: no certificate presented"))?;
        let fingerprint = tls::fingerprint(leaf, self.algorithm);
        log::debug!("Fingerprint of {}: {fingerprint}", self.service_host());
        Ok(fingerprint)
    }

    /// Host (and port, if given) the user addressed the service by.
    pub fn service_host(&self) -> String {
        self.session.endpoint().host_port()
    }

    /// Gather the three pieces of trust material.
    pub async fn issue(&self) -> InventoryResult<ConsoleTicket> {
        let session_token = self.clone_session().await?;
        let tls_fingerprint = self.server_fingerprint().await?;
        Ok(ConsoleTicket {
            session_token,
            tls_fingerprint,
            service_host: self.service_host(),
        })
    }

    /// Issue fresh trust material and compose the console URL for `entity`.
    pub async fn console_link(&self, entity: &PropertyRecord) -> InventoryResult<ConsoleLink> {
        let ticket = self.issue().await?;
        let url = compose_url(
            &ticket,
            self.console_port,
            entity.id(),
            entity.name(),
            &self.session.inventory_host(),
        );
        Ok(ConsoleLink {
            url,
            ticket,
            issued_at: chrono::Utc::now(),
            valid_for_secs: TICKET_VALIDITY_SECS,
        })
    }
}

/// Errors that already have a meaning of their own keep it.
fn passthrough_or(e: InventoryError, wrap: fn(String) -> InventoryError) -> InventoryError {
    match e.kind {
        InventoryErrorKind::Cancelled
        | InventoryErrorKind::CloneFailed
        | InventoryErrorKind::FingerprintFailed => e,
        _ => wrap(e.to_string()),
    }
}

/// Fill the console URL template. The result is not validated.
pub fn compose_url(
    ticket: &ConsoleTicket,
    console_port: u16,
    entity_id: &str,
    entity_name: &str,
    inventory_host: &str,
) -> String {
    format!(
        "http://{}:{}/console/?vmId={}&vmName={}&host={}&sessionTicket={}&thumbprint={}",
        ticket.service_host,
        console_port,
        entity_id,
        encode(entity_name),
        inventory_host,
        encode(&ticket.session_token),
        ticket.tls_fingerprint,
    )
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSession;
    use crate::types::{ObjectKind, ObjectReference, PropertyValue};

    fn ticket() -> ConsoleTicket {
        ConsoleTicket {
            session_token: "cst-VCT-52a1+9f".into(),
            tls_fingerprint: "AB:CD".into(),
            service_host: "vc.lab".into(),
        }
    }

    #[test]
    fn url_template() {
        let url = compose_url(&ticket(), 7331, "vm-42", "web 01", "vc.lab");
        assert_eq!(
            url,
            "http://vc.lab:7331/console/?vmId=vm-42&vmName=web+01&host=vc.lab&sessionTicket=cst-VCT-52a1%2B9f&thumbprint=AB:CD"
        );
    }

    #[tokio::test]
    async fn link_uses_fresh_ticket_each_time() {
        let session = FakeSession::builder()
            .certificate(b"leaf-der".to_vec())
            .build();
        let handoff = ConsoleHandoff::new(&session, CancelSignal::never()).with_port(9443);
        let vm = PropertyRecord::new(ObjectReference::new(ObjectKind::VirtualMachine, "vm-1"))
            .with("name", PropertyValue::Text("db".into()));
        let first = handoff.console_link(&vm).await.unwrap();
        let second = handoff.console_link(&vm).await.unwrap();
        assert_ne!(first.ticket.session_token, second.ticket.session_token);
        assert_eq!(first.ticket.tls_fingerprint, second.ticket.tls_fingerprint);
        assert!(first.url.contains(":9443/console/?vmId=vm-1&vmName=db&"));
        assert_eq!(first.valid_for_secs, 60);
        assert_eq!(session.count_calls("AcquireCloneTicket"), 2);
        assert_eq!(session.count_calls("ProbeTls"), 2);
    }

    #[tokio::test]
    async fn clone_failure_stops_the_handoff() {
        let session = FakeSession::builder()
            .certificate(b"leaf-der".to_vec())
            .fail_call("AcquireCloneTicket")
            .build();
        let handoff = ConsoleHandoff::new(&session, CancelSignal::never());
        let err = handoff.issue().await.unwrap_err();
        assert_eq!(err.kind, InventoryErrorKind::CloneFailed);
        assert_eq!(session.count_calls("ProbeTls"), 0);
    }

    #[tokio::test]
    async fn empty_ticket_is_clone_failure() {
        let session = FakeSession::builder()
            .certificate(b"leaf-der".to_vec())
            .clone_ticket("")
            .build();
        let handoff = ConsoleHandoff::new(&session, CancelSignal::never());
        let err = handoff.clone_session().await.unwrap_err();
        assert_eq!(err.kind, InventoryErrorKind::CloneFailed);
    }

    #[tokio::test]
    async fn probe_failure_is_fingerprint_failure() {
        let session = FakeSession::builder().fail_call("ProbeTls").build();
        let handoff = ConsoleHandoff::new(&session, CancelSignal::never());
        let err = handoff.server_fingerprint().await.unwrap_err();
        assert_eq!(err.kind, InventoryErrorKind::FingerprintFailed);
    }

    #[tokio::test]
    async fn sha256_thumbprint_has_32_pairs() {
        let session = FakeSession::builder()
            .certificate(b"leaf-der".to_vec())
            .build();
        let handoff = ConsoleHandoff::new(&session, CancelSignal::never())
            .with_algorithm(FingerprintAlgorithm::Sha256);
        let fp = handoff.server_fingerprint().await.unwrap();
        assert_eq!(fp.split(':').count(), 32);
    }
}
