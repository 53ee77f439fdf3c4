//! The session collaborator seam and the cancellation signal.
//!
//! Everything above this module talks to the inventory service only
//! through [`InventorySession`]. The SOAP client in `vsphere` is one
//! implementation; `testing::FakeSession` is another.

use std::future::Future;

use tokio::sync::watch;

use crate::config::ServiceEndpoint;
use crate::error::{InventoryError, InventoryResult};
use crate::types::{ObjectKind, ObjectReference, PropertyRecord, ServiceContent};

// ── Requests / responses ────────────────────────────────────────────

/// Low-level protocol calls the core issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VimRequest {
    /// Build a view over `container` listing objects of `kinds`.
    CreateContainerView {
        container: ObjectReference,
        kinds: Vec<ObjectKind>,
        recursive: bool,
    },
    DestroyView {
        view: ObjectReference,
    },
    /// Homogeneous retrieval: every object must be of `kind`.
    RetrieveProperties {
        kind: ObjectKind,
        objects: Vec<ObjectReference>,
        properties: Vec<String>,
    },
    AcquireCloneTicket,
}

impl VimRequest {
    /// Wire name of the call, used in error messages and logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CreateContainerView { .. } => "CreateContainerView",
            Self::DestroyView { .. } => "DestroyView",
            Self::RetrieveProperties { .. } => "RetrievePropertiesEx",
            Self::AcquireCloneTicket => "AcquireCloneTicket",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VimResponse {
    Reference(ObjectReference),
    Objects(Vec<PropertyRecord>),
    Ticket(String),
    Empty,
}

impl VimResponse {
    pub fn into_reference(self) -> InventoryResult<ObjectReference> {
        match self {
            Self::Reference(r) => Ok(r),
            other => Err(unexpected("reference", &other)),
        }
    }

    pub fn into_objects(self) -> InventoryResult<Vec<PropertyRecord>> {
        match self {
            Self::Objects(objects) => Ok(objects),
            Self::Empty => Ok(Vec::new()),
            other => Err(unexpected("object list", &other)),
        }
    }

    pub fn into_ticket(self) -> InventoryResult<String> {
        match self {
            Self::Ticket(t) => Ok(t),
            other => Err(unexpected("ticket", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &VimResponse) -> InventoryError {
    let got = match got {
        VimResponse::Reference(_) => "reference",
        VimResponse::Objects(_) => "object list",
        VimResponse::Ticket(_) => "ticket",
        VimResponse::Empty => "empty response",
    };
    InventoryError::parse(format!("expected {wanted}, got {got}"))
}

/// DER certificates presented by the service, leaf first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateChain(pub Vec<Vec<u8>>);

impl CertificateChain {
    pub fn leaf(&self) -> Option<&[u8]> {
        self.0.first().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Collaborator trait ──────────────────────────────────────────────

/// An authenticated session with the inventory service.
///
/// Implementations are opened once per invocation and shared read-only.
#[async_trait::async_trait]
pub trait InventorySession: Send + Sync {
    /// Root content descriptor fetched at connect time.
    fn service_content(&self) -> &ServiceContent;

    /// Endpoint the session was opened against.
    fn endpoint(&self) -> &ServiceEndpoint;

    /// Host the session is bound to, as passed to the console client.
    fn inventory_host(&self) -> String {
        self.endpoint().host_port()
    }

    /// Issue one protocol call.
    async fn issue_call(&self, request: VimRequest) -> InventoryResult<VimResponse>;

    /// Handshake with the service endpoint and return its certificate chain.
    async fn probe_tls(&self) -> InventoryResult<CertificateChain>;
}

// ── Cancellation ────────────────────────────────────────────────────

/// Caller-supplied signal that aborts in-flight remote calls.
///
/// Cloning is cheap; all clones observe the same trigger.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Trigger side of a [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires. Pends forever if the handle was
    /// dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut`, returning `Cancelled` if the signal fires first.
    pub async fn guard<T, F>(&self, call: &str, fut: F) -> InventoryResult<T>
    where
        F: Future<Output = InventoryResult<T>>,
    {
        if self.is_cancelled() {
            return Err(InventoryError::cancelled(format!("{call} not started")));
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => {
                log::debug!("{call} cancelled");
                Err(InventoryError::cancelled(format!("{call} aborted")))
            }
            res = fut => res,
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn guard_passes_result_through() {
        let signal = CancelSignal::never();
        let out = signal.guard("Noop", async { Ok::<_, InventoryError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn guard_aborts_pending_call() {
        let (handle, signal) = CancelSignal::new();
        let call = signal.guard("Slow", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, InventoryError>(())
        });
        handle.cancel();
        let err = call.await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn fired_signal_rejects_new_calls() {
        let (handle, signal) = CancelSignal::new();
        handle.cancel();
        assert!(signal.is_cancelled());
        let err = signal
            .guard("Late", async { Ok::<_, InventoryError>(()) })
            .await
            .unwrap_err();
        assert!(err.message.contains("not started"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_never_cancels() {
        let (handle, signal) = CancelSignal::new();
        drop(handle);
        let out = signal
            .guard("Tick", async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, InventoryError>("done")
            })
            .await;
        assert_eq!(out.unwrap(), "done");
    }

    #[test]
    fn response_conversions() {
        assert!(VimResponse::Empty.into_objects().unwrap().is_empty());
        let err = VimResponse::Empty.into_ticket().unwrap_err();
        assert!(err.message.contains("expected ticket"));
        assert_eq!(
            VimResponse::Ticket("t".into()).into_ticket().unwrap(),
            "t"
        );
    }

    #[test]
    fn chain_leaf_is_first() {
        let chain = CertificateChain(vec![vec![1], vec![2]]);
        assert_eq!(chain.leaf(), Some(&[1u8][..]));
        assert!(CertificateChain::default().leaf().is_none());
    }
}
