//! In-memory [`InventorySession`] for tests and offline demos.
//!
//! The fake keeps an inventory tree: datacenters hang off the root
//! folder, everything else off a datacenter, folder, cluster or resource
//! pool. It answers the same calls the SOAP client issues, and container
//! views honour `recursive`. Every call is logged so tests can assert on
//! round trips.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::ServiceEndpoint;
use crate::error::{InventoryError, InventoryResult};
use crate::session::{CertificateChain, InventorySession, VimRequest, VimResponse};
use crate::types::{AboutInfo, ObjectKind, ObjectReference, PropertyRecord, PropertyValue, ServiceContent};

const ROOT_FOLDER: &str = "group-d1";
const DEFAULT_CERTIFICATE: &[u8] = b"fake-certificate";

fn text(value: &str) -> PropertyValue {
    PropertyValue::Text(value.to_string())
}

fn object<const N: usize>(fields: [(&str, PropertyValue); N]) -> PropertyValue {
    PropertyValue::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn reference(kind: ObjectKind, id: &str) -> PropertyValue {
    PropertyValue::Reference(ObjectReference::new(kind, id))
}

// ── Virtual machine fixture ─────────────────────────────────────────

/// Builder for a fake virtual machine.
#[derive(Debug, Clone)]
pub struct FakeVm {
    id: String,
    name: String,
    host: Option<String>,
    datastores: Vec<String>,
    networks: Vec<(ObjectKind, String)>,
    guest: Option<(String, String)>,
    power_state: String,
    annotation: String,
}

impl FakeVm {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            host: None,
            datastores: Vec::new(),
            networks: Vec::new(),
            guest: None,
            power_state: "poweredOn".to_string(),
            annotation: String::new(),
        }
    }

    pub fn host(mut self, id: &str) -> Self {
        self.host = Some(id.to_string());
        self
    }

    pub fn datastores(mut self, ids: &[&str]) -> Self {
        self.datastores = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn networks(mut self, refs: &[(ObjectKind, &str)]) -> Self {
        self.networks = refs.iter().map(|(k, id)| (*k, id.to_string())).collect();
        self
    }

    pub fn guest(mut self, host_name: &str, ip_address: &str) -> Self {
        self.guest = Some((host_name.to_string(), ip_address.to_string()));
        self
    }

    pub fn power_state(mut self, state: &str) -> Self {
        self.power_state = state.to_string();
        self
    }

    pub fn annotation(mut self, annotation: &str) -> Self {
        self.annotation = annotation.to_string();
        self
    }

    pub(crate) fn into_record(self) -> PropertyRecord {
        let (host_name, ip_address) = self.guest.unwrap_or_default();
        let guest_fields = || {
            object([
                ("hostName", text(&host_name)),
                ("ipAddress", text(&ip_address)),
                ("guestId", text("otherLinux64Guest")),
                ("guestFullName", text("Other Linux (64-bit)")),
                ("toolsRunningStatus", text("guestToolsRunning")),
            ])
        };
        let mut runtime = BTreeMap::new();
        runtime.insert("powerState".to_string(), text(&self.power_state));
        if let Some(host) = &self.host {
            runtime.insert("host".to_string(), reference(ObjectKind::HostSystem, host));
        }
        let summary = object([
            (
                "config",
                object([
                    ("name", text(&self.name)),
                    ("vmPathName", text(&format!("[datastore1] {0}/{0}.vmx", self.name))),
                    ("guestId", text("otherLinux64Guest")),
                    ("numCpu", PropertyValue::Integer(2)),
                    ("memorySizeMB", PropertyValue::Integer(4096)),
                    ("annotation", text(&self.annotation)),
                    ("template", PropertyValue::Boolean(false)),
                ]),
            ),
            ("guest", guest_fields()),
            ("runtime", PropertyValue::Object(runtime)),
            ("storage", object([("committed", PropertyValue::Integer(8_589_934_592))])),
            ("quickStats", object([("uptimeSeconds", PropertyValue::Integer(3600))])),
        ]);
        PropertyRecord::new(ObjectReference::new(ObjectKind::VirtualMachine, &self.id))
            .with("name", text(&self.name))
            .with("summary", summary)
            .with("guest", guest_fields())
            .with("config", object([("name", text(&self.name))]))
            .with(
                "datastore",
                PropertyValue::List(
                    self.datastores
                        .iter()
                        .map(|id| reference(ObjectKind::Datastore, id))
                        .collect(),
                ),
            )
            .with(
                "network",
                PropertyValue::List(
                    self.networks
                        .iter()
                        .map(|(kind, id)| reference(*kind, id))
                        .collect(),
                ),
            )
    }
}

// ── Builder ─────────────────────────────────────────────────────────

struct FakeObject {
    record: PropertyRecord,
    parent: ObjectReference,
}

/// Builder for [`FakeSession`].
pub struct FakeSessionBuilder {
    objects: Vec<FakeObject>,
    failing_kinds: HashSet<ObjectKind>,
    failing_calls: HashSet<String>,
    duplicate_views: bool,
    clone_ticket: Option<String>,
    certificate: Vec<u8>,
    endpoint: ServiceEndpoint,
}

impl FakeSessionBuilder {
    fn add(mut self, parent: ObjectReference, record: PropertyRecord) -> Self {
        self.objects.push(FakeObject { record, parent });
        self
    }

    fn named(kind: ObjectKind, id: &str, name: &str) -> PropertyRecord {
        PropertyRecord::new(ObjectReference::new(kind, id)).with("name", text(name))
    }

    /// Reference of an already added object with this id. Unknown ids
    /// are taken to be datacenters.
    fn parent(&self, id: &str) -> ObjectReference {
        self.objects
            .iter()
            .map(|o| &o.record.reference)
            .find(|r| r.id == id)
            .cloned()
            .unwrap_or_else(|| ObjectReference::new(ObjectKind::Datacenter, id))
    }

    fn child(self, parent: &str, record: PropertyRecord) -> Self {
        let parent = self.parent(parent);
        self.add(parent, record)
    }

    pub fn datacenter(self, id: &str, name: &str) -> Self {
        let root = ObjectReference::new(ObjectKind::Folder, ROOT_FOLDER);
        self.add(root, Self::named(ObjectKind::Datacenter, id, name))
    }

    pub fn folder(self, parent: &str, id: &str, name: &str) -> Self {
        self.child(parent, Self::named(ObjectKind::Folder, id, name))
    }

    pub fn cluster(self, parent: &str, id: &str, name: &str) -> Self {
        self.child(parent, Self::named(ObjectKind::ClusterComputeResource, id, name))
    }

    pub fn resource_pool(self, parent: &str, id: &str, name: &str) -> Self {
        self.child(parent, Self::named(ObjectKind::ResourcePool, id, name))
    }

    pub fn datastore(self, dc: &str, id: &str, name: &str) -> Self {
        let record = Self::named(ObjectKind::Datastore, id, name).with(
            "summary",
            object([
                ("name", text(name)),
                ("type", text("VMFS")),
                ("capacity", PropertyValue::Integer(1_099_511_627_776)),
                ("freeSpace", PropertyValue::Integer(549_755_813_888)),
                ("accessible", PropertyValue::Boolean(true)),
            ]),
        );
        self.child(dc, record)
    }

    pub fn storage_pod(self, dc: &str, id: &str, name: &str) -> Self {
        let record = Self::named(ObjectKind::StoragePod, id, name).with(
            "summary",
            object([
                ("name", text(name)),
                ("capacity", PropertyValue::Integer(2_199_023_255_552)),
                ("freeSpace", PropertyValue::Integer(1_099_511_627_776)),
            ]),
        );
        self.child(dc, record)
    }

    pub fn network(self, dc: &str, id: &str, name: &str) -> Self {
        let record = Self::named(ObjectKind::Network, id, name).with(
            "summary",
            object([("name", text(name)), ("accessible", PropertyValue::Boolean(true))]),
        );
        self.child(dc, record)
    }

    pub fn portgroup(self, dc: &str, id: &str, name: &str) -> Self {
        let record = Self::named(ObjectKind::DistributedVirtualPortgroup, id, name).with(
            "summary",
            object([("name", text(name)), ("accessible", PropertyValue::Boolean(true))]),
        );
        self.child(dc, record)
    }

    pub fn switch(self, dc: &str, id: &str, name: &str, portgroups: &[&str]) -> Self {
        let record = Self::named(ObjectKind::DistributedVirtualSwitch, id, name).with(
            "summary",
            object([
                ("name", text(name)),
                (
                    "portgroupName",
                    PropertyValue::List(portgroups.iter().map(|pg| text(pg)).collect()),
                ),
            ]),
        );
        self.child(dc, record)
    }

    pub fn host(self, dc: &str, id: &str, name: &str) -> Self {
        self.child(dc, Self::named(ObjectKind::HostSystem, id, name))
    }

    /// Add a VM under `parent`: a datacenter, folder or resource pool.
    pub fn vm(self, parent: &str, vm: FakeVm) -> Self {
        self.child(parent, vm.into_record())
    }

    /// Make every property retrieval for `kind` fail.
    pub fn fail_kind(mut self, kind: ObjectKind) -> Self {
        self.failing_kinds.insert(kind);
        self
    }

    /// Make every call named `method` fail (`ProbeTls` for the TLS probe).
    pub fn fail_call(mut self, method: &str) -> Self {
        self.failing_calls.insert(method.to_string());
        self
    }

    /// Report every view member twice.
    pub fn duplicate_views(mut self) -> Self {
        self.duplicate_views = true;
        self
    }

    /// Return `ticket` from every clone call instead of fresh ones.
    pub fn clone_ticket(mut self, ticket: &str) -> Self {
        self.clone_ticket = Some(ticket.to_string());
        self
    }

    pub fn certificate(mut self, der: Vec<u8>) -> Self {
        self.certificate = der;
        self
    }

    pub fn endpoint(mut self, endpoint: ServiceEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn build(self) -> FakeSession {
        FakeSession {
            content: ServiceContent {
                root_folder: ObjectReference::new(ObjectKind::Folder, ROOT_FOLDER),
                property_collector: ObjectReference::new(ObjectKind::PropertyCollector, "propertyCollector"),
                view_manager: ObjectReference::new(ObjectKind::ViewManager, "ViewManager"),
                session_manager: ObjectReference::new(ObjectKind::SessionManager, "SessionManager"),
                about: AboutInfo {
                    name: "VMware vCenter Server".into(),
                    full_name: "VMware vCenter Server 7.0.3 build-20150588".into(),
                    vendor: "VMware, Inc.".into(),
                    version: "7.0.3".into(),
                    build: "20150588".into(),
                    os_type: "linux-x64".into(),
                    api_type: "VirtualCenter".into(),
                    api_version: "7.0.3.0".into(),
                    product_line_id: "vpx".into(),
                    instance_uuid: "0c9e7a34-2f51-4c1b-9d3e-5a8b1f2e6d70".into(),
                },
            },
            endpoint: self.endpoint,
            objects: self.objects,
            failing_kinds: self.failing_kinds,
            failing_calls: self.failing_calls,
            duplicate_views: self.duplicate_views,
            clone_ticket: self.clone_ticket,
            certificate: self.certificate,
            state: Mutex::new(FakeState::default()),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    views: HashMap<ObjectReference, Vec<ObjectReference>>,
    next_view: u32,
    next_ticket: u32,
}

/// Scripted inventory service.
pub struct FakeSession {
    content: ServiceContent,
    endpoint: ServiceEndpoint,
    objects: Vec<FakeObject>,
    failing_kinds: HashSet<ObjectKind>,
    failing_calls: HashSet<String>,
    duplicate_views: bool,
    clone_ticket: Option<String>,
    certificate: Vec<u8>,
    state: Mutex<FakeState>,
}

impl FakeSession {
    pub fn builder() -> FakeSessionBuilder {
        FakeSessionBuilder {
            objects: Vec::new(),
            failing_kinds: HashSet::new(),
            failing_calls: HashSet::new(),
            duplicate_views: false,
            clone_ticket: None,
            certificate: DEFAULT_CERTIFICATE.to_vec(),
            endpoint: ServiceEndpoint {
                scheme: "https".into(),
                host: "vc.lab".into(),
                port: None,
                path: "/sdk".into(),
                username: "administrator@vsphere.local".into(),
                password: String::new(),
                insecure: false,
            },
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of logged calls starting with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state().calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Views created and not yet destroyed.
    pub fn open_views(&self) -> usize {
        self.state().views.len()
    }

    fn log(&self, entry: String) {
        self.state().calls.push(entry);
    }

    fn check_call(&self, method: &str) -> InventoryResult<()> {
        if self.failing_calls.contains(method) {
            return Err(InventoryError::soap_fault(format!("{method}: injected failure")));
        }
        Ok(())
    }

    /// Whether `object` sits anywhere below `container`.
    fn is_under(&self, object: &FakeObject, container: &ObjectReference) -> bool {
        let mut parent = &object.parent;
        for _ in 0..=self.objects.len() {
            if parent == container {
                return true;
            }
            match self.objects.iter().find(|o| o.record.reference == *parent) {
                Some(up) => parent = &up.parent,
                None => return false,
            }
        }
        false
    }

    fn members(&self, container: &ObjectReference, kinds: &[ObjectKind], recursive: bool) -> Vec<ObjectReference> {
        let copies = if self.duplicate_views { 2 } else { 1 };
        self.objects
            .iter()
            .filter(|o| {
                if recursive {
                    self.is_under(o, container)
                } else {
                    o.parent == *container
                }
            })
            .map(|o| &o.record.reference)
            .filter(|r| kinds.is_empty() || kinds.iter().any(|k| r.kind.is_a(*k)))
            .flat_map(|r| std::iter::repeat(r.clone()).take(copies))
            .collect()
    }

    fn project(&self, record: &PropertyRecord, properties: &[String]) -> PropertyRecord {
        let mut out = PropertyRecord::new(record.reference.clone());
        for path in properties {
            if let Some(value) = record.get(path) {
                out.properties.insert(path.clone(), value.clone());
            }
        }
        out
    }

    fn retrieve(
        &self,
        kind: ObjectKind,
        objects: &[ObjectReference],
        properties: &[String],
    ) -> InventoryResult<Vec<PropertyRecord>> {
        if kind == ObjectKind::ContainerView {
            let state = self.state();
            return Ok(objects
                .iter()
                .filter_map(|view| {
                    let members = state.views.get(view)?;
                    Some(PropertyRecord::new(view.clone()).with(
                        "view",
                        PropertyValue::List(members.iter().cloned().map(PropertyValue::Reference).collect()),
                    ))
                })
                .collect());
        }
        if self.failing_kinds.contains(&kind) {
            return Err(InventoryError::soap_fault(format!(
                "NoPermission: cannot read {kind} properties"
            )));
        }
        if let Some(stray) = objects.iter().find(|r| r.kind != kind) {
            return Err(InventoryError::soap_fault(format!(
                "InvalidArgument: {stray} is not a {kind}"
            )));
        }
        // Reversed, so callers cannot rely on service ordering.
        Ok(objects
            .iter()
            .rev()
            .filter_map(|r| self.objects.iter().find(|o| o.record.reference == *r))
            .map(|o| self.project(&o.record, properties))
            .collect())
    }
}

#[async_trait::async_trait]
impl InventorySession for FakeSession {
    fn service_content(&self) -> &ServiceContent {
        &self.content
    }

    fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    async fn issue_call(&self, request: VimRequest) -> InventoryResult<VimResponse> {
        let method = request.method();
        match request {
            VimRequest::CreateContainerView { container, kinds, recursive } => {
                let names: Vec<_> = kinds.iter().map(|k| k.to_string()).collect();
                self.log(format!("CreateContainerView({container} [{}])", names.join(", ")));
                self.check_call(method)?;
                let members = self.members(&container, &kinds, recursive);
                let mut state = self.state();
                state.next_view += 1;
                let view = ObjectReference::new(
                    ObjectKind::ContainerView,
                    format!("session[fake]{:04}", state.next_view),
                );
                state.views.insert(view.clone(), members);
                Ok(VimResponse::Reference(view))
            }
            VimRequest::DestroyView { view } => {
                self.log(format!("DestroyView({view})"));
                self.check_call(method)?;
                self.state().views.remove(&view);
                Ok(VimResponse::Empty)
            }
            VimRequest::RetrieveProperties { kind, objects, properties } => {
                let ids: Vec<_> = objects.iter().map(|o| o.id.as_str()).collect();
                self.log(format!("RetrievePropertiesEx({kind}:[{}])", ids.join(", ")));
                self.check_call(method)?;
                self.retrieve(kind, &objects, &properties).map(VimResponse::Objects)
            }
            VimRequest::AcquireCloneTicket => {
                self.log("AcquireCloneTicket".to_string());
                self.check_call(method)?;
                let ticket = match &self.clone_ticket {
                    Some(ticket) => ticket.clone(),
                    None => {
                        let mut state = self.state();
                        state.next_ticket += 1;
                        format!("cst-{:04}", state.next_ticket)
                    }
                };
                Ok(VimResponse::Ticket(ticket))
            }
        }
    }

    async fn probe_tls(&self) -> InventoryResult<CertificateChain> {
        self.log("ProbeTls".to_string());
        self.check_call("ProbeTls")?;
        Ok(CertificateChain(vec![self.certificate.clone()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn view_lifecycle_is_tracked() {
        let session = FakeSession::builder()
            .datacenter("datacenter-1", "Lab")
            .datastore("datacenter-1", "datastore-1", "ds")
            .network("datacenter-1", "network-1", "net")
            .build();
        let view = session
            .issue_call(VimRequest::CreateContainerView {
                container: ObjectReference::new(ObjectKind::Datacenter, "datacenter-1"),
                kinds: vec![ObjectKind::Datastore],
                recursive: true,
            })
            .await
            .unwrap()
            .into_reference()
            .unwrap();
        assert_eq!(session.open_views(), 1);
        let members = session
            .issue_call(VimRequest::RetrieveProperties {
                kind: ObjectKind::ContainerView,
                objects: vec![view.clone()],
                properties: vec!["view".into()],
            })
            .await
            .unwrap()
            .into_objects()
            .unwrap();
        assert_eq!(members[0].references_at("view").len(), 1);
        session
            .issue_call(VimRequest::DestroyView { view })
            .await
            .unwrap();
        assert_eq!(session.open_views(), 0);
    }

    async fn view_ids(session: &FakeSession, container: ObjectReference, recursive: bool) -> Vec<String> {
        let view = session
            .issue_call(VimRequest::CreateContainerView {
                container,
                kinds: vec![ObjectKind::VirtualMachine],
                recursive,
            })
            .await
            .unwrap()
            .into_reference()
            .unwrap();
        let members = session.state().views.get(&view).cloned().unwrap_or_default();
        members.into_iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn views_follow_the_hierarchy() {
        let session = FakeSession::builder()
            .datacenter("datacenter-1", "Lab")
            .folder("datacenter-1", "group-v3", "vm")
            .folder("group-v3", "group-v9", "sub")
            .resource_pool("group-v9", "resgroup-4", "rp")
            .vm("resgroup-4", FakeVm::new("vm-40", "deep"))
            .vm("datacenter-1", FakeVm::new("vm-1", "top"))
            .build();
        let dc = ObjectReference::new(ObjectKind::Datacenter, "datacenter-1");

        let mut all = view_ids(&session, dc.clone(), true).await;
        all.sort();
        assert_eq!(all, vec!["vm-1", "vm-40"]);
        assert_eq!(view_ids(&session, dc, false).await, vec!["vm-1"]);
        let pool = ObjectReference::new(ObjectKind::ResourcePool, "resgroup-4");
        assert_eq!(view_ids(&session, pool, false).await, vec!["vm-40"]);
    }

    #[tokio::test]
    async fn mixed_kinds_are_rejected() {
        let session = FakeSession::builder()
            .datacenter("datacenter-1", "Lab")
            .datastore("datacenter-1", "datastore-1", "ds")
            .build();
        let err = session
            .issue_call(VimRequest::RetrieveProperties {
                kind: ObjectKind::Network,
                objects: vec![ObjectReference::new(ObjectKind::Datastore, "datastore-1")],
                properties: vec!["name".into()],
            })
            .await
            .unwrap_err();
        assert!(err.message.contains("InvalidArgument"));
    }

    #[test]
    fn vm_fixture_carries_references() {
        let record = FakeVm::new("vm-1", "web")
            .host("host-1")
            .datastores(&["datastore-1", "datastore-2"])
            .into_record();
        assert_eq!(record.reference_at("summary.runtime.host").unwrap().id, "host-1");
        assert_eq!(record.references_at("datastore").len(), 2);
    }
}
