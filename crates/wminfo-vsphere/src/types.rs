//! Shared types for vSphere inventory reporting.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Object identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Managed-object kinds the reports know how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Folder,
    Datacenter,
    Datastore,
    /// Datastore cluster (`StoragePod` on the wire).
    StoragePod,
    Network,
    OpaqueNetwork,
    DistributedVirtualSwitch,
    DistributedVirtualPortgroup,
    VirtualMachine,
    HostSystem,
    ComputeResource,
    ClusterComputeResource,
    ResourcePool,
    ContainerView,
    PropertyCollector,
    ViewManager,
    SessionManager,
    ServiceInstance,
}

impl ObjectKind {
    /// The vim25 type name used in type filters and property specs.
    /// Subtypes match it, so switches use the base type.
    pub fn vim_type(self) -> &'static str {
        match self {
            Self::Folder => "Folder",
            Self::Datacenter => "Datacenter",
            Self::Datastore => "Datastore",
            Self::StoragePod => "StoragePod",
            Self::Network => "Network",
            Self::OpaqueNetwork => "OpaqueNetwork",
            Self::DistributedVirtualSwitch => "DistributedVirtualSwitch",
            Self::DistributedVirtualPortgroup => "DistributedVirtualPortgroup",
            Self::VirtualMachine => "VirtualMachine",
            Self::HostSystem => "HostSystem",
            Self::ComputeResource => "ComputeResource",
            Self::ClusterComputeResource => "ClusterComputeResource",
            Self::ResourcePool => "ResourcePool",
            Self::ContainerView => "ContainerView",
            Self::PropertyCollector => "PropertyCollector",
            Self::ViewManager => "ViewManager",
            Self::SessionManager => "SessionManager",
            Self::ServiceInstance => "ServiceInstance",
        }
    }

    /// The type written into `type="..."` of a managed-object reference.
    /// vCenter creates every switch it manages as the VMware subtype.
    pub fn moref_type(self) -> &'static str {
        match self {
            Self::DistributedVirtualSwitch => "VmwareDistributedVirtualSwitch",
            other => other.vim_type(),
        }
    }

    /// Parse a vim25 type name. Unknown names yield `None`.
    pub fn from_vim_type(name: &str) -> Option<Self> {
        let kind = match name {
            "Folder" => Self::Folder,
            "Datacenter" => Self::Datacenter,
            "Datastore" => Self::Datastore,
            "StoragePod" => Self::StoragePod,
            "Network" => Self::Network,
            "OpaqueNetwork" => Self::OpaqueNetwork,
            "DistributedVirtualSwitch" | "VmwareDistributedVirtualSwitch" => {
                Self::DistributedVirtualSwitch
            }
            "DistributedVirtualPortgroup" => Self::DistributedVirtualPortgroup,
            "VirtualMachine" => Self::VirtualMachine,
            "HostSystem" => Self::HostSystem,
            "ComputeResource" => Self::ComputeResource,
            "ClusterComputeResource" => Self::ClusterComputeResource,
            "ResourcePool" => Self::ResourcePool,
            "ContainerView" => Self::ContainerView,
            "PropertyCollector" => Self::PropertyCollector,
            "ViewManager" => Self::ViewManager,
            "SessionManager" => Self::SessionManager,
            "ServiceInstance" => Self::ServiceInstance,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether an object of this kind is also an instance of `other`
    /// in the vim25 type hierarchy (e.g. a port-group is a network).
    pub fn is_a(self, other: ObjectKind) -> bool {
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (Self::DistributedVirtualPortgroup, Self::Network)
                | (Self::OpaqueNetwork, Self::Network)
                | (Self::ClusterComputeResource, Self::ComputeResource)
                | (Self::StoragePod, Self::Folder)
        )
    }

    /// Properties fetched when a caller asks for none.
    pub fn default_properties(self) -> &'static [&'static str] {
        match self {
            Self::Datastore
            | Self::StoragePod
            | Self::Network
            | Self::OpaqueNetwork
            | Self::DistributedVirtualPortgroup
            | Self::DistributedVirtualSwitch => &["summary"],
            Self::VirtualMachine => &["name", "summary", "guest", "config", "datastore", "network"],
            _ => &["name"],
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.vim_type())
    }
}

/// Opaque, service-scoped identity of one inventory object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: ObjectKind,
    /// Managed-object id (e.g. "vm-42", "datastore-12").
    pub id: String,
}

impl ObjectReference {
    pub fn new(kind: ObjectKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.vim_type(), self.id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ReferenceSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// References grouped by kind. Groups keep first-seen order, references
/// keep insertion order, and a `(kind, id)` pair is stored at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    groups: Vec<(ObjectKind, Vec<ObjectReference>)>,
    seen: HashSet<ObjectReference>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference. Returns `false` if it was already present.
    pub fn insert(&mut self, reference: ObjectReference) -> bool {
        if !self.seen.insert(reference.clone()) {
            return false;
        }
        match self.groups.iter_mut().find(|(kind, _)| *kind == reference.kind) {
            Some((_, refs)) => refs.push(reference),
            None => self.groups.push((reference.kind, vec![reference])),
        }
        true
    }

    pub fn contains(&self, reference: &ObjectReference) -> bool {
        self.seen.contains(reference)
    }

    /// References of one kind, in insertion order.
    pub fn of_kind(&self, kind: ObjectKind) -> &[ObjectReference] {
        self.groups
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, refs)| refs.as_slice())
            .unwrap_or(&[])
    }

    /// Kinds present, in first-seen order.
    pub fn kinds(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        self.groups.iter().map(|(kind, _)| *kind)
    }

    pub fn groups(&self) -> impl Iterator<Item = (ObjectKind, &[ObjectReference])> + '_ {
        self.groups.iter().map(|(kind, refs)| (*kind, refs.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectReference> + '_ {
        self.groups.iter().flat_map(|(_, refs)| refs.iter())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Extend<ObjectReference> for ReferenceSet {
    fn extend<I: IntoIterator<Item = ObjectReference>>(&mut self, iter: I) {
        for reference in iter {
            self.insert(reference);
        }
    }
}

impl FromIterator<ObjectReference> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = ObjectReference>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Property values and records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dynamic value of one retrieved property.
///
/// Leaves inside nested data objects arrive without schema information,
/// so the numeric and boolean accessors also accept their text form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Reference(ObjectReference),
    /// A reference whose type this crate does not model.
    ForeignReference { vim_type: String, id: String },
    List(Vec<PropertyValue>),
    Object(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::Text(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ObjectReference> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// All references held by this value: a single reference or a list of them.
    pub fn references(&self) -> Vec<&ObjectReference> {
        match self {
            Self::Reference(r) => vec![r],
            Self::List(items) => items.iter().filter_map(Self::as_reference).collect(),
            _ => Vec::new(),
        }
    }

    /// All text leaves: a single text value or a list of them.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            Self::Text(s) => vec![s.as_str()],
            Self::List(items) => items.iter().filter_map(Self::as_text).collect(),
            _ => Vec::new(),
        }
    }

    /// Field of a nested data object.
    pub fn field(&self, name: &str) -> Option<&PropertyValue> {
        match self {
            Self::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Walk a dotted path of nested fields (`"config.numCpu"`).
    pub fn path(&self, path: &str) -> Option<&PropertyValue> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |value, segment| value.field(segment))
    }
}

/// Projection of one object onto a requested property set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRecord {
    pub reference: ObjectReference,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl PropertyRecord {
    pub fn new(reference: ObjectReference) -> Self {
        Self {
            reference,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.reference.id
    }

    /// The object's name, or an empty string if it was not retrieved.
    pub fn name(&self) -> &str {
        self.text("name").unwrap_or_default()
    }

    /// Look up a property or a dotted path into one.
    ///
    /// An exact property-name match wins, so property paths requested
    /// verbatim (`"summary.config"`) stay addressable.
    pub fn get(&self, path: &str) -> Option<&PropertyValue> {
        if let Some(value) = self.properties.get(path) {
            return Some(value);
        }
        let (head, rest) = path.split_once('.')?;
        self.properties.get(head)?.path(rest)
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(PropertyValue::as_text)
    }

    pub fn integer(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(PropertyValue::as_i64)
    }

    pub fn boolean(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(PropertyValue::as_bool)
    }

    pub fn reference_at(&self, path: &str) -> Option<&ObjectReference> {
        self.get(path).and_then(PropertyValue::as_reference)
    }

    pub fn references_at(&self, path: &str) -> Vec<&ObjectReference> {
        self.get(path).map(PropertyValue::references).unwrap_or_default()
    }

    pub fn texts_at(&self, path: &str) -> Vec<&str> {
        self.get(path).map(PropertyValue::texts).unwrap_or_default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Service content
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Product information published by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutInfo {
    pub name: String,
    pub full_name: String,
    pub vendor: String,
    pub version: String,
    pub build: String,
    pub os_type: String,
    pub api_type: String,
    pub api_version: String,
    pub product_line_id: String,
    pub instance_uuid: String,
}

/// Root content descriptor of the inventory service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: ObjectReference,
    pub property_collector: ObjectReference,
    pub view_manager: ObjectReference,
    pub session_manager: ObjectReference,
    pub about: AboutInfo,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Console
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hash used for the server certificate thumbprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    /// The thumbprint format the web console client checks.
    #[default]
    Sha1,
    Sha256,
}

impl FingerprintAlgorithm {
    /// Digest length in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }
}

/// Trust material for one console hand-off. Never reused across entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleTicket {
    /// Single-use clone ticket for the current session.
    pub session_token: String,
    /// `AA:BB:...` thumbprint of the service's leaf certificate.
    pub tls_fingerprint: String,
    /// Externally reachable host (with port, if one was given).
    pub service_host: String,
}

/// A composed console URL and the ticket it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLink {
    pub url: String,
    pub ticket: ConsoleTicket,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    /// Advisory validity of the clone ticket; the server enforces its own.
    pub valid_for_secs: u64,
}
