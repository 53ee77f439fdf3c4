//! Cross-reference assembly: resolve the references a virtual machine
//! carries (host, datastores, networks) into named records.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{InventoryError, InventoryResult};
use crate::projector::PropertyProjector;
use crate::session::{CancelSignal, InventorySession};
use crate::types::{ObjectKind, ObjectReference, PropertyRecord, ReferenceSet};

/// Fields of a virtual machine record that hold references to resolve.
pub const REFERENCE_FIELDS: &[&str] = &["summary.runtime.host", "runtime.host", "datastore", "network"];

/// The kinds of object a central entity links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LinkedKind {
    Host,
    Network,
    Portgroup,
    Datastore,
}

impl LinkedKind {
    pub fn classify(kind: ObjectKind) -> Option<Self> {
        match kind {
            ObjectKind::HostSystem => Some(Self::Host),
            ObjectKind::Network | ObjectKind::OpaqueNetwork => Some(Self::Network),
            ObjectKind::DistributedVirtualPortgroup => Some(Self::Portgroup),
            ObjectKind::Datastore => Some(Self::Datastore),
            _ => None,
        }
    }
}

/// Every linkable reference in `central`, deduplicated across fields.
pub fn collect_references(central: &PropertyRecord) -> ReferenceSet {
    let mut refs = ReferenceSet::new();
    for field in REFERENCE_FIELDS {
        for reference in central.references_at(field) {
            if LinkedKind::classify(reference.kind).is_some() {
                refs.insert(reference.clone());
            }
        }
    }
    refs
}

/// A central record plus the records of everything it references.
///
/// Each resolved object is held once; the per-kind lists and the lookup
/// table share the same instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityView {
    pub entity: PropertyRecord,
    pub hosts: Vec<Arc<PropertyRecord>>,
    pub networks: Vec<Arc<PropertyRecord>>,
    pub portgroups: Vec<Arc<PropertyRecord>>,
    pub datastores: Vec<Arc<PropertyRecord>>,
    lookup: HashMap<ObjectReference, Arc<PropertyRecord>>,
    /// Kind groups that could not be resolved.
    pub failures: Vec<InventoryError>,
}

impl EntityView {
    fn new(entity: PropertyRecord) -> Self {
        Self {
            entity,
            hosts: Vec::new(),
            networks: Vec::new(),
            portgroups: Vec::new(),
            datastores: Vec::new(),
            lookup: HashMap::new(),
            failures: Vec::new(),
        }
    }

    fn slot(&mut self, kind: LinkedKind) -> &mut Vec<Arc<PropertyRecord>> {
        match kind {
            LinkedKind::Host => &mut self.hosts,
            LinkedKind::Network => &mut self.networks,
            LinkedKind::Portgroup => &mut self.portgroups,
            LinkedKind::Datastore => &mut self.datastores,
        }
    }

    fn add(&mut self, kind: LinkedKind, record: PropertyRecord) {
        let record = Arc::new(record);
        self.lookup.insert(record.reference.clone(), Arc::clone(&record));
        self.slot(kind).push(record);
    }

    pub fn resolved(&self, kind: LinkedKind) -> &[Arc<PropertyRecord>] {
        match kind {
            LinkedKind::Host => &self.hosts,
            LinkedKind::Network => &self.networks,
            LinkedKind::Portgroup => &self.portgroups,
            LinkedKind::Datastore => &self.datastores,
        }
    }

    /// Record for a reference, if its kind group resolved.
    pub fn record_for(&self, reference: &ObjectReference) -> Option<&Arc<PropertyRecord>> {
        self.lookup.get(reference)
    }

    /// Name of a referenced object, if it was resolved.
    pub fn name_of(&self, reference: &ObjectReference) -> Option<&str> {
        self.record_for(reference).map(|r| r.name())
    }

    /// The host the entity runs on.
    pub fn host(&self) -> Option<&Arc<PropertyRecord>> {
        self.hosts.first()
    }

    pub fn resolved_count(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Resolves a central record's references through the projector.
pub struct CrossReferenceAssembler<'a, S: InventorySession + ?Sized> {
    projector: PropertyProjector<'a, S>,
}

impl<'a, S: InventorySession + ?Sized> CrossReferenceAssembler<'a, S> {
    pub fn new(session: &'a S, cancel: CancelSignal) -> Self {
        Self {
            projector: PropertyProjector::new(session, cancel),
        }
    }

    /// Build the [`EntityView`] for `central`.
    ///
    /// References are deduplicated across all fields first, then fetched
    /// with one `name` retrieval per kind. A failed kind is left out of
    /// the view and recorded in `failures`; no retries are made.
    pub async fn assemble(&self, central: &PropertyRecord) -> InventoryResult<EntityView> {
        let refs = collect_references(central);
        log::debug!(
            "Resolving {} reference(s) of {}",
            refs.len(),
            central.reference
        );
        let projection = self.projector.project(&refs, &["name"]).await?;

        let mut view = EntityView::new(central.clone());
        view.failures = projection.failures().to_vec();
        for record in projection.into_records() {
            match LinkedKind::classify(record.reference.kind) {
                Some(kind) => view.add(kind, record),
                None => log::debug!("ignoring unlinked {}", record.reference),
            }
        }
        Ok(view)
    }
}
