//! Batched property retrieval, one round trip per kind group.

use std::collections::HashMap;

use futures::future::join_all;

use crate::error::{InventoryError, InventoryErrorKind, InventoryResult};
use crate::session::{CancelSignal, InventorySession, VimRequest, VimResponse};
use crate::types::{ObjectKind, ObjectReference, PropertyRecord, ReferenceSet};

/// Records per kind, plus the groups that could not be retrieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    groups: Vec<(ObjectKind, Vec<PropertyRecord>)>,
    failures: Vec<InventoryError>,
}

impl Projection {
    /// Records of one kind, in the order the references were given.
    /// Empty for kinds that failed or were not requested.
    pub fn records(&self, kind: ObjectKind) -> &[PropertyRecord] {
        self.groups
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, records)| records.as_slice())
            .unwrap_or(&[])
    }

    pub fn groups(&self) -> impl Iterator<Item = (ObjectKind, &[PropertyRecord])> + '_ {
        self.groups.iter().map(|(kind, records)| (*kind, records.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyRecord> + '_ {
        self.groups.iter().flat_map(|(_, records)| records.iter())
    }

    pub fn into_records(self) -> impl Iterator<Item = PropertyRecord> {
        self.groups.into_iter().flat_map(|(_, records)| records)
    }

    /// One `ProjectionFailed(kind)` error per failed group.
    pub fn failures(&self) -> &[InventoryError] {
        &self.failures
    }

    pub fn failed_kinds(&self) -> Vec<ObjectKind> {
        self.failures
            .iter()
            .filter_map(|e| match e.kind {
                InventoryErrorKind::ProjectionFailed(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, records)| records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, kind: ObjectKind, outcome: InventoryResult<Vec<PropertyRecord>>) -> InventoryResult<()> {
        match outcome {
            Ok(records) => self.groups.push((kind, records)),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                let failure = InventoryError::projection(kind, &e);
                log::warn!("{failure}");
                self.failures.push(failure);
                self.groups.push((kind, Vec::new()));
            }
        }
        Ok(())
    }
}

/// Retrieves properties for heterogeneous reference sets.
pub struct PropertyProjector<'a, S: InventorySession + ?Sized> {
    session: &'a S,
    cancel: CancelSignal,
}

impl<'a, S: InventorySession + ?Sized> PropertyProjector<'a, S> {
    pub fn new(session: &'a S, cancel: CancelSignal) -> Self {
        Self { session, cancel }
    }

    /// Retrieve `properties` (or each kind's defaults when empty) for every
    /// reference, one call per kind group, sequentially.
    ///
    /// A failed group is recorded and yields no records; only
    /// cancellation aborts the whole projection.
    pub async fn project(&self, refs: &ReferenceSet, properties: &[&str]) -> InventoryResult<Projection> {
        let mut projection = Projection::default();
        for (kind, group) in refs.groups() {
            let paths = effective_properties(kind, properties);
            let outcome = self.project_group(kind, group, paths).await;
            projection.push(kind, outcome)?;
        }
        Ok(projection)
    }

    /// Same result as [`project`](Self::project), with the kind groups
    /// retrieved concurrently.
    pub async fn project_concurrent(
        &self,
        refs: &ReferenceSet,
        properties: &[&str],
    ) -> InventoryResult<Projection> {
        let pending = refs.groups().map(|(kind, group)| async move {
            let paths = effective_properties(kind, properties);
            (kind, self.project_group(kind, group, paths).await)
        });
        let mut projection = Projection::default();
        for (kind, outcome) in join_all(pending).await {
            projection.push(kind, outcome)?;
        }
        Ok(projection)
    }

    async fn project_group(
        &self,
        kind: ObjectKind,
        refs: &[ObjectReference],
        properties: Vec<String>,
    ) -> InventoryResult<Vec<PropertyRecord>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Retrieving {properties:?} for {} {kind} object(s)", refs.len());
        let request = VimRequest::RetrieveProperties {
            kind,
            objects: refs.to_vec(),
            properties,
        };
        let records = self
            .cancel
            .guard(request.method(), self.session.issue_call(request))
            .await
            .and_then(VimResponse::into_objects)?;
        Ok(in_request_order(refs, records))
    }
}

/// Requested paths for one kind, always starting with `name`.
pub fn effective_properties(kind: ObjectKind, requested: &[&str]) -> Vec<String> {
    let requested = if requested.is_empty() {
        kind.default_properties()
    } else {
        requested
    };
    let mut paths = vec!["name".to_string()];
    for &path in requested {
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }
    paths
}

/// Reorder retrieved records to match `refs`, dropping anything that was
/// not asked for and keeping the first copy of duplicates.
fn in_request_order(refs: &[ObjectReference], records: Vec<PropertyRecord>) -> Vec<PropertyRecord> {
    let mut by_ref: HashMap<ObjectReference, PropertyRecord> = HashMap::with_capacity(records.len());
    for record in records {
        by_ref.entry(record.reference.clone()).or_insert(record);
    }
    refs.iter()
        .filter_map(|r| {
            let record = by_ref.remove(r);
            if record.is_none() {
                log::debug!("{r} vanished before its properties were read");
            }
            record
        })
        .collect()
}
