//! Reference discovery: datacenter scoping, container views and name
//! filtering.

use std::collections::HashMap;

use glob::Pattern;

use crate::error::{InventoryError, InventoryErrorKind, InventoryResult};
use crate::session::{CancelSignal, InventorySession, VimRequest, VimResponse};
use crate::types::{ObjectKind, ObjectReference, PropertyRecord, ReferenceSet};

/// Pattern used when the caller supplies none.
pub const MATCH_ALL: &str = "*";

/// Discovers typed references under a datacenter scope.
pub struct ReferenceResolver<'a, S: InventorySession + ?Sized> {
    session: &'a S,
    cancel: CancelSignal,
}

impl<'a, S: InventorySession + ?Sized> ReferenceResolver<'a, S> {
    pub fn new(session: &'a S, cancel: CancelSignal) -> Self {
        Self { session, cancel }
    }

    async fn call(&self, request: VimRequest) -> InventoryResult<VimResponse> {
        let method = request.method();
        self.cancel.guard(method, self.session.issue_call(request)).await
    }

    // ── Discovery ───────────────────────────────────────────────────

    /// Discover references of `kinds` inside `scope` whose names match
    /// `pattern` (default `*`). The result never holds a `(kind, id)`
    /// pair twice, whatever the service returns.
    pub async fn discover(
        &self,
        scope: Option<&str>,
        kinds: &[ObjectKind],
        pattern: Option<&str>,
    ) -> InventoryResult<ReferenceSet> {
        let pattern = pattern.unwrap_or(MATCH_ALL);
        let matcher = compile(pattern)?;
        let datacenter = self.datacenter_or_default(scope).await?;
        log::debug!(
            "Gathering {} references in {datacenter} with filter '{pattern}'",
            kinds.iter().map(|k| k.vim_type()).collect::<Vec<_>>().join(", ")
        );

        let members = self
            .container_members(&datacenter, kinds, true)
            .await?
            .into_iter()
            .filter(|r| kinds.contains(&r.kind))
            .collect::<Vec<_>>();

        let found: ReferenceSet = if pattern == MATCH_ALL {
            members.into_iter().collect()
        } else {
            let names = self.names_of(&members).await?;
            members
                .into_iter()
                .filter(|r| names.get(r).is_some_and(|n| matcher.matches(n)))
                .collect()
        };
        log::debug!("Discovered {} reference(s) in {datacenter}", found.len());
        Ok(found)
    }

    /// Datacenters anywhere under the root folder whose names match.
    pub async fn datacenters(&self, pattern: Option<&str>) -> InventoryResult<Vec<PropertyRecord>> {
        let matcher = compile(pattern.unwrap_or(MATCH_ALL))?;
        let root = self.session.service_content().root_folder.clone();
        let refs = self
            .container_members(&root, &[ObjectKind::Datacenter], true)
            .await?
            .into_iter()
            .filter(|r| r.kind == ObjectKind::Datacenter)
            .collect::<ReferenceSet>();
        let refs: Vec<ObjectReference> = refs.iter().cloned().collect();
        let mut records = self.fetch_names(ObjectKind::Datacenter, &refs).await?;
        records.retain(|r| matcher.matches(r.name()));
        Ok(records)
    }

    /// The named datacenter, or the only datacenter when no name is given.
    /// The name is matched literally, glob metacharacters included.
    pub async fn datacenter_or_default(&self, scope: Option<&str>) -> InventoryResult<ObjectReference> {
        let scope = scope.map(str::trim).filter(|s| !s.is_empty());
        let exact = scope.map(Pattern::escape);
        let candidates = self.datacenters(exact.as_deref()).await?;
        match (scope, candidates.as_slice()) {
            (_, [only]) => Ok(only.reference.clone()),
            (Some(name), []) => Err(InventoryError::scope_not_found(format!(
                "datacenter '{name}' not found"
            ))),
            (None, []) => Err(InventoryError::scope_not_found("no datacenter found")),
            (Some(name), many) => Err(InventoryError::scope_not_found(format!(
                "datacenter '{name}' resolves to {} instances",
                many.len()
            ))),
            (None, many) => Err(InventoryError::scope_not_found(format!(
                "default datacenter resolves to {} instances, please specify one",
                many.len()
            ))),
        }
    }

    // ── Container views ─────────────────────────────────────────────

    /// Flatten a container view over `container` into its member list.
    /// The view is destroyed afterwards; a failed destroy is only logged.
    pub async fn container_members(
        &self,
        container: &ObjectReference,
        kinds: &[ObjectKind],
        recursive: bool,
    ) -> InventoryResult<Vec<ObjectReference>> {
        let view = self
            .call(VimRequest::CreateContainerView {
                container: container.clone(),
                kinds: kinds.to_vec(),
                recursive,
            })
            .await
            .and_then(VimResponse::into_reference)
            .map_err(wrap("CreateContainerView"))?;

        let members = self
            .call(VimRequest::RetrieveProperties {
                kind: ObjectKind::ContainerView,
                objects: vec![view.clone()],
                properties: vec!["view".to_string()],
            })
            .await
            .and_then(VimResponse::into_objects)
            .map(|records| {
                records
                    .iter()
                    .flat_map(|r| r.references_at("view"))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .map_err(wrap("RetrieveProperties(ContainerView)"));

        if !self.cancel.is_cancelled() {
            if let Err(e) = self.call(VimRequest::DestroyView { view: view.clone() }).await {
                log::debug!("DestroyView {view} failed: {e}");
            }
        }
        members
    }

    async fn fetch_names(
        &self,
        kind: ObjectKind,
        refs: &[ObjectReference],
    ) -> InventoryResult<Vec<PropertyRecord>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        self.call(VimRequest::RetrieveProperties {
            kind,
            objects: refs.to_vec(),
            properties: vec!["name".to_string()],
        })
        .await
        .and_then(VimResponse::into_objects)
        .map_err(wrap("RetrieveProperties(name)"))
    }

    async fn names_of(&self, refs: &[ObjectReference]) -> InventoryResult<HashMap<ObjectReference, String>> {
        let grouped: ReferenceSet = refs.iter().cloned().collect();
        let mut names = HashMap::with_capacity(refs.len());
        for (kind, group) in grouped.groups() {
            for record in self.fetch_names(kind, group).await? {
                let name = record.name().to_string();
                names.insert(record.reference, name);
            }
        }
        Ok(names)
    }
}

fn compile(pattern: &str) -> InventoryResult<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| InventoryError::config(format!("invalid match pattern '{pattern}': {e}")))
}

/// Wrap transport errors as `DiscoveryFailed`, keeping errors that
/// already carry a more precise meaning.
fn wrap(call: &'static str) -> impl Fn(InventoryError) -> InventoryError {
    move |e| match e.kind {
        InventoryErrorKind::Cancelled
        | InventoryErrorKind::ScopeNotFound
        | InventoryErrorKind::DiscoveryFailed
        | InventoryErrorKind::InvalidConfig => e,
        _ => InventoryError::discovery(call, &e),
    }
}
