//! Aggregate service façade for the inventory reports.
//!
//! `InventoryService` owns the session and composes the resolver,
//! projector, assembler and console hand-off into one method per
//! sub-command. Rendering is left to the caller.

use crate::assembler::CrossReferenceAssembler;
use crate::config::{InventoryConfig, DEFAULT_CONSOLE_PORT};
use crate::console::ConsoleHandoff;
use crate::error::InventoryResult;
use crate::projector::{Projection, PropertyProjector};
use crate::report::*;
use crate::resolver::ReferenceResolver;
use crate::session::{CancelSignal, InventorySession};
use crate::types::{FingerprintAlgorithm, ObjectKind, ReferenceSet};

/// Properties fetched for the VM list.
pub const VM_LIST_PROPERTIES: &[&str] = &["name", "summary"];
/// Properties fetched for the VM detail view.
pub const VM_DETAIL_PROPERTIES: &[&str] = &["name", "summary", "guest", "config", "datastore", "network"];

const DATASTORE_KINDS: &[ObjectKind] = &[ObjectKind::Datastore, ObjectKind::StoragePod];
const NETWORK_KINDS: &[ObjectKind] = &[
    ObjectKind::Network,
    ObjectKind::OpaqueNetwork,
    ObjectKind::DistributedVirtualPortgroup,
    ObjectKind::DistributedVirtualSwitch,
];

/// Top-level service over one inventory session.
pub struct InventoryService<S: InventorySession> {
    session: S,
    scope: Option<String>,
    cancel: CancelSignal,
    console_port: u16,
    fingerprint: FingerprintAlgorithm,
}

impl<S: InventorySession> InventoryService<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            scope: None,
            cancel: CancelSignal::never(),
            console_port: DEFAULT_CONSOLE_PORT,
            fingerprint: FingerprintAlgorithm::default(),
        }
    }

    /// Apply datacenter scope and console settings from `config`.
    pub fn from_config(session: S, config: &InventoryConfig) -> Self {
        Self {
            scope: config.datacenter.clone().filter(|dc| !dc.is_empty()),
            console_port: config.console_port,
            fingerprint: config.fingerprint,
            ..Self::new(session)
        }
    }

    pub fn with_scope(mut self, datacenter: impl Into<String>) -> Self {
        self.scope = Some(datacenter.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    fn resolver(&self) -> ReferenceResolver<'_, S> {
        ReferenceResolver::new(&self.session, self.cancel.clone())
    }

    fn projector(&self) -> PropertyProjector<'_, S> {
        PropertyProjector::new(&self.session, self.cancel.clone())
    }

    async fn discover_and_project(
        &self,
        kinds: &[ObjectKind],
        pattern: Option<&str>,
        properties: &[&str],
    ) -> InventoryResult<(ReferenceSet, Projection)> {
        let refs = self
            .resolver()
            .discover(self.scope.as_deref(), kinds, pattern)
            .await?;
        if refs.is_empty() {
            return Ok((refs, Projection::default()));
        }
        let projection = self.projector().project(&refs, properties).await?;
        Ok((refs, projection))
    }

    // ── info ────────────────────────────────────────────────────────

    pub async fn info(&self, pattern: Option<&str>) -> InventoryResult<InfoReport> {
        let datacenters = self
            .resolver()
            .datacenters(pattern)
            .await?
            .into_iter()
            .map(|r| DatacenterRow {
                name: r.name().to_string(),
                reference: r.reference,
            })
            .collect();
        Ok(InfoReport {
            about: self.session.service_content().about.clone(),
            datacenters,
        })
    }

    // ── ds ──────────────────────────────────────────────────────────

    pub async fn datastores(&self, pattern: Option<&str>) -> InventoryResult<DatastoreReport> {
        let (refs, projection) = self
            .discover_and_project(DATASTORE_KINDS, pattern, &["summary"])
            .await?;
        let rows = projection
            .records(ObjectKind::Datastore)
            .iter()
            .map(DatastoreRow::from_datastore)
            .chain(
                projection
                    .records(ObjectKind::StoragePod)
                    .iter()
                    .map(DatastoreRow::from_cluster),
            )
            .collect();
        Ok(DatastoreReport {
            discovered: refs.len(),
            rows,
            warnings: warnings(&projection),
        })
    }

    // ── net ─────────────────────────────────────────────────────────

    pub async fn networks(&self, pattern: Option<&str>) -> InventoryResult<NetworkReport> {
        let (refs, projection) = self
            .discover_and_project(NETWORK_KINDS, pattern, &["summary"])
            .await?;
        let networks = projection
            .records(ObjectKind::Network)
            .iter()
            .chain(projection.records(ObjectKind::OpaqueNetwork))
            .map(NetworkRow::from_record)
            .collect();
        let portgroups = projection
            .records(ObjectKind::DistributedVirtualPortgroup)
            .iter()
            .map(NetworkRow::from_record)
            .collect();
        let switches = projection
            .records(ObjectKind::DistributedVirtualSwitch)
            .iter()
            .map(SwitchRow::from_record)
            .collect();
        Ok(NetworkReport {
            discovered: refs.len(),
            networks,
            portgroups,
            switches,
            warnings: warnings(&projection),
        })
    }

    // ── vms ─────────────────────────────────────────────────────────

    pub async fn vms(&self, pattern: Option<&str>) -> InventoryResult<VmListReport> {
        let (refs, projection) = self
            .discover_and_project(&[ObjectKind::VirtualMachine], pattern, VM_LIST_PROPERTIES)
            .await?;
        Ok(VmListReport {
            discovered: refs.len(),
            rows: projection.iter().map(VmRow::from_record).collect(),
            warnings: warnings(&projection),
        })
    }

    // ── show ────────────────────────────────────────────────────────

    /// Detail view of every VM matching `selector` (all VMs when `None`).
    ///
    /// Filtering happens after discovery. Each match gets its own
    /// assembly and its own console hand-off; a failed hand-off is kept
    /// in the detail instead of failing the report.
    pub async fn show(&self, selector: Option<&str>) -> InventoryResult<DetailReport> {
        let (refs, projection) = self
            .discover_and_project(&[ObjectKind::VirtualMachine], None, VM_DETAIL_PROPERTIES)
            .await?;
        let mut report = DetailReport {
            discovered: refs.len(),
            details: Vec::new(),
            warnings: warnings(&projection),
        };

        let assembler = CrossReferenceAssembler::new(&self.session, self.cancel.clone());
        let handoff = ConsoleHandoff::new(&self.session, self.cancel.clone())
            .with_port(self.console_port)
            .with_algorithm(self.fingerprint);

        let selected = projection
            .iter()
            .filter(|vm| selector.map_or(true, |s| matches_selector(vm, s)));
        for vm in selected {
            let view = assembler.assemble(vm).await?;
            report
                .warnings
                .extend(view.failures.iter().map(|e| format!("{}: {e}", vm.name())));

            let console = match handoff.console_link(vm).await {
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    log::warn!("No console for {}: {e}", vm.reference);
                    Err(e)
                }
                ok => ok,
            };
            report.details.push(VmDetail::new(view, console));
        }
        log::debug!(
            "{} of {} VM(s) matched {:?}",
            report.details.len(),
            report.discovered,
            selector
        );
        Ok(report)
    }
}

fn warnings(projection: &Projection) -> Vec<String> {
    projection.failures().iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InventoryErrorKind;
    use crate::testing::{FakeSession, FakeVm};

    fn lab() -> FakeSession {
        FakeSession::builder()
            .datacenter("datacenter-1", "Lab")
            .host("datacenter-1", "host-1", "esx01.lab")
            .datastore("datacenter-1", "datastore-1", "ssd-1")
            .storage_pod("datacenter-1", "group-p1", "gold")
            .network("datacenter-1", "network-1", "VM Network")
            .portgroup("datacenter-1", "dvportgroup-1", "dvpg-prod")
            .switch("datacenter-1", "dvs-1", "dvs-core", &["dvpg-prod", "uplinks"])
            .vm(
                "datacenter-1",
                FakeVm::new("vm-1", "web01 primary")
                    .host("host-1")
                    .datastores(&["datastore-1"])
                    .networks(&[(ObjectKind::Network, "network-1")])
                    .guest("web01.lab", "10.0.0.5"),
            )
            .vm("datacenter-1", FakeVm::new("vm-2", "db01").guest("db01.lab", "10.0.0.6"))
            .build()
    }

    #[tokio::test]
    async fn info_lists_datacenters() {
        let service = InventoryService::new(lab());
        let report = service.info(None).await.unwrap();
        assert_eq!(report.about.api_type, "VirtualCenter");
        assert_eq!(report.datacenters.len(), 1);
        assert_eq!(report.datacenters[0].name, "Lab");
    }

    #[tokio::test]
    async fn datastore_report_puts_clusters_last() {
        let service = InventoryService::new(lab());
        let report = service.datastores(None).await.unwrap();
        assert_eq!(report.discovered, 2);
        let types: Vec<_> = report.rows.iter().map(|r| r.store_type.as_str()).collect();
        assert_eq!(types, vec!["VMFS", "-"]);
    }

    #[tokio::test]
    async fn network_report_splits_kinds() {
        let service = InventoryService::new(lab());
        let report = service.networks(None).await.unwrap();
        assert_eq!(report.networks.len(), 1);
        assert_eq!(report.portgroups.len(), 1);
        assert_eq!(report.switches[0].portgroups, vec!["dvpg-prod", "uplinks"]);
        assert_eq!(report.networks[0].accessible, Some(true));
    }

    #[tokio::test]
    async fn vm_list_rows() {
        let service = InventoryService::new(lab());
        let report = service.vms(None).await.unwrap();
        assert_eq!(report.discovered, 2);
        let names: Vec<_> = report.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["web01", "db01"]);
    }

    #[tokio::test]
    async fn show_filters_after_discovery() {
        let service = InventoryService::new(lab());
        let report = service.show(Some("10.0.0.5")).await.unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(report.details.len(), 1);
        let detail = &report.details[0];
        assert_eq!(detail.id(), "vm-1");
        assert_eq!(detail.runtime.host_name.as_deref(), Some("esx01.lab"));
        assert_eq!(detail.view.datastores.len(), 1);
        assert!(detail.console.as_ref().unwrap().url.contains("vmId=vm-1"));
    }

    #[tokio::test]
    async fn show_keeps_report_when_console_fails() {
        let session = FakeSession::builder()
            .datacenter("datacenter-1", "Lab")
            .vm("datacenter-1", FakeVm::new("vm-1", "web01"))
            .fail_call("ProbeTls")
            .build();
        let service = InventoryService::new(session);
        let report = service.show(Some("web01")).await.unwrap();
        let console = report.details[0].console.as_ref().unwrap_err();
        assert_eq!(console.kind, InventoryErrorKind::FingerprintFailed);
    }

    #[tokio::test]
    async fn degraded_projection_becomes_warning() {
        let session = FakeSession::builder()
            .datacenter("datacenter-1", "Lab")
            .datastore("datacenter-1", "datastore-1", "ssd-1")
            .storage_pod("datacenter-1", "group-p1", "gold")
            .fail_kind(ObjectKind::StoragePod)
            .build();
        let service = InventoryService::new(session);
        let report = service.datastores(None).await.unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("StoragePod"));
    }

    #[tokio::test]
    async fn config_scope_is_applied() {
        let session = FakeSession::builder()
            .datacenter("datacenter-1", "Lab")
            .datacenter("datacenter-2", "Prod")
            .datastore("datacenter-2", "datastore-9", "prod-ds")
            .build();
        let config = InventoryConfig {
            datacenter: Some("Prod".into()),
            ..Default::default()
        };
        let service = InventoryService::from_config(session, &config);
        let report = service.datastores(None).await.unwrap();
        assert_eq!(report.rows[0].name, "prod-ds");
    }
}
