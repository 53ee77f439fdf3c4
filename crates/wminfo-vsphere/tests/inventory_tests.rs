use std::sync::Arc;

use regex::Regex;

use wminfo_vsphere::assembler::CrossReferenceAssembler;
use wminfo_vsphere::console::ConsoleHandoff;
use wminfo_vsphere::projector::PropertyProjector;
use wminfo_vsphere::resolver::ReferenceResolver;
use wminfo_vsphere::testing::{FakeSession, FakeVm};
use wminfo_vsphere::{
    CancelSignal, FingerprintAlgorithm, InventoryErrorKind, InventoryService, ObjectKind,
    ObjectReference, ReferenceSet,
};

fn storage_lab() -> FakeSession {
    FakeSession::builder()
        .datacenter("datacenter-1", "Lab")
        .datastore("datacenter-1", "datastore-1", "ssd-a")
        .datastore("datacenter-1", "datastore-2", "ssd-b")
        .datastore("datacenter-1", "datastore-3", "nfs-iso")
        .storage_pod("datacenter-1", "group-p1", "gold")
        .network("datacenter-1", "network-1", "VM Network")
        .build()
}

fn vm_lab() -> FakeSession {
    FakeSession::builder()
        .datacenter("datacenter-1", "Lab")
        .host("datacenter-1", "host-1", "esx01.lab")
        .host("datacenter-1", "host-2", "esx02.lab")
        .datastore("datacenter-1", "datastore-1", "ssd-a")
        .datastore("datacenter-1", "datastore-2", "ssd-b")
        .network("datacenter-1", "network-1", "VM Network")
        .portgroup("datacenter-1", "dvportgroup-1", "dvpg-prod")
        .vm(
            "datacenter-1",
            FakeVm::new("vm-1", "web01")
                .host("host-1")
                .datastores(&["datastore-1", "datastore-2"])
                .networks(&[(ObjectKind::Network, "network-1")])
                .guest("web01.lab", "10.0.0.5")
                .annotation("owner:ops tier:web"),
        )
        .build()
}

async fn web01(session: &FakeSession) -> wminfo_vsphere::PropertyRecord {
    let resolver = ReferenceResolver::new(session, CancelSignal::never());
    let refs = resolver
        .discover(None, &[ObjectKind::VirtualMachine], Some("web01"))
        .await
        .unwrap();
    let projector = PropertyProjector::new(session, CancelSignal::never());
    let projection = projector.project(&refs, &["summary", "datastore", "network"]).await.unwrap();
    projection.into_records().next().unwrap()
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn discovery_never_repeats_a_reference() {
    let session = FakeSession::builder()
        .datacenter("datacenter-1", "Lab")
        .datastore("datacenter-1", "datastore-1", "ssd-a")
        .datastore("datacenter-1", "datastore-2", "ssd-b")
        .duplicate_views()
        .build();
    let resolver = ReferenceResolver::new(&session, CancelSignal::never());
    let refs = resolver
        .discover(None, &[ObjectKind::Datastore], None)
        .await
        .unwrap();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs.of_kind(ObjectKind::Datastore).len(), 2);
}

#[tokio::test]
async fn discovery_returns_only_requested_kinds() {
    let session = storage_lab();
    let resolver = ReferenceResolver::new(&session, CancelSignal::never());
    let refs = resolver
        .discover(None, &[ObjectKind::Datastore, ObjectKind::StoragePod], None)
        .await
        .unwrap();
    assert_eq!(refs.of_kind(ObjectKind::Datastore).len(), 3);
    assert_eq!(refs.of_kind(ObjectKind::StoragePod).len(), 1);
    assert_eq!(refs.len(), 4);
    assert!(refs.of_kind(ObjectKind::Network).is_empty());
    assert_eq!(session.open_views(), 0);
}

// ── Projection ──────────────────────────────────────────────────────

#[tokio::test]
async fn one_round_trip_per_kind() {
    let session = storage_lab();
    let resolver = ReferenceResolver::new(&session, CancelSignal::never());
    let refs = resolver
        .discover(None, &[ObjectKind::Datastore, ObjectKind::StoragePod], None)
        .await
        .unwrap();
    let before = session.count_calls("RetrievePropertiesEx(");
    let projector = PropertyProjector::new(&session, CancelSignal::never());
    let projection = projector.project(&refs, &["summary"]).await.unwrap();
    assert_eq!(session.count_calls("RetrievePropertiesEx(") - before, 2);
    assert_eq!(projection.len(), 4);
    assert!(!projection.is_degraded());
}

#[tokio::test]
async fn failed_kind_leaves_the_others_intact() {
    let session = FakeSession::builder()
        .datacenter("datacenter-1", "Lab")
        .datastore("datacenter-1", "datastore-1", "ssd-a")
        .network("datacenter-1", "network-1", "VM Network")
        .fail_kind(ObjectKind::Network)
        .build();
    let refs: ReferenceSet = [
        ObjectReference::new(ObjectKind::Network, "network-1"),
        ObjectReference::new(ObjectKind::Datastore, "datastore-1"),
    ]
    .into_iter()
    .collect();
    let projector = PropertyProjector::new(&session, CancelSignal::never());
    let projection = projector.project(&refs, &[]).await.unwrap();
    assert_eq!(projection.records(ObjectKind::Datastore)[0].name(), "ssd-a");
    assert!(projection.records(ObjectKind::Network).is_empty());
    assert_eq!(projection.failed_kinds(), vec![ObjectKind::Network]);
}

// ── Assembly ────────────────────────────────────────────────────────

#[tokio::test]
async fn assembly_resolves_every_reference() {
    let session = vm_lab();
    let vm = web01(&session).await;
    let assembler = CrossReferenceAssembler::new(&session, CancelSignal::never());
    let view = assembler.assemble(&vm).await.unwrap();

    assert_eq!(view.datastores.len(), 2);
    assert_eq!(view.networks.len(), 1);
    assert_eq!(view.hosts.len(), 1);
    assert!(view.portgroups.is_empty());

    for reference in vm.references_at("datastore") {
        assert!(view.record_for(reference).is_some(), "orphan {reference}");
    }
    let first = ObjectReference::new(ObjectKind::Datastore, "datastore-1");
    assert!(Arc::ptr_eq(view.record_for(&first).unwrap(), &view.datastores[0]));
}

#[tokio::test]
async fn assembly_is_repeatable() {
    let session = vm_lab();
    let vm = web01(&session).await;
    let assembler = CrossReferenceAssembler::new(&session, CancelSignal::never());
    let first = assembler.assemble(&vm).await.unwrap();
    let second = assembler.assemble(&vm).await.unwrap();
    assert_eq!(first, second);
}

// ── Console hand-off ────────────────────────────────────────────────

#[tokio::test]
async fn thumbprint_format() {
    let pairs = Regex::new(r"^[A-F0-9]{2}(:[A-F0-9]{2})*$").unwrap();
    let session = vm_lab();
    for (algorithm, len) in [(FingerprintAlgorithm::Sha1, 20), (FingerprintAlgorithm::Sha256, 32)] {
        let handoff = ConsoleHandoff::new(&session, CancelSignal::never()).with_algorithm(algorithm);
        let fp = handoff.server_fingerprint().await.unwrap();
        assert!(pairs.is_match(&fp), "{fp}");
        assert_eq!(fp.split(':').count(), len);
    }
}

#[tokio::test]
async fn console_url_carries_trust_material() {
    let session = vm_lab();
    let vm = web01(&session).await;
    let handoff = ConsoleHandoff::new(&session, CancelSignal::never());
    let link = handoff.console_link(&vm).await.unwrap();
    assert!(link.url.starts_with("http://vc.lab:7331/console/?vmId=vm-1&vmName=web01&host=vc.lab&"));
    assert!(link.url.contains(&format!("sessionTicket={}", link.ticket.session_token)));
    assert!(link.url.ends_with(&format!("thumbprint={}", link.ticket.tls_fingerprint)));
}

// ── Reports ─────────────────────────────────────────────────────────

#[tokio::test]
async fn datastore_report_end_to_end() {
    let service = InventoryService::new(storage_lab());
    let report = service.datastores(None).await.unwrap();
    assert_eq!(report.discovered, 4);
    let names: Vec<_> = report.rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["ssd-a", "ssd-b", "nfs-iso", "gold"]);
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn datastore_report_filters_by_pattern() {
    let service = InventoryService::new(storage_lab());
    let report = service.datastores(Some("ssd-*")).await.unwrap();
    assert_eq!(report.rows.len(), 2);
}

#[tokio::test]
async fn show_builds_full_detail() {
    let service = InventoryService::new(vm_lab());
    let report = service.show(Some("web01.lab")).await.unwrap();
    let detail = &report.details[0];
    assert_eq!(detail.name(), "web01");
    assert_eq!(detail.runtime.host_name.as_deref(), Some("esx01.lab"));
    assert_eq!(detail.config.num_cpu, Some(2));
    assert_eq!(
        detail.annotations,
        vec![("owner".to_string(), "ops".to_string()), ("tier".to_string(), "web".to_string())]
    );
    let ds: Vec<_> = detail.view.datastores.iter().map(|d| d.name()).collect();
    assert_eq!(ds, vec!["ssd-a", "ssd-b"]);
    assert!(detail.console.is_ok());
}

#[tokio::test]
async fn show_without_match_is_empty() {
    let service = InventoryService::new(vm_lab());
    let report = service.show(Some("nope")).await.unwrap();
    assert_eq!(report.discovered, 1);
    assert!(report.details.is_empty());
}

#[tokio::test]
async fn cancellation_aborts_report() {
    let (handle, cancel) = CancelSignal::new();
    handle.cancel();
    let service = InventoryService::new(vm_lab()).with_cancel(cancel);
    let err = service.vms(None).await.unwrap_err();
    assert_eq!(err.kind, InventoryErrorKind::Cancelled);
}
