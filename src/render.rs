//! Plain-text rendering of the inventory reports.
//!
//! Every function returns the text instead of printing it so the output
//! can be checked in tests.

use std::fmt::Write as _;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use wminfo_vsphere::report::*;
use wminfo_vsphere::types::ConsoleLink;

/// Byte count in binary units with one decimal (`1.5GB`, `512B`).
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.1}{unit}")
}

fn bytes_or_empty(bytes: Option<i64>) -> String {
    bytes.map(format_bytes).unwrap_or_default()
}

fn int_or_empty(value: Option<i64>, suffix: &str) -> String {
    value.map(|v| format!("{v}{suffix}")).unwrap_or_default()
}

fn flag_or_empty(value: Option<bool>) -> String {
    value.map(|b| b.to_string()).unwrap_or_default()
}

// ── Tables ──────────────────────────────────────────────────────────

fn create_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn key_value_table(items: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (key, value) in items {
        table.add_row(vec![Cell::new(format!("  {key}:")).fg(Color::Cyan), Cell::new(value)]);
    }
    table
}

fn section(out: &mut String, title: &str, items: &[(&str, String)]) {
    let _ = writeln!(out, "{title}");
    if !items.is_empty() {
        let _ = writeln!(out, "{}", key_value_table(items));
    }
    out.push('\n');
}

fn warnings(out: &mut String, warnings: &[String]) {
    for warning in warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
}

// ── Reports ─────────────────────────────────────────────────────────

pub fn info(report: &InfoReport) -> String {
    let about = &report.about;
    let mut out = String::new();
    section(
        &mut out,
        "About",
        &[
            ("Name", about.name.clone()),
            ("Vendor", about.vendor.clone()),
            ("Version", about.version.clone()),
            ("Build", about.build.clone()),
            ("OS type", about.os_type.clone()),
            ("API type", about.api_type.clone()),
            ("API version", about.api_version.clone()),
            ("Product ID", about.product_line_id.clone()),
            ("UUID", about.instance_uuid.clone()),
        ],
    );
    let mut table = create_table(&["Reference", "Name"]);
    for dc in &report.datacenters {
        table.add_row(vec![dc.reference.to_string(), dc.name.clone()]);
    }
    let _ = writeln!(out, "Datacenters\n{table}");
    out
}

pub fn datastores(report: &DatastoreReport) -> String {
    let mut table = create_table(&["Reference", "Name", "Type", "Capacity", "FreeSpace"]);
    for row in &report.rows {
        table.add_row(vec![
            row.reference.to_string(),
            row.name.clone(),
            row.store_type.clone(),
            bytes_or_empty(row.capacity),
            bytes_or_empty(row.free_space),
        ]);
    }
    let mut out = format!("{table}\n");
    warnings(&mut out, &report.warnings);
    out
}

pub fn networks(report: &NetworkReport) -> String {
    let mut table = create_table(&["Reference", "Name", "Accessible"]);
    for row in report.networks.iter().chain(&report.portgroups) {
        table.add_row(vec![
            row.reference.to_string(),
            row.name.clone(),
            flag_or_empty(row.accessible),
        ]);
    }
    for switch in &report.switches {
        table.add_row(vec![switch.reference.to_string(), switch.name.clone(), "-".to_string()]);
        for pg in &switch.portgroups {
            table.add_row(vec![String::new(), format!("  {pg}"), String::new()]);
        }
    }
    let mut out = format!("{table}\n");
    warnings(&mut out, &report.warnings);
    out
}

pub fn vms(report: &VmListReport) -> String {
    let mut table = create_table(&["Reference", "Name", "HostName", "Guest", "PowerState", "IpAddress"]);
    for row in &report.rows {
        table.add_row(vec![
            row.reference.id.clone(),
            row.name.clone(),
            row.host_name.clone(),
            row.guest_id.clone(),
            row.power_state.clone(),
            row.ip_address.clone(),
        ]);
    }
    let mut out = format!("{table}\n");
    warnings(&mut out, &report.warnings);
    out
}

pub fn detail(report: &DetailReport, console_wait_secs: u64) -> String {
    let mut out = format!("VirtualMachine(s): {}\n---------------------\n", report.details.len());
    for vm in &report.details {
        vm_detail(&mut out, vm, console_wait_secs);
    }
    warnings(&mut out, &report.warnings);
    out
}

fn linked(records: &[std::sync::Arc<wminfo_vsphere::PropertyRecord>]) -> Vec<String> {
    records.iter().map(|r| format!("{}: {}", r.id(), r.name())).collect()
}

fn vm_detail(out: &mut String, vm: &VmDetail, console_wait_secs: u64) {
    let c = &vm.config;
    let mut config = vec![
        ("Name", vm.name().to_string()),
        ("Id", vm.id().to_string()),
        ("Path", c.path.clone()),
        ("UUID", c.uuid.clone()),
        ("Guest", c.guest_full_name.clone()),
        ("Memory", int_or_empty(c.memory_mb, " MB")),
        ("MemoryReservation", int_or_empty(c.memory_reservation, " MB")),
        ("CPU", int_or_empty(c.num_cpu, " vCPU(s)")),
        ("CpuReservation", int_or_empty(c.cpu_reservation, "")),
        ("GuestId", c.guest_id.clone()),
        ("InstanceUuid", c.instance_uuid.clone()),
        ("EthernetCards", int_or_empty(c.ethernet_cards, "")),
        ("VirtualDisks", int_or_empty(c.virtual_disks, "")),
        ("Template", flag_or_empty(c.template)),
    ];
    if let Some(managed_by) = &c.managed_by {
        config.push(("ManagedBy", managed_by.clone()));
    }
    section(out, "VM config", &config);

    let g = &vm.guest;
    section(
        out,
        "Guest",
        &[
            ("HostName", g.host_name.clone()),
            ("IpAddress", g.ip_address.clone()),
            ("GuestId", g.guest_id.clone()),
            ("GuestFullName", g.guest_full_name.clone()),
            ("ToolsRunningStatus", g.tools_running_status.clone()),
            ("ToolsVersionStatus", g.tools_version_status.clone()),
        ],
    );

    let r = &vm.runtime;
    let mut runtime = Vec::new();
    match (&r.host_name, &r.host_id) {
        (Some(name), id) => {
            runtime.push(("Host", name.clone()));
            runtime.push(("HostId", id.clone().unwrap_or_default()));
        }
        (None, Some(id)) => runtime.push(("HostId", format!("{id} (unknown)"))),
        (None, None) => {}
    }
    if let Some(boot) = &r.boot_time {
        runtime.push(("BootTime", boot.clone()));
    }
    runtime.push(("PowerState", r.power_state.clone()));
    if !r.is_powered_on() {
        runtime.push(("Paused", flag_or_empty(r.paused)));
        runtime.push(("CleanPowerOff", flag_or_empty(r.clean_power_off)));
        runtime.push(("SuspendTime", r.suspend_time.clone().unwrap_or_default()));
    }
    runtime.push(("MemoryOverhead", int_or_empty(r.memory_overhead, " MB")));
    runtime.push(("MaxMemoryUsage", int_or_empty(r.max_memory_usage, " MB")));
    runtime.push(("MaxCpuUsage", int_or_empty(r.max_cpu_usage, "")));
    for network in linked(&vm.view.networks) {
        runtime.push(("Network", network));
    }
    for portgroup in linked(&vm.view.portgroups) {
        runtime.push(("Virtual Switch", portgroup));
    }
    section(out, "Runtime env", &runtime);

    let s = &vm.storage;
    let mut storage = vec![
        ("Uncommitted", bytes_or_empty(s.uncommitted)),
        ("Committed", bytes_or_empty(s.committed)),
        ("Unshared", bytes_or_empty(s.unshared)),
    ];
    for datastore in linked(&vm.view.datastores) {
        storage.push(("Datastore", datastore));
    }
    section(out, "Storage", &storage);

    let q = &vm.quick_stats;
    section(
        out,
        "QuickStats",
        &[
            ("OverallCpuDemand", int_or_empty(q.overall_cpu_demand, "")),
            ("OverallCpuUsage", int_or_empty(q.overall_cpu_usage, "")),
            ("BalloonedMemory", int_or_empty(q.ballooned_memory, " MB")),
            ("CompressedMemory", int_or_empty(q.compressed_memory, " MB")),
            ("ConsumedOverheadMemory", int_or_empty(q.consumed_overhead_memory, " MB")),
            ("GuestMemoryUsage", int_or_empty(q.guest_memory_usage, " MB")),
            ("HostMemoryUsage", int_or_empty(q.host_memory_usage, " MB")),
            ("SwappedMemory", int_or_empty(q.swapped_memory, " MB")),
            ("SharedMemory", int_or_empty(q.shared_memory, " MB")),
            ("PrivateMemory", int_or_empty(q.private_memory, " MB")),
            ("UptimeSeconds", int_or_empty(q.uptime_seconds, " s")),
        ],
    );

    let annotations: Vec<(&str, String)> = vm
        .annotations
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    section(out, "Annotations", &annotations);

    let _ = writeln!(out, "Console");
    match &vm.console {
        Ok(link) => console(out, link, console_wait_secs),
        Err(e) => {
            let _ = writeln!(out, "  unavailable: {e}");
        }
    }
    out.push('\n');
}

fn console(out: &mut String, link: &ConsoleLink, console_wait_secs: u64) {
    if console_wait_secs > 0 {
        let _ = writeln!(
            out,
            "You have {} seconds to open the URL, or the session will be terminated.",
            console_wait_secs.min(link.valid_for_secs)
        );
    }
    let _ = writeln!(out, "  {}", link.url);
}

#[cfg(test)]
mod tests {
    use super::*;
    use wminfo_vsphere::testing::{FakeSession, FakeVm};
    use wminfo_vsphere::{InventoryService, ObjectKind};

    fn lab() -> InventoryService<FakeSession> {
        InventoryService::new(
            FakeSession::builder()
                .datacenter("datacenter-1", "Lab")
                .host("datacenter-1", "host-1", "esx01.lab")
                .datastore("datacenter-1", "datastore-1", "ssd-a")
                .storage_pod("datacenter-1", "group-p1", "gold")
                .network("datacenter-1", "network-1", "VM Network")
                .switch("datacenter-1", "dvs-1", "dvs-core", &["dvpg-prod"])
                .vm(
                    "datacenter-1",
                    FakeVm::new("vm-1", "web01 primary")
                        .host("host-1")
                        .datastores(&["datastore-1"])
                        .networks(&[(ObjectKind::Network, "network-1")])
                        .guest("web01.lab", "10.0.0.5")
                        .annotation("owner:ops"),
                )
                .build(),
        )
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(1023), "1023B");
        assert_eq!(format_bytes(1536), "1.5KB");
        assert_eq!(format_bytes(1_099_511_627_776), "1.0TB");
        assert_eq!(format_bytes(549_755_813_888), "512.0GB");
    }

    #[tokio::test]
    async fn info_lists_about_and_datacenters() {
        let text = info(&lab().info(None).await.unwrap());
        assert!(text.contains("VirtualCenter"));
        assert!(text.contains("Datacenter:datacenter-1"));
        assert!(text.contains("Lab"));
    }

    #[tokio::test]
    async fn datastore_table() {
        let text = datastores(&lab().datastores(None).await.unwrap());
        assert!(text.contains("ssd-a"));
        assert!(text.contains("VMFS"));
        assert!(text.contains("1.0TB"));
        assert!(text.contains("gold"));
    }

    #[tokio::test]
    async fn network_table_lists_switch_portgroups() {
        let text = networks(&lab().networks(None).await.unwrap());
        assert!(text.contains("VM Network"));
        assert!(text.contains("dvs-core"));
        assert!(text.contains("dvpg-prod"));
    }

    #[tokio::test]
    async fn vm_table_uses_short_names() {
        let text = vms(&lab().vms(None).await.unwrap());
        assert!(text.contains("web01"));
        assert!(!text.contains("primary"));
        assert!(text.contains("poweredOn"));
    }

    #[tokio::test]
    async fn detail_shows_resolved_names_and_console() {
        let text = detail(&lab().show(Some("web01.lab")).await.unwrap(), 60);
        assert!(text.starts_with("VirtualMachine(s): 1"));
        assert!(text.contains("esx01.lab"));
        assert!(text.contains("datastore-1: ssd-a"));
        assert!(text.contains("network-1: VM Network"));
        assert!(text.contains("owner:"));
        assert!(text.contains("You have 60 seconds"));
        assert!(text.contains("http://vc.lab:7331/console/?vmId=vm-1"));
    }

    #[tokio::test]
    async fn detail_reports_console_failure_in_place() {
        let service = InventoryService::new(
            FakeSession::builder()
                .datacenter("datacenter-1", "Lab")
                .vm("datacenter-1", FakeVm::new("vm-1", "web01"))
                .fail_call("AcquireCloneTicket")
                .build(),
        );
        let text = detail(&service.show(Some("vm-1")).await.unwrap(), 0);
        assert!(text.contains("unavailable: [CloneFailed]"));
        assert!(!text.contains("You have"));
    }
}
