//! Structured report records handed to the renderer.
//!
//! Values come straight from retrieved records; anything the service did
//! not return stays `None` so the renderer can show it as empty.

use crate::assembler::EntityView;
use crate::error::InventoryError;
use crate::types::{AboutInfo, ConsoleLink, ObjectReference, PropertyRecord};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  info
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct DatacenterRow {
    pub reference: ObjectReference,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfoReport {
    pub about: AboutInfo,
    pub datacenters: Vec<DatacenterRow>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct DatastoreRow {
    pub reference: ObjectReference,
    pub name: String,
    /// Filesystem type; `-` for datastore clusters.
    pub store_type: String,
    pub capacity: Option<i64>,
    pub free_space: Option<i64>,
}

impl DatastoreRow {
    pub fn from_datastore(record: &PropertyRecord) -> Self {
        Self {
            reference: record.reference.clone(),
            name: record.name().to_string(),
            store_type: record.text("summary.type").unwrap_or_default().to_string(),
            capacity: record.integer("summary.capacity"),
            free_space: record.integer("summary.freeSpace"),
        }
    }

    pub fn from_cluster(record: &PropertyRecord) -> Self {
        Self {
            store_type: "-".to_string(),
            ..Self::from_datastore(record)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatastoreReport {
    /// References found by discovery, before projection.
    pub discovered: usize,
    pub rows: Vec<DatastoreRow>,
    pub warnings: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  net
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A standard network or distributed port-group.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRow {
    pub reference: ObjectReference,
    pub name: String,
    pub accessible: Option<bool>,
}

impl NetworkRow {
    pub fn from_record(record: &PropertyRecord) -> Self {
        let name = record
            .text("summary.name")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| record.name());
        Self {
            reference: record.reference.clone(),
            name: name.to_string(),
            accessible: record.boolean("summary.accessible"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchRow {
    pub reference: ObjectReference,
    pub name: String,
    pub portgroups: Vec<String>,
}

impl SwitchRow {
    pub fn from_record(record: &PropertyRecord) -> Self {
        Self {
            reference: record.reference.clone(),
            name: record.name().to_string(),
            portgroups: record
                .texts_at("summary.portgroupName")
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkReport {
    pub discovered: usize,
    pub networks: Vec<NetworkRow>,
    pub portgroups: Vec<NetworkRow>,
    pub switches: Vec<SwitchRow>,
    pub warnings: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  vms
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct VmRow {
    pub reference: ObjectReference,
    /// Name up to the first space.
    pub name: String,
    pub host_name: String,
    pub guest_id: String,
    pub power_state: String,
    pub ip_address: String,
}

impl VmRow {
    pub fn from_record(record: &PropertyRecord) -> Self {
        let text = |path: &str| record.text(path).unwrap_or_default().to_string();
        Self {
            reference: record.reference.clone(),
            name: short_name(record.name()).to_string(),
            host_name: text("summary.guest.hostName"),
            guest_id: text("summary.guest.guestId"),
            power_state: text("summary.runtime.powerState"),
            ip_address: text("summary.guest.ipAddress"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmListReport {
    pub discovered: usize,
    pub rows: Vec<VmRow>,
    pub warnings: Vec<String>,
}

/// Text before the first space.
pub fn short_name(name: &str) -> &str {
    name.split(' ').next().unwrap_or(name)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  show
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether a VM record is selected by `selector`: exact id, or a
/// case-insensitive match on name, guest host name or guest IP.
pub fn matches_selector(record: &PropertyRecord, selector: &str) -> bool {
    if record.id() == selector {
        return true;
    }
    let wanted = selector.to_lowercase();
    [
        Some(record.name()),
        record.text("summary.guest.hostName"),
        record.text("summary.guest.ipAddress"),
    ]
    .into_iter()
    .flatten()
    .any(|candidate| !candidate.is_empty() && candidate.to_lowercase() == wanted)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSection {
    pub path: String,
    pub uuid: String,
    pub guest_full_name: String,
    pub memory_mb: Option<i64>,
    pub memory_reservation: Option<i64>,
    pub num_cpu: Option<i64>,
    pub cpu_reservation: Option<i64>,
    pub guest_id: String,
    pub instance_uuid: String,
    pub ethernet_cards: Option<i64>,
    pub virtual_disks: Option<i64>,
    pub template: Option<bool>,
    /// Extension key of the managing solution.
    pub managed_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestSection {
    pub host_name: String,
    pub ip_address: String,
    pub guest_id: String,
    pub guest_full_name: String,
    pub tools_running_status: String,
    pub tools_version_status: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeSection {
    pub host_name: Option<String>,
    pub host_id: Option<String>,
    pub boot_time: Option<String>,
    pub power_state: String,
    pub paused: Option<bool>,
    pub clean_power_off: Option<bool>,
    pub suspend_time: Option<String>,
    pub memory_overhead: Option<i64>,
    pub max_memory_usage: Option<i64>,
    pub max_cpu_usage: Option<i64>,
}

impl RuntimeSection {
    pub fn is_powered_on(&self) -> bool {
        self.power_state == "poweredOn"
    }
}

/// Byte counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageSection {
    pub uncommitted: Option<i64>,
    pub committed: Option<i64>,
    pub unshared: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuickStats {
    pub overall_cpu_demand: Option<i64>,
    pub overall_cpu_usage: Option<i64>,
    pub ballooned_memory: Option<i64>,
    pub compressed_memory: Option<i64>,
    pub consumed_overhead_memory: Option<i64>,
    pub guest_memory_usage: Option<i64>,
    pub host_memory_usage: Option<i64>,
    pub swapped_memory: Option<i64>,
    pub shared_memory: Option<i64>,
    pub private_memory: Option<i64>,
    pub uptime_seconds: Option<i64>,
}

/// Everything the detail view shows for one virtual machine.
#[derive(Debug, Clone)]
pub struct VmDetail {
    pub view: EntityView,
    pub config: ConfigSection,
    pub guest: GuestSection,
    pub runtime: RuntimeSection,
    pub storage: StorageSection,
    pub quick_stats: QuickStats,
    pub annotations: Vec<(String, String)>,
    /// The console link, or why it could not be issued.
    pub console: Result<ConsoleLink, InventoryError>,
}

impl VmDetail {
    pub fn new(view: EntityView, console: Result<ConsoleLink, InventoryError>) -> Self {
        let vm = &view.entity;
        let text = |path: &str| vm.text(path).unwrap_or_default().to_string();
        let opt_text = |path: &str| vm.text(path).filter(|s| !s.is_empty()).map(str::to_string);
        let int = |path: &str| vm.integer(path);

        let config = ConfigSection {
            path: text("summary.config.vmPathName"),
            uuid: text("summary.config.uuid"),
            guest_full_name: text("summary.config.guestFullName"),
            memory_mb: int("summary.config.memorySizeMB"),
            memory_reservation: int("summary.config.memoryReservation"),
            num_cpu: int("summary.config.numCpu"),
            cpu_reservation: int("summary.config.cpuReservation"),
            guest_id: text("summary.config.guestId"),
            instance_uuid: text("summary.config.instanceUuid"),
            ethernet_cards: int("summary.config.numEthernetCards"),
            virtual_disks: int("summary.config.numVirtualDisks"),
            template: vm.boolean("summary.config.template"),
            managed_by: opt_text("summary.config.managedBy.extensionKey"),
        };
        let guest = GuestSection {
            host_name: text("summary.guest.hostName"),
            ip_address: text("summary.guest.ipAddress"),
            guest_id: text("summary.guest.guestId"),
            guest_full_name: text("summary.guest.guestFullName"),
            tools_running_status: text("summary.guest.toolsRunningStatus"),
            tools_version_status: text("summary.guest.toolsVersionStatus"),
        };
        let runtime = RuntimeSection {
            host_name: view.host().map(|h| h.name().to_string()),
            host_id: vm.reference_at("summary.runtime.host").map(|h| h.id.clone()),
            boot_time: opt_text("summary.runtime.bootTime"),
            power_state: text("summary.runtime.powerState"),
            paused: vm.boolean("summary.runtime.paused"),
            clean_power_off: vm.boolean("summary.runtime.cleanPowerOff"),
            suspend_time: opt_text("summary.runtime.suspendTime"),
            memory_overhead: int("summary.runtime.memoryOverhead"),
            max_memory_usage: int("summary.runtime.maxMemoryUsage"),
            max_cpu_usage: int("summary.runtime.maxCpuUsage"),
        };
        let storage = StorageSection {
            uncommitted: int("summary.storage.uncommitted"),
            committed: int("summary.storage.committed"),
            unshared: int("summary.storage.unshared"),
        };
        let quick_stats = QuickStats {
            overall_cpu_demand: int("summary.quickStats.overallCpuDemand"),
            overall_cpu_usage: int("summary.quickStats.overallCpuUsage"),
            ballooned_memory: int("summary.quickStats.balloonedMemory"),
            compressed_memory: int("summary.quickStats.compressedMemory"),
            consumed_overhead_memory: int("summary.quickStats.consumedOverheadMemory"),
            guest_memory_usage: int("summary.quickStats.guestMemoryUsage"),
            host_memory_usage: int("summary.quickStats.hostMemoryUsage"),
            swapped_memory: int("summary.quickStats.swappedMemory"),
            shared_memory: int("summary.quickStats.sharedMemory"),
            private_memory: int("summary.quickStats.privateMemory"),
            uptime_seconds: int("summary.quickStats.uptimeSeconds"),
        };
        let annotations = parse_annotations(vm.text("summary.config.annotation").unwrap_or_default());

        Self {
            config,
            guest,
            runtime,
            storage,
            quick_stats,
            annotations,
            console,
            view,
        }
    }

    pub fn name(&self) -> &str {
        self.view.entity.name()
    }

    pub fn id(&self) -> &str {
        self.view.entity.id()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DetailReport {
    pub discovered: usize,
    pub details: Vec<VmDetail>,
    pub warnings: Vec<String>,
}

/// Split a VM annotation into `key:value` pairs. Tokens are separated by
/// whitespace; a token without a colon has an empty value.
pub fn parse_annotations(annotation: &str) -> Vec<(String, String)> {
    annotation
        .split_whitespace()
        .map(|token| match token.split_once(':') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (token.to_string(), String::new()),
        })
        .collect()
}
