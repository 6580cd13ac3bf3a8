//! Prometheus metrics definitions and collection logic.
//!
//! This module defines all Prometheus metrics exposed by the exporter
//! and populates them from the resource client on every scrape.

use crate::client::{FetchSource, RubrikClient};
use crate::error::{Result, RubrikError};
use crate::models::{
    ArchiveLocation, ClusterInfo, DataLocationUsage, Hypervisor, JobOutcomeCounts,
    ManagedVolume, Node, NodeStat, SystemStorage, TimeStat, VirtualMachine, VmStorage,
};
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

const NODE_OK: &str = "OK";
const UNPROTECTED: &str = "UNPROTECTED";

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn register_gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Metrics collector for Rubrik exporter.
#[derive(Clone)]
pub struct MetricsCollector {
    client: Arc<RubrikClient>,
    registry: Registry,

    // Exporter metrics
    rubrik_up: Gauge,
    fetch_source: GaugeVec,

    // Cluster metrics
    cluster_info: GaugeVec,
    system_storage_bytes: GaugeVec,
    streams: Gauge,
    runway_remaining_days: Gauge,
    storage_growth_bytes_per_day: Gauge,
    physical_ingest_bytes_per_second: Gauge,

    // Node metrics
    node_status: GaugeVec,
    node_needs_inspection: GaugeVec,
    node_cpu_usage_percent: GaugeVec,
    node_network_bytes_per_second: GaugeVec,
    node_iops: GaugeVec,
    node_throughput_bytes_per_second: GaugeVec,

    // Workload metrics
    vm_count: GaugeVec,
    vm_protected: GaugeVec,
    vm_storage_bytes: GaugeVec,
    managed_volume_size_bytes: GaugeVec,
    managed_volume_used_bytes: GaugeVec,
    managed_volume_snapshots: GaugeVec,
    managed_volume_pending_snapshots: GaugeVec,

    // Archival metrics
    archive_location_active: GaugeVec,
    archive_location_archived_bytes: GaugeVec,
    archive_location_downloaded_bytes: GaugeVec,
    archive_location_archived_objects: GaugeVec,
    archive_location_bandwidth_bytes_per_second: GaugeVec,

    // Task metrics
    task_outcomes: GaugeVec,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(client: Arc<RubrikClient>) -> Result<Self> {
        let registry = Registry::new();
        let r = &registry;

        let rubrik_up = register_gauge(
            r,
            "rubrik_up",
            "Whether the last scrape reached the Rubrik appliance (1 = success, 0 = failure)",
        )?;
        let fetch_source = register_gauge_vec(
            r,
            "rubrik_fetch_source",
            "Protocol that served the last fetch of a category (2 = GraphQL, 1 = REST, 0 = failed)",
            &["category"],
        )?;

        let cluster_info = register_gauge_vec(
            r,
            "rubrik_cluster_info",
            "Rubrik cluster information",
            &["cluster_id", "name", "version"],
        )?;
        let system_storage_bytes = register_gauge_vec(
            r,
            "rubrik_system_storage_bytes",
            "Cluster storage by kind (total, used, available, snapshot, live_mount, miscellaneous)",
            &["kind"],
        )?;
        let streams = register_gauge(r, "rubrik_streams", "Number of active streams")?;
        let runway_remaining_days = register_gauge(
            r,
            "rubrik_runway_remaining_days",
            "Days remaining before the cluster storage is full",
        )?;
        let storage_growth_bytes_per_day = register_gauge(
            r,
            "rubrik_average_storage_growth_bytes_per_day",
            "Average storage growth per day in bytes",
        )?;
        let physical_ingest_bytes_per_second = register_gauge(
            r,
            "rubrik_physical_ingest_bytes_per_second",
            "Latest physical ingest rate",
        )?;

        let node_status = register_gauge_vec(
            r,
            "rubrik_node_status",
            "Node status (1 = OK, 0 = anything else)",
            &["node_id", "brik_id", "ip_address"],
        )?;
        let node_needs_inspection = register_gauge_vec(
            r,
            "rubrik_node_needs_inspection",
            "Whether the node is flagged for inspection",
            &["node_id"],
        )?;
        let node_cpu_usage_percent = register_gauge_vec(
            r,
            "rubrik_node_cpu_usage_percent",
            "Latest CPU usage of the node",
            &["node_id"],
        )?;
        let node_network_bytes_per_second = register_gauge_vec(
            r,
            "rubrik_node_network_bytes_per_second",
            "Latest network throughput of the node",
            &["node_id", "direction"],
        )?;
        let node_iops = register_gauge_vec(
            r,
            "rubrik_node_iops",
            "Latest I/O operations per second of the node",
            &["node_id", "operation"],
        )?;
        let node_throughput_bytes_per_second = register_gauge_vec(
            r,
            "rubrik_node_throughput_bytes_per_second",
            "Latest disk throughput of the node",
            &["node_id", "operation"],
        )?;

        let vm_count = register_gauge_vec(
            r,
            "rubrik_vm_count",
            "Number of virtual machines known to Rubrik",
            &["hypervisor"],
        )?;
        let vm_protected = register_gauge_vec(
            r,
            "rubrik_vm_protected",
            "Whether the VM has an effective SLA domain (1 = protected)",
            &["vm_id", "vm_name", "hypervisor", "sla_domain_id"],
        )?;
        let vm_storage_bytes = register_gauge_vec(
            r,
            "rubrik_vm_storage_bytes",
            "Per-VM storage by kind (logical, ingested, exclusive_physical, shared_physical, index)",
            &["vm_id", "vm_name", "kind"],
        )?;
        let managed_volume_size_bytes = register_gauge_vec(
            r,
            "rubrik_managed_volume_size_bytes",
            "Configured size of the managed volume",
            &["volume_id", "name", "state"],
        )?;
        let managed_volume_used_bytes = register_gauge_vec(
            r,
            "rubrik_managed_volume_used_bytes",
            "Used size of the managed volume",
            &["volume_id", "name"],
        )?;
        let managed_volume_snapshots = register_gauge_vec(
            r,
            "rubrik_managed_volume_snapshots",
            "Number of snapshots of the managed volume",
            &["volume_id", "name"],
        )?;
        let managed_volume_pending_snapshots = register_gauge_vec(
            r,
            "rubrik_managed_volume_pending_snapshots",
            "Number of pending snapshots of the managed volume",
            &["volume_id", "name"],
        )?;

        let archive_location_active = register_gauge_vec(
            r,
            "rubrik_archive_location_active",
            "Whether the archive location is active/connected",
            &["location_id", "name", "location_type"],
        )?;
        let archive_location_archived_bytes = register_gauge_vec(
            r,
            "rubrik_archive_location_archived_bytes",
            "Data archived to the location",
            &["location_id"],
        )?;
        let archive_location_downloaded_bytes = register_gauge_vec(
            r,
            "rubrik_archive_location_downloaded_bytes",
            "Data downloaded from the location",
            &["location_id"],
        )?;
        let archive_location_archived_objects = register_gauge_vec(
            r,
            "rubrik_archive_location_archived_objects",
            "Number of archived objects by type",
            &["location_id", "object_type"],
        )?;
        let archive_location_bandwidth_bytes_per_second = register_gauge_vec(
            r,
            "rubrik_archive_location_bandwidth_bytes_per_second",
            "Latest archival bandwidth towards the location",
            &["location_id"],
        )?;

        let task_outcomes = register_gauge_vec(
            r,
            "rubrik_task_outcomes",
            "Protection task outcomes from the task details report",
            &["status"],
        )?;

        Ok(Self {
            client,
            registry,
            rubrik_up,
            fetch_source,
            cluster_info,
            system_storage_bytes,
            streams,
            runway_remaining_days,
            storage_growth_bytes_per_day,
            physical_ingest_bytes_per_second,
            node_status,
            node_needs_inspection,
            node_cpu_usage_percent,
            node_network_bytes_per_second,
            node_iops,
            node_throughput_bytes_per_second,
            vm_count,
            vm_protected,
            vm_storage_bytes,
            managed_volume_size_bytes,
            managed_volume_used_bytes,
            managed_volume_snapshots,
            managed_volume_pending_snapshots,
            archive_location_active,
            archive_location_archived_bytes,
            archive_location_downloaded_bytes,
            archive_location_archived_objects,
            archive_location_bandwidth_bytes_per_second,
            task_outcomes,
        })
    }

    /// Collect all metrics from Rubrik.
    ///
    /// Individual categories never fail; an error is only returned when no
    /// category could be served by either protocol.
    pub async fn collect(&self) -> Result<()> {
        info!("Collecting metrics from Rubrik");

        self.reset();
        self.client.reset_fetch_health();
        self.collect_internal().await;

        let health = self.client.fetch_health();
        for (category, source) in &health {
            self.fetch_source
                .with_label_values(&[category])
                .set(source.as_gauge_value());
        }

        let failed: Vec<&str> = health
            .iter()
            .filter(|(_, source)| **source == FetchSource::Failed)
            .map(|(category, _)| *category)
            .collect();

        if !health.is_empty() && failed.len() == health.len() {
            error!("Every category failed over both GraphQL and REST");
            self.rubrik_up.set(0.0);
            return Err(RubrikError::Unavailable(format!(
                "all {} categories failed",
                failed.len()
            )));
        }

        if !failed.is_empty() {
            debug!("Categories without data this scrape: {:?}", failed);
        }
        self.rubrik_up.set(1.0);
        info!("Successfully collected metrics");
        Ok(())
    }

    // Objects that disappear upstream must disappear from the output too.
    fn reset(&self) {
        self.rubrik_up.set(0.0);
        self.fetch_source.reset();
        self.cluster_info.reset();
        self.system_storage_bytes.reset();
        self.streams.set(0.0);
        self.runway_remaining_days.set(0.0);
        self.storage_growth_bytes_per_day.set(0.0);
        self.physical_ingest_bytes_per_second.set(0.0);
        self.node_status.reset();
        self.node_needs_inspection.reset();
        self.node_cpu_usage_percent.reset();
        self.node_network_bytes_per_second.reset();
        self.node_iops.reset();
        self.node_throughput_bytes_per_second.reset();
        self.vm_count.reset();
        self.vm_protected.reset();
        self.vm_storage_bytes.reset();
        self.managed_volume_size_bytes.reset();
        self.managed_volume_used_bytes.reset();
        self.managed_volume_snapshots.reset();
        self.managed_volume_pending_snapshots.reset();
        self.archive_location_active.reset();
        self.archive_location_archived_bytes.reset();
        self.archive_location_downloaded_bytes.reset();
        self.archive_location_archived_objects.reset();
        self.archive_location_bandwidth_bytes_per_second.reset();
        self.task_outcomes.reset();
    }

    async fn collect_internal(&self) {
        let cluster = self.client.get_cluster_info().await;
        self.update_cluster_metrics(&cluster);

        let nodes = self.client.get_nodes().await;
        self.update_node_metrics(&nodes);
        for node in &nodes {
            let stat = self
                .client
                .get_node_stats(&node.id, self.client.time_series_range())
                .await;
            self.update_node_stat_metrics(&node.id, &stat);
        }

        let vms = self.client.list_all_vms().await;
        self.update_vm_metrics(&vms);

        let vm_storage = self.client.get_per_vm_storage().await;
        self.update_vm_storage_metrics(&vm_storage, &vms);

        let volumes = self.client.get_managed_volumes().await;
        self.update_managed_volume_metrics(&volumes);

        let locations = self.client.get_archive_locations().await;
        self.update_archive_location_metrics(&locations);
        for location in &locations {
            let bandwidth = self
                .client
                .get_archival_bandwidth(&location.id, self.client.archival_bandwidth_range())
                .await;
            if let Some(value) = TimeStat::last_value(&bandwidth) {
                self.archive_location_bandwidth_bytes_per_second
                    .with_label_values(&[&location.id])
                    .set(value);
            }
        }

        let usage = self.client.get_data_location_usage().await;
        self.update_data_location_metrics(&usage);

        let storage = self.client.get_system_storage().await;
        self.update_system_storage_metrics(&storage);

        self.streams
            .set(self.client.get_stream_count().await as f64);
        self.runway_remaining_days
            .set(self.client.get_runway_remaining().await as f64);
        self.storage_growth_bytes_per_day
            .set(self.client.get_average_storage_growth_per_day().await as f64);

        let ingest = self
            .client
            .get_physical_ingest(self.client.time_series_range())
            .await;
        if let Some(value) = TimeStat::last_value(&ingest) {
            self.physical_ingest_bytes_per_second.set(value);
        }

        let outcomes = self.client.get_job_outcome_counts().await;
        self.update_task_metrics(&outcomes);
    }

    fn update_cluster_metrics(&self, cluster: &ClusterInfo) {
        if cluster.id.is_empty() && cluster.version.is_empty() {
            return;
        }
        self.cluster_info
            .with_label_values(&[&cluster.id, &cluster.name, &cluster.version])
            .set(1.0);
    }

    fn update_node_metrics(&self, nodes: &[Node]) {
        debug!("Updating node metrics for {} nodes", nodes.len());
        for node in nodes {
            self.node_status
                .with_label_values(&[&node.id, &node.brik_id, &node.ip_address])
                .set(flag(node.status.eq_ignore_ascii_case(NODE_OK)));
            self.node_needs_inspection
                .with_label_values(&[&node.id])
                .set(flag(node.needs_inspection));
        }
    }

    fn update_node_stat_metrics(&self, node_id: &str, stat: &NodeStat) {
        if let Some(cpu) = TimeStat::last_value(&stat.cpu_stat) {
            self.node_cpu_usage_percent
                .with_label_values(&[node_id])
                .set(cpu);
        }

        let series = [
            (
                &self.node_network_bytes_per_second,
                "received",
                &stat.network_stat.bytes_received,
            ),
            (
                &self.node_network_bytes_per_second,
                "transmitted",
                &stat.network_stat.bytes_transmitted,
            ),
            (&self.node_iops, "read", &stat.iops.reads_per_second),
            (&self.node_iops, "write", &stat.iops.writes_per_second),
            (
                &self.node_throughput_bytes_per_second,
                "read",
                &stat.io_throughput.read_bytes_per_second,
            ),
            (
                &self.node_throughput_bytes_per_second,
                "write",
                &stat.io_throughput.write_bytes_per_second,
            ),
        ];

        for (gauge, label, points) in series {
            if let Some(value) = TimeStat::last_value(points) {
                gauge.with_label_values(&[node_id, label]).set(value);
            }
        }
    }

    fn update_vm_metrics(&self, vms: &[VirtualMachine]) {
        debug!("Updating VM metrics for {} VMs", vms.len());

        for hypervisor in Hypervisor::ALL {
            let count = vms.iter().filter(|vm| vm.hypervisor == hypervisor).count();
            self.vm_count
                .with_label_values(&[hypervisor.as_str()])
                .set(count as f64);
        }

        for vm in vms {
            let protected = !vm.effective_sla_domain_id.is_empty()
                && vm.effective_sla_domain_id != UNPROTECTED;
            self.vm_protected
                .with_label_values(&[
                    vm.id.as_str(),
                    &vm.name,
                    vm.hypervisor.as_str(),
                    &vm.effective_sla_domain_id,
                ])
                .set(flag(protected));
        }
    }

    fn update_vm_storage_metrics(&self, storage: &[VmStorage], vms: &[VirtualMachine]) {
        let names: HashMap<&str, &str> = vms
            .iter()
            .map(|vm| (vm.id.as_str(), vm.name.as_str()))
            .collect();

        for entry in storage {
            let name = names.get(entry.id.as_str()).copied().unwrap_or_default();
            let kinds = [
                ("logical", entry.logical_bytes),
                ("ingested", entry.ingested_bytes),
                ("exclusive_physical", entry.exclusive_physical_bytes),
                ("shared_physical", entry.shared_physical_bytes),
                ("index", entry.index_storage_bytes),
            ];
            for (kind, value) in kinds {
                self.vm_storage_bytes
                    .with_label_values(&[entry.id.as_str(), name, kind])
                    .set(value);
            }
        }
    }

    fn update_managed_volume_metrics(&self, volumes: &[ManagedVolume]) {
        debug!("Updating managed volume metrics for {} volumes", volumes.len());
        for volume in volumes {
            self.managed_volume_size_bytes
                .with_label_values(&[&volume.id, &volume.name, &volume.state])
                .set(volume.volume_size);
            self.managed_volume_used_bytes
                .with_label_values(&[&volume.id, &volume.name])
                .set(volume.used_size);
            self.managed_volume_snapshots
                .with_label_values(&[&volume.id, &volume.name])
                .set(volume.snapshot_count);
            self.managed_volume_pending_snapshots
                .with_label_values(&[&volume.id, &volume.name])
                .set(volume.pending_snapshot_count);
        }
    }

    fn update_archive_location_metrics(&self, locations: &[ArchiveLocation]) {
        for location in locations {
            self.archive_location_active
                .with_label_values(&[&location.id, &location.name, &location.location_type])
                .set(flag(location.is_active));
        }
    }

    fn update_data_location_metrics(&self, usage: &[DataLocationUsage]) {
        for entry in usage {
            let id = entry.location_id.as_str();
            self.archive_location_archived_bytes
                .with_label_values(&[id])
                .set(entry.data_archived as f64);
            self.archive_location_downloaded_bytes
                .with_label_values(&[id])
                .set(entry.data_downloaded as f64);

            let objects = [
                ("vmware_vm", entry.num_vms_archived),
                ("fileset", entry.num_filesets_archived),
                ("linux_fileset", entry.num_linux_filesets_archived),
                ("windows_fileset", entry.num_windows_filesets_archived),
                ("share_fileset", entry.num_share_filesets_archived),
                ("mssql_db", entry.num_mssql_dbs_archived),
                ("hyperv_vm", entry.num_hyperv_vms_archived),
                ("nutanix_vm", entry.num_nutanix_vms_archived),
                ("managed_volume", entry.num_managed_volumes_archived),
            ];
            for (object_type, count) in objects {
                self.archive_location_archived_objects
                    .with_label_values(&[id, object_type])
                    .set(count as f64);
            }
        }
    }

    fn update_system_storage_metrics(&self, storage: &SystemStorage) {
        let kinds = [
            ("total", storage.total),
            ("used", storage.used),
            ("available", storage.available),
            ("snapshot", storage.snapshot),
            ("live_mount", storage.live_mount),
            ("miscellaneous", storage.miscellaneous),
        ];
        for (kind, value) in kinds {
            self.system_storage_bytes
                .with_label_values(&[kind])
                .set(value as f64);
        }
    }

    fn update_task_metrics(&self, outcomes: &JobOutcomeCounts) {
        debug!("Updating task outcome metrics: {:?}", outcomes);
        for (status, count) in outcomes {
            self.task_outcomes.with_label_values(&[status]).set(*count);
        }
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        // Reuse buffer to avoid allocation on every scrape
        thread_local! {
            static BUFFER: std::cell::RefCell<Vec<u8>> = std::cell::RefCell::new(Vec::with_capacity(8192));
        }

        BUFFER.with(|buf| {
            let mut buffer = buf.borrow_mut();
            buffer.clear();

            encoder
                .encode(&metric_families, &mut *buffer)
                .map_err(|e| RubrikError::Metrics(e.to_string()))?;

            String::from_utf8(buffer.clone()).map_err(|e| RubrikError::Metrics(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::session::Session;

    fn collector() -> MetricsCollector {
        let mut config = Settings::default().rubrik;
        config.endpoint = "https://127.0.0.1:1".to_string();
        let client = RubrikClient::new(&config, Session::from_token("test")).unwrap();
        MetricsCollector::new(Arc::new(client)).unwrap()
    }

    #[test]
    fn test_vm_metrics_count_per_hypervisor() {
        let collector = collector();
        let vms = vec![
            VirtualMachine {
                id: "vm-1".to_string(),
                name: "web01".to_string(),
                effective_sla_domain_id: "sla-gold".to_string(),
                hypervisor: Hypervisor::Vmware,
            },
            VirtualMachine {
                id: "vm-2".to_string(),
                name: "web02".to_string(),
                effective_sla_domain_id: UNPROTECTED.to_string(),
                hypervisor: Hypervisor::Vmware,
            },
            VirtualMachine {
                id: "vm-3".to_string(),
                name: "hv01".to_string(),
                effective_sla_domain_id: String::new(),
                hypervisor: Hypervisor::Hyperv,
            },
        ];

        collector.update_vm_metrics(&vms);

        assert_eq!(collector.vm_count.with_label_values(&["vmware"]).get(), 2.0);
        assert_eq!(collector.vm_count.with_label_values(&["nutanix"]).get(), 0.0);
        assert_eq!(collector.vm_count.with_label_values(&["hyperv"]).get(), 1.0);
        assert_eq!(
            collector
                .vm_protected
                .with_label_values(&["vm-1", "web01", "vmware", "sla-gold"])
                .get(),
            1.0
        );
        assert_eq!(
            collector
                .vm_protected
                .with_label_values(&["vm-2", "web02", "vmware", UNPROTECTED])
                .get(),
            0.0
        );
    }

    #[test]
    fn test_task_outcomes_are_exposed_by_status() {
        let collector = collector();
        let mut outcomes = JobOutcomeCounts::new();
        outcomes.insert("succeeded".to_string(), 12.0);
        outcomes.insert("failed".to_string(), 1.0);

        collector.update_task_metrics(&outcomes);
        let text = collector.encode().unwrap();

        assert!(text.contains(r#"rubrik_task_outcomes{status="succeeded"} 12"#));
        assert!(text.contains(r#"rubrik_task_outcomes{status="failed"} 1"#));
    }

    #[test]
    fn test_node_stat_metrics_use_latest_point() {
        let collector = collector();
        let point = |stat: f64| TimeStat {
            time: String::new(),
            stat,
        };
        let mut stat = NodeStat::default();
        stat.cpu_stat = vec![point(10.0), point(42.0)];
        stat.iops.reads_per_second = vec![point(300.0)];

        collector.update_node_stat_metrics("RVM1", &stat);

        assert_eq!(
            collector
                .node_cpu_usage_percent
                .with_label_values(&["RVM1"])
                .get(),
            42.0
        );
        assert_eq!(
            collector.node_iops.with_label_values(&["RVM1", "read"]).get(),
            300.0
        );
    }
}
