//! Domain records returned by the resource client.
//!
//! The REST API already returns these shapes (wrapped in a list envelope),
//! so they deserialize straight from REST JSON. GraphQL responses are
//! converted into them in [`crate::graphql`]. Every field defaults to its
//! zero value because each protocol omits fields the other provides.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Paged list envelope used by the REST API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultList<T> {
    pub has_more: bool,
    pub total: Option<u64>,
    pub data: Vec<T>,
}

impl<T> Default for ResultList<T> {
    fn default() -> Self {
        Self {
            has_more: false,
            total: None,
            data: Vec::new(),
        }
    }
}

impl<T> ResultList<T> {
    pub fn into_data(self) -> Vec<T> {
        self.data
    }
}

/// Decode a JSON value with `null` members treated as absent, so they fall
/// back to the field default like omitted ones do.
pub fn from_value_lenient<T: DeserializeOwned>(mut value: Value) -> serde_json::Result<T> {
    strip_nulls(&mut value);
    serde_json::from_value(value)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, member| !member.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Accept `true`, `"true"`, `"True"` and `null` for boolean flags; the
/// appliance is not consistent about it.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    Ok(match Option::<BoolOrString>::deserialize(deserializer)? {
        Some(BoolOrString::Bool(b)) => b,
        Some(BoolOrString::Str(s)) => s.eq_ignore_ascii_case("true"),
        None => false,
    })
}

/// A Rubrik cluster node.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    pub id: String,
    /// Brik (chassis) the node belongs to; GraphQL reports it as `name`
    pub brik_id: String,
    pub status: String,
    pub ip_address: String,
    pub needs_inspection: bool,
}

/// Per-node statistics (REST only).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeStat {
    pub id: String,
    pub brik_id: String,
    pub status: String,
    pub ip_address: String,
    pub needs_inspection: bool,
    pub network_stat: NetworkStat,
    pub iops: Iops,
    pub io_throughput: IoThroughput,
    pub cpu_stat: Vec<TimeStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkStat {
    pub bytes_received: Vec<TimeStat>,
    pub bytes_transmitted: Vec<TimeStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Iops {
    pub reads_per_second: Vec<TimeStat>,
    pub writes_per_second: Vec<TimeStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IoThroughput {
    #[serde(rename = "readBytePerSecond")]
    pub read_bytes_per_second: Vec<TimeStat>,
    #[serde(rename = "writeBytePerSecond")]
    pub write_bytes_per_second: Vec<TimeStat>,
}

/// One point of an appliance time series.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeStat {
    pub time: String,
    pub stat: f64,
}

impl TimeStat {
    /// Latest value of a series, if any.
    pub fn last_value(series: &[TimeStat]) -> Option<f64> {
        series.last().map(|point| point.stat)
    }
}

/// Hypervisor family a virtual machine was discovered through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hypervisor {
    #[default]
    Vmware,
    Nutanix,
    Hyperv,
}

impl Hypervisor {
    pub const ALL: [Hypervisor; 3] = [Hypervisor::Vmware, Hypervisor::Nutanix, Hypervisor::Hyperv];

    pub fn as_str(&self) -> &'static str {
        match self {
            Hypervisor::Vmware => "vmware",
            Hypervisor::Nutanix => "nutanix",
            Hypervisor::Hyperv => "hyperv",
        }
    }
}

/// A protected virtual machine, independent of hypervisor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub effective_sla_domain_id: String,
    /// Set by the client after decoding; not part of either wire format
    #[serde(skip_deserializing)]
    pub hypervisor: Hypervisor,
}

/// A managed volume export.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedVolume {
    pub id: String,
    pub name: String,
    pub state: String,
    pub num_channels: f64,
    pub configured_sla_domain_name: String,
    pub configured_sla_domain_id: String,
    pub effective_sla_domain_id: String,
    pub effective_sla_domain_name: String,
    pub primary_cluster_id: String,
    pub used_size: f64,
    pub volume_size: f64,
    pub sla_assignment: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_writable: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_relic: bool,
    pub snapshot_count: f64,
    pub pending_snapshot_count: f64,
}

/// An archival target (object store, NFS, tape...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveLocation {
    pub id: String,
    pub name: String,
    pub location_type: String,
    pub is_active: bool,
    pub ip_address: String,
    pub bucket: String,
}

/// Cluster-wide storage breakdown in bytes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemStorage {
    pub total: i64,
    pub used: i64,
    pub available: i64,
    pub snapshot: i64,
    pub live_mount: i64,
    pub miscellaneous: i64,
}

/// Storage consumed by a single protected workload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VmStorage {
    pub id: String,
    pub logical_bytes: f64,
    pub ingested_bytes: f64,
    pub exclusive_physical_bytes: f64,
    pub shared_physical_bytes: f64,
    pub index_storage_bytes: f64,
}

/// Usage counters of one archival location.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataLocationUsage {
    pub location_id: String,
    pub data_downloaded: i64,
    pub data_archived: i64,
    #[serde(rename = "numVMsArchived")]
    pub num_vms_archived: i64,
    pub num_filesets_archived: i64,
    pub num_linux_filesets_archived: i64,
    pub num_windows_filesets_archived: i64,
    pub num_share_filesets_archived: i64,
    pub num_mssql_dbs_archived: i64,
    pub num_hyperv_vms_archived: i64,
    pub num_nutanix_vms_archived: i64,
    pub num_managed_volumes_archived: i64,
}

/// Cluster identity and software version.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub status: String,
}

/// A report definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    pub id: String,
    pub name: String,
    pub report_type: String,
    pub report_template: String,
    pub update_time: String,
    pub update_status: String,
}

/// One chart of a report.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportData {
    pub id: String,
    pub name: String,
    pub attribute: String,
    pub chart_type: String,
    pub measure: String,
    pub data_columns: Vec<ReportDataColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportDataColumn {
    pub label: String,
    pub data_points: Vec<ReportDataPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportDataPoint {
    pub measure: String,
    pub value: f64,
}

/// Task outcome label (lower-cased) to count, e.g. `succeeded => 3`.
pub type JobOutcomeCounts = BTreeMap<String, f64>;

/// Reduce report charts into outcome counts.
///
/// Only the first chart is considered; each of its columns contributes its
/// first data point under the lower-cased column label. Columns without
/// data points are skipped.
pub fn reduce_job_outcomes(charts: &[ReportData]) -> JobOutcomeCounts {
    let mut counts = JobOutcomeCounts::new();

    let Some(chart) = charts.first() else {
        return counts;
    };

    for column in &chart.data_columns {
        if let Some(point) = column.data_points.first() {
            counts.insert(column.label.to_lowercase(), point.value);
        }
    }

    counts
}

/// `{"count": n}` from the stream count endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct CountResponse {
    pub count: i64,
}

/// `{"days": n}` from the runway endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RunwayResponse {
    pub days: i64,
}

/// `{"bytes": n}` from the storage growth endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StorageGrowthResponse {
    pub bytes: i64,
}
