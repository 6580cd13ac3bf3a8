//! GraphQL client for the Rubrik API.
//!
//! Each resource category has a fixed, named query document and a response
//! shape type. Connection-style results (`edges { node { .. } }`) share the
//! generic [`Connection`] wrapper. Converting a response shape into domain
//! records is done by pure `into_*` methods so it can be tested without a
//! server.

use crate::config::RubrikConfig;
use crate::error::{Result, RubrikError};
use crate::models::{
    from_value_lenient, ArchiveLocation, ClusterInfo, DataLocationUsage, Hypervisor, ManagedVolume, Node, Report,
    SystemStorage, TimeStat, VirtualMachine, VmStorage,
};
use crate::session::Session;
use crate::transport::{base_url, preview};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const GRAPHQL_PATH: &str = "/api/graphql";

/// Authenticated GraphQL client.
#[derive(Clone)]
pub struct GraphqlClient {
    client: Client,
    endpoint: String,
    session: Arc<Session>,
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    path: Vec<Value>,
}

impl GraphqlClient {
    pub fn new(client: Client, config: &RubrikConfig, session: Arc<Session>) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url(&config.endpoint), GRAPHQL_PATH),
            session,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a query and decode its `data` payload.
    ///
    /// An empty or `null` payload is not an error: it is logged and decoded
    /// as `T::default()`.
    pub async fn query<T>(&self, document: &str, variables: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        debug!("Executing GraphQL query: {:.100}", document.trim());

        let request = GraphqlRequest {
            query: document,
            variables: variables.as_ref(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.session.token())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                RubrikError::Query(format!(
                    "{} (endpoint {}, token present: {})",
                    e,
                    self.endpoint,
                    !self.session.token().is_empty()
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RubrikError::Query(format!(
                "HTTP {} from {}",
                status.as_u16(),
                self.endpoint
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RubrikError::Query(e.to_string()))?;

        let envelope: GraphqlResponse = serde_json::from_str(&body).map_err(|e| {
            RubrikError::Decode(format!(
                "GraphQL envelope: {}. Body preview: {}",
                e,
                preview(&body, 200)
            ))
        })?;

        if let Some(first) = envelope.errors.first() {
            return Err(RubrikError::Query(format!(
                "{} (path {:?}, {} error(s) total)",
                first.message,
                first.path,
                envelope.errors.len()
            )));
        }

        match envelope.data {
            Some(data) if !is_empty_payload(&data) => {
                debug!("GraphQL query succeeded with data (size: {} bytes)", body.len());
                from_value_lenient(data)
                    .map_err(|e| RubrikError::Decode(format!("GraphQL data: {}", e)))
            }
            _ => {
                warn!("GraphQL query succeeded but result is empty");
                Ok(T::default())
            }
        }
    }
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub const CLUSTER_INFO_QUERY: &str = r#"
query ClusterInfo {
  cluster {
    id
    name
    version
    status
  }
}"#;

pub const NODES_QUERY: &str = r#"
query Nodes {
  nodes {
    id
    name
    status
    ipAddress
    needsInspection
    cluster {
      id
      name
    }
  }
}"#;

pub const VMWARE_VMS_QUERY: &str = r#"
query VMwareVMs {
  vmwareVms {
    edges {
      node {
        id
        name
        effectiveSlaDomain {
          id
          name
        }
      }
    }
  }
}"#;

pub const NUTANIX_VMS_QUERY: &str = r#"
query NutanixVMs {
  nutanixVms {
    edges {
      node {
        id
        name
        effectiveSlaDomain {
          id
          name
        }
      }
    }
  }
}"#;

pub const HYPERV_VMS_QUERY: &str = r#"
query HypervVMs {
  hypervVms {
    edges {
      node {
        id
        name
        effectiveSlaDomain {
          id
          name
        }
      }
    }
  }
}"#;

pub const ARCHIVE_LOCATIONS_QUERY: &str = r#"
query ArchiveLocations {
  archiveLocations {
    edges {
      node {
        id
        name
        archivalLocationType
        status
      }
    }
  }
}"#;

pub const MANAGED_VOLUMES_QUERY: &str = r#"
query ManagedVolumes {
  managedVolumes {
    edges {
      node {
        id
        name
        state
        numChannels
        configuredSlaDomainName
        configuredSlaDomainId
        effectiveSlaDomain {
          id
          name
        }
        effectiveSlaDomainName
        primaryClusterId
        usedSize
        volumeSize
        slaAssignment
        isWritable
        isRelic
        snapshotCount
        pendingSnapshotCount
      }
    }
  }
}"#;

pub const SYSTEM_STORAGE_QUERY: &str = r#"
query SystemStorage {
  system {
    storage {
      total
      used
      available
      snapshot
      liveMount
      miscellaneous
    }
  }
}"#;

pub const PER_VM_STORAGE_QUERY: &str = r#"
query PerVMStorage {
  vmwareVms {
    edges {
      node {
        id
        name
        logicalBytes
        ingestedBytes
        exclusivePhysicalBytes
        sharedPhysicalBytes
        indexStorageBytes
      }
    }
  }
}"#;

pub const STREAMS_COUNT_QUERY: &str = r#"
query StreamsCount {
  system {
    streams {
      count
    }
  }
}"#;

pub const DATA_LOCATION_USAGE_QUERY: &str = r#"
query DataLocationUsage {
  archiveLocations {
    edges {
      node {
        id
        name
        dataDownloaded
        dataArchived
        numVMsArchived
        numFilesetsArchived
        numLinuxFilesetsArchived
        numWindowsFilesetsArchived
        numShareFilesetsArchived
        numMssqlDbsArchived
        numHypervVmsArchived
        numNutanixVmsArchived
        numManagedVolumesArchived
      }
    }
  }
}"#;

pub const PHYSICAL_INGEST_QUERY: &str = r#"
query PhysicalIngestTimeSeries($range: String!) {
  system {
    physicalIngest {
      timeSeries(range: $range) {
        date
        value
      }
    }
  }
}"#;

pub const ARCHIVAL_BANDWIDTH_QUERY: &str = r#"
query ArchivalBandwidthTimeSeries($range: String!) {
  system {
    archivalBandwidth {
      timeSeries(range: $range) {
        date
        value
      }
    }
  }
}"#;

pub const RUNWAY_REMAINING_QUERY: &str = r#"
query RunwayRemaining {
  system {
    runwayRemaining
  }
}"#;

pub const AVERAGE_STORAGE_GROWTH_QUERY: &str = r#"
query AverageStorageGrowth {
  system {
    averageStorageGrowthPerDay
  }
}"#;

pub const REPORTS_QUERY: &str = r#"
query Reports {
  reports {
    edges {
      node {
        id
        name
        reportType
        status
      }
    }
  }
}"#;

/// `{ edges: [{ node: T }] }`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
}

impl<T> Default for Connection<T> {
    fn default() -> Self {
        Self { edges: Vec::new() }
    }
}

impl<T> Connection<T> {
    /// Map every edge's node, preserving order and count.
    pub fn map_nodes<U>(self, f: impl FnMut(T) -> U) -> Vec<U> {
        self.edges.into_iter().map(|edge| edge.node).map(f).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

/// `{ id, name }` reference to another object, e.g. an SLA domain.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectRef {
    pub id: String,
    pub name: String,
}

/// Identifier of an optional reference; absent maps to an empty string.
fn ref_id(reference: Option<ObjectRef>) -> String {
    reference.map(|r| r.id).unwrap_or_default()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterInfoResponse {
    pub cluster: ClusterInfo,
}

impl ClusterInfoResponse {
    pub fn into_cluster_info(self) -> ClusterInfo {
        self.cluster
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub status: String,
    pub ip_address: String,
    pub needs_inspection: bool,
    pub cluster: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodesResponse {
    pub nodes: Vec<GraphNode>,
}

impl NodesResponse {
    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
            .into_iter()
            .map(|node| Node {
                id: node.id,
                brik_id: node.name,
                status: node.status,
                ip_address: node.ip_address,
                needs_inspection: node.needs_inspection,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphVm {
    pub id: String,
    pub name: String,
    pub effective_sla_domain: Option<ObjectRef>,
}

/// Shape shared by the three hypervisor inventory queries; only the root
/// field name differs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VmsResponse {
    #[serde(alias = "vmwareVms", alias = "nutanixVms", alias = "hypervVms")]
    pub vms: Connection<GraphVm>,
}

impl VmsResponse {
    pub fn into_vms(self, hypervisor: Hypervisor) -> Vec<VirtualMachine> {
        self.vms.map_nodes(|vm| VirtualMachine {
            id: vm.id,
            name: vm.name,
            effective_sla_domain_id: ref_id(vm.effective_sla_domain),
            hypervisor,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphArchiveLocation {
    pub id: String,
    pub name: String,
    pub archival_location_type: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveLocationsResponse {
    pub archive_locations: Connection<GraphArchiveLocation>,
}

impl ArchiveLocationsResponse {
    pub fn into_locations(self) -> Vec<ArchiveLocation> {
        self.archive_locations.map_nodes(|location| ArchiveLocation {
            id: location.id,
            name: location.name,
            location_type: location.archival_location_type,
            is_active: location.status == "CONNECTED",
            ..Default::default()
        })
    }
}

/// Managed volume node; scalar fields match the REST record, the effective
/// SLA domain is nested.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphManagedVolume {
    #[serde(flatten)]
    pub volume: ManagedVolume,
    pub effective_sla_domain: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedVolumesResponse {
    pub managed_volumes: Connection<GraphManagedVolume>,
}

impl ManagedVolumesResponse {
    pub fn into_volumes(self) -> Vec<ManagedVolume> {
        self.managed_volumes.map_nodes(|node| ManagedVolume {
            effective_sla_domain_id: ref_id(node.effective_sla_domain),
            ..node.volume
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemStorageResponse {
    pub system: SystemStorageSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemStorageSection {
    pub storage: SystemStorage,
}

impl SystemStorageResponse {
    pub fn into_storage(self) -> SystemStorage {
        self.system.storage
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerVmStorageResponse {
    pub vmware_vms: Connection<VmStorage>,
}

impl PerVmStorageResponse {
    pub fn into_storage(self) -> Vec<VmStorage> {
        self.vmware_vms.map_nodes(|storage| storage)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamsCountResponse {
    pub system: StreamsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamsSection {
    pub streams: StreamsCount,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamsCount {
    pub count: i64,
}

impl StreamsCountResponse {
    pub fn into_count(self) -> i64 {
        self.system.streams.count
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphDataLocationUsage {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub usage: DataLocationUsage,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataLocationUsageResponse {
    pub archive_locations: Connection<GraphDataLocationUsage>,
}

impl DataLocationUsageResponse {
    pub fn into_usage(self) -> Vec<DataLocationUsage> {
        self.archive_locations.map_nodes(|node| DataLocationUsage {
            location_id: node.id,
            ..node.usage
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeSeries {
    pub time_series: Vec<TimeSeriesPoint>,
}

impl TimeSeries {
    fn into_stats(self) -> Vec<TimeStat> {
        self.time_series
            .into_iter()
            .map(|point| TimeStat {
                time: point.date,
                stat: point.value,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PhysicalIngestResponse {
    pub system: PhysicalIngestSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicalIngestSection {
    pub physical_ingest: TimeSeries,
}

impl PhysicalIngestResponse {
    pub fn into_stats(self) -> Vec<TimeStat> {
        self.system.physical_ingest.into_stats()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArchivalBandwidthResponse {
    pub system: ArchivalBandwidthSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchivalBandwidthSection {
    pub archival_bandwidth: TimeSeries,
}

impl ArchivalBandwidthResponse {
    pub fn into_stats(self) -> Vec<TimeStat> {
        self.system.archival_bandwidth.into_stats()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunwayRemainingResponse {
    pub system: RunwayRemainingSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunwayRemainingSection {
    pub runway_remaining: i64,
}

impl RunwayRemainingResponse {
    pub fn into_days(self) -> i64 {
        self.system.runway_remaining
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AverageStorageGrowthResponse {
    pub system: AverageStorageGrowthSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AverageStorageGrowthSection {
    pub average_storage_growth_per_day: f64,
}

impl AverageStorageGrowthResponse {
    /// Bytes per day, truncated to match the REST endpoint's integer.
    pub fn into_bytes(self) -> i64 {
        self.system.average_storage_growth_per_day as i64
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphReport {
    pub id: String,
    pub name: String,
    pub report_type: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportsResponse {
    pub reports: Connection<GraphReport>,
}

impl ReportsResponse {
    pub fn into_reports(self) -> Vec<Report> {
        self.reports.map_nodes(|report| Report {
            id: report.id,
            name: report.name,
            report_type: report.report_type,
            update_status: report.status,
            ..Default::default()
        })
    }
}
