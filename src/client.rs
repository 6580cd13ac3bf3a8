//! Rubrik resource client.
//!
//! One retrieval operation per resource category. Every operation tries the
//! GraphQL API first and falls back to the legacy REST API when GraphQL
//! fails; when both fail it returns an empty value instead of an error.
//! Failures are logged and recorded per category (see
//! [`RubrikClient::fetch_health`]) so they stay observable.

use crate::config::RubrikConfig;
use crate::error::Result;
use crate::graphql::{
    ArchivalBandwidthResponse, ArchiveLocationsResponse, AverageStorageGrowthResponse,
    ClusterInfoResponse, DataLocationUsageResponse, GraphqlClient, ManagedVolumesResponse,
    NodesResponse, PerVmStorageResponse, PhysicalIngestResponse, ReportsResponse,
    RunwayRemainingResponse, StreamsCountResponse, SystemStorageResponse, VmsResponse,
    ARCHIVAL_BANDWIDTH_QUERY, ARCHIVE_LOCATIONS_QUERY, AVERAGE_STORAGE_GROWTH_QUERY,
    CLUSTER_INFO_QUERY, DATA_LOCATION_USAGE_QUERY, HYPERV_VMS_QUERY, MANAGED_VOLUMES_QUERY,
    NODES_QUERY, NUTANIX_VMS_QUERY, PER_VM_STORAGE_QUERY, PHYSICAL_INGEST_QUERY,
    REPORTS_QUERY, RUNWAY_REMAINING_QUERY, STREAMS_COUNT_QUERY, SYSTEM_STORAGE_QUERY,
    VMWARE_VMS_QUERY,
};
use crate::models::{
    reduce_job_outcomes, ArchiveLocation, ClusterInfo, CountResponse, DataLocationUsage,
    Hypervisor, JobOutcomeCounts, ManagedVolume, Node, NodeStat, Report, ReportData,
    ResultList, RunwayResponse, StorageGrowthResponse, SystemStorage, TimeStat,
    VirtualMachine, VmStorage,
};
use crate::session::{Credentials, Session, SessionManager, SESSION_PATH};
use crate::transport::{build_http_client, RequestDescriptor, RestTransport};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Canned report the job outcome counts are read from.
pub const TASK_DETAILS_REPORT_TEMPLATE: &str = "ProtectionTasksDetails";
const TASK_DETAILS_CHART_ID: &str = "chart0";
const DEFAULT_ARCHIVAL_RANGE: &str = "-1h";

/// Which protocol served the last retrieval of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Graphql,
    Rest,
    /// Both protocols failed and an empty value was returned
    Failed,
}

impl FetchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchSource::Graphql => "graphql",
            FetchSource::Rest => "rest",
            FetchSource::Failed => "failed",
        }
    }

    /// 2 = GraphQL, 1 = REST, 0 = failed.
    pub fn as_gauge_value(&self) -> f64 {
        match self {
            FetchSource::Graphql => 2.0,
            FetchSource::Rest => 1.0,
            FetchSource::Failed => 0.0,
        }
    }

    /// The less healthy of two outcomes.
    pub fn worst(self, other: FetchSource) -> FetchSource {
        if other.as_gauge_value() < self.as_gauge_value() {
            other
        } else {
            self
        }
    }
}

/// Rubrik API client with GraphQL-first, REST-fallback retrieval.
#[derive(Clone)]
pub struct RubrikClient {
    rest: RestTransport,
    graphql: Option<GraphqlClient>,
    session: Arc<Session>,
    time_series_range: String,
    archival_bandwidth_range: String,
    health: Arc<RwLock<BTreeMap<&'static str, FetchSource>>>,
}

impl RubrikClient {
    /// Authenticate with the configured credentials and build a client.
    ///
    /// Authentication failure is returned as an error; the caller must not
    /// continue without a session.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rubrik_exporter::client::RubrikClient;
    /// use rubrik_exporter::config::Settings;
    ///
    /// # async fn run() -> rubrik_exporter::Result<()> {
    /// let settings = Settings::load(Some("config/default.toml"))?;
    /// let client = RubrikClient::connect(&settings.rubrik).await?;
    /// let nodes = client.get_nodes().await;
    /// println!("{} nodes", nodes.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: &RubrikConfig) -> Result<Self> {
        let credentials = Credentials::from_config(config)?;
        let session = SessionManager::new(config)?
            .authenticate(&credentials)
            .await?;
        info!(
            "Rubrik session established (session={}, user={})",
            session.session_id().unwrap_or("-"),
            session.user_id().unwrap_or("-")
        );
        Self::new(config, session)
    }

    /// Build a client around an existing session.
    pub fn new(config: &RubrikConfig, session: Session) -> Result<Self> {
        let http = build_http_client(config)?;
        let session = Arc::new(session);

        let rest = RestTransport::new(http.clone(), &config.endpoint, session.clone());
        let graphql = config
            .graphql_enabled
            .then(|| GraphqlClient::new(http, config, session.clone()));

        match &graphql {
            Some(client) => info!("GraphQL endpoint: {}", client.endpoint()),
            None => info!("GraphQL disabled, using REST only"),
        }

        Ok(Self {
            rest,
            graphql,
            session,
            time_series_range: config.time_series_range.clone(),
            archival_bandwidth_range: config.archival_bandwidth_range.clone(),
            health: Arc::new(RwLock::new(BTreeMap::new())),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Range used for physical ingest and node stats.
    pub fn time_series_range(&self) -> &str {
        &self.time_series_range
    }

    /// Range used for archival bandwidth.
    pub fn archival_bandwidth_range(&self) -> &str {
        &self.archival_bandwidth_range
    }

    /// Outcome of each category fetched since the last
    /// [`reset_fetch_health`](Self::reset_fetch_health). Categories fetched
    /// once per item (node stats, archival bandwidth) report their worst
    /// outcome.
    pub fn fetch_health(&self) -> BTreeMap<&'static str, FetchSource> {
        match self.health.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Forget recorded outcomes; called at the start of every scrape.
    pub fn reset_fetch_health(&self) {
        let mut guard = match self.health.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clear();
    }

    fn record(&self, category: &'static str, source: FetchSource) {
        let mut guard = match self.health.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .entry(category)
            .and_modify(|recorded| *recorded = recorded.worst(source))
            .or_insert(source);
    }

    /// Invalidate the session. Best effort: failures are only logged.
    pub async fn logout(&self) {
        match self.rest.execute(&RequestDescriptor::delete(SESSION_PATH)).await {
            Ok(_) => info!("Rubrik session closed"),
            Err(e) => warn!("Failed to close Rubrik session: {}", e),
        }
    }

    /// Try GraphQL, then REST, then give up with `T::default()`.
    ///
    /// The REST request is only issued after the GraphQL attempt has failed,
    /// and at most once.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_with_fallback<G, R, T>(
        &self,
        category: &'static str,
        query: &'static str,
        variables: Option<Value>,
        from_graph: impl FnOnce(G) -> T,
        request: RequestDescriptor,
        from_rest: impl FnOnce(R) -> T,
    ) -> T
    where
        G: DeserializeOwned + Default,
        R: DeserializeOwned,
        T: Default,
    {
        if let Some(graphql) = &self.graphql {
            match graphql.query::<G>(query, variables).await {
                Ok(response) => {
                    debug!("{}: served by GraphQL", category);
                    self.record(category, FetchSource::Graphql);
                    return from_graph(response);
                }
                Err(e) => {
                    warn!(
                        "{}: GraphQL failed, falling back to REST {}: {}",
                        category, request.path, e
                    );
                }
            }
        }

        self.fetch_rest(category, request, from_rest).await
    }

    /// REST-only retrieval with the same degrade-to-default contract.
    async fn fetch_rest<R, T>(
        &self,
        category: &'static str,
        request: RequestDescriptor,
        from_rest: impl FnOnce(R) -> T,
    ) -> T
    where
        R: DeserializeOwned,
        T: Default,
    {
        match self.rest.get_json::<R>(&request).await {
            Ok(response) => {
                debug!("{}: served by REST {}", category, request.path);
                self.record(category, FetchSource::Rest);
                from_rest(response)
            }
            Err(e) => {
                error!(
                    "{}: REST {} failed, reporting no data: {}",
                    category, request.path, e
                );
                self.record(category, FetchSource::Failed);
                T::default()
            }
        }
    }

    /// Cluster identity and software version.
    pub async fn get_cluster_info(&self) -> ClusterInfo {
        self.fetch_with_fallback(
            "cluster",
            CLUSTER_INFO_QUERY,
            None,
            ClusterInfoResponse::into_cluster_info,
            RequestDescriptor::get("/api/v1/cluster/me"),
            |info: ClusterInfo| info,
        )
        .await
    }

    /// All cluster nodes.
    pub async fn get_nodes(&self) -> Vec<Node> {
        self.fetch_with_fallback(
            "nodes",
            NODES_QUERY,
            None,
            NodesResponse::into_nodes,
            RequestDescriptor::get("/api/internal/node"),
            ResultList::<Node>::into_data,
        )
        .await
    }

    /// Network, IOPS, throughput and CPU series of one node (REST only).
    pub async fn get_node_stats(&self, node_id: &str, range: &str) -> NodeStat {
        self.fetch_rest(
            "node_stats",
            RequestDescriptor::get(format!("/api/internal/node/{}/stats", node_id))
                .param("range", range),
            |stat: NodeStat| stat,
        )
        .await
    }

    /// VMs of one hypervisor family, tagged with that family.
    pub async fn list_vms(&self, hypervisor: Hypervisor) -> Vec<VirtualMachine> {
        let (category, query, path) = match hypervisor {
            Hypervisor::Vmware => ("vmware_vms", VMWARE_VMS_QUERY, "/api/v1/vmware/vm"),
            Hypervisor::Nutanix => ("nutanix_vms", NUTANIX_VMS_QUERY, "/api/internal/nutanix/vm"),
            Hypervisor::Hyperv => ("hyperv_vms", HYPERV_VMS_QUERY, "/api/internal/hyperv/vm"),
        };

        self.fetch_with_fallback(
            category,
            query,
            None,
            |response: VmsResponse| response.into_vms(hypervisor),
            RequestDescriptor::get(path),
            |list: ResultList<VirtualMachine>| {
                list.into_data()
                    .into_iter()
                    .map(|vm| VirtualMachine { hypervisor, ..vm })
                    .collect()
            },
        )
        .await
    }

    pub async fn list_vmware_vms(&self) -> Vec<VirtualMachine> {
        self.list_vms(Hypervisor::Vmware).await
    }

    pub async fn list_nutanix_vms(&self) -> Vec<VirtualMachine> {
        self.list_vms(Hypervisor::Nutanix).await
    }

    pub async fn list_hyperv_vms(&self) -> Vec<VirtualMachine> {
        self.list_vms(Hypervisor::Hyperv).await
    }

    /// VMware, Nutanix and Hyper-V VMs, in that order. A failing family
    /// simply contributes nothing.
    pub async fn list_all_vms(&self) -> Vec<VirtualMachine> {
        let mut vms = Vec::new();
        for hypervisor in Hypervisor::ALL {
            vms.extend(self.list_vms(hypervisor).await);
        }
        vms
    }

    pub async fn get_managed_volumes(&self) -> Vec<ManagedVolume> {
        self.fetch_with_fallback(
            "managed_volumes",
            MANAGED_VOLUMES_QUERY,
            None,
            ManagedVolumesResponse::into_volumes,
            RequestDescriptor::get("/api/internal/managed_volume"),
            ResultList::<ManagedVolume>::into_data,
        )
        .await
    }

    pub async fn get_archive_locations(&self) -> Vec<ArchiveLocation> {
        self.fetch_with_fallback(
            "archive_locations",
            ARCHIVE_LOCATIONS_QUERY,
            None,
            ArchiveLocationsResponse::into_locations,
            RequestDescriptor::get("/api/internal/archive/location"),
            ResultList::<ArchiveLocation>::into_data,
        )
        .await
    }

    pub async fn get_system_storage(&self) -> SystemStorage {
        self.fetch_with_fallback(
            "system_storage",
            SYSTEM_STORAGE_QUERY,
            None,
            SystemStorageResponse::into_storage,
            RequestDescriptor::get("/api/internal/stats/system_storage"),
            |storage: SystemStorage| storage,
        )
        .await
    }

    pub async fn get_per_vm_storage(&self) -> Vec<VmStorage> {
        self.fetch_with_fallback(
            "per_vm_storage",
            PER_VM_STORAGE_QUERY,
            None,
            PerVmStorageResponse::into_storage,
            RequestDescriptor::get("/api/internal/stats/per_vm_storage"),
            ResultList::<VmStorage>::into_data,
        )
        .await
    }

    /// Number of active backup/archival streams.
    pub async fn get_stream_count(&self) -> i64 {
        self.fetch_with_fallback(
            "stream_count",
            STREAMS_COUNT_QUERY,
            None,
            StreamsCountResponse::into_count,
            RequestDescriptor::get("/api/internal/stats/streams/count"),
            |response: CountResponse| response.count,
        )
        .await
    }

    pub async fn get_data_location_usage(&self) -> Vec<DataLocationUsage> {
        self.fetch_with_fallback(
            "data_location_usage",
            DATA_LOCATION_USAGE_QUERY,
            None,
            DataLocationUsageResponse::into_usage,
            RequestDescriptor::get("/api/internal/stats/data_location/usage"),
            ResultList::<DataLocationUsage>::into_data,
        )
        .await
    }

    /// Physical ingest rate over a relative range such as `-10min`.
    pub async fn get_physical_ingest(&self, range: &str) -> Vec<TimeStat> {
        self.fetch_with_fallback(
            "physical_ingest",
            PHYSICAL_INGEST_QUERY,
            Some(json!({ "range": range })),
            PhysicalIngestResponse::into_stats,
            RequestDescriptor::get("/api/internal/stats/physical_ingest/time_series")
                .param("range", range),
            |stats: Vec<TimeStat>| stats,
        )
        .await
    }

    /// Archival bandwidth towards one location. An empty range means `-1h`.
    pub async fn get_archival_bandwidth(&self, location_id: &str, range: &str) -> Vec<TimeStat> {
        let range = if range.is_empty() {
            DEFAULT_ARCHIVAL_RANGE
        } else {
            range
        };

        self.fetch_with_fallback(
            "archival_bandwidth",
            ARCHIVAL_BANDWIDTH_QUERY,
            Some(json!({ "range": range })),
            ArchivalBandwidthResponse::into_stats,
            RequestDescriptor::get("/api/internal/stats/archival/bandwidth/time_series")
                .param("data_location_id", location_id)
                .param("range", range),
            |stats: Vec<TimeStat>| stats,
        )
        .await
    }

    /// Days until the cluster is full.
    pub async fn get_runway_remaining(&self) -> i64 {
        self.fetch_with_fallback(
            "runway_remaining",
            RUNWAY_REMAINING_QUERY,
            None,
            RunwayRemainingResponse::into_days,
            RequestDescriptor::get("/api/internal/stats/runway_remaining"),
            |response: RunwayResponse| response.days,
        )
        .await
    }

    /// Average storage growth in bytes per day.
    pub async fn get_average_storage_growth_per_day(&self) -> i64 {
        self.fetch_with_fallback(
            "average_storage_growth",
            AVERAGE_STORAGE_GROWTH_QUERY,
            None,
            AverageStorageGrowthResponse::into_bytes,
            RequestDescriptor::get("/api/internal/stats/average_storage_growth_per_day"),
            |response: StorageGrowthResponse| response.bytes,
        )
        .await
    }

    /// Report inventory. The filter is only applied by the REST API; the
    /// GraphQL query returns every report.
    pub async fn get_reports(&self, filter: &[(&str, &str)]) -> Vec<Report> {
        let request = filter
            .iter()
            .fold(RequestDescriptor::get("/api/internal/report"), |req, (k, v)| {
                req.param(*k, *v)
            });

        self.fetch_with_fallback(
            "reports",
            REPORTS_QUERY,
            None,
            ReportsResponse::into_reports,
            request,
            ResultList::<Report>::into_data,
        )
        .await
    }

    /// Chart data of one report (REST only).
    pub async fn get_report_chart(&self, report_id: &str, chart_id: &str) -> Vec<ReportData> {
        self.fetch_rest(
            "report_chart",
            RequestDescriptor::get(format!("/api/internal/report/{}/chart", report_id))
                .param("chart_id", chart_id),
            |charts: Vec<ReportData>| charts,
        )
        .await
    }

    /// Task outcome counts (e.g. `succeeded`, `failed`, `canceled`) from the
    /// protection tasks details report.
    ///
    /// No matching report or no chart data yields an empty map.
    pub async fn get_job_outcome_counts(&self) -> JobOutcomeCounts {
        let reports = self
            .get_reports(&[
                ("type", "Canned"),
                ("report_template", TASK_DETAILS_REPORT_TEMPLATE),
            ])
            .await;

        let Some(report) = select_report(&reports, TASK_DETAILS_REPORT_TEMPLATE) else {
            debug!("No {} report found", TASK_DETAILS_REPORT_TEMPLATE);
            return JobOutcomeCounts::new();
        };

        let charts = self
            .get_report_chart(&report.id, TASK_DETAILS_CHART_ID)
            .await;
        reduce_job_outcomes(&charts)
    }
}

/// Pick the report generated from `template`.
///
/// REST results are already filtered, but GraphQL returns every report
/// without its template, so fall back to matching the display name with
/// spaces removed ("Protection Tasks Details"), then to the first report.
pub fn select_report<'a>(reports: &'a [Report], template: &str) -> Option<&'a Report> {
    reports
        .iter()
        .find(|r| r.report_template == template)
        .or_else(|| {
            reports.iter().find(|r| {
                let compact: String = r.name.chars().filter(|c| !c.is_whitespace()).collect();
                compact.eq_ignore_ascii_case(template)
            })
        })
        .or_else(|| reports.first())
}
