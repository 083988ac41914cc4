//! `ClusterDirectory`: a watch-driven cache over the coordinator tree,
//! bulk-loaded on connect and kept current by re-arming watches as they
//! fire. Mirrors the state/callback shape of
//! `flashq-cluster`'s in-memory cluster service, generalized from a single
//! flat broker map to the cluster/server/namespace/table hierarchy.

use crate::coordinator::{CoordinatorClient, WatchEvent, Watcher};
use crate::error::DirectoryError;
use crate::model::{ClusterConfig, NamespaceConfig, ServerConfig, ServerStatus, TableDefinition};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Loading,
    Connected,
    ConnectionLost,
    Closed,
}

pub type ServerId = String;

#[derive(Clone)]
struct ServerRecord {
    config: ServerConfig,
    live_addr: Option<String>,
}

struct NamespaceRecord {
    config: NamespaceConfig,
    tables: HashMap<String, TableDefinition>,
}

pub type CallbackFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    cluster: Vec<(u64, CallbackFn)>,
    server: Vec<(u64, CallbackFn)>,
    namespace: Vec<(u64, CallbackFn)>,
    table: Vec<(u64, CallbackFn)>,
    next_id: u64,
}

impl Callbacks {
    fn register(&mut self, pick: impl Fn(&mut Self) -> &mut Vec<(u64, CallbackFn)>, f: CallbackFn) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        pick(self).push((id, f));
        id
    }

    fn deregister(list: &mut Vec<(u64, CallbackFn)>, id: u64) {
        list.retain(|(existing, _)| *existing != id);
    }
}

struct Inner {
    session: SessionState,
    cluster_config: Option<ClusterConfig>,
    servers: HashMap<ServerId, ServerRecord>,
    namespaces: HashMap<String, NamespaceRecord>,
    leader: Option<ServerId>,
    callbacks: Callbacks,
}

/// `prefix` is the coordinator path under which this cluster's entire tree
/// lives, e.g. `/eventql/<cluster_name>`.
pub struct ClusterDirectory {
    coordinator: Arc<dyn CoordinatorClient>,
    prefix: String,
    server_identity: Option<(ServerId, String)>,
    inner: Mutex<Inner>,
    state_changed: Condvar,
}

/// One entry per coordinator path `ClusterDirectory` watches. Each variant's
/// resync re-reads the node, re-arms its own watch with a fresh closure over
/// this same variant, and (for list nodes) arms watches on whatever children
/// it finds — so a single fire keeps the whole subtree live without ever
/// requiring a second bulk `connect`.
#[derive(Clone)]
enum WatchTarget {
    Config,
    ServersList,
    ServerNode(String),
    ServersLiveList,
    ServerLiveNode(String),
    NamespacesList,
    /// A namespace directory exists but its `ready` sentinel doesn't yet;
    /// watches that directory's own child list for the sentinel's arrival.
    NamespaceReady(String),
    NamespaceConfig(String),
    NamespaceTablesList(String),
    TableNode(String, String),
}

impl ClusterDirectory {
    pub fn new(coordinator: Arc<dyn CoordinatorClient>, prefix: impl Into<String>) -> Self {
        Self {
            coordinator,
            prefix: prefix.into(),
            server_identity: None,
            inner: Mutex::new(Inner {
                session: SessionState::Init,
                cluster_config: None,
                servers: HashMap::new(),
                namespaces: HashMap::new(),
                leader: None,
                callbacks: Callbacks::default(),
            }),
            state_changed: Condvar::new(),
        }
    }

    pub fn with_server_identity(mut self, server_id: impl Into<String>, listen_addr: impl Into<String>) -> Self {
        self.server_identity = Some((server_id.into(), listen_addr.into()));
        self
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.lock().session
    }

    fn path(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    fn require_writable(inner: &Inner) -> Result<(), DirectoryError> {
        match inner.session {
            SessionState::Connected | SessionState::Loading => Ok(()),
            SessionState::ConnectionLost => Err(DirectoryError::IllegalState {
                context: "directory has lost its session; writes are disabled until reconnect".to_string(),
            }),
            other => Err(DirectoryError::IllegalState {
                context: format!("directory is not connected (state = {other:?})"),
            }),
        }
    }

    /// Ensures the global prefix node exists, independent of cluster
    /// creation. Safe to call repeatedly.
    fn ensure_prefix(&self) -> Result<(), DirectoryError> {
        if !self.coordinator.exists(&self.prefix)? {
            match self.coordinator.create(&self.prefix, Vec::new(), false) {
                Ok(()) | Err(DirectoryError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Bootstraps a brand-new cluster: creates the prefix and an initial
    /// `/config` node. Used by `--create_cluster`.
    pub fn create_cluster(&self, config: ClusterConfig) -> Result<(), DirectoryError> {
        self.ensure_prefix()?;
        let encoded = serde_json::to_vec(&config)
            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
        self.coordinator.create(&self.path("/config"), encoded, false)?;
        for dir in ["/namespaces", "/servers", "/servers-live"] {
            match self.coordinator.create(&self.path(dir), Vec::new(), false) {
                Ok(()) | Err(DirectoryError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Connects and performs the initial bulk load described for the
    /// `LOADING` state: cluster config, namespaces, tables, servers, live
    /// servers, followed by ephemeral registration of this server's
    /// presence (if it has an identity), then arms the watch tree so later
    /// changes incrementally resync instead of requiring another `connect`.
    pub fn connect(self: &Arc<Self>) -> Result<(), DirectoryError> {
        {
            let mut inner = self.inner.lock();
            inner.session = SessionState::Connecting;
        }
        self.ensure_prefix()?;
        {
            let mut inner = self.inner.lock();
            inner.session = SessionState::Loading;
        }
        self.reload()?;
        if let Some((server_id, listen_addr)) = self.server_identity.clone() {
            let live_path = self.path(&format!("/servers-live/{server_id}"));
            match self.coordinator.create(&live_path, listen_addr.clone().into_bytes(), true) {
                Ok(()) | Err(DirectoryError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e),
            }
            // `reload` ran before this server's own live node existed, so it
            // can't have picked it up; merge it in directly rather than
            // paying for a second bulk read.
            let mut inner = self.inner.lock();
            inner
                .servers
                .entry(server_id.clone())
                .or_insert_with(|| ServerRecord {
                    config: ServerConfig { server_id: server_id.clone(), server_addr: listen_addr.clone(), status: None },
                    live_addr: None,
                })
                .live_addr = Some(listen_addr);
        }
        self.install_watches()?;
        {
            let mut inner = self.inner.lock();
            inner.session = SessionState::Connected;
        }
        self.state_changed.notify_all();
        Ok(())
    }

    /// Re-reads the full tree. Called on initial connect and whenever a
    /// session expiry forces us back through `LOADING`.
    fn reload(&self) -> Result<(), DirectoryError> {
        let cluster_config = self.read_cluster_config_raw()?;

        let mut servers = HashMap::new();
        if self.coordinator.exists(&self.path("/servers"))? {
            for id in self.coordinator.list_children(&self.path("/servers"), None)? {
                let (bytes, _) = self.coordinator.get(&self.path(&format!("/servers/{id}")), None)?;
                let config: ServerConfig = serde_json::from_slice(&bytes)
                    .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
                servers.insert(id, ServerRecord { config, live_addr: None });
            }
        }
        if self.coordinator.exists(&self.path("/servers-live"))? {
            for id in self.coordinator.list_children(&self.path("/servers-live"), None)? {
                let (bytes, _) = self.coordinator.get(&self.path(&format!("/servers-live/{id}")), None)?;
                let addr = String::from_utf8_lossy(&bytes).to_string();
                servers
                    .entry(id.clone())
                    .or_insert_with(|| ServerRecord {
                        config: ServerConfig { server_id: id.clone(), server_addr: addr.clone(), status: None },
                        live_addr: None,
                    })
                    .live_addr = Some(addr);
            }
        }

        let mut namespaces = HashMap::new();
        if self.coordinator.exists(&self.path("/namespaces"))? {
            for ns in self.coordinator.list_children(&self.path("/namespaces"), None)? {
                if !self.coordinator.exists(&self.path(&format!("/namespaces/{ns}/ready")))? {
                    // incomplete bootstrap; not yet visible
                    continue;
                }
                let (bytes, _) = self.coordinator.get(&self.path(&format!("/namespaces/{ns}/config")), None)?;
                let config: NamespaceConfig = serde_json::from_slice(&bytes)
                    .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
                let mut tables = HashMap::new();
                let tables_path = self.path(&format!("/namespaces/{ns}/tables"));
                if self.coordinator.exists(&tables_path)? {
                    for table in self.coordinator.list_children(&tables_path, None)? {
                        let (bytes, _) = self.coordinator.get(&format!("{tables_path}/{table}"), None)?;
                        let def: TableDefinition = serde_json::from_slice(&bytes)
                            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
                        tables.insert(table, def);
                    }
                }
                namespaces.insert(ns, NamespaceRecord { config, tables });
            }
        }

        let mut inner = self.inner.lock();
        inner.cluster_config = cluster_config;
        inner.servers = servers;
        inner.namespaces = namespaces;
        Ok(())
    }

    fn read_cluster_config_raw(&self) -> Result<Option<ClusterConfig>, DirectoryError> {
        if !self.coordinator.exists(&self.path("/config"))? {
            return Ok(None);
        }
        let (bytes, _) = self.coordinator.get(&self.path("/config"), None)?;
        let config = serde_json::from_slice(&bytes)
            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
        Ok(Some(config))
    }

    fn watcher_for(self: &Arc<Self>, target: WatchTarget) -> Watcher {
        let this = Arc::clone(self);
        Arc::new(move |_evt: WatchEvent| this.on_watch_fired(target.clone()))
    }

    fn on_watch_fired(self: &Arc<Self>, target: WatchTarget) {
        match target {
            WatchTarget::Config => self.resync_config(),
            WatchTarget::ServersList => self.resync_servers_list(),
            WatchTarget::ServerNode(id) => self.resync_server_node(&id),
            WatchTarget::ServersLiveList => self.resync_servers_live_list(),
            WatchTarget::ServerLiveNode(id) => self.resync_server_live_node(&id),
            WatchTarget::NamespacesList => self.resync_namespaces_list(),
            WatchTarget::NamespaceReady(ns) => self.resync_namespace_ready(&ns),
            WatchTarget::NamespaceConfig(ns) => self.resync_namespace_config(&ns),
            WatchTarget::NamespaceTablesList(ns) => self.resync_namespace_tables_list(&ns),
            WatchTarget::TableNode(ns, table) => self.resync_table_node(&ns, &table),
        }
    }

    /// Arms every watch this directory cares about: `/config`, the
    /// `/servers` and `/servers-live` lists and each of their children, and
    /// `/namespaces` plus each ready namespace's config and table list.
    /// Called once from `connect`, after the unwatched bulk `reload`.
    fn install_watches(self: &Arc<Self>) -> Result<(), DirectoryError> {
        let _ = self.coordinator.get(&self.path("/config"), Some(self.watcher_for(WatchTarget::Config)));

        if self.coordinator.exists(&self.path("/servers"))? {
            let ids = self.coordinator.list_children(&self.path("/servers"), Some(self.watcher_for(WatchTarget::ServersList)))?;
            for id in ids {
                let path = self.path(&format!("/servers/{id}"));
                let _ = self.coordinator.get(&path, Some(self.watcher_for(WatchTarget::ServerNode(id))));
            }
        }
        if self.coordinator.exists(&self.path("/servers-live"))? {
            let ids =
                self.coordinator.list_children(&self.path("/servers-live"), Some(self.watcher_for(WatchTarget::ServersLiveList)))?;
            for id in ids {
                let path = self.path(&format!("/servers-live/{id}"));
                let _ = self.coordinator.get(&path, Some(self.watcher_for(WatchTarget::ServerLiveNode(id))));
            }
        }
        if self.coordinator.exists(&self.path("/namespaces"))? {
            let ns_ids =
                self.coordinator.list_children(&self.path("/namespaces"), Some(self.watcher_for(WatchTarget::NamespacesList)))?;
            for ns in ns_ids {
                if !self.coordinator.exists(&self.path(&format!("/namespaces/{ns}/ready")))? {
                    let ns_dir = self.path(&format!("/namespaces/{ns}"));
                    let _ = self.coordinator.list_children(&ns_dir, Some(self.watcher_for(WatchTarget::NamespaceReady(ns))));
                    continue;
                }
                let config_path = self.path(&format!("/namespaces/{ns}/config"));
                let _ = self.coordinator.get(&config_path, Some(self.watcher_for(WatchTarget::NamespaceConfig(ns.clone()))));
                let tables_path = self.path(&format!("/namespaces/{ns}/tables"));
                if self.coordinator.exists(&tables_path)? {
                    let tables = self
                        .coordinator
                        .list_children(&tables_path, Some(self.watcher_for(WatchTarget::NamespaceTablesList(ns.clone()))))?;
                    for table in tables {
                        let _ = self.coordinator.get(
                            &format!("{tables_path}/{table}"),
                            Some(self.watcher_for(WatchTarget::TableNode(ns.clone(), table))),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn notify_cluster(&self) {
        let callbacks = self.inner.lock().callbacks.cluster.iter().map(|(_, f)| Arc::clone(f)).collect::<Vec<_>>();
        for cb in callbacks {
            cb();
        }
    }

    fn notify_server(&self) {
        let callbacks = self.inner.lock().callbacks.server.iter().map(|(_, f)| Arc::clone(f)).collect::<Vec<_>>();
        for cb in callbacks {
            cb();
        }
    }

    fn notify_namespace(&self) {
        let callbacks = self.inner.lock().callbacks.namespace.iter().map(|(_, f)| Arc::clone(f)).collect::<Vec<_>>();
        for cb in callbacks {
            cb();
        }
    }

    fn notify_table(&self) {
        let callbacks = self.inner.lock().callbacks.table.iter().map(|(_, f)| Arc::clone(f)).collect::<Vec<_>>();
        for cb in callbacks {
            cb();
        }
    }

    fn resync_config(self: &Arc<Self>) {
        let Ok((bytes, _)) = self.coordinator.get(&self.path("/config"), Some(self.watcher_for(WatchTarget::Config))) else {
            return;
        };
        let Ok(config) = serde_json::from_slice::<ClusterConfig>(&bytes) else { return };
        self.inner.lock().cluster_config = Some(config);
        self.notify_cluster();
    }

    fn resync_servers_list(self: &Arc<Self>) {
        let Ok(ids) = self.coordinator.list_children(&self.path("/servers"), Some(self.watcher_for(WatchTarget::ServersList)))
        else {
            return;
        };
        for id in ids {
            self.resync_server_node(&id);
        }
    }

    fn resync_server_node(self: &Arc<Self>, id: &str) {
        let path = self.path(&format!("/servers/{id}"));
        let Ok((bytes, _)) = self.coordinator.get(&path, Some(self.watcher_for(WatchTarget::ServerNode(id.to_string())))) else {
            return;
        };
        let Ok(config) = serde_json::from_slice::<ServerConfig>(&bytes) else { return };
        {
            let mut inner = self.inner.lock();
            inner
                .servers
                .entry(id.to_string())
                .or_insert_with(|| ServerRecord { config: config.clone(), live_addr: None })
                .config = config;
        }
        self.notify_server();
    }

    fn resync_servers_live_list(self: &Arc<Self>) {
        let Ok(ids) = self
            .coordinator
            .list_children(&self.path("/servers-live"), Some(self.watcher_for(WatchTarget::ServersLiveList)))
        else {
            return;
        };
        let live_ids: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
        for id in &ids {
            self.resync_server_live_node(id);
        }
        {
            let mut inner = self.inner.lock();
            for (id, record) in inner.servers.iter_mut() {
                if !live_ids.contains(id.as_str()) {
                    record.live_addr = None;
                }
            }
        }
        self.notify_server();
    }

    fn resync_server_live_node(self: &Arc<Self>, id: &str) {
        let path = self.path(&format!("/servers-live/{id}"));
        let watch = self.watcher_for(WatchTarget::ServerLiveNode(id.to_string()));
        let result = self.coordinator.get(&path, Some(watch));
        {
            let mut inner = self.inner.lock();
            match result {
                Ok((bytes, _)) => {
                    let addr = String::from_utf8_lossy(&bytes).to_string();
                    inner
                        .servers
                        .entry(id.to_string())
                        .or_insert_with(|| ServerRecord {
                            config: ServerConfig { server_id: id.to_string(), server_addr: addr.clone(), status: None },
                            live_addr: None,
                        })
                        .live_addr = Some(addr);
                }
                Err(_) => {
                    if let Some(record) = inner.servers.get_mut(id) {
                        record.live_addr = None;
                    }
                }
            }
        }
        self.notify_server();
    }

    fn resync_namespaces_list(self: &Arc<Self>) {
        let Ok(ns_ids) = self
            .coordinator
            .list_children(&self.path("/namespaces"), Some(self.watcher_for(WatchTarget::NamespacesList)))
        else {
            return;
        };
        for ns in ns_ids {
            match self.coordinator.exists(&self.path(&format!("/namespaces/{ns}/ready"))) {
                Ok(true) => {
                    self.resync_namespace_config(&ns);
                    self.resync_namespace_tables_list(&ns);
                }
                Ok(false) => {
                    let ns_dir = self.path(&format!("/namespaces/{ns}"));
                    let _ = self.coordinator.list_children(&ns_dir, Some(self.watcher_for(WatchTarget::NamespaceReady(ns))));
                }
                Err(_) => continue,
            }
        }
    }

    /// Fired once the pending namespace's directory gains a new child. Checks
    /// whether that child was the `ready` sentinel; if not, re-arms on the
    /// same directory and waits for the next one.
    fn resync_namespace_ready(self: &Arc<Self>, ns: &str) {
        match self.coordinator.exists(&self.path(&format!("/namespaces/{ns}/ready"))) {
            Ok(true) => {
                self.resync_namespace_config(ns);
                self.resync_namespace_tables_list(ns);
            }
            Ok(false) => {
                let ns_dir = self.path(&format!("/namespaces/{ns}"));
                let _ =
                    self.coordinator.list_children(&ns_dir, Some(self.watcher_for(WatchTarget::NamespaceReady(ns.to_string()))));
            }
            Err(_) => {}
        }
    }

    fn resync_namespace_config(self: &Arc<Self>, ns: &str) {
        let path = self.path(&format!("/namespaces/{ns}/config"));
        let Ok((bytes, _)) = self.coordinator.get(&path, Some(self.watcher_for(WatchTarget::NamespaceConfig(ns.to_string()))))
        else {
            return;
        };
        let Ok(config) = serde_json::from_slice::<NamespaceConfig>(&bytes) else { return };
        {
            let mut inner = self.inner.lock();
            inner
                .namespaces
                .entry(ns.to_string())
                .or_insert_with(|| NamespaceRecord { config: config.clone(), tables: HashMap::new() })
                .config = config;
        }
        self.notify_namespace();
    }

    fn resync_namespace_tables_list(self: &Arc<Self>, ns: &str) {
        let path = self.path(&format!("/namespaces/{ns}/tables"));
        let Ok(tables) =
            self.coordinator.list_children(&path, Some(self.watcher_for(WatchTarget::NamespaceTablesList(ns.to_string()))))
        else {
            return;
        };
        for table in tables {
            self.resync_table_node(ns, &table);
        }
    }

    fn resync_table_node(self: &Arc<Self>, ns: &str, table: &str) {
        let path = self.path(&format!("/namespaces/{ns}/tables/{table}"));
        let Ok((bytes, _)) = self
            .coordinator
            .get(&path, Some(self.watcher_for(WatchTarget::TableNode(ns.to_string(), table.to_string()))))
        else {
            return;
        };
        let Ok(def) = serde_json::from_slice::<TableDefinition>(&bytes) else { return };
        {
            let mut inner = self.inner.lock();
            if let Some(record) = inner.namespaces.get_mut(ns) {
                record.tables.insert(table.to_string(), def);
            }
        }
        self.notify_table();
    }

    pub fn get_cluster_config(self: &Arc<Self>) -> Result<ClusterConfig, DirectoryError> {
        if let Some(cfg) = self.inner.lock().cluster_config.clone() {
            return Ok(cfg);
        }
        let (bytes, _) = self.coordinator.get(&self.path("/config"), Some(self.watcher_for(WatchTarget::Config)))?;
        let config: ClusterConfig = serde_json::from_slice(&bytes)
            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
        self.inner.lock().cluster_config = Some(config.clone());
        Ok(config)
    }

    /// CAS write: `version` must match the coordinator's current version of
    /// `/config`, expressed in terms of prior reads of this directory.
    pub fn update_cluster_config(&self, config: ClusterConfig, expected_version: u64) -> Result<(), DirectoryError> {
        {
            let inner = self.inner.lock();
            Self::require_writable(&inner)?;
        }
        let encoded = serde_json::to_vec(&config)
            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
        self.coordinator.set(&self.path("/config"), encoded, Some(expected_version))?;
        self.inner.lock().cluster_config = Some(config);
        Ok(())
    }

    pub fn get_server_config(&self, id: &str) -> Result<ServerConfig, DirectoryError> {
        self.patched_server(id)
    }

    pub fn list_servers(&self) -> Result<Vec<ServerConfig>, DirectoryError> {
        let ids: Vec<String> = self.inner.lock().servers.keys().cloned().collect();
        ids.iter().map(|id| self.patched_server(id)).collect()
    }

    fn patched_server(&self, id: &str) -> Result<ServerConfig, DirectoryError> {
        let inner = self.inner.lock();
        let record = inner.servers.get(id).ok_or_else(|| DirectoryError::NotFound { context: id.to_string() })?;
        let mut config = record.config.clone();
        if let Some(addr) = &record.live_addr {
            config.server_addr = addr.clone();
            config.status = Some(ServerStatus::Up);
        } else {
            config.status = Some(ServerStatus::Down);
        }
        Ok(config)
    }

    pub fn update_server_config(&self, config: ServerConfig) -> Result<(), DirectoryError> {
        {
            let inner = self.inner.lock();
            Self::require_writable(&inner)?;
        }
        let encoded = serde_json::to_vec(&config)
            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
        let path = self.path(&format!("/servers/{}", config.server_id));
        match self.coordinator.create(&path, encoded.clone(), false) {
            Ok(()) => {}
            Err(DirectoryError::AlreadyExists { .. }) => {
                self.coordinator.set(&path, encoded, None)?;
            }
            Err(e) => return Err(e),
        }
        let mut inner = self.inner.lock();
        inner
            .servers
            .entry(config.server_id.clone())
            .or_insert_with(|| ServerRecord { config: config.clone(), live_addr: None })
            .config = config;
        Ok(())
    }

    /// Atomically bootstraps `<ns>`, `<ns>/config`, and `<ns>/tables`, then
    /// writes the `ready` sentinel last so partially-created namespaces
    /// never become visible to readers.
    pub fn update_namespace_config(&self, config: NamespaceConfig) -> Result<(), DirectoryError> {
        {
            let inner = self.inner.lock();
            Self::require_writable(&inner)?;
        }
        let ns = config.namespace.clone();
        let ns_path = self.path(&format!("/namespaces/{ns}"));
        match self.coordinator.create(&ns_path, Vec::new(), false) {
            Ok(()) | Err(DirectoryError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e),
        }
        let encoded = serde_json::to_vec(&config)
            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
        let config_path = format!("{ns_path}/config");
        match self.coordinator.create(&config_path, encoded.clone(), false) {
            Ok(()) => {}
            Err(DirectoryError::AlreadyExists { .. }) => {
                self.coordinator.set(&config_path, encoded, None)?;
            }
            Err(e) => return Err(e),
        }
        let tables_path = format!("{ns_path}/tables");
        match self.coordinator.create(&tables_path, Vec::new(), false) {
            Ok(()) | Err(DirectoryError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e),
        }
        match self.coordinator.create(&format!("{ns_path}/ready"), Vec::new(), false) {
            Ok(()) | Err(DirectoryError::AlreadyExists { .. }) => {}
            Err(e) => return Err(e),
        }

        let mut inner = self.inner.lock();
        inner
            .namespaces
            .entry(ns)
            .or_insert_with(|| NamespaceRecord { config: config.clone(), tables: HashMap::new() })
            .config = config;
        Ok(())
    }

    pub fn get_namespace_config(&self, ns: &str) -> Result<NamespaceConfig, DirectoryError> {
        let inner = self.inner.lock();
        inner
            .namespaces
            .get(ns)
            .map(|r| r.config.clone())
            .ok_or_else(|| DirectoryError::NotFound { context: ns.to_string() })
    }

    pub fn list_tables(&self, ns: &str) -> Result<Vec<String>, DirectoryError> {
        let inner = self.inner.lock();
        let record = inner.namespaces.get(ns).ok_or_else(|| DirectoryError::NotFound { context: ns.to_string() })?;
        let mut names: Vec<String> = record.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn get_table_config(&self, ns: &str, table: &str) -> Result<TableDefinition, DirectoryError> {
        let inner = self.inner.lock();
        let record = inner.namespaces.get(ns).ok_or_else(|| DirectoryError::NotFound { context: ns.to_string() })?;
        record
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { context: format!("{ns}.{table}") })
    }

    /// Stores `def` with its version bumped one past whatever is currently
    /// on record (0 for a brand-new table), regardless of the `version`
    /// the caller passed in.
    pub fn update_table_config(&self, ns: &str, mut def: TableDefinition) -> Result<(), DirectoryError> {
        {
            let inner = self.inner.lock();
            Self::require_writable(&inner)?;
        }
        let current_version = self
            .inner
            .lock()
            .namespaces
            .get(ns)
            .and_then(|r| r.tables.get(&def.table_name))
            .map(|t| t.version);
        def.version = current_version.unwrap_or(0) + 1;

        let tables_path = self.path(&format!("/namespaces/{ns}/tables"));
        let path = format!("{tables_path}/{}", def.table_name);
        let encoded = serde_json::to_vec(&def)
            .map_err(|e| DirectoryError::IllegalArgument { reason: e.to_string() })?;
        match self.coordinator.create(&path, encoded.clone(), false) {
            Ok(()) => {}
            Err(DirectoryError::AlreadyExists { .. }) => {
                self.coordinator.set(&path, encoded, None)?;
            }
            Err(e) => return Err(e),
        }
        let mut inner = self.inner.lock();
        let record = inner.namespaces.get_mut(ns).ok_or_else(|| DirectoryError::NotFound { context: ns.to_string() })?;
        record.tables.insert(def.table_name.clone(), def);
        Ok(())
    }

    pub fn set_cluster_change_callback(&self, f: CallbackFn) -> u64 {
        self.inner.lock().callbacks.register(|c| &mut c.cluster, f)
    }

    pub fn set_server_change_callback(&self, f: CallbackFn) -> u64 {
        self.inner.lock().callbacks.register(|c| &mut c.server, f)
    }

    pub fn set_namespace_change_callback(&self, f: CallbackFn) -> u64 {
        self.inner.lock().callbacks.register(|c| &mut c.namespace, f)
    }

    pub fn set_table_change_callback(&self, f: CallbackFn) -> u64 {
        self.inner.lock().callbacks.register(|c| &mut c.table, f)
    }

    pub fn remove_table_change_callback(&self, id: u64) {
        Callbacks::deregister(&mut self.inner.lock().callbacks.table, id);
    }

    /// Races to create the ephemeral `/leader` node. Exactly one caller
    /// across the cluster observes `Ok(true)`; everyone else observes the
    /// winner's id via `get_leader`.
    pub fn elect_leader(&self) -> Result<bool, DirectoryError> {
        let Some((server_id, _)) = &self.server_identity else {
            return Err(DirectoryError::IllegalState {
                context: "elect_leader requires a server identity".to_string(),
            });
        };
        match self.coordinator.create(&self.path("/leader"), server_id.clone().into_bytes(), true) {
            Ok(()) => {
                self.inner.lock().leader = Some(server_id.clone());
                Ok(true)
            }
            Err(DirectoryError::AlreadyExists { .. }) => {
                let (bytes, _) = self.coordinator.get(&self.path("/leader"), None)?;
                self.inner.lock().leader = Some(String::from_utf8_lossy(&bytes).to_string());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_leader(&self) -> Option<ServerId> {
        self.inner.lock().leader.clone()
    }

    /// Called when the coordinator reports `SessionExpired`: all ephemeral
    /// obligations are considered lost, and the directory re-enters
    /// `CONNECTING` before repeating the `LOADING` bulk-read.
    pub fn on_session_expired(self: &Arc<Self>) -> Result<(), DirectoryError> {
        {
            let mut inner = self.inner.lock();
            inner.session = SessionState::Connecting;
            inner.leader = None;
        }
        self.connect()
    }

    pub fn mark_connection_lost(&self) {
        let mut inner = self.inner.lock();
        inner.session = SessionState::ConnectionLost;
        self.state_changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::LocalCoordinator;

    fn fresh_directory() -> Arc<ClusterDirectory> {
        let coordinator = Arc::new(LocalCoordinator::new());
        let dir = Arc::new(ClusterDirectory::new(coordinator, "/eventql/c1".to_string()));
        dir.create_cluster(ClusterConfig::default()).unwrap();
        dir.connect().unwrap();
        dir
    }

    #[test]
    fn connect_bulk_loads_cluster_config() {
        let dir = fresh_directory();
        assert_eq!(dir.session_state(), SessionState::Connected);
        let cfg = dir.get_cluster_config().unwrap();
        assert_eq!(cfg.cluster_name, "eventql");
    }

    #[test]
    fn namespace_is_invisible_until_ready_sentinel_written() {
        let coordinator = Arc::new(LocalCoordinator::new());
        let dir = Arc::new(ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1"));
        dir.create_cluster(ClusterConfig::default()).unwrap();
        dir.connect().unwrap();
        dir.update_namespace_config(NamespaceConfig { namespace: "ns1".to_string(), owner: "me".to_string() })
            .unwrap();
        assert!(dir.get_namespace_config("ns1").is_ok());
    }

    #[test]
    fn writes_fail_while_connection_lost() {
        let dir = fresh_directory();
        dir.mark_connection_lost();
        let err = dir
            .update_server_config(ServerConfig { server_id: "s1".to_string(), server_addr: "10.0.0.1:1".to_string(), status: None })
            .unwrap_err();
        assert!(matches!(err, DirectoryError::IllegalState { .. }));
    }

    #[test]
    fn exactly_one_of_two_servers_wins_leader_election() {
        let coordinator = Arc::new(LocalCoordinator::new());
        let d1 = Arc::new(
            ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1")
                .with_server_identity("s1", "10.0.0.1:1"),
        );
        let d2 = Arc::new(
            ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1")
                .with_server_identity("s2", "10.0.0.2:1"),
        );
        d1.create_cluster(ClusterConfig::default()).unwrap();
        d1.connect().unwrap();
        d2.connect().unwrap();

        let w1 = d1.elect_leader().unwrap();
        let w2 = d2.elect_leader().unwrap();
        assert_ne!(w1, w2);
        assert_eq!(d1.get_leader(), d2.get_leader());
    }

    #[test]
    fn patched_server_list_overlays_live_address() {
        let dir = fresh_directory();
        dir.update_server_config(ServerConfig { server_id: "s1".to_string(), server_addr: "stale:1".to_string(), status: None })
            .unwrap();
        let before = dir.get_server_config("s1").unwrap();
        assert_eq!(before.status, Some(ServerStatus::Down));
        assert_eq!(before.server_addr, "stale:1");
    }

    #[test]
    fn own_live_node_is_visible_immediately_after_connect() {
        let coordinator = Arc::new(LocalCoordinator::new());
        let dir = Arc::new(
            ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1")
                .with_server_identity("s1", "10.0.0.1:1"),
        );
        dir.create_cluster(ClusterConfig::default()).unwrap();
        dir.connect().unwrap();
        dir.update_server_config(ServerConfig { server_id: "s1".to_string(), server_addr: "10.0.0.1:1".to_string(), status: None })
            .unwrap();
        assert_eq!(dir.get_server_config("s1").unwrap().status, Some(ServerStatus::Up));
    }

    #[test]
    fn cluster_config_watch_rearms_after_each_change() {
        let coordinator = Arc::new(LocalCoordinator::new());
        let writer = Arc::new(ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1"));
        writer.create_cluster(ClusterConfig::default()).unwrap();
        writer.connect().unwrap();
        let reader = Arc::new(ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1"));
        reader.connect().unwrap();

        let mut cfg = reader.get_cluster_config().unwrap();
        cfg.replication_factor = 7;
        writer.update_cluster_config(cfg, 0).unwrap();
        assert_eq!(reader.get_cluster_config().unwrap().replication_factor, 7);

        let mut cfg2 = reader.get_cluster_config().unwrap();
        cfg2.replication_factor = 9;
        writer.update_cluster_config(cfg2, 1).unwrap();
        assert_eq!(reader.get_cluster_config().unwrap().replication_factor, 9);
    }

    #[test]
    fn namespace_and_table_creation_propagates_without_a_second_connect() {
        let coordinator = Arc::new(LocalCoordinator::new());
        let writer = Arc::new(ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1"));
        writer.create_cluster(ClusterConfig::default()).unwrap();
        writer.connect().unwrap();
        let reader = Arc::new(ClusterDirectory::new(Arc::clone(&coordinator) as Arc<dyn CoordinatorClient>, "/eventql/c1"));
        reader.connect().unwrap();

        writer
            .update_namespace_config(NamespaceConfig { namespace: "ns1".to_string(), owner: "me".to_string() })
            .unwrap();
        assert!(reader.get_namespace_config("ns1").is_ok());

        writer
            .update_table_config("ns1", TableDefinition::new("t1", vec!["id".to_string()]))
            .unwrap();
        assert!(reader.list_tables("ns1").unwrap().contains(&"t1".to_string()));
    }
}
