//! Daemon bootstrap: wires the Cluster Directory, Metadata Coordinator,
//! Partition Map and Ingestion Router together into one running server,
//! the way `crates/flashq-broker/src/bin/server.rs` wired `FlashQ` plus
//! its storage backend and gRPC services.

use crate::cli::Cli;
use crate::config::DaemonConfig;
use crate::error::EventQlError;
use eventql_coordinator::{LocalMetadataServerTransport, MetadataCoordinator};
use eventql_directory::{ClusterConfig, ClusterDirectory, LocalCoordinator, ServerConfig, ServerStatus};
use eventql_ingest::{IngestionRouter, LocalInsertTarget};
use eventql_metadata::MetadataStore;
use eventql_partition::PartitionMap;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Every long-lived handle the daemon holds, assembled once at startup and
/// shared across connection handlers.
pub struct Server {
    pub directory: Arc<ClusterDirectory>,
    pub coordinator: Arc<MetadataCoordinator>,
    pub partitions: Arc<PartitionMap>,
    pub router: Arc<IngestionRouter>,
    pub config: DaemonConfig,
    pub server_name: String,
    pub listen_addr: String,
}

impl Server {
    /// Runs the bootstrap sequence described in spec.md §6: optionally
    /// create the cluster, connect the directory, register this server as
    /// live, and build the local metadata/partition/ingest stack on top.
    pub fn bootstrap(cli: &Cli) -> Result<Self, EventQlError> {
        let config = DaemonConfig::load(cli.config.as_deref())?;
        log::info!("bootstrapping server '{}' for cluster '{}'", cli.server_name, cli.cluster);
        log::info!(
            "coordinator address '{}' accepted but unused: this workspace backs every session with an in-process coordinator (see eventql-directory::LocalCoordinator)",
            cli.coordinator
        );

        std::fs::create_dir_all(&cli.data_dir).map_err(|e| EventQlError::from_io_error(e, "creating data directory"))?;

        let local_coordinator: Arc<dyn eventql_directory::CoordinatorClient> = Arc::new(LocalCoordinator::new());
        let prefix = format!("/eventql/{}", cli.cluster);
        let directory = Arc::new(
            ClusterDirectory::new(local_coordinator, prefix)
                .with_server_identity(cli.server_name.clone(), cli.listen.clone()),
        );

        if cli.create_cluster {
            directory.create_cluster(ClusterConfig {
                cluster_name: cli.cluster.clone(),
                replication_factor: config.replication_factor,
                min_consistency: config.min_consistency,
            })?;
            log::info!("created cluster '{}'", cli.cluster);
        }
        directory.connect()?;
        directory.update_server_config(ServerConfig {
            server_id: cli.server_name.clone(),
            server_addr: cli.listen.clone(),
            status: Some(ServerStatus::Up),
        })?;

        let metadata_store = Arc::new(MetadataStore::new(cli.data_dir.join("metadata")));
        let transport = Arc::new(LocalMetadataServerTransport::new(vec![(cli.server_name.clone(), metadata_store)]));
        let coordinator = Arc::new(MetadataCoordinator::new(transport));

        let partitions = Arc::new(PartitionMap::new());
        let target = Arc::new(LocalInsertTarget::new(cli.server_name.clone(), Arc::clone(&partitions)));
        let router = Arc::new(IngestionRouter::new(
            Arc::clone(&coordinator),
            target,
            vec![cli.server_name.clone()],
            config.min_consistency,
        ));

        Ok(Self {
            directory,
            coordinator,
            partitions,
            router,
            config,
            server_name: cli.server_name.clone(),
            listen_addr: cli.listen.clone(),
        })
    }

    /// Binds `--listen` and accepts connections. Framing the native client
    /// protocol (`HELLO`/`READY`/opcode dispatch) is out of scope per
    /// spec.md §1, so every accepted connection is closed immediately
    /// after being logged; the point of this loop is to prove the address
    /// is bindable and to give operators a liveness signal, not to serve
    /// the wire protocol.
    pub async fn serve(&self) -> Result<(), EventQlError> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|e| EventQlError::from_io_error(e, "binding --listen address"))?;
        log::info!("listening on {}", self.listen_addr);
        loop {
            let (_stream, peer) = listener
                .accept()
                .await
                .map_err(|e| EventQlError::from_io_error(e, "accepting connection"))?;
            log::debug!("accepted connection from {peer}; native wire protocol is out of scope, closing");
        }
    }
}
