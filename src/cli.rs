//! Daemon CLI surface (spec.md §6): `--cluster`, `--coordinator`,
//! `--server_name`, `--listen`, `--create_cluster`.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "eventqld", version, author, about = "EventQL server")]
pub struct Cli {
    /// Cluster name; also the top-level path segment under the coordinator
    /// prefix.
    #[arg(long, default_value = "eventql")]
    pub cluster: String,

    /// Coordinator addresses, comma-separated. This workspace has no
    /// remote coordinator transport (the real service is an external
    /// collaborator per spec.md §1); the value is accepted and logged but
    /// an in-process `LocalCoordinator` backs every session.
    #[arg(long, default_value = "127.0.0.1:2181")]
    pub coordinator: String,

    /// This server's id, used as the insert-target identity and the
    /// ephemeral liveness node name.
    #[arg(long)]
    pub server_name: String,

    /// Address this server advertises in `servers-live/<id>`.
    #[arg(long, default_value = "127.0.0.1:7500")]
    pub listen: String,

    /// First-time bootstrap: create `/<cluster>/config` if it doesn't
    /// already exist.
    #[arg(long, default_value_t = false)]
    pub create_cluster: bool,

    /// Directory for this server's on-disk partition and metadata-file
    /// state.
    #[arg(long, default_value = "./data")]
    pub data_dir: std::path::PathBuf,

    /// Optional config file overlaying defaults not covered by CLI flags
    /// (replication factor, min consistency). See `crate::config`.
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
}
