//! Command-line surface: a thin operator CLI exercising the Deployment
//! Manager and Hypervisor Client end to end — one `clap::Parser` root, one
//! `Commands` enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "orc",
    about = "Container and VM orchestration control plane CLI",
    version,
    author,
    long_about = "Operator CLI for the orchestrator control plane: create and manage container \
deployments and hypervisor-backed VMs from the command line."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file. Falls back to built-in defaults and
    /// environment overrides when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a single-image workload.
    Deploy {
        deployment_id: String,
        image: String,
        domain: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        replicas: Option<u32>,
    },
    /// Deploy a compose stack from a YAML file.
    DeployCompose {
        deployment_id: String,
        compose_file: PathBuf,
        domain: String,
    },
    /// Start an existing deployment's containers.
    Start { deployment_id: String },
    /// Stop an existing deployment's containers without removing state.
    Stop { deployment_id: String },
    /// Stop and remove a deployment entirely.
    Delete { deployment_id: String },
    /// Restart a deployment (stop, then start).
    Restart { deployment_id: String },
    /// Scale a single-image deployment's replica count.
    Scale { deployment_id: String, replicas: u32 },
    /// Stop a compose deployment's stack without removing it.
    StopCompose { deployment_id: String },
    /// Remove a compose deployment's stack.
    RemoveCompose { deployment_id: String },
    /// Tail recent logs for a deployment.
    Logs {
        deployment_id: String,
        #[arg(long, default_value_t = 200)]
        tail: usize,
    },
    /// VM lifecycle operations against the hypervisor.
    #[command(subcommand)]
    Vm(VmCommands),
}

#[derive(Subcommand, Debug)]
pub enum VmCommands {
    /// Create a new VM.
    Create {
        vps_id: String,
        display_name: String,
        organization_id: String,
        #[arg(long, default_value_t = 1)]
        cpu_cores: u32,
        #[arg(long, default_value_t = 1024)]
        memory_mib: u64,
        #[arg(long, default_value_t = 20)]
        disk_gib: u64,
        /// `ubuntu2204`, `ubuntu2404`, `debian12`, or a custom template name.
        #[arg(long, default_value = "ubuntu2204")]
        image: String,
        #[arg(long)]
        isolate: bool,
    },
    /// Delete a VM. Refuses unless the hypervisor's VM name matches `vps_id`.
    Delete {
        node: String,
        vmid: u32,
        vps_id: String,
    },
    /// Mint a console URL for an existing VM.
    Console {
        node: String,
        vmid: u32,
        host: String,
        #[arg(long, value_enum, default_value_t = ConsoleKind::Vnc)]
        kind: ConsoleKind,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ConsoleKind {
    Vnc,
    Termproxy,
    Serial,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_deploy_with_optional_flags() {
        let cli = Cli::try_parse_from(["orc", "deploy", "d1", "alpine:3.20", "d1.example", "--port", "8080"]).unwrap();
        match cli.command {
            Commands::Deploy { deployment_id, image, domain, port, replicas } => {
                assert_eq!(deployment_id, "d1");
                assert_eq!(image, "alpine:3.20");
                assert_eq!(domain, "d1.example");
                assert_eq!(port, Some(8080));
                assert_eq!(replicas, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_vm_create_subcommand() {
        let cli = Cli::try_parse_from(["orc", "vm", "create", "vps1", "web-1", "org1"]).unwrap();
        match cli.command {
            Commands::Vm(VmCommands::Create { vps_id, cpu_cores, .. }) => {
                assert_eq!(vps_id, "vps1");
                assert_eq!(cpu_cores, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_required_argument() {
        assert!(Cli::try_parse_from(["orc", "deploy", "d1"]).is_err());
    }
}
