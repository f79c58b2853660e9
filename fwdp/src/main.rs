mod runtime;

use clap::{Parser, Subcommand};
use fwdp_lib::config::load_from_path;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Packet-processing dataplane core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the dataplane from a configuration file and report what was
    /// wired up. The actual NIC/RX-TX driver loop is outside this crate's
    /// scope (spec.md §1 Non-goals) — this is the control-plane half:
    /// load config, compile the ACL, construct `fwstate`, build
    /// pipelines, publish introspection.
    Run {
        /// Path to the TOML configuration file.
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },
    /// Query a just-built instance's introspection surface (spec.md §6).
    /// Since this binary does not persist a running instance between
    /// invocations, `ctl` rebuilds the same dataplane from the given
    /// config and reports the requested view.
    Ctl {
        #[arg(value_name = "FILE")]
        config: PathBuf,
        #[command(subcommand)]
        query: CtlQuery,
    },
}

#[derive(Subcommand, Debug)]
enum CtlQuery {
    /// List dataplane modules across every pipeline.
    Modules,
    /// List control-plane modules and their generation counters.
    ControlPlane,
    /// List configured pipelines, functions, and chains.
    Pipelines,
    /// List configured devices.
    Devices,
    /// List memory agents and their allocation totals.
    Agents,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Run { config } => run(config),
        Command::Ctl { config, query } => ctl(config, query),
    };

    if let Err(err) = result {
        error!(%err, "fwdp exited with error");
        std::process::exit(1);
    }
}

fn run(config_path: &PathBuf) -> fwdp_lib::error::Result<()> {
    let config = load_from_path(config_path)?;
    info!(pipelines = config.pipelines.len(), devices = config.devices.len(), acl_rules = config.acl_rules.len(), "configuration loaded");

    let built = runtime::build(&config)?;
    for pipeline in &built.pipelines {
        info!(pipeline = %pipeline.name, functions = pipeline.functions.len(), "pipeline ready");
    }
    info!(modules = built.introspection.list_dataplane_modules().len(), "dataplane wired up");
    Ok(())
}

fn ctl(config_path: &PathBuf, query: &CtlQuery) -> fwdp_lib::error::Result<()> {
    let config = load_from_path(config_path)?;
    let built = runtime::build(&config)?;

    match query {
        CtlQuery::Modules => {
            for module in built.introspection.list_dataplane_modules() {
                println!("{:<16} {}", module.kind.as_str(), module.name);
            }
        }
        CtlQuery::ControlPlane => {
            for module in built.introspection.list_control_plane_modules() {
                println!("{:<16} {:<16} generation={}", module.kind, module.name, module.generation);
            }
        }
        CtlQuery::Pipelines => {
            for pipeline in built.introspection.list_pipelines() {
                println!("{}", pipeline.name);
                for function in &pipeline.functions {
                    for chain in &function.chains {
                        let modules: Vec<&str> = chain.modules.iter().map(|m| m.name.as_str()).collect();
                        println!("  {}.{} (weight={}): {}", function.name, chain.name, chain.weight, modules.join(" -> "));
                    }
                }
            }
        }
        CtlQuery::Devices => {
            for device in built.introspection.list_devices() {
                println!("{:<4} {}", device.index, device.name);
            }
        }
        CtlQuery::Agents => {
            for agent in built.introspection.list_agents() {
                println!("{:<16} allocated={} freed={} in_use={}", agent.name, agent.totals.allocated, agent.totals.freed, agent.totals.in_use());
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();
}
