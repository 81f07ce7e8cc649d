//! Write a unit definition from flags

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use minit::units::{RestartPolicy, ServiceType};
use minit::{Config, Supervisor, UnitDefinition};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unit name
    name: String,

    /// Command line to run
    #[arg(long)]
    exec_start: String,

    /// Human-readable description
    #[arg(long)]
    description: Option<String>,

    /// Working directory (defaults to the configured default)
    #[arg(long)]
    working_directory: Option<PathBuf>,

    /// Restart policy: no, on-failure or always
    #[arg(long, default_value = "on-failure", value_parser = parse_restart)]
    restart: RestartPolicy,

    /// Seconds recorded as RestartSec
    #[arg(long, default_value_t = 5)]
    restart_sec: u64,

    /// Service type: simple, forking, oneshot, notify or dbus
    #[arg(long = "type", default_value = "simple", value_parser = parse_type)]
    service_type: ServiceType,
}

fn parse_restart(s: &str) -> Result<RestartPolicy, String> {
    RestartPolicy::parse(s).ok_or_else(|| format!("unknown restart policy: {}", s))
}

fn parse_type(s: &str) -> Result<ServiceType, String> {
    ServiceType::parse(s).ok_or_else(|| format!("unknown service type: {}", s))
}

impl CreateArgs {
    fn into_definition(self, config: &Config) -> UnitDefinition {
        let mut definition = UnitDefinition::new(self.name);
        definition.description = self.description;
        definition.exec_start = Some(self.exec_start);
        definition.working_directory = Some(
            self.working_directory
                .unwrap_or_else(|| config.default_working_dir.clone()),
        );
        definition.restart = self.restart;
        definition.restart_sec = self.restart_sec;
        definition.service_type = self.service_type;
        definition
    }
}

pub async fn create(config: &Config, args: CreateArgs) -> ExitCode {
    let supervisor = Supervisor::from_config(config);
    let definition = args.into_definition(config);
    let response = match supervisor.create_definition(&definition).await {
        Ok(stored) => minit::Response::Added(stored.name),
        Err(e) => minit::Response::Error(e),
    };
    super::report(&response)
}
