//! flatline - provision and run parametric DXF export jobs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use flatline_core::app::{Deletion, Workflow};
use flatline_core::domain::{Dimensions, WorkItemId};
use flatline_core::impls::HttpBackend;
use flatline_core::ports::SystemClock;
use flatline_core::{FlowConfig, FlowError};

#[derive(Parser)]
#[command(name = "flatline")]
#[command(about = "Provision and run parametric DXF export jobs")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./flatline.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload inputs and the bundle, then register the bundle and activity
    Provision,

    /// Submit one work item against the latest activity version and wait for it
    Run {
        /// Dimension override, regenerates and re-uploads the dimension file
        #[arg(long = "dim", value_name = "NAME=VALUE")]
        dims: Vec<String>,
    },

    /// Read the status of a work item once
    Status {
        /// Work item id printed by `run`
        work_item_id: String,
    },

    /// Delete an activity and all of its versions
    Delete {
        /// Short activity id (defaults to the configured one)
        activity_id: Option<String>,
    },

    /// Write a dimension file from the template defaults
    Dims {
        /// Value to change
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        /// Output path (defaults to `inputs.dims` from the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<FlowConfig> {
    let config = match path {
        Some(path) => FlowConfig::from_file(path),
        None => FlowConfig::load(),
    };
    config.context("loading configuration")
}

fn workflow(config: FlowConfig) -> anyhow::Result<Workflow<HttpBackend>> {
    let backend = HttpBackend::new(&config)?;
    Ok(Workflow::new(Arc::new(config), backend, Arc::new(SystemClock)))
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Provision => {
            let workflow = workflow(load_config(cli.config.as_ref())?)?;
            let provisioned = workflow.provision().await?;
            println!("container: {:?}", provisioned.container);
            for upload in &provisioned.uploads {
                println!("uploaded:  {} ({} bytes)", upload.urn, upload.size);
            }
            println!(
                "bundle:    {}+{} (alias {:?})",
                provisioned.bundle.id, provisioned.bundle.version, provisioned.bundle.alias
            );
            println!(
                "activity:  {}+{} (alias {:?})",
                provisioned.activity.id, provisioned.activity.version, provisioned.activity.alias
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { dims } => {
            let workflow = workflow(load_config(cli.config.as_ref())?)?;
            let report = workflow.execute(dims.as_slice()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            // 出力の欠落は報告のみ、ジョブ自体が成功しなければ失敗扱い
            if report.succeeded() {
                Ok(ExitCode::SUCCESS)
            } else {
                error!(
                    work_item = %report.work_item_id,
                    status = %report.status,
                    exhausted = report.exhausted,
                    "work item did not succeed"
                );
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Status { work_item_id } => {
            let workflow = workflow(load_config(cli.config.as_ref())?)?;
            let info = workflow.status(&WorkItemId::new(work_item_id)).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Delete { activity_id } => {
            let workflow = workflow(load_config(cli.config.as_ref())?)?;
            match workflow.delete_activity(activity_id.as_deref()).await? {
                Deletion::Deleted => println!("deleted"),
                Deletion::AlreadyAbsent => println!("already absent"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Dims { overrides, output } => {
            let path = match output {
                Some(path) => path,
                None => load_config(cli.config.as_ref())?.inputs.dims,
            };
            let mut dims = Dimensions::default();
            dims.apply_overrides(overrides.as_slice())?;
            dims.validate()?;
            dims.write_to(&path).await?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Log the remote call behind a failure, when there is one.
fn report_error(err: &anyhow::Error) {
    let failure = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<FlowError>())
        .and_then(FlowError::api_failure);
    match failure {
        Some(failure) => error!(
            method = %failure.method,
            url = %failure.url,
            status = ?failure.status,
            body = failure.body.as_deref().unwrap_or(""),
            "{err:#}"
        ),
        None => error!("{err:#}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_repeated_dims() {
        let cli = Cli::try_parse_from([
            "flatline",
            "--config",
            "ci.toml",
            "run",
            "--dim",
            "Length=300",
            "--dim",
            "Width=450",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("ci.toml")));
        match cli.command {
            Commands::Run { dims } => assert_eq!(dims, vec!["Length=300", "Width=450"]),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn delete_id_is_optional() {
        let cli = Cli::try_parse_from(["flatline", "delete"]).unwrap();
        assert!(matches!(cli.command, Commands::Delete { activity_id: None }));

        let cli = Cli::try_parse_from(["flatline", "delete", "OldActivity"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Delete { activity_id: Some(ref id) } if id == "OldActivity"
        ));
    }

    #[test]
    fn status_requires_an_id() {
        assert!(Cli::try_parse_from(["flatline", "status"]).is_err());
    }
}
