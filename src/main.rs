use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use clap::{
    Args, Parser, Subcommand, ValueEnum
};
use env_logger::Env;
use futures::{
    select,
    FutureExt,
    StreamExt,
};
use log::{info, warn};
use tokio::time::interval;
use tokio_stream::wrappers::IntervalStream;

use hpcdesk::{
    output::OutputLog,
    Detection, Job, JobKind, JobTemplate, LocalFs, Settings,
};

// CLI
#[derive(Parser, Debug)]
#[command(name = "hpcdesk")]
#[command(version = "0.1")]
#[command(about = "Builds Slurm scripts for interactive desktop sessions \
                   and watches them until they become usable.",
          long_about = None
)]
struct Cli {
    /// Settings file, defaults to ~/.lhpc/settings.toml
    #[arg(short, long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the batch script of a job
    Render {
        #[command(flatten)]
        job: JobArgs,

        /// Write the script here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Wait for a submitted job to become usable
    Watch {
        #[command(flatten)]
        job: JobArgs,

        /// Scheduler assigned job id
        #[arg(long)]
        job_id: u64,

        /// Captured stdout of the job, e.g. slurm-<id>.out
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Job template (TOML); takes precedence over the flags below
    #[arg(short, long)]
    job_file: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Kind::Notebook)]
    kind: Kind,

    #[arg(short, long)]
    account: Option<String>,

    #[arg(short, long)]
    partition: Option<String>,

    #[arg(short, long)]
    time: Option<String>,

    /// Server module of notebook/lab jobs
    #[arg(short, long)]
    module: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Placeholder,
    Notebook,
    Lab,
    Vm,
}

impl From<Kind> for JobKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Placeholder => JobKind::Placeholder,
            Kind::Notebook => JobKind::Notebook,
            Kind::Lab => JobKind::Lab,
            Kind::Vm => JobKind::Vm,
        }
    }
}

impl JobArgs {
    fn build(&self, settings: &Settings) -> anyhow::Result<Job> {
        if let Some(job_file) = &self.job_file {
            let template = JobTemplate::from_file(job_file)?;
            return Ok(template.build(settings))
        }
        let defaults = &settings.defaults;
        let kind = JobKind::from(self.kind);
        let module = self.module.as_deref().unwrap_or(match kind {
            JobKind::Lab => defaults.lab_module.as_str(),
            _ => defaults.notebook_module.as_str(),
        });
        Ok(Job::new(
            kind,
            self.account.as_deref().unwrap_or(&defaults.account),
            self.partition.as_deref().unwrap_or(&defaults.partition),
            self.time.as_deref().unwrap_or(&defaults.time),
            module,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();
    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.settings.as_deref())?;

    match cli.command {
        Commands::Render { job, out } => {
            let job = job.build(&settings)?;
            match out {
                Some(path) => {
                    fs::write(&path, job.script())
                        .with_context(|| format!("Failed to write `{}`", path.display()))?;
                    info!("The `{}` job script is saved to `{}`.", job.kind, path.display());
                },

                None => println!("{job}"),
            }
        },

        Commands::Watch { job, job_id, output } => {
            let mut job = job.build(&settings)?;
            job.assign_id(job_id);
            let store_dir = settings.store_dir()?;
            let detection = watch(
                &mut job,
                output.as_deref(),
                &store_dir,
                Duration::from_secs(settings.poll_interval_secs),
            )
            .await?;
            if let Some(detection) = detection {
                println!("{}", detection.value());
            }
        },
    }
    Ok(())
}

// drive detection on a timer until the job reports in or the user gives up
async fn watch(
    job: &mut Job,
    output: Option<&Path>,
    store_dir: &Path,
    period: Duration,
) -> anyhow::Result<Option<Detection>> {
    if !job.is_waiting() {
        warn!("A `{}` job has nothing to wait for.", job.kind);
        return Ok(None)
    }
    if job.process_output_enabled() && output.is_none() {
        anyhow::bail!("A `{}` job is detected from its output, pass `--output`.", job.kind);
    }
    info!("Waiting for job `{:?}` to become available.", job.config.id);

    let mut timer = IntervalStream::new(interval(period)).fuse();
    let mut interrupt = Box::pin(tokio::signal::ctrl_c().fuse());
    let mut log = output.map(OutputLog::new);

    loop {
        select! {
            _ = timer.select_next_some() => {
                if let Some(log) = log.as_mut() {
                    let lines = log.read_new_lines();
                    if !lines.is_empty() {
                        if let Some(detection) = job.process_output(&lines) {
                            return Ok(Some(detection))
                        }
                    }
                }
                if let Some(detection) = job.process_update(&LocalFs, store_dir) {
                    return Ok(Some(detection))
                }
            },

            res = interrupt => {
                res?;
                warn!("Interrupted before the job became available.");
                return Ok(None)
            },
        }
    }
}
