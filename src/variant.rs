//! The supported kinds of interactive jobs.
//!
//! Every kind shares the same `JobConfig` shape and only differs in the
//! defaults it fills in and in how readiness is detected.

use std::{
    fmt,
    path::Path,
};

use log::info;
use serde::Deserialize;

use crate::{
    detect::{self, ArtifactSource, Detection},
    job::{JobConfig, Switch},
    script,
};

pub const DEFAULT_SESSION_TIME: &str = "00:30:00";
pub const DEFAULT_NOTEBOOK_MODULE: &str = "Anaconda3";

// keeps the allocation alive for as long as the scheduler allows
pub const HEARTBEAT: &str = "while true; do date; sleep 5; done";

// resource pool of VM-capable nodes
pub const VM_GRES: &str = "win10m";
pub const VM_MEMORY_MB: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Placeholder,

    Notebook,

    Lab,

    Vm,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            JobKind::Placeholder => "placeholder",
            JobKind::Notebook => "notebook",
            JobKind::Lab => "lab",
            JobKind::Vm => "vm",
        };
        write!(f, "{name}")
    }
}

// an interactive job and its last rendered script
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,

    pub config: JobConfig,

    script: String,

    // detection state, only ever switched off
    process_output: Switch,
    update_polling: Switch,

    // filled in on detection
    pub notebook_url: Option<String>,
    pub hostname: Option<String>,
}

impl Job {
    fn with_config(kind: JobKind, config: JobConfig) -> Self {
        let mut job = Job {
            kind: kind,
            config: config,
            script: String::new(),
            process_output: if matches!(kind, JobKind::Notebook | JobKind::Lab) {
                Switch::on()
            } else {
                Switch::off()
            },
            update_polling: if kind == JobKind::Vm { Switch::on() } else { Switch::off() },
            notebook_url: None,
            hostname: None,
        };
        job.update();
        job
    }

    pub fn new(
        kind: JobKind,
        account: &str,
        partition: &str,
        time: &str,
        module: &str,
    ) -> Self {
        match kind {
            JobKind::Placeholder => Self::placeholder(account, partition, time),
            JobKind::Notebook => Self::notebook(account, partition, time, module),
            JobKind::Lab => Self::lab(account, partition, time, module),
            JobKind::Vm => Self::vm(account, partition, time),
        }
    }

    // master process holding the allocation
    pub fn placeholder(account: &str, partition: &str, time: &str) -> Self {
        let mut config = JobConfig::new(account, partition, time);
        config.add_custom_line(HEARTBEAT);
        Self::with_config(JobKind::Placeholder, config)
    }

    pub fn notebook(account: &str, partition: &str, time: &str, module: &str) -> Self {
        Self::with_config(
            JobKind::Notebook,
            server_config(account, partition, time, module, "jupyter-notebook")
        )
    }

    pub fn lab(account: &str, partition: &str, time: &str, module: &str) -> Self {
        Self::with_config(
            JobKind::Lab,
            server_config(account, partition, time, module, "jupyter-lab")
        )
    }

    pub fn vm(account: &str, partition: &str, time: &str) -> Self {
        let mut config = JobConfig::new(account, partition, time);
        config.add_custom_line(HEARTBEAT);
        config.oversubscribe = true;
        config.memory_mb = Some(VM_MEMORY_MB);
        config.gres = VM_GRES.to_string();
        // let the scheduler decide
        config.node_count = None;
        config.tasks_per_node = None;
        Self::with_config(JobKind::Vm, config)
    }

    // rebuild the script from the current config
    pub fn update(&mut self) {
        self.script = script::render(&self.config);
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn assign_id(&mut self, id: u64) {
        self.config.id = Some(id);
    }

    pub fn set_status(&mut self, status: &str) {
        self.config.status = status.to_string();
    }

    /// Feeds captured output to the job. Only server kinds look at it.
    pub fn process_output<S: AsRef<str>>(&mut self, lines: &[S]) -> Option<Detection> {
        let detection = match self.kind {
            JobKind::Notebook => detect::scan_output(lines, &mut self.process_output)
                .map(Detection::NotebookUrl),

            JobKind::Lab => detect::scan_output(lines, &mut self.process_output)
                .map(Detection::LabUrl),

            JobKind::Placeholder | JobKind::Vm => None,
        }?;
        self.notebook_url = Some(detection.value().to_string());
        match &detection {
            Detection::LabUrl(url) => info!("Lab found: `{url}`"),
            _ => info!("Notebook found: `{}`", detection.value()),
        }
        Some(detection)
    }

    /// One polling tick. Only VMs announce themselves through an artifact.
    pub fn process_update<A: ArtifactSource + ?Sized>(
        &mut self,
        source: &A,
        store_dir: &Path,
    ) -> Option<Detection> {
        if self.kind != JobKind::Vm {
            return None
        }
        let hostname = detect::poll_artifact(
            source,
            store_dir,
            self.config.id,
            &mut self.update_polling,
        )?;
        info!("VM available: `{hostname}`");
        self.hostname = Some(hostname.clone());
        Some(Detection::VmHost(hostname))
    }

    pub fn process_output_enabled(&self) -> bool {
        self.process_output.is_on()
    }

    pub fn update_polling_enabled(&self) -> bool {
        self.update_polling.is_on()
    }

    // whether a driver still has anything to detect
    pub fn is_waiting(&self) -> bool {
        self.process_output.is_on() || self.update_polling.is_on()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.script)
    }
}

fn server_config(
    account: &str,
    partition: &str,
    time: &str,
    module: &str,
    server: &str,
) -> JobConfig {
    let mut config = JobConfig::new(account, partition, time);
    config.add_module(module, "");
    config.add_custom_line("unset XDG_RUNTIME_DIR");
    config.add_custom_line(&format!("{server} --no-browser --ip=$HOSTNAME"));
    config.add_custom_line("module list");
    config.add_custom_line("which python");
    config
}
