use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::warn;
use serde::Deserialize;

use crate::variant::{Job, JobKind, DEFAULT_NOTEBOOK_MODULE, DEFAULT_SESSION_TIME};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub account: String,

    #[serde(default)]
    pub partition: String,

    #[serde(default = "default_time")]
    pub time: String,

    #[serde(default = "default_module")]
    pub notebook_module: String,

    #[serde(default = "default_module")]
    pub lab_module: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            account: String::new(),
            partition: String::new(),
            time: default_time(),
            notebook_module: default_module(),
            lab_module: default_module(),
        }
    }
}

fn default_time() -> String {
    DEFAULT_SESSION_TIME.to_string()
}

fn default_module() -> String {
    DEFAULT_NOTEBOOK_MODULE.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

// per-user settings, e.g. ~/.lhpc/settings.toml
#[derive(Debug, Deserialize)]
pub struct Settings {
    // where side-channel artifacts (vm_host_<id>.ip) show up
    pub store_dir: Option<PathBuf>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub defaults: Defaults,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            defaults: Defaults::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings `{}`", path.display()))?;
        let settings: Settings = toml::from_str(&content)?;
        if settings.poll_interval_secs == 0 {
            anyhow::bail!("`poll_interval_secs` must be positive");
        }
        Ok(settings)
    }

    // falls back to built-in defaults when the file is missing
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),

            None => {
                let default_path = get_store_dir()?.join("settings.toml");
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn store_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.store_dir {
            Some(dir) => Ok(dir.clone()),

            None => get_store_dir(),
        }
    }
}

// get the per-user storage dir of the host
pub fn get_store_dir() -> anyhow::Result<PathBuf> {
    let home_dir = home::home_dir()
        .ok_or_else(|| anyhow::Error::msg("Home dir is not available"))?;
    Ok(home_dir.join(".lhpc"))
}

// job template as read in(e.g. from disk)
#[derive(Debug, Deserialize)]
pub struct JobTemplate {
    pub kind: JobKind,

    pub account: Option<String>,
    pub partition: Option<String>,
    pub time: Option<String>,
    // notebook/lab server module
    pub module: Option<String>,

    pub name: Option<String>,
    // pin to a specific node instead of a partition, "" is ignored
    pub node: Option<String>,
    // 0 leaves the count to the scheduler
    pub nodes: Option<u32>,
    pub tasks_per_node: Option<u32>,
    pub cpus_per_node: Option<u32>,
    pub memory_mb: Option<u32>,
    pub gres: Option<String>,

    #[serde(default)]
    pub exclusive: bool,

    #[serde(default)]
    pub constraints: Vec<String>,

    // loaded after the kind's own modules
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,

    // appended after the kind's own commands
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleSpec {
    pub name: String,

    #[serde(default)]
    pub version: String,
}

impl JobTemplate {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file `{}`", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn build(&self, settings: &Settings) -> Job {
        let defaults = &settings.defaults;
        let module = self.module.as_deref().unwrap_or(match self.kind {
            JobKind::Lab => defaults.lab_module.as_str(),
            _ => defaults.notebook_module.as_str(),
        });
        if self.module.is_some() && matches!(self.kind, JobKind::Placeholder | JobKind::Vm) {
            warn!("A `{}` job loads no server module, ignoring `module`.", self.kind);
        }
        let mut job = Job::new(
            self.kind,
            self.account.as_deref().unwrap_or(&defaults.account),
            self.partition.as_deref().unwrap_or(&defaults.partition),
            self.time.as_deref().unwrap_or(&defaults.time),
            module,
        );

        let config = &mut job.config;
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(node) = self.node.as_deref().filter(|n| !n.is_empty()) {
            config.pin_to_node(node);
        }
        if let Some(nodes) = self.nodes {
            config.node_count = Some(nodes).filter(|n| *n > 0);
        }
        if let Some(tasks) = self.tasks_per_node {
            config.tasks_per_node = Some(tasks).filter(|t| *t > 0);
        }
        config.cpus_per_node = self.cpus_per_node.or(config.cpus_per_node);
        if self.memory_mb.is_some() {
            config.memory_mb = self.memory_mb;
        }
        if let Some(gres) = &self.gres {
            config.gres = gres.clone();
        }
        config.exclusive |= self.exclusive;
        for constraint in &self.constraints {
            config.add_constraint(constraint);
        }
        for module in &self.modules {
            config.add_module(&module.name, &module.version);
        }
        for line in &self.commands {
            config.add_custom_line(line);
        }

        job.update();
        job
    }
}
