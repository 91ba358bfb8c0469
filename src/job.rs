use log::debug;

pub const DEFAULT_TIME_LIMIT: &str = "00:60:00";
pub const DEFAULT_JOB_NAME: &str = "gui_interactive";

// one-way enable flag: starts on or off, may only ever go on -> off.
// Only the crate arms one, so a tripped job stays tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch(bool);

impl Switch {
    pub(crate) fn on() -> Self {
        Switch(true)
    }

    pub fn off() -> Self {
        Switch(false)
    }

    pub fn is_on(&self) -> bool {
        self.0
    }

    // true only for the call that performs the on -> off edge
    pub fn trip(&mut self) -> bool {
        let was_on = self.0;
        self.0 = false;
        was_on
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    // empty means "load whatever the default is"
    pub version: String,
}

// submission parameters of a single job
#[derive(Debug, Clone)]
pub struct JobConfig {
    // assigned by the scheduler on submission
    pub id: Option<u64>,
    pub status: String,

    pub account: String,
    pub partition: String,
    // scheduler duration syntax, e.g. 00:30:00
    pub time_limit: String,
    // None omits the directive
    pub node_count: Option<u32>,
    pub tasks_per_node: Option<u32>,
    // informational, never emitted
    pub cpus_per_node: Option<u32>,
    pub exclusive: bool,
    // in MB, only emitted when > 0
    pub memory_mb: Option<u32>,
    pub gres: String,
    pub oversubscribe: bool,

    // when set, -w <target_node> replaces -p <partition>
    pub submit_to_specific_node: bool,
    pub target_node: String,

    constraints: Vec<String>,
    modules: Vec<Module>,
    custom_lines: Vec<String>,

    pub name: String,
}

impl JobConfig {
    pub fn new(account: &str, partition: &str, time_limit: &str) -> Self {
        Self {
            id: None,
            status: String::new(),
            account: account.to_string(),
            partition: partition.to_string(),
            time_limit: time_limit.to_string(),
            node_count: Some(1),
            tasks_per_node: Some(1),
            cpus_per_node: None,
            exclusive: false,
            memory_mb: None,
            gres: String::new(),
            oversubscribe: false,
            submit_to_specific_node: false,
            target_node: String::new(),
            constraints: Vec::new(),
            modules: Vec::new(),
            custom_lines: Vec::new(),
            name: DEFAULT_JOB_NAME.to_string(),
        }
    }

    pub fn constraints(&self) -> &[String] {
        &self.constraints
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn custom_lines(&self) -> &[String] {
        &self.custom_lines
    }

    // constraints form an ordered set
    pub fn add_constraint(&mut self, constraint: &str) {
        if self.constraints.iter().any(|c| c == constraint) {
            debug!("Constraint `{constraint}` is already requested.");
            return
        }
        self.constraints.push(constraint.to_string());
    }

    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    pub fn add_module(&mut self, name: &str, version: &str) {
        self.modules.push(Module {
            name: name.to_string(),
            version: version.to_string(),
        });
    }

    pub fn add_custom_line(&mut self, line: &str) {
        self.custom_lines.push(line.to_string());
    }

    // drops everything that was appended, keeps the resource request
    pub fn clear_script(&mut self) {
        self.custom_lines.clear();
        self.constraints.clear();
        self.modules.clear();
    }

    pub fn pin_to_node(&mut self, node: &str) {
        self.submit_to_specific_node = true;
        self.target_node = node.to_string();
    }

    pub fn unpin(&mut self) {
        self.submit_to_specific_node = false;
        self.target_node.clear();
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::new("", "", DEFAULT_TIME_LIMIT)
    }
}
