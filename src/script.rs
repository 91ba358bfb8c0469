//! Job script compilation.
//!
//! Turns a `JobConfig` into a Slurm batch script. The output is a pure
//! function of the config: every call rebuilds the line list from scratch.

use crate::job::JobConfig;

pub const INTERPRETER: &str = "#!/bin/bash";
pub const DIRECTIVE_PREFIX: &str = "#SBATCH";

// printed by every job so the output log documents its allocation
const DIAGNOSTICS: [&str; 10] = [
    "echo \"Starting at `date`\"",
    "echo \"Running on hosts: $SLURM_NODELIST\"",
    "echo \"Running on $SLURM_NNODES nodes.\"",
    "echo \"Running on $SLURM_NPROCS processors.\"",
    "echo \"SLURM JobID $SLURM_JOB_ID processors.\"",
    "echo \"Node has $SLURM_CPUS_ON_NODE processors.\"",
    "echo \"Node has $SLURM_MEM_PER_NODE total memory.\"",
    "echo \"Node has $SLURM_MEM_PER_CPU memory per cpu.\"",
    "echo \"Current working directory is `pwd`\"",
    "echo \"Current path is $PATH\"",
];

fn directive(option: &str) -> String {
    format!("{DIRECTIVE_PREFIX} {option}")
}

/// Directive lines in scheduler order, without the interpreter line.
pub fn directives(config: &JobConfig) -> Vec<String> {
    let mut options = Vec::new();

    if !config.account.is_empty() {
        options.push(format!("-A {}", config.account));
    }

    if config.submit_to_specific_node {
        options.push(format!("-w {}", config.target_node));
    } else if !config.partition.is_empty() {
        options.push(format!("-p {}", config.partition));
    }

    if let Some(nodes) = config.node_count {
        options.push(format!("-N {nodes}"));
    }

    if let Some(tasks) = config.tasks_per_node {
        options.push(format!("--ntasks-per-node={tasks}"));
    }

    options.push(format!("--time={}", config.time_limit));

    if !config.gres.is_empty() {
        options.push(format!("--gres={}", config.gres));
    }

    if let Some(memory) = config.memory_mb.filter(|m| *m > 0) {
        options.push(format!("--mem={memory}"));
    }

    if config.exclusive {
        options.push("--exclusive".to_string());
    }

    if config.oversubscribe {
        options.push("--oversubscribe".to_string());
    }

    // a single constraint joins to itself
    if !config.constraints().is_empty() {
        options.push(format!("--constraint={}", config.constraints().join("&")));
    }

    options.push(format!("-J {}", config.name));

    options.iter()
        .map(|o| directive(o))
        .collect()
}

fn module_load(name: &str, version: &str) -> String {
    if version.is_empty() {
        format!("module load {name}")
    } else {
        format!("module load {name}/{version}")
    }
}

pub fn render(config: &JobConfig) -> String {
    let mut lines = vec![INTERPRETER.to_string(), String::new()];
    lines.extend(directives(config));
    lines.push(String::new());
    lines.extend(DIAGNOSTICS.iter().map(|l| l.to_string()));
    lines.push(String::new());
    lines.extend(
        config.modules()
            .iter()
            .map(|m| module_load(&m.name, &m.version))
    );
    lines.extend(config.custom_lines().iter().cloned());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::DEFAULT_TIME_LIMIT as DEFAULT_TIME;

    fn has_directive(script: &str, option: &str) -> bool {
        script.lines().any(|l| l == format!("#SBATCH {option}"))
    }

    fn has_flag(script: &str, flag: &str) -> bool {
        script.lines()
            .filter(|l| l.starts_with(DIRECTIVE_PREFIX))
            .any(|l| l.contains(flag))
    }

    #[test]
    fn default_config() {
        let script = render(&JobConfig::default());
        let expected = [
            "#!/bin/bash",
            "",
            "#SBATCH -N 1",
            "#SBATCH --ntasks-per-node=1",
            "#SBATCH --time=00:60:00",
            "#SBATCH -J gui_interactive",
            "",
        ]
        .join("\n");
        assert!(script.starts_with(&expected));
        assert!(script.ends_with("echo \"Current path is $PATH\"\n"));
    }

    #[test]
    fn render_is_deterministic() {
        let mut config = JobConfig::new("proj42", "gpu", "02:00:00");
        config.add_constraint("v100");
        config.add_module("CUDA", "12.1");
        config.add_custom_line("nvidia-smi");
        assert_eq!(render(&config), render(&config));
    }

    #[test]
    fn directive_order_is_fixed() {
        let mut config = JobConfig::default();
        // assigned out of emission order on purpose
        config.name = "viz".to_string();
        config.oversubscribe = true;
        config.add_constraint("skylake");
        config.exclusive = true;
        config.memory_mb = Some(2048);
        config.gres = "gpu:1".to_string();
        config.partition = "lu".to_string();
        config.account = "lu2024-1".to_string();

        assert_eq!(
            directives(&config),
            vec![
                "#SBATCH -A lu2024-1",
                "#SBATCH -p lu",
                "#SBATCH -N 1",
                "#SBATCH --ntasks-per-node=1",
                "#SBATCH --time=00:60:00",
                "#SBATCH --gres=gpu:1",
                "#SBATCH --mem=2048",
                "#SBATCH --exclusive",
                "#SBATCH --oversubscribe",
                "#SBATCH --constraint=skylake",
                "#SBATCH -J viz",
            ]
        );
    }

    #[test]
    fn unset_fields_emit_nothing() {
        let mut config = JobConfig::default();
        config.node_count = None;
        config.tasks_per_node = None;
        config.memory_mb = Some(0);
        let script = render(&config);

        assert!(!has_flag(&script, "-A "));
        assert!(!has_flag(&script, "-p "));
        assert!(!has_flag(&script, "-w "));
        assert!(!has_flag(&script, "-N "));
        assert!(!has_flag(&script, "--ntasks-per-node"));
        assert!(!has_flag(&script, "--gres"));
        assert!(!has_flag(&script, "--mem"));
        assert!(!has_flag(&script, "--exclusive"));
        assert!(!has_flag(&script, "--oversubscribe"));
        assert!(!has_flag(&script, "--constraint"));
        assert!(has_directive(&script, "--time=00:60:00"));
        assert!(has_directive(&script, "-J gui_interactive"));
    }

    #[test]
    fn cpus_per_node_is_not_emitted() {
        let mut config = JobConfig::default();
        config.cpus_per_node = Some(20);
        assert_eq!(render(&config), render(&JobConfig::default()));
    }

    #[test]
    fn node_pin_replaces_partition() {
        let mut config = JobConfig::new("", "lu", DEFAULT_TIME);
        config.pin_to_node("au042");
        let script = render(&config);
        assert!(has_directive(&script, "-w au042"));
        assert!(!has_flag(&script, "-p "));

        config.unpin();
        let script = render(&config);
        assert!(has_directive(&script, "-p lu"));
        assert!(!has_flag(&script, "-w "));
    }

    #[test]
    fn constraint_joining() {
        let mut config = JobConfig::default();
        assert!(!has_flag(&render(&config), "--constraint"));

        config.add_constraint("a");
        assert!(has_directive(&render(&config), "--constraint=a"));

        config.add_constraint("b");
        assert!(has_directive(&render(&config), "--constraint=a&b"));
    }

    #[test]
    fn module_formatting() {
        let mut config = JobConfig::default();
        config.add_module("numpy", "");
        config.add_module("numpy", "1.2");
        let script = render(&config);
        let loads: Vec<_> = script.lines()
            .filter(|l| l.starts_with("module load"))
            .collect();
        assert_eq!(loads, vec!["module load numpy", "module load numpy/1.2"]);
    }

    #[test]
    fn custom_lines_follow_modules() {
        let mut config = JobConfig::default();
        config.add_custom_line("hostname");
        config.add_module("GCC", "");
        config.add_custom_line("sleep 10");
        let script = render(&config);
        assert!(script.ends_with("\nmodule load GCC\nhostname\nsleep 10"));
    }

    #[test]
    fn clearing_a_field_drops_its_directive() {
        let mut config = JobConfig::default();
        config.gres = "gpu:2".to_string();
        config.add_constraint("v100");
        assert!(has_flag(&render(&config), "--gres"));

        config.gres.clear();
        config.clear_constraints();
        let script = render(&config);
        assert!(!has_flag(&script, "--gres"));
        assert!(!has_flag(&script, "--constraint"));
        assert_eq!(script, render(&JobConfig::default()));
    }
}
