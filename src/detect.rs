//! Readiness detection for running jobs.
//!
//! Notebook and lab servers announce their access URL on stdout, so their
//! output is scanned line by line. VMs are announced out-of-band through a
//! small artifact file named after the job id. Both detectors report at most
//! once per job: they trip the job's `Switch` on success and are no-ops
//! afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;

use crate::job::Switch;

// printed by jupyter next to the access url
pub const TOKEN_MARKER: &str = "?token=";

// "[I 10:01:02 NotebookApp] http://host:8888/?token=abc" splits into this many words
const URL_LINE_TOKENS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    NotebookUrl(String),

    LabUrl(String),

    VmHost(String),
}

impl Detection {
    pub fn value(&self) -> &str {
        match self {
            Detection::NotebookUrl(v) |
            Detection::LabUrl(v) |
            Detection::VmHost(v) => v,
        }
    }
}

/// Scans a batch of output lines for the server url.
///
/// Lines carrying the marker but not the expected shape are skipped, a later
/// batch may still contain a well-formed one. Re-delivering lines after a
/// successful scan yields nothing because `enabled` is already tripped.
pub fn scan_output<S: AsRef<str>>(
    lines: &[S],
    enabled: &mut Switch
) -> Option<String> {
    if !enabled.is_on() {
        return None
    }
    for line in lines.iter().map(|l| l.as_ref()) {
        if !line.contains(TOKEN_MARKER) {
            continue
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != URL_LINE_TOKENS {
            debug!("Skipped malformed url line: `{line}`");
            continue
        }
        enabled.trip();
        return Some(parts[URL_LINE_TOKENS - 1].to_string())
    }
    None
}

// the filesystem side of artifact polling
pub trait ArtifactSource {
    // None when the file is absent, unreadable, or empty
    fn read_first_line(&self, path: &Path) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl ArtifactSource for LocalFs {
    fn read_first_line(&self, path: &Path) -> Option<String> {
        if !path.exists() {
            return None
        }
        match fs::read_to_string(path) {
            Ok(content) => content.lines().next().map(|l| l.to_string()),

            Err(e) => {
                debug!("Artifact `{}` is not readable yet: `{e:?}`", path.display());
                None
            }
        }
    }
}

pub fn artifact_path(base_dir: &Path, job_id: u64) -> PathBuf {
    base_dir.join(format!("vm_host_{job_id}.ip"))
}

/// Checks once for the VM host artifact of job `job_id`.
pub fn poll_artifact<A: ArtifactSource + ?Sized>(
    source: &A,
    base_dir: &Path,
    job_id: Option<u64>,
    enabled: &mut Switch,
) -> Option<String> {
    if !enabled.is_on() {
        return None
    }
    // not submitted yet, there is no file name to look for
    let job_id = job_id?;
    let hostname = source
        .read_first_line(&artifact_path(base_dir, job_id))
        .map(|l| l.trim().to_string())
        .filter(|h| !h.is_empty())?;
    enabled.trip();
    Some(hostname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, collections::HashMap};

    const URL_LINE: &str =
        "[I 10:01:02.345 NotebookApp]  http://au042:8888/?token=abc123";

    #[test]
    fn extracts_fourth_token() {
        let mut enabled = Switch::on();
        let lines = ["Starting at Mon", URL_LINE];
        assert_eq!(
            scan_output(&lines, &mut enabled),
            Some("http://au042:8888/?token=abc123".to_string())
        );
        assert!(!enabled.is_on());
    }

    #[test]
    fn first_match_wins() {
        let mut enabled = Switch::on();
        let lines = [
            "[I 10:00 NotebookApp] http://first/?token=1",
            "[I 10:00 NotebookApp] http://second/?token=2",
        ];
        assert_eq!(
            scan_output(&lines, &mut enabled),
            Some("http://first/?token=1".to_string())
        );
        assert_eq!(scan_output(&lines, &mut enabled), None);
        assert_eq!(scan_output(&lines[1..], &mut enabled), None);
        assert!(!enabled.is_on());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let mut enabled = Switch::on();
        let batch = ["or http://au042:8888/?token=abc"];
        assert_eq!(scan_output(&batch, &mut enabled), None);
        assert!(enabled.is_on());

        let batch = [URL_LINE.to_string()];
        assert!(scan_output(&batch, &mut enabled).is_some());
        assert!(!enabled.is_on());
    }

    #[test]
    fn malformed_then_wellformed_in_one_batch() {
        let mut enabled = Switch::on();
        let lines = ["http://a/?token=x", "[I 10:00 x] http://b/?token=y"];
        assert_eq!(
            scan_output(&lines, &mut enabled),
            Some("http://b/?token=y".to_string())
        );
    }

    #[test]
    fn disabled_scanner_ignores_matches() {
        let mut enabled = Switch::off();
        assert_eq!(scan_output(&[URL_LINE], &mut enabled), None);
    }

    // in-memory artifact store that counts reads
    #[derive(Default)]
    struct FakeFs {
        files: HashMap<PathBuf, String>,
        reads: Cell<usize>,
    }

    impl ArtifactSource for FakeFs {
        fn read_first_line(&self, path: &Path) -> Option<String> {
            self.reads.set(self.reads.get() + 1);
            self.files
                .get(path)
                .and_then(|c| c.lines().next())
                .map(|l| l.to_string())
        }
    }

    #[test]
    fn artifact_file_name() {
        assert_eq!(
            artifact_path(Path::new("/home/u/.lhpc"), 4711),
            PathBuf::from("/home/u/.lhpc/vm_host_4711.ip")
        );
    }

    #[test]
    fn poll_until_artifact_appears() {
        let base = Path::new("/store");
        let mut fs = FakeFs::default();
        let mut enabled = Switch::on();

        for _ in 0..3 {
            assert_eq!(poll_artifact(&fs, base, Some(7), &mut enabled), None);
            assert!(enabled.is_on());
        }

        fs.files.insert(artifact_path(base, 7), "  vm-host-12.lunarc \nextra\n".to_string());
        assert_eq!(
            poll_artifact(&fs, base, Some(7), &mut enabled),
            Some("vm-host-12.lunarc".to_string())
        );
        assert!(!enabled.is_on());

        let reads = fs.reads.get();
        assert_eq!(poll_artifact(&fs, base, Some(7), &mut enabled), None);
        assert_eq!(fs.reads.get(), reads);
    }

    #[test]
    fn empty_artifact_is_not_ready() {
        let base = Path::new("/store");
        let mut fs = FakeFs::default();
        fs.files.insert(artifact_path(base, 1), "   \n".to_string());
        let mut enabled = Switch::on();
        assert_eq!(poll_artifact(&fs, base, Some(1), &mut enabled), None);
        assert!(enabled.is_on());
    }

    #[test]
    fn unsubmitted_job_is_not_polled() {
        let fs = FakeFs::default();
        let mut enabled = Switch::on();
        assert_eq!(poll_artifact(&fs, Path::new("/store"), None, &mut enabled), None);
        assert_eq!(fs.reads.get(), 0);
        assert!(enabled.is_on());
    }

    #[test]
    fn local_fs_reads_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact_path(dir.path(), 3);
        assert_eq!(LocalFs.read_first_line(&path), None);

        fs::write(&path, "node17\n").unwrap();
        assert_eq!(LocalFs.read_first_line(&path), Some("node17".to_string()));
    }

    #[test]
    fn detection_value() {
        assert_eq!(Detection::VmHost("h".to_string()).value(), "h");
        assert_eq!(Detection::LabUrl("u".to_string()).value(), "u");
    }
}
