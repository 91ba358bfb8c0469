//! Incremental reading of a job's captured stdout.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};

// a job's output file, read once per tick
#[derive(Debug)]
pub struct OutputLog {
    path: PathBuf,
    // number of complete lines already handed out
    num_seen_lines: usize,
}

impl OutputLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            num_seen_lines: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete lines written since the previous call.
    ///
    /// A missing file yields nothing. A log that shrank was restarted, so it
    /// is handed out again from its first line.
    pub fn read_new_lines(&mut self) -> Vec<String> {
        let mut lines = read_lines(&self.path);
        if lines.len() < self.num_seen_lines {
            warn!(
                "Output `{}` shrank from {} to {} lines, reading it from the start.",
                self.path.display(),
                self.num_seen_lines,
                lines.len()
            );
            self.num_seen_lines = 0;
        }
        let new_lines = lines.split_off(self.num_seen_lines);
        self.num_seen_lines += new_lines.len();
        new_lines
    }
}

// complete lines only, the job may still be writing the last one
pub fn read_lines(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => content
            .split_inclusive('\n')
            .filter(|l| l.ends_with('\n'))
            .map(|l| l.trim_end_matches(['\r', '\n']).to_string())
            .collect(),

        Err(e) => {
            debug!("Output `{}` is not available yet: `{e:?}`", path.display());
            Vec::new()
        }
    }
}
