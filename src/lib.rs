//! Batch scripts and readiness detection for interactive HPC desktop sessions.
//!
//! A [`Job`] is one of the supported [`JobKind`]s. It renders its
//! [`JobConfig`] into a Slurm script and, once submitted, tells the caller
//! when the session is usable through a [`Detection`].

pub mod config;
pub mod detect;
pub mod job;
pub mod output;
pub mod script;
pub mod variant;

pub use config::{JobTemplate, Settings};
pub use detect::{ArtifactSource, Detection, LocalFs};
pub use job::{JobConfig, Module, Switch};
pub use variant::{Job, JobKind};
