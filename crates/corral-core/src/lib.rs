//! Resource negotiation and container lifecycle for a single job.
//!
//! - [`Client`] stages artifacts, submits the job and monitors it until a
//!   terminal state or its deadline.
//! - [`Supervisor`] runs inside the cluster, negotiates worker containers
//!   through a [`ResourceNegotiator`] and launches workers on them.
//! - [`protocol`] holds the contracts of the external collaborators
//!   (coordinator, scheduler, worker launcher).

pub mod error;
pub use error::{
    BuildError, ClientRunError, CoordinatorError, LaunchError, MonitorError, NegotiationError, RegistrationError,
    SubmissionError, SupervisorError,
};

pub mod protocol;
pub use protocol::{CoordinatorApi, LauncherApi, SchedulerApi};

pub mod launch;
pub use launch::{CommandTemplate, LaunchContextBuilder, shell_quote};

mod negotiator;
pub use negotiator::{NegotiatorState, ResourceNegotiator};

pub mod supervisor;
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorEnv, SupervisorPhase, SupervisorReport};

pub mod client;
pub use client::{Client, ClientConfig, JobSpec, SubmittedJob};
