//! HTTP transport for the coordinator contracts.
//!
//! - [`HttpApi`] mounts any [`ClusterService`] behind an axum router.
//! - [`RemoteCoordinator`] implements the same contracts over reqwest.
mod error;
pub use error::{ApiError, ErrorBody};

mod wire;
pub use wire::{LaunchRequest, SubmitResponse, UnregisterRequest};

#[cfg(feature = "server")]
mod http;
#[cfg(feature = "server")]
pub use http::{ClusterService, HttpApi};

#[cfg(feature = "server")]
pub use axum;

#[cfg(feature = "client")]
mod client;
#[cfg(feature = "client")]
pub use client::{RemoteConfig, RemoteCoordinator};
