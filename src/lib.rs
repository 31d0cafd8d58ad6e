//! Mockable Kubernetes object client
//!
//! Callers depend on the [`ObjectClient`] trait for create, get, update,
//! delete, list and status writes. [`KubeClient`] forwards each call unchanged
//! to a `kube::Client`; [`fake::FakeClient`] serves the same calls from memory
//! in unit tests.

pub mod client;
pub mod config;
pub mod error;
pub mod fake;
pub mod key;

pub use client::{KubeClient, KubeStatusWriter, Object, ObjectClient, StatusWriter, Verb};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use key::ObjectKey;
