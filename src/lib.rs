//! Gatus Ingress Operator: keeps a Gatus deployment in sync with cluster Ingresses
//!
//! This crate watches `networking.k8s.io/v1` Ingresses, derives a Gatus
//! configuration with one endpoint per routed path, and redeploys the Gatus
//! Helm chart whenever that configuration changes.

pub mod controller;
pub mod error;
pub mod settings;
pub mod values;

pub use crate::error::{Error, Result};
