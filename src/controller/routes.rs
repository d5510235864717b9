//! Ingress routing resources as seen by the reconciler
//!
//! Each pass reads the full list of Ingresses and reduces every object to the
//! handful of fields endpoint derivation needs.

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::{Api, ListParams},
    ResourceExt,
};
use tracing::debug;

use crate::error::Result;

/// A single path of an Ingress rule; `None` when the path is unset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePath(pub Option<String>);

/// One host rule of an Ingress
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRule {
    pub host: String,
    /// `None` when the rule has no HTTP block
    pub paths: Option<Vec<RoutePath>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSpec {
    /// Any TLS section is declared on the Ingress
    pub encrypted: bool,
    pub rules: Vec<RouteRule>,
}

/// Read-only view of an Ingress
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteResource {
    pub namespace: String,
    pub spec: Option<RouteSpec>,
}

impl From<&Ingress> for RouteResource {
    fn from(ingress: &Ingress) -> Self {
        let namespace = ingress.namespace().unwrap_or_else(|| "default".to_string());

        let spec = ingress.spec.as_ref().map(|spec| RouteSpec {
            encrypted: spec.tls.as_ref().is_some_and(|tls| !tls.is_empty()),
            rules: spec
                .rules
                .iter()
                .flatten()
                .map(|rule| RouteRule {
                    host: rule.host.clone().unwrap_or_default(),
                    paths: rule.http.as_ref().map(|http| {
                        http.paths
                            .iter()
                            .map(|p| RoutePath(p.path.clone()))
                            .collect()
                    }),
                })
                .collect(),
        });

        Self { namespace, spec }
    }
}

/// Bulk-list side of the upstream watch transport
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// Full current collection of routing resources, in list order
    async fn list_routes(&self) -> Result<Vec<RouteResource>>;
}

/// Lists Ingresses across all namespaces
pub struct IngressSource {
    api: Api<Ingress>,
}

impl IngressSource {
    pub fn new(api: Api<Ingress>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl RouteSource for IngressSource {
    async fn list_routes(&self) -> Result<Vec<RouteResource>> {
        let ingresses = self.api.list(&ListParams::default()).await?;
        debug!("Listed {} Ingresses", ingresses.items.len());
        Ok(ingresses.items.iter().map(RouteResource::from).collect())
    }
}
