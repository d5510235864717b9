//! Endpoint derivation from Ingress routes
//!
//! Every (Ingress, rule, path) triple becomes one Gatus endpoint. Output order
//! follows input order; duplicates are kept.

use crate::values::{DefaultsTemplate, EndpointRecord};

use super::routes::RouteResource;

/// Map a snapshot of routing resources to monitor endpoints.
///
/// Resources without a spec, rules without a host (catch-all rules give no
/// probeable URL), rules without an HTTP block or paths, and empty paths
/// contribute nothing. Every record links to `defaults`.
pub fn derive_endpoints(
    resources: &[RouteResource],
    defaults: &DefaultsTemplate,
) -> Vec<EndpointRecord> {
    let mut endpoints = Vec::new();

    for resource in resources {
        let Some(spec) = &resource.spec else {
            continue;
        };
        let protocol = if spec.encrypted { "https" } else { "http" };

        for rule in spec.rules.iter().filter(|rule| !rule.host.is_empty()) {
            let Some(paths) = rule.paths.as_deref() else {
                continue;
            };

            for path in paths.iter().filter_map(|p| p.0.as_deref()) {
                if path.is_empty() {
                    continue;
                }

                let url = format!("{}://{}{}", protocol, rule.host, path);
                endpoints.push(EndpointRecord {
                    name: format!("{}: {}", resource.namespace, url),
                    group: resource.namespace.clone(),
                    url,
                    defaults: defaults.link(),
                });
            }
        }
    }

    endpoints
}
