//! Controller module for the Gatus release
//! This module contains the reconciliation loop, configuration derivation
//! and the collaborators it drives (Ingress watch, helm).

pub mod change;
pub mod endpoints;
pub mod helm;
pub mod merge;
mod reconciler;
pub mod routes;
pub mod watch;

pub use change::ChangeDetector;
pub use endpoints::derive_endpoints;
pub use helm::{DryRunRelease, Helm, ReleaseMechanism, ReleaseOutcome};
pub use merge::{merge, parse_override};
pub use reconciler::{LoopState, Reconciler};
pub use routes::{IngressSource, RoutePath, RouteResource, RouteRule, RouteSource, RouteSpec};
pub use watch::{notice_channel, pump_ingress_events, NoticeReceiver, NoticeSender, WatchNotice};
