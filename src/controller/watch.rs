//! Ingress watch pump
//!
//! Forwards kube watcher events into the reconciler's notification queue.
//! Only the arrival of an event matters; the reconciler re-lists everything.

use futures::StreamExt;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    api::Api,
    runtime::watcher::{self, watcher, Event},
    ResourceExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::Result;

/// Upstream change notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchNotice {
    /// Initial (or re-)listing completed
    Synced,
    /// An Ingress was added or modified
    Applied(String),
    /// An Ingress was deleted
    Deleted(String),
}

/// Receiving side of the notification queue. An `Err` item ends the loop.
pub type NoticeReceiver = mpsc::Receiver<Result<WatchNotice>>;
pub type NoticeSender = mpsc::Sender<Result<WatchNotice>>;

/// Queue depth between the watch pump and the reconciler
pub const NOTICE_QUEUE_DEPTH: usize = 128;

pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    mpsc::channel(NOTICE_QUEUE_DEPTH)
}

/// Notification for a watcher event; per-object events of the initial
/// listing are folded into the single `Synced` notice.
pub fn notice_for(event: &Event<Ingress>) -> Option<WatchNotice> {
    match event {
        Event::Apply(ingress) => Some(WatchNotice::Applied(object_key(ingress))),
        Event::Delete(ingress) => Some(WatchNotice::Deleted(object_key(ingress))),
        Event::InitDone => Some(WatchNotice::Synced),
        Event::Init | Event::InitApply(_) => None,
    }
}

fn object_key(ingress: &Ingress) -> String {
    format!(
        "{}/{}",
        ingress.namespace().unwrap_or_else(|| "default".to_string()),
        ingress.name_any()
    )
}

/// Stream Ingress events across all namespaces into `tx`.
///
/// Returns after forwarding the first watch error or when the receiver is gone.
pub async fn pump_ingress_events(api: Api<Ingress>, tx: NoticeSender) {
    info!("Watching Ingresses in all namespaces");
    let mut events = watcher(api, watcher::Config::default()).boxed();

    while let Some(event) = events.next().await {
        let item = match event {
            Ok(event) => match notice_for(&event) {
                Some(notice) => Ok(notice),
                None => continue,
            },
            Err(e) => {
                error!("Ingress watch failed: {}", e);
                Err(e.into())
            }
        };

        let failed = item.is_err();
        if tx.send(item).await.is_err() {
            debug!("Notification receiver closed, stopping Ingress watch");
            return;
        }
        if failed {
            return;
        }
    }

    info!("Ingress watch stream ended");
}
