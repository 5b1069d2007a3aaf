//! Periodic delivery of pending state changes.
//!
//! One task per evented service wakes up at a fixed interval, drains the
//! service's pending [`ChangeEvent`]s and hands them to an
//! [`EventTransport`]. A failing tick is logged and the loop goes on; only
//! the cancellation token stops it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    errors::RendererError,
    lastchange::LastChangeBatch,
    model::ChangeEvent,
};

/// A service whose state changes are pushed to subscribers.
pub trait EventedService: Send + Sync {
    fn service_name(&self) -> &str;

    /// Namespace of the service's LastChange document.
    fn lastchange_namespace(&self) -> &str;

    /// Takes every pending change. Each change is returned exactly once.
    fn drain_events(&self) -> Result<Vec<ChangeEvent>, RendererError>;
}

/// The eventing side of the UPnP stack.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn deliver(&self, batch: LastChangeBatch) -> anyhow::Result<()>;
}

/// Forwards batches to an in-process channel.
pub struct ChannelTransport {
    sender: mpsc::Sender<LastChangeBatch>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<LastChangeBatch>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventTransport for ChannelTransport {
    async fn deliver(&self, batch: LastChangeBatch) -> anyhow::Result<()> {
        self.sender
            .send(batch)
            .await
            .map_err(|_| anyhow::anyhow!("event receiver is gone"))
    }
}

pub struct ChangeNotifier {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeNotifier {
    /// Starts one loop per service. Must be called within a Tokio runtime.
    pub fn start(
        services: Vec<Arc<dyn EventedService>>,
        transport: Arc<dyn EventTransport>,
        interval: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let tasks = services
            .into_iter()
            .map(|service| {
                tokio::spawn(run_service_loop(
                    service,
                    transport.clone(),
                    interval,
                    token.child_token(),
                ))
            })
            .collect();
        Self { token, tasks }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancels every loop and waits for them to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                error!("Notifier task ended abnormally: {}", err);
            }
        }
        info!("Notifier stopped");
    }
}

async fn run_service_loop(
    service: Arc<dyn EventedService>,
    transport: Arc<dyn EventTransport>,
    interval: Duration,
    token: CancellationToken,
) {
    let name = service.service_name().to_string();
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(service = %name, "✅ Starting notifier every {:?}", interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => flush_once(&service, transport.as_ref(), &name).await,
        }
    }

    debug!(service = %name, "Notifier loop exited");
}

async fn flush_once(service: &Arc<dyn EventedService>, transport: &dyn EventTransport, name: &str) {
    // Draining takes the service lock, which may wait on a slow engine.
    let drained = {
        let service = service.clone();
        tokio::task::spawn_blocking(move || service.drain_events()).await
    };

    let events = match drained {
        Ok(Ok(events)) => events,
        Ok(Err(err)) => {
            warn!(service = %name, "Cannot drain events: {}", err);
            return;
        }
        Err(err) => {
            error!(service = %name, "Event drain panicked: {}", err);
            return;
        }
    };

    if events.is_empty() {
        return;
    }

    let batch = LastChangeBatch {
        service: name.to_string(),
        namespace: service.lastchange_namespace().to_string(),
        events,
    };
    debug!(service = %name, count = batch.events.len(), "Delivering LastChange");

    if let Err(err) = transport.deliver(batch).await {
        error!(service = %name, "Event delivery failed: {:#}", err);
    }
}
