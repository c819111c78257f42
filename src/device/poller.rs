use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::decode::Decode;
use super::{AttributeId, DeviceLink};
use crate::lock;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10_000);

/// Emitted for every accepted reading (`Data`) and, after the first
/// reading, whenever the decoded value differs from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum PollerEvent<V> {
    Data { value: V, raw: Vec<u8> },
    Change { value: V, raw: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct Subscription<V> {
    pub attribute: AttributeId,
    pub interval: Duration,
    pub last_value: Option<V>,
    /// Cleared once by `stop`, never set again.
    pub active: bool,
}

/// Type-erased control surface so one owner can stop pollers of mixed
/// value types.
pub trait PollHandle: Send + Sync {
    fn stop(&self);
    fn is_active(&self) -> bool;
    fn attribute(&self) -> &AttributeId;
}

/// Periodically reads one attribute and reports decoded values.
pub struct AttributePoller<V> {
    attribute: AttributeId,
    subscription: Arc<Mutex<Subscription<V>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<V> AttributePoller<V>
where
    V: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
    /// Begin polling. The first read happens immediately, then every
    /// `interval` (default [`DEFAULT_INTERVAL`]). Must be called from within
    /// a tokio runtime.
    pub fn start<L, D>(
        link: Arc<L>,
        attribute: AttributeId,
        interval: Option<Duration>,
        decoder: D,
    ) -> (Self, mpsc::UnboundedReceiver<PollerEvent<V>>)
    where
        L: DeviceLink + ?Sized,
        D: Decode<Value = V>,
    {
        let interval = interval.unwrap_or(DEFAULT_INTERVAL);
        let subscription = Arc::new(Mutex::new(Subscription {
            attribute: attribute.clone(),
            interval,
            last_value: None,
            active: true,
        }));
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(poll_loop(
            link,
            attribute.clone(),
            interval,
            decoder,
            subscription.clone(),
            tx,
        ));
        tracing::debug!("polling {attribute} every {interval:?}");

        (
            Self {
                attribute,
                subscription,
                task: Mutex::new(Some(task)),
            },
            rx,
        )
    }

    pub fn last_value(&self) -> Option<V> {
        lock(&self.subscription).last_value.clone()
    }

    pub fn interval(&self) -> Duration {
        lock(&self.subscription).interval
    }
}

impl<V: Send> PollHandle for AttributePoller<V> {
    /// Idempotent. Once this returns no further events are sent, including
    /// for a read that was already in flight.
    fn stop(&self) {
        {
            let mut subscription = lock(&self.subscription);
            if subscription.active {
                subscription.active = false;
                tracing::debug!("stopped polling {}", self.attribute);
            }
        }
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }

    fn is_active(&self) -> bool {
        lock(&self.subscription).active
    }

    fn attribute(&self) -> &AttributeId {
        &self.attribute
    }
}

impl<V> Drop for AttributePoller<V> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

async fn poll_loop<L, D, V>(
    link: Arc<L>,
    attribute: AttributeId,
    interval: Duration,
    decoder: D,
    subscription: Arc<Mutex<Subscription<V>>>,
    tx: mpsc::UnboundedSender<PollerEvent<V>>,
) where
    L: DeviceLink + ?Sized,
    D: Decode<Value = V>,
    V: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !lock(&subscription).active {
            break;
        }

        // A failed read or decode skips this cycle only.
        let raw = match link.read(&attribute).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("read of {attribute} failed: {e}");
                continue;
            }
        };
        let value = match decoder.decode(&raw) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("could not decode {attribute}: {e}");
                continue;
            }
        };

        let mut current = lock(&subscription);
        if !current.active {
            break;
        }
        let changed = matches!(&current.last_value, Some(previous) if *previous != value);
        current.last_value = Some(value.clone());

        if changed {
            tracing::trace!("{attribute} changed to {value:?}");
        }
        let data = PollerEvent::Data {
            value: value.clone(),
            raw: raw.clone(),
        };
        if tx.send(data).is_err() {
            tracing::debug!("no receiver for {attribute}, ending poll loop");
            break;
        }
        if changed {
            let _ = tx.send(PollerEvent::Change { value, raw });
        }
    }
}
