use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::command::DeviceCommand;
use super::decode::{
    ChargeSourceDecoder, CounterDecoder, Decode, LedColorDecoder, NameDecoder,
    OperatingStateDecoder, PercentDecoder, TemperatureDecoder,
};
use super::handshake::{authenticate, HANDSHAKE_SECRET, KEY_LEN};
use super::poller::{AttributePoller, PollHandle, PollerEvent, DEFAULT_INTERVAL};
use super::{characteristic, AttributeId, DeviceLink};
use crate::error::DeviceError;
use crate::lock;
use crate::models::device::DeviceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryState {
    Idle,
    Authenticated,
    Polling,
}

/// Per-attribute poll periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollIntervals {
    pub charge_source: Duration,
    pub battery: Duration,
    pub operating_state: Duration,
    pub led_color: Duration,
    pub total_dabs: Duration,
    pub temperature: Duration,
    pub profile_name: Duration,
    pub device_name: Duration,
}

impl PollIntervals {
    /// Stock schedule, with `default` for the slow-moving attributes.
    pub fn with_default(default: Duration) -> Self {
        Self {
            charge_source: Duration::from_millis(5000),
            battery: default,
            operating_state: Duration::from_millis(1000),
            led_color: Duration::from_millis(1000),
            total_dabs: default,
            temperature: Duration::from_millis(1000),
            profile_name: default,
            device_name: default,
        }
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self::with_default(DEFAULT_INTERVAL)
    }
}

/// Snapshot plus the gate that closes the delta stream on stop.
#[derive(Default)]
struct FanIn {
    snapshot: DeviceState,
    open: bool,
}

/// One authenticated device session and the pollers reading from it.
pub struct TelemetryAggregator<L: DeviceLink + ?Sized> {
    link: Arc<L>,
    secret: [u8; KEY_LEN],
    state: TelemetryState,
    fan_in: Arc<Mutex<FanIn>>,
    pollers: Vec<Box<dyn PollHandle>>,
    forwarders: Vec<JoinHandle<()>>,
    // Held across a command write so writes to the command attribute never overlap.
    command_lock: tokio::sync::Mutex<()>,
}

impl<L: DeviceLink + ?Sized> TelemetryAggregator<L> {
    pub fn new(link: Arc<L>) -> Self {
        Self {
            link,
            secret: HANDSHAKE_SECRET,
            state: TelemetryState::Idle,
            fan_in: Arc::new(Mutex::new(FanIn::default())),
            pollers: Vec::new(),
            forwarders: Vec::new(),
            command_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_secret(mut self, secret: [u8; KEY_LEN]) -> Self {
        self.secret = secret;
        self
    }

    pub fn state(&self) -> TelemetryState {
        self.state
    }

    pub fn link(&self) -> &Arc<L> {
        &self.link
    }

    /// Everything observed since polling started.
    pub fn snapshot(&self) -> DeviceState {
        lock(&self.fan_in).snapshot.clone()
    }

    pub fn active_pollers(&self) -> usize {
        self.pollers.iter().filter(|p| p.is_active()).count()
    }

    /// Authenticate the session. Restarts from scratch if a session was
    /// already running. On failure the aggregator is left idle and the
    /// error returned; retrying is up to the caller.
    pub async fn handshake(&mut self) -> Result<(), DeviceError> {
        if self.state != TelemetryState::Idle {
            self.stop();
        }
        match authenticate(self.link.as_ref(), &self.secret).await {
            Ok(()) => {
                tracing::info!("device handshake complete");
                self.state = TelemetryState::Authenticated;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("device handshake failed: {e}");
                self.state = TelemetryState::Idle;
                Err(e)
            }
        }
    }

    /// Start every attribute poller and return the merged delta stream.
    /// Each delta holds only the fields that changed.
    pub fn start_polling(
        &mut self,
        intervals: &PollIntervals,
    ) -> Result<mpsc::UnboundedReceiver<DeviceState>, DeviceError> {
        match self.state {
            TelemetryState::Authenticated => {}
            TelemetryState::Idle => return Err(DeviceError::NotAuthenticated),
            TelemetryState::Polling => self.stop_pollers(),
        }

        *lock(&self.fan_in) = FanIn {
            snapshot: DeviceState::default(),
            open: true,
        };
        let (tx, rx) = mpsc::unbounded_channel();

        self.attach(
            characteristic::BATTERY_CHARGE_SOURCE,
            intervals.charge_source,
            ChargeSourceDecoder,
            &tx,
            |v| DeviceState {
                charge_source: Some(v),
                ..Default::default()
            },
        );
        self.attach(
            characteristic::BATTERY_SOC,
            intervals.battery,
            PercentDecoder,
            &tx,
            |v| DeviceState {
                battery: Some(v),
                ..Default::default()
            },
        );
        self.attach(
            characteristic::OPERATING_STATE,
            intervals.operating_state,
            OperatingStateDecoder,
            &tx,
            |v| DeviceState {
                state: Some(v),
                ..Default::default()
            },
        );
        self.attach(
            characteristic::ACTIVE_LED_COLOR,
            intervals.led_color,
            LedColorDecoder,
            &tx,
            |v| DeviceState {
                active_color: Some(v),
                ..Default::default()
            },
        );
        self.attach(
            characteristic::TOTAL_HEAT_CYCLES,
            intervals.total_dabs,
            CounterDecoder,
            &tx,
            |v| DeviceState {
                total_dabs: Some(v),
                ..Default::default()
            },
        );
        self.attach(
            characteristic::HEATER_TEMP,
            intervals.temperature,
            TemperatureDecoder::default(),
            &tx,
            |v| DeviceState {
                temperature: Some(v),
                ..Default::default()
            },
        );
        self.attach(
            characteristic::PROFILE_NAME,
            intervals.profile_name,
            NameDecoder,
            &tx,
            |v| DeviceState {
                profile_name: Some(v),
                ..Default::default()
            },
        );
        self.attach(
            characteristic::DEVICE_NAME,
            intervals.device_name,
            NameDecoder,
            &tx,
            |v| DeviceState {
                device_name: Some(v),
                ..Default::default()
            },
        );

        self.state = TelemetryState::Polling;
        tracing::info!("polling {} device attributes", self.pollers.len());
        Ok(rx)
    }

    fn attach<D, F>(
        &mut self,
        suffix: u8,
        interval: Duration,
        decoder: D,
        out: &mpsc::UnboundedSender<DeviceState>,
        into_delta: F,
    ) where
        D: Decode,
        F: Fn(D::Value) -> DeviceState + Send + 'static,
    {
        let (poller, mut events) = AttributePoller::start(
            self.link.clone(),
            AttributeId::from_suffix(suffix),
            Some(interval),
            decoder,
        );
        let fan_in = self.fan_in.clone();
        let out = out.clone();

        self.forwarders.push(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                // Every accepted reading arrives as Data; the merge decides
                // whether anything changed.
                let PollerEvent::Data { value, .. } = event else {
                    continue;
                };
                let delta = into_delta(value);
                let mut merged = lock(&fan_in);
                if !merged.open {
                    break;
                }
                let changed = merged.snapshot.merge(&delta);
                if !changed.is_empty() && out.send(changed).is_err() {
                    break;
                }
            }
        }));
        self.pollers.push(Box::new(poller));
    }

    /// Write a command word. Requires an authenticated session.
    pub async fn send_command(&self, command: DeviceCommand) -> Result<(), DeviceError> {
        if self.state == TelemetryState::Idle {
            return Err(DeviceError::NotAuthenticated);
        }
        let _guard = self.command_lock.lock().await;
        tracing::debug!("sending {command:?}");
        self.link
            .write(&AttributeId::from_suffix(characteristic::COMMAND), &command.word())
            .await
    }

    fn stop_pollers(&mut self) {
        lock(&self.fan_in).open = false;
        for poller in self.pollers.drain(..) {
            poller.stop();
        }
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
    }

    /// Halt every poller and return to idle. Idempotent, and safe before
    /// any handshake. Nothing is emitted on the delta stream afterwards.
    pub fn stop(&mut self) {
        self.stop_pollers();
        if self.state != TelemetryState::Idle {
            tracing::info!("device telemetry stopped");
        }
        self.state = TelemetryState::Idle;
    }

    /// `stop` and release the underlying link.
    pub async fn disconnect(&mut self) {
        self.stop();
        self.link.disconnect().await;
    }
}

impl<L: DeviceLink + ?Sized> Drop for TelemetryAggregator<L> {
    fn drop(&mut self) {
        self.stop_pollers();
    }
}
