//! In-process peripheral for host-side runs and tests. Behaves like the
//! real device as far as the client can observe: it hands out a random seed
//! on the access attribute, checks the derived key written back, and refuses
//! every other read until that check has passed.

use futures_util::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use super::handshake::{derive_key, HANDSHAKE_SECRET, KEY_LEN};
use super::{characteristic, AttributeId, DeviceLink};
use crate::error::DeviceError;
use crate::lock;

#[derive(Default)]
struct SimState {
    authenticated: bool,
    connected: bool,
    values: HashMap<AttributeId, Vec<u8>>,
    scripted: HashMap<AttributeId, VecDeque<Result<Vec<u8>, DeviceError>>>,
    gates: HashMap<AttributeId, Arc<Semaphore>>,
    read_counts: HashMap<AttributeId, usize>,
    writes: Vec<(AttributeId, Vec<u8>)>,
}

pub struct SimulatedDevice {
    seed: [u8; KEY_LEN],
    secret: [u8; KEY_LEN],
    state: Mutex<SimState>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// Fresh device with a random seed and the stock secret.
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub fn with_seed(seed: [u8; KEY_LEN]) -> Self {
        Self {
            seed,
            secret: HANDSHAKE_SECRET,
            state: Mutex::new(SimState {
                connected: true,
                ..SimState::default()
            }),
        }
    }

    /// Device firmware that expects a different secret.
    pub fn with_secret(mut self, secret: [u8; KEY_LEN]) -> Self {
        self.secret = secret;
        self
    }

    /// Plausible values for every polled attribute.
    pub fn with_defaults(self) -> Self {
        let float = |suffix: u8, value: f32| (AttributeId::from_suffix(suffix), value.to_le_bytes().to_vec());
        {
            let mut state = lock(&self.state);
            for (attribute, raw) in [
                float(characteristic::BATTERY_SOC, 87.0),
                float(characteristic::BATTERY_CHARGE_SOURCE, 3.0),
                float(characteristic::OPERATING_STATE, 5.0),
                float(characteristic::HEATER_TEMP, 72.0),
                (
                    AttributeId::from_suffix(characteristic::TOTAL_HEAT_CYCLES),
                    1234f32.to_le_bytes().to_vec(),
                ),
                (
                    AttributeId::from_suffix(characteristic::ACTIVE_LED_COLOR),
                    vec![0, 128, 255, 0],
                ),
                (
                    AttributeId::from_suffix(characteristic::PROFILE_NAME),
                    b"Standard".to_vec(),
                ),
                (
                    AttributeId::from_suffix(characteristic::DEVICE_NAME),
                    b"Simulated Peak\0".to_vec(),
                ),
            ] {
                state.values.insert(attribute, raw);
            }
        }
        self
    }

    pub fn seed(&self) -> [u8; KEY_LEN] {
        self.seed
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.state).authenticated
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Skip the handshake, for tests that only exercise polling.
    pub fn force_authenticated(&self) {
        lock(&self.state).authenticated = true;
    }

    pub fn set_value(&self, attribute: &AttributeId, raw: Vec<u8>) {
        lock(&self.state).values.insert(attribute.clone(), raw);
    }

    pub fn set_float(&self, attribute: &AttributeId, value: f32) {
        self.set_value(attribute, value.to_le_bytes().to_vec());
    }

    /// Queue results returned, in order, ahead of the stored value.
    pub fn script_reads(
        &self,
        attribute: &AttributeId,
        reads: impl IntoIterator<Item = Result<Vec<u8>, DeviceError>>,
    ) {
        lock(&self.state)
            .scripted
            .entry(attribute.clone())
            .or_default()
            .extend(reads);
    }

    /// Park reads of `attribute` until permits are added to the returned
    /// semaphore, one permit per read.
    pub fn hold_reads(&self, attribute: &AttributeId) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        lock(&self.state)
            .gates
            .insert(attribute.clone(), gate.clone());
        gate
    }

    /// Completed reads of `attribute`.
    pub fn read_count(&self, attribute: &AttributeId) -> usize {
        lock(&self.state)
            .read_counts
            .get(attribute)
            .copied()
            .unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<(AttributeId, Vec<u8>)> {
        lock(&self.state).writes.clone()
    }

    async fn read_attribute(&self, attribute: &AttributeId) -> Result<Vec<u8>, DeviceError> {
        if attribute.as_str() == AttributeId::from_suffix(characteristic::ACCESS_KEY).as_str() {
            return Ok(self.seed.to_vec());
        }

        let gate = {
            let state = lock(&self.state);
            if !state.connected {
                return Err(DeviceError::Link("not connected".into()));
            }
            if !state.authenticated {
                return Err(DeviceError::Link(format!("read of {attribute} refused")));
            }
            state.gates.get(attribute).cloned()
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| DeviceError::Link("read gate closed".into()))?
                .forget();
        }

        let mut state = lock(&self.state);
        *state.read_counts.entry(attribute.clone()).or_default() += 1;
        if let Some(next) = state.scripted.get_mut(attribute).and_then(VecDeque::pop_front) {
            return next;
        }
        state
            .values
            .get(attribute)
            .cloned()
            .ok_or_else(|| DeviceError::Link(format!("unknown attribute {attribute}")))
    }

    fn write_attribute(&self, attribute: &AttributeId, value: &[u8]) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(DeviceError::Link("not connected".into()));
        }
        state.writes.push((attribute.clone(), value.to_vec()));

        if attribute.as_str() == AttributeId::from_suffix(characteristic::ACCESS_KEY).as_str() {
            if value != derive_key(&self.secret, &self.seed).as_slice() {
                return Err(DeviceError::Link("access key rejected".into()));
            }
            state.authenticated = true;
            return Ok(());
        }
        if !state.authenticated {
            return Err(DeviceError::Link(format!("write to {attribute} refused")));
        }

        // A command word is the target operating state as a float.
        if attribute.as_str() == AttributeId::from_suffix(characteristic::COMMAND).as_str() {
            state.values.insert(
                AttributeId::from_suffix(characteristic::OPERATING_STATE),
                value.to_vec(),
            );
        }
        state.values.insert(attribute.clone(), value.to_vec());
        Ok(())
    }
}

impl DeviceLink for SimulatedDevice {
    fn read<'a>(&'a self, attribute: &'a AttributeId) -> BoxFuture<'a, Result<Vec<u8>, DeviceError>> {
        Box::pin(self.read_attribute(attribute))
    }

    fn write<'a>(
        &'a self,
        attribute: &'a AttributeId,
        value: &'a [u8],
    ) -> BoxFuture<'a, Result<(), DeviceError>> {
        Box::pin(async move { self.write_attribute(attribute, value) })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.connected = false;
            state.authenticated = false;
        })
    }
}
