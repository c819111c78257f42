use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use puffsync::device::command::DeviceCommand;
use puffsync::device::handshake::{derive_key, HANDSHAKE_SECRET};
use puffsync::device::sim::SimulatedDevice;
use puffsync::device::telemetry::{PollIntervals, TelemetryAggregator, TelemetryState};
use puffsync::device::{characteristic, AttributeId};
use puffsync::error::{DeviceError, HandshakeStep};
use puffsync::models::device::{ChargeSource, DeviceState, LedColor};

fn attr(suffix: u8) -> AttributeId {
    AttributeId::from_suffix(suffix)
}

fn le(value: f32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Let every runnable task finish, then collect what reached the stream.
async fn settle(deltas: &mut mpsc::UnboundedReceiver<DeviceState>) -> Vec<DeviceState> {
    tokio::time::sleep(Duration::from_millis(10)).await;
    let mut out = Vec::new();
    while let Ok(delta) = deltas.try_recv() {
        out.push(delta);
    }
    out
}

async fn polling_session(
    device: SimulatedDevice,
) -> (
    Arc<SimulatedDevice>,
    TelemetryAggregator<SimulatedDevice>,
    mpsc::UnboundedReceiver<DeviceState>,
) {
    let device = Arc::new(device);
    let mut aggregator = TelemetryAggregator::new(device.clone());
    aggregator.handshake().await.unwrap();
    let deltas = aggregator.start_polling(&PollIntervals::default()).unwrap();
    (device, aggregator, deltas)
}

#[tokio::test]
async fn test_handshake_writes_derived_key() {
    let device = Arc::new(SimulatedDevice::with_seed([0xa5; 16]));
    let mut aggregator = TelemetryAggregator::new(device.clone());

    aggregator.handshake().await.unwrap();

    assert!(device.is_authenticated());
    assert_eq!(aggregator.state(), TelemetryState::Authenticated);
    let writes = device.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, attr(characteristic::ACCESS_KEY));
    assert_eq!(writes[0].1, derive_key(&HANDSHAKE_SECRET, &[0xa5; 16]).to_vec());
}

#[tokio::test]
async fn test_handshake_failure_is_returned_and_blocks_polling() {
    let device = Arc::new(SimulatedDevice::new().with_secret([9; 16]));
    let mut aggregator = TelemetryAggregator::new(device.clone());

    match aggregator.handshake().await {
        Err(DeviceError::HandshakeFailed { step, .. }) => assert_eq!(step, HandshakeStep::WriteKey),
        other => panic!("expected handshake failure, got {other:?}"),
    }
    assert_eq!(aggregator.state(), TelemetryState::Idle);
    assert!(matches!(
        aggregator.start_polling(&PollIntervals::default()),
        Err(DeviceError::NotAuthenticated)
    ));

    // The caller may retry with the right secret.
    let mut aggregator = TelemetryAggregator::new(device.clone()).with_secret([9; 16]);
    aggregator.handshake().await.unwrap();
    assert!(device.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_first_readings_fill_the_snapshot() {
    let (_device, aggregator, mut deltas) =
        polling_session(SimulatedDevice::new().with_defaults()).await;

    let first = settle(&mut deltas).await;
    assert_eq!(first.len(), 8);
    assert_eq!(aggregator.active_pollers(), 8);

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.battery, Some(87));
    assert_eq!(snapshot.charge_source, Some(ChargeSource::None));
    assert_eq!(snapshot.state, Some(5));
    assert_eq!(snapshot.temperature, Some(72));
    assert_eq!(snapshot.total_dabs, Some(1234));
    assert_eq!(snapshot.active_color, Some(LedColor { r: 0, g: 128, b: 255 }));
    assert_eq!(snapshot.profile_name.as_deref(), Some("Standard"));
    assert_eq!(snapshot.device_name.as_deref(), Some("Simulated Peak"));

    // Unchanged values stay quiet on later cycles.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(settle(&mut deltas).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_temperature_is_suppressed() {
    let device = SimulatedDevice::new().with_defaults();
    device.script_reads(
        &attr(characteristic::HEATER_TEMP),
        vec![Ok(le(380.0)), Ok(vec![0, 128, 187, 68]), Ok(vec![0, 0, 200, 67])],
    );
    device.set_float(&attr(characteristic::HEATER_TEMP), 400.0);
    let (_device, aggregator, mut deltas) = polling_session(device).await;

    let first = settle(&mut deltas).await;
    assert!(first.iter().any(|d| d.temperature == Some(380)));

    // 1500 is rejected: no delta and the snapshot keeps 380.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(settle(&mut deltas).await.is_empty());
    assert_eq!(aggregator.snapshot().temperature, Some(380));

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        settle(&mut deltas).await,
        vec![DeviceState {
            temperature: Some(400),
            ..Default::default()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_read_only_skips_its_own_attribute() {
    let device = SimulatedDevice::new().with_defaults();
    device.script_reads(
        &attr(characteristic::OPERATING_STATE),
        vec![Err(DeviceError::Link("gatt busy".into()))],
    );
    let (_device, aggregator, mut deltas) = polling_session(device).await;

    let first = settle(&mut deltas).await;
    assert_eq!(first.len(), 7);
    assert_eq!(aggregator.snapshot().state, None);
    assert_eq!(aggregator.active_pollers(), 8);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        settle(&mut deltas).await,
        vec![DeviceState {
            state: Some(5),
            ..Default::default()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_led_channel_change_is_a_change() {
    let device = SimulatedDevice::new().with_defaults();
    let (device, aggregator, mut deltas) = polling_session(device).await;
    settle(&mut deltas).await;

    device.set_value(&attr(characteristic::ACTIVE_LED_COLOR), vec![0, 128, 254, 0]);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        settle(&mut deltas).await,
        vec![DeviceState {
            active_color: Some(LedColor { r: 0, g: 128, b: 254 }),
            ..Default::default()
        }]
    );
    drop(aggregator);
}

#[tokio::test(start_paused = true)]
async fn test_command_changes_operating_state() {
    let (device, aggregator, mut deltas) =
        polling_session(SimulatedDevice::new().with_defaults()).await;
    settle(&mut deltas).await;

    aggregator.send_command(DeviceCommand::HeatCycleBegin).await.unwrap();
    assert_eq!(
        device.writes().last(),
        Some(&(attr(characteristic::COMMAND), vec![0, 0, 224, 64]))
    );

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        settle(&mut deltas).await,
        vec![DeviceState {
            state: Some(7),
            ..Default::default()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_every_poller_and_allows_restart() {
    let (device, mut aggregator, mut deltas) =
        polling_session(SimulatedDevice::new().with_defaults()).await;
    settle(&mut deltas).await;
    let battery_reads = device.read_count(&attr(characteristic::BATTERY_SOC));

    aggregator.stop();
    aggregator.stop();
    assert_eq!(aggregator.state(), TelemetryState::Idle);
    assert_eq!(aggregator.active_pollers(), 0);

    device.set_float(&attr(characteristic::HEATER_TEMP), 500.0);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(settle(&mut deltas).await.is_empty());
    assert_eq!(
        device.read_count(&attr(characteristic::BATTERY_SOC)),
        battery_reads
    );
    assert!(matches!(
        aggregator.send_command(DeviceCommand::Idle).await,
        Err(DeviceError::NotAuthenticated)
    ));

    aggregator.handshake().await.unwrap();
    let mut deltas = aggregator.start_polling(&PollIntervals::default()).unwrap();
    let restarted = settle(&mut deltas).await;
    assert!(restarted.iter().any(|d| d.temperature == Some(500)));
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_reads() {
    let device = SimulatedDevice::new().with_defaults();
    let gate = device.hold_reads(&attr(characteristic::DEVICE_NAME));
    let (_device, mut aggregator, mut deltas) = polling_session(device).await;

    let first = settle(&mut deltas).await;
    assert_eq!(first.len(), 7);

    aggregator.stop();
    gate.add_permits(4);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(settle(&mut deltas).await.is_empty());
    assert_eq!(aggregator.snapshot().device_name, None);
}

#[tokio::test]
async fn test_disconnect_releases_link() {
    let (device, mut aggregator, _deltas) =
        polling_session(SimulatedDevice::new().with_defaults()).await;

    aggregator.disconnect().await;
    assert!(!device.is_connected());
    assert_eq!(aggregator.state(), TelemetryState::Idle);
    assert!(aggregator.handshake().await.is_err());
}
