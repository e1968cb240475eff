//! End-to-end sessions against the in-process simulator

mod common;

use common::*;
use roomba_oi::sensor::{
    BUMPS_WHEEL_DROPS, CLIFF_FRONT_LEFT_SIGNAL, REQUESTED_RADIUS, REQUESTED_VELOCITY, VIRTUAL_WALL,
};
use roomba_oi::sim::{SimConfig, Simulator};
use roomba_oi::{ChecksumMode, Mode, SensorReading};

fn sim_driver(config: SimConfig) -> (Simulator, Roomba<tokio::io::DuplexStream>) {
    let (sim, link) = Simulator::spawn(config);
    (sim, Roomba::with_config(link, DriverConfig::default()))
}

#[tokio::test]
async fn control_drive_and_query() {
    let (sim, mut roomba) = sim_driver(SimConfig::default());

    roomba.control().await.unwrap();
    roomba.drive(-200, 500).await.unwrap();

    let payloads = roomba.query_list(&[BUMPS_WHEEL_DROPS, VIRTUAL_WALL]).await.unwrap();
    assert_eq!(payloads, vec![Bytes::from_static(&[3]), Bytes::from_static(&[5])]);

    assert_eq!(roomba.sensor_reading(REQUESTED_VELOCITY).await.unwrap(), SensorReading::I16(-200));
    assert_eq!(roomba.sensor_reading(REQUESTED_RADIUS).await.unwrap(), SensorReading::I16(500));
    assert_eq!(roomba.query_mode().await.unwrap(), Mode::Safe);
    assert_eq!(sim.mode(), Mode::Safe);

    assert_eq!(sim.received()[..7], [128, 130, 137, 255, 56, 1, 244]);
}

#[tokio::test]
async fn stream_then_pause_then_query() {
    let (sim, mut roomba) = sim_driver(SimConfig::default());
    roomba.start().await.unwrap();

    let mut session = roomba.stream(&[CLIFF_FRONT_LEFT_SIGNAL, VIRTUAL_WALL]).await.unwrap();
    for _ in 0..3 {
        let frame = session.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.get(CLIFF_FRONT_LEFT_SIGNAL), Some(&Bytes::from_static(&[2, 25])));
        assert_eq!(frame.get(VIRTUAL_WALL), Some(&Bytes::from_static(&[5])));
    }
    session.close().await;
    assert!(eventually(|| !sim.is_streaming()).await);

    // Frames in flight at pause time were drained, so the reply lines up.
    assert_eq!(roomba.query_mode().await.unwrap(), Mode::Passive);
}

#[tokio::test]
async fn mismatched_checksum_mode_is_reported() {
    let config = SimConfig {
        checksum: ChecksumMode::IncludeMarker,
        ..SimConfig::default()
    };
    let (_sim, mut roomba) = sim_driver(config);

    let mut session = roomba.stream(&[VIRTUAL_WALL]).await.unwrap();
    assert!(matches!(
        session.next_frame().await.unwrap(),
        Err(OiError::Protocol(ProtocolError::Checksum { .. }))
    ));
    session.close().await;
}

#[tokio::test]
async fn include_marker_on_both_ends() {
    let config = SimConfig {
        checksum: ChecksumMode::IncludeMarker,
        ..SimConfig::default()
    };
    let (sim, link) = Simulator::spawn(config);
    let mut roomba = Roomba::with_config(link, DriverConfig::default().with_checksum(ChecksumMode::IncludeMarker));
    sim.set_value(VIRTUAL_WALL, vec![1u8]);

    let mut session = roomba.stream(&[VIRTUAL_WALL]).await.unwrap();
    let frame = session.next_frame().await.unwrap().unwrap();
    assert_eq!(frame.readings().unwrap(), vec![(VIRTUAL_WALL, SensorReading::Bool(true))]);
    session.close().await;
}

#[tokio::test]
async fn stop_turns_the_simulator_off() {
    let (sim, mut roomba) = sim_driver(SimConfig::default());
    roomba.full().await.unwrap();
    roomba.stop().await.unwrap();
    assert_eq!(roomba.mode(), Mode::Off);
    assert_eq!(roomba.query_mode().await.unwrap(), Mode::Off);
    assert_eq!(sim.mode(), Mode::Off);
}
