//! Two end-to-end scenarios from the tester-core spec: a response-pending
//! (`7F xx 78`) loop that extends the wait with P2* instead of timing out,
//! and the monitor pipeline observing frames flowing over a live ISO-TP
//! exchange.

use std::sync::Arc;
use std::time::Duration;

use uds_diag_core::channel::{CanChannel, CanChannelConfig};
use uds_diag_core::frame::CanFlags;
use uds_diag_core::hardware::loopback::LoopbackBus;
use uds_diag_core::isotp::{IsoTpChannel, LinkConfig};
use uds_diag_core::monitor::{Direction, MonitorPipeline};
use uds_diag_core::uds::routine_control::RoutineControlType;
use uds_diag_core::uds::UdsSessionEngine;

fn build_pair(tester_cfg: LinkConfig, ecu_cfg: LinkConfig) -> (Arc<IsoTpChannel>, Arc<IsoTpChannel>, Arc<dyn CanChannel>) {
    let bus = LoopbackBus::new();
    let mut tester_end = bus.open_channel();
    let mut ecu_end = bus.open_channel();
    tester_end.open(CanChannelConfig::default()).unwrap();
    ecu_end.open(CanChannelConfig::default()).unwrap();
    let tester: Arc<dyn CanChannel> = Arc::new(tester_end);
    let ecu: Arc<dyn CanChannel> = Arc::new(ecu_end);
    (
        Arc::new(IsoTpChannel::new(tester.clone(), tester_cfg).unwrap()),
        Arc::new(IsoTpChannel::new(ecu, ecu_cfg).unwrap()),
        tester,
    )
}

#[test]
fn response_pending_extends_the_wait_instead_of_timing_out() {
    let tester_cfg = LinkConfig {
        rx_id: 0x7E8,
        tx_id: 0x7E0,
        p2_star: Duration::from_secs(2),
        ..Default::default()
    };
    let ecu_cfg = LinkConfig {
        rx_id: 0x7E0,
        tx_id: 0x7E8,
        ..Default::default()
    };
    let (tester_isotp, ecu_isotp, _tester_can) = build_pair(tester_cfg, ecu_cfg);
    let uds = UdsSessionEngine::new(tester_isotp);

    let ecu_thread = std::thread::spawn(move || {
        let request = ecu_isotp.recv_message(Duration::from_secs(1)).unwrap();
        assert_eq!(request, vec![0x31, 0x01, 0xFF, 0x00]);
        for _ in 0..3 {
            ecu_isotp.send_message(vec![0x7F, 0x31, 0x78], |_| {}).unwrap();
            std::thread::sleep(Duration::from_millis(150));
        }
        ecu_isotp.send_message(vec![0x71, 0x01, 0xFF, 0x00], |_| {}).unwrap();
    });

    let response = uds
        .routine_control(RoutineControlType::StartRoutine, 0xFF00, &[], Duration::from_millis(300))
        .unwrap();
    assert!(response.is_positive());
    ecu_thread.join().unwrap();
}

#[test]
fn monitor_pipeline_observes_frames_from_a_live_isotp_exchange() {
    let cfg_a = LinkConfig {
        rx_id: 0x7E8,
        tx_id: 0x7E0,
        ..Default::default()
    };
    let cfg_b = LinkConfig {
        rx_id: 0x7E0,
        tx_id: 0x7E8,
        ..Default::default()
    };
    let (tester_isotp, ecu_isotp, tester_can) = build_pair(cfg_a, cfg_b);

    let pipeline = Arc::new(MonitorPipeline::new(64));
    pipeline.start().unwrap();

    let pipeline_for_sub = pipeline.clone();
    tester_can.subscribe(Box::new(move |frame| {
        pipeline_for_sub.ingest(frame, Direction::Tx, "CAN-0");
    }));

    let ecu_thread = std::thread::spawn(move || {
        let request = ecu_isotp.recv_message(Duration::from_secs(1)).unwrap();
        assert_eq!(request, vec![0x3E, 0x00]);
        ecu_isotp.send_message(vec![0x7E, 0x00], |_| {}).unwrap();
    });

    let uds = UdsSessionEngine::new(tester_isotp);
    let response = uds.tester_present(Duration::from_millis(500)).unwrap();
    assert!(response.is_positive());
    ecu_thread.join().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while pipeline.statistics().total_frames == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    pipeline.stop();

    let stats = pipeline.statistics();
    assert!(stats.total_frames >= 1);
    assert_eq!(stats.tx_frames, stats.total_frames);

    let frames = pipeline.recent_frames(10);
    assert!(!frames.is_empty());
    for frame in &frames {
        assert!(!frame.frame.flags.contains(CanFlags::ERROR));
    }
}
