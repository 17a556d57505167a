use crate::utils::*;
use droidlink_client::decoder::FrameCollector;
use droidlink_shared::Command;
use std::thread;
use std::time::Duration;

#[test]
fn test_commands_reach_device_with_busy_resend() {
    init_logger();
    let device = SimulatedDevice::start(next_port(), AckPolicy::BusyOnce);
    let config = wifi_config(&[("DROIDLINK_CONTROL_PORT", device.port().to_string())]);
    let mut session = start_wifi_client(config, &FrameCollector::new());

    let tap = Command::Tap { x: 540, y: 1200 };
    let seqs = session.send_command(&tap).unwrap();
    assert_eq!(seqs.len(), 1);

    // the BUSY answer triggers one fast resend, which is acknowledged
    wait_for(|| device.received().len() == 2);
    thread::sleep(Duration::from_millis(300));

    let received = device.received();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|packet| packet.seq() == seqs[0]));
    assert_eq!(device.received_commands(), vec![tap.clone(), tap]);

    session.stop();
}

#[test]
fn test_unacknowledged_command_is_retried_a_bounded_number_of_times() {
    init_logger();
    let device = SimulatedDevice::start(next_port(), AckPolicy::Silent);
    let config = wifi_config(&[("DROIDLINK_CONTROL_PORT", device.port().to_string())]);
    let mut session = start_wifi_client(config, &FrameCollector::new());

    let seqs = session.send_command(&Command::Back).unwrap();

    // one transmission plus two retries
    wait_for(|| device.received().len() == 3);
    thread::sleep(Duration::from_millis(500));

    let received = device.received();
    assert_eq!(received.len(), 3);
    assert!(received.iter().all(|packet| packet.seq() == seqs[0]));

    session.stop();
}

#[test]
fn test_sequence_numbers_increase_per_command() {
    init_logger();
    let device = SimulatedDevice::start(next_port(), AckPolicy::Ok);
    let config = wifi_config(&[("DROIDLINK_CONTROL_PORT", device.port().to_string())]);
    let mut session = start_wifi_client(config, &FrameCollector::new());

    let commands = vec![
        Command::Home,
        Command::Key(4),
        Command::ClickByText("Settings".to_owned()),
        Command::VideoFps(30),
    ];

    let mut seqs = vec![];
    for command in commands.iter() {
        seqs.extend(session.send_command(command).unwrap());
    }

    wait_for(|| device.received().len() == commands.len());

    for pair in seqs.windows(2) {
        assert_eq!(pair[1].0, pair[0].0.wrapping_add(1));
    }
    assert_eq!(device.received_commands(), commands);

    session.stop();
}
