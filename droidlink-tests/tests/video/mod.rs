use crate::utils::*;
use droidlink_client::bitstream::test_support::{TestPps, TestSlice, TestSps};
use droidlink_client::decoder::FrameCollector;
use droidlink_client::stream::{build_rtp_packet, encode_vid0};
use droidlink_shared::Command;
use std::io::Write;
use std::net::TcpListener;
use std::thread;

fn gop(sps: &TestSps) -> Vec<Vec<u8>> {
    vec![
        sps.build().into_bytes(),
        TestPps::new(0, 0).build().into_bytes(),
        TestSlice::idr(sps).build().into_bytes(),
        TestSlice::p(sps, 1).build().into_bytes(),
        TestSlice::p(sps, 2).build().into_bytes(),
    ]
}

#[test]
fn test_rtp_over_udp_decodes_and_requests_idr_after_gap() {
    init_logger();
    let device = SimulatedDevice::start(next_port(), AckPolicy::Ok);
    let config = wifi_config(&[("DROIDLINK_CONTROL_PORT", device.port().to_string())]);
    let frames = FrameCollector::new();
    let mut session = start_wifi_client(config, &frames);

    // the device learns where to stream from the first command
    session.send_command(&Command::Ping).unwrap();
    wait_for(|| device.peer().is_some());

    let sps = TestSps::new(1080, 2400);
    for (seq, nal) in gop(&sps).iter().enumerate() {
        device.send_to_host(&build_rtp_packet(seq as u16, 0, 1, 96, true, nal));
    }

    wait_for(|| frames.len() == 3);
    assert_eq!(frames.frames()[0].width, 1080);
    assert_eq!(frames.frames()[0].height, 2400);

    // frame_num jumps from 2 to 5
    let gap = TestSlice::p(&sps, 5).build().into_bytes();
    device.send_to_host(&build_rtp_packet(5, 0, 1, 96, true, &gap));

    wait_for(|| {
        session.poll_idr_requests();
        device.received_commands().contains(&Command::VideoIdr)
    });
    assert_eq!(frames.len(), 3);

    session.stop();
}

#[test]
fn test_vid0_over_tcp_decodes() {
    init_logger();
    let device = SimulatedDevice::start(next_port(), AckPolicy::Ok);
    let video_port = next_port();
    let listener = TcpListener::bind(("127.0.0.1", video_port)).unwrap();

    let sps = TestSps::new(720, 1280);
    let mut stream = vec![];
    for (seq, nal) in gop(&sps).iter().enumerate() {
        let packet = build_rtp_packet(seq as u16, 0, 1, 96, true, nal);
        stream.extend_from_slice(&encode_vid0(&packet));
    }

    let server = thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();

        for chunk in stream.chunks(11) {
            socket.write_all(chunk).unwrap();
            socket.flush().unwrap();
        }

        socket
    });

    let config = wifi_config(&[
        ("DROIDLINK_CONTROL_PORT", device.port().to_string()),
        ("DROIDLINK_VIDEO_PORT", video_port.to_string()),
    ]);
    let frames = FrameCollector::new();
    let mut session = start_wifi_client(config, &frames);
    let _socket = server.join().unwrap();

    wait_for(|| frames.len() == 3);
    assert_eq!(frames.frames()[2].height, 1280);

    session.stop();
}

#[test]
fn test_video_without_parameter_sets_is_not_decoded() {
    init_logger();
    let device = SimulatedDevice::start(next_port(), AckPolicy::Ok);
    let config = wifi_config(&[("DROIDLINK_CONTROL_PORT", device.port().to_string())]);
    let frames = FrameCollector::new();
    let mut session = start_wifi_client(config, &frames);

    session.send_command(&Command::Ping).unwrap();
    wait_for(|| device.peer().is_some());

    // an oversized SPS closes the gate for everything after it
    let insane = TestSps::new(8192, 8192);
    device.send_to_host(&build_rtp_packet(0, 0, 1, 96, true, &insane.build().into_bytes()));
    for (seq, nal) in gop(&insane).iter().skip(1).enumerate() {
        device.send_to_host(&build_rtp_packet(seq as u16 + 1, 0, 1, 96, true, nal));
    }

    thread::sleep(std::time::Duration::from_millis(300));
    assert_eq!(frames.is_empty(), true);

    // a sane SPS reopens it
    let sps = TestSps::new(1080, 2400);
    for (seq, nal) in gop(&sps).iter().enumerate() {
        device.send_to_host(&build_rtp_packet(seq as u16 + 10, 0, 1, 96, true, nal));
    }

    wait_for(|| frames.len() == 3);

    session.stop();
}
