//! Integration tests driving the transport state machines over scripted
//! transports: connection lifecycle, sequence counters, ACK ordering,
//! duplicate suppression, routing dispatch, discovery and the USB framing
//! path.

use knx_bus::discovery::{discover_with, DiscoveryConfig};
use knx_bus::management::{ManagementConfig, ManagementInterface};
use knx_bus::net::MockTransport;
use knx_bus::protocol::cemi::CemiFrame;
use knx_bus::protocol::constants::{MessageCode, Priority, ServiceType};
use knx_bus::protocol::frame::{FrameBuilder, Hpai, KnxnetIpFrame};
use knx_bus::protocol::property::PropertyFrame;
use knx_bus::protocol::services::{
    ConnectionHeader, DataAck, DataRequest, RoutingBusy, RoutingLostMessage,
};
use knx_bus::protocol::usb_transfer::{encode_reports, UsbTransferFrame};
use knx_bus::routing::{RoutingConfig, RoutingInterface};
use knx_bus::tunneling::{TunnelConfig, TunnelInterface};
use knx_bus::usb::{MockHid, UsbConfig, UsbInterface};
use knx_bus::{BusEvent, BusInterface, IndividualAddress, KnxError};
use std::net::{Ipv4Addr, SocketAddrV4};

const CHANNEL: u8 = 0x07;

/// Wrap a body in the KNXnet/IP envelope.
fn envelope(service: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x06, 0x10];
    out.extend_from_slice(&service.to_be_bytes());
    out.extend_from_slice(&((6 + body.len()) as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// CONNECT_RESPONSE with a NAT-mode data HPAI.
fn connect_response_nat(channel: u8, status: u8) -> Vec<u8> {
    let mut body = vec![channel, status];
    body.extend_from_slice(&[0x08, 0x01, 0, 0, 0, 0, 0, 0]); // 0.0.0.0:0
    body.extend_from_slice(&[0x04, 0x04, 0x02, 0x00]); // CRD
    envelope(0x0206, &body)
}

fn data_request(service: ServiceType, sequence: u8, cemi: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; 512];
    let len = DataRequest::new(service, ConnectionHeader::new(CHANNEL, sequence), cemi)
        .build(&mut buf)
        .unwrap();
    buf[..len].to_vec()
}

fn data_ack(service: ServiceType, sequence: u8, status: u8) -> Vec<u8> {
    let mut buf = [0u8; 512];
    let len = DataAck::new(service, ConnectionHeader::new(CHANNEL, sequence), status)
        .build(&mut buf)
        .unwrap();
    buf[..len].to_vec()
}

fn group_write_frame() -> CemiFrame {
    CemiFrame::ldata_frame(
        MessageCode::LDataInd,
        IndividualAddress::from(0x1101u16),
        0x0A03,
        true,
        Priority::Low,
        6,
        vec![0x00, 0x81],
    )
}

fn service_of(datagram: &[u8]) -> u16 {
    u16::from_be_bytes([datagram[2], datagram[3]])
}

// =============================================================================
// Tunneling
// =============================================================================

#[tokio::test]
async fn tunnel_open_rewrites_nat_data_endpoint() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();

    assert!(tunnel.is_open());
    assert_eq!(tunnel.channel_id(), CHANNEL);
    // 0.0.0.0:0 in the response is replaced by the datagram source.
    assert_eq!(tunnel.data_endpoint(), MockTransport::PEER);
}

#[tokio::test]
async fn tunnel_open_sends_connect_request_with_layer_cri() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    let log = mock.sent_log();

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::busmonitor());
    tunnel.open().await.unwrap();

    let sent = log.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (request, dest) = &sent[0];
    assert_eq!(*dest, MockTransport::PEER);
    assert_eq!(service_of(request), 0x0205);
    assert_eq!(request.len(), 26);
    // CRI: {4, TUNNEL_CONNECTION, busmonitor layer, reserved}
    assert_eq!(&request[22..26], &[0x04, 0x04, 0x80, 0x00]);
}

#[tokio::test]
async fn tunnel_open_refused_and_timeout() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(0x00, 0x24));
    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    assert!(matches!(
        tunnel.open().await,
        Err(KnxError::ConnectionRefused(0x24))
    ));
    assert!(!tunnel.is_open());

    // Silent peer
    let mut tunnel = TunnelInterface::new(
        MockTransport::new(),
        MockTransport::PEER,
        TunnelConfig::default(),
    );
    assert!(matches!(
        tunnel.open().await,
        Err(KnxError::ConnectionTimeout)
    ));
}

#[tokio::test]
async fn tunnel_send_advances_sequence_on_ack() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    mock.add_response(data_ack(ServiceType::TunnellingAck, 0, 0x00));
    mock.add_response(data_ack(ServiceType::TunnellingAck, 1, 0x00));
    let log = mock.sent_log();

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();

    let frame = group_write_frame();
    tunnel.send(&frame).await.unwrap();
    tunnel.send(&frame).await.unwrap();

    let sent = log.lock().unwrap();
    // connect + two data requests
    assert_eq!(sent.len(), 3);
    for (i, (request, _)) in sent[1..].iter().enumerate() {
        assert_eq!(service_of(request), 0x0420);
        // Connection header: {4, channel, sequence, reserved}
        assert_eq!(&request[6..10], &[0x04, CHANNEL, i as u8, 0x00]);
        assert_eq!(&request[10..], &frame.to_bytes()[..]);
    }
}

#[tokio::test]
async fn tunnel_sequence_wraps_mod_256() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    for sequence in 0u16..=256 {
        mock.add_response(data_ack(ServiceType::TunnellingAck, sequence as u8, 0x00));
    }
    let log = mock.sent_log();

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();

    let frame = group_write_frame();
    for _ in 0u16..=256 {
        tunnel.send(&frame).await.unwrap();
    }

    let sent = log.lock().unwrap();
    // Request 256 (the 257th) reuses sequence 0 after the wrap.
    let (last, _) = sent.last().unwrap();
    assert_eq!(service_of(last), 0x0420);
    assert_eq!(last[8], 0x00);
    // And the one before it carried 255.
    let (previous, _) = &sent[sent.len() - 2];
    assert_eq!(previous[8], 0xFF);
}

#[tokio::test]
async fn tunnel_send_fails_on_ack_error_and_timeout() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    mock.add_response(data_ack(ServiceType::TunnellingAck, 0, 0x29));

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();

    let frame = group_write_frame();
    assert!(matches!(
        tunnel.send(&frame).await,
        Err(KnxError::AckError(0x29))
    ));

    // No ACK at all
    assert!(matches!(
        tunnel.send(&frame).await,
        Err(KnxError::ConnectionTimeout)
    ));
}

#[tokio::test]
async fn tunnel_acks_before_delivery_and_suppresses_duplicates() {
    let cemi = group_write_frame().to_bytes();
    let inbound = data_request(ServiceType::TunnellingRequest, 0, &cemi);

    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    mock.add_response(inbound.clone());
    mock.add_response(inbound);
    let log = mock.sent_log();

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();

    let event = tunnel.recv().await.unwrap();
    let BusEvent::Frame(frame) = event else {
        panic!("expected a frame, got {event:?}");
    };
    assert_eq!(frame.message_code, MessageCode::LDataInd);

    // The ACK went out before recv() returned the frame.
    {
        let sent = log.lock().unwrap();
        let (ack, _) = sent.last().unwrap();
        assert_eq!(service_of(ack), 0x0421);
        assert_eq!(&ack[6..11], &[0x04, CHANNEL, 0x00, 0x00, 0x00]);
    }

    // The duplicate is ACKed but not re-delivered; with the script
    // exhausted the receive surfaces the transport timeout.
    assert!(matches!(
        tunnel.recv().await,
        Err(KnxError::ConnectionTimeout)
    ));
    let sent = log.lock().unwrap();
    let acks: Vec<_> = sent
        .iter()
        .filter(|(datagram, _)| service_of(datagram) == 0x0421)
        .collect();
    assert_eq!(acks.len(), 2);
}

#[tokio::test]
async fn tunnel_answers_server_heartbeat() {
    let cemi = group_write_frame().to_bytes();

    // CONNECTIONSTATE_REQUEST from the server: channel + control HPAI
    let mut heartbeat_body = vec![CHANNEL, 0x00];
    heartbeat_body.extend_from_slice(&[0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57]);
    let heartbeat = envelope(0x0207, &heartbeat_body);

    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    mock.add_response(heartbeat);
    mock.add_response(data_request(ServiceType::TunnellingRequest, 0, &cemi));
    let log = mock.sent_log();

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();

    // The heartbeat is answered inline, then the data frame arrives.
    let event = tunnel.recv().await.unwrap();
    assert!(matches!(event, BusEvent::Frame(_)));

    let sent = log.lock().unwrap();
    let response = sent
        .iter()
        .find(|(datagram, _)| service_of(datagram) == 0x0208)
        .expect("no CONNECTIONSTATE_RESPONSE sent");
    assert_eq!(&response.0[6..8], &[CHANNEL, 0x00]);
}

#[tokio::test]
async fn tunnel_close_is_final() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    let log = mock.sent_log();

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();
    tunnel.close().await.unwrap();

    assert!(!tunnel.is_open());
    {
        let sent = log.lock().unwrap();
        let (disconnect, _) = sent.last().unwrap();
        assert_eq!(service_of(disconnect), 0x0209);
        assert_eq!(disconnect[6], CHANNEL);
    }

    assert!(matches!(tunnel.recv().await, Err(KnxError::NotConnected)));
    assert!(matches!(
        tunnel.send(&group_write_frame()).await,
        Err(KnxError::NotConnected)
    ));
    // close is idempotent
    tunnel.close().await.unwrap();
}

#[tokio::test]
async fn tunnel_queues_inbound_frames_during_send() {
    let cemi = group_write_frame().to_bytes();

    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    // The server's own frame lands before our ACK does.
    mock.add_response(data_request(ServiceType::TunnellingRequest, 0, &cemi));
    mock.add_response(data_ack(ServiceType::TunnellingAck, 0, 0x00));

    let mut tunnel = TunnelInterface::new(mock, MockTransport::PEER, TunnelConfig::default());
    tunnel.open().await.unwrap();

    tunnel.send(&group_write_frame()).await.unwrap();
    // The queued frame is delivered on the next receive without touching
    // the (now empty) wire.
    let event = tunnel.recv().await.unwrap();
    assert!(matches!(event, BusEvent::Frame(_)));
}

// =============================================================================
// Management
// =============================================================================

fn prop_con(code: MessageCode, elements: u8, data: Vec<u8>) -> Vec<u8> {
    let property = PropertyFrame::new(0x0008, 1, 52, elements, 1).with_data(data);
    CemiFrame::property_frame(code, property).to_bytes()
}

#[tokio::test]
async fn management_connects_with_device_management_cri() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    let log = mock.sent_log();

    let mut mgmt =
        ManagementInterface::new(mock, MockTransport::PEER, ManagementConfig::default());
    mgmt.open().await.unwrap();
    assert_eq!(mgmt.channel_id(), CHANNEL);

    let sent = log.lock().unwrap();
    let (request, _) = &sent[0];
    assert_eq!(service_of(request), 0x0205);
    assert_eq!(request.len(), 24);
    // Device management CRI is the bare two-byte structure.
    assert_eq!(&request[22..24], &[0x02, 0x03]);
}

#[tokio::test]
async fn management_read_property_correlates_on_identifiers() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    mock.add_response(data_ack(ServiceType::DeviceConfigurationAck, 0, 0x00));
    // A confirmation for a different property must be skipped.
    let other = CemiFrame::property_frame(
        MessageCode::MPropReadCon,
        PropertyFrame::new(0x0008, 1, 53, 1, 1).with_data(vec![0xEE]),
    )
    .to_bytes();
    mock.add_response(data_request(ServiceType::DeviceConfigurationRequest, 0, &other));
    let con = prop_con(MessageCode::MPropReadCon, 1, vec![0x03]);
    mock.add_response(data_request(ServiceType::DeviceConfigurationRequest, 1, &con));
    let log = mock.sent_log();

    let mut mgmt =
        ManagementInterface::new(mock, MockTransport::PEER, ManagementConfig::default());
    mgmt.open().await.unwrap();

    let data = mgmt.read_property(0x0008, 1, 52, 1, 1).await.unwrap();
    assert_eq!(data, vec![0x03]);

    let sent = log.lock().unwrap();
    // Our request rode DEVICE_CONFIGURATION_REQUEST and carried
    // M_PropRead.req; both server frames got DEVICE_CONFIGURATION_ACKs.
    let request = sent
        .iter()
        .find(|(datagram, _)| service_of(datagram) == 0x0310)
        .expect("no DEVICE_CONFIGURATION_REQUEST sent");
    assert_eq!(request.0[10], 0xFC);
    let acks = sent
        .iter()
        .filter(|(datagram, _)| service_of(datagram) == 0x0311)
        .count();
    assert_eq!(acks, 2);
}

#[tokio::test]
async fn management_property_error_confirmation() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    mock.add_response(data_ack(ServiceType::DeviceConfigurationAck, 0, 0x00));
    let con = prop_con(MessageCode::MPropWriteCon, 0, vec![0x07]);
    mock.add_response(data_request(ServiceType::DeviceConfigurationRequest, 0, &con));

    let mut mgmt =
        ManagementInterface::new(mock, MockTransport::PEER, ManagementConfig::default());
    mgmt.open().await.unwrap();

    assert!(matches!(
        mgmt.write_property(0x0008, 1, 52, 1, 1, vec![0x00]).await,
        Err(KnxError::PropertyError(0x07))
    ));
}

#[tokio::test]
async fn management_read_times_out_without_confirmation() {
    let mut mock = MockTransport::new();
    mock.add_response(connect_response_nat(CHANNEL, 0x00));
    mock.add_response(data_ack(ServiceType::DeviceConfigurationAck, 0, 0x00));

    let mut mgmt =
        ManagementInterface::new(mock, MockTransport::PEER, ManagementConfig::default());
    mgmt.open().await.unwrap();

    assert!(matches!(
        mgmt.read_property(0x0008, 1, 52, 1, 1).await,
        Err(KnxError::ConnectionTimeout)
    ));
}

// =============================================================================
// Routing
// =============================================================================

fn routing_indication(cemi: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; 512];
    let len = FrameBuilder::new(ServiceType::RoutingIndication, cemi)
        .build(&mut buf)
        .unwrap();
    buf[..len].to_vec()
}

#[tokio::test]
async fn routing_drops_exhausted_hop_count() {
    let dead = CemiFrame::ldata_frame(
        MessageCode::LDataInd,
        IndividualAddress::from(0x1101u16),
        0x0A03,
        true,
        Priority::Low,
        0, // hop count exhausted
        vec![0x00, 0x81],
    );
    let alive = group_write_frame();

    let mut mock = MockTransport::new();
    mock.add_response(routing_indication(&dead.to_bytes()));
    mock.add_response(routing_indication(&alive.to_bytes()));

    let mut routing = RoutingInterface::new(mock, RoutingConfig::default());
    routing.open().await.unwrap();

    // The hop-count-0 frame is skipped; the next one is delivered.
    let event = routing.recv().await.unwrap();
    let BusEvent::Frame(frame) = event else {
        panic!("expected a frame, got {event:?}");
    };
    assert_eq!(frame.ldata().unwrap().hop_count(), 6);
}

#[tokio::test]
async fn routing_surfaces_invalid_cemi_as_error() {
    let mut mock = MockTransport::new();
    mock.add_response(routing_indication(&[0x42, 0x00, 0xAA]));

    let mut routing = RoutingInterface::new(mock, RoutingConfig::default());
    routing.open().await.unwrap();

    assert!(matches!(
        routing.recv().await.unwrap(),
        BusEvent::Error(KnxError::BadCemi)
    ));
}

#[tokio::test]
async fn routing_notifications_and_busy_counter() {
    let mut buf = [0u8; 16];
    let lost = RoutingLostMessage {
        device_state: 0x01,
        lost_count: 3,
    };
    let lost_len = lost.build(&mut buf).unwrap();
    let lost_frame = buf[..lost_len].to_vec();

    let busy = RoutingBusy {
        device_state: 0x00,
        wait_time: 100,
        control: 0,
    };
    let busy_len = busy.build(&mut buf).unwrap();
    let busy_frame = buf[..busy_len].to_vec();

    let mut mock = MockTransport::new();
    mock.add_response(lost_frame);
    mock.add_response(busy_frame.clone());
    mock.add_response(busy_frame);

    let mut routing = RoutingInterface::new(mock, RoutingConfig::default());
    routing.open().await.unwrap();

    assert!(matches!(
        routing.recv().await.unwrap(),
        BusEvent::LostMessage {
            device_state: 0x01,
            lost: 3
        }
    ));
    // Two busy frames inside the window: the counter climbs.
    assert!(matches!(
        routing.recv().await.unwrap(),
        BusEvent::Busy {
            wait_time: 100,
            count: 1,
            ..
        }
    ));
    assert!(matches!(
        routing.recv().await.unwrap(),
        BusEvent::Busy { count: 2, .. }
    ));
}

#[tokio::test]
async fn routing_send_multicasts_one_indication() {
    let mock = MockTransport::new();
    let log = mock.sent_log();

    let mut routing = RoutingInterface::new(mock, RoutingConfig::default());
    routing.open().await.unwrap();
    // No ACK exists in routing; send resolves immediately.
    routing.send(&group_write_frame()).await.unwrap();

    let sent = log.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (datagram, dest) = &sent[0];
    assert_eq!(service_of(datagram), 0x0530);
    assert_eq!(*dest, SocketAddrV4::new(Ipv4Addr::new(224, 0, 23, 12), 3671));
    assert_eq!(&datagram[6..], &group_write_frame().to_bytes()[..]);
}

#[tokio::test]
async fn routing_rejects_busmonitor_frames() {
    let mut routing = RoutingInterface::new(MockTransport::new(), RoutingConfig::default());
    routing.open().await.unwrap();

    let monitor = CemiFrame::parse(&[0x2B, 0x00, 0xCC, 0x00]).unwrap();
    assert!(matches!(
        routing.send(&monitor).await,
        Err(KnxError::InvalidMode)
    ));
}

// =============================================================================
// Discovery
// =============================================================================

fn search_response(name: &str, families: &[(u8, u8)]) -> Vec<u8> {
    let mut body = vec![0u8; 8];
    Hpai::UNSPECIFIED.encode(&mut body).unwrap();

    let mut dib = vec![
        54, 0x01, 0x02, 0x00, 0x11, 0x0A, 0x00, 0x2A, 0, 1, 2, 3, 4, 5, 224, 0, 23, 12, 0xAA,
        0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
    ];
    let mut padded = [0u8; 30];
    padded[..name.len()].copy_from_slice(name.as_bytes());
    dib.extend_from_slice(&padded);
    body.extend_from_slice(&dib);

    body.push(2 + 2 * families.len() as u8);
    body.push(0x02);
    for (family, version) in families {
        body.push(*family);
        body.push(*version);
    }
    envelope(0x0202, &body)
}

#[tokio::test]
async fn discovery_dedups_and_derives_capabilities() {
    let gateway = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 250), 3671);
    let other = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 251), 3671);

    let mut mock = MockTransport::new();
    let response = search_response("gw", &[(0x02, 1), (0x04, 1), (0x05, 1)]);
    mock.add_response_from(response.clone(), gateway);
    mock.add_response_from(response.clone(), gateway); // duplicate
    mock.add_response_from(response, other);

    let endpoints = discover_with(mock, &DiscoveryConfig::default()).await.unwrap();
    assert_eq!(endpoints.len(), 2);

    let first = &endpoints[0];
    assert_eq!(first.address, gateway);
    assert_eq!(first.friendly_name, "gw");
    assert_eq!(first.knx_address.unwrap().to_string(), "1.1.10");
    assert!(first.supports_tunnelling());
    assert!(first.supports_routing());
    assert!(!first.supports_device_management());
}

#[tokio::test]
async fn discovery_advertises_bound_port_in_search_request() {
    let mock = MockTransport::new();
    let log = mock.sent_log();

    let endpoints = discover_with(mock, &DiscoveryConfig::default()).await.unwrap();
    assert!(endpoints.is_empty());

    let sent = log.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (request, dest) = &sent[0];
    assert_eq!(*dest, SocketAddrV4::new(Ipv4Addr::new(224, 0, 23, 12), 3671));
    assert_eq!(service_of(request), 0x0201);
    assert_eq!(request.len(), 14);
    // HPAI: 0.0.0.0 with the socket's bound port
    assert_eq!(&request[8..12], &[0, 0, 0, 0]);
    assert_eq!(
        u16::from_be_bytes([request[12], request[13]]),
        MockTransport::LOCAL.port()
    );
}

// =============================================================================
// USB
// =============================================================================

fn report_for_cemi(cemi: &[u8]) -> Vec<u8> {
    let transfer = UsbTransferFrame::knx_tunnel(cemi).to_bytes();
    encode_reports(&transfer)[0].to_vec()
}

/// Decode the transfer frame a single written report carries.
fn transfer_of_report(report: &[u8]) -> UsbTransferFrame {
    let body_len = report[2] as usize;
    UsbTransferFrame::parse(&report[3..3 + body_len]).unwrap()
}

#[tokio::test]
async fn usb_open_runs_init_batch() {
    let hid = MockHid::new();
    let log = hid.written_log();

    let mut usb = UsbInterface::new(hid, UsbConfig::default());
    usb.open().await.unwrap();
    assert!(usb.is_open());

    let written = log.lock().unwrap();
    assert_eq!(written.len(), 3);

    // 1: M_Reset.req through the KNX tunnel protocol
    let reset = transfer_of_report(&written[0]);
    assert!(reset.is_knx_tunnel());
    assert_eq!(reset.body, vec![0xF1, 0x00]);

    // 2: feature-set of the active EMI type to cEMI
    let feature = transfer_of_report(&written[1]);
    assert!(feature.is_feature_service());
    assert_eq!(feature.emi_id, 0x03);
    assert_eq!(feature.body, vec![0x05, 0x03]);

    // 3: M_PropWrite.req of PID_COMM_MODE, link layer
    let comm_mode = transfer_of_report(&written[2]);
    let frame = CemiFrame::parse(&comm_mode.body).unwrap();
    assert_eq!(frame.message_code, MessageCode::MPropWriteReq);
    let property = frame.property().unwrap();
    assert_eq!(property.object_type, 0x0008);
    assert_eq!(property.property_id, 52);
    assert_eq!(property.data, vec![0x00]);
}

#[tokio::test]
async fn usb_open_busmonitor_selects_monitor_comm_mode() {
    let hid = MockHid::new();
    let log = hid.written_log();

    let mut usb = UsbInterface::new(
        hid,
        UsbConfig {
            busmonitor: true,
            ..UsbConfig::default()
        },
    );
    usb.open().await.unwrap();

    let written = log.lock().unwrap();
    let comm_mode = transfer_of_report(written.last().unwrap());
    let frame = CemiFrame::parse(&comm_mode.body).unwrap();
    assert_eq!(frame.property().unwrap().data, vec![0x01]);
}

#[tokio::test]
async fn usb_recv_dispatches_frames_and_reset() {
    let frame = group_write_frame();

    let mut hid = MockHid::new();
    hid.add_report(report_for_cemi(&frame.to_bytes()));
    hid.add_report(report_for_cemi(&[0xF0, 0x00])); // M_Reset.ind

    let mut usb = UsbInterface::new(hid, UsbConfig::default());
    usb.open().await.unwrap();

    let event = usb.recv().await.unwrap();
    let BusEvent::Frame(received) = event else {
        panic!("expected a frame, got {event:?}");
    };
    assert_eq!(received, frame);

    assert!(matches!(usb.recv().await.unwrap(), BusEvent::Reset));
}

#[tokio::test]
async fn usb_reassembles_split_packets() {
    // A busmonitor frame long enough to span two reports.
    let mut cemi = vec![0x2B, 0x00];
    cemi.extend(vec![0x55u8; 70]);
    let transfer = UsbTransferFrame::knx_tunnel(&cemi).to_bytes();
    let reports = encode_reports(&transfer);
    assert_eq!(reports.len(), 2);

    let mut hid = MockHid::new();
    for report in &reports {
        hid.add_report(report.to_vec());
    }

    let mut usb = UsbInterface::new(hid, UsbConfig::default());
    usb.open().await.unwrap();

    let event = usb.recv().await.unwrap();
    let BusEvent::Frame(frame) = event else {
        panic!("expected a frame, got {event:?}");
    };
    assert_eq!(frame.message_code, MessageCode::LBusmonInd);
    assert_eq!(frame.to_bytes(), cemi);
}

#[tokio::test]
async fn usb_send_rejected_in_busmonitor_mode() {
    let mut usb = UsbInterface::new(
        MockHid::new(),
        UsbConfig {
            busmonitor: true,
            ..UsbConfig::default()
        },
    );
    usb.open().await.unwrap();
    assert!(matches!(
        usb.send(&group_write_frame()).await,
        Err(KnxError::InvalidMode)
    ));
}

#[tokio::test]
async fn usb_open_aborts_on_comm_mode_error() {
    let con = CemiFrame::property_frame(
        MessageCode::MPropWriteCon,
        PropertyFrame::new(0x0008, 1, 52, 0, 1).with_data(vec![0x07]),
    );

    let mut hid = MockHid::new();
    hid.add_report(report_for_cemi(&con.to_bytes()));

    let mut usb = UsbInterface::new(hid, UsbConfig::default());
    assert!(matches!(
        usb.open().await,
        Err(KnxError::PropertyError(0x07))
    ));
    assert!(!usb.is_open());
}

#[tokio::test]
async fn usb_read_property_queues_interleaved_frames() {
    let bus_frame = group_write_frame();
    let con = CemiFrame::property_frame(
        MessageCode::MPropReadCon,
        PropertyFrame::new(0x0000, 1, 56, 1, 1).with_data(vec![0x2A]),
    );

    let hid = MockHid::new();
    let queue = hid.report_queue();

    let mut usb = UsbInterface::new(hid, UsbConfig::default());
    usb.open().await.unwrap();

    // Bus traffic lands between the request and its confirmation.
    queue
        .lock()
        .unwrap()
        .push_back(report_for_cemi(&bus_frame.to_bytes()));
    queue
        .lock()
        .unwrap()
        .push_back(report_for_cemi(&con.to_bytes()));

    let data = usb.read_property(0x0000, 1, 56, 1, 1).await.unwrap();
    assert_eq!(data, vec![0x2A]);

    // The interleaved frame was not lost.
    let event = usb.recv().await.unwrap();
    assert!(matches!(event, BusEvent::Frame(_)));
}

#[tokio::test]
async fn usb_close_stops_delivery() {
    let mut hid = MockHid::new();
    hid.add_report(report_for_cemi(&[0xF0, 0x00]));

    let mut usb = UsbInterface::new(hid, UsbConfig::default());
    usb.open().await.unwrap();
    usb.close().await.unwrap();
    assert!(matches!(usb.recv().await, Err(KnxError::NotConnected)));
}

// =============================================================================
// Envelope sanity against hand-written bytes
// =============================================================================

#[test]
fn envelope_round_trip_exact() {
    let datagram = envelope(0x0420, &[0x04, CHANNEL, 0x00, 0x00, 0xF1, 0x00]);
    let frame = KnxnetIpFrame::parse(&datagram).unwrap();
    assert_eq!(frame.service(), Some(ServiceType::TunnellingRequest));
    assert_eq!(frame.body().len(), datagram.len() - 6);
}
