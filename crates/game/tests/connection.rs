use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use ripple::{
    ClientSession, PacketError, SessionConfig, SessionEvent, SessionManager, UdpEndpoint, UdpPeer,
    UserCommand, World,
};

fn bind_server() -> UdpEndpoint {
    let mut endpoint = UdpEndpoint::bind("127.0.0.1:0").unwrap();
    endpoint.set_server_mode(true);
    endpoint
}

fn connect(server: SocketAddr) -> (UdpEndpoint, ClientSession<UdpPeer>) {
    let mut endpoint = UdpEndpoint::bind("127.0.0.1:0").unwrap();
    let peer = endpoint.connect(server);
    let mut session = ClientSession::new(0, peer, SessionConfig::default());
    assert_eq!(session.pump(), vec![SessionEvent::Connected]);
    (endpoint, session)
}

fn wait_for<T>(timeout_ms: u64, mut poll: impl FnMut() -> Option<T>) -> Option<T> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if let Some(value) = poll() {
            return Some(value);
        }
        thread::sleep(Duration::from_millis(1));
    }
    None
}

fn accept_next(endpoint: &mut UdpEndpoint) -> UdpPeer {
    wait_for(500, || endpoint.poll().unwrap().pop()).expect("No peer accepted")
}

#[test]
fn test_session_over_udp_full_flow() {
    let mut server_endpoint = bind_server();
    let mut sessions = SessionManager::new(8, SessionConfig::default());

    let (mut client_endpoint, mut client) = connect(server_endpoint.local_addr());
    client.record_user_command(UserCommand {
        vertical: 127,
        ..UserCommand::idle(0)
    });
    client.transmit_client_frame(0).unwrap();

    let peer = accept_next(&mut server_endpoint);
    let client_addr = peer.addr();
    assert_eq!(client_addr, client_endpoint.local_addr());
    sessions.accept(client_addr, peer).unwrap();

    let events = sessions.pump_all();
    assert_eq!(
        events,
        vec![
            (client_addr, SessionEvent::Connected),
            (
                client_addr,
                SessionEvent::ClientFrame {
                    frame: 0,
                    new_commands: 1
                }
            ),
        ]
    );
    assert_eq!(sessions.connected_count(), 1);

    let mut world = World::new();
    world.spawn(Vec3::new(1.0, 2.0, 3.0));
    let server = sessions.get_mut(&client_addr).unwrap();
    assert_eq!(server.get_user_command(0).vertical, 127);
    server.transmit_server_frame(&world.snapshot()).unwrap();

    let event = wait_for(500, || {
        client_endpoint.poll().unwrap();
        client.pump().pop()
    })
    .expect("No snapshot received");
    assert_eq!(
        event,
        SessionEvent::ServerFrame {
            frame: 0,
            delta: false
        }
    );
    assert_eq!(client.frames().acknowledged, 0);
    assert_eq!(client.snapshots().latest(), Some(&world.snapshot()));
}

#[test]
fn test_server_full_refuses_peer() {
    let mut server_endpoint = bind_server();
    let mut sessions: SessionManager<UdpPeer> = SessionManager::new(0, SessionConfig::default());

    let (_client_endpoint, mut client) = connect(server_endpoint.local_addr());
    client.record_user_command(UserCommand::idle(0));
    client.transmit_client_frame(0).unwrap();

    let peer = accept_next(&mut server_endpoint);
    let addr = peer.addr();
    assert!(matches!(
        sessions.accept(addr, peer),
        Err(PacketError::ServerFull)
    ));
    server_endpoint.disconnect(addr);

    assert_eq!(sessions.total_count(), 0);
    assert_eq!(server_endpoint.peer_count(), 0);
}

#[test]
fn test_silent_client_times_out() {
    let mut server_endpoint = bind_server();
    let mut sessions = SessionManager::with_timeout(8, SessionConfig::default(), 1);

    let (_client_endpoint, mut client) = connect(server_endpoint.local_addr());
    client.record_user_command(UserCommand::idle(0));
    client.transmit_client_frame(0).unwrap();

    let peer = accept_next(&mut server_endpoint);
    let addr = peer.addr();
    sessions.accept(addr, peer).unwrap();
    sessions.pump_all();

    // UDP has no close notification; silence is the only signal.
    client.close();
    let now = Instant::now();
    assert!(sessions.cleanup_timed_out_at(now).is_empty());

    let expired = sessions.cleanup_timed_out_at(now + Duration::from_secs(2));
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].0, addr);
    server_endpoint.disconnect(addr);
}
