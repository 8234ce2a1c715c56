//! Two nodes wiring a public service through an in-test router
//!
//! The router here is the smallest broker that satisfies the link protocol:
//! it welcomes every node and relays registration frames to all other nodes.

use crosswire::prelude::*;
use router_link::RouterMessage;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

const COOKIE_A: Cookie = 31;
const COOKIE_B: Cookie = 32;

fn spawn_broker(listener: TcpListener, nodes: usize) {
    thread::spawn(move || {
        let writers: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
        let mut relays = Vec::new();

        for id in 0..nodes {
            let (stream, _) = listener.accept().expect("broker accept failed");
            let mut reader = BufReader::new(stream.try_clone().expect("broker clone failed"));

            let mut line = String::new();
            reader.read_line(&mut line).expect("broker read failed");
            let cookie = match serde_json::from_str(&line) {
                Ok(RouterMessage::Hello { cookie }) => cookie,
                other => panic!("expected a hello frame, got {other:?}"),
            };

            let mut writer = stream;
            let welcome = RouterMessage::Welcome {
                channel: Channel::new(id as u64 + 2, cookie, 1),
            };
            let mut frame = serde_json::to_string(&welcome).unwrap();
            frame.push('\n');
            writer.write_all(frame.as_bytes()).expect("broker write failed");

            writers.lock().unwrap().push(writer);

            let writers = writers.clone();
            relays.push(thread::spawn(move || {
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                    let mut writers = writers.lock().unwrap();
                    for (other, writer) in writers.iter_mut().enumerate() {
                        if other != id {
                            let _ = writer.write_all(line.as_bytes());
                        }
                    }
                }
            }));
        }

        for relay in relays {
            let _ = relay.join();
        }
    });
}

#[smol_potat::test]
async fn two_nodes_wire_through_the_router() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    spawn_broker(listener, 2);

    let slot = ServiceAddress::new("Echo", ServiceKind::Public, "main");
    let stub_a = StubAddress::new(slot.clone(), "worker", COOKIE_A, 100);
    let proxy_b = ProxyAddress::new(slot, "ui", COOKIE_B, 200);

    // Node A serves the role.
    let hub_a = Arc::new(DispatcherHub::new());
    let worker_a = hub_a.attach("worker");
    let manager_a =
        ServiceManager::start(hub_a.clone(), Box::new(TcpRouterLink::new(COOKIE_A)), COOKIE_A);
    manager_a.start_routing_at("127.0.0.1", port).unwrap();
    manager_a.request_register_server(stub_a.clone()).unwrap();

    // Node B consumes it.
    let hub_b = Arc::new(DispatcherHub::new());
    let ui_b = hub_b.attach("ui");
    let manager_b =
        ServiceManager::start(hub_b.clone(), Box::new(TcpRouterLink::new(COOKIE_B)), COOKIE_B);
    manager_b.start_routing_at("127.0.0.1", port).unwrap();
    manager_b.request_register_client(proxy_b.clone()).unwrap();

    // B's proxy reaches A's stub across the broker.
    let event = ui_b.recv().await.unwrap();
    assert_eq!(event.target, EventTarget::Proxy);
    assert_eq!(event.status, ConnectionStatus::Connected);
    assert_eq!(event.stub, stub_a);

    // A's stub learns about B's proxy.
    let event = worker_a.recv().await.unwrap();
    assert_eq!(event.target, EventTarget::Stub);
    assert_eq!(event.status, ConnectionStatus::Connected);
    assert_eq!(event.proxy, proxy_b);

    // Both registries now see both endpoints of the pair.
    let (stubs, proxies) = manager_b.service_list(COOKIE_ANY);
    assert_eq!((stubs.len(), proxies.len()), (1, 1));

    manager_a.shutdown();
    manager_b.shutdown();
}
