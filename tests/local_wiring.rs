//! End-to-end wiring of a local pair through the public facade

use crosswire::prelude::*;
use std::sync::Arc;

fn slot() -> ServiceAddress {
    ServiceAddress::new("HelloWorld", ServiceKind::Local, "greeter")
}

#[smol_potat::test]
async fn local_pair_connects_and_disconnects() {
    let hub = Arc::new(DispatcherHub::new());
    let stub_events = hub.attach("component");
    let proxy_events = hub.attach("client");

    let manager = ServiceManager::start(hub.clone(), Box::new(NullLink::new()), COOKIE_LOCAL);

    let stub = StubAddress::new(slot(), "component", COOKIE_LOCAL, 100);
    let proxy = ProxyAddress::new(slot(), "client", COOKIE_LOCAL, 200);

    manager.request_register_server(stub.clone()).unwrap();
    manager.request_register_client(proxy.clone()).unwrap();

    let event = stub_events.recv().await.unwrap();
    assert_eq!(event.target, EventTarget::Stub);
    assert_eq!(event.status, ConnectionStatus::Connected);
    assert_eq!(event.proxy, proxy);

    let event = proxy_events.recv().await.unwrap();
    assert_eq!(event.target, EventTarget::Proxy);
    assert_eq!(event.status, ConnectionStatus::Connected);
    assert_eq!(event.stub, stub);

    let (stubs, proxies) = manager.service_list(COOKIE_ANY);
    assert_eq!((stubs.len(), proxies.len()), (1, 1));

    manager.request_unregister_server(stub).unwrap();
    assert_eq!(
        stub_events.recv().await.unwrap().status,
        ConnectionStatus::Disconnected
    );
    assert_eq!(
        proxy_events.recv().await.unwrap().status,
        ConnectionStatus::Disconnected
    );

    manager.shutdown();
}
