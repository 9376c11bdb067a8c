// tests/load_balancer_tests.rs
use hotswap_proxy::config::Config;
use hotswap_proxy::health::{HealthMonitor, MonitorOptions};
use hotswap_proxy::load_balancer::{routes_from_config, RoundRobin};
use hotswap_proxy::proxy::{simple_routes, Backend, Handler, Mapping, Routes};
use hotswap_proxy::server::{Server, ServerBuilder};
use hyper::body::to_bytes;
use hyper::{Body, Client, Request, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

fn fast_checks() -> MonitorOptions {
    MonitorOptions {
        interval: Duration::from_millis(50),
        timeout: Duration::from_secs(2),
        path: Some("/health".to_string()),
        expect_body: Some("OK".to_string()),
    }
}

fn group(route: &str, targets: &[String]) -> Arc<RoundRobin> {
    let backends: Vec<Arc<Backend>> = targets
        .iter()
        .enumerate()
        .map(|(index, target)| Arc::new(Backend::new(index, target).unwrap()))
        .collect();
    let health = HealthMonitor::start(route, &backends, &fast_checks()).unwrap();
    Arc::new(RoundRobin::new(route, backends, health))
}

async fn wait_for_verdicts(group: &RoundRobin, expected: &[bool]) {
    for _ in 0..100 {
        let status = group.health().status_store().read().await;
        if expected
            .iter()
            .enumerate()
            .all(|(index, healthy)| status.verdict(index) == Some(*healthy))
        {
            return;
        }
        drop(status);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("health verdicts never reached {expected:?}");
}

fn routes(route: &str, handler: Arc<dyn Handler>) -> Routes {
    let mut routes = Routes::new();
    routes.insert(route.to_string(), handler);
    routes
}

/// Serves `server` on an ephemeral port until the returned sender fires.
async fn listen(server: Arc<Server>) -> (SocketAddr, watch::Sender<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.serve_listener(listener, shutdown_rx));
    (addr, shutdown_tx)
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, String) {
    let response = Client::new()
        .get(format!("http://{addr}{path}").parse().unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body()).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn upstream(name: &str, health_status: usize) -> mockito::ServerGuard {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(health_status)
        .with_body("OK")
        .create_async()
        .await;
    server
        .mock("GET", "/x")
        .with_status(200)
        .with_body(name)
        .create_async()
        .await;
    server
}

#[tokio::test]
async fn test_round_robin_distribution() {
    let a = upstream("A", 200).await;
    let b = upstream("B", 200).await;

    let svc = group("svc", &[a.url(), b.url()]);
    wait_for_verdicts(&svc, &[true, true]).await;

    let server = Arc::new(
        ServerBuilder::new("127.0.0.1:0".parse().unwrap())
            .with_routes(routes("svc", svc.clone()))
            .build(),
    );
    let (addr, shutdown) = listen(server.clone()).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (status, body) = get(addr, "/svc/x").await;
        assert_eq!(status, StatusCode::OK);
        seen.push(body);
    }
    assert_eq!(seen, vec!["A", "B", "A"]);

    let _ = shutdown.send(true);
    server.shutdown_monitors();
}

#[tokio::test]
async fn test_health_check_removes_unhealthy_backends() {
    let a = upstream("A", 200).await;
    let b = upstream("B", 500).await;

    let svc = group("svc", &[a.url(), b.url()]);
    wait_for_verdicts(&svc, &[true, false]).await;

    let server = ServerBuilder::new("127.0.0.1:0".parse().unwrap())
        .with_routes(routes("svc", svc.clone()))
        .build();
    let peer: SocketAddr = "10.1.1.1:1234".parse().unwrap();

    for _ in 0..4 {
        let response = server
            .serve(Request::get("/svc/x").body(Body::empty()).unwrap(), peer)
            .await;
        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"A");
    }
    server.shutdown_monitors();
}

#[tokio::test]
async fn all_backends_down_answers_503() {
    let a = upstream("A", 500).await;
    let b = upstream("B", 503).await;

    let svc = group("svc", &[a.url(), b.url()]);
    wait_for_verdicts(&svc, &[false, false]).await;

    let server = Arc::new(
        ServerBuilder::new("127.0.0.1:0".parse().unwrap())
            .with_routes(routes("svc", svc.clone()))
            .build(),
    );
    let (addr, shutdown) = listen(server.clone()).await;

    let (status, _) = get(addr, "/svc/x").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = get(addr, "/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let _ = shutdown.send(true);
    server.shutdown_monitors();
}

#[tokio::test]
async fn hot_reload_switches_tables_atomically() {
    let a = upstream("A", 200).await;
    let b = upstream("B", 200).await;

    let mut first = Mapping::new();
    first.insert("a".into(), vec![a.url()]);
    let mut second = Mapping::new();
    second.insert("b".into(), vec![b.url()]);

    let server = Arc::new(
        ServerBuilder::new("127.0.0.1:0".parse().unwrap())
            .with_routes(simple_routes(&first).unwrap())
            .build(),
    );
    let (addr, shutdown) = listen(server.clone()).await;

    assert_eq!(get(addr, "/a/x").await, (StatusCode::OK, "A".to_string()));
    assert_eq!(get(addr, "/b/x").await.0, StatusCode::NOT_FOUND);

    let previous = server.set_routing(simple_routes(&second).unwrap()).unwrap();
    previous.shutdown();

    assert_eq!(get(addr, "/a/x").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(addr, "/b/x").await, (StatusCode::OK, "B".to_string()));
    assert_eq!(server.routing().unwrap().version(), 2);

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn reloading_same_config_keeps_healthy_route_up() {
    let a = upstream("A", 200).await;
    let json = format!(
        r#"{{
            "health_check": {{"path": "/health", "expect_body": "OK", "timeout_secs": 2}},
            "routes": {{"svc": {{"targets": ["{}"]}}}}
        }}"#,
        a.url()
    );
    let config: Config = serde_json::from_str(&json).unwrap();

    let server = Arc::new(ServerBuilder::new("127.0.0.1:0".parse().unwrap()).build());
    server.publish(routes_from_config(&config).unwrap()).await;
    let (addr, shutdown) = listen(server.clone()).await;
    assert_eq!(get(addr, "/svc/x").await, (StatusCode::OK, "A".to_string()));

    let previous = server
        .publish(routes_from_config(&config).unwrap())
        .await
        .unwrap();
    previous.shutdown();

    assert_eq!(get(addr, "/svc/x").await, (StatusCode::OK, "A".to_string()));
    assert_eq!(server.routing().unwrap().version(), 2);

    let _ = shutdown.send(true);
    server.shutdown_monitors();
}

#[tokio::test]
async fn forwarded_for_is_appended_over_the_wire() {
    let mut upstream = mockito::Server::new_async().await;
    let mock = upstream
        .mock("GET", "/who")
        .match_header("x-forwarded-for", "1.2.3.4, 127.0.0.1")
        .with_status(200)
        .create_async()
        .await;

    let mut mapping = Mapping::new();
    mapping.insert("svc".into(), vec![upstream.url()]);
    let server = Arc::new(
        ServerBuilder::new("127.0.0.1:0".parse().unwrap())
            .with_routes(simple_routes(&mapping).unwrap())
            .build(),
    );
    let (addr, shutdown) = listen(server).await;

    let req = Request::get(format!("http://{addr}/svc/who"))
        .header("x-forwarded-for", "1.2.3.4")
        .body(Body::empty())
        .unwrap();
    let response = Client::new().request(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    mock.assert_async().await;

    let _ = shutdown.send(true);
}
