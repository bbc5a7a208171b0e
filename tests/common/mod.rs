//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::time::Duration;

use listener_server::{HttpApplication, HttpListenerServer};

/// Start `application` on an ephemeral loopback port with `workers` loops.
pub fn start_server<A: HttpApplication>(application: A, workers: usize) -> HttpListenerServer {
    start_server_at(application, workers, "http://127.0.0.1:0")
}

/// Start `application` on `address`, which should ask for port 0.
pub fn start_server_at<A: HttpApplication>(
    application: A,
    workers: usize,
    address: &str,
) -> HttpListenerServer {
    let mut server = HttpListenerServer::with_pool_size(workers);
    server.addresses().add(address);
    server.start(application).unwrap();
    server
}

/// `http://ip:port` of the server's first bound socket.
pub fn base_url(server: &HttpListenerServer) -> String {
    format!("http://{}", server.local_addrs()[0])
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
