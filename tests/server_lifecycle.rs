//! Start/stop behavior of the listener-backed server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use listener_server::{BoxError, FnApplication, HttpContext, ServerError};

mod common;

fn ok_app() -> FnApplication<impl Fn(HttpContext) -> std::future::Ready<Result<(), BoxError>>> {
    FnApplication::new(|ctx: HttpContext| {
        std::future::ready(ctx.response().write(b"ok").map_err(BoxError::from))
    })
}

#[tokio::test]
async fn serves_requests_then_stops_cleanly() {
    let mut server = common::start_server(ok_app(), 3);
    let url = common::base_url(&server);
    assert!(server.is_listening());
    assert_eq!(server.running_workers(), 3);

    let res = common::client().get(&url).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "ok");

    let listener = Arc::clone(server.listener().unwrap());
    server.stop().await;

    assert_eq!(server.running_workers(), 0);
    assert!(!server.is_listening());
    assert!(!listener.is_listening());
    // Already closed exactly once by stop.
    assert!(!listener.close());

    // Stopping again is a no-op.
    server.stop().await;
}

#[tokio::test]
async fn second_start_is_rejected() {
    let mut server = common::start_server(ok_app(), 1);
    assert!(matches!(server.start(ok_app()), Err(ServerError::AlreadyStarted)));

    server.stop().await;
    assert!(matches!(server.start(ok_app()), Err(ServerError::AlreadyStarted)));
}

#[tokio::test]
async fn stop_waits_for_in_flight_exchange() {
    let entered = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&entered);
    let app = FnApplication::new(move |ctx: HttpContext| {
        let flag = Arc::clone(&flag);
        async move {
            flag.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(300)).await;
            ctx.response().write(b"finished")?;
            Ok::<(), BoxError>(())
        }
    });
    let mut server = common::start_server(app, 2);
    let url = common::base_url(&server);

    let request = tokio::spawn(async move { common::client().get(&url).send().await });
    assert!(common::wait_until(Duration::from_secs(5), || entered.load(Ordering::SeqCst)).await);

    server.stop().await;

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "finished");
}

#[tokio::test]
async fn stalled_application_blocks_stop() {
    let entered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&entered);
    let app = FnApplication::new(move |_ctx: HttpContext| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok::<(), BoxError>(())
        }
    });
    let mut server = common::start_server(app, 1);
    let url = common::base_url(&server);

    let _request = tokio::spawn(async move { common::client().get(&url).send().await });
    assert!(common::wait_until(Duration::from_secs(5), || entered.load(Ordering::SeqCst) == 1).await);

    let stopped = tokio::time::timeout(Duration::from_millis(300), server.stop()).await;
    assert!(stopped.is_err(), "stop must wait for the stalled exchange");
}

#[tokio::test]
async fn idle_workers_exit_promptly_on_stop() {
    let mut server = common::start_server(ok_app(), 4);

    let stopped = tokio::time::timeout(Duration::from_secs(2), server.stop()).await;
    assert!(stopped.is_ok());
    assert_eq!(server.running_workers(), 0);
}

#[tokio::test]
async fn unmatched_path_is_404_and_path_base_is_split_off() {
    let app = FnApplication::new(|ctx: HttpContext| async move {
        let request = ctx.request();
        ctx.response()
            .write(format!("{}|{}", request.path_base, request.path).as_bytes())?;
        Ok::<(), BoxError>(())
    });
    let mut server = common::start_server_at(app, 1, "http://127.0.0.1:0/api");
    let url = common::base_url(&server);
    let client = common::client();

    let res = client.get(format!("{}/other", url)).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client.get(format!("{}/api/users/7", url)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/api|/users/7");

    server.stop().await;
}

#[tokio::test]
async fn interrupted_stop_can_be_completed_later() {
    let entered = Arc::new(AtomicBool::new(false));
    let release = Arc::new(tokio::sync::Notify::new());
    let app = {
        let entered = Arc::clone(&entered);
        let release = Arc::clone(&release);
        FnApplication::new(move |ctx: HttpContext| {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            async move {
                entered.store(true, Ordering::SeqCst);
                release.notified().await;
                ctx.response().write(b"released")?;
                Ok::<(), BoxError>(())
            }
        })
    };
    let mut server = common::start_server(app, 2);
    let url = common::base_url(&server);
    let listener = Arc::clone(server.listener().unwrap());

    let request = tokio::spawn(async move { common::client().get(&url).send().await });
    assert!(common::wait_until(Duration::from_secs(5), || entered.load(Ordering::SeqCst)).await);

    let first = tokio::time::timeout(Duration::from_millis(200), server.stop()).await;
    assert!(first.is_err());
    assert!(listener.is_listening());

    release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .expect("second stop should finish once the exchange is released");

    assert_eq!(server.running_workers(), 0);
    assert!(server.listener().is_none());
    assert!(!listener.is_listening());
    assert!(!listener.close());

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.text().await.unwrap(), "released");
}

#[tokio::test]
async fn workers_exit_when_listener_closes_underneath() {
    let mut server = common::start_server(ok_app(), 3);
    assert_eq!(server.running_workers(), 3);

    assert!(server.listener().unwrap().close());

    assert!(common::wait_until(Duration::from_secs(2), || server.running_workers() == 0).await);
    assert!(!server.is_listening());

    // Nothing left to join or close.
    tokio::time::timeout(Duration::from_secs(1), server.stop())
        .await
        .unwrap();
}

#[tokio::test]
async fn dropping_a_running_server_releases_workers_and_socket() {
    let server = common::start_server(ok_app(), 2);
    let addr = server.local_addrs()[0];
    let listener = Arc::clone(server.listener().unwrap());

    drop(server);

    assert!(!listener.is_listening());
    // Workers hold the other references until they exit.
    assert!(common::wait_until(Duration::from_secs(2), || Arc::strong_count(&listener) == 1).await);
    assert!(
        common::wait_until(Duration::from_secs(2), || std::net::TcpListener::bind(addr).is_ok()).await,
        "listening socket should be released"
    );
}
