//! 客户端会话缓存：首次使用的并发建立、拨号失败与失效会话替换。

mod common;

use common::{CountingYamux, WELCOME, eventually, start, start_default, test_router};
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use hyper::body::Incoming;
use spark_mux_http::{
    ClientConfig, ErrorCategory, ExchangeError, MuxClient, MuxConfig, MuxServer, Multiplexer,
    Yamux, read_response_body, serve_session, text_response,
};
use std::{
    sync::{Arc, Mutex, atomic::Ordering},
    time::{Duration, Instant},
};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};

async fn fetch_welcome<M: Multiplexer>(client: &MuxClient<M>) {
    let response = client
        .issue(Method::GET, "/cenas", &HeaderMap::new())
        .await
        .expect("交换应成功");
    let body = read_response_body(response).await.expect("读取响应体失败");
    assert_eq!(&body[..], WELCOME.as_bytes());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_first_use_establishes_one_session() {
    let running = start_default().await;
    let dialer = CountingYamux {
        setup_delay: Duration::from_millis(50),
        ..CountingYamux::default()
    };
    let client =
        MuxClient::with_multiplexer(running.addr.to_string(), ClientConfig::default(), dialer.clone());

    let mut exchanges = Vec::new();
    for _ in 0..32 {
        let client = client.clone();
        exchanges.push(tokio::spawn(async move { fetch_welcome(&client).await }));
    }
    for exchange in exchanges {
        exchange.await.expect("交换任务崩溃");
    }

    assert_eq!(dialer.count(), 1, "并发首次调用只应握手一次");
    assert_eq!(client.sessions_established(), 1);
    assert!(client.has_live_session().await);

    running.server.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_server_surfaces_connect_error() {
    let vacant = TcpListener::bind("127.0.0.1:0").await.expect("绑定临时端口失败");
    let addr = vacant.local_addr().expect("读取临时端口失败");
    drop(vacant);

    let client = MuxClient::with_config(
        addr.to_string(),
        ClientConfig::default().with_connect_timeout(Duration::from_secs(2)),
    );
    let started = Instant::now();
    for _ in 0..2 {
        let err = client
            .issue(Method::GET, "/cenas", &HeaderMap::new())
            .await
            .expect_err("没有服务端时交换应失败");
        assert!(err.is_connect(), "应为拨号类错误: {err:?}");
    }
    assert!(started.elapsed() < Duration::from_secs(5), "失败必须在有限时间内返回");
    assert_eq!(client.sessions_established(), 0);
    assert!(!client.has_live_session().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_handshake_leaves_cache_empty_for_retry() {
    let running = start_default().await;
    let dialer = CountingYamux::default();
    dialer
        .reject_first_client
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let client =
        MuxClient::with_multiplexer(running.addr.to_string(), ClientConfig::default(), dialer.clone());

    let err = client
        .issue(Method::GET, "/cenas", &HeaderMap::new())
        .await
        .expect_err("首次握手被拒绝");
    match err {
        ExchangeError::Transport(ref transport) => {
            assert_eq!(transport.category(), ErrorCategory::Session);
            assert_eq!(transport.code(), "spark.transport.mux.session_failed");
        }
        other => panic!("意外的错误类型: {other:?}"),
    }
    assert!(!client.has_live_session().await);

    fetch_welcome(&client).await;
    assert_eq!(client.sessions_established(), 1);
    assert_eq!(dialer.count(), 1);

    running.server.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_session_is_replaced_on_next_exchange() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("绑定测试端口失败");
    let addr = listener.local_addr().expect("读取测试端口失败");
    let handler = Arc::new(test_router());
    let sessions: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::default();

    let acceptor = {
        let sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            while let Ok((conn, _)) = listener.accept().await {
                let session = Yamux
                    .server_session(conn, &MuxConfig::default())
                    .await
                    .expect("服务端会话建立失败");
                let task = tokio::spawn(serve_session(session, Arc::clone(&handler)));
                sessions.lock().expect("会话列表锁中毒").push(task);
            }
        })
    };

    let client = MuxClient::new(addr.to_string());
    fetch_welcome(&client).await;
    assert_eq!(client.sessions_established(), 1);

    let first = sessions.lock().expect("会话列表锁中毒").remove(0);
    first.abort();
    assert!(
        eventually(Duration::from_secs(5), || async { !client.has_live_session().await }).await,
        "服务端关闭连接后客户端应察觉会话失效"
    );

    fetch_welcome(&client).await;
    assert_eq!(client.sessions_established(), 2);
    assert!(client.has_live_session().await);

    acceptor.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_stream_open_keeps_session_for_other_exchanges() {
    let running = start_default().await;
    let dialer = CountingYamux::default();
    let client =
        MuxClient::with_multiplexer(running.addr.to_string(), ClientConfig::default(), dialer.clone());
    fetch_welcome(&client).await;

    dialer.fail_next_stream.store(true, Ordering::SeqCst);
    let mut exchanges = Vec::new();
    for _ in 0..16 {
        let client = client.clone();
        exchanges.push(tokio::spawn(async move {
            let response = client.issue(Method::GET, "/cenas", &HeaderMap::new()).await?;
            read_response_body(response).await
        }));
    }
    let mut failures = Vec::new();
    for exchange in exchanges {
        match exchange.await.expect("交换任务崩溃") {
            Ok(body) => assert_eq!(&body[..], WELCOME.as_bytes()),
            Err(err) => failures.push(err),
        }
    }
    assert_eq!(failures.len(), 1, "只有一条逻辑流应打开失败: {failures:?}");
    match &failures[0] {
        ExchangeError::Transport(transport) => {
            assert_eq!(transport.category(), ErrorCategory::Stream);
        }
        other => panic!("意外的错误类型: {other:?}"),
    }

    assert!(client.has_live_session().await, "逻辑流失败不得驱逐存活会话");
    fetch_welcome(&client).await;
    assert_eq!(client.sessions_established(), 1);
    assert_eq!(dialer.count(), 1);

    running.server.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_handler_does_not_disturb_the_session() {
    let router = test_router().route("/explode", |request: Request<Incoming>| async move {
        assert!(
            request.headers().get("x-explode").is_none(),
            "handler exploded on request"
        );
        text_response(StatusCode::OK, "calm")
    });
    let running = start(MuxServer::new("127.0.0.1:0", None, router).expect("默认配置必须合法")).await;
    let client = MuxClient::new(running.addr.to_string());
    fetch_welcome(&client).await;

    let mut explode = HeaderMap::new();
    explode.insert("x-explode", HeaderValue::from_static("1"));
    let failing = {
        let client = client.clone();
        tokio::spawn(async move {
            let response = client.issue(Method::GET, "/explode", &explode).await?;
            read_response_body(response).await
        })
    };
    let mut healthy = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        healthy.push(tokio::spawn(async move { fetch_welcome(&client).await }));
    }

    let outcome = timeout(Duration::from_secs(5), failing)
        .await
        .expect("失败的交换必须在有限时间内结束")
        .expect("交换任务崩溃");
    assert!(outcome.is_err(), "处理器崩溃的交换应以错误结束");
    for exchange in healthy {
        exchange.await.expect("并发交换不应受影响");
    }

    let response = client
        .issue(Method::GET, "/explode", &HeaderMap::new())
        .await
        .expect("同一路由的后续交换应成功");
    let body = read_response_body(response).await.expect("读取响应体失败");
    assert_eq!(&body[..], b"calm");
    assert_eq!(client.sessions_established(), 1);
    assert!(client.has_live_session().await);

    running.server.close();
}
