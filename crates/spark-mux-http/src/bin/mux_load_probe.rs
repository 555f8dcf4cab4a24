//! 多路复用交换与“每请求一条连接”基线的耗时对比探针。
//!
//! # 教案式说明
//! - **Why**：多路复用的收益来自摊薄建连成本，本探针在同一进程内跑两种模式，直观对比总耗时；
//! - **How**：各启动一个临时端口上的服务端，分 `--rounds` 轮、每轮 `--concurrency` 个并发交换，
//!   累加每轮耗时；
//! - **What**：标准输出打印两行 `mode=... rounds=... concurrency=... total_ms=... failures=...`。

use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, client::conn::http1 as client_http1, server::conn::http1};
use hyper_util::rt::TokioIo;
use spark_mux_http::{
    Handler, MuxClient, MuxServer, Router, read_response_body, telemetry, text_response,
};
use std::{
    convert::Infallible,
    env,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const PAYLOAD: &str = "Welcome to the home page!";
const PATH: &str = "/cenas";

struct ProbeArgs {
    rounds: usize,
    concurrency: usize,
}

impl ProbeArgs {
    fn parse() -> Result<Self, String> {
        let mut args = ProbeArgs {
            rounds: 5,
            concurrency: 100,
        };
        let mut iter = env::args().skip(1);
        while let Some(flag) = iter.next() {
            let slot = match flag.as_str() {
                "--rounds" => &mut args.rounds,
                "--concurrency" => &mut args.concurrency,
                other => return Err(format!("unknown argument `{other}`")),
            };
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for `{flag}`"))?;
            *slot = value
                .parse()
                .map_err(|err| format!("invalid value for `{flag}`: {err}"))?;
        }
        Ok(args)
    }
}

fn router() -> Router {
    Router::new().route(PATH, |_request: Request<Incoming>| async {
        text_response(StatusCode::OK, PAYLOAD)
    })
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing();
    let args = match ProbeArgs::parse() {
        Ok(args) => args,
        Err(reason) => {
            eprintln!("{reason}");
            eprintln!("usage: mux_load_probe [--rounds N] [--concurrency N]");
            std::process::exit(2);
        }
    };

    let (mux_total, mux_failures) = run_mux(&args).await;
    println!(
        "mode=mux rounds={} concurrency={} total_ms={} failures={}",
        args.rounds,
        args.concurrency,
        mux_total.as_millis(),
        mux_failures
    );

    let (plain_total, plain_failures) = run_plain(&args).await;
    println!(
        "mode=plain rounds={} concurrency={} total_ms={} failures={}",
        args.rounds,
        args.concurrency,
        plain_total.as_millis(),
        plain_failures
    );
}

async fn run_mux(args: &ProbeArgs) -> (Duration, usize) {
    let server = match MuxServer::new("127.0.0.1:0", None, router()) {
        Ok(server) => Arc::new(server),
        Err(err) => {
            warn!(error = %err, "mux server config rejected");
            return (Duration::ZERO, args.rounds * args.concurrency);
        }
    };
    let serving = Arc::clone(&server);
    let task = tokio::spawn(async move { serving.serve().await });
    let Some(addr) = server.listening().await else {
        warn!("mux server failed to bind");
        return (Duration::ZERO, args.rounds * args.concurrency);
    };
    info!(%addr, "mux probe server ready");

    let client = MuxClient::new(addr.to_string());
    let mut total = Duration::ZERO;
    let mut failures = 0;
    for _ in 0..args.rounds {
        let started = Instant::now();
        let mut exchanges = Vec::with_capacity(args.concurrency);
        for _ in 0..args.concurrency {
            let client = client.clone();
            exchanges.push(tokio::spawn(async move {
                let response = client.issue(Method::GET, PATH, &HeaderMap::new()).await?;
                read_response_body(response).await
            }));
        }
        for exchange in exchanges {
            match exchange.await {
                Ok(Ok(body)) if body == PAYLOAD.as_bytes() => {}
                _ => failures += 1,
            }
        }
        total += started.elapsed();
    }

    server.close();
    if let Ok(Err(err)) = task.await {
        warn!(error = %err, "mux probe server ended with error");
    }
    (total, failures)
}

async fn run_plain(args: &ProbeArgs) -> (Duration, usize) {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(error = %err, "plain server failed to bind");
            return (Duration::ZERO, args.rounds * args.concurrency);
        }
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => {
            warn!(error = %err, "plain server has no local address");
            return (Duration::ZERO, args.rounds * args.concurrency);
        }
    };
    let handler = Arc::new(router());
    let acceptor = tokio::spawn(async move {
        while let Ok((conn, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let service = hyper::service::service_fn(move |request| {
                    let response = handler.handle(request);
                    async move { Ok::<_, Infallible>(response.await) }
                });
                if let Err(err) = http1::Builder::new()
                    .serve_connection(TokioIo::new(conn), service)
                    .await
                {
                    debug!(error = %err, "plain exchange connection failed");
                }
            });
        }
    });

    let mut total = Duration::ZERO;
    let mut failures = 0;
    for _ in 0..args.rounds {
        let started = Instant::now();
        let mut exchanges = Vec::with_capacity(args.concurrency);
        for _ in 0..args.concurrency {
            exchanges.push(tokio::spawn(plain_exchange(addr.to_string())));
        }
        for exchange in exchanges {
            match exchange.await {
                Ok(Some(body)) if body == PAYLOAD.as_bytes() => {}
                _ => failures += 1,
            }
        }
        total += started.elapsed();
    }
    acceptor.abort();
    (total, failures)
}

async fn plain_exchange(addr: String) -> Option<Bytes> {
    let conn = TcpStream::connect(&addr).await.ok()?;
    let (mut sender, connection) = client_http1::handshake(TokioIo::new(conn)).await.ok()?;
    tokio::spawn(connection);
    let request = Request::builder()
        .uri(PATH)
        .header(http::header::HOST, addr)
        .body(Full::new(Bytes::new()))
        .ok()?;
    let response = sender.send_request(request).await.ok()?;
    let body = response.into_body().collect().await.ok()?;
    Some(body.to_bytes())
}
