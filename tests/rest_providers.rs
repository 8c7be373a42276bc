//! Indexer and alternate REST providers against a local HTTP server.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use multi_provider_balance::{
    AlternateRestProvider, BalanceProvider, CancellationToken, IndexerProvider,
    MultiProviderResolver, Outcome, ProviderError, QueryContext, RateLimiter, Settings, CHAINS,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::Instant,
};

const ADDRESS: &str = "5F5522o328T8MNsjDBTWXjfJvtdQsnUne2wjGvwLC4dLdmBC";

#[derive(Debug, Clone)]
struct Seen {
    request_line: String,
    headers: String,
    body: String,
    at: Instant,
}

type Router = fn(&str, &str) -> (u16, String);

/// One-request-per-connection HTTP/1.1 server.
async fn spawn_server(route: Router) -> (SocketAddr, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = Arc::clone(&log);
            tokio::spawn(async move { serve(stream, route, log).await });
        }
    });

    (addr, seen)
}

async fn serve(mut stream: TcpStream, route: Router, log: Arc<Mutex<Vec<Seen>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();
    let request_line = head.lines().next().unwrap_or_default().to_string();
    let path = request_line.split(' ').nth(1).unwrap_or_default().to_string();

    log.lock().unwrap().push(Seen {
        request_line,
        headers: head.to_ascii_lowercase(),
        body: body.clone(),
        at: Instant::now(),
    });

    let (status, reply) = route(&path, &body);
    let response = format!(
        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
        reply.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Accepts connections and never answers.
async fn spawn_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

fn indexer_route(path: &str, body: &str) -> (u16, String) {
    if path != "/api/scan/account" {
        return (404, "{}".into());
    }
    if body.contains("unknown") {
        return (200, r#"{"code":10004,"message":"Record Not Found"}"#.into());
    }
    (
        200,
        r#"{"code":0,"message":"Success","data":{"account":{"address":"x","data":{"free":"1000000000000","reserved":"500000000000"}}}}"#
            .into(),
    )
}

fn alternate_route(path: &str, _body: &str) -> (u16, String) {
    match path {
        p if p.starts_with("/v1/accounts/") => (
            200,
            r#"{"data":{"balance":{"free":"30000000000","reserved":"0"}}}"#.into(),
        ),
        _ => (404, "not here".into()),
    }
}

fn settings(indexer: Option<SocketAddr>, alternate: Option<SocketAddr>) -> Settings {
    let mut settings = Settings::for_chain(&CHAINS[0]);
    settings.indexer_base_url = indexer.map(|a| format!("http://{a}"));
    settings.indexer_api_key = Some("test-key".into());
    settings.alternate_rest_base_url = alternate.map(|a| format!("http://{a}/"));
    settings.alternate_rest_api_key = Some("alt-key".into());
    settings.chain_rpc_endpoint_list = Vec::new();
    settings
}

#[tokio::test]
async fn indexer_posts_the_account_key() {
    let (addr, seen) = spawn_server(indexer_route).await;
    let settings = settings(Some(addr), None);
    let indexer = IndexerProvider::from_settings(&settings, RateLimiter::new(5)).unwrap();

    let balance = indexer
        .fetch_balance(ADDRESS, &QueryContext::new())
        .await
        .unwrap();
    assert_eq!(balance.total_display(), "150");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].request_line.starts_with("POST /api/scan/account"));
    assert!(seen[0].headers.contains("x-api-key: test-key"));
    assert_eq!(seen[0].body, format!(r#"{{"key":"{ADDRESS}"}}"#));
}

#[tokio::test]
async fn indexer_requests_are_spaced_by_the_limiter() {
    let (addr, seen) = spawn_server(indexer_route).await;
    let settings = settings(Some(addr), None);
    let indexer = Arc::new(IndexerProvider::from_settings(&settings, RateLimiter::new(5)).unwrap());

    let lookups = (0..4).map(|_| {
        let indexer = Arc::clone(&indexer);
        tokio::spawn(async move { indexer.fetch_balance(ADDRESS, &QueryContext::new()).await })
    });
    for handle in futures::future::join_all(lookups).await {
        assert!(handle.unwrap().is_ok());
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    for pair in seen.windows(2) {
        // Arrival jitter on loopback is far below the 200ms spacing.
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(150));
    }
}

#[tokio::test]
async fn indexer_miss_is_no_data() {
    let (addr, _) = spawn_server(indexer_route).await;
    let settings = settings(Some(addr), None);
    let indexer = IndexerProvider::from_settings(&settings, RateLimiter::new(5)).unwrap();

    let err = indexer
        .fetch_balance("unknown-account", &QueryContext::new())
        .await
        .unwrap_err();
    assert!(err.is_no_data(), "{err}");
}

#[tokio::test]
async fn cancelled_lookup_is_never_sent() {
    let (addr, seen) = spawn_server(indexer_route).await;
    let settings = settings(Some(addr), None);
    let indexer = Arc::new(IndexerProvider::from_settings(&settings, RateLimiter::new(1)).unwrap());

    indexer
        .fetch_balance(ADDRESS, &QueryContext::new())
        .await
        .unwrap();

    let token = CancellationToken::new();
    let ctx = QueryContext::new().with_cancellation(token.clone());
    let queued = {
        let indexer = Arc::clone(&indexer);
        tokio::spawn(async move { indexer.fetch_balance(ADDRESS, &ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(indexer.limiter().queue_len(), 1);
    token.cancel();

    let err = queued.await.unwrap().unwrap_err();
    assert!(err.is_cancelled(), "{err}");

    // Well past the one second slot the cancelled entry was waiting for.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(indexer.limiter().queue_len(), 0);
}

#[tokio::test]
async fn indexer_honours_the_http_timeout() {
    let addr = spawn_silent_server().await;
    let mut settings = settings(Some(addr), None);
    settings.timeouts.http = Duration::from_millis(300);
    let indexer = IndexerProvider::from_settings(&settings, RateLimiter::new(5)).unwrap();

    let started = Instant::now();
    let err = indexer
        .fetch_balance(ADDRESS, &QueryContext::new())
        .await
        .unwrap_err();

    assert!(matches!(&err, ProviderError::Http(e) if e.is_timeout()), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn alternate_encodes_the_address_segment() {
    let (addr, seen) = spawn_server(alternate_route).await;
    let settings = settings(None, Some(addr));
    let alternate = AlternateRestProvider::from_settings(&settings).unwrap();

    alternate
        .fetch_balance("a/b?c#d", &QueryContext::new())
        .await
        .unwrap();

    let first = seen.lock().unwrap()[0].request_line.clone();
    assert!(
        first.starts_with("GET /accounts/a%2Fb%3Fc%23d/balance-info "),
        "{first}"
    );
}

#[tokio::test]
async fn alternate_walks_path_variants() {
    let (addr, seen) = spawn_server(alternate_route).await;
    let settings = settings(None, Some(addr));
    let alternate = AlternateRestProvider::from_settings(&settings).unwrap();

    let balance = alternate
        .fetch_balance(ADDRESS, &QueryContext::new())
        .await
        .unwrap();
    assert_eq!(balance.total_display(), "3");

    let seen = seen.lock().unwrap();
    let paths: Vec<_> = seen
        .iter()
        .map(|s| s.request_line.split(' ').nth(1).unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        paths,
        [
            format!("/accounts/{ADDRESS}/balance-info"),
            format!("/v1/accounts/{ADDRESS}/balance"),
        ]
    );
    assert!(seen[0].headers.contains("authorization: bearer alt-key"));
}

#[tokio::test]
async fn alternate_reports_every_failed_variant() {
    let (addr, _) = spawn_server(|_, _| (500, "boom".into())).await;
    let settings = settings(None, Some(addr));
    let alternate = AlternateRestProvider::from_settings(&settings).unwrap();

    let err = alternate
        .fetch_balance(ADDRESS, &QueryContext::new())
        .await
        .unwrap_err();
    let ProviderError::AllEndpointsFailed(failures) = err else {
        panic!("unexpected error {err}");
    };
    assert_eq!(failures.len(), 4);
    assert!(failures.iter().all(|(_, e)| e.contains("500")));
}

#[tokio::test]
async fn resolver_skips_unknown_account_to_alternate() {
    let (indexer, _) = spawn_server(indexer_route).await;
    let (alternate, _) = spawn_server(alternate_route).await;
    let resolver = MultiProviderResolver::from_settings(&settings(Some(indexer), Some(alternate))).unwrap();

    let resolution = resolver.resolve("unknown-account", &QueryContext::new()).await;

    let Outcome::Found(result) = &resolution.outcome else {
        panic!("unexpected outcome {:?}", resolution.outcome);
    };
    assert_eq!(result.provider, "Alternate REST");
    assert_eq!(result.total, "3");
    assert_eq!(resolution.attempts.len(), 2);
    assert!(!resolution.attempts[0].succeeded());
}

#[tokio::test]
async fn portfolio_uses_each_chain_indexer() {
    let (addr, seen) = spawn_server(indexer_route).await;
    let settings = settings(Some(addr), None);
    let resolver = MultiProviderResolver::from_settings(&settings).unwrap();

    let mut chain = CHAINS[1];
    let url: &'static str = Box::leak(format!("http://{addr}").into_boxed_str());
    chain.indexer_url = url;

    let found = resolver
        .portfolio(ADDRESS, &[chain], &QueryContext::new())
        .await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].chain, "Kusama");
    assert_eq!(found[0].result.token, "KSM");
    // 1.5e12 planck at 12 decimals
    assert_eq!(found[0].result.total, "1.5");
    assert_eq!(seen.lock().unwrap().len(), 1);
}
