use anyhow::Result;
use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;
use tokio::time::timeout;

use http_o11y::Cli;

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn cli_for(port: u16) -> Cli {
    Cli {
        port: Some(port),
        bind: Some("127.0.0.1".to_string()),
        exporter: Some("noop".to_string()),
        ..Default::default()
    }
}

async fn get_with_retry(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let mut last_err = None;
    for _ in 0..50 {
        match client.get(url).send().await {
            Ok(response) => return Ok(response),
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }
    Err(last_err.map(anyhow::Error::from).unwrap_or_else(|| anyhow::anyhow!("no attempt made")))
}

/// Server starts, answers /ping and exposes the request counter
#[tokio::test(flavor = "multi_thread")]
async fn test_server_serves_ping_and_metrics() -> Result<()> {
    let port = free_port()?;
    let server_handle = tokio::spawn(http_o11y::run_server(cli_for(port)));

    let client = reqwest::Client::new();
    let response = timeout(
        Duration::from_secs(5),
        get_with_retry(&client, &format!("http://127.0.0.1:{port}/ping")),
    )
    .await??;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["ok"], true);

    let metrics = client
        .get(format!("http://127.0.0.1:{port}/metrics"))
        .send()
        .await?;
    assert_eq!(metrics.status(), 200);
    assert!(
        metrics.headers()["content-type"]
            .to_str()?
            .starts_with("text/plain")
    );
    let text = metrics.text().await?;
    assert!(text.contains(r#"http_requests_total{code="200",method="GET",path="/ping"} 1"#));

    server_handle.abort();
    Ok(())
}

/// Responses carry trace propagation headers
#[tokio::test(flavor = "multi_thread")]
async fn test_responses_carry_traceparent() -> Result<()> {
    let port = free_port()?;
    let server_handle = tokio::spawn(http_o11y::run_server(cli_for(port)));

    let client = reqwest::Client::new();
    let response = timeout(
        Duration::from_secs(5),
        get_with_retry(&client, &format!("http://127.0.0.1:{port}/missing")),
    )
    .await??;
    assert_eq!(response.status(), 404);
    assert!(response.headers().contains_key("traceparent"));

    server_handle.abort();
    Ok(())
}

/// Server returns clear error when port is already in use
#[tokio::test(flavor = "multi_thread")]
async fn test_port_conflict_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    let result = timeout(Duration::from_secs(5), http_o11y::run_server(cli_for(port))).await?;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("Failed to bind"));

    drop(listener);
    Ok(())
}

/// A push exporter without an endpoint stops startup
#[tokio::test(flavor = "multi_thread")]
async fn test_missing_exporter_endpoint_prevents_startup() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[tracing]\nexporter = \"jaeger\"\njaeger_endpoint = \"  \"")?;

    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        port: Some(free_port()?),
        bind: Some("127.0.0.1".to_string()),
        ..Default::default()
    };
    let result = timeout(Duration::from_secs(5), http_o11y::run_server(cli)).await?;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("OTEL_EXPORTER_JAEGER_ENDPOINT"), "{err}");
    Ok(())
}
