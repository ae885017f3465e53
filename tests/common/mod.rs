#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

use resi::auth::{SecurityKeys, Token, TokenSealer};
use resi::demo::demo_surface;
use resi::server::{create_router, ServerOptions};
use resi::synthesis::ModelSource;

static SERVER: OnceLock<TestServer> = OnceLock::new();

/// The demo surface served in-process on its own runtime thread, shared by
/// every test in one test binary
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    keys: SecurityKeys,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let listener = std::net::TcpListener::bind(("127.0.0.1", port)).context("failed to bind test port")?;
        listener.set_nonblocking(true)?;

        let keys = SecurityKeys::generate();
        let options = ServerOptions {
            security: Some(keys.clone()),
            client_builder: true,
            request_logging: false,
            models: vec![ModelSource::new("user.js", "export class User {}\n")],
            ..Default::default()
        };
        let router = create_router(demo_surface(options.sealer(), 1), &options);

        // Outlives the runtime of any single #[tokio::test]
        std::thread::Builder::new()
            .name("resi-test-server".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build server runtime");
                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener).expect("failed to adopt listener");
                    axum::serve(listener, router).await.expect("server stopped");
                });
            })
            .context("failed to spawn server thread")?;

        Ok(Self { port, base_url, keys })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = self.url("meta", "nothing");
            if let Ok(resp) = client.post(&url).json(&json!({})).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    /// `/resi/{api}/{handler}` on this server
    pub fn url(&self, api: &str, handler: &str) -> String {
        format!("{}/resi/{}/{}", self.base_url, api, handler)
    }

    /// Sealer holding the server's own keys, for forging test tokens
    pub fn sealer(&self) -> Arc<TokenSealer> {
        Arc::new(TokenSealer::new(self.keys.clone()))
    }

    pub fn bearer(&self, token: &Token) -> Result<String> {
        Ok(format!("Bearer {}", self.sealer().seal(token)?))
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn test server"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// POST `{"args": args}` and return status plus parsed body (`Null` when empty)
pub async fn call(server: &TestServer, api: &str, handler: &str, args: Value, bearer: Option<&str>) -> Result<(StatusCode, Value)> {
    let mut request = reqwest::Client::new()
        .post(server.url(api, handler))
        .json(&json!({ "args": args }));
    if let Some(bearer) = bearer {
        request = request.header("authorization", bearer);
    }

    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}
