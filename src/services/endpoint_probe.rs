use std::time::{Duration, Instant};

use reqwest::{redirect, Client};

use crate::error::ConfigError;
use crate::models::EndpointStatus;

/// 对健康检查 URL 发起带超时的 GET
///
/// 所有失败都表示为 `EndpointStatus`，不会返回错误。
#[derive(Clone)]
pub struct EndpointProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl EndpointProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::invalid("endpointURL", format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    pub async fn probe(&self) -> EndpointStatus {
        let started = Instant::now();

        // reqwest 自带超时，外层 timeout 兜住 DNS 解析等不受其约束的阶段
        let result = tokio::time::timeout(self.timeout, self.client.get(&self.url).send()).await;

        let status = match result {
            Err(_) => EndpointStatus::Timeout,
            Ok(Ok(response)) => {
                let code = response.status();
                if code.is_success() || code.is_redirection() {
                    EndpointStatus::responding(started.elapsed())
                } else {
                    EndpointStatus::BadStatus { code: code.as_u16() }
                }
            }
            Ok(Err(e)) => classify_error(&e),
        };

        log::debug!("Probe {} -> {}", self.url, status);
        status
    }
}

fn classify_error(err: &reqwest::Error) -> EndpointStatus {
    if err.is_timeout() {
        EndpointStatus::Timeout
    } else {
        EndpointStatus::Unreachable {
            reason: root_cause(err),
        }
    }
}

fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn health() -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({ "status": "healthy" }))
    }

    async fn broken() -> HttpResponse {
        HttpResponse::InternalServerError().body("boom")
    }

    fn start_server() -> SocketAddr {
        let server = HttpServer::new(|| {
            App::new()
                .route("/api/health", web::get().to(health))
                .route("/broken", web::get().to(broken))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        addr
    }

    #[actix_web::test]
    async fn test_responding_endpoint() {
        let addr = start_server();
        let probe = EndpointProbe::new(&format!("http://{}/api/health", addr), Duration::from_secs(2)).unwrap();

        let status = probe.probe().await;
        assert!(status.is_responding(), "unexpected status: {:?}", status);
    }

    #[actix_web::test]
    async fn test_server_error_is_bad_status() {
        let addr = start_server();
        let probe = EndpointProbe::new(&format!("http://{}/broken", addr), Duration::from_secs(2)).unwrap();

        assert_eq!(probe.probe().await, EndpointStatus::BadStatus { code: 500 });
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = EndpointProbe::new(&format!("http://{}/api/health", addr), Duration::from_secs(2)).unwrap();
        let status = probe.probe().await;
        assert!(matches!(status, EndpointStatus::Unreachable { .. }), "unexpected status: {:?}", status);
    }

    #[tokio::test]
    async fn test_silent_server_is_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // 接受连接但从不响应
        let hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let probe = EndpointProbe::new(&format!("http://{}/api/health", addr), Duration::from_millis(300)).unwrap();
        let started = Instant::now();
        let status = probe.probe().await;

        assert_eq!(status, EndpointStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
        hold.abort();
    }
}
