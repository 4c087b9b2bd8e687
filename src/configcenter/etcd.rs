/// Namespaces stored in etcd, read through the v3 JSON gateway
///
/// Each namespace is a YAML value under `<base_path>/<name>`. Keys and values
/// travel base64-encoded, as the gateway requires.
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{parse_namespace_entries, ConfigCenter};
use crate::config::{ConfigEtcdConfig, Namespace};
use crate::error::{TidegateError, TidegateResult};

/// Per-request bound for gateway calls
pub const ETCD_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct RangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<RawKeyValue>,
}

#[derive(Debug, Deserialize)]
struct RawKeyValue {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Serialize)]
struct AuthRequest<'a> {
    name: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Debug)]
pub struct EtcdConfigCenter {
    client: reqwest::Client,
    endpoints: Vec<String>,
    base_path: String,
    username: String,
    password: String,
    strict_parse: bool,
}

impl EtcdConfigCenter {
    pub fn new(cfg: &ConfigEtcdConfig) -> TidegateResult<Self> {
        if cfg.addrs.is_empty() {
            return Err(TidegateError::config_center("etcd addrs cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(ETCD_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TidegateError::config_center(format!("build etcd client: {}", e)))?;

        Ok(Self {
            client,
            endpoints: cfg.addrs.iter().map(|addr| endpoint_url(addr)).collect(),
            base_path: cfg.base_path.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            strict_parse: cfg.strict_parse,
        })
    }

    fn namespace_key(&self, name: &str) -> String {
        format!("{}/{}", self.base_path, name)
    }

    fn prefix(&self) -> String {
        format!("{}/", self.base_path)
    }

    /// Range query against the first endpoint that answers
    async fn range(
        &self,
        key: &[u8],
        range_end: Option<&[u8]>,
    ) -> TidegateResult<Vec<(String, Vec<u8>)>> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self.range_on(endpoint, key, range_end).await {
                Ok(kvs) => return Ok(kvs),
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "etcd endpoint failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| TidegateError::config_center("no etcd endpoints")))
    }

    async fn range_on(
        &self,
        endpoint: &str,
        key: &[u8],
        range_end: Option<&[u8]>,
    ) -> TidegateResult<Vec<(String, Vec<u8>)>> {
        let body = RangeRequest {
            key: STANDARD.encode(key),
            range_end: range_end.map(|end| STANDARD.encode(end)),
        };

        let mut request = self
            .client
            .post(format!("{}/v3/kv/range", endpoint))
            .json(&body);
        if let Some(token) = self.authenticate(endpoint).await? {
            request = request.header(AUTHORIZATION, token);
        }

        let response: RangeResponse = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TidegateError::config_center(format!("etcd range: {}", e)))?
            .json()
            .await
            .map_err(|e| TidegateError::config_center(format!("decode etcd range: {}", e)))?;

        response
            .kvs
            .into_iter()
            .map(|kv| -> TidegateResult<(String, Vec<u8>)> {
                let key = decode(&kv.key)?;
                let value = decode(&kv.value)?;
                Ok((String::from_utf8_lossy(&key).into_owned(), value))
            })
            .collect()
    }

    async fn authenticate(&self, endpoint: &str) -> TidegateResult<Option<String>> {
        if self.username.is_empty() {
            return Ok(None);
        }

        let body = AuthRequest {
            name: &self.username,
            password: &self.password,
        };
        let response: AuthResponse = self
            .client
            .post(format!("{}/v3/auth/authenticate", endpoint))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TidegateError::config_center(format!("etcd authenticate: {}", e)))?
            .json()
            .await
            .map_err(|e| TidegateError::config_center(format!("decode etcd token: {}", e)))?;

        Ok(Some(response.token))
    }
}

#[async_trait]
impl ConfigCenter for EtcdConfigCenter {
    async fn get_namespace(&self, name: &str) -> TidegateResult<Namespace> {
        let key = self.namespace_key(name);
        let kvs = self.range(key.as_bytes(), None).await?;
        let (_, value) = kvs
            .into_iter()
            .next()
            .ok_or_else(|| TidegateError::config_center(format!("namespace {} not found", name)))?;

        let namespace = Namespace::from_yaml(&value)?;
        namespace.check_name()?;
        Ok(namespace)
    }

    async fn list_all_namespaces(&self) -> TidegateResult<Vec<Namespace>> {
        let prefix = self.prefix();
        let range_end = prefix_range_end(prefix.as_bytes());
        let kvs = self.range(prefix.as_bytes(), Some(range_end.as_slice())).await?;
        debug!(prefix = %prefix, count = kvs.len(), "listed etcd namespaces");

        parse_namespace_entries(kvs, self.strict_parse)
    }
}

fn endpoint_url(addr: &str) -> String {
    let addr = addr.trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

fn decode(encoded: &str) -> TidegateResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| TidegateError::config_center(format!("decode etcd payload: {}", e)))
}

/// End of the key range covering every key that starts with `prefix`
fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // all bytes were 0xff: range to the end of the keyspace
    vec![0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct FakeGateway {
        kvs: Vec<(String, String)>,
        saw_token: AtomicBool,
    }

    async fn read_request(stream: &mut TcpStream) -> (String, String) {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data).into_owned();
            if let Some(split) = text.find("\r\n\r\n") {
                let head = text[..split].to_string();
                let content_length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= split + 4 + content_length {
                    let body = text[split + 4..split + 4 + content_length].to_string();
                    return (head, body);
                }
            }
        }
        (String::from_utf8_lossy(&data).into_owned(), String::new())
    }

    fn range_reply(gateway: &FakeGateway, body: &str) -> String {
        let request: serde_json::Value = serde_json::from_str(body).unwrap();
        let key = STANDARD.decode(request["key"].as_str().unwrap()).unwrap();
        let key = String::from_utf8(key).unwrap();
        let is_prefix = request.get("range_end").is_some();

        let kvs: Vec<serde_json::Value> = gateway
            .kvs
            .iter()
            .filter(|(k, _)| if is_prefix { k.starts_with(&key) } else { *k == key })
            .map(|(k, v)| {
                serde_json::json!({
                    "key": STANDARD.encode(k),
                    "value": STANDARD.encode(v),
                })
            })
            .collect();

        if kvs.is_empty() {
            serde_json::json!({ "header": {} }).to_string()
        } else {
            serde_json::json!({ "header": {}, "kvs": kvs, "count": kvs.len().to_string() })
                .to_string()
        }
    }

    async fn spawn_gateway(kvs: Vec<(&str, &str)>) -> (String, Arc<FakeGateway>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let gateway = Arc::new(FakeGateway {
            kvs: kvs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            saw_token: AtomicBool::new(false),
        });

        let state = Arc::clone(&gateway);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let (head, body) = read_request(&mut stream).await;
                    let reply = if head.starts_with("POST /v3/auth/authenticate") {
                        serde_json::json!({ "header": {}, "token": "test-token" }).to_string()
                    } else {
                        if head.to_ascii_lowercase().contains("authorization: test-token") {
                            state.saw_token.store(true, Ordering::SeqCst);
                        }
                        range_reply(&state, &body)
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        reply.len(),
                        reply
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (addr, gateway)
    }

    fn sample_kvs() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/tidegate/a", "namespace: a\nbackend:\n  instances: [\"db-a:4000\"]\n"),
            ("/tidegate/broken", "namespace: [oops"),
            ("/tidegate/b", "namespace: b\nbackend:\n  instances: [\"db-b:4000\"]\n  selector_type: round_robin\n"),
            ("/tidegate/draft", "namespace: draft\nbackend:\n  instances: []\n"),
            ("/other/c", "namespace: c\nbackend:\n  instances: [\"db-c:4000\"]\n"),
        ]
    }

    fn etcd_config(addrs: Vec<String>, strict_parse: bool) -> ConfigEtcdConfig {
        ConfigEtcdConfig {
            addrs,
            base_path: "/tidegate/".to_string(),
            username: String::new(),
            password: String::new(),
            strict_parse,
        }
    }

    #[test]
    fn test_prefix_range_end() {
        assert_eq!(prefix_range_end(b"/tidegate/"), b"/tidegate0".to_vec());
        assert_eq!(prefix_range_end(b"a\xff"), b"b".to_vec());
        assert_eq!(prefix_range_end(b"\xff\xff"), vec![0]);
    }

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("127.0.0.1:2379"), "http://127.0.0.1:2379");
        assert_eq!(endpoint_url("https://etcd:2379/"), "https://etcd:2379");
    }

    #[test]
    fn test_requires_addrs() {
        assert!(EtcdConfigCenter::new(&etcd_config(vec![], true)).is_err());
    }

    #[tokio::test]
    async fn test_strict_listing_fails() {
        let (addr, _) = spawn_gateway(sample_kvs()).await;
        let center = EtcdConfigCenter::new(&etcd_config(vec![addr], true)).unwrap();

        let err = center.list_all_namespaces().await.unwrap_err();
        assert!(err.to_string().contains("/tidegate/broken"));
    }

    #[tokio::test]
    async fn test_lenient_listing_skips_malformed() {
        let (addr, _) = spawn_gateway(sample_kvs()).await;
        let center = EtcdConfigCenter::new(&etcd_config(vec![addr], false)).unwrap();

        let namespaces = center.list_all_namespaces().await.unwrap();
        let names: Vec<_> = namespaces.iter().map(|n| n.namespace.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "draft"]);
    }

    #[tokio::test]
    async fn test_get_namespace() {
        let (addr, _) = spawn_gateway(sample_kvs()).await;
        let center = EtcdConfigCenter::new(&etcd_config(vec![addr], true)).unwrap();

        let ns = center.get_namespace("b").await.unwrap();
        assert_eq!(ns.backend.instances, vec!["db-b:4000".to_string()]);
        assert_eq!(ns.backend.selector_type, "round_robin");

        assert!(center.get_namespace("missing").await.is_err());
        assert!(center.get_namespace("broken").await.is_err());

        let draft = center.get_namespace("draft").await.unwrap();
        assert!(draft.backend.instances.is_empty());
    }

    #[tokio::test]
    async fn test_fails_over_to_next_endpoint() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        drop(dead);

        let (addr, _) = spawn_gateway(sample_kvs()).await;
        let center = EtcdConfigCenter::new(&etcd_config(vec![dead_addr, addr], false)).unwrap();

        assert_eq!(center.get_namespace("a").await.unwrap().namespace, "a");
    }

    #[tokio::test]
    async fn test_sends_auth_token() {
        let (addr, gateway) = spawn_gateway(sample_kvs()).await;
        let mut cfg = etcd_config(vec![addr], true);
        cfg.username = "root".to_string();
        cfg.password = "secret".to_string();
        let center = EtcdConfigCenter::new(&cfg).unwrap();

        center.get_namespace("a").await.unwrap();
        assert!(gateway.saw_token.load(Ordering::SeqCst));
    }
}
