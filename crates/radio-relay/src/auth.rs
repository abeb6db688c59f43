/// Three-step handshake with the commercial network's origin.
///
/// The origin binds the token from leg 1 to the IP that asked for it, so
/// both legs go out through the one `reqwest::Client` owned by the relay
/// process, inside a single call.  Nothing is cached here: the only state
/// kept between calls is the table of handshakes still in flight, which lets
/// concurrent callers for the same client IP share one leg-1/leg-2 pair.
use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use radio_proto::config::OriginConfig;
use radio_proto::error::{RadioError, Result};
use radio_proto::protocol::AuthResponse;

/// Publicly known key the partial key is sliced from.
pub const SHARED_SECRET: &str = "bcd151073c03b352e1ef2fd66c32209da9ca0afa";

pub const HEADER_AUTH_TOKEN: &str = "X-Radiko-AuthToken";
pub const HEADER_KEY_OFFSET: &str = "X-Radiko-KeyOffset";
pub const HEADER_KEY_LENGTH: &str = "X-Radiko-KeyLength";
pub const HEADER_PARTIAL_KEY: &str = "X-Radiko-PartialKey";
pub const HEADER_REAL_IP: &str = "X-Real-IP";

const APP_HEADERS: &[(&str, &str)] = &[
    ("X-Radiko-App", "pc_html5"),
    ("X-Radiko-App-Version", "0.0.1"),
];
const DEVICE_HEADERS: &[(&str, &str)] = &[
    ("X-Radiko-Device", "pc"),
    ("X-Radiko-User", "dummy_user"),
];

type SharedHandshake = Shared<BoxFuture<'static, Result<AuthResponse>>>;

struct InFlight {
    id: u64,
    handshake: SharedHandshake,
}

#[derive(Default)]
struct InFlightTable {
    next_id: u64,
    entries: HashMap<String, InFlight>,
}

/// What leg 1 hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub token: String,
    pub key_offset: usize,
    pub key_length: usize,
}

#[derive(Clone)]
pub struct AuthRelay {
    client: Client,
    origin: OriginConfig,
    inflight: Arc<Mutex<InFlightTable>>,
}

impl AuthRelay {
    pub fn new(client: Client, origin: OriginConfig) -> Self {
        Self {
            client,
            origin,
            inflight: Arc::new(Mutex::new(InFlightTable::default())),
        }
    }

    /// Run the handshake on behalf of `client_ip` (forwarded to the origin
    /// in `X-Real-IP`).  `None` lets the origin see the relay's own address.
    pub async fn authenticate(&self, client_ip: Option<&str>) -> Result<AuthResponse> {
        let key = client_ip.unwrap_or_default().to_string();

        let handshake = {
            let mut inflight = self.inflight.lock().await;
            match inflight.entries.get(&key) {
                Some(existing) => {
                    debug!("auth: joining in-flight handshake for {:?}", key);
                    existing.handshake.clone()
                }
                None => {
                    inflight.next_id += 1;
                    let id = inflight.next_id;
                    let fresh = self.spawn_handshake(key.clone(), id, client_ip);
                    inflight.entries.insert(
                        key,
                        InFlight {
                            id,
                            handshake: fresh.clone(),
                        },
                    );
                    fresh
                }
            }
        };

        handshake.await
    }

    /// The handshake runs as its own task and forgets its table entry when
    /// it settles, whether or not anyone is still waiting on it.
    fn spawn_handshake(&self, key: String, id: u64, client_ip: Option<&str>) -> SharedHandshake {
        let relay = self.clone();
        let ip = client_ip.map(str::to_owned);
        let task = tokio::spawn(async move {
            let result = relay.handshake(ip.as_deref()).await;
            let mut inflight = relay.inflight.lock().await;
            if inflight.entries.get(&key).is_some_and(|e| e.id == id) {
                inflight.entries.remove(&key);
            }
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(RadioError::upstream("auth", e)))
        }
        .boxed()
        .shared()
    }

    async fn handshake(&self, client_ip: Option<&str>) -> Result<AuthResponse> {
        let challenge = self.leg1(client_ip).await?;
        let partial_key = partial_key(challenge.key_offset, challenge.key_length)?;
        let body = self.leg2(&challenge.token, &partial_key, client_ip).await?;

        let region_code =
            parse_region(&body).unwrap_or_else(|| self.origin.fallback_region.clone());
        info!("auth: handshake complete, region={}", region_code);

        Ok(AuthResponse {
            token: challenge.token,
            region_code,
        })
    }

    /// Leg 1: identify as the HTML5 client and read the key challenge.
    pub async fn leg1(&self, client_ip: Option<&str>) -> Result<Challenge> {
        let url = format!("{}/v2/api/auth1", self.origin.auth_base_url);
        let mut req = self.client.get(&url);
        for (name, value) in APP_HEADERS.iter().chain(DEVICE_HEADERS) {
            req = req.header(*name, *value);
        }
        if let Some(ip) = client_ip {
            req = req.header(HEADER_REAL_IP, ip);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RadioError::upstream("auth1", e))?;
        let status = resp.status();
        if !status.is_success() {
            warn!("auth: auth1 returned {}", status);
            return Err(RadioError::upstream("auth1", format!("HTTP {}", status)));
        }

        let headers = resp.headers();
        let token = header_str(headers, HEADER_AUTH_TOKEN)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RadioError::bad_response(format!("no {} in auth1 response", HEADER_AUTH_TOKEN))
            })?
            .to_string();
        let key_offset = header_usize(headers, HEADER_KEY_OFFSET)?;
        let key_length = header_usize(headers, HEADER_KEY_LENGTH)?;

        debug!(
            "auth: auth1 ok, offset={} length={}",
            key_offset, key_length
        );
        Ok(Challenge {
            token,
            key_offset,
            key_length,
        })
    }

    /// Leg 2: prove knowledge of the key.  Returns the raw body
    /// (`"JP13,東京都,tokyo Japan"`).
    pub async fn leg2(
        &self,
        token: &str,
        partial_key: &str,
        client_ip: Option<&str>,
    ) -> Result<String> {
        let url = format!("{}/v2/api/auth2", self.origin.auth_base_url);
        let mut req = self
            .client
            .get(&url)
            .header(HEADER_AUTH_TOKEN, token)
            .header(HEADER_PARTIAL_KEY, partial_key);
        for (name, value) in DEVICE_HEADERS {
            req = req.header(*name, *value);
        }
        if let Some(ip) = client_ip {
            req = req.header(HEADER_REAL_IP, ip);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RadioError::upstream("auth2", e))?;
        let status = resp.status();
        if !status.is_success() {
            warn!("auth: auth2 returned {}", status);
            return Err(RadioError::upstream("auth2", format!("HTTP {}", status)));
        }

        resp.text()
            .await
            .map_err(|e| RadioError::upstream("auth2", e))
    }
}

/// base64 of `SHARED_SECRET[offset..offset + length]`.
pub fn partial_key(offset: usize, length: usize) -> Result<String> {
    let end = offset
        .checked_add(length)
        .ok_or_else(|| RadioError::bad_response("key offset overflow"))?;
    let slice = SHARED_SECRET.get(offset..end).ok_or_else(|| {
        RadioError::bad_response(format!(
            "key slice {}..{} outside shared secret",
            offset, end
        ))
    })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(slice))
}

/// First comma-separated field of the auth2 body, if non-empty.
pub fn parse_region(body: &str) -> Option<String> {
    let first = body.trim().split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

fn header_str<'a>(headers: &'a reqwest::header::HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_usize(headers: &reqwest::header::HeaderMap, name: &str) -> Result<usize> {
    header_str(headers, name)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| RadioError::bad_response(format!("missing or invalid {}", name)))
}
