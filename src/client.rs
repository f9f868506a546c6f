//! HTTP client for the API with transparent token refresh.
//!
//! Concurrent requests that hit `401` share a single refresh: the first one
//! to take `refresh_lock` rotates the pair, later ones see the new access
//! token and reuse it.

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request failed with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("not authenticated")]
    NotAuthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: RwLock<Option<TokenPair>>,
    refresh_lock: Mutex<()>,
}

impl ApiClient {
    /// `base_url` includes the version prefix, e.g. `http://host/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_tokens(self, tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
            ..self
        }
    }

    pub async fn tokens(&self) -> Option<TokenPair> {
        self.tokens.read().await.clone()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let pair: TokenPair = self
            .checked(
                self.http
                    .post(self.url("/auth/login"))
                    .json(&Credentials { email, password })
                    .send()
                    .await?,
            )
            .await?
            .json()
            .await?;
        *self.tokens.write().await = Some(pair);
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Ok(self.send(Method::GET, path, None::<&()>).await?.json().await?)
    }

    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        Ok(self.send(method, path, Some(body)).await?.json().await?)
    }

    /// Sends an authenticated request, refreshing and retrying once on `401`.
    pub async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let access = self.access_token().await?;
        let res = self.attempt(&method, path, body, &access).await?;
        if res.status() != StatusCode::UNAUTHORIZED {
            return self.checked(res).await;
        }

        debug!(path, "access token rejected, refreshing");
        self.refresh(&access).await?;
        let access = self.access_token().await?;
        let res = self.attempt(&method, path, body, &access).await?;
        self.checked(res).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn access_token(&self) -> Result<String, ClientError> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(ClientError::NotAuthenticated)
    }

    async fn attempt<B>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&B>,
        access: &str,
    ) -> Result<reqwest::Response, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(access);
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }

    async fn checked(&self, res: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let message = res.text().await.unwrap_or_default();
        Err(ClientError::Status { status, message })
    }

    /// Rotates the pair unless another task already replaced `stale_access`.
    async fn refresh(&self, stale_access: &str) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;

        let refresh_token = {
            let tokens = self.tokens.read().await;
            let current = tokens.as_ref().ok_or(ClientError::NotAuthenticated)?;
            if current.access_token != stale_access {
                debug!("tokens already rotated by another request");
                return Ok(());
            }
            current.refresh_token.clone()
        };

        let res = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&RefreshBody {
                refresh_token: &refresh_token,
            })
            .send()
            .await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            warn!("refresh token rejected, clearing session");
            *self.tokens.write().await = None;
            return Err(ClientError::NotAuthenticated);
        }
        let pair: TokenPair = self.checked(res).await?.json().await?;
        *self.tokens.write().await = Some(pair);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    use axum::{
        extract::State,
        http::{header, HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    use super::*;

    #[derive(Clone, Default)]
    struct Fake {
        refreshes: Arc<AtomicUsize>,
        reject_refresh: bool,
    }

    async fn me(headers: HeaderMap) -> Result<Json<Value>, AxumStatus> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth == "Bearer fresh" {
            Ok(Json(json!({ "email": "a@b.co" })))
        } else {
            Err(AxumStatus::UNAUTHORIZED)
        }
    }

    async fn refresh(State(fake): State<Fake>) -> Result<Json<Value>, AxumStatus> {
        fake.refreshes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if fake.reject_refresh {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        Ok(Json(json!({
            "access_token": "fresh",
            "refresh_token": "rotated",
            "user": { "id": "ignored" }
        })))
    }

    async fn spawn(fake: Fake) -> String {
        let app = Router::new()
            .route("/api/v1/me", get(me))
            .route("/api/v1/auth/refresh", post(refresh))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/v1")
    }

    fn stale() -> TokenPair {
        TokenPair {
            access_token: "stale".into(),
            refresh_token: "r1".into(),
        }
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh() {
        let fake = Fake::default();
        let client = Arc::new(ApiClient::new(spawn(fake.clone()).await).with_tokens(stale()));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let client = client.clone();
            set.spawn(async move { client.get_json::<Value>("/me").await });
        }
        while let Some(res) = set.join_next().await {
            assert_eq!(res.unwrap().unwrap()["email"], "a@b.co");
        }

        assert_eq!(fake.refreshes.load(Ordering::SeqCst), 1);
        let tokens = client.tokens().await.unwrap();
        assert_eq!(tokens.access_token, "fresh");
        assert_eq!(tokens.refresh_token, "rotated");
    }

    #[tokio::test]
    async fn rejected_refresh_clears_the_session() {
        let fake = Fake {
            reject_refresh: true,
            ..Default::default()
        };
        let client = ApiClient::new(spawn(fake.clone()).await).with_tokens(stale());

        let err = client.get_json::<Value>("/me").await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
        assert_eq!(fake.refreshes.load(Ordering::SeqCst), 1);
        assert!(client.tokens().await.is_none());
    }

    #[tokio::test]
    async fn requests_without_tokens_fail_fast() {
        let client = ApiClient::new("http://127.0.0.1:9/api/v1");
        let err = client.get_json::<Value>("/me").await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
    }
}
