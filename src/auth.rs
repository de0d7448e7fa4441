//! Bearer-token authentication middleware
//!
//! A tower [`Layer`]/[`Service`] pair that guards the MCP endpoint. The
//! middleware extracts the bearer token from the `Authorization` header,
//! delegates validation to a [`TokenVerifier`], enforces required scopes,
//! and injects the resulting [`AuthInfo`] into request extensions where the
//! transport picks it up for the handler context.
//!
//! Responses are shaped as the protocol demands: `401` with a
//! `WWW-Authenticate` challenge for missing or invalid tokens, `403` with
//! JSON-RPC code `-32002` for insufficient scope.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::Layer;
use tower_service::Service;

use crate::error::JsonRpcError;
use crate::protocol::JsonRpcResponse;

/// Information about an authenticated client.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// The presented bearer token.
    pub token: String,
    /// Verifier-supplied claims.
    pub claims: serde_json::Value,
    /// Granted scopes, checked against the layer's required set.
    pub scopes: Vec<String>,
}

impl AuthInfo {
    /// Sentinel identity used when unauthenticated access is allowed.
    pub fn anonymous() -> Self {
        Self {
            token: String::new(),
            claims: serde_json::json!({}),
            scopes: Vec::new(),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Verification failure reported by a [`TokenVerifier`].
#[derive(Debug, Clone)]
pub struct AuthError {
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AuthError {}

/// Validates bearer tokens.
///
/// Return `Ok(Some(info))` for a valid token, `Ok(None)` for an unknown or
/// expired one, and `Err` for verification failures whose message should
/// reach the client.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> BoxFuture<'_, Result<Option<AuthInfo>, AuthError>>;
}

/// In-memory token table, for tests and simple deployments.
///
/// For production, implement [`TokenVerifier`] with JWT verification or
/// OAuth2 token introspection instead.
#[derive(Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, AuthInfo>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token with its scopes.
    pub fn token(mut self, token: impl Into<String>, scopes: &[&str]) -> Self {
        let token = token.into();
        self.tokens.insert(
            token.clone(),
            AuthInfo {
                token,
                claims: serde_json::json!({}),
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> BoxFuture<'_, Result<Option<AuthInfo>, AuthError>> {
        let info = self.tokens.get(token).cloned();
        Box::pin(async move { Ok(info) })
    }
}

/// Extract the token from an `Authorization: Bearer <tok>` header.
///
/// The `Bearer ` prefix is case-sensitive.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Tower layer enforcing bearer-token authentication.
#[derive(Clone)]
pub struct AuthLayer {
    verifier: Arc<dyn TokenVerifier>,
    realm: String,
    required_scopes: Arc<Vec<String>>,
    allow_unauthenticated: bool,
}

impl AuthLayer {
    pub fn new(verifier: impl TokenVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
            realm: "mcp".to_string(),
            required_scopes: Arc::new(Vec::new()),
            allow_unauthenticated: false,
        }
    }

    /// Realm reported in the `WWW-Authenticate` challenge.
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Scopes every authenticated request must carry.
    pub fn required_scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.required_scopes = Arc::new(scopes.into_iter().collect());
        self
    }

    /// Let requests without credentials through with the anonymous
    /// sentinel identity instead of a `401`.
    pub fn allow_unauthenticated(mut self, allow: bool) -> Self {
        self.allow_unauthenticated = allow;
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            verifier: self.verifier.clone(),
            realm: self.realm.clone(),
            required_scopes: self.required_scopes.clone(),
            allow_unauthenticated: self.allow_unauthenticated,
        }
    }
}

/// Service created by [`AuthLayer`].
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    verifier: Arc<dyn TokenVerifier>,
    realm: String,
    required_scopes: Arc<Vec<String>>,
    allow_unauthenticated: bool,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token)
            .map(str::to_owned);

        let mut inner = self.inner.clone();
        let verifier = self.verifier.clone();
        let realm = self.realm.clone();
        let required_scopes = self.required_scopes.clone();
        let allow_unauthenticated = self.allow_unauthenticated;

        Box::pin(async move {
            let Some(token) = token else {
                if allow_unauthenticated {
                    req.extensions_mut().insert(AuthInfo::anonymous());
                    return inner.call(req).await;
                }
                return Ok(unauthorized(&realm, "Missing bearer token"));
            };

            let info = match verifier.verify(&token).await {
                Ok(Some(info)) => info,
                Ok(None) => return Ok(unauthorized(&realm, "Invalid or expired token")),
                Err(err) => return Ok(unauthorized(&realm, &err.message)),
            };

            if let Some(missing) = required_scopes.iter().find(|s| !info.has_scope(s)) {
                tracing::debug!(scope = %missing, "Rejecting request with insufficient scope");
                return Ok(forbidden("Forbidden: insufficient scope"));
            }

            req.extensions_mut().insert(info);
            inner.call(req).await
        })
    }
}

fn unauthorized(realm: &str, message: &str) -> Response {
    let body = JsonRpcResponse::error(None, JsonRpcError::transport_error(message));
    let mut response = (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    if let Ok(challenge) = HeaderValue::from_str(&format!("Bearer realm=\"{}\"", realm)) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, challenge);
    }
    response
}

fn forbidden(message: &str) -> Response {
    let body = JsonRpcResponse::error(None, JsonRpcError::forbidden(message));
    (StatusCode::FORBIDDEN, axum::Json(body)).into_response()
}
