// @zen-component: MCP-Auth
//
//! MCP bearer token authentication middleware.
//!
//! Validates `Authorization: Bearer <token>` headers against the single
//! server token configured at startup.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Client id recorded for callers holding the server token.
pub const DEFAULT_CLIENT_ID: &str = "toolgate";

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpClient {
    pub id: String,
}

/// Static bearer token check. With no token every request passes
/// unauthenticated.
#[derive(Debug, Clone)]
pub struct McpAuth {
    token: Option<String>,
    client_id: String,
}

impl McpAuth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            token: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn authorize(&self, header: Option<&str>) -> Result<Option<McpClient>, StatusCode> {
        let Some(expected) = &self.token else {
            return Ok(None);
        };
        let Some(header) = header else {
            debug!("MCP auth: no Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        };
        let Some(token) = header.strip_prefix("Bearer ") else {
            debug!("MCP auth: missing Bearer prefix");
            return Err(StatusCode::UNAUTHORIZED);
        };
        if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            debug!("MCP auth: token mismatch");
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Some(McpClient {
            id: self.client_id.clone(),
        }))
    }
}

/// Byte comparison whose timing depends only on the input lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Axum middleware: validates the MCP bearer token.
///
/// Returns 401 if the token is missing, malformed, or wrong. On success the
/// [`McpClient`] principal is added to the request extensions.
pub async fn mcp_auth_middleware(
    State(auth): State<Arc<McpAuth>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or(""));

    if let Some(client) = auth.authorize(header)? {
        request.extensions_mut().insert(client);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::post;
    use tower::ServiceExt;

    fn router(auth: McpAuth) -> Router {
        Router::new()
            .route(
                "/mcp",
                post(|request: Request<Body>| async move {
                    request
                        .extensions()
                        .get::<McpClient>()
                        .map(|c| c.id.clone())
                        .unwrap_or_else(|| "anonymous".to_string())
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                Arc::new(auth),
                mcp_auth_middleware,
            ))
    }

    async fn send(router: Router, authorization: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method("POST").uri("/mcp");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_passes_with_principal() {
        let (status, body) = send(router(McpAuth::bearer("s3cret")), Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, DEFAULT_CLIENT_ID);

        let auth = McpAuth::bearer("s3cret").with_client_id("ops-agent");
        let (_, body) = send(router(auth), Some("Bearer s3cret")).await;
        assert_eq!(body, "ops-agent");
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_unauthorized() {
        let auth = McpAuth::bearer("s3cret");
        assert_eq!(send(router(auth.clone()), None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            send(router(auth.clone()), Some("Bearer nope")).await.0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            send(router(auth), Some("Basic s3cret")).await.0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn near_miss_tokens_are_unauthorized() {
        let auth = McpAuth::bearer("s3cret");
        for header in ["Bearer s3creT", "Bearer s3cre", "Bearer s3crets", "Bearer "] {
            assert_eq!(
                send(router(auth.clone()), Some(header)).await.0,
                StatusCode::UNAUTHORIZED,
                "{header}"
            );
        }
    }

    #[test]
    fn constant_time_eq_matches_equality() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(constant_time_eq(b"", b""));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cre"));
    }

    #[tokio::test]
    async fn disabled_auth_passes_anonymously() {
        let auth = McpAuth::disabled();
        assert!(!auth.is_enabled());
        let (status, body) = send(router(auth), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }
}
