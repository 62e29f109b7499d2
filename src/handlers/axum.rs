#[cfg(feature = "axum")]
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
#[cfg(feature = "axum")]
use std::sync::Arc;

#[cfg(feature = "axum")]
use crate::app::DashboardAuth;
use crate::error::AuthError;
use crate::types::{AuthRequest, AuthResponse, HttpMethod};

/// Integration trait for the Axum web framework.
#[cfg(feature = "axum")]
pub trait AxumIntegration {
    /// Router serving the `/api/user/*` surface plus a health check. The
    /// configured guards run inside [`DashboardAuth::handle_request`], so the
    /// returned router is fully protected on its own.
    fn axum_router(self) -> Router;
}

#[cfg(feature = "axum")]
impl AxumIntegration for Arc<DashboardAuth> {
    fn axum_router(self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .fallback(dispatch)
            .with_state(self)
    }
}

#[cfg(feature = "axum")]
async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "service": "dashboard-auth"
    }))
}

#[cfg(feature = "axum")]
async fn dispatch(State(auth): State<Arc<DashboardAuth>>, req: Request) -> Response {
    match convert_axum_request(req).await {
        Ok(auth_req) => match auth.handle_request(&auth_req).await {
            Ok(auth_response) => convert_auth_response(auth_response),
            Err(err) => convert_auth_error(err),
        },
        Err(err) => convert_auth_error(err),
    }
}

/// Middleware layer for host-owned routes (dashboard pages): runs the guard
/// chain and either short-circuits with its response or lets the request
/// through to the inner handler. Mount with
/// `axum::middleware::from_fn_with_state(auth, guard_layer)`.
#[cfg(feature = "axum")]
pub async fn guard_layer(
    State(auth): State<Arc<DashboardAuth>>,
    req: Request,
    next: Next,
) -> Response {
    // Guards only read the request line and headers, so the body is left in
    // place for the inner handler.
    let auth_req = match convert_request_head(&req) {
        Ok(auth_req) => auth_req,
        Err(err) => return convert_auth_error(err),
    };

    match auth.check_request(&auth_req).await {
        Ok(Some(response)) => convert_auth_response(response),
        Ok(None) => next.run(req).await,
        Err(err) => convert_auth_error(err),
    }
}

#[cfg(feature = "axum")]
fn convert_method(method: &axum::http::Method) -> Result<HttpMethod, AuthError> {
    match *method {
        axum::http::Method::GET => Ok(HttpMethod::Get),
        axum::http::Method::POST => Ok(HttpMethod::Post),
        axum::http::Method::PUT => Ok(HttpMethod::Put),
        axum::http::Method::DELETE => Ok(HttpMethod::Delete),
        axum::http::Method::PATCH => Ok(HttpMethod::Patch),
        axum::http::Method::OPTIONS => Ok(HttpMethod::Options),
        axum::http::Method::HEAD => Ok(HttpMethod::Head),
        _ => Err(AuthError::validation("Unsupported HTTP method")),
    }
}

#[cfg(feature = "axum")]
fn convert_request_head(req: &Request) -> Result<AuthRequest, AuthError> {
    use std::collections::HashMap;

    let method = convert_method(req.method())?;

    let mut headers = HashMap::new();
    for (name, value) in req.headers().iter() {
        if let Ok(value_str) = value.to_str() {
            headers.insert(name.to_string(), value_str.to_string());
        }
    }

    let path = req.uri().path().to_string();

    let raw_query = req.uri().query().map(str::to_string);
    let mut query = HashMap::new();
    if let Some(query_str) = req.uri().query() {
        for (key, value) in url::form_urlencoded::parse(query_str.as_bytes()) {
            query.insert(key.to_string(), value.to_string());
        }
    }

    Ok(AuthRequest {
        method,
        path,
        headers,
        body: None,
        query,
        raw_query,
    })
}

#[cfg(feature = "axum")]
async fn convert_axum_request(req: Request) -> Result<AuthRequest, AuthError> {
    use std::collections::HashMap;

    let (parts, body) = req.into_parts();

    let method = convert_method(&parts.method)?;

    let mut headers = HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value_str) = value.to_str() {
            headers.insert(name.to_string(), value_str.to_string());
        }
    }

    let path = parts.uri.path().to_string();

    let raw_query = parts.uri.query().map(str::to_string);
    let mut query = HashMap::new();
    if let Some(query_str) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query_str.as_bytes()) {
            query.insert(key.to_string(), value.to_string());
        }
    }

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            if bytes.is_empty() {
                None
            } else {
                Some(bytes.to_vec())
            }
        }
        Err(_) => None,
    };

    Ok(AuthRequest {
        method,
        path,
        headers,
        body: body_bytes,
        query,
        raw_query,
    })
}

#[cfg(feature = "axum")]
fn convert_auth_response(auth_response: AuthResponse) -> Response {
    let mut response = Response::builder().status(
        StatusCode::from_u16(auth_response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );

    for (name, value) in auth_response.headers {
        if let (Ok(header_name), Ok(header_value)) = (
            axum::http::HeaderName::from_bytes(name.as_bytes()),
            axum::http::HeaderValue::from_str(&value),
        ) {
            response = response.header(header_name, header_value);
        }
    }

    response
        .body(axum::body::Body::from(auth_response.body))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(axum::body::Body::from("Internal server error"))
                .unwrap()
        })
}

#[cfg(feature = "axum")]
fn convert_auth_error(err: AuthError) -> Response {
    let auth_response = err.into_response();
    convert_auth_response(auth_response)
}
