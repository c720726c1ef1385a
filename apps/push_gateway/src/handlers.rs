use std::sync::Arc;

use axum::extract::{Form, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;

use crate::adapters::{push_adapter, AdapterError};
use crate::config::GatewayConfig;
use crate::error_log::ErrorLog;
use crate::models::SendParams;
use crate::transport::Transport;

const EMPTY_ROUTE_BODY: &str = "目的地空无一物";
const UNKNOWN_ROUTE_BODY: &str = "这里是一片荒原";
const MISSING_MSG_BODY: &str = "Wel Come!";
const SUCCESS_BODY: &str = "Success";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub transport: Transport,
    pub error_log: Arc<ErrorLog>,
}

/// Every method on every path goes to [`push`].
pub fn push_router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/", any(push))
        .route("/*path", any(push))
}

/// Resolves the route name from the request path, sends `msg`/`title`
/// through the route's adapter and reports the outcome as plain text.
pub async fn push(
    State(state): State<AppState>,
    path: Option<Path<String>>,
    query: Option<Query<Vec<(String, String)>>>,
    request: Request,
) -> Response {
    let path = path.map(|Path(path)| path).unwrap_or_default();
    let query = query.map(|Query(fields)| fields).unwrap_or_default();
    let body = body_fields(request).await;
    let params = merge_params(fields_to_params(&query), fields_to_params(&body));

    match dispatch(&state, &path, params).await {
        Ok(route) => {
            tracing::info!("{} - {}", route, SUCCESS_BODY);
            (StatusCode::OK, SUCCESS_BODY).into_response()
        }
        Err(err) => {
            tracing::warn!("{}", err);
            err.record(&state.error_log).await;
            err.into_response()
        }
    }
}

async fn dispatch(state: &AppState, path: &str, params: SendParams) -> Result<String, DispatchError> {
    let route_name = resolve_route_name(path, state.config.route_prefix());
    if route_name.is_empty() {
        return Err(DispatchError::EmptyRoute);
    }

    let route = state
        .config
        .get_route(&route_name)
        .ok_or_else(|| DispatchError::UnknownRoute(route_name.clone()))?;

    if params.msg.is_empty() {
        return Err(DispatchError::MissingMessage {
            route: route.name.clone(),
            kind: route.kind.clone(),
            params,
        });
    }

    let adapter = match push_adapter(&route.kind) {
        Some(adapter) => adapter,
        None => {
            return Err(DispatchError::UnsupportedType {
                route: route.name.clone(),
                kind: route.kind.clone(),
                params,
            })
        }
    };

    match adapter
        .send(&state.transport, &route.name, &route.settings, &params)
        .await
    {
        Ok(()) => Ok(route.name.clone()),
        Err(source) => Err(DispatchError::Adapter {
            route: route.name.clone(),
            kind: route.kind.clone(),
            params,
            source,
        }),
    }
}

/// Strips surrounding slashes and, when configured, the route prefix.
///
/// A path outside the prefix resolves to an empty name.
pub fn resolve_route_name(path: &str, prefix: Option<&str>) -> String {
    let full = path.trim_matches('/');
    match prefix {
        None => full.to_string(),
        Some(prefix) => {
            if format!("{}/", full).starts_with(&format!("{}/", prefix)) {
                full[prefix.len()..].trim_matches('/').to_string()
            } else {
                String::new()
            }
        }
    }
}

/// Decoded fields of a `multipart/form-data` or urlencoded request body.
/// Any other body, or one that fails to decode, yields no fields.
async fn body_fields(request: Request) -> Vec<(String, String)> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => multipart_fields(multipart).await,
            Err(rejection) => {
                tracing::warn!("unreadable multipart body: {}", rejection);
                Vec::new()
            }
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        match Form::<Vec<(String, String)>>::from_request(request, &()).await {
            Ok(Form(fields)) => fields,
            Err(rejection) => {
                tracing::warn!("unreadable form body: {}", rejection);
                Vec::new()
            }
        }
    } else {
        Vec::new()
    }
}

/// Text parts only; file uploads are skipped.
async fn multipart_fields(mut multipart: Multipart) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!("malformed multipart body: {}", err);
                break;
            }
        };
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.text().await {
            Ok(value) => fields.push((name, value)),
            Err(err) => {
                tracing::warn!("malformed multipart field '{}': {}", name, err);
                break;
            }
        }
    }
    fields
}

fn fields_to_params(fields: &[(String, String)]) -> SendParams {
    SendParams::from_fields(fields.iter().map(|(key, value)| (key.as_str(), value.as_str())))
}

/// Form body values win over query string values.
fn merge_params(query: SendParams, form: SendParams) -> SendParams {
    SendParams::new(
        first_non_empty(form.msg, query.msg),
        first_non_empty(form.title, query.title),
    )
}

fn first_non_empty(preferred: String, fallback: String) -> String {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}

/// Every way a push request can fail, with the message written to logs.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("目的地空无一物 - 缺少配置路径")]
    EmptyRoute,
    #[error("这里是一片荒原 - 配置 '{0}' 不存在")]
    UnknownRoute(String),
    #[error("Wel Come! - 缺少msg参数")]
    MissingMessage {
        route: String,
        kind: String,
        params: SendParams,
    },
    #[error("不支持的推送类型: {kind}")]
    UnsupportedType {
        route: String,
        kind: String,
        params: SendParams,
    },
    #[error("Error: {source}")]
    Adapter {
        route: String,
        kind: String,
        params: SendParams,
        #[source]
        source: AdapterError,
    },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyRoute | Self::MissingMessage { .. } | Self::UnsupportedType { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownRoute(_) => StatusCode::NOT_FOUND,
            Self::Adapter { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> String {
        match self {
            Self::EmptyRoute => EMPTY_ROUTE_BODY.to_string(),
            Self::UnknownRoute(_) => UNKNOWN_ROUTE_BODY.to_string(),
            Self::MissingMessage { .. } => MISSING_MSG_BODY.to_string(),
            Self::UnsupportedType { .. } | Self::Adapter { .. } => self.to_string(),
        }
    }

    /// Appends the failure to the error log. Requests without a route name
    /// are not logged there.
    async fn record(&self, log: &ErrorLog) {
        let detail = self.to_string();
        match self {
            Self::EmptyRoute => {}
            Self::UnknownRoute(route) => log.record(route, "unknown", &detail, None).await,
            Self::MissingMessage {
                route,
                kind,
                params,
            }
            | Self::UnsupportedType {
                route,
                kind,
                params,
            }
            | Self::Adapter {
                route,
                kind,
                params,
                ..
            } => log.record(route, kind, &detail, Some(params)).await,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}
