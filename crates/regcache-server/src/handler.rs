//! Read-through resolution of package file requests

use axum::body::Body;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use regcache_storage::{ArtifactKey, ArtifactStore, ArtifactStream, Lookup, StorageError};
use tracing::{error, info};

use crate::forward::ForwardRequest;
use crate::server::AppState;

/// Terminal state of a single artifact request
pub enum Resolution {
    /// Served from local storage
    Hit(Response),
    /// Delegated to the origin; carries the origin's response untouched
    Forwarded(Response),
    /// Storage failed for a reason other than absence
    Failed(StorageError),
}

impl IntoResponse for Resolution {
    fn into_response(self) -> Response {
        match self {
            Resolution::Hit(response) | Resolution::Forwarded(response) => response,
            Resolution::Failed(e) => (error_status(&e), e.to_string()).into_response(),
        }
    }
}

/// Look the artifact up locally and fall back to the origin on a miss.
///
/// The forwarder is invoked at most once and only for a miss.
pub async fn resolve(state: &AppState, key: &ArtifactKey, request: ForwardRequest) -> Resolution {
    let outcome = if state.stream_hits {
        state
            .storage
            .stream_artifact(key)
            .await
            .map(|lookup| lookup.map(streamed_response))
    } else {
        state
            .storage
            .read_artifact(key)
            .await
            .map(|lookup| lookup.map(buffered_response))
    };

    match outcome {
        Ok(Lookup::Found(response)) => {
            info!(package = %key.package, file = %key.file, "cache hit");
            Resolution::Hit(response)
        }
        Ok(Lookup::NotFound) => {
            info!(package = %key.package, file = %key.file, "cache miss");
            Resolution::Forwarded(state.forwarder.forward(request).await)
        }
        Err(e) => {
            error!(package = %key.package, error = %e, "Error loading package file");
            Resolution::Failed(e)
        }
    }
}

/// GET /:package/-/:file
pub async fn package_file(
    State(state): State<AppState>,
    Path((package, file)): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Resolution {
    let key = ArtifactKey::new(package, file);
    resolve(&state, &key, forward_request(&uri, headers)).await
}

/// GET /@scope/:name/-/:file
pub async fn scoped_package_file(
    State(state): State<AppState>,
    Path((scope, name, file)): Path<(String, String, String)>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    if !scope.starts_with('@') || scope.len() < 2 {
        return (StatusCode::NOT_FOUND, "Unknown route").into_response();
    }
    let key = ArtifactKey::new(format!("{scope}/{name}"), file);
    resolve(&state, &key, forward_request(&uri, headers))
        .await
        .into_response()
}

fn forward_request(uri: &axum::http::Uri, headers: HeaderMap) -> ForwardRequest {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    ForwardRequest {
        path_and_query,
        headers,
    }
}

fn buffered_response(data: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))],
        data,
    )
        .into_response()
}

/// Chunked body for a hit, with `content-length` taken from the file size at
/// open time.
///
/// Writes are plain overwrites, so a concurrent `write_file` on the same
/// artifact can leave the body shorter or longer than the advertised length.
/// Clients see a truncated or failed transfer in that case, the same as any
/// reader racing an overwrite.
fn streamed_response(stream: ArtifactStream) -> Response {
    let len = stream.len();
    let mut response = Body::from_stream(stream.into_bytes_stream()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    response
}

fn error_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::PathEscape(_) => StatusCode::BAD_REQUEST,
        e if e.is_permission_denied() => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn test_error_status_mapping() {
        let escape = StorageError::PathEscape(PathBuf::from("../x"));
        assert_eq!(error_status(&escape), StatusCode::BAD_REQUEST);

        let denied = StorageError::Io {
            path: PathBuf::from("/cache/x"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(error_status(&denied), StatusCode::FORBIDDEN);

        let other = StorageError::Io {
            path: PathBuf::from("/cache/x"),
            source: io::Error::from(io::ErrorKind::IsADirectory),
        };
        assert_eq!(error_status(&other), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_forward_request_keeps_query() {
        let uri: axum::http::Uri = "/left-pad/-/left-pad-1.0.0.tgz?cache=no".parse().unwrap();
        let request = forward_request(&uri, HeaderMap::new());
        assert_eq!(request.path_and_query, "/left-pad/-/left-pad-1.0.0.tgz?cache=no");
    }
}
