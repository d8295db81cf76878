use super::AppState;
use crate::Error;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use tracing::{error, info, warn};

/// Multipart field carrying the upload.
pub const UPLOAD_FIELD: &str = "image";

const INDEX_HTML: &str = r#"<!doctype html>
<html>
  <head><title>Image host</title></head>
  <body>
    <h1>Upload an image</h1>
    <p>JPEG, PNG, GIF or WEBP. Links expire after a few days.</p>
    <form action="/upload" method="post" enctype="multipart/form-data">
      <input type="file" name="image" accept="image/*" required>
      <button type="submit">Upload</button>
    </form>
  </body>
</html>
"#;

/// Request failure as seen by the HTTP client.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Host(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Host(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::BadRequest(msg) => return (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Host(err) => err,
        };

        let status = match &err {
            Error::InvalidContent | Error::MalformedIdentifier => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::StorageUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            if err.is_unavailable() {
                error!("Store failure while serving request: {}", err);
            } else {
                error!("Request failed: {}", err);
            }
            let message = match status {
                StatusCode::BAD_GATEWAY => "Image storage is unavailable",
                _ => "Internal server error",
            };
            return (status, message).into_response();
        }

        (status, err.to_string()).into_response()
    }
}

/// `GET /` -- upload form.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `POST /upload` -- publish the `image` field of a multipart form.
///
/// Answers `201 Created` with the public URL in `Location` and the bare
/// identifier as the body.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("Expected a multipart form: {}", e)))?;

    let bytes = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?;
        let Some(field) = field else {
            return Err(ApiError::BadRequest(format!(
                "Missing '{}' field",
                UPLOAD_FIELD
            )));
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        break field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {}", e)))?;
    };

    if bytes.len() > state.max_upload_bytes {
        warn!(
            "Rejected upload of {} bytes (limit {})",
            bytes.len(),
            state.max_upload_bytes
        );
        return Err(ApiError::BadRequest(format!(
            "Image exceeds {} bytes",
            state.max_upload_bytes
        )));
    }

    let id = state.host.publish(&bytes).await?;
    let location = state.image_url(id.as_str());
    info!("Upload stored at {}", location);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        id.to_string(),
    )
        .into_response())
}

/// `GET /{identifier}` -- serve a live image.
pub async fn fetch(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Response, ApiError> {
    let blob = state.host.fetch(&identifier).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, blob.content_type)],
        blob.bytes,
    )
        .into_response())
}
