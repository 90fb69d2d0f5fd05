use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Every route answers with the generated page. The file is read on each
/// request, so a re-export is picked up without a restart.
pub fn router(index_path: PathBuf) -> Router {
    Router::new()
        .fallback(serve_index)
        .with_state(Arc::new(index_path))
}

async fn serve_index(State(index_path): State<Arc<PathBuf>>) -> Response {
    match tokio::fs::read_to_string(index_path.as_ref()).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!("Failed to read {:?}: {}", index_path, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Interface not available").into_response()
        }
    }
}

pub async fn serve(host: &str, port: u16, index_path: PathBuf) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;

    let shown_host = if addr.ip().is_unspecified() {
        "localhost".to_string()
    } else {
        addr.ip().to_string()
    };
    info!("App listening at http://{}:{}", shown_host, addr.port());

    axum::serve(listener, router(index_path)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_every_route_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("index.html");
        std::fs::write(&index, "<html>first</html>").unwrap();

        let app = router(index.clone());

        for uri in ["/", "/contracts/Token", "/public/web3.min.js?v=1"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], b"<html>first</html>");
        }

        std::fs::write(&index, "<html>second</html>").unwrap();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<html>second</html>");
    }

    #[tokio::test]
    async fn test_missing_index_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(dir.path().join("index.html"))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
