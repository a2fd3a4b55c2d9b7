//! Recipient lookup against the users service.

use helpdesk_relay_core::directory::{DirectoryError, RecipientDirectory};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// [`RecipientDirectory`] calling `GET {base_url}/usuarios/{id}` on the users service.
///
/// Requests are made as a trusted service: `Authorization: Bearer <service token>`
/// plus `X-Service-Name`. The address is read from `correo`, then `email`.
#[derive(Clone, Debug)]
pub struct HttpRecipientDirectory {
    http_client: Client,
    base_url: String,
    service_name: String,
    service_token: String,
}

impl HttpRecipientDirectory {
    /// Directory for the users service at `base_url`, with a 5 second request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        service_name: impl Into<String>,
        service_token: impl Into<String>,
    ) -> Result<Self, DirectoryError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DirectoryError::Unavailable(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_name: service_name.into(),
            service_token: service_token.into(),
        })
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/usuarios/{user_id}", self.base_url)
    }
}

impl RecipientDirectory for HttpRecipientDirectory {
    fn email_for<'a>(
        &'a self,
        user_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, DirectoryError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .http_client
                .get(self.user_url(user_id))
                .bearer_auth(&self.service_token)
                .header("X-Service-Name", &self.service_name)
                .send()
                .await
                .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

            if response.status() == StatusCode::NOT_FOUND {
                tracing::debug!(user_id = %user_id, "User not found in directory");
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(DirectoryError::Unavailable(format!(
                    "users service answered {}",
                    response.status()
                )));
            }

            let body: Value = response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;

            Ok(["correo", "email"]
                .iter()
                .find_map(|field| body.get(*field)?.as_str())
                .filter(|address| !address.trim().is_empty())
                .map(str::to_string))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn user(Path(id): Path<String>, headers: HeaderMap) -> Result<Json<Value>, HttpStatus> {
        let authorized = headers.get("authorization").and_then(|v| v.to_str().ok())
            == Some("Bearer svc-token")
            && headers.get("x-service-name").and_then(|v| v.to_str().ok()) == Some("notificaciones-svc");
        if !authorized {
            return Err(HttpStatus::UNAUTHORIZED);
        }
        match id.as_str() {
            "u1" => Ok(Json(json!({ "_id": "u1", "nombre": "Ana", "correo": "ana@helpdesk.test" }))),
            "u2" => Ok(Json(json!({ "_id": "u2", "email": "bob@helpdesk.test" }))),
            "u3" => Ok(Json(json!({ "_id": "u3", "correo": "" }))),
            _ => Err(HttpStatus::NOT_FOUND),
        }
    }

    async fn serve_users() -> String {
        let app = Router::new().route("/usuarios/:id", get(user));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_lookup_reads_correo_then_email() {
        let base = serve_users().await;
        let directory = HttpRecipientDirectory::new(base, "notificaciones-svc", "svc-token").unwrap();

        assert_eq!(
            directory.email_for("u1").await.unwrap().as_deref(),
            Some("ana@helpdesk.test")
        );
        assert_eq!(
            directory.email_for("u2").await.unwrap().as_deref(),
            Some("bob@helpdesk.test")
        );
        assert_eq!(directory.email_for("u3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let base = serve_users().await;
        let directory = HttpRecipientDirectory::new(base, "notificaciones-svc", "svc-token").unwrap();

        assert_eq!(directory.email_for("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejected_service_call_is_unavailable() {
        let base = serve_users().await;
        let directory = HttpRecipientDirectory::new(base, "notificaciones-svc", "wrong").unwrap();

        assert!(matches!(
            directory.email_for("u1").await,
            Err(DirectoryError::Unavailable(_))
        ));
    }
}
