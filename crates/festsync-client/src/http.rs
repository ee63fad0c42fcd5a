//! REST notification service over reqwest.

use async_trait::async_trait;
use festsync_proto::{NotificationId, NotificationPage, NotificationQuery, UserId, UserRef};

use crate::service::{NotificationService, ServiceError};

/// Longest response body kept in a `ServiceError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// [`NotificationService`] backed by the notification REST API.
#[derive(Debug, Clone)]
pub struct HttpNotificationService {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpNotificationService {
    /// Create a service rooted at `base_url` (without trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a service that reuses an existing client (timeouts, auth
    /// headers, connection pool).
    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http_client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

/// Map a non-success response to `ServiceError::Status`.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(ServiceError::Status { status: status.as_u16(), body })
}

fn http_error(error: &reqwest::Error) -> ServiceError {
    ServiceError::Http(error.to_string())
}

#[async_trait]
impl NotificationService for HttpNotificationService {
    async fn fetch_page(&self, query: NotificationQuery) -> Result<NotificationPage, ServiceError> {
        let response = self
            .http_client
            .get(self.url("notifications"))
            .query(&query)
            .send()
            .await
            .map_err(|e| http_error(&e))?;

        check(response)
            .await?
            .json::<NotificationPage>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn mark_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<(), ServiceError> {
        let response = self
            .http_client
            .patch(self.url(&format!("notification/{notification_id}/read")))
            .json(&UserRef { user_id })
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        check(response).await.map(|_| ())
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<(), ServiceError> {
        let response = self
            .http_client
            .patch(self.url("notifications/read-all"))
            .json(&UserRef { user_id })
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        check(response).await.map(|_| ())
    }

    async fn clear_all(&self, user_id: UserId) -> Result<(), ServiceError> {
        let response = self
            .http_client
            .delete(self.url("notifications/clear"))
            .json(&UserRef { user_id })
            .send()
            .await
            .map_err(|e| http_error(&e))?;
        check(response).await.map(|_| ())
    }
}
