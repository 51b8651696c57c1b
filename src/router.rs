//! Message router bridge - delivers directives to worker units
//!
//! The authority layer only sees the [`MessageRouter`] trait. [`HttpRouter`]
//! talks to a remote routing service; [`LocalRouter`] keeps an in-process
//! registry of worker endpoints.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::authority::DirectivePriority;

/// Failures surfaced by a router
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("delivery timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rejected by {participant}: {reason}")]
    Rejected { participant: String, reason: String },
}

/// Addressee of a routed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// A single named participant
    Participant(String),
    /// Every registered participant
    Broadcast,
}

impl Recipient {
    pub fn as_str(&self) -> &str {
        match self {
            Recipient::Participant(name) => name,
            Recipient::Broadcast => "*",
        }
    }
}

/// Kind of routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Command,
}

/// A message travelling through the router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedMessage {
    pub correlation_id: Uuid,
    pub from: String,
    pub to: Recipient,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub priority: DirectivePriority,
    pub payload: Value,
    pub requires_response: bool,
}

/// Outcome reported by a worker unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Completed,
    Failed,
    Queued,
}

/// A structured reply from a worker unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Report {
    pub fn completed(data: Value) -> Self {
        Self {
            status: ReportStatus::Completed,
            data: Some(data),
        }
    }

    pub fn queued() -> Self {
        Self {
            status: ReportStatus::Queued,
            data: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Failed,
            data: Some(serde_json::json!({ "error": reason.into() })),
        }
    }
}

/// Opaque async RPC facility used to reach worker units
#[async_trait]
pub trait MessageRouter: Send + Sync {
    /// Deliver a message and collect the reports it produced
    async fn send(&self, message: RoutedMessage) -> Result<Vec<Report>, RouterError>;
}

/// HTTP client for a remote routing service
pub struct HttpRouter {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRouter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MessageRouter for HttpRouter {
    async fn send(&self, message: RoutedMessage) -> Result<Vec<Report>, RouterError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .timeout(self.timeout)
            .json(&message)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RouterError::UnknownParticipant(
                message.to.as_str().to_string(),
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RouterError::Transport(format!(
                "routing service returned {} - {}",
                status, text
            )));
        }

        response.json().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> RouterError {
    if e.is_timeout() {
        RouterError::Timeout
    } else {
        RouterError::Transport(e.to_string())
    }
}

/// A worker unit reachable through a [`LocalRouter`]
#[async_trait]
pub trait WorkerEndpoint: Send + Sync {
    async fn deliver(&self, message: RoutedMessage) -> Result<Report, RouterError>;
}

#[async_trait]
impl<F, Fut> WorkerEndpoint for F
where
    F: Fn(RoutedMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Report, RouterError>> + Send + 'static,
{
    async fn deliver(&self, message: RoutedMessage) -> Result<Report, RouterError> {
        (self)(message).await
    }
}

/// In-process router over registered worker endpoints
pub struct LocalRouter {
    endpoints: RwLock<HashMap<String, Arc<dyn WorkerEndpoint>>>,
    timeout: Duration,
}

impl LocalRouter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register (or replace) the endpoint for a participant
    pub async fn register(
        &self,
        name: impl Into<String>,
        endpoint: impl WorkerEndpoint + 'static,
    ) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.insert(name.into(), Arc::new(endpoint));
    }

    /// Remove a participant's endpoint
    pub async fn unregister(&self, name: &str) -> bool {
        let mut endpoints = self.endpoints.write().await;
        endpoints.remove(name).is_some()
    }

    /// Names of all registered participants
    pub async fn participants(&self) -> Vec<String> {
        let endpoints = self.endpoints.read().await;
        let mut names: Vec<String> = endpoints.keys().cloned().collect();
        names.sort();
        names
    }

    async fn deliver_to(
        &self,
        name: &str,
        endpoint: Arc<dyn WorkerEndpoint>,
        message: RoutedMessage,
    ) -> Result<Report, RouterError> {
        match tokio::time::timeout(self.timeout, endpoint.deliver(message)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Delivery to {} timed out after {:?}", name, self.timeout);
                Err(RouterError::Timeout)
            }
        }
    }
}

#[async_trait]
impl MessageRouter for LocalRouter {
    async fn send(&self, message: RoutedMessage) -> Result<Vec<Report>, RouterError> {
        match &message.to {
            Recipient::Participant(name) => {
                let endpoint = {
                    let endpoints = self.endpoints.read().await;
                    endpoints.get(name).cloned()
                }
                .ok_or_else(|| RouterError::UnknownParticipant(name.clone()))?;

                let report = self.deliver_to(name, endpoint, message.clone()).await?;
                Ok(vec![report])
            }
            Recipient::Broadcast => {
                let targets: Vec<(String, Arc<dyn WorkerEndpoint>)> = {
                    let endpoints = self.endpoints.read().await;
                    endpoints
                        .iter()
                        .map(|(name, endpoint)| (name.clone(), endpoint.clone()))
                        .collect()
                };

                let deliveries = targets.into_iter().map(|(name, endpoint)| {
                    let message = message.clone();
                    async move {
                        let result = self.deliver_to(&name, endpoint, message).await;
                        (name, result)
                    }
                });

                let reports = join_all(deliveries)
                    .await
                    .into_iter()
                    .map(|(name, result)| {
                        result.unwrap_or_else(|e| {
                            tracing::warn!("Broadcast to {} failed: {}", name, e);
                            Report::failed(e.to_string())
                        })
                    })
                    .collect();
                Ok(reports)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command(to: Recipient) -> RoutedMessage {
        RoutedMessage {
            correlation_id: Uuid::new_v4(),
            from: "overwatch".to_string(),
            to,
            kind: MessageKind::Command,
            priority: DirectivePriority::Normal,
            payload: json!({ "name": "PING" }),
            requires_response: true,
        }
    }

    #[tokio::test]
    async fn test_local_router_delivers_to_participant() {
        let router = LocalRouter::new(Duration::from_secs(1));
        router
            .register("sales", |msg: RoutedMessage| async move {
                Ok::<_, RouterError>(Report::completed(json!({ "echo": msg.payload["name"] })))
            })
            .await;

        let reports = router
            .send(command(Recipient::Participant("sales".to_string())))
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, ReportStatus::Completed);
        assert_eq!(reports[0].data, Some(json!({ "echo": "PING" })));
    }

    #[tokio::test]
    async fn test_local_router_unknown_participant() {
        let router = LocalRouter::new(Duration::from_secs(1));
        let result = router
            .send(command(Recipient::Participant("ghost".to_string())))
            .await;
        assert_eq!(
            result.unwrap_err(),
            RouterError::UnknownParticipant("ghost".to_string())
        );
    }

    #[tokio::test]
    async fn test_local_router_timeout() {
        let router = LocalRouter::new(Duration::from_millis(20));
        router
            .register("slow", |_msg: RoutedMessage| async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, RouterError>(Report::queued())
            })
            .await;

        let result = router
            .send(command(Recipient::Participant("slow".to_string())))
            .await;
        assert_eq!(result.unwrap_err(), RouterError::Timeout);
    }

    #[tokio::test]
    async fn test_local_router_broadcast_reports_failures() {
        let router = LocalRouter::new(Duration::from_secs(1));
        router
            .register("a", |_msg: RoutedMessage| async move {
                Ok::<_, RouterError>(Report::completed(json!({ "from": "a" })))
            })
            .await;
        router
            .register("b", |_msg: RoutedMessage| async move {
                Err::<Report, _>(RouterError::Rejected {
                    participant: "b".to_string(),
                    reason: "busy".to_string(),
                })
            })
            .await;

        let mut reports = router.send(command(Recipient::Broadcast)).await.unwrap();
        reports.sort_by_key(|r| r.status != ReportStatus::Completed);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].data, Some(json!({ "from": "a" })));
        assert_eq!(reports[1].status, ReportStatus::Failed);
        assert_eq!(
            reports[1].data,
            Some(json!({ "error": "rejected by b: busy" }))
        );
    }

    #[tokio::test]
    async fn test_local_router_unregister() {
        let router = LocalRouter::new(Duration::from_secs(1));
        router
            .register("content", |_msg: RoutedMessage| async move {
                Ok::<_, RouterError>(Report::queued())
            })
            .await;
        assert_eq!(router.participants().await, vec!["content".to_string()]);

        assert!(router.unregister("content").await);
        assert!(!router.unregister("content").await);
        assert!(router.participants().await.is_empty());
    }

    #[test]
    fn test_routed_message_serialization() {
        let msg = command(Recipient::Participant("sales".to_string()));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "COMMAND");
        assert_eq!(json["to"], json!({ "participant": "sales" }));
        assert_eq!(json["priority"], "normal");
        assert_eq!(json["requires_response"], true);

        let broadcast = serde_json::to_value(command(Recipient::Broadcast)).unwrap();
        assert_eq!(broadcast["to"], "broadcast");
    }

    #[test]
    fn test_report_deserialization_without_data() {
        let report: Report = serde_json::from_str(r#"{"status": "queued"}"#).unwrap();
        assert_eq!(report.status, ReportStatus::Queued);
        assert!(report.data.is_none());
    }

    #[test]
    fn test_recipient_as_str() {
        assert_eq!(Recipient::Participant("x".to_string()).as_str(), "x");
        assert_eq!(Recipient::Broadcast.as_str(), "*");
    }
}
