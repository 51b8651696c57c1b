//! WebSocket client for the Overwatch server

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use crate::messages::{
    Approval, ApprovalCheck, Briefing, ClientMessage, Directive, DirectiveResult,
    PolicyEvaluation, ServerMessage,
};

/// WebSocket client for Overwatch
pub struct OverwatchClient {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<ServerMessage>,
    #[allow(dead_code)]
    handle: tokio::task::JoinHandle<()>,
}

impl OverwatchClient {
    /// Connect to an Overwatch server
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Channel for outgoing messages
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(32);

        // Channel for incoming parsed messages
        let (in_tx, in_rx) = mpsc::channel::<ServerMessage>(32);

        // Spawn task to handle WebSocket communication
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Handle outgoing messages
                    Some(msg) = out_rx.recv() => {
                        if write.send(msg).await.is_err() {
                            break;
                        }
                    }
                    // Handle incoming messages
                    Some(result) = read.next() => {
                        match result {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(msg) => {
                                        if in_tx.send(msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse message: {} - {}", e, text);
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Err(e) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    else => break,
                }
            }
        });

        tracing::info!("Connected successfully");

        Ok(Self {
            tx: out_tx,
            rx: in_rx,
            handle,
        })
    }

    /// Send a message and wait for its reply
    async fn request(&mut self, msg: ClientMessage) -> Result<ServerMessage> {
        let json = serde_json::to_string(&msg)?;
        self.tx
            .send(Message::Text(json))
            .await
            .map_err(|e| anyhow!("Failed to send message: {}", e))?;

        loop {
            match self.rx.recv().await {
                // Events may arrive between replies on a subscribed session
                Some(ServerMessage::Event { .. }) => continue,
                Some(ServerMessage::Error { message }) => {
                    return Err(anyhow!("Server error: {}", message))
                }
                Some(reply) => return Ok(reply),
                None => return Err(anyhow!("Connection closed")),
            }
        }
    }

    /// Start receiving authority events
    pub async fn subscribe(&mut self) -> Result<()> {
        match self.request(ClientMessage::Subscribe).await? {
            ServerMessage::Subscribed => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Wait for the next pushed event; `None` once the connection closes
    pub async fn next_event(&mut self) -> Option<Value> {
        while let Some(msg) = self.rx.recv().await {
            if let ServerMessage::Event { event } = msg {
                return Some(event);
            }
        }
        None
    }

    async fn expect_result(&mut self, msg: ClientMessage) -> Result<DirectiveResult> {
        match self.request(msg).await? {
            ServerMessage::Result { result } => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    pub async fn generate_briefing(&mut self) -> Result<Briefing> {
        match self.request(ClientMessage::GenerateBriefing).await? {
            ServerMessage::Briefing { briefing } => Ok(*briefing),
            other => Err(unexpected(other)),
        }
    }

    pub async fn recent_briefings(&mut self, limit: Option<u32>) -> Result<Vec<Briefing>> {
        match self.request(ClientMessage::RecentBriefings { limit }).await? {
            ServerMessage::Briefings { briefings } => Ok(briefings),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_briefing(&mut self, briefing_id: Uuid) -> Result<Briefing> {
        match self.request(ClientMessage::GetBriefing { briefing_id }).await? {
            ServerMessage::Briefing { briefing } => Ok(*briefing),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_approval(&mut self, approval_id: Uuid) -> Result<Approval> {
        match self.request(ClientMessage::GetApproval { approval_id }).await? {
            ServerMessage::Approval { approval } => Ok(approval),
            other => Err(unexpected(other)),
        }
    }

    pub async fn pending_approvals(&mut self) -> Result<Vec<Approval>> {
        match self.request(ClientMessage::PendingApprovals).await? {
            ServerMessage::PendingApprovals { approvals } => Ok(approvals),
            other => Err(unexpected(other)),
        }
    }

    pub async fn queue_approval(
        &mut self,
        requested_by: String,
        category: String,
        description: String,
        urgency: String,
        context: Value,
    ) -> Result<Uuid> {
        let msg = ClientMessage::QueueApproval {
            requested_by,
            category,
            description,
            urgency,
            context,
            expires_at: None,
        };
        match self.request(msg).await? {
            ServerMessage::ApprovalQueued { approval_id } => Ok(approval_id),
            other => Err(unexpected(other)),
        }
    }

    pub async fn decide_approval(
        &mut self,
        approval_id: Uuid,
        decision: String,
        reason: Option<String>,
    ) -> Result<DirectiveResult> {
        self.expect_result(ClientMessage::DecideApproval {
            approval_id,
            decision,
            reason,
        })
        .await
    }

    pub async fn issue_directive(
        &mut self,
        target: String,
        name: String,
        params: Value,
        priority: Option<String>,
    ) -> Result<DirectiveResult> {
        self.expect_result(ClientMessage::IssueDirective {
            target,
            name,
            params,
            priority,
        })
        .await
    }

    pub async fn issue_gated(
        &mut self,
        target: String,
        name: String,
        params: Value,
        priority: String,
        check: ApprovalCheck,
    ) -> Result<DirectiveResult> {
        self.expect_result(ClientMessage::IssueGated {
            target,
            name,
            params,
            priority,
            check,
        })
        .await
    }

    pub async fn broadcast_directive(
        &mut self,
        name: String,
        params: Value,
        priority: Option<String>,
    ) -> Result<DirectiveResult> {
        self.expect_result(ClientMessage::BroadcastDirective {
            name,
            params,
            priority,
        })
        .await
    }

    pub async fn directive_history(&mut self, limit: Option<usize>) -> Result<Vec<Directive>> {
        match self.request(ClientMessage::DirectiveHistory { limit }).await? {
            ServerMessage::DirectiveHistory { directives } => Ok(directives),
            other => Err(unexpected(other)),
        }
    }

    pub async fn check_policy(&mut self, check: ApprovalCheck) -> Result<PolicyEvaluation> {
        match self.request(ClientMessage::CheckPolicy { check }).await? {
            ServerMessage::PolicyEvaluation { evaluation } => Ok(evaluation),
            other => Err(unexpected(other)),
        }
    }

    pub async fn set_objective(
        &mut self,
        target: String,
        objective: String,
        timeframe: String,
        target_value: Value,
    ) -> Result<DirectiveResult> {
        self.expect_result(ClientMessage::SetObjective {
            target,
            objective,
            timeframe,
            target_value,
        })
        .await
    }

    pub async fn override_decision(
        &mut self,
        target: String,
        override_type: String,
        details: Value,
    ) -> Result<DirectiveResult> {
        self.expect_result(ClientMessage::OverrideDecision {
            target,
            override_type,
            details,
        })
        .await
    }
}

fn unexpected(msg: ServerMessage) -> anyhow::Error {
    anyhow!("Unexpected reply: {:?}", msg)
}
