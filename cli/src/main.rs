//! Overwatch CLI client - administrative commands over the WebSocket surface

mod client;
mod messages;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::OverwatchClient;
use crate::messages::{ApprovalCheck, Briefing, DirectiveResult};

#[derive(Parser)]
#[command(name = "overwatch")]
#[command(about = "CLI client for the Overwatch command center")]
#[command(version)]
struct Cli {
    /// Server URL (default: ws://localhost:3000/ws)
    #[arg(short, long, default_value = "ws://localhost:3000/ws")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a briefing now, or show an archived one by ID
    Briefing {
        id: Option<String>,
    },

    /// List recent briefings
    Briefings {
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// List pending approvals
    Approvals,

    /// Show one approval, pending or archived
    Approval {
        id: String,
    },

    /// Queue an approval request
    Queue {
        /// Worker asking for approval
        #[arg(short, long)]
        requested_by: String,

        /// Approval category (e.g. pricing_change)
        #[arg(short, long)]
        category: String,

        #[arg(short, long)]
        description: String,

        #[arg(short, long, default_value = "normal")]
        urgency: String,

        /// JSON context
        #[arg(long, value_parser = parse_json)]
        context: Option<Value>,
    },

    /// Approve or reject a pending approval
    Decide {
        /// Approval ID
        id: String,

        /// approved or rejected
        #[arg(short, long)]
        decision: String,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Issue a directive to a worker
    Issue {
        target: String,
        name: String,

        /// JSON parameters
        #[arg(short, long, value_parser = parse_json)]
        params: Option<Value>,

        /// normal, high or critical
        #[arg(long)]
        priority: Option<String>,

        /// Route through the admission policy with this action type
        #[arg(long, requires = "confidence")]
        gate: Option<String>,

        #[arg(long)]
        confidence: Option<f64>,

        #[arg(long)]
        recipients: Option<u64>,

        #[arg(long)]
        amount: Option<f64>,
    },

    /// Send one directive to every worker
    Broadcast {
        name: String,

        /// JSON parameters
        #[arg(short, long, value_parser = parse_json)]
        params: Option<Value>,

        #[arg(long)]
        priority: Option<String>,
    },

    /// Stream authority events until interrupted
    Watch,

    /// Show recent directives
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Check whether an action needs approval
    Check {
        action_type: String,

        #[arg(short, long)]
        confidence: f64,

        #[arg(short, long)]
        recipients: Option<u64>,

        #[arg(short, long)]
        amount: Option<f64>,
    },

    /// Set a worker objective
    Objective {
        target: String,
        objective: String,

        #[arg(short, long, default_value = "weekly")]
        timeframe: String,

        /// JSON target value
        #[arg(short = 'v', long, value_parser = parse_json)]
        target_value: Option<Value>,
    },

    /// Override a worker decision
    Override {
        target: String,
        override_type: String,

        /// JSON details
        #[arg(short, long, value_parser = parse_json)]
        details: Option<Value>,
    },
}

fn parse_json(s: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "overwatch_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let mut client = OverwatchClient::connect(&cli.server).await?;

    match cli.command {
        Commands::Briefing { id } => {
            let briefing = match id {
                Some(id) => client.get_briefing(id.parse()?).await?,
                None => client.generate_briefing().await?,
            };
            print_briefing(&briefing);
            Ok(())
        }
        Commands::Briefings { limit } => run_briefings(&mut client, limit).await,
        Commands::Approvals => run_approvals(&mut client).await,
        Commands::Approval { id } => {
            let a = client.get_approval(id.parse()?).await?;
            println!("Approval {} ({})", a.id, a.status);
            println!("  {} from {} [{}]", a.category, a.requested_by, a.urgency);
            println!("  {}", a.description);
            if let Some(expires_at) = a.expires_at {
                println!("  expires {}", expires_at.format("%Y-%m-%d %H:%M"));
            }
            if !a.context.is_null() {
                println!("  context {}", a.context);
            }
            Ok(())
        }
        Commands::Queue {
            requested_by,
            category,
            description,
            urgency,
            context,
        } => {
            let id = client
                .queue_approval(
                    requested_by,
                    category,
                    description,
                    urgency,
                    context.unwrap_or(Value::Null),
                )
                .await?;
            println!("Queued approval {}", id);
            Ok(())
        }
        Commands::Decide {
            id,
            decision,
            reason,
        } => {
            let result = client
                .decide_approval(id.parse()?, decision, reason)
                .await?;
            print_result(&result);
            Ok(())
        }
        Commands::Issue {
            target,
            name,
            params,
            priority,
            gate,
            confidence,
            recipients,
            amount,
        } => {
            let params = params.unwrap_or(Value::Null);
            let result = match (gate, confidence) {
                (Some(action_type), Some(confidence)) => {
                    let check = ApprovalCheck {
                        action_type,
                        confidence,
                        recipient_count: recipients,
                        amount,
                    };
                    let priority = priority.unwrap_or_else(|| "normal".to_string());
                    client
                        .issue_gated(target, name, params, priority, check)
                        .await?
                }
                _ => client.issue_directive(target, name, params, priority).await?,
            };
            print_result(&result);
            Ok(())
        }
        Commands::Broadcast {
            name,
            params,
            priority,
        } => {
            let result = client
                .broadcast_directive(name, params.unwrap_or(Value::Null), priority)
                .await?;
            print_result(&result);
            Ok(())
        }
        Commands::Watch => {
            client.subscribe().await?;
            println!("Watching events (Ctrl+C to stop)");
            while let Some(event) = client.next_event().await {
                let kind = event["kind"].as_str().unwrap_or("event");
                println!("  {:<20} {}", kind, event);
            }
            println!("Connection closed.");
            Ok(())
        }
        Commands::History { limit } => run_history(&mut client, limit).await,
        Commands::Check {
            action_type,
            confidence,
            recipients,
            amount,
        } => {
            let evaluation = client
                .check_policy(ApprovalCheck {
                    action_type,
                    confidence,
                    recipient_count: recipients,
                    amount,
                })
                .await?;
            if evaluation.requires_approval {
                println!("Approval required: {}", evaluation.rules.join(", "));
            } else {
                println!("No approval required");
            }
            Ok(())
        }
        Commands::Objective {
            target,
            objective,
            timeframe,
            target_value,
        } => {
            let result = client
                .set_objective(
                    target,
                    objective,
                    timeframe,
                    target_value.unwrap_or(Value::Null),
                )
                .await?;
            print_result(&result);
            Ok(())
        }
        Commands::Override {
            target,
            override_type,
            details,
        } => {
            let result = client
                .override_decision(target, override_type, details.unwrap_or(Value::Null))
                .await?;
            print_result(&result);
            Ok(())
        }
    }
}

fn print_briefing(briefing: &Briefing) {
    println!("Briefing {}", briefing.id);
    println!(
        "Period: {} - {}",
        briefing.period_start.format("%Y-%m-%d %H:%M"),
        briefing.period_end.format("%Y-%m-%d %H:%M")
    );
    println!();
    println!("{}", briefing.summary);

    if !briefing.highlights.is_empty() {
        println!();
        println!("Highlights:");
        for h in &briefing.highlights {
            println!("  [{}/{}] {} - {}", h.impact, h.kind, h.title, h.detail);
        }
    }

    if !briefing.departments.is_empty() {
        println!();
        println!("Departments:");
        println!("{:─<60}", "");
        for d in &briefing.departments {
            println!(
                "  {:<16} {:<16} done {:>4}  pending {:>4}  {}: {}",
                d.display_name,
                d.status,
                d.actions_completed,
                d.actions_pending,
                d.headline.name,
                d.headline.value
            );
        }
    }

    println!();
    println!(
        "{} pending approvals, success rate {:.1}%",
        briefing.pending_approvals.len(),
        briefing.metrics.success_rate
    );
}

async fn run_briefings(client: &mut OverwatchClient, limit: Option<u32>) -> Result<()> {
    let briefings = client.recent_briefings(limit).await?;

    if briefings.is_empty() {
        println!("No briefings found.");
    } else {
        for b in briefings {
            println!(
                "  {} ({}) {}",
                b.id,
                b.generated_at.format("%Y-%m-%d %H:%M"),
                b.summary
            );
        }
    }

    Ok(())
}

async fn run_approvals(client: &mut OverwatchClient) -> Result<()> {
    let approvals = client.pending_approvals().await?;

    if approvals.is_empty() {
        println!("No pending approvals.");
    } else {
        println!("Pending approvals:");
        println!("{:─<60}", "");
        for a in approvals {
            println!(
                "  {} [{}] {} from {}: {}",
                a.id, a.urgency, a.category, a.requested_by, a.description
            );
        }
    }

    Ok(())
}

async fn run_history(client: &mut OverwatchClient, limit: usize) -> Result<()> {
    let directives = client.directive_history(Some(limit)).await?;

    if directives.is_empty() {
        println!("No directives issued.");
    } else {
        for d in directives {
            println!(
                "  {} {} -> {} ({}) {}",
                d.issued_at.format("%Y-%m-%d %H:%M:%S"),
                d.name,
                d.target_label(),
                d.priority,
                d.id
            );
        }
    }

    Ok(())
}

fn print_result(result: &DirectiveResult) {
    match &result.error {
        Some(error) => println!("{}: {}", result.status, error),
        None => println!("{}", result.status),
    }
    if let Some(id) = result.directive_id {
        println!("  directive {}", id);
    }
    if let Some(data) = &result.data {
        println!("  {}", data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_gated_issue() {
        let cli = Cli::parse_from([
            "overwatch",
            "issue",
            "outreach",
            "SEND_CAMPAIGN",
            "--params",
            r#"{"campaign":"spring"}"#,
            "--gate",
            "email_campaign",
            "--confidence",
            "90",
            "--recipients",
            "150",
        ]);

        match cli.command {
            Commands::Issue {
                target,
                params,
                gate,
                recipients,
                ..
            } => {
                assert_eq!(target, "outreach");
                assert_eq!(params.unwrap()["campaign"], "spring");
                assert_eq!(gate.as_deref(), Some("email_campaign"));
                assert_eq!(recipients, Some(150));
            }
            _ => panic!("expected issue command"),
        }
    }

    #[test]
    fn test_parse_json_rejects_garbage() {
        assert!(parse_json("{not json").is_err());
    }
}
