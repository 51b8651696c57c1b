//! Command-and-approval authority layer
//!
//! Issues directives to autonomous worker units, gates high-impact actions
//! behind human approval, and aggregates worker activity into briefings.

pub mod approval;
pub mod briefing;
pub mod center;
pub mod directive;
pub mod dispatcher;
pub mod events;
pub mod gateway;
pub mod policy;
pub mod roster;

pub use approval::{Approval, ApprovalCategory, ApprovalRequest, ApprovalStatus, Decision, Urgency};
pub use briefing::{Briefing, BriefingAggregator, BriefingSettings, DepartmentSummary, Highlight};
pub use center::{CenterSettings, CommandCenter, GatedDirective, PolicyEvaluation};
pub use directive::{Directive, DirectivePriority, DirectiveResult, DirectiveStatus};
pub use dispatcher::DirectiveDispatcher;
pub use events::AuthorityEvent;
pub use gateway::ApprovalGateway;
pub use policy::{should_require_approval, AdmissionPolicy, ApprovalCheck, PolicyRule};
pub use roster::WorkerProfile;
