//! Flash lifecycle: states, roles and the legal transition edges.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Draft,
    PendingSupervisor,
    PendingReview,
    RequestInfo,
    Published,
    Archived,
}

impl FlashState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashState::Draft => "draft",
            FlashState::PendingSupervisor => "pending_supervisor",
            FlashState::PendingReview => "pending_review",
            FlashState::RequestInfo => "request_info",
            FlashState::Published => "published",
            FlashState::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(FlashState::Draft),
            "pending_supervisor" => Some(FlashState::PendingSupervisor),
            "pending_review" => Some(FlashState::PendingReview),
            "request_info" => Some(FlashState::RequestInfo),
            "published" => Some(FlashState::Published),
            "archived" => Some(FlashState::Archived),
            _ => None,
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, FlashState::Draft | FlashState::RequestInfo)
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashType {
    Yellow,
    Red,
    Green,
}

impl FlashType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashType::Yellow => "yellow",
            FlashType::Red => "red",
            FlashType::Green => "green",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "yellow" => Some(FlashType::Yellow),
            "red" => Some(FlashType::Red),
            "green" => Some(FlashType::Green),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Safety,
    Communications,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Safety => "safety",
            Role::Communications => "communications",
            Role::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "safety" => Some(Role::Safety),
            "communications" => Some(Role::Communications),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }

    pub fn is_admin_or_safety(&self) -> bool {
        matches!(self, Role::Admin | Role::Safety)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStatus {
    None,
    Queued,
    Ready,
    Failed,
}

impl PreviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewStatus::None => "none",
            PreviewStatus::Queued => "queued",
            PreviewStatus::Ready => "ready",
            PreviewStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    Submit { has_approvers: bool },
    SupervisorApprove,
    SupervisorRequestChanges,
    ReviewApprove,
    ReviewRequestChanges,
    Archive,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Submit { .. } => "submit",
            WorkflowAction::SupervisorApprove => "supervisor_approve",
            WorkflowAction::SupervisorRequestChanges => "supervisor_request_changes",
            WorkflowAction::ReviewApprove => "review_approve",
            WorkflowAction::ReviewRequestChanges => "review_request_changes",
            WorkflowAction::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    Illegal {
        from: FlashState,
        action: &'static str,
    },
    TranslationChild,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::Illegal { from, action } => {
                write!(f, "cannot {action} a flash in state {from}")
            }
            TransitionError::TranslationChild => {
                f.write_str("translation variants do not enter the review workflow")
            }
        }
    }
}

/// Computes the successor state for an action, or rejects the edge.
/// Translation children are barred from every workflow action.
pub fn apply(
    state: FlashState,
    action: WorkflowAction,
    is_translation_child: bool,
) -> Result<FlashState, TransitionError> {
    if is_translation_child {
        return Err(TransitionError::TranslationChild);
    }

    let illegal = || TransitionError::Illegal {
        from: state,
        action: action.as_str(),
    };

    match action {
        WorkflowAction::Submit { has_approvers } => match state {
            FlashState::Draft | FlashState::RequestInfo => Ok(if has_approvers {
                FlashState::PendingSupervisor
            } else {
                FlashState::PendingReview
            }),
            FlashState::PendingSupervisor
            | FlashState::PendingReview
            | FlashState::Published
            | FlashState::Archived => Err(illegal()),
        },
        WorkflowAction::SupervisorApprove => match state {
            FlashState::PendingSupervisor => Ok(FlashState::PendingReview),
            _ => Err(illegal()),
        },
        WorkflowAction::SupervisorRequestChanges => match state {
            FlashState::PendingSupervisor => Ok(FlashState::RequestInfo),
            _ => Err(illegal()),
        },
        WorkflowAction::ReviewApprove => match state {
            FlashState::PendingReview => Ok(FlashState::Published),
            _ => Err(illegal()),
        },
        WorkflowAction::ReviewRequestChanges => match state {
            FlashState::PendingReview => Ok(FlashState::RequestInfo),
            _ => Err(illegal()),
        },
        WorkflowAction::Archive => match state {
            FlashState::Published => Ok(FlashState::Archived),
            _ => Err(illegal()),
        },
    }
}

/// The one invariant worth stating twice: an email goes out iff the state
/// actually changed, and never for a translation child.
pub fn should_notify(old: FlashState, new: FlashState, is_translation_child: bool) -> bool {
    old != new && !is_translation_child
}

pub fn initial_state(submit: bool, has_approvers: bool) -> FlashState {
    if !submit {
        FlashState::Draft
    } else if has_approvers {
        FlashState::PendingSupervisor
    } else {
        FlashState::PendingReview
    }
}
