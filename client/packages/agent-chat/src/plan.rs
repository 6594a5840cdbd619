//! Plan approval handshake: `Idle -> PendingApproval -> Idle`.
//!
//! Entering `PendingApproval` never touches the session's permission mode.
//! That flag only changes when the backend confirms with
//! `permission_mode_changed`.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PlanApproval {
    #[default]
    Idle,
    PendingApproval { session_id: String, plan: String },
}

#[derive(Debug, Default)]
pub struct PlanApprovalHandshake {
    state: PlanApproval,
}

impl PlanApprovalHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PlanApproval {
        &self.state
    }

    pub fn pending_plan(&self, session_id: &str) -> Option<&str> {
        match &self.state {
            PlanApproval::PendingApproval {
                session_id: pending,
                plan,
            } if pending == session_id => Some(plan.as_str()),
            _ => None,
        }
    }

    /// A newer plan replaces any plan still waiting.
    pub fn request(&mut self, session_id: &str, plan: String) {
        tracing::info!(session_id, "plan awaiting approval");
        self.state = PlanApproval::PendingApproval {
            session_id: session_id.to_string(),
            plan,
        };
    }

    /// Clears the pending plan and returns the session it belonged to.
    pub fn approve(&mut self) -> Option<String> {
        self.resolve("approved")
    }

    pub fn reject(&mut self) -> Option<String> {
        self.resolve("rejected")
    }

    fn resolve(&mut self, outcome: &str) -> Option<String> {
        match std::mem::take(&mut self.state) {
            PlanApproval::PendingApproval { session_id, .. } => {
                tracing::info!(session_id = %session_id, outcome, "plan resolved");
                Some(session_id)
            }
            PlanApproval::Idle => None,
        }
    }
}
