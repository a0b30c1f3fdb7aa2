use crate::compliance::domain::ComplianceStep;
use crate::compliance::engine::ComplianceEngine;
use crate::compliance::error::ComplianceError;
use crate::compliance::transitions::require_rejection_reason;
use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Administrator,
    Member,
}

/// Identity of whoever is calling, as established by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn administrator(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            role: ActorRole::Administrator,
        }
    }

    pub fn member(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            role: ActorRole::Member,
        }
    }

    /// Administrator when the id is listed under `administrators`.
    pub fn from_settings(settings: &Settings, actor_id: &str) -> Self {
        if settings.is_administrator(actor_id) {
            Self::administrator(actor_id)
        } else {
            Self::member(actor_id)
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.role == ActorRole::Administrator
    }
}

/// Precondition layer in front of approve/reject. Holds no state of its own.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalGate<'a> {
    engine: &'a ComplianceEngine,
}

impl<'a> ApprovalGate<'a> {
    pub fn new(engine: &'a ComplianceEngine) -> Self {
        Self { engine }
    }

    pub fn approve(
        &self,
        actor: &Actor,
        step_id: &str,
        comment: Option<&str>,
        now: i64,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        require_administrator(actor)?;
        self.engine.approve(step_id, &actor.actor_id, comment, now)
    }

    pub fn reject(
        &self,
        actor: &Actor,
        step_id: &str,
        reason: &str,
        now: i64,
    ) -> Result<Option<ComplianceStep>, ComplianceError> {
        require_administrator(actor)?;
        let reason = require_rejection_reason(reason)?;
        self.engine.reject(step_id, &actor.actor_id, reason, now)
    }
}

fn require_administrator(actor: &Actor) -> Result<(), ComplianceError> {
    if !actor.is_administrator() {
        return Err(ComplianceError::NotAdministrator {
            actor_id: actor.actor_id.clone(),
        });
    }
    Ok(())
}
