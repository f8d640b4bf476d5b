//! Session phase state machine.
//!
//! Setup → Create → Share (single-creator only) → Solve → Results. Any
//! phase may cancel back to Setup; collaborative creators skip Share and
//! converge on the ready barrier instead.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    Setup,
    Create,
    Share,
    Solve,
    Results,
}

impl SessionPhase {
    /// Results is the only terminal phase; everything else can advance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Results)
    }

    /// Scene authoring is only legal while creating.
    pub fn can_edit_scenes(&self) -> bool {
        matches!(self, SessionPhase::Create)
    }

    pub fn is_solving(&self) -> bool {
        matches!(self, SessionPhase::Solve)
    }
}

/// How this client participates in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum SessionRole {
    /// One player, fully local.
    Solo,
    /// Created the room. Classic leads author every scene and pass through
    /// Share; collaborative leads split authoring with joiners.
    Lead { collaborative: bool },
    /// Joined an existing room by code. Always collaborative.
    Joiner,
}

impl SessionRole {
    /// Solo and classic leads author the full scene set themselves and
    /// pass through Share; everyone else waits on the ready barrier.
    pub fn is_single_creator(&self) -> bool {
        matches!(
            self,
            SessionRole::Solo
                | SessionRole::Lead {
                    collaborative: false
                }
        )
    }

    /// Whether this session syncs through the remote store at all.
    pub fn is_remote(&self) -> bool {
        !matches!(self, SessionRole::Solo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_predicates() {
        assert!(SessionPhase::Results.is_terminal());
        assert!(!SessionPhase::Solve.is_terminal());
        assert!(SessionPhase::Create.can_edit_scenes());
        assert!(!SessionPhase::Solve.can_edit_scenes());
        assert!(SessionPhase::Solve.is_solving());
    }

    #[test]
    fn test_single_creator_roles_pass_through_share() {
        assert!(SessionRole::Solo.is_single_creator());
        assert!(SessionRole::Lead {
            collaborative: false
        }
        .is_single_creator());
        assert!(!SessionRole::Lead {
            collaborative: true
        }
        .is_single_creator());
        assert!(!SessionRole::Joiner.is_single_creator());
    }

    #[test]
    fn test_only_solo_sessions_stay_local() {
        assert!(!SessionRole::Solo.is_remote());
        assert!(SessionRole::Joiner.is_remote());
        assert!(SessionRole::Lead {
            collaborative: false
        }
        .is_remote());
    }
}
