use super::domain::{Actor, ActorRole};
use super::matching::MatchStatus;
use super::repository::{AuthorizationBoundary, EntityStatus};

/// Default permission table keyed on the actor's role.
///
/// Staff may drive any edge. Hospitals own requests and move their matches through
/// logistics and outcome; donors answer a pending confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleBasedAuthorization;

impl AuthorizationBoundary for RoleBasedAuthorization {
    fn may_transition(&self, actor: &Actor, current: EntityStatus, target: EntityStatus) -> bool {
        if actor.role.is_staff() {
            return true;
        }

        match (actor.role, current, target) {
            (ActorRole::Hospital, EntityStatus::Request(_), EntityStatus::Request(_)) => true,
            (ActorRole::Hospital, EntityStatus::Match(from), EntityStatus::Match(to)) => matches!(
                (from, to),
                (MatchStatus::Proposed, MatchStatus::Rejected)
                    | (_, MatchStatus::PendingConfirmation)
                    | (_, MatchStatus::InTransit)
                    | (_, MatchStatus::Delivered)
                    | (_, MatchStatus::Transplanted)
                    | (_, MatchStatus::Failed)
            ),
            (ActorRole::Donor, EntityStatus::Match(from), EntityStatus::Match(to)) => {
                from == MatchStatus::PendingConfirmation
                    && matches!(to, MatchStatus::Confirmed | MatchStatus::Rejected)
            }
            _ => false,
        }
    }
}
