use crate::error::{AppError, AppResult, Denial};
use crate::storage::RelationshipDirectory;
use std::sync::Arc;
use uuid::Uuid;

/// Decides whether two users may talk to each other
///
/// Messaging is allowed between mutual connections and between the two sides
/// of an accepted mentorship. Lookup failures deny.
#[derive(Clone)]
pub struct AuthorizationGate {
    directory: Arc<dyn RelationshipDirectory>,
}

impl AuthorizationGate {
    pub fn new(directory: Arc<dyn RelationshipDirectory>) -> Self {
        Self { directory }
    }

    pub async fn can_message(&self, a: Uuid, b: Uuid) -> bool {
        match self.lookup(a, b).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    user_a = %a,
                    user_b = %b,
                    error = %e,
                    "relationship lookup failed; denying messaging"
                );
                false
            }
        }
    }

    /// [`can_message`](Self::can_message) as a request guard
    pub async fn ensure_can_message(&self, a: Uuid, b: Uuid) -> AppResult<()> {
        if self.can_message(a, b).await {
            Ok(())
        } else {
            Err(AppError::Authorization(Denial::MessagingNotAllowed))
        }
    }

    async fn lookup(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        if self.directory.are_mutual_connections(a, b).await? {
            return Ok(true);
        }
        self.directory.has_accepted_mentorship(a, b).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryRelationshipDirectory, MentorshipStatus};

    #[tokio::test]
    async fn test_mutual_connection_allows() {
        let directory = Arc::new(InMemoryRelationshipDirectory::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        directory.connect(a, b).await;

        let gate = AuthorizationGate::new(directory);
        assert!(gate.can_message(a, b).await);
        assert!(gate.can_message(b, a).await);
    }

    #[tokio::test]
    async fn test_mentorship_either_direction_allows() {
        let directory = Arc::new(InMemoryRelationshipDirectory::new());
        let mentor = Uuid::new_v4();
        let mentee = Uuid::new_v4();
        directory
            .add_mentorship(mentor, mentee, MentorshipStatus::Accepted)
            .await;

        let gate = AuthorizationGate::new(directory);
        assert!(gate.can_message(mentee, mentor).await);
        assert!(gate.can_message(mentor, mentee).await);
    }

    #[tokio::test]
    async fn test_strangers_denied() {
        let gate = AuthorizationGate::new(Arc::new(InMemoryRelationshipDirectory::new()));
        let err = gate
            .ensure_can_message(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err, AppError::Authorization(Denial::MessagingNotAllowed));
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_closed() {
        let directory = Arc::new(InMemoryRelationshipDirectory::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        directory.connect(a, b).await;
        directory.set_unavailable(true);

        let gate = AuthorizationGate::new(directory);
        assert!(!gate.can_message(a, b).await);
    }
}
