//! Call signaling state machine
//!
//! ```text
//! Invited ──accept──▶ Accepted ──▶ Active ──end──▶ Ended
//!    │
//!    ├──deny────▶ Denied
//!    ├──cancel──▶ Cancelled
//!    ├──timeout─▶ TimedOut
//!    └──end─────▶ Ended
//! ```
//!
//! Sessions live only in memory. A session reaching a terminal state leaves
//! the live set, and its id is remembered together with the final state so
//! that a late or replayed event for it, `call-invite` included, is rejected
//! and produces nothing. The oldest finished ids are forgotten once
//! [`FINISHED_CAPACITY`] is exceeded.

use super::events::{CallInvite, ServerEvent};
use super::relay::Outbound;
use crate::models::PeerProfile;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Invited,
    Accepted,
    Active,
    Denied,
    Cancelled,
    TimedOut,
    Ended,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Denied | CallState::Cancelled | CallState::TimedOut | CallState::Ended
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            CallState::Invited => "invited",
            CallState::Accepted => "accepted",
            CallState::Active => "active",
            CallState::Denied => "denied",
            CallState::Cancelled => "cancelled",
            CallState::TimedOut => "timed_out",
            CallState::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call event produced no outbound events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalRejected {
    #[error("call id is empty")]
    EmptyCallId,

    #[error("cannot call yourself")]
    SelfCall,

    #[error("cannot signal yourself")]
    SelfTarget,

    #[error("call {0} is already in progress")]
    DuplicateCall(String),

    #[error("call {0} is unknown")]
    UnknownCall(String),

    #[error("call {call_id} is already {state}")]
    FinishedCall { call_id: String, state: CallState },

    #[error("user is not allowed to {action} call {call_id}")]
    WrongParty {
        call_id: String,
        action: &'static str,
    },

    #[error("cannot {action} call {call_id} while {state}")]
    IllegalTransition {
        call_id: String,
        action: &'static str,
        state: CallState,
    },
}

impl SignalRejected {
    /// Metric label for the rejection
    pub fn reason(&self) -> &'static str {
        match self {
            SignalRejected::EmptyCallId => "empty_call_id",
            SignalRejected::SelfCall | SignalRejected::SelfTarget => "self_target",
            SignalRejected::DuplicateCall(_) => "duplicate",
            SignalRejected::UnknownCall(_) => "unknown_call",
            SignalRejected::FinishedCall { .. } => "finished_call",
            SignalRejected::WrongParty { .. } => "wrong_party",
            SignalRejected::IllegalTransition { .. } => "illegal_transition",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: String,
    pub caller_id: Uuid,
    pub recipient_id: Uuid,
    pub state: CallState,
    pub caller_profile: PeerProfile,
    pub recipient_profile: PeerProfile,
    pub invited_at: DateTime<Utc>,
}

impl CallSession {
    fn is_party(&self, user_id: Uuid) -> bool {
        user_id == self.caller_id || user_id == self.recipient_id
    }

    fn advance(&mut self, next: CallState) {
        tracing::debug!(call_id = %self.call_id, from = %self.state, to = %next, "call transition");
        self.state = next;
    }

    fn counterpart(&self, user_id: Uuid) -> Uuid {
        if user_id == self.caller_id {
            self.recipient_id
        } else {
            self.caller_id
        }
    }
}

/// Which party may fire a transition
#[derive(Clone, Copy)]
enum Party {
    Caller,
    Recipient,
    Either,
}

/// Finished call ids kept per node
pub const FINISHED_CAPACITY: usize = 10_000;

/// All live calls on this node, keyed by call id, plus recently finished ids
#[derive(Debug)]
pub struct CallBook {
    calls: HashMap<String, CallSession>,
    finished: HashMap<String, CallState>,
    // Oldest first
    finished_order: VecDeque<String>,
    finished_capacity: usize,
}

impl Default for CallBook {
    fn default() -> Self {
        Self::with_finished_capacity(FINISHED_CAPACITY)
    }
}

impl CallBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_finished_capacity(finished_capacity: usize) -> Self {
        Self {
            calls: HashMap::new(),
            finished: HashMap::new(),
            finished_order: VecDeque::new(),
            finished_capacity,
        }
    }

    /// Terminal state of a recently finished call
    pub fn finished_state(&self, call_id: &str) -> Option<CallState> {
        self.finished.get(call_id).copied()
    }

    pub fn get(&self, call_id: &str) -> Option<&CallSession> {
        self.calls.get(call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Open a call in `Invited` and ring the recipient
    pub fn invite(
        &mut self,
        caller_id: Uuid,
        invite: CallInvite,
    ) -> Result<Vec<Outbound>, SignalRejected> {
        if invite.call_id.trim().is_empty() {
            return Err(SignalRejected::EmptyCallId);
        }
        if invite.recipient_id == caller_id {
            return Err(SignalRejected::SelfCall);
        }
        self.reject_finished(&invite.call_id)?;
        if self.calls.contains_key(&invite.call_id) {
            return Err(SignalRejected::DuplicateCall(invite.call_id));
        }

        let caller_profile = PeerProfile {
            id: caller_id,
            name: invite.caller_name.clone(),
            profile_picture: invite.caller_profile_picture.clone(),
        };
        let recipient_profile = match invite.other_user {
            Some(profile) if profile.id == invite.recipient_id => profile,
            _ => PeerProfile::bare(invite.recipient_id),
        };

        let session = CallSession {
            call_id: invite.call_id.clone(),
            caller_id,
            recipient_id: invite.recipient_id,
            state: CallState::Invited,
            caller_profile: caller_profile.clone(),
            recipient_profile,
            invited_at: Utc::now(),
        };

        let ring = Outbound::new(
            session.recipient_id,
            ServerEvent::IncomingCall {
                call_id: session.call_id.clone(),
                caller_id,
                caller_name: invite.caller_name,
                caller_profile_picture: invite.caller_profile_picture,
                other_user: caller_profile,
            },
        );

        self.calls.insert(session.call_id.clone(), session);
        Ok(vec![ring])
    }

    /// Recipient picks up: Invited → Accepted → Active in one step
    pub fn accept(&mut self, actor: Uuid, call_id: &str) -> Result<Vec<Outbound>, SignalRejected> {
        let session = self.checked(actor, call_id, "accept", Party::Recipient)?;
        Self::require_state(session, "accept", CallState::Invited)?;
        session.advance(CallState::Accepted);
        session.advance(CallState::Active);

        let call_id = session.call_id.clone();
        Ok(vec![
            Outbound::new(
                session.caller_id,
                ServerEvent::CallAccepted {
                    call_id: call_id.clone(),
                },
            ),
            Outbound::new(
                session.caller_id,
                ServerEvent::StartVideoCall {
                    call_id: call_id.clone(),
                    other_user: session.recipient_profile.clone(),
                },
            ),
            Outbound::new(
                session.recipient_id,
                ServerEvent::StartVideoCall {
                    call_id,
                    other_user: session.caller_profile.clone(),
                },
            ),
        ])
    }

    pub fn deny(&mut self, actor: Uuid, call_id: &str) -> Result<Vec<Outbound>, SignalRejected> {
        let session = self.checked(actor, call_id, "deny", Party::Recipient)?;
        Self::require_state(session, "deny", CallState::Invited)?;
        let to = session.caller_id;
        self.finish(call_id, CallState::Denied);

        Ok(vec![Outbound::new(
            to,
            ServerEvent::CallDenied {
                call_id: call_id.to_string(),
            },
        )])
    }

    pub fn cancel(&mut self, actor: Uuid, call_id: &str) -> Result<Vec<Outbound>, SignalRejected> {
        let session = self.checked(actor, call_id, "cancel", Party::Caller)?;
        Self::require_state(session, "cancel", CallState::Invited)?;
        let to = session.recipient_id;
        self.finish(call_id, CallState::Cancelled);

        Ok(vec![Outbound::new(
            to,
            ServerEvent::CallCancelled {
                call_id: call_id.to_string(),
            },
        )])
    }

    /// Either side may declare an unanswered call timed out
    pub fn timeout(&mut self, actor: Uuid, call_id: &str) -> Result<Vec<Outbound>, SignalRejected> {
        let session = self.checked(actor, call_id, "time out", Party::Either)?;
        Self::require_state(session, "time out", CallState::Invited)?;
        let to = session.counterpart(actor);
        self.finish(call_id, CallState::TimedOut);

        Ok(vec![Outbound::new(
            to,
            ServerEvent::CallTimeout {
                call_id: call_id.to_string(),
            },
        )])
    }

    /// Hang up from any live state; both sides hear about it
    pub fn end(&mut self, actor: Uuid, call_id: &str) -> Result<Vec<Outbound>, SignalRejected> {
        let session = self.checked(actor, call_id, "end", Party::Either)?;
        let parties = [session.caller_id, session.recipient_id];
        self.finish(call_id, CallState::Ended);

        Ok(parties
            .into_iter()
            .map(|to| {
                Outbound::new(
                    to,
                    ServerEvent::CallEnded {
                        call_id: call_id.to_string(),
                    },
                )
            })
            .collect())
    }

    /// End every call `user_id` takes part in, telling the other side
    ///
    /// Used when a user's last session goes away.
    pub fn abandon(&mut self, user_id: Uuid) -> Vec<Outbound> {
        let call_ids: Vec<String> = self
            .calls
            .values()
            .filter(|s| s.is_party(user_id))
            .map(|s| s.call_id.clone())
            .collect();

        let mut outbound = Vec::with_capacity(call_ids.len());
        for call_id in call_ids {
            if let Some(session) = self.finish(&call_id, CallState::Ended) {
                outbound.push(Outbound::new(
                    session.counterpart(user_id),
                    ServerEvent::CallEnded { call_id },
                ));
            }
        }
        outbound
    }

    fn checked(
        &mut self,
        actor: Uuid,
        call_id: &str,
        action: &'static str,
        party: Party,
    ) -> Result<&mut CallSession, SignalRejected> {
        self.reject_finished(call_id)?;
        let session = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| SignalRejected::UnknownCall(call_id.to_string()))?;

        let allowed = match party {
            Party::Caller => actor == session.caller_id,
            Party::Recipient => actor == session.recipient_id,
            Party::Either => session.is_party(actor),
        };
        if !allowed {
            return Err(SignalRejected::WrongParty {
                call_id: call_id.to_string(),
                action,
            });
        }
        Ok(session)
    }

    fn require_state(
        session: &CallSession,
        action: &'static str,
        expected: CallState,
    ) -> Result<(), SignalRejected> {
        if session.state != expected {
            return Err(SignalRejected::IllegalTransition {
                call_id: session.call_id.clone(),
                action,
                state: session.state,
            });
        }
        Ok(())
    }

    fn reject_finished(&self, call_id: &str) -> Result<(), SignalRejected> {
        match self.finished.get(call_id) {
            Some(&state) => Err(SignalRejected::FinishedCall {
                call_id: call_id.to_string(),
                state,
            }),
            None => Ok(()),
        }
    }

    fn finish(&mut self, call_id: &str, state: CallState) -> Option<CallSession> {
        debug_assert!(state.is_terminal());
        let mut session = self.calls.remove(call_id)?;
        session.state = state;

        self.finished.insert(call_id.to_string(), state);
        self.finished_order.push_back(call_id.to_string());
        while self.finished_order.len() > self.finished_capacity {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
        tracing::debug!(
            call_id = %call_id,
            state = %state,
            ringing_secs = (Utc::now() - session.invited_at).num_seconds(),
            "call finished"
        );
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(call_id: &str, recipient_id: Uuid) -> CallInvite {
        CallInvite {
            call_id: call_id.to_string(),
            recipient_id,
            caller_name: "Caller".into(),
            caller_profile_picture: Some("https://cdn.example/caller.png".into()),
            other_user: Some(PeerProfile {
                id: recipient_id,
                name: "Recipient".into(),
                profile_picture: None,
            }),
        }
    }

    fn setup() -> (CallBook, Uuid, Uuid) {
        let mut book = CallBook::new();
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        book.invite(caller, invite("c1", recipient)).unwrap();
        (book, caller, recipient)
    }

    #[test]
    fn test_invite_rings_recipient_only() {
        let mut book = CallBook::new();
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();

        let out = book.invite(caller, invite("c1", recipient)).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, recipient);
        match &out[0].event {
            ServerEvent::IncomingCall {
                caller_id,
                caller_name,
                other_user,
                ..
            } => {
                assert_eq!(*caller_id, caller);
                assert_eq!(caller_name, "Caller");
                assert_eq!(other_user.id, caller);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(book.get("c1").unwrap().state, CallState::Invited);
    }

    #[test]
    fn test_accept_starts_video_on_both_sides() {
        let (mut book, caller, recipient) = setup();

        let out = book.accept(recipient, "c1").unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].to, caller);
        assert_eq!(out[0].event.name(), "call-accepted");

        let starts: Vec<&Outbound> = out
            .iter()
            .filter(|o| o.event.name() == "start-video-call")
            .collect();
        assert_eq!(starts.len(), 2);
        for start in starts {
            let ServerEvent::StartVideoCall { other_user, .. } = &start.event else {
                panic!("unexpected {:?}", start.event);
            };
            // Each side sees the other party's profile
            assert_ne!(other_user.id, start.to);
        }
        assert_eq!(book.get("c1").unwrap().state, CallState::Active);
    }

    #[test]
    fn test_only_recipient_accepts() {
        let (mut book, caller, _) = setup();
        assert!(matches!(
            book.accept(caller, "c1"),
            Err(SignalRejected::WrongParty { .. })
        ));
        assert!(matches!(
            book.accept(Uuid::new_v4(), "c1"),
            Err(SignalRejected::WrongParty { .. })
        ));
    }

    #[test]
    fn test_deny_notifies_caller_and_closes() {
        let (mut book, caller, recipient) = setup();

        let out = book.deny(recipient, "c1").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, caller);
        assert_eq!(out[0].event.name(), "call-denied");

        assert!(book.is_empty());
        assert_eq!(book.finished_state("c1"), Some(CallState::Denied));
        assert_eq!(
            book.accept(recipient, "c1"),
            Err(SignalRejected::FinishedCall {
                call_id: "c1".into(),
                state: CallState::Denied,
            })
        );
    }

    #[test]
    fn test_cancel_is_caller_only_and_notifies_recipient() {
        let (mut book, caller, recipient) = setup();
        assert!(book.cancel(recipient, "c1").is_err());

        let out = book.cancel(caller, "c1").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, recipient);
        assert_eq!(out[0].event.name(), "call-cancelled");
    }

    #[test]
    fn test_cancel_after_accept_is_illegal() {
        let (mut book, caller, recipient) = setup();
        book.accept(recipient, "c1").unwrap();

        assert!(matches!(
            book.cancel(caller, "c1"),
            Err(SignalRejected::IllegalTransition {
                state: CallState::Active,
                ..
            })
        ));
    }

    #[test]
    fn test_timeout_notifies_other_party() {
        let (mut book, caller, recipient) = setup();

        let out = book.timeout(recipient, "c1").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, caller);
        assert_eq!(out[0].event.name(), "call-timeout");
    }

    #[test]
    fn test_end_notifies_both_and_nothing_after() {
        let (mut book, caller, recipient) = setup();
        book.accept(recipient, "c1").unwrap();

        let out = book.end(caller, "c1").unwrap();
        let mut targets: Vec<Uuid> = out.iter().map(|o| o.to).collect();
        targets.sort();
        let mut expected = vec![caller, recipient];
        expected.sort();
        assert_eq!(targets, expected);
        assert!(out.iter().all(|o| o.event.name() == "call-ended"));

        assert!(book.end(recipient, "c1").is_err());
        assert!(book.timeout(caller, "c1").is_err());
    }

    #[test]
    fn test_duplicate_and_self_invites_rejected() {
        let (mut book, caller, recipient) = setup();
        assert_eq!(
            book.invite(caller, invite("c1", recipient)),
            Err(SignalRejected::DuplicateCall("c1".into()))
        );
        assert_eq!(
            book.invite(caller, invite("c2", caller)),
            Err(SignalRejected::SelfCall)
        );
        assert_eq!(
            book.invite(caller, invite("  ", recipient)),
            Err(SignalRejected::EmptyCallId)
        );
    }

    #[test]
    fn test_abandon_ends_calls_for_user() {
        let (mut book, caller, recipient) = setup();
        let bystander = Uuid::new_v4();
        book.invite(bystander, invite("c2", Uuid::new_v4())).unwrap();

        let out = book.abandon(caller);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, recipient);
        assert_eq!(out[0].event.name(), "call-ended");
        assert!(book.get("c1").is_none());
        assert!(book.get("c2").is_some());
    }

    #[test]
    fn test_mismatched_recipient_profile_replaced() {
        let mut book = CallBook::new();
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let mut inv = invite("c1", recipient);
        inv.other_user = Some(PeerProfile::bare(Uuid::new_v4()));
        book.invite(caller, inv).unwrap();

        assert_eq!(book.get("c1").unwrap().recipient_profile.id, recipient);
    }

    #[test]
    fn test_reinvite_after_end_is_rejected() {
        let (mut book, caller, recipient) = setup();
        book.accept(recipient, "c1").unwrap();
        book.end(caller, "c1").unwrap();

        let finished = SignalRejected::FinishedCall {
            call_id: "c1".into(),
            state: CallState::Ended,
        };
        assert_eq!(book.invite(caller, invite("c1", recipient)), Err(finished.clone()));
        assert_eq!(book.accept(recipient, "c1"), Err(finished.clone()));
        assert_eq!(book.end(recipient, "c1"), Err(finished));
        assert!(book.is_empty());
    }

    #[test]
    fn test_reinvite_after_cancel_is_rejected_for_either_side() {
        let (mut book, caller, recipient) = setup();
        book.cancel(caller, "c1").unwrap();

        assert!(matches!(
            book.invite(recipient, invite("c1", caller)),
            Err(SignalRejected::FinishedCall {
                state: CallState::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn test_oldest_finished_ids_are_forgotten() {
        let mut book = CallBook::with_finished_capacity(2);
        let caller = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        for id in ["c1", "c2", "c3"] {
            book.invite(caller, invite(id, recipient)).unwrap();
            book.deny(recipient, id).unwrap();
        }

        assert_eq!(book.finished_state("c1"), None);
        assert_eq!(book.finished_state("c2"), Some(CallState::Denied));
        assert_eq!(book.finished_state("c3"), Some(CallState::Denied));
        assert!(book.invite(caller, invite("c1", recipient)).is_ok());
    }
}
