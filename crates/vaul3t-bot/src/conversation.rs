//! Per-identity conversation state machine.
//!
//! One state slot per identity, held in memory only. A restart drops every
//! pending flow and the user is simply prompted again. Starting a new flow
//! replaces whatever flow was pending; there is no queue.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use vaul3t_access::Identity;

use crate::commands::CommandKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingCredential,
    AwaitingArgument(CommandKind),
}

impl ConversationState {
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingCredential => "awaiting_credential",
            Self::AwaitingArgument(_) => "awaiting_argument",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEvent {
    /// `/start` or the set-token button.
    CredentialRequested,
    /// A gated command passed admission.
    Admitted(CommandKind),
    Cancel,
    CredentialAccepted,
    CredentialRejected,
    ArgumentReceived,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot apply {event:?} while {state:?}")]
    Illegal {
        state: ConversationState,
        event: ConversationEvent,
    },
    #[error("no credential is bound to the pending {0:?} request")]
    UnboundCredential(CommandKind),
}

/// Transition table. Flow entry is accepted from any state so the newest
/// command wins; every other event is only legal in its own state.
pub fn transition(
    state: ConversationState,
    event: ConversationEvent,
) -> Result<ConversationState, TransitionError> {
    use ConversationEvent as Event;
    use ConversationState as State;

    match (state, event) {
        (_, Event::CredentialRequested) => Ok(State::AwaitingCredential),
        (_, Event::Admitted(kind)) => Ok(State::AwaitingArgument(kind)),
        (State::AwaitingCredential | State::AwaitingArgument(_), Event::Cancel) => Ok(State::Idle),
        (State::AwaitingCredential, Event::CredentialAccepted) => Ok(State::Idle),
        (State::AwaitingCredential, Event::CredentialRejected) => Ok(State::AwaitingCredential),
        (State::AwaitingArgument(_), Event::ArgumentReceived) => Ok(State::Idle),
        (state, event) => Err(TransitionError::Illegal { state, event }),
    }
}

/// Argument flow ready to run: the command and the credential admitted for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArgument {
    pub kind: CommandKind,
    pub credential: String,
}

#[derive(Debug, Default)]
struct Session {
    state: ConversationState,
    credential: Option<String>,
}

#[derive(Debug, Default)]
pub struct ConversationBook {
    sessions: Mutex<HashMap<Identity, Session>>,
}

impl ConversationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, identity: &Identity) -> ConversationState {
        self.lock()
            .get(identity)
            .map(|session| session.state)
            .unwrap_or_default()
    }

    pub fn apply(
        &self,
        identity: &Identity,
        event: ConversationEvent,
    ) -> Result<ConversationState, TransitionError> {
        let mut sessions = self.lock();
        let current = sessions
            .get(identity)
            .map(|session| session.state)
            .unwrap_or_default();
        let next = transition(current, event)?;
        store_session(&mut sessions, identity, next, None);
        Ok(next)
    }

    /// Enters the argument flow for `kind`, binding the admitted credential.
    pub fn admit(
        &self,
        identity: &Identity,
        kind: CommandKind,
        credential: String,
    ) -> Result<ConversationState, TransitionError> {
        let mut sessions = self.lock();
        let current = sessions
            .get(identity)
            .map(|session| session.state)
            .unwrap_or_default();
        let next = transition(current, ConversationEvent::Admitted(kind))?;
        store_session(&mut sessions, identity, next, Some(credential));
        Ok(next)
    }

    /// Consumes the pending argument flow and returns the identity to idle.
    pub fn take_argument(&self, identity: &Identity) -> Result<PendingArgument, TransitionError> {
        let mut sessions = self.lock();
        let session = sessions.remove(identity).unwrap_or_default();
        let kind = match session.state {
            ConversationState::AwaitingArgument(kind) => kind,
            state => {
                if !state.is_idle() {
                    sessions.insert(identity.clone(), session);
                }
                return Err(TransitionError::Illegal {
                    state,
                    event: ConversationEvent::ArgumentReceived,
                });
            }
        };
        session
            .credential
            .map(|credential| PendingArgument { kind, credential })
            .ok_or(TransitionError::UnboundCredential(kind))
    }

    /// Drops any pending flow and returns the state it was in.
    pub fn reset(&self, identity: &Identity) -> ConversationState {
        self.lock()
            .remove(identity)
            .map(|session| session.state)
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, Session>> {
        // Every session write is a single insert or remove.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn store_session(
    sessions: &mut HashMap<Identity, Session>,
    identity: &Identity,
    state: ConversationState,
    credential: Option<String>,
) {
    if state.is_idle() {
        sessions.remove(identity);
    } else {
        sessions.insert(identity.clone(), Session { state, credential });
    }
}
