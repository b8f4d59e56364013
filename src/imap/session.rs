//! The IMAP session state machine.
//!
//! States are not enum values on their own; a state is characterized by
//! *which handler interface the session currently dispatches to*. The
//! session keeps exactly one of those handlers alive at a time, wrapped in
//! [`CurrentHandler`], and swaps it out whenever a staged-handler callback
//! terminates with a new one (Design Notes, "Dynamic dispatch").

use crate::imap::handler::{AuthenticatedHandler, NotAuthenticatedHandler, SelectedHandler};
use std::sync::Arc;

/// Which protocol state the session is in, derived from [`CurrentHandler`]
/// rather than tracked independently — there is exactly one handler kind
/// per state, so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapState {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

/// The session's currently bound application handler. `Logout` carries no
/// handler; once reached the only remaining action is closing the
/// transport.
pub enum CurrentHandler {
    NotAuthenticated(Arc<dyn NotAuthenticatedHandler>),
    Authenticated(Arc<dyn AuthenticatedHandler>),
    Selected(Arc<dyn SelectedHandler>, String),
    Logout,
}

impl CurrentHandler {
    pub fn state(&self) -> ImapState {
        match self {
            CurrentHandler::NotAuthenticated(_) => ImapState::NotAuthenticated,
            CurrentHandler::Authenticated(_) => ImapState::Authenticated,
            CurrentHandler::Selected(..) => ImapState::Selected,
            CurrentHandler::Logout => ImapState::Logout,
        }
    }
}

/// Per-connection state. `principal` is set once NOT_AUTH -> AUTH succeeds
/// and never cleared while the session is alive.
pub struct ImapSession {
    pub handler: CurrentHandler,
    pub principal: Option<String>,
    pub secure: bool,
    pub idling: bool,
    /// Extensions enabled for this deployment (advertised in CAPABILITY and
    /// gating whether the corresponding commands are dispatched at all).
    pub enabled_extensions: EnabledExtensions,
}

#[derive(Debug, Clone, Copy)]
pub struct EnabledExtensions {
    pub idle: bool,
    pub namespace: bool,
    pub quota: bool,
    pub r#move: bool,
}

impl Default for EnabledExtensions {
    fn default() -> Self {
        EnabledExtensions {
            idle: true,
            namespace: true,
            quota: true,
            r#move: true,
        }
    }
}

impl ImapSession {
    pub fn new(initial: CurrentHandler, secure: bool) -> Self {
        ImapSession {
            handler: initial,
            principal: None,
            secure,
            idling: false,
            enabled_extensions: EnabledExtensions::default(),
        }
    }

    pub fn state(&self) -> ImapState {
        self.handler.state()
    }

    pub fn selected_mailbox(&self) -> Option<&str> {
        match &self.handler {
            CurrentHandler::Selected(_, mailbox) => Some(mailbox.as_str()),
            _ => None,
        }
    }
}
