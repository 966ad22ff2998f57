//! The relay's retry contract as an explicit state machine.
//!
//! ```text
//! Attempting --non-401--> Succeeded
//! Attempting --401------> Refreshing --ok-----> Retrying --non-401--> Succeeded
//!                                     --failed-> RedirectedToLogin
//!                                                Retrying --401-----> RedirectedToLogin
//! ```
//!
//! There is exactly one path through `Refreshing`, so a request costs at most one refresh
//! call and two forwarded calls.

use http::StatusCode;

use crate::backend::{ProxyAttempt, RefreshError, TokenPair};

#[derive(Debug)]
pub enum ProxyState {
    /// First forward, with the cookie-resident access token.
    Attempting,
    /// The backend answered 401; a new token pair is being minted.
    Refreshing,
    /// Second and last forward, with the freshly minted token.
    Retrying { access_token: String },
    Succeeded(ProxyAttempt),
    RedirectedToLogin,
}

/// What happened while the orchestrator was in the current state.
#[derive(Debug)]
pub enum ProxyEvent {
    Forwarded(ProxyAttempt),
    Refreshed(TokenPair),
    RefreshFailed(RefreshError),
}

/// The I/O a non-terminal state asks the orchestrator to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyAction {
    Forward { access_override: Option<String> },
    Refresh,
}

impl ProxyState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProxyState::Succeeded(_) | ProxyState::RedirectedToLogin)
    }

    /// `None` once the state is terminal.
    pub fn action(&self) -> Option<ProxyAction> {
        match self {
            ProxyState::Attempting => Some(ProxyAction::Forward {
                access_override: None,
            }),
            ProxyState::Refreshing => Some(ProxyAction::Refresh),
            ProxyState::Retrying { access_token } => Some(ProxyAction::Forward {
                access_override: Some(access_token.clone()),
            }),
            ProxyState::Succeeded(_) | ProxyState::RedirectedToLogin => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProxyState::Attempting => "attempting",
            ProxyState::Refreshing => "refreshing",
            ProxyState::Retrying { .. } => "retrying",
            ProxyState::Succeeded(_) => "succeeded",
            ProxyState::RedirectedToLogin => "redirected_to_login",
        }
    }
}

/// Computes the next state. Events that do not belong to the current state leave it unchanged.
pub fn transition(state: ProxyState, event: ProxyEvent) -> ProxyState {
    match (state, event) {
        (ProxyState::Attempting, ProxyEvent::Forwarded(attempt)) => {
            if attempt.status == StatusCode::UNAUTHORIZED {
                ProxyState::Refreshing
            } else {
                ProxyState::Succeeded(attempt)
            }
        }
        (ProxyState::Refreshing, ProxyEvent::Refreshed(pair)) => ProxyState::Retrying {
            access_token: pair.access,
        },
        (ProxyState::Refreshing, ProxyEvent::RefreshFailed(_)) => ProxyState::RedirectedToLogin,
        (ProxyState::Retrying { .. }, ProxyEvent::Forwarded(attempt)) => {
            if attempt.status == StatusCode::UNAUTHORIZED {
                ProxyState::RedirectedToLogin
            } else {
                ProxyState::Succeeded(attempt)
            }
        }
        (state, _) => state,
    }
}
