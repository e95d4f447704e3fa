use std::fmt;

/// Lifecycle of a [`Session`](crate::session::Session).
///
/// ```text
/// Uninitialized -> Hosting -> ActiveHost
/// Uninitialized -> Joining -> ActiveClient
/// Hosting -> Error            (bind failure, cleared by reset)
/// any -> Uninitialized        (reset)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Hosting,
    Joining,
    ActiveHost,
    ActiveClient,
    Error,
}

impl SessionState {
    /// Background loops are running
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::ActiveHost | SessionState::ActiveClient)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Hosting => "hosting",
            SessionState::Joining => "joining",
            SessionState::ActiveHost => "active-host",
            SessionState::ActiveClient => "active-client",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}
