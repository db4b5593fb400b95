use courseboard_auth::CallerId;

/// Caller context for a request.
///
/// Present on every request that passed the auth middleware; admin handlers
/// can rely on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    caller: CallerId,
}

impl CallerContext {
    pub fn new(caller: CallerId) -> Self {
        Self { caller }
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }
}
