//! Authorization context for acting as a workflow submitter.

use std::sync::RwLock;

use tracing::debug;

use crate::error::AppResult;
use crate::models::User;

/// Who external calls are made on behalf of.
pub trait AuthContext: Send + Sync {
    fn login_as(&self, user: &User) -> AppResult<()>;

    fn logout(&self) -> AppResult<()>;

    fn current_user(&self) -> Option<User>;
}

/// Logs out when dropped.
pub struct SessionGuard<'a> {
    auth: &'a dyn AuthContext,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.auth.logout() {
            debug!(error = %e, "Logout failed");
        }
    }
}

/// Act as `user` (if any) until the returned guard is dropped.
pub fn login_scope<'a>(auth: &'a dyn AuthContext, user: Option<&User>) -> AppResult<SessionGuard<'a>> {
    let guard = SessionGuard { auth };
    if let Some(user) = user {
        auth.login_as(user)?;
    }
    Ok(guard)
}

/// In-process session holding the current submitter.
///
/// One login slot shared by every job; jobs that log in all run on the
/// `builds` queue, whose lock keeps them from overlapping.
#[derive(Default)]
pub struct SubmitterSession {
    current: RwLock<Option<User>>,
}

impl SubmitterSession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthContext for SubmitterSession {
    fn login_as(&self, user: &User) -> AppResult<()> {
        debug!(user = %user, "Logged in");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(user.clone());
        Ok(())
    }

    fn logout(&self) -> AppResult<()> {
        if let Some(user) = self.current.write().unwrap_or_else(|e| e.into_inner()).take() {
            debug!(user = %user, "Logged out");
        }
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
