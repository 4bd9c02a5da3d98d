//! RBAC Enforcement Layer
//!
//! The decision itself is a pure function over a [`RightSet`] snapshot.
//! [`Enforcer`] fetches that snapshot from the registry once per decision.

use super::policy::{Action, Decision, Model, RightSet, UserId};
use super::registry::RightsRegistry;
use crate::engine::error::{AuthError, AuthResult};
use crate::engine::identity::User;

/// Everything needed to decide for one user: who they are and what they hold.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub rights: RightSet,
}

impl AuthContext {
    pub fn new(user_id: UserId, rights: RightSet) -> Self {
        Self { user_id, rights }
    }

    /// Decide whether this user may perform `action` on an instance of
    /// `model` owned by `owner` (`None` for objects without an owner, or
    /// for model-level checks).
    ///
    /// Any single qualifying right allows. An only-own right never covers an
    /// object owned by someone else, nor an unowned one.
    pub fn authorize(&self, model: Model, owner: Option<UserId>, action: Action) -> Decision {
        let is_owner = owner == Some(self.user_id);

        self.rights
            .for_model(model)
            .filter(|right| right.permits(action))
            .find(|right| is_owner || !right.only_own)
            .map(|right| Decision::Allow { right_id: right.id })
            .unwrap_or(Decision::Deny)
    }
}

/// Store-backed entry point used by request handlers
pub struct Enforcer<'a> {
    registry: &'a RightsRegistry,
}

impl<'a> Enforcer<'a> {
    pub fn new(registry: &'a RightsRegistry) -> Self {
        Self { registry }
    }

    pub fn context_for(&self, user: &User) -> AuthResult<AuthContext> {
        let rights = self.registry.rights_for_user(user.id)?;
        Ok(AuthContext::new(user.id, rights))
    }

    pub fn authorize(
        &self,
        user: &User,
        model: Model,
        owner: Option<UserId>,
        action: Action,
    ) -> AuthResult<Decision> {
        let decision = self.context_for(user)?.authorize(model, owner, action);
        tracing::debug!(
            user_id = user.id,
            %model,
            ?owner,
            %action,
            allowed = decision.is_allowed(),
            "authorization decision"
        );
        Ok(decision)
    }

    /// Like [`Enforcer::authorize`] but maps Deny to [`AuthError::Forbidden`].
    pub fn require(
        &self,
        user: &User,
        model: Model,
        owner: Option<UserId>,
        action: Action,
    ) -> AuthResult<()> {
        match self.authorize(user, model, owner, action)? {
            Decision::Allow { .. } => Ok(()),
            Decision::Deny => Err(AuthError::Forbidden),
        }
    }
}
