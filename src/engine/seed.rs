//! Default roles and rights
//!
//! `admin` may read and write every model regardless of owner.
//! `user` may read and write only its own user record, tokens and todos.
//! Seeding is idempotent: existing roles are reused and only missing
//! rights are added.

use serde::Serialize;

use crate::engine::error::{AuthError, AuthResult};
use crate::engine::identity::IdentityStore;
use crate::engine::rbac::policy::{Model, NewRight, Role};
use crate::engine::rbac::RightsRegistry;

pub const ADMIN_ROLE: &str = "admin";
pub const USER_ROLE: &str = "user";

#[derive(Debug, Default, Serialize)]
pub struct SeedReport {
    pub roles_created: Vec<String>,
    pub rights_created: usize,
    pub admin_user: Option<String>,
}

fn admin_rights() -> Vec<NewRight> {
    Model::ALL
        .into_iter()
        .map(|model| NewRight::new(model).read_write().any_owner())
        .collect()
}

fn user_rights() -> Vec<NewRight> {
    [Model::User, Model::Todo, Model::Token]
        .into_iter()
        .map(|model| NewRight::new(model).read_write())
        .collect()
}

pub fn seed_defaults(registry: &RightsRegistry) -> AuthResult<SeedReport> {
    let mut report = SeedReport::default();
    for (name, rights) in [(ADMIN_ROLE, admin_rights()), (USER_ROLE, user_rights())] {
        let role = ensure_role(registry, name, &mut report)?;
        let existing = registry.rights_for_role(role.id)?;
        for wanted in rights {
            let present = existing.iter().any(|r| {
                r.model == wanted.model
                    && r.read == wanted.read
                    && r.write == wanted.write
                    && r.only_own == wanted.only_own
            });
            if !present {
                registry.create_right_for_role(role.id, &wanted)?;
                report.rights_created += 1;
            }
        }
    }
    tracing::info!(
        roles = report.roles_created.len(),
        rights = report.rights_created,
        "seeded default roles"
    );
    Ok(report)
}

/// Seeds the default roles and makes `name` an administrator, creating the user if needed.
pub fn seed_admin(
    registry: &RightsRegistry,
    identity: &IdentityStore,
    name: &str,
    password: &str,
) -> AuthResult<SeedReport> {
    let mut report = seed_defaults(registry)?;
    let admin_role = registry.find_role(ADMIN_ROLE)?;
    let user = match identity.find_by_name(name) {
        Ok(user) => user,
        Err(AuthError::NotFound(_)) => identity.create_user(name, password)?,
        Err(e) => return Err(e),
    };
    identity.assign_role(user.id, admin_role.id)?;
    report.admin_user = Some(user.name);
    Ok(report)
}

fn ensure_role(registry: &RightsRegistry, name: &str, report: &mut SeedReport) -> AuthResult<Role> {
    match registry.find_role(name) {
        Ok(role) => Ok(role),
        Err(AuthError::NotFound(_)) => {
            let role = registry.create_role(name)?;
            report.roles_created.push(role.name.clone());
            Ok(role)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::database::Database;
    use crate::engine::rbac::{Action, Enforcer};

    #[test]
    fn test_seed_is_idempotent() {
        let registry = RightsRegistry::new(Database::in_memory().unwrap());
        let first = seed_defaults(&registry).unwrap();
        assert_eq!(first.roles_created, vec![ADMIN_ROLE.to_string(), USER_ROLE.to_string()]);
        assert_eq!(first.rights_created, 8);

        let second = seed_defaults(&registry).unwrap();
        assert!(second.roles_created.is_empty());
        assert_eq!(second.rights_created, 0);
        assert_eq!(registry.list_rights().unwrap().len(), 8);
    }

    #[test]
    fn test_seed_admin_grants_everything() {
        let db = Database::in_memory().unwrap();
        let registry = RightsRegistry::new(db.clone());
        let identity = IdentityStore::new(db);
        let report = seed_admin(&registry, &identity, "root", "pw").unwrap();
        assert_eq!(report.admin_user.as_deref(), Some("root"));

        let admin = identity.find_by_name("root").unwrap();
        let enforcer = Enforcer::new(&registry);
        for model in Model::ALL {
            assert!(enforcer.authorize(&admin, model, Some(admin.id + 1), Action::Write).unwrap().is_allowed());
            assert!(enforcer.authorize(&admin, model, None, Action::Read).unwrap().is_allowed());
        }
    }
}
