use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;

pub fn require_role(user: &User, allowed: &[Role]) -> Result<Role, AppError> {
    match user.app_role() {
        Some(role) if role == Role::Admin || allowed.contains(&role) => Ok(role),
        _ => Err(AppError::Forbidden(format!(
            "This operation requires one of the roles: {}",
            allowed.iter().map(Role::to_string).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Allows the owner of a row or an admin through.
pub fn require_self_or_admin(user: &User, owner_id: &str, action: &str) -> Result<(), AppError> {
    if user.is_admin() || user.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Not authorized to {}", action)))
    }
}

/// The token subject as a uuid; every profile row is keyed by it.
pub fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not a valid user id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestUser;
    use assert_matches::assert_matches;

    #[test]
    fn admin_passes_any_role_check() {
        let admin = TestUser::admin("a@example.com").to_user();
        assert_eq!(require_role(&admin, &[Role::Physician]).unwrap(), Role::Admin);
    }

    #[test]
    fn member_cannot_act_as_physician() {
        let member = TestUser::member("m@example.com").to_user();
        assert_matches!(require_role(&member, &[Role::Physician]), Err(AppError::Forbidden(_)));
        assert_eq!(require_role(&member, &[Role::Member, Role::Physician]).unwrap(), Role::Member);
    }

    #[test]
    fn owner_check() {
        let member = TestUser::member("m@example.com").to_user();
        assert!(require_self_or_admin(&member, &member.id, "edit profile").is_ok());
        assert_matches!(
            require_self_or_admin(&member, "someone-else", "edit profile"),
            Err(AppError::Forbidden(msg)) if msg == "Not authorized to edit profile"
        );
    }

    #[test]
    fn subject_must_be_uuid() {
        let member = TestUser::member("m@example.com").to_user();
        assert_eq!(user_uuid(&member).unwrap().to_string(), member.id);

        let mut broken = member.clone();
        broken.id = "not-a-uuid".to_string();
        assert_matches!(user_uuid(&broken), Err(AppError::Auth(_)));
    }
}
