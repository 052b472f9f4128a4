use serde_json::Value;

use super::types::{Membership, UnknownTier, UserInfo};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("missing ext.auth.user in handshake")]
    MissingUser,

    #[error("empty user name")]
    EmptyUser,

    #[error(transparent)]
    UnknownTier(#[from] UnknownTier),
}

/// Authenticates a handshake from its `ext` field:
/// `{"auth": {"user": "name[/tier]"}}`. The tier defaults to bronze.
pub fn authenticate(ext: Option<&Value>) -> Result<UserInfo, AuthError> {
    let user = ext
        .and_then(|ext| ext.get("auth"))
        .and_then(|auth| auth.get("user"))
        .and_then(Value::as_str)
        .ok_or(AuthError::MissingUser)?;

    let mut parts = user.split('/');
    let user_id = parts.next().unwrap_or_default();
    if user_id.is_empty() {
        return Err(AuthError::EmptyUser);
    }

    let membership = match parts.next() {
        Some(tier) => tier.parse::<Membership>()?,
        None => Membership::default(),
    };

    Ok(UserInfo::new(user_id, membership))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_tier_is_bronze() {
        let ext = json!({"auth": {"user": "alice"}});
        let user = authenticate(Some(&ext)).unwrap();
        assert_eq!(user, UserInfo::new("alice", Membership::Bronze));
    }

    #[test]
    fn test_explicit_tier_any_case() {
        let ext = json!({"auth": {"user": "bob/gold"}});
        assert_eq!(authenticate(Some(&ext)).unwrap().membership, Membership::Gold);
    }

    #[test]
    fn test_unknown_tier_fails() {
        let ext = json!({"auth": {"user": "carol/diamond"}});
        assert!(matches!(
            authenticate(Some(&ext)),
            Err(AuthError::UnknownTier(_))
        ));
    }

    #[test]
    fn test_missing_auth_fails() {
        assert_eq!(authenticate(None), Err(AuthError::MissingUser));
        assert_eq!(
            authenticate(Some(&json!({"auth": {}}))),
            Err(AuthError::MissingUser)
        );
        assert_eq!(
            authenticate(Some(&json!({"auth": {"user": "/gold"}}))),
            Err(AuthError::EmptyUser)
        );
    }
}
