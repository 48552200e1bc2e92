use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of an authenticated user session, as the surrounding proxy tracks
/// it between requests. The authorization core only writes the `nonce`
/// field (during the OAuth callback); persistence and encoding belong to
/// the session-store layer.
///
/// MessagePack tags are kept short so packed sessions stay small.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// OIDC nonce carried over from the CSRF token on a successful
    /// callback; later checked against the ID token's `nonce` claim.
    #[serde(
        rename = "no",
        default,
        with = "serde_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub nonce: Option<Vec<u8>>,

    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(rename = "pu", default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(rename = "ca", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(rename = "eo", default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn is_expired(&self) -> bool {
        matches!(self.expires_on, Some(expires) if expires < Utc::now())
    }

    /// Age of the session, zero when `created_at` was never stamped.
    pub fn age(&self) -> chrono::Duration {
        match self.created_at {
            Some(created) => Utc::now() - created,
            None => chrono::Duration::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_default_session_is_not_expired() {
        assert!(!SessionState::default().is_expired());
    }

    #[test]
    fn test_expiry() {
        let mut session = SessionState {
            expires_on: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        };
        assert!(!session.is_expired());

        session.expires_on = Some(Utc::now() - Duration::seconds(1));
        assert!(session.is_expired());
    }

    #[test]
    fn test_age() {
        let session = SessionState {
            created_at: Some(Utc::now() - Duration::minutes(5)),
            ..Default::default()
        };
        assert!(session.age() >= Duration::minutes(5));
        assert_eq!(SessionState::default().age(), Duration::zero());
    }

    #[test]
    fn test_session_packs_without_empty_fields() {
        let session = SessionState {
            nonce: Some(vec![1, 2, 3]),
            email: Some("user@example.com".into()),
            ..Default::default()
        };
        let packed = rmp_serde::to_vec_named(&session).unwrap();
        let restored: SessionState = rmp_serde::from_slice(&packed).unwrap();
        assert_eq!(session, restored);
    }
}
