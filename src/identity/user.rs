//! User record, field validation and the public entity shape.

use serde::{Deserialize, Serialize};

use crate::auth::Level;
use crate::credential::CredentialHash;
use crate::error::Violation;
use crate::uid::Uid;

/// A stored user account. The identifier is immutable after creation; the
/// credential is kept only as an opaque digest.
#[derive(Debug, Clone)]
pub struct User {
    pub(crate) uid: Uid,
    pub(crate) name: String,
    pub(crate) login: String,
    pub(crate) credential: CredentialHash,
    pub(crate) level: Level,
}

impl User {
    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn entity(&self) -> UserEntity {
        UserEntity {
            uuid: self.uid,
            name: self.name.clone(),
            login: self.login.clone(),
            level: self.level,
        }
    }
}

/// What the outside world sees of a user. The credential digest never
/// crosses this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntity {
    pub uuid: Uid,
    pub name: String,
    pub login: String,
    pub level: Level,
}

/// One page of a listing, in storage order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPage {
    pub offset: usize,
    pub records: Vec<UserEntity>,
    pub total_records: usize,
}

/// Present-or-absent fields for a partial update. Absent fields are left
/// untouched; present ones are validated exactly as on creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub login: Option<String>,
    pub credential: Option<String>,
}

pub(crate) fn validate_name(name: &str) -> Result<(), Violation> {
    if name.is_empty() {
        return Err(Violation::new("name-empty", "name cannot be empty"));
    }
    Ok(())
}

pub(crate) fn validate_login(login: &str) -> Result<(), Violation> {
    if login.is_empty() {
        return Err(Violation::new("login-empty", "login cannot be empty"));
    }
    Ok(())
}

/// Credential policy: 8 to 64 characters, no leading or trailing
/// whitespace, no control characters. UTF-8 validity is already guaranteed
/// by `&str`.
pub(crate) fn validate_credential(credential: &str) -> Result<(), Violation> {
    let length = credential.chars().count();
    if length < 8 {
        return Err(Violation::new(
            "credential-short",
            "credential must be at least 8 characters long",
        ));
    }
    if length > 64 {
        return Err(Violation::new(
            "credential-long",
            "credential must be a maximum of 64 characters long",
        ));
    }

    let edges = [credential.chars().next(), credential.chars().next_back()];
    if edges.iter().flatten().any(|c| c.is_whitespace()) {
        return Err(Violation::new(
            "credential-edge-whitespace",
            "credential must not begin or end with whitespace",
        ));
    }

    if credential.chars().any(char::is_control) {
        return Err(Violation::new(
            "credential-illegal-chars",
            "credential must not contain control characters",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_login_must_be_non_empty() {
        assert!(validate_name("Alan Lima").is_ok());
        assert_eq!(validate_name("").unwrap_err().code, "name-empty");
        assert!(validate_login("alan-b-lima").is_ok());
        assert_eq!(validate_login("").unwrap_err().code, "login-empty");
    }

    #[test]
    fn credential_length_bounds() {
        assert_eq!(validate_credential("1234567").unwrap_err().code, "credential-short");
        assert!(validate_credential("12345678").is_ok());
        let long: String = std::iter::repeat('a').take(65).collect();
        assert_eq!(validate_credential(&long).unwrap_err().code, "credential-long");
    }

    #[test]
    fn credential_edge_whitespace_and_controls() {
        assert_eq!(
            validate_credential(" 12345678").unwrap_err().code,
            "credential-edge-whitespace"
        );
        assert_eq!(
            validate_credential("12345678\t").unwrap_err().code,
            "credential-edge-whitespace"
        );
        assert_eq!(
            validate_credential("1234\u{7}5678").unwrap_err().code,
            "credential-illegal-chars"
        );
        // interior spaces are fine
        assert!(validate_credential("pass word 123").is_ok());
    }

    #[test]
    fn length_is_counted_in_characters() {
        // 8 multi-byte characters pass even though they exceed 8 bytes
        assert!(validate_credential("éééééééé").is_ok());
    }
}
