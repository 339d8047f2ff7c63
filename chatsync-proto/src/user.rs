//! User identity and profile.

use serde::{Deserialize, Serialize};

/// Stable identifier of a user account, as issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wraps an auth-provider user id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered user and their public profile.
///
/// Two `User` values describe the same account when their ids match; the
/// remaining fields are mutable profile data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Immutable account id.
    pub id: UserId,
    /// Name shown to other users.
    pub display_name: String,
    /// Sign-in e-mail address.
    pub email: String,
    /// Avatar URL or storage key.
    pub avatar_ref: String,
    /// Free-form profile description.
    pub bio: String,
    /// Self-declared sex tag.
    pub sex_tag: String,
}

impl User {
    /// Case-insensitive display-name search used by the people list.
    ///
    /// A missing or empty filter matches everyone.
    #[must_use]
    pub fn matches_filter(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(f) if f.is_empty() => true,
            Some(f) => self
                .display_name
                .to_lowercase()
                .contains(&f.to_lowercase()),
        }
    }
}
