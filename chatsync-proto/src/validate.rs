//! Input validation for registration, profiles and messages.
//!
//! Validation failures are surfaced to the caller immediately and never
//! retried.

/// Error returned when user input fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message content is empty.
    #[error("message content is empty")]
    Empty,
    /// Message content exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
    /// A required field was left blank.
    #[error("required field is missing: {0}")]
    MissingField(&'static str),
    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,
    /// The e-mail address is not well formed.
    #[error("invalid e-mail address")]
    InvalidEmail,
    /// No profile photo was chosen.
    #[error("no profile photo selected")]
    PhotoMissing,
    /// A user tried to open a chat with themselves.
    #[error("cannot start a chat with yourself")]
    SelfChat,
}

impl ValidationError {
    /// Text suitable for showing to the user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Empty => "Message is empty",
            Self::TooLarge { .. } => "Message is too long",
            Self::MissingField(_) => "Fill in all fields",
            Self::PasswordMismatch => "Passwords do not match",
            Self::InvalidEmail => "E-mail format is not valid",
            Self::PhotoMissing => "Choose a photo",
            Self::SelfChat => "You cannot message yourself",
        }
    }
}

/// Returns the trimmed value of a required field.
fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(name)),
    }
}

/// Loose `local@domain.tld` check: one `@`, non-empty local part, and a
/// dotted domain whose last label has at least two characters.
#[must_use]
pub fn is_simple_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.chars().count() >= 2
}

/// Validates a sign-up form.
///
/// # Errors
///
/// [`ValidationError::MissingField`] if any field is blank,
/// [`ValidationError::PasswordMismatch`] if the passwords differ, and
/// [`ValidationError::InvalidEmail`] for a malformed address.
pub fn validate_registration(
    email: Option<&str>,
    password: Option<&str>,
    confirm_password: Option<&str>,
) -> Result<(), ValidationError> {
    let email = required(email, "email")?;
    let password = required(password, "password")?;
    let confirm = required(confirm_password, "confirm_password")?;

    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    if !is_simple_email(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// Validates the profile fields collected on the setup screen.
///
/// # Errors
///
/// [`ValidationError::MissingField`] naming the first blank field.
pub fn validate_profile(
    display_name: Option<&str>,
    bio: Option<&str>,
    sex_tag: Option<&str>,
) -> Result<(), ValidationError> {
    required(display_name, "display_name")?;
    required(bio, "bio")?;
    required(sex_tag, "sex_tag")?;
    Ok(())
}
