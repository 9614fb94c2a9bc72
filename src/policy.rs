/// The minimum accepted password length, in characters.
pub const MINIMUM_PASSWORD_LENGTH: usize = 10;

/// The maximum accepted password length, in characters.
pub const MAXIMUM_PASSWORD_LENGTH: usize = 32;

/// A password must contain characters from at least this many of the four
/// character groups: uppercase letters, lowercase letters, digits, and other
/// printable (special) characters.
pub const REQUIRED_CHARACTER_GROUPS: usize = 3;

/// Checks whether a password meets the complexity requirements for external
/// user accounts, returning one message per violated rule. An empty list
/// means the password is accepted.
///
/// The rules are fixed and stateless: the length must be between
/// `MINIMUM_PASSWORD_LENGTH` and `MAXIMUM_PASSWORD_LENGTH` inclusive, every
/// character must be printable ASCII (no diacritics, no control characters),
/// and at least `REQUIRED_CHARACTER_GROUPS` of the four character groups
/// must be present.
pub fn check_password_complexity(password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    let length = password.chars().count();
    if length < MINIMUM_PASSWORD_LENGTH {
        errors.push(format!(
            "Password is too short: it needs to be at least {MINIMUM_PASSWORD_LENGTH} characters.",
        ));
    } else if length > MAXIMUM_PASSWORD_LENGTH {
        errors.push(format!(
            "Password is too long: it can be no more than {MAXIMUM_PASSWORD_LENGTH} characters.",
        ));
    }

    // Printable ASCII only: 0x20 (space) through 0x7e (tilde).
    if !password.chars().all(|c| matches!(c, ' '..='~')) {
        errors.push(
            "Password can only contain basic characters: letters without diacritics, \
             digits, and punctuation.".to_string(),
        );
    }

    let groups = [
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| c.is_ascii() && !c.is_ascii_alphanumeric()),
    ];
    let groups_present = groups.iter().filter(|&&present| present).count();

    if groups_present < REQUIRED_CHARACTER_GROUPS {
        errors.push(format!(
            "Password needs to contain characters from at least \
             {REQUIRED_CHARACTER_GROUPS} of these groups: uppercase letters, \
             lowercase letters, digits, and other (special) characters.",
        ));
    }

    errors
}
