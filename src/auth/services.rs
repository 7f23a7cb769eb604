use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_\-]{3,80}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    email.len() <= 120 && EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

pub(crate) fn password_problem(password: &str) -> Option<&'static str> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        Some("Password too short")
    } else if password.len() > MAX_PASSWORD_LEN {
        Some("Password too long")
    } else {
        None
    }
}

/// Random `[A-Za-z0-9]` string drawn from the OS CSPRNG.
pub fn random_alphanumeric(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("player@ctf.local"));
        assert!(!is_valid_email("player@localhost"));
        assert!(!is_valid_email("no spaces@ctf.local"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn username_shapes() {
        assert!(is_valid_username("r00t_kit-42"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("bad name"));
        assert!(!is_valid_username("semi;colon"));
        assert!(!is_valid_username(&"x".repeat(81)));
    }

    #[test]
    fn password_bounds() {
        assert_eq!(password_problem("short"), Some("Password too short"));
        assert_eq!(password_problem(&"p".repeat(129)), Some("Password too long"));
        assert_eq!(password_problem("long-enough"), None);
    }

    #[test]
    fn random_strings_are_alphanumeric_and_distinct() {
        let a = random_alphanumeric(32);
        let b = random_alphanumeric(32);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
        assert!(random_alphanumeric(0).is_empty());
    }
}
