//! Flag matching.
//!
//! A challenge accepts a submission when any of its configured flags matches.
//! Static flags compare the whole string; regex flags must match the whole
//! submission as well, so patterns are anchored before compiling.

use regex::RegexBuilder;
use tracing::warn;

use super::repo_types::Flag;

pub const KIND_STATIC: &str = "static";
pub const KIND_REGEX: &str = "regex";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Static,
    Regex,
}

impl FlagKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            KIND_STATIC => Some(FlagKind::Static),
            KIND_REGEX => Some(FlagKind::Regex),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlagKind::Static => KIND_STATIC,
            FlagKind::Regex => KIND_REGEX,
        }
    }
}

/// Compiles an anchored pattern; `None` for invalid regex.
pub fn compile(pattern: &str, case_sensitive: bool) -> Option<regex::Regex> {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(!case_sensitive)
        .size_limit(1 << 20)
        .build()
        .ok()
}

pub fn flag_matches(flag: &Flag, submitted: &str) -> bool {
    match FlagKind::parse(&flag.kind) {
        Some(FlagKind::Static) if flag.case_sensitive => flag.content == submitted,
        Some(FlagKind::Static) => flag.content.to_lowercase() == submitted.to_lowercase(),
        Some(FlagKind::Regex) => match compile(&flag.content, flag.case_sensitive) {
            Some(re) => re.is_match(submitted),
            None => {
                warn!(flag_id = %flag.id, "invalid flag regex never matches");
                false
            }
        },
        None => {
            warn!(flag_id = %flag.id, kind = %flag.kind, "unknown flag kind");
            false
        }
    }
}

pub fn check_submission(flags: &[Flag], submitted: &str) -> bool {
    flags.iter().any(|f| flag_matches(f, submitted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn flag(content: &str, kind: FlagKind, case_sensitive: bool) -> Flag {
        Flag {
            id: Uuid::new_v4(),
            challenge_id: Uuid::nil(),
            content: content.into(),
            kind: kind.as_str().into(),
            case_sensitive,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn static_flags_respect_case_option() {
        let strict = flag("flag{Hello}", FlagKind::Static, true);
        assert!(flag_matches(&strict, "flag{Hello}"));
        assert!(!flag_matches(&strict, "flag{hello}"));
        assert!(!flag_matches(&strict, "flag{Hello} "));

        let loose = flag("flag{Hello}", FlagKind::Static, false);
        assert!(flag_matches(&loose, "FLAG{HELLO}"));
    }

    #[test]
    fn regex_flags_match_whole_submission() {
        let re = flag(r"flag\{[0-9a-f]{4}\}", FlagKind::Regex, true);
        assert!(flag_matches(&re, "flag{beef}"));
        assert!(!flag_matches(&re, "flag{BEEF}"));
        assert!(!flag_matches(&re, "xx flag{beef} xx"));

        let re = flag(r"flag\{[0-9a-f]{4}\}", FlagKind::Regex, false);
        assert!(flag_matches(&re, "FLAG{BEEF}"));
    }

    #[test]
    fn alternation_is_anchored_as_a_group() {
        let re = flag("a|b", FlagKind::Regex, true);
        assert!(flag_matches(&re, "a"));
        assert!(!flag_matches(&re, "ab"));
    }

    #[test]
    fn invalid_regex_and_unknown_kind_never_match() {
        let broken = flag("flag{(", FlagKind::Regex, true);
        assert!(!flag_matches(&broken, "flag{("));

        let mut odd = flag("x", FlagKind::Static, true);
        odd.kind = "fuzzy".into();
        assert!(!flag_matches(&odd, "x"));
    }

    #[test]
    fn any_flag_accepts() {
        let flags = vec![
            flag("flag{one}", FlagKind::Static, true),
            flag("flag\\{two+\\}", FlagKind::Regex, true),
        ];
        assert!(check_submission(&flags, "flag{twooo}"));
        assert!(check_submission(&flags, "flag{one}"));
        assert!(!check_submission(&flags, "flag{three}"));
        assert!(!check_submission(&[], "flag{one}"));
    }
}
