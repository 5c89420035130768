//! Verification code extraction
//!
//! Strategies are tried in order and the first hit wins:
//! 1. labeled: a keyword (`verification`, `code`, `passcode`, `pin`, `验证码`)
//!    followed on the same line by `:` or `：` and a 4-8 character token
//! 2. bare six digit number
//! 3. six character uppercase/digit run containing both a letter and a digit
//!
//! Pure-letter and pure-digit six character runs are rejected by strategy 3 so
//! product codes and words in capitals are not mistaken for codes.

use std::sync::LazyLock;

use regex::Regex;

/// One heuristic rule for locating a code in free text.
pub type Strategy = fn(&str) -> Option<String>;

/// Extraction strategies in priority order.
pub const STRATEGIES: [(&str, Strategy); 3] = [
    ("labeled", labeled),
    ("six_digits", six_digits),
    ("mixed_alphanumeric", mixed_alphanumeric),
];

static LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:验证码|code|verification|passcode|pin).*?[:：]\s*([A-Za-z0-9]{4,8})\b")
        .expect("labeled code pattern must compile")
});

static SIX_DIGITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9]{6}\b").expect("six digit pattern must compile")
});

static SIX_UPPER_ALNUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z0-9]{6}\b").expect("alphanumeric pattern must compile")
});

/// Find a verification code in message text.
///
/// Deterministic and infallible: empty or unmatched input yields `None`.
pub fn extract(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    STRATEGIES.iter().find_map(|(_, strategy)| strategy(text))
}

/// Join provider fragments (no separator) and extract from the result.
pub fn extract_fragments<S: AsRef<str>>(fragments: &[S]) -> Option<String> {
    let joined: String = fragments.iter().map(AsRef::as_ref).collect();
    extract(&joined)
}

/// Keyword, separator, then a 4-8 character token.
pub fn labeled(text: &str) -> Option<String> {
    LABELED
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// First standalone run of exactly six digits.
pub fn six_digits(text: &str) -> Option<String> {
    SIX_DIGITS.find(text).map(|m| m.as_str().to_string())
}

/// First standalone six character uppercase/digit run mixing letters and digits.
pub fn mixed_alphanumeric(text: &str) -> Option<String> {
    SIX_UPPER_ALNUM
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|candidate| {
            candidate.chars().any(|c| c.is_ascii_alphabetic())
                && candidate.chars().any(|c| c.is_ascii_digit())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_code_wins() {
        assert_eq!(
            extract("Your verification code: AB12CD").as_deref(),
            Some("AB12CD")
        );
    }

    #[test]
    fn labeled_code_accepts_fullwidth_colon_and_chinese_keyword() {
        assert_eq!(extract("您的验证码：8841").as_deref(), Some("8841"));
    }

    #[test]
    fn labeled_match_is_case_insensitive() {
        assert_eq!(extract("PASSCODE: x9y8z7").as_deref(), Some("x9y8z7"));
    }

    #[test]
    fn labeled_match_does_not_cross_lines() {
        // Keyword on one line, colon-token on the next: falls through to strategy 2
        let text = "Here is your code\nref: 12 and 654321";
        assert_eq!(labeled(text), None);
        assert_eq!(extract(text).as_deref(), Some("654321"));
    }

    #[test]
    fn bare_six_digits() {
        assert_eq!(
            extract("OTP 123456 expires soon").as_deref(),
            Some("123456")
        );
    }

    #[test]
    fn longer_digit_runs_are_not_codes() {
        assert_eq!(six_digits("call 0123456789 now"), None);
    }

    #[test]
    fn all_letter_run_rejected() {
        assert_eq!(extract("order ABCDEF shipped"), None);
    }

    #[test]
    fn mixed_run_accepted() {
        assert_eq!(
            extract("mix 1A2B3C confirmed").as_deref(),
            Some("1A2B3C")
        );
    }

    #[test]
    fn mixed_strategy_skips_rejected_candidates() {
        assert_eq!(
            mixed_alphanumeric("HELLOS then Q7W8E9").as_deref(),
            Some("Q7W8E9")
        );
    }

    #[test]
    fn empty_input_is_absent() {
        assert_eq!(extract(""), None);
        assert_eq!(extract("no digits here"), None);
    }

    #[test]
    fn extraction_is_deterministic() {
        let text = "<p>Your PIN: 5k3j9q</p> and 222333";
        let first = extract(text);
        for _ in 0..10 {
            assert_eq!(extract(text), first);
        }
    }

    #[test]
    fn fragments_are_joined_without_separator() {
        let fragments = ["<div>Code: ", "QW12", "ER</div>"];
        assert_eq!(extract_fragments(&fragments).as_deref(), Some("QW12ER"));
    }
}
