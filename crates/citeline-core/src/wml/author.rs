use once_cell::sync::Lazy;
use regex::Regex;

/// Extracted author token: the matchable surname plus the year, when the
/// source text carried one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorToken {
    pub surname: String,
    pub year: Option<String>,
}

const NAME: &str = r"([A-Z][A-Za-z'\x{2019}\-]{1,39})";

// Checked in specificity order so that a conjunction citation such as
// "Marcus & Davis, 2019" is not mis-parsed by the simpler single-author
// pattern. All quantifiers are bounded.
static CONJUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"{NAME}\s*(?:&|and)\s*[A-Z][A-Za-z'\x{{2019}}\-]{{1,39}},?\s*\(?\s*(\d{{4}})"
    ))
    .expect("conjunction pattern")
});

static ET_AL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{NAME}\s+et\s+al\.?,?\s*\(?\s*(\d{{4}})")).expect("et-al pattern")
});

static SIMPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{NAME},\s*\(?\s*(\d{{4}})")).expect("simple pattern"));

static NARRATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{NAME}\s*\(\s*(\d{{4}})\s*\)")).expect("narrative pattern"));

// Full-reference form: leading surname (optionally after a number marker)
// followed by initials, with the year somewhere later or absent.
static FULL_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\s*(?:\[?\d{{1,4}}[\]\.]?\s*)?{NAME},")).expect("full-reference pattern")
});

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("year pattern"));

/// Extract a matchable author token from an inline citation, a narrative
/// citation, or a full reference rendering. Returns `None` rather than a
/// degenerate token: a name shorter than 2 characters would match at every
/// word boundary and corrupt unrelated text.
pub fn extract_author_token(text: &str) -> Option<AuthorToken> {
    for pattern in [&*CONJUNCTION, &*ET_AL, &*SIMPLE, &*NARRATIVE] {
        if let Some(caps) = pattern.captures(text) {
            let surname = caps.get(1)?.as_str();
            if surname.len() < 2 {
                continue;
            }
            return Some(AuthorToken {
                surname: surname.to_string(),
                year: caps.get(2).map(|m| m.as_str().to_string()),
            });
        }
    }

    if let Some(caps) = FULL_REFERENCE.captures(text) {
        let surname = caps.get(1)?.as_str();
        if surname.len() >= 2 {
            return Some(AuthorToken {
                surname: surname.to_string(),
                year: YEAR
                    .captures(text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string()),
            });
        }
    }

    None
}

/// First four-digit year in a text, if any.
pub fn extract_year(text: &str) -> Option<String> {
    YEAR.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Word-boundary containment check. Names shorter than 2 characters are
/// rejected outright.
pub fn contains_word(haystack: &str, name: &str) -> bool {
    if name.len() < 2 {
        return false;
    }
    let mut search_from = 0;
    while let Some(found) = haystack[search_from..].find(name) {
        let start = search_from + found;
        let end = start + name.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        if before_ok && after_ok {
            return true;
        }
        search_from = start + name.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjunction_beats_simple_pattern() {
        let token = extract_author_token("Marcus & Davis, 2019").unwrap();
        assert_eq!(token.surname, "Marcus");
        assert_eq!(token.year.as_deref(), Some("2019"));
    }

    #[test]
    fn et_al_form() {
        let token = extract_author_token("Smith et al., 2021").unwrap();
        assert_eq!(token.surname, "Smith");
        assert_eq!(token.year.as_deref(), Some("2021"));
    }

    #[test]
    fn simple_author_year() {
        let token = extract_author_token("(Johnson, 2018)").unwrap();
        assert_eq!(token.surname, "Johnson");
        assert_eq!(token.year.as_deref(), Some("2018"));
    }

    #[test]
    fn narrative_form() {
        let token = extract_author_token("as Chen (2020) demonstrated").unwrap();
        assert_eq!(token.surname, "Chen");
        assert_eq!(token.year.as_deref(), Some("2020"));
    }

    #[test]
    fn full_reference_form() {
        let token = extract_author_token("3. Nakamura, T., & Ito, K. (2017). Paper title.").unwrap();
        assert_eq!(token.surname, "Nakamura");
        assert_eq!(token.year.as_deref(), Some("2017"));
    }

    #[test]
    fn degenerate_short_name_rejected() {
        assert_eq!(extract_author_token("A, 2019"), None);
    }

    #[test]
    fn no_author_no_token() {
        assert_eq!(extract_author_token("see section 4 for details"), None);
    }

    #[test]
    fn contains_word_respects_boundaries() {
        assert!(contains_word("cited by Smith, J. in 2019", "Smith"));
        assert!(!contains_word("Blacksmith techniques", "smith"));
        assert!(!contains_word("Smithson et al.", "Smith"));
        assert!(!contains_word("anything", "X"));
    }
}
