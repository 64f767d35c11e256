//! Lookup-name ordering for person records.

/// True for Chinese language tags (`zh`, `zh-Hans`, `zh-TW`, ...).
pub fn is_chinese(language: &str) -> bool {
    let tag = language.trim();
    tag.eq_ignore_ascii_case("zh")
        || tag
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("zh-") || prefix.eq_ignore_ascii_case("zh_"))
}

/// Full-name strings to try, in order, when searching for a person.
///
/// - one part missing: the other part alone
/// - Chinese: family + given, no separator
/// - otherwise: "given family", then "family given"
///
/// Callers must supply at least one name part.
pub fn order_names(family: Option<&str>, given: Option<&str>, language: &str) -> Vec<String> {
    let family = family.map(str::trim).filter(|s| !s.is_empty());
    let given = given.map(str::trim).filter(|s| !s.is_empty());

    match (family, given) {
        (Some(family), Some(given)) => {
            if is_chinese(language) {
                vec![format!("{family}{given}")]
            } else {
                vec![format!("{given} {family}"), format!("{family} {given}")]
            }
        }
        (Some(only), None) | (None, Some(only)) => vec![only.to_string()],
        (None, None) => {
            debug_assert!(false, "order_names called without any name part");
            Vec::new()
        }
    }
}
