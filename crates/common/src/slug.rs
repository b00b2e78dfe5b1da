use rand::Rng;

const SUFFIX_LEN: usize = 8;

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed into `-`.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Width of the slug columns.
pub const SLUG_MAX_LEN: usize = 100;

/// Slug with a random suffix so two records with the same name get distinct
/// slugs. The base is cut so the whole slug fits in `max_len`.
pub fn get_slug(input: &str, max_len: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    let mut base = slugify(input);
    base.truncate(max_len.saturating_sub(SUFFIX_LEN + 1));
    let base = base.trim_end_matches('-');
    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  My Web  Monitor!! "), "my-web-monitor");
        assert_eq!(slugify("api/v1_health"), "api-v1-health");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn get_slug_appends_suffix() {
        let s = get_slug("Home Page", SLUG_MAX_LEN);
        assert!(s.starts_with("home-page-"));
        assert_eq!(s.len(), "home-page-".len() + SUFFIX_LEN);
        assert_ne!(get_slug("Home Page", SLUG_MAX_LEN), s);
    }

    #[test]
    fn get_slug_of_symbols_is_suffix_only() {
        assert_eq!(get_slug("!!!", SLUG_MAX_LEN).len(), SUFFIX_LEN);
    }

    #[test]
    fn long_names_fit_the_slug_column() {
        let name = "a".repeat(100);
        let s = get_slug(&name, SLUG_MAX_LEN);
        assert_eq!(s.len(), SLUG_MAX_LEN);
        assert!(s.starts_with(&"a".repeat(91)));

        // the cut never leaves a dangling separator
        let name = format!("{} b", "a".repeat(90));
        let s = get_slug(&name, SLUG_MAX_LEN);
        assert!(!s.contains("--"), "{s}");
        assert!(s.len() <= SLUG_MAX_LEN);
    }
}
