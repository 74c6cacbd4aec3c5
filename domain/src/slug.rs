//! Username slug normalization.

/// Convert arbitrary input text into a canonical username slug.
///
/// Lower-cases everything, collapses each run of characters outside
/// `[a-z0-9-]` to a single hyphen, strips leading/trailing hyphens, and
/// collapses hyphen runs. Input made up entirely of disallowed characters
/// yields an empty string. Idempotent: normalizing an already-normalized
/// slug returns it unchanged.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for c in input.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            // Hyphens and disallowed characters alike become one separator,
            // dropped at the edges.
            pending_hyphen = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_keeps_allowed_chars() {
        assert_eq!(normalize("Alice42"), "alice42");
        assert_eq!(normalize("already-normal"), "already-normal");
    }

    #[test]
    fn collapses_disallowed_runs_to_one_hyphen() {
        assert_eq!(normalize("John Doe"), "john-doe");
        assert_eq!(normalize("a!!@@b"), "a-b");
        assert_eq!(normalize("tabs\tand spaces"), "tabs-and-spaces");
    }

    #[test]
    fn strips_edge_hyphens_and_collapses_runs() {
        assert_eq!(normalize("--foo--bar--"), "foo-bar");
        assert_eq!(normalize("  leading space"), "leading-space");
        assert_eq!(normalize("trailing. "), "trailing");
    }

    #[test]
    fn garbage_only_input_is_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("!!!"), "");
        assert_eq!(normalize("---"), "");
        assert_eq!(normalize("日本語"), "");
    }

    #[test]
    fn non_ascii_letters_are_separators() {
        assert_eq!(normalize("café"), "caf");
        assert_eq!(normalize("naïve-user"), "na-ve-user");
    }

    #[test]
    fn idempotent_over_assorted_inputs() {
        for input in [
            "Alice42",
            "John Doe",
            "--foo--bar--",
            "a!!@@b",
            "café",
            "",
            "!!!",
            "x-y-z",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }
}
