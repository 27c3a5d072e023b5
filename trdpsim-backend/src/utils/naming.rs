//! Identifier slugs for stored documents and run directories.

/// Reduce a name to a lowercase slug.
///
/// ASCII letters and digits are lowercased, `-` and `_` are kept, whitespace
/// becomes `-` and everything else is dropped. An empty result yields
/// `fallback`.
pub fn sanitize_id(raw: &str, fallback: &str) -> String {
    let slug: String = raw
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect();

    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// First of `base`, `base-2`, `base-3`, ... not rejected by `taken`
pub fn unique_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut suffix = 2u32;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
