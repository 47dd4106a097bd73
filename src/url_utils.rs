use url::Url;

/// Normalize a user-submitted media URL.
///
/// Behavior:
/// - Trims surrounding whitespace
/// - Accepts only `http`/`https` (anything else is not downloadable media)
/// - Strips fragments (`#...`), which are never meaningful to the service
///
/// Returns `None` for anything that does not parse as an http(s) URL; the
/// caller decides how to surface that.
pub fn normalize_media_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = Url::parse(trimmed).ok()?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }

    url.set_fragment(None);

    Some(url.to_string())
}
