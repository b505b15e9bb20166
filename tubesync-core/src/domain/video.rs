//! Video identity helpers
//!
//! A YouTube video id is a short token of `[A-Za-z0-9_-]`. Titles that look
//! like such a token are treated as placeholders, since the backend falls back
//! to the bare id when it has no real title yet.

use url::Url;

const MIN_ID_LEN: usize = 6;
const MAX_ID_LEN: usize = 20;

/// Returns `true` if `value` looks like a bare video id token
pub fn is_video_id_like(value: &str) -> bool {
    let value = value.trim();
    (MIN_ID_LEN..=MAX_ID_LEN).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Extracts the video id from a YouTube URL
///
/// Supports `watch?v=`, `youtu.be/<id>`, and the `/shorts/`, `/live/` and
/// `/embed/` path forms. A bare id is accepted as-is.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.contains('/') && is_video_id_like(input) {
        return Some(input.to_string());
    }

    let parsed = Url::parse(input)
        .or_else(|_| Url::parse(&format!("https://{}", input)))
        .ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let candidate = if host == "youtu.be" {
        parsed.path_segments()?.next().map(str::to_string)
    } else if host.ends_with("youtube.com") || host.ends_with("youtube-nocookie.com") {
        let from_query = parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned());
        from_query.or_else(|| {
            let mut segments = parsed.path_segments()?;
            match segments.next()? {
                "shorts" | "live" | "embed" | "v" => segments.next().map(str::to_string),
                _ => None,
            }
        })
    } else {
        None
    };

    candidate.filter(|id| is_video_id_like(id))
}

/// Returns `true` if `title` carries no information beyond a video id
pub fn is_placeholder_title(title: &str) -> bool {
    let title = title.trim();
    title.is_empty() || is_video_id_like(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_watch_url() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_extract_short_forms() {
        assert_eq!(
            extract_video_id("https://youtu.be/abc123XYZ"),
            Some("abc123XYZ".to_string())
        );
        assert_eq!(
            extract_video_id("youtube.com/shorts/abc123XYZ"),
            Some("abc123XYZ".to_string())
        );
        assert_eq!(
            extract_video_id("https://m.youtube.com/live/abc123XYZ?feature=share"),
            Some("abc123XYZ".to_string())
        );
    }

    #[test]
    fn test_extract_rejects_foreign_hosts() {
        assert_eq!(extract_video_id("https://example.com/watch?v=abc123XYZ"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn test_placeholder_titles() {
        assert!(is_placeholder_title("abc123"));
        assert!(is_placeholder_title("  "));
        assert!(!is_placeholder_title("How to brew coffee"));
    }
}
