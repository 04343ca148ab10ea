use url::Url;

/// Validate if a string is a valid URL
pub fn is_valid_url(url_str: &str) -> bool {
    Url::parse(url_str).is_ok()
}

/// Check if a URL is a valid feed URL (RSS/Atom)
pub fn is_valid_feed_url(url: &str) -> bool {
    is_valid_url(url) && (url.starts_with("http://") || url.starts_with("https://"))
}

/// Validate a feed URL and return a Result
pub fn validate_feed_url(url: &str) -> Result<(), String> {
    if url.trim().is_empty() {
        return Err("Feed URL cannot be empty".to_string());
    }

    if !is_valid_feed_url(url) {
        return Err("Invalid feed URL format".to_string());
    }

    Ok(())
}

/// Clean and validate a filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    // Remove or replace characters that are problematic in filenames
    let invalid_chars = ['<', '>', ':', '"', '|', '?', '*', '/', '\\'];
    let mut sanitized = filename.to_string();

    for invalid_char in invalid_chars {
        sanitized = sanitized.replace(invalid_char, "_");
    }

    // Trim whitespace and limit length
    sanitized.trim().chars().take(255).collect()
}

/// Build the episode artifact file name (`<episode_id>.<ext>`), sanitizing the
/// ID so it is always a safe path component under `<feed_id>/`.
pub fn episode_file_name(episode_id: &str, extension: &str) -> String {
    format!("{}.{}", sanitize_filename(episode_id), extension)
}
