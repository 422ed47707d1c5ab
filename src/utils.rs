use std::time::Duration;

use reqwest::Url;

use crate::error::LinkError;

/// Extract the trial identifier (last non-empty path segment) from a trial URL.
///
/// `https://clinicaltrials.gov/study/NCT01838577` → `NCT01838577`.
/// Query strings and fragments are ignored; a trailing slash is tolerated.
/// A link without a scheme (`clinicaltrials.gov/study/NCT01838577`) is read
/// as https.
pub fn trial_id_from_url(link: &str) -> Result<String, LinkError> {
    let malformed = || LinkError::Malformed(link.to_string());
    let link = link.trim();
    let url = if link.contains("://") {
        Url::parse(link)
    } else {
        Url::parse(&format!("https://{}", link))
    }
    .map_err(|_| malformed())?;
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .ok_or_else(malformed)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
