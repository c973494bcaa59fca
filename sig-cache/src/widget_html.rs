//! Rewrites opaque widget HTML (fetched from the CMS `getResource` call) so
//! that inline CSS `url(...)` references and `<script src="...">` tags point
//! at locally-cached copies instead of the CMS.

use std::path::Path;

use crate::error::Result;

/// Fetches every `url(...)`/`<script src>` subresource referenced by `html`,
/// caches it under `widget_dir`, and returns the HTML with those references
/// rewritten to the local file path.
pub async fn cache_widget_html(client: &reqwest::Client, widget_dir: &Path, html: &str) -> Result<String> {
    let mut out = html.to_string();

    for reference in find_css_urls(&out).into_iter().chain(find_script_srcs(&out)) {
        if reference.starts_with("data:") || reference.starts_with("local:") {
            continue;
        }
        match fetch_and_cache(client, widget_dir, &reference).await {
            Ok(local_path) => {
                out = out.replace(&reference, &local_path);
            }
            Err(e) => {
                tracing::warn!(url = %reference, error = %e, "failed to cache widget subresource, leaving remote reference");
            }
        }
    }

    Ok(out)
}

/// Extracts a CMS-embedded `<!-- DURATION=n -->` comment's value, if
/// present, for the renderer to apply as a duration override on the
/// widget that fetched this HTML.
pub fn parse_duration_comment(html: &str) -> Option<u32> {
    parse_comment_value(html, "DURATION")
}

fn parse_comment_value(html: &str, key: &str) -> Option<u32> {
    let needle = format!("{key}=");
    let mut rest = html;
    while let Some(idx) = rest.find("<!--") {
        let after = &rest[idx + 4..];
        let Some(end) = after.find("-->") else { break };
        let comment = after[..end].trim();
        if let Some(value) = comment.strip_prefix(&needle) {
            if let Ok(n) = value.trim().parse::<u32>() {
                return Some(n);
            }
        }
        rest = &after[end + 3..];
    }
    None
}

fn find_css_urls(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = html;
    while let Some(idx) = rest.find("url(") {
        let after = &rest[idx + 4..];
        if let Some(end) = after.find(')') {
            let inner = after[..end].trim().trim_matches(['"', '\'']);
            if !inner.is_empty() {
                out.push(inner.to_string());
            }
            rest = &after[end + 1..];
        } else {
            break;
        }
    }
    out
}

fn find_script_srcs(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = html;
    while let Some(idx) = rest.find("<script") {
        let after = &rest[idx..];
        let Some(tag_end) = after.find('>') else {
            break;
        };
        let tag = &after[..tag_end];
        if let Some(src_idx) = tag.find("src=") {
            let quoted = &tag[src_idx + 4..];
            if let Some(quote) = quoted.chars().next() {
                if quote == '"' || quote == '\'' {
                    if let Some(end) = quoted[1..].find(quote) {
                        out.push(quoted[1..1 + end].to_string());
                    }
                }
            }
        }
        rest = &after[tag_end + 1..];
    }
    out
}

async fn fetch_and_cache(client: &reqwest::Client, widget_dir: &Path, url: &str) -> Result<String> {
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;

    let mut hasher = sha1::Sha1::new();
    use sha1::Digest;
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let ext = url.rsplit('.').next().filter(|e| e.len() <= 5).unwrap_or("bin");
    let file_name = format!("{digest}.{ext}");
    let dest = widget_dir.join(&file_name);
    tokio::fs::write(&dest, &bytes).await?;

    Ok(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_css_urls() {
        let html = r#"<style>body { background: url("http://cms/bg.png"); } .x { background-image: url(http://cms/x.jpg) }</style>"#;
        let urls = find_css_urls(html);
        assert_eq!(urls, vec!["http://cms/bg.png", "http://cms/x.jpg"]);
    }

    #[test]
    fn extracts_script_src() {
        let html = r#"<script src="http://cms/ticker.js"></script>"#;
        let urls = find_script_srcs(html);
        assert_eq!(urls, vec!["http://cms/ticker.js"]);
    }

    #[test]
    fn extracts_duration_comment() {
        let html = "<!-- NUMITEMS=5 --><!-- DURATION=30 --><div>ticker</div>";
        assert_eq!(parse_duration_comment(html), Some(30));
    }

    #[test]
    fn missing_duration_comment_is_none() {
        assert_eq!(parse_duration_comment("<div>plain</div>"), None);
    }
}
