//! Helpers for paths under the site's routing root (e.g. `/physical-ai/`).

/// Join the routing root and a site path without doubling slashes.
///
/// `base_path("/physical-ai/", "/signup")` is `/physical-ai/signup`.
pub fn base_path(base_url: &str, path: &str) -> String {
    let clean = path.strip_prefix('/').unwrap_or(path);
    let base = normalize_base(base_url);

    if base == "/" {
        format!("/{}", clean)
    } else {
        format!("{}{}", base, clean)
    }
}

/// Make a citation URL consistent with the routing root.
///
/// URLs that already live under the root are returned unchanged; anything
/// else gets the root prepended (minus its trailing slash).
pub fn resolve_source_url(base_url: &str, url: &str) -> String {
    let base = normalize_base(base_url);
    if url.starts_with(&base) {
        return url.to_string();
    }
    format!("{}{}", base.trim_end_matches('/'), url)
}

fn normalize_base(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}
