//! Image reference handling and registry mirror rewriting.

use aiserver_common::constants::DEFAULT_REGISTRY_HOSTS;

/// Splits `image` into `(registry, remainder)` when it names an explicit
/// registry host.
fn split_registry(image: &str) -> Option<(&str, &str)> {
    let (first, rest) = image.split_once('/')?;
    let is_host = first.contains('.') || first.contains(':') || first == "localhost";
    is_host.then_some((first, rest))
}

fn mirror_host(mirror: &str) -> &str {
    let mirror = mirror.trim();
    let mirror = mirror
        .strip_prefix("https://")
        .or_else(|| mirror.strip_prefix("http://"))
        .unwrap_or(mirror);
    mirror.trim_end_matches('/')
}

/// Returns `true` if `image` resolves to the default public registry.
#[must_use]
pub fn is_default_registry(image: &str) -> bool {
    split_registry(image).is_none_or(|(host, _)| DEFAULT_REGISTRY_HOSTS.contains(&host))
}

/// Pull candidates for `image`: each mirror in order, then the original.
///
/// Only images on the default public registry are rewritten. Official
/// single-segment names gain the `library/` namespace on mirrors.
#[must_use]
pub fn candidates(image: &str, mirrors: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(mirrors.len() + 1);
    if is_default_registry(image) {
        let path = split_registry(image).map_or(image, |(_, rest)| rest);
        let path = if path.contains('/') {
            path.to_string()
        } else {
            format!("library/{path}")
        };
        for mirror in mirrors {
            let host = mirror_host(mirror);
            if host.is_empty() {
                continue;
            }
            let candidate = format!("{host}/{path}");
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
    }
    if !out.iter().any(|c| c == image) {
        out.push(image.to_string());
    }
    out
}
