//! Pure address → cache-path mapping rules (`spec.md` §4.4, §8 scenario 5).

use url::Url;

/// Query parameters stripped before a query string is folded into a cache
/// filename. Case-insensitive.
const PRIVATE_QUERY_PARAMS: &[&str] = &["CONNECTID"];

/// Characters illegal in a filesystem path component; replaced with `_`.
/// Includes `/` — the body is folded into a single path component living
/// under the `HHHH` bucket directory, so any slash in the original URL
/// path or query must not introduce further nesting.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\', '/'];

/// Computes the store-relative cache path for a remote `url`, given its
/// declared content type (used only when `url`'s path carries no suffix of
/// its own).
///
/// This is a pure function of the URL (after private-parameter stripping)
/// and content type, as required by `spec.md` §8's determinism property.
///
/// - `jar:...!/inner` rewrites to `host/innerPath.suffix`, with `"!/"`
///   replaced by `"#"`.
/// - Every other scheme maps to `host/HHHH/filename.suffix`, where `HHHH`
///   is the first four hex digits of an FNV-1a 64-bit hash of the
///   (query-stripped) filename body, `filename` is that body with illegal
///   characters (including `/`) replaced, and `suffix` comes from the
///   URL path's own extension, or else from `content_type`. The body
///   keeps the URL path's extension verbatim (`spec.md` §8 scenario 5:
///   `/tiles/a.png_layer=1` keeps `.png` in the body *and* gets it
///   repeated as the appended suffix).
pub fn make_cache_path(url: &Url, content_type: Option<&str>) -> String {
    if url.scheme() == "jar" {
        return make_jar_path(url);
    }

    let host = url.host_str().unwrap_or("local").to_string();
    let body = make_filename(url);
    let hhhh = format!("{:04x}", fnv1a_hash(&body) & 0xFFFF);
    let suffix = suffix_for(url.path(), content_type);

    let sanitized = sanitize(&body);
    format!("{host}/{hhhh}/{sanitized}.{suffix}")
}

fn make_jar_path(url: &Url) -> String {
    let raw = url.as_str();
    let without_scheme = raw.strip_prefix("jar:").unwrap_or(raw);
    let host = url.host_str().unwrap_or("local");
    let rewritten = without_scheme.replace("!/", "#");
    format!("{host}/{}", sanitize(&rewritten))
}

/// Builds the filename component: the URL path (extension retained), plus
/// an underscore-joined, query-stripped-of-private-params query string.
fn make_filename(url: &Url) -> String {
    let path = url.path();
    let query = public_query_string(url);
    match query {
        Some(q) if !q.is_empty() => format!("{path}_{q}"),
        _ => path.to_string(),
    }
}

fn public_query_string(url: &Url) -> Option<String> {
    let pairs: Vec<String> = url
        .query_pairs()
        .filter(|(k, _)| {
            !PRIVATE_QUERY_PARAMS
                .iter()
                .any(|p| p.eq_ignore_ascii_case(k))
        })
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("&"))
    }
}

/// Derives the appended suffix from the URL's own path extension (the
/// `.` must fall within the final path segment, after any `/`), or else
/// from `content_type`.
fn suffix_for(path: &str, content_type: Option<&str>) -> String {
    if let Some(idx) = path.rfind('.') {
        if idx > path.rfind('/').unwrap_or(0) {
            let existing = &path[idx + 1..];
            if !existing.is_empty() {
                return normalize_jpeg(existing);
            }
        }
    }
    match content_type {
        Some(ct) => normalize_jpeg(suffix_from_mime(ct)),
        None => "dat".to_string(),
    }
}

fn suffix_from_mime(content_type: &str) -> &str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/tiff" => "tif",
        "image/dds" => "dds",
        "application/zip" => "zip",
        "text/xml" | "application/xml" => "xml",
        "text/html" => "html",
        _ => "dat",
    }
}

fn normalize_jpeg(suffix: &str) -> String {
    if suffix.eq_ignore_ascii_case("jpeg") {
        "jpg".to_string()
    } else {
        suffix.to_ascii_lowercase()
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Deterministic, stable (not process-randomized) 64-bit FNV-1a hash.
/// `std`'s `DefaultHasher`/`RandomState` are not used here because their
/// seed, while fixed within one invocation, is not part of a stability
/// contract; FNV-1a's behavior is specified exactly and never changes.
fn fnv1a_hash(data: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for byte in data.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
