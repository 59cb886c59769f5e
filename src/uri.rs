//! RFC 3986 request-target parsing, percent-coding, and path normalization.
//!
//! Grounded in the original implementation's `UriParser`/`PathResolver`
//! (see `examples/original_source/srcs/UriParser.cpp` and
//! `PathResolver.cpp`): same grammar classes, same two-phase
//! decode-then-normalize pipeline, reworked into owned `String`s instead of
//! in-place byte-array surgery.

fn is_alpha(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn is_hexdig(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

fn is_unreserved(b: u8) -> bool {
    is_alpha(b) || is_digit(b) || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn is_sub_delims(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
    )
}

fn is_gen_delims(b: u8) -> bool {
    matches!(b, b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@')
}

fn is_reserved(b: u8) -> bool {
    is_gen_delims(b) || is_sub_delims(b)
}

fn is_pchar(b: u8) -> bool {
    is_unreserved(b) || is_sub_delims(b) || matches!(b, b':' | b'@')
}

fn decode_hex_pair(bytes: &[u8], at: usize) -> Option<u8> {
    let hi = *bytes.get(at)?;
    let lo = *bytes.get(at + 1)?;
    if !is_hexdig(hi) || !is_hexdig(lo) {
        return None;
    }
    let s = std::str::from_utf8(&[hi, lo]).ok()?;
    u8::from_str_radix(s, 16).ok()
}

/// Decode `%XX` triples in a path segment; every other byte must be `pchar`
/// or `/`. Returns `None` on invalid encoding or a disallowed byte.
pub(crate) fn decode_path(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            let decoded = decode_hex_pair(bytes, i + 1)?;
            out.push(decoded);
            i += 3;
        } else if is_pchar(b) || b == b'/' {
            out.push(b);
            i += 1;
        } else {
            return None;
        }
    }
    String::from_utf8(out).ok()
}

/// Validate (but do not decode) a query string; every byte must be `pchar`,
/// `/`, `?`, or a valid `%XX` triple.
fn validate_query(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            if decode_hex_pair(bytes, i + 1).is_none() {
                return false;
            }
            i += 3;
        } else if is_pchar(b) || b == b'/' || b == b'?' {
            i += 1;
        } else {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone, Default)]
pub struct ParsedTarget {
    pub is_valid: bool,
    pub path: String,
    /// Raw query string, leading `?` preserved (empty if absent).
    pub query: String,
    pub host: String,
    pub port: String,
    pub scheme: String,
}

/// Parse an origin-form (`/path?query`) or absolute-form
/// (`scheme://host[:port]/path?query`) request-target.
pub fn parse_target(uri: &str) -> ParsedTarget {
    let mut result = ParsedTarget {
        is_valid: true,
        path: "/".to_string(),
        ..Default::default()
    };

    let Some(&first) = uri.as_bytes().first() else {
        result.is_valid = false;
        return result;
    };

    if first == b'/' {
        parse_origin_form(uri, &mut result);
    } else if is_alpha(first) {
        parse_absolute_form(uri, &mut result);
    } else {
        result.is_valid = false;
    }
    result
}

fn parse_origin_form(uri: &str, result: &mut ParsedTarget) {
    let (path_part, query_part) = split_path_query(uri);
    match decode_path(path_part) {
        Some(p) => result.path = p,
        None => {
            result.is_valid = false;
            return;
        }
    }
    if !validate_query(query_part) {
        result.is_valid = false;
        return;
    }
    result.query = query_part.to_string();
}

fn split_path_query(uri: &str) -> (&str, &str) {
    match uri.find('?') {
        Some(idx) => (&uri[..idx], &uri[idx..]),
        None => (uri, ""),
    }
}

fn parse_absolute_form(uri: &str, result: &mut ParsedTarget) {
    let Some(scheme_end) = uri.find(':') else {
        result.is_valid = false;
        return;
    };
    let scheme = &uri[..scheme_end];
    if !scheme
        .bytes()
        .all(|b| is_alpha(b) || is_digit(b) || matches!(b, b'+' | b'-' | b'.'))
    {
        result.is_valid = false;
        return;
    }
    result.scheme = scheme.to_string();

    let rest = &uri[scheme_end + 1..];
    if !rest.starts_with("//") {
        result.is_valid = false;
        return;
    }
    let rest = &rest[2..];

    let authority_end = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    if !parse_authority(authority, result) {
        result.is_valid = false;
        return;
    }

    let tail = &rest[authority_end..];
    if tail.is_empty() {
        result.path = String::new();
        return;
    }
    parse_origin_form(tail, result);
}

fn parse_authority(authority: &str, result: &mut ParsedTarget) -> bool {
    let (host_part, port_part) = match authority.find(':') {
        Some(idx) => (&authority[..idx], Some(&authority[idx + 1..])),
        None => (authority, None),
    };
    if host_part.is_empty() {
        return false;
    }
    let bytes = host_part.as_bytes();
    let mut i = 0;
    let mut decoded_host = String::new();
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            let Some(d) = decode_hex_pair(bytes, i + 1) else {
                return false;
            };
            decoded_host.push(d as char);
            i += 3;
        } else if is_unreserved(b) || is_sub_delims(b) {
            decoded_host.push(b as char);
            i += 1;
        } else {
            return false;
        }
    }
    if let Some(port) = port_part {
        if !port.is_empty() && !port.bytes().all(is_digit) {
            return false;
        }
        result.port = port.to_string();
    }
    result.host = decoded_host.to_ascii_lowercase();
    true
}

/// Parse the body of a `Host:` header: `host[:port]`, lowercased, port
/// digits-only.
pub fn parse_host(value: &str) -> Option<(String, Option<u16>)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (host, port) = match value.rfind(':') {
        Some(idx) if value[idx + 1..].bytes().all(is_digit) && idx + 1 < value.len() => {
            (&value[..idx], Some(value[idx + 1..].parse::<u16>().ok()?))
        }
        _ => (value, None),
    };
    if host.is_empty() {
        return None;
    }
    Some((host.to_ascii_lowercase(), port))
}

/// Encode every `reserved` byte as `%HH`. Used only for autoindex link
/// generation (§4.4).
pub fn encode_ascii_to_hex(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        if is_reserved(b) {
            out.push_str(&format!("%{:02X}", b));
        } else {
            out.push(b as char);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    ConfigValidator,
    Router,
    HttpParser,
    ErrorPage,
}

/// Normalize `.`/`..`/`//` in a path. Extracts a trailing file component
/// (everything after the last `/`) when the path doesn't end in `/`,
/// normalizes the directory prefix, then re-appends the file component.
/// Returns `None` if a `..` would ascend above the root.
pub fn normalize(path: &str, mode: NormalizeMode) -> Option<String> {
    let mut path = path.to_string();
    if mode == NormalizeMode::ErrorPage && !path.starts_with('/') {
        path.insert(0, '/');
    }

    let (dir, file) = split_trailing_file(&path);
    let normalized_dir = normalize_dir(&dir)?;

    if mode == NormalizeMode::ErrorPage && file.is_none() {
        return None;
    }

    let mut out = normalized_dir;
    if let Some(f) = file {
        out.push_str(&f);
    }
    Some(out)
}

fn split_trailing_file(path: &str) -> (String, Option<String>) {
    if path.ends_with('/') || path.is_empty() {
        return (path.to_string(), None);
    }
    match path.rfind('/') {
        Some(idx) => (path[..=idx].to_string(), Some(path[idx + 1..].to_string())),
        None => (String::new(), Some(path.to_string())),
    }
}

fn normalize_dir(dir: &str) -> Option<String> {
    let leading_slash = dir.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for seg in dir.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                stack.pop()?;
            }
            s => stack.push(s),
        }
    }
    let mut out = String::new();
    if leading_slash {
        out.push('/');
    }
    if !stack.is_empty() {
        out.push_str(&stack.join("/"));
        out.push('/');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_decodes_path_and_keeps_query_raw() {
        let t = parse_target("/a%20b/c?x=%20y");
        assert!(t.is_valid);
        assert_eq!(t.path, "/a b/c");
        assert_eq!(t.query, "?x=%20y");
    }

    #[test]
    fn absolute_form_splits_scheme_host_port() {
        let t = parse_target("http://Example.com:8080/a?b=1");
        assert!(t.is_valid);
        assert_eq!(t.scheme, "http");
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, "8080");
        assert_eq!(t.path, "/a");
        assert_eq!(t.query, "?b=1");
    }

    #[test]
    fn invalid_percent_encoding_is_rejected() {
        let t = parse_target("/a%zz");
        assert!(!t.is_valid);
    }

    #[test]
    fn bad_leading_byte_is_rejected() {
        let t = parse_target("?no-leading-slash");
        assert!(!t.is_valid);
    }

    #[test]
    fn host_header_lowercases_and_splits_port() {
        let (host, port) = parse_host("Example.COM:8081").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, Some(8081));
    }

    #[test]
    fn normalize_collapses_dot_segments() {
        assert_eq!(
            normalize("/a/./b/../c/file.html", NormalizeMode::Router).as_deref(),
            Some("/a/c/file.html")
        );
    }

    #[test]
    fn normalize_collapses_double_slashes() {
        assert_eq!(
            normalize("//a//b///", NormalizeMode::Router).as_deref(),
            Some("/a/b/")
        );
    }

    #[test]
    fn normalize_rejects_dotdot_above_root() {
        assert_eq!(normalize("/../etc/passwd", NormalizeMode::Router), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("/a/./b/../c/", NormalizeMode::Router).unwrap();
        let twice = normalize(&once, NormalizeMode::Router).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn encode_decode_round_trip_for_reserved_free_ascii() {
        let s = "hello-world_1.2~3";
        assert_eq!(encode_ascii_to_hex(s), s);
    }
}
