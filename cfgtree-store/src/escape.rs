//! Escaping of logical path components for on-disk storage.
//!
//! `/` and `%` are reserved in component names and are percent-escaped at
//! the storage boundary. The empty component has no natural directory name
//! and is encoded as a distinguished token.

/// Token used to store the empty component.
pub const EMPTY_TOKEN: &str = "%%%";

/// Escapes a logical path component into a storage-safe directory name.
pub fn escape(component: &str) -> String {
    if component.is_empty() {
        return EMPTY_TOKEN.to_owned();
    }
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape`].
pub fn unescape(name: &str) -> String {
    if name == EMPTY_TOKEN {
        return String::new();
    }
    let mut out = String::with_capacity(name.len());
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            match &bytes[i + 1..i + 3] {
                b"25" => {
                    out.push('%');
                    i += 3;
                    continue;
                }
                b"2F" => {
                    out.push('/');
                    i += 3;
                    continue;
                }
                _ => {}
            }
        }
        // multi-byte UTF-8 sequences pass through untouched
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&name[i..i + ch_len]);
        i += ch_len;
    }
    out
}

fn utf8_len(b: u8) -> usize {
    match b {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_characters() {
        assert_eq!(escape("a/b"), "a%2Fb");
        assert_eq!(escape("100%"), "100%25");
        assert_eq!(escape("%2F"), "%252F");
    }

    #[test]
    fn empty_component() {
        assert_eq!(escape(""), EMPTY_TOKEN);
        assert_eq!(unescape(EMPTY_TOKEN), "");
    }

    #[test]
    fn round_trip() {
        for c in ["", "eth0", "a/b", "%", "%%", "10.0.0.1/24", "%25", "日本/語"] {
            assert_eq!(unescape(&escape(c)), c, "component {c:?}");
        }
    }

    #[test]
    fn unescape_passthrough() {
        // no escape sequences, returned as-is
        assert_eq!(unescape("plain"), "plain");
        // stray percent without a known code
        assert_eq!(unescape("%zz"), "%zz");
    }
}
