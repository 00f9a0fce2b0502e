//! Request path checks shared by the authentication filter and the forwarder.
//!
//! URL parsing on the outbound side removes `.` / `..` segments (literal or
//! `%2e`-encoded), so a path carrying them would be authorized as one path and
//! forwarded as another. Such paths are refused before either decision.

/// `true` when a segment of `path` is `.` or `..`, in any encoding `url` resolves.
pub fn has_dot_segment(path: &str) -> bool {
    // http URLs are "special": `\` separates segments like `/`.
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_encoded_dot_segments_are_detected() {
        for path in [
            "/api/auth/login/../../orders",
            "/api/auth/login/%2e%2e/%2E%2E/orders",
            "/api/auth/login/.%2e/orders",
            "/api/./orders",
            "/api/auth/login\\..\\orders",
        ] {
            assert!(has_dot_segment(path), "{path}");
        }
    }

    #[test]
    fn ordinary_paths_pass() {
        for path in ["/", "/api/orders", "/api/files/report.v2.pdf", "/api/...", "/api/.well-known"] {
            assert!(!has_dot_segment(path), "{path}");
        }
    }
}
