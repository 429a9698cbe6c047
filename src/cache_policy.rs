use std::path::Path;
use std::time::{Duration, SystemTime};

pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
    ("Referrer-Policy", "strict-origin-when-cross-origin"),
];

/// Caching class of a served file, picked from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Image,
    Asset,
    Markup,
    Other,
}

impl CacheCategory {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());
        match ext.as_deref() {
            Some("jpg" | "jpeg" | "png" | "gif" | "webp" | "ico") => CacheCategory::Image,
            Some("css" | "js") => CacheCategory::Asset,
            Some("html") => CacheCategory::Markup,
            _ => CacheCategory::Other,
        }
    }

    pub fn max_age(self) -> u64 {
        match self {
            CacheCategory::Image => 31_536_000,
            CacheCategory::Asset => 2_592_000,
            CacheCategory::Markup => 3600,
            CacheCategory::Other => 86400,
        }
    }

    pub fn cache_control(self) -> String {
        match self {
            CacheCategory::Image => format!("public, max-age={}, immutable", self.max_age()),
            _ => format!("public, max-age={}", self.max_age()),
        }
    }
}

/// `Cache-Control` and `Expires` for a successful response.
pub fn cache_headers(category: CacheCategory, now: SystemTime) -> Vec<(String, String)> {
    let expires = now + Duration::from_secs(category.max_age());
    vec![
        ("Cache-Control".to_string(), category.cache_control()),
        ("Expires".to_string(), httpdate::fmt_http_date(expires)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_by_extension() {
        for name in ["a.jpg", "a.JPEG", "a.png", "a.gif", "a.webp", "favicon.ico"] {
            assert_eq!(CacheCategory::for_path(Path::new(name)), CacheCategory::Image);
        }
        assert_eq!(CacheCategory::for_path(Path::new("s.css")), CacheCategory::Asset);
        assert_eq!(CacheCategory::for_path(Path::new("s.js")), CacheCategory::Asset);
        assert_eq!(CacheCategory::for_path(Path::new("i.html")), CacheCategory::Markup);
        assert_eq!(CacheCategory::for_path(Path::new("i.htm")), CacheCategory::Other);
        assert_eq!(CacheCategory::for_path(Path::new("feed.xml")), CacheCategory::Other);
        assert_eq!(CacheCategory::for_path(Path::new("LICENSE")), CacheCategory::Other);
    }

    #[test]
    fn cache_control_values() {
        assert_eq!(
            CacheCategory::Image.cache_control(),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(CacheCategory::Asset.cache_control(), "public, max-age=2592000");
        assert_eq!(CacheCategory::Markup.cache_control(), "public, max-age=3600");
        assert_eq!(CacheCategory::Other.cache_control(), "public, max-age=86400");
    }

    #[test]
    fn expires_is_now_plus_max_age() {
        let now = httpdate::parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        let headers = cache_headers(CacheCategory::Markup, now);
        assert_eq!(headers[1].0, "Expires");
        assert_eq!(headers[1].1, "Sun, 06 Nov 1994 09:49:37 GMT");
    }
}
