use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::io;
use std::path::Path;

/// Characters escaped in listing hrefs.
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Minimal HTML index for a directory without an index file.
pub fn render_listing(dir: &Path, request_path: &str) -> io::Result<String> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_dir {
                format!("{}/", name)
            } else {
                name
            }
        })
        .collect::<Vec<_>>();
    entries.sort();

    let title = escape_html(request_path);
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Index of {0}</title></head>\n<body><h1>Index of {0}</h1><hr><ul>\n",
        title
    );
    if request_path != "/" {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for name in &entries {
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            utf8_percent_encode(name, HREF),
            escape_html(name)
        ));
    }
    html.push_str("</ul><hr></body></html>\n");
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_sorted_entries_with_escaping() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::write(dir.path().join("b <x>.html"), "").unwrap();
        fs::write(dir.path().join("a.png"), "").unwrap();

        let html = render_listing(dir.path(), "/drafts/").unwrap();
        let a = html.find("a.png").unwrap();
        let b = html.find("b &lt;x&gt;.html").unwrap();
        let z = html.find(">zeta/<").unwrap();
        assert!(a < b && b < z);
        assert!(html.contains("href=\"b%20%3Cx%3E.html\""));
        assert!(html.contains("href=\"../\""));
    }

    #[test]
    fn root_listing_has_no_parent_link() {
        let dir = TempDir::new().unwrap();
        let html = render_listing(dir.path(), "/").unwrap();
        assert!(html.contains("<title>Index of /</title>"));
        assert!(!html.contains("../"));
    }
}
