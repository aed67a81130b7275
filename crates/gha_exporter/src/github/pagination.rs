//! `Link` header pagination.

use url::Url;

/// Pagination information extracted from GitHub's Link header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkPagination {
    /// The last page number (from rel="last" link).
    pub last_page: Option<u32>,
    /// The next page number (from rel="next" link).
    pub next_page: Option<u32>,
}

impl LinkPagination {
    /// Returns the total number of pages if known.
    pub fn total_pages(&self) -> Option<u32> {
        self.last_page
    }
}

/// Parse the Link header to extract pagination info.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/repositories/1/actions/runs?per_page=100&page=2>; rel="next", <...&page=3>; rel="last"`
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut info = LinkPagination::default();

    for part in link_header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.split(';').map(str::trim) {
            if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                url = Some(inner);
            } else if let Some(value) = segment.strip_prefix("rel=") {
                rel = Some(value.trim_matches('"'));
            }
        }

        let (Some(url), Some(rel)) = (url, rel) else {
            continue;
        };
        let Some(page) = extract_page_from_url(url) else {
            continue;
        };
        match rel {
            "next" => info.next_page = Some(page),
            "last" => info.last_page = Some(page),
            _ => {}
        }
    }

    info
}

/// Extract the `page` query parameter from a URL.
pub(crate) fn extract_page_from_url(url: &str) -> Option<u32> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_header_full() {
        let header = r#"<https://api.github.com/repositories/5430905/actions/runs?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/5430905/actions/runs?per_page=100&page=3>; rel="last""#;

        let info = parse_link_header(header);
        assert_eq!(info.next_page, Some(2));
        assert_eq!(info.last_page, Some(3));
        assert_eq!(info.total_pages(), Some(3));
    }

    #[test]
    fn test_parse_link_header_on_last_page() {
        let header = r#"<https://api.github.com/orgs/octo/repos?page=1>; rel="first", <https://api.github.com/orgs/octo/repos?page=4>; rel="prev""#;

        let info = parse_link_header(header);
        assert_eq!(info.next_page, None);
        assert_eq!(info.last_page, None);
    }

    #[test]
    fn test_parse_link_header_empty_and_garbage() {
        assert_eq!(parse_link_header(""), LinkPagination::default());
        assert_eq!(parse_link_header("nonsense; rel"), LinkPagination::default());
    }

    #[test]
    fn test_parse_link_header_with_encoded_created_filter() {
        let header = r#"<https://ghe.example.com/api/v3/repos/o/r/actions/runs?created=%3E%3D2024-01-01T00%3A00%3A00Z&per_page=100&page=7>; rel="next""#;
        assert_eq!(parse_link_header(header).next_page, Some(7));
    }

    #[test]
    fn test_extract_page_from_url() {
        assert_eq!(
            extract_page_from_url("https://api.github.com/repos?page=5"),
            Some(5)
        );
        assert_eq!(
            extract_page_from_url("https://api.github.com/repos?per_page=100&page=3"),
            Some(3)
        );
        assert_eq!(
            extract_page_from_url("https://api.github.com/repos?per_page=100"),
            None
        );
        assert_eq!(extract_page_from_url("https://api.github.com/repos"), None);
        assert_eq!(extract_page_from_url("not a url"), None);
    }
}
