//! Pagination helpers.
//!
//! Paginated payloads look like
//! `{"dados": [...], "links": [{"rel": "next", "href": "..."}]}`;
//! a bare JSON array is treated as a single, final page.

use serde_json::Value;
use url::Url;

use crate::error::{ApiError, ApiResult};

/// Query parameter selecting the page number.
pub const PAGE_PARAM: &str = "pagina";

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    /// `href` of the `next` link, if any.
    pub next: Option<String>,
}

impl Page {
    /// Extract the items array and the continuation link.
    pub fn from_payload(payload: &Value, items_field: &str) -> ApiResult<Self> {
        match payload {
            Value::Array(items) => Ok(Self {
                items: items.clone(),
                next: None,
            }),
            Value::Object(fields) => {
                let items = match fields.get(items_field) {
                    Some(Value::Array(items)) => items.clone(),
                    Some(Value::Null) | None => {
                        return Err(ApiError::malformed(format!(
                            "payload has no '{}' array",
                            items_field
                        )))
                    }
                    // Single-record endpoints wrap one object.
                    Some(single @ Value::Object(_)) => vec![single.clone()],
                    Some(other) => {
                        return Err(ApiError::malformed(format!(
                            "'{}' is not an array: {}",
                            items_field, other
                        )))
                    }
                };
                Ok(Self {
                    items,
                    next: next_link(fields.get("links")),
                })
            }
            other => Err(ApiError::malformed(format!(
                "expected an object or array payload, got {}",
                other
            ))),
        }
    }

    /// Page number carried by the `next` link (`pagina` query parameter).
    pub fn next_page(&self) -> Option<u32> {
        if !self.has_next() {
            return None;
        }
        let href = self.next.as_deref()?;
        let url = Url::parse(href)
            .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(href)))
            .ok()?;
        url.query_pairs()
            .find(|(key, _)| key == PAGE_PARAM)
            .and_then(|(_, value)| value.parse().ok())
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some() && !self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn next_link(links: Option<&Value>) -> Option<String> {
    links?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))
        .and_then(|link| link.get("href").and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_with_next_link() {
        let payload = json!({
            "dados": [{"id": 1}, {"id": 2}],
            "links": [
                {"rel": "self", "href": "https://api/x?pagina=1"},
                {"rel": "next", "href": "https://api/x?pagina=2"},
                {"rel": "last", "href": "https://api/x?pagina=9"}
            ]
        });
        let page = Page::from_payload(&payload, "dados").unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.next.as_deref(), Some("https://api/x?pagina=2"));
        assert!(page.has_next());
    }

    #[test]
    fn test_next_page_number() {
        let payload = json!({
            "dados": [{"id": 1}],
            "links": [{"rel": "next", "href": "https://api/x?itens=100&pagina=4"}]
        });
        let page = Page::from_payload(&payload, "dados").unwrap();
        assert_eq!(page.next_page(), Some(4));

        let relative = json!({
            "dados": [{"id": 1}],
            "links": [{"rel": "next", "href": "/x?pagina=2"}]
        });
        assert_eq!(Page::from_payload(&relative, "dados").unwrap().next_page(), Some(2));
    }

    #[test]
    fn test_next_link_without_page_number() {
        let payload = json!({
            "dados": [{"id": 1}],
            "links": [{"rel": "next", "href": "https://api/x?cursor=abc"}]
        });
        let page = Page::from_payload(&payload, "dados").unwrap();
        assert!(page.has_next());
        assert_eq!(page.next_page(), None);
    }

    #[test]
    fn test_last_page() {
        let payload = json!({"dados": [{"id": 3}], "links": [{"rel": "self", "href": "x"}]});
        let page = Page::from_payload(&payload, "dados").unwrap();
        assert!(!page.has_next());
    }

    #[test]
    fn test_empty_page_never_continues() {
        let payload = json!({"dados": [], "links": [{"rel": "next", "href": "x"}]});
        assert!(!Page::from_payload(&payload, "dados").unwrap().has_next());
    }

    #[test]
    fn test_bare_array_and_single_object() {
        let page = Page::from_payload(&json!([1, 2, 3]), "dados").unwrap();
        assert_eq!(page.len(), 3);

        let page = Page::from_payload(&json!({"dados": {"id": 7}}), "dados").unwrap();
        assert_eq!(page.items, vec![json!({"id": 7})]);
    }

    #[test]
    fn test_missing_items_is_malformed() {
        let err = Page::from_payload(&json!({"other": []}), "dados").unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));
        assert!(Page::from_payload(&json!("text"), "dados").is_err());
    }
}
