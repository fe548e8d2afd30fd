use std::collections::BTreeMap;

use url::Url;

/// Ordered filter name → value mapping. An absent key means "no constraint";
/// empty values are never stored and never transmitted.
pub type FilterCriteria = BTreeMap<String, String>;

pub const PAGE_KEY: &str = "page";
pub const DEFAULT_PAGE_SIZE: u64 = 12;

/// Search criteria and page position, persisted in the shareable URL. The
/// URL is the only store: `read` is a pure decode and `set` rewrites the
/// query string in place, so form fields and cache keys can never diverge
/// from what the address bar shows.
#[derive(Debug, Clone)]
pub struct FilterState {
    url: Url,
}

impl FilterState {
    pub fn from_url(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn read(&self) -> FilterCriteria {
        self.url
            .query_pairs()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Criteria as transmission-ready query parameters, empty values already
    /// stripped.
    pub fn params(&self) -> Vec<(String, String)> {
        self.read().into_iter().collect()
    }

    pub fn page(&self) -> u64 {
        self.read()
            .get(PAGE_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    /// Empty values remove the key. Any change other than to `page` resets
    /// the page position back to 1. Page 1 is represented by key absence so
    /// that equal criteria always produce equal cache keys.
    pub fn set(&mut self, name: &str, value: &str) {
        let mut criteria = self.read();

        if value.is_empty() {
            criteria.remove(name);
        } else if name == PAGE_KEY && value == "1" {
            criteria.remove(PAGE_KEY);
        } else {
            criteria.insert(name.to_string(), value.to_string());
        }

        if name != PAGE_KEY {
            criteria.remove(PAGE_KEY);
        }

        self.write(&criteria);
    }

    pub fn reset(&mut self) {
        self.url.set_query(None);
    }

    fn write(&mut self, criteria: &FilterCriteria) {
        if criteria.is_empty() {
            self.url.set_query(None);
            return;
        }
        let mut pairs = self.url.query_pairs_mut();
        pairs.clear();
        for (name, value) in criteria {
            pairs.append_pair(name, value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub current: u64,
    pub total_pages: u64,
    /// Up to 5 page buttons centered on the current page, clamped to
    /// `[1, total_pages]`.
    pub pages: Vec<u64>,
    pub has_prev: bool,
    pub has_next: bool,
}

pub fn page_window(count: u64, page_size: u64, current: u64) -> PageWindow {
    let total_pages = count.div_ceil(page_size.max(1)).max(1);
    let current = current.clamp(1, total_pages);

    let end = (current + 2).clamp(5.min(total_pages), total_pages);
    let start = end.saturating_sub(4).max(1);

    PageWindow {
        current,
        total_pages,
        pages: (start..=end).collect(),
        has_prev: current > 1,
        has_next: current < total_pages,
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{page_window, FilterState};
    use crate::cache::QueryKey;

    fn state(url: &str) -> FilterState {
        FilterState::from_url(Url::parse(url).unwrap())
    }

    #[test]
    fn read_skips_empty_values() {
        let s = state("https://automart.example/catalog?make=BMW&model=&page=2");
        let criteria = s.read();
        assert_eq!(criteria.get("make").map(String::as_str), Some("BMW"));
        assert!(!criteria.contains_key("model"));
        assert_eq!(s.page(), 2);
    }

    #[test]
    fn changing_a_filter_resets_the_page() {
        let mut s = state("https://automart.example/catalog?make=BMW&page=4");
        s.set("price_max", "20000");

        assert_eq!(s.page(), 1);
        assert_eq!(
            s.read().get("price_max").map(String::as_str),
            Some("20000")
        );
        assert_eq!(s.read().get("make").map(String::as_str), Some("BMW"));
    }

    #[test]
    fn changing_the_page_keeps_other_filters() {
        let mut s = state("https://automart.example/catalog?make=BMW");
        s.set("page", "3");

        assert_eq!(s.page(), 3);
        assert_eq!(s.read().get("make").map(String::as_str), Some("BMW"));
    }

    #[test]
    fn empty_value_removes_the_key() {
        let mut s = state("https://automart.example/catalog?make=BMW&fuel=diesel");
        s.set("fuel", "");

        let criteria = s.read();
        assert!(!criteria.contains_key("fuel"));
        assert!(!s.url().as_str().contains("fuel"));
    }

    #[test]
    fn params_never_carry_empty_values() {
        let mut s = state("https://automart.example/catalog?q=&make=Audi&year_min=");
        s.set("transmission", "");

        for (name, value) in s.params() {
            assert!(!value.is_empty(), "param {name} has an empty value");
        }
        assert_eq!(s.params().len(), 1);
    }

    #[test]
    fn reset_clears_all_criteria() {
        let mut s = state("https://automart.example/catalog?make=BMW&page=2&fuel=petrol");
        s.reset();
        assert!(s.read().is_empty());
        assert_eq!(s.url().query(), None);
    }

    #[test]
    fn url_is_rewritten_in_place() {
        let mut s = state("https://automart.example/catalog?page=7");
        s.set("make", "Lada");
        assert_eq!(s.url().as_str(), "https://automart.example/catalog?make=Lada");
    }

    #[test]
    fn equal_criteria_produce_equal_cache_keys() {
        let mut a = state("https://automart.example/catalog");
        a.set("make", "BMW");
        a.set("page", "2");
        a.set("page", "1");

        let b = state("https://automart.example/catalog?make=BMW");

        let key_a = QueryKey::new("/catalog/listings", &a.params());
        let key_b = QueryKey::new("/catalog/listings", &b.params());
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn window_centers_on_the_current_page() {
        let w = page_window(100, 12, 5);
        assert_eq!(w.total_pages, 9);
        assert_eq!(w.pages, vec![3, 4, 5, 6, 7]);
        assert!(w.has_prev);
        assert!(w.has_next);
    }

    #[test]
    fn window_clamps_at_the_edges() {
        let first = page_window(100, 12, 1);
        assert_eq!(first.pages, vec![1, 2, 3, 4, 5]);
        assert!(!first.has_prev);
        assert!(first.has_next);

        let last = page_window(100, 12, 9);
        assert_eq!(last.pages, vec![5, 6, 7, 8, 9]);
        assert!(last.has_prev);
        assert!(!last.has_next);
    }

    #[test]
    fn window_handles_short_result_sets() {
        let w = page_window(30, 12, 2);
        assert_eq!(w.total_pages, 3);
        assert_eq!(w.pages, vec![1, 2, 3]);

        let empty = page_window(0, 12, 1);
        assert_eq!(empty.total_pages, 1);
        assert_eq!(empty.pages, vec![1]);
        assert!(!empty.has_prev);
        assert!(!empty.has_next);
    }

    #[test]
    fn out_of_range_page_is_clamped() {
        let w = page_window(24, 12, 99);
        assert_eq!(w.current, 2);
        assert!(!w.has_next);
    }
}
