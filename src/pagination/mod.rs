use serde::Serialize;

/// Posts shown per listing page
pub const POSTS_PER_PAGE: usize = 10;

/// A bounded slice of an ordered collection plus enough metadata to render
/// "page N of M" and next/previous links.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Slices an ordered sequence into fixed-size pages.
///
/// The page parameter comes straight from the query string: absent,
/// non-numeric, zero or negative values fall back to the first page, and
/// values past the end clamp to the last page. An empty sequence still
/// yields one (empty) page.
pub struct Paginator<T> {
    items: Vec<T>,
    per_page: usize,
}

impl<T> Paginator<T> {
    pub fn new(items: Vec<T>, per_page: usize) -> Self {
        debug_assert!(per_page > 0);
        Self { items, per_page }
    }

    pub fn num_pages(&self) -> usize {
        if self.items.is_empty() {
            1
        } else {
            self.items.len().div_ceil(self.per_page)
        }
    }

    pub fn get_page(self, page_param: Option<&str>) -> Page<T> {
        let num_pages = self.num_pages();
        let requested = page_param
            .and_then(|p| p.trim().parse::<usize>().ok())
            .filter(|&p| p >= 1)
            .unwrap_or(1);
        let number = requested.min(num_pages);

        let count = self.items.len();
        let start = (number - 1) * self.per_page;
        let items: Vec<T> = self
            .items
            .into_iter()
            .skip(start)
            .take(self.per_page)
            .collect();

        Page {
            items,
            number,
            num_pages,
            count,
            has_next: number < num_pages,
            has_previous: number > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages_of(count: usize, per_page: usize, param: Option<&str>) -> Page<usize> {
        Paginator::new((0..count).collect(), per_page).get_page(param)
    }

    #[test]
    fn test_empty_sequence_yields_one_empty_page() {
        let page = pages_of(0, 10, None);
        assert_eq!(page.items.len(), 0);
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_fifteen_items_split_ten_five() {
        let first = pages_of(15, 10, None);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.num_pages, 2);
        assert!(first.has_next);
        assert!(!first.has_previous);

        let second = pages_of(15, 10, Some("2"));
        assert_eq!(second.items.len(), 5);
        assert_eq!(second.items[0], 10);
        assert!(!second.has_next);
        assert!(second.has_previous);
    }

    #[test]
    fn test_exact_multiple_keeps_last_page_full() {
        let page = pages_of(20, 10, Some("2"));
        assert_eq!(page.num_pages, 2);
        assert_eq!(page.items.len(), 10);
        assert!(!page.has_next);
    }

    #[test]
    fn test_invalid_parameter_falls_back_to_first_page() {
        for param in [Some("abc"), Some("-1"), Some("0"), Some(""), None] {
            let page = pages_of(15, 10, param);
            assert_eq!(page.number, 1, "param {:?}", param);
            assert_eq!(page.items.len(), 10);
        }
    }

    #[test]
    fn test_out_of_range_clamps_to_last_page() {
        let page = pages_of(15, 10, Some("99"));
        assert_eq!(page.number, 2);
        assert_eq!(page.items.len(), 5);
    }

    #[test]
    fn test_last_page_never_empty_when_items_exist() {
        for count in 1..=25usize {
            let pager = Paginator::new((0..count).collect::<Vec<_>>(), 10);
            let last = pager.num_pages();
            let page = pages_of(count, 10, Some(&last.to_string()));
            assert!(
                !page.items.is_empty() && page.items.len() <= 10,
                "count {}",
                count
            );
        }
    }
}
