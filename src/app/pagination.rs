//! Page-number pagination over ordered sequences.
//!
//! Page requests are forgiving: a missing or non-numeric page gives the first
//! page, any out-of-range number gives the last one, and an empty sequence
//! still has a single (empty) page.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    count: usize,
    per_page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Paginator {
    pub fn new(count: usize, per_page: usize) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn num_pages(&self) -> usize {
        if self.count == 0 {
            1
        } else {
            self.count.div_ceil(self.per_page)
        }
    }

    /// Maps the raw `page` query value to a valid page number.
    pub fn resolve(&self, raw: Option<&str>) -> usize {
        let Some(raw) = raw.map(str::trim) else {
            return 1;
        };
        let digits = raw.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(raw);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return 1;
        }
        match raw.parse::<i64>() {
            Ok(number) if number >= 1 && (number as u64) <= self.num_pages() as u64 => {
                number as usize
            }
            // integral but out of range, including values too large to parse
            _ => self.num_pages(),
        }
    }

    /// Offset/limit for fetching `number` from the source.
    pub fn window(&self, number: usize) -> Window {
        Window {
            offset: number.saturating_sub(1) * self.per_page,
            limit: self.per_page,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub object_list: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub per_page: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<usize>,
    pub previous_page_number: Option<usize>,
    pub start_index: usize,
    pub end_index: usize,
}

impl<T> Page<T> {
    /// Wraps the items fetched for `number` through [`Paginator::window`].
    pub fn new(object_list: Vec<T>, number: usize, paginator: &Paginator) -> Self {
        let num_pages = paginator.num_pages();
        let count = paginator.count();
        let per_page = paginator.per_page();
        let has_next = number < num_pages;
        let has_previous = number > 1;
        let (start_index, end_index) = if count == 0 {
            (0, 0)
        } else if number == num_pages {
            ((number - 1) * per_page + 1, count)
        } else {
            ((number - 1) * per_page + 1, number * per_page)
        };

        Self {
            object_list,
            number,
            num_pages,
            count,
            per_page,
            has_next,
            has_previous,
            next_page_number: has_next.then(|| number + 1),
            previous_page_number: has_previous.then(|| number - 1),
            start_index,
            end_index,
        }
    }

    /// Paginates an already materialised sequence.
    pub fn from_slice(items: Vec<T>, per_page: usize, raw: Option<&str>) -> Self {
        let paginator = Paginator::new(items.len(), per_page);
        let number = paginator.resolve(raw);
        let window = paginator.window(number);
        let object_list = items
            .into_iter()
            .skip(window.offset)
            .take(window.limit)
            .collect();
        Self::new(object_list, number, &paginator)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            object_list: self.object_list.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            per_page: self.per_page,
            has_next: self.has_next,
            has_previous: self.has_previous,
            next_page_number: self.next_page_number,
            previous_page_number: self.previous_page_number,
            start_index: self.start_index,
            end_index: self.end_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(n: usize) -> Vec<usize> {
        (1..=n).collect()
    }

    #[test]
    fn thirteen_items_split_ten_and_three() {
        let first = Page::from_slice(numbers(13), 10, None);
        assert_eq!(first.object_list.len(), 10);
        assert_eq!(first.num_pages, 2);
        assert!(first.has_next);
        assert_eq!(first.next_page_number, Some(2));

        let second = Page::from_slice(numbers(13), 10, Some("2"));
        assert_eq!(second.object_list, vec![11, 12, 13]);
        assert!(!second.has_next);
        assert!(second.has_previous);
        assert_eq!((second.start_index, second.end_index), (11, 13));
    }

    #[test]
    fn exact_multiple_has_no_trailing_page() {
        let page = Page::from_slice(numbers(20), 10, Some("2"));
        assert_eq!(page.num_pages, 2);
        assert_eq!(page.object_list.len(), 10);
        assert!(!page.has_next);
    }

    #[test]
    fn empty_sequence_has_one_empty_page() {
        let page = Page::<usize>::from_slice(Vec::new(), 10, Some("5"));
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(page.object_list.is_empty());
        assert_eq!((page.start_index, page.end_index), (0, 0));
    }

    #[test]
    fn forgiving_page_numbers() {
        let paginator = Paginator::new(25, 10);
        assert_eq!(paginator.resolve(None), 1);
        assert_eq!(paginator.resolve(Some("abc")), 1);
        assert_eq!(paginator.resolve(Some("")), 1);
        assert_eq!(paginator.resolve(Some("1.5")), 1);
        assert_eq!(paginator.resolve(Some(" 2 ")), 2);
        assert_eq!(paginator.resolve(Some("0")), 3);
        assert_eq!(paginator.resolve(Some("-4")), 3);
        assert_eq!(paginator.resolve(Some("999")), 3);
        assert_eq!(paginator.resolve(Some("99999999999999999999999")), 3);
    }

    #[test]
    fn huge_page_size_does_not_overflow() {
        let paginator = Paginator::new(3, usize::MAX);
        assert_eq!(paginator.num_pages(), 1);
        assert_eq!(paginator.resolve(Some("7")), 1);
        assert_eq!(paginator.window(1), Window { offset: 0, limit: usize::MAX });

        let page = Page::from_slice(numbers(3), usize::MAX, None);
        assert_eq!(page.object_list, vec![1, 2, 3]);
        assert!(!page.has_next);
        assert_eq!((page.start_index, page.end_index), (1, 3));
    }

    #[test]
    fn window_matches_page_slice() {
        let paginator = Paginator::new(25, 10);
        assert_eq!(paginator.window(3), Window { offset: 20, limit: 10 });
    }
}
