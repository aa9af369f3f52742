use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub page_count: usize,
}

/// Slices `items` into the requested page. Pages past the end come back empty.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total_items = items.len();
    let page_count = total_items.div_ceil(page_size);

    let items = items
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    Page {
        items,
        page,
        page_size,
        total_items,
        page_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_three_rows_make_three_pages() {
        let rows: Vec<u32> = (1..=23).collect();

        let last = paginate(rows.clone(), 3, DEFAULT_PAGE_SIZE);
        assert_eq!(last.page_count, 3);
        assert_eq!(last.items, vec![21, 22, 23]);

        let first = paginate(rows.clone(), 1, DEFAULT_PAGE_SIZE);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0], 1);

        let beyond = paginate(rows, 4, DEFAULT_PAGE_SIZE);
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_items, 23);
    }

    #[test]
    fn clamps_page_and_size() {
        let page = paginate(vec!['a', 'b'], 0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.items, vec!['a']);
        assert_eq!(page.page_count, 2);

        let empty = paginate(Vec::<u8>::new(), 1, 10);
        assert_eq!(empty.page_count, 0);
    }
}
