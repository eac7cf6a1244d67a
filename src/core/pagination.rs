//! Page-number pagination with clamping.
//!
//! Out-of-range page numbers never fail: anything that is not a number
//! means the first page, numbers past the end mean the last page.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Paginator {
    pub count: usize,
    pub per_page: usize,
    pub num_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub number: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub items: Vec<T>,
}

impl Paginator {
    pub fn new(count: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        // An empty listing still has one (empty) page.
        let num_pages = count.div_ceil(per_page).max(1);
        Paginator {
            count,
            per_page,
            num_pages,
        }
    }

    /// Resolves a raw page parameter to a valid 1-based page number.
    pub fn clamp(&self, raw: Option<&str>) -> usize {
        let requested = raw.and_then(|r| r.trim().parse::<i64>().ok()).unwrap_or(1);
        if requested < 1 {
            1
        } else {
            (requested as usize).min(self.num_pages)
        }
    }

    /// Slices `items` (the whole listing, already ordered) to the requested page.
    pub fn get_page<T>(&self, items: Vec<T>, raw: Option<&str>) -> Page<T> {
        let number = self.clamp(raw);
        let start = (number - 1) * self.per_page;
        let items = items.into_iter().skip(start).take(self.per_page).collect();
        Page {
            number,
            has_next: number < self.num_pages,
            has_previous: number > 1,
            items,
        }
    }
}

/// Paginates a full listing in one step.
pub fn paginate<T>(items: Vec<T>, per_page: usize, raw: Option<&str>) -> (Page<T>, Paginator) {
    let paginator = Paginator::new(items.len(), per_page);
    let page = paginator.get_page(items, raw);
    (page, paginator)
}
