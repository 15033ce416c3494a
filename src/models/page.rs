use serde::Serialize;

/// Paginated list envelope.
#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<u32>,
    pub previous: Option<u32>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap one page of `results` out of `count` total matches.
    pub fn new(count: u64, page: u32, page_size: u32, results: Vec<T>) -> Self {
        let seen = u64::from(page.saturating_sub(1)) * u64::from(page_size) + results.len() as u64;
        Self {
            count,
            next: (seen < count && !results.is_empty()).then_some(page + 1),
            previous: (page > 1).then(|| page - 1),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_follow_position_in_result_set() {
        let first = Page::new(45, 1, 20, vec![0; 20]);
        assert_eq!((first.next, first.previous), (Some(2), None));

        let last = Page::new(45, 3, 20, vec![0; 5]);
        assert_eq!((last.next, last.previous), (None, Some(2)));

        let past_end: Page<u8> = Page::new(45, 9, 20, vec![]);
        assert_eq!((past_end.next, past_end.previous), (None, Some(8)));
    }
}
