//! Page cursors for `select-paginating`.
//!
//! Both cursors move forward one page per call and wrap to the start of the
//! table after a short page, so a long benchmark keeps sampling real pages.

/// Offset-style cursor: skips the rows already seen.
#[derive(Debug, Clone)]
pub struct OffsetCursor {
    page_size: usize,
    offset: usize,
}

impl OffsetCursor {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            offset: 0,
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    pub fn offset(&self) -> i64 {
        self.offset as i64
    }

    /// Move past a page that returned `rows` rows.
    pub fn advance(&mut self, rows: usize) {
        if rows < self.page_size {
            self.offset = 0;
        } else {
            self.offset += rows;
        }
    }
}

/// Keyset cursor: selects rows with a key above the last one seen.
#[derive(Debug, Clone)]
pub struct KeysetCursor {
    page_size: usize,
    after: i64,
}

impl KeysetCursor {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            after: 0,
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    /// Exclusive lower bound of the next page's keys.
    pub fn after(&self) -> i64 {
        self.after
    }

    /// Move past a page with the given keys.
    pub fn advance(&mut self, keys: impl IntoIterator<Item = i64>) {
        let mut count = 0;
        let mut max = self.after;
        for key in keys {
            count += 1;
            max = max.max(key);
        }
        self.after = if count < self.page_size { 0 } else { max };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyset_page(table: &[i64], cursor: &KeysetCursor) -> Vec<i64> {
        table
            .iter()
            .copied()
            .filter(|id| *id > cursor.after())
            .take(cursor.limit() as usize)
            .collect()
    }

    fn offset_page(table: &[i64], cursor: &OffsetCursor) -> Vec<i64> {
        table
            .iter()
            .copied()
            .skip(cursor.offset() as usize)
            .take(cursor.limit() as usize)
            .collect()
    }

    #[test]
    fn test_keyset_pages_are_strictly_increasing() {
        let table: Vec<i64> = (1..=100).collect();
        let mut cursor = KeysetCursor::new(10);
        let mut previous: Option<Vec<i64>> = None;

        for _ in 0..10 {
            let page = keyset_page(&table, &cursor);
            assert_eq!(page.len(), 10);
            if let Some(prev) = &previous {
                assert!(page.iter().min() > prev.iter().max());
            }
            cursor.advance(page.iter().copied());
            previous = Some(page);
        }
    }

    #[test]
    fn test_keyset_wraps_after_short_page() {
        let table: Vec<i64> = (1..=25).collect();
        let mut cursor = KeysetCursor::new(10);

        for _ in 0..2 {
            let page = keyset_page(&table, &cursor);
            cursor.advance(page);
        }
        assert_eq!(cursor.after(), 20);

        let last = keyset_page(&table, &cursor);
        assert_eq!(last, vec![21, 22, 23, 24, 25]);
        cursor.advance(last);
        assert_eq!(cursor.after(), 0);
    }

    #[test]
    fn test_keyset_skips_gaps() {
        let table = vec![3, 8, 15, 16, 40, 41];
        let mut cursor = KeysetCursor::new(2);
        let first = keyset_page(&table, &cursor);
        cursor.advance(first.iter().copied());
        let second = keyset_page(&table, &cursor);
        assert_eq!(first, vec![3, 8]);
        assert_eq!(second, vec![15, 16]);
    }

    #[test]
    fn test_offset_pages_advance() {
        let table: Vec<i64> = (1..=30).collect();
        let mut cursor = OffsetCursor::new(10);

        let first = offset_page(&table, &cursor);
        cursor.advance(first.len());
        let second = offset_page(&table, &cursor);
        cursor.advance(second.len());

        assert_eq!(first[0], 1);
        assert_eq!(second[0], 11);
        assert_ne!(first, second);
        assert_eq!(cursor.offset(), 20);
    }

    #[test]
    fn test_offset_wraps_at_end() {
        let table: Vec<i64> = (1..=20).collect();
        let mut cursor = OffsetCursor::new(10);

        for _ in 0..2 {
            let page = offset_page(&table, &cursor);
            cursor.advance(page.len());
        }
        let empty = offset_page(&table, &cursor);
        assert!(empty.is_empty());
        cursor.advance(empty.len());
        assert_eq!(cursor.offset(), 0);
    }
}
