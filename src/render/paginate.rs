use thiserror::Error;

use super::truncate::Fence;

/// One outbound message, already fenced and within the page budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage(String);

impl RenderedPage {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginateError {
    #[error("page prefix of {len} characters does not fit the {budget}-character message budget")]
    PrefixTooLong { len: usize, budget: usize },

    #[error("row of {len} characters does not fit the {budget}-character message budget")]
    LineTooLong { len: usize, budget: usize },
}

/// Packs lines into fenced pages in arrival order, never splitting a line.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    budget: usize,
    fence: Fence,
}

impl Paginator {
    pub fn new(budget: usize, fence: Fence) -> Self {
        Self { budget, fence }
    }

    /// The first page opens with `prefix`; later pages only re-open the fence.
    pub fn paginate<S: AsRef<str>>(
        &self,
        prefix: &str,
        lines: &[S],
    ) -> Result<Vec<RenderedPage>, PaginateError> {
        let opening = self.fence.opening();
        let opening_len = opening.chars().count();
        // "\n" + closing marker
        let closing_len = 1 + self.fence.closing().chars().count();

        let mut current = if prefix.is_empty() {
            opening.clone()
        } else {
            format!("{opening}\n{prefix}")
        };
        let mut used = current.chars().count();
        if used + closing_len > self.budget {
            return Err(PaginateError::PrefixTooLong {
                len: used,
                budget: self.budget,
            });
        }

        let mut pages = Vec::new();
        for line in lines {
            let line = line.as_ref();
            let len = line.chars().count();
            if opening_len + 1 + len + closing_len > self.budget {
                return Err(PaginateError::LineTooLong {
                    len,
                    budget: self.budget,
                });
            }

            if used + 1 + len + closing_len > self.budget {
                pages.push(self.close(current));
                current = opening.clone();
                used = opening_len;
            }

            current.push('\n');
            current.push_str(line);
            used += 1 + len;
        }
        pages.push(self.close(current));

        Ok(pages)
    }

    fn close(&self, mut page: String) -> RenderedPage {
        page.push('\n');
        page.push_str(self.fence.closing());
        RenderedPage(page)
    }
}

#[cfg(test)]
mod tests {
    use super::{PaginateError, Paginator};
    use crate::render::Fence;
    use proptest::prelude::*;

    #[test]
    fn small_table_fits_one_page() {
        let pages = Paginator::new(2000, Fence::PLAIN)
            .paginate("id\n--", &["1", "2"])
            .expect("paginate");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].as_str(), "```\nid\n--\n1\n2\n```");
    }

    #[test]
    fn later_pages_reopen_fence_without_prefix() {
        // "```\nhdr" is 7, each row adds 6, closing adds 4.
        let pages = Paginator::new(24, Fence::PLAIN)
            .paginate("hdr", &["row-1", "row-2", "row-3", "row-4"])
            .expect("paginate");
        let texts: Vec<&str> = pages.iter().map(|page| page.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "```\nhdr\nrow-1\nrow-2\n```",
                "```\nrow-3\nrow-4\n```",
            ]
        );
        assert!(texts.iter().all(|text| text.chars().count() <= 24));
    }

    #[test]
    fn exact_fit_stays_on_page() {
        let pages = Paginator::new(12, Fence::PLAIN)
            .paginate("", &["abcd"])
            .expect("paginate");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].as_str().chars().count(), 12);
    }

    #[test]
    fn oversized_row_is_rejected_not_split() {
        let err = Paginator::new(20, Fence::PLAIN)
            .paginate("h", &["x".repeat(30)])
            .expect_err("row cannot fit");
        assert_eq!(err, PaginateError::LineTooLong { len: 30, budget: 20 });
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let err = Paginator::new(10, Fence::PLAIN)
            .paginate("a very long header", &["1"])
            .expect_err("prefix cannot fit");
        assert!(matches!(err, PaginateError::PrefixTooLong { .. }));
    }

    proptest! {
        #[test]
        fn pages_reconstruct_rows_in_order(
            lines in proptest::collection::vec("[a-z |]{0,40}", 0..60),
            budget in 60usize..400,
        ) {
            let pages = Paginator::new(budget, Fence::PLAIN)
                .paginate("header", &lines)
                .expect("every row fits a fresh page");

            let mut rebuilt: Vec<String> = Vec::new();
            for (idx, page) in pages.iter().enumerate() {
                prop_assert!(page.as_str().chars().count() <= budget);
                let body: Vec<&str> = page.as_str().split('\n').collect();
                prop_assert_eq!(body[0], "```");
                prop_assert_eq!(*body.last().expect("closing line"), "```");
                let skip = if idx == 0 { 2 } else { 1 };
                prop_assert!(idx != 0 || body[1] == "header");
                rebuilt.extend(body[skip..body.len() - 1].iter().map(|line| (*line).to_string()));
            }
            prop_assert_eq!(rebuilt, lines);
        }
    }
}
