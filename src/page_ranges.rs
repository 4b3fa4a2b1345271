use crate::error::{Error, Result};
use std::fmt;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub const fn single(page: u32) -> Self {
        Self { start: page, end: page }
    }

    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start == 0 || end < start {
            return Err(Error::InvalidRange(format!("{start}-{end}")));
        }
        Ok(Self { start, end })
    }

    pub const fn pages(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }

    pub const fn page_count(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn check(&self, page_count: u32) -> Result<()> {
        if self.end > page_count {
            return Err(Error::PageOutOfRange {
                page: self.end,
                count: page_count,
            });
        }
        Ok(())
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Parses `"1-3, 5, 7-"` against a document of `page_count` pages.
/// An open end (`7-`) runs to the last page.
pub fn parse_ranges(input: &str, page_count: u32) -> Result<Vec<PageRange>> {
    let mut ranges = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let range = match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_page(start, part)?;
                let end = if end.trim().is_empty() {
                    page_count
                } else {
                    parse_page(end, part)?
                };
                PageRange::new(start, end).map_err(|_| Error::InvalidRange(part.to_string()))?
            }
            None => {
                let page = parse_page(part, part)?;
                PageRange::new(page, page).map_err(|_| Error::InvalidRange(part.to_string()))?
            }
        };
        range.check(page_count)?;
        ranges.push(range);
    }

    if ranges.is_empty() {
        return Err(Error::NoPagesSelected);
    }
    Ok(ranges)
}

fn parse_page(text: &str, part: &str) -> Result<u32> {
    text.trim()
        .parse::<u32>()
        .map_err(|_| Error::InvalidRange(part.to_string()))
}

pub fn each_page(pages: impl IntoIterator<Item = u32>) -> Vec<PageRange> {
    let mut pages: Vec<u32> = pages.into_iter().filter(|&p| p > 0).collect();
    pages.sort_unstable();
    pages.dedup();
    pages.into_iter().map(PageRange::single).collect()
}
