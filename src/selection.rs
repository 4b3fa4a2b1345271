use crate::error::{Error, Result};
use crate::models::PdfPage;

#[derive(Debug, Clone, PartialEq)]
pub struct Selection<T> {
    items: Vec<T>,
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Selection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, items: impl IntoIterator<Item = T>) {
        self.items = items.into_iter().collect();
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        self.items.extend(items);
    }

    pub fn remove(&mut self, index: usize) -> Result<T> {
        self.check(index)?;
        Ok(self.items.remove(index))
    }

    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        let item = self.items.remove(from);
        self.items.insert(to, item);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    fn check(&self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }
}

impl<'a, T> IntoIterator for &'a Selection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> FromIterator<T> for Selection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Flips the selection of `page_number`. Returns false if no such page.
pub fn toggle_page(pages: &mut [PdfPage], page_number: u32) -> bool {
    match pages.iter_mut().find(|p| p.page_number == page_number) {
        Some(page) => {
            page.is_selected = !page.is_selected;
            true
        }
        None => false,
    }
}

pub fn selected_pages(pages: &[PdfPage]) -> Vec<u32> {
    pages
        .iter()
        .filter(|p| p.is_selected)
        .map(|p| p.page_number)
        .collect()
}
