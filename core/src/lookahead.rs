//! Two-ahead buffering shared by the token stream and the block readers.
//!
//! Keeping the item after `current` materialized lets callers tell whether
//! `current` is the last item of a run (e.g. the last token of a document)
//! without having to look back.

use crate::error::Result;

/// A forward-only producer of items. `Ok(None)` means the source is exhausted for good.
pub trait Source {
    type Item;

    fn produce(&mut self) -> Result<Option<Self::Item>>;
}

enum Window<T> {
    Empty,
    HasOne(T),
    HasTwo(T, T),
}

pub struct Lookahead<S: Source> {
    source: S,
    window: Window<S::Item>,
    exhausted: bool,
}

impl<S: Source> Lookahead<S> {
    /// Primes the window with up to two items.
    pub fn new(source: S) -> Result<Self> {
        let mut lookahead = Self {
            source,
            window: Window::Empty,
            exhausted: false,
        };
        lookahead.fill()?;
        Ok(lookahead)
    }

    fn pull(&mut self) -> Result<Option<S::Item>> {
        if self.exhausted {
            return Ok(None);
        }
        let item = self.source.produce()?;
        if item.is_none() {
            self.exhausted = true;
        }
        Ok(item)
    }

    fn fill(&mut self) -> Result<()> {
        loop {
            let window = std::mem::replace(&mut self.window, Window::Empty);
            self.window = match window {
                Window::Empty => match self.pull()? {
                    Some(first) => Window::HasOne(first),
                    None => return Ok(()),
                },
                Window::HasOne(first) => match self.pull()? {
                    Some(second) => Window::HasTwo(first, second),
                    None => {
                        self.window = Window::HasOne(first);
                        return Ok(());
                    }
                },
                full @ Window::HasTwo(..) => {
                    self.window = full;
                    return Ok(());
                }
            };
        }
    }

    /// The item the next call to [`Lookahead::next`] returns.
    pub fn current(&self) -> Option<&S::Item> {
        match &self.window {
            Window::Empty => None,
            Window::HasOne(first) | Window::HasTwo(first, _) => Some(first),
        }
    }

    /// The item after `current`.
    pub fn peek_second(&self) -> Option<&S::Item> {
        match &self.window {
            Window::HasTwo(_, second) => Some(second),
            _ => None,
        }
    }

    pub fn has_next(&self) -> bool {
        !matches!(self.window, Window::Empty)
    }

    pub fn next(&mut self) -> Result<Option<S::Item>> {
        let window = std::mem::replace(&mut self.window, Window::Empty);
        let item = match window {
            Window::Empty => return Ok(None),
            Window::HasOne(first) => first,
            Window::HasTwo(first, second) => {
                self.window = Window::HasOne(second);
                first
            }
        };
        self.fill()?;
        Ok(Some(item))
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        next: u32,
        end: u32,
        calls: usize,
    }

    impl Source for Counter {
        type Item = u32;

        fn produce(&mut self) -> Result<Option<u32>> {
            self.calls += 1;
            if self.next >= self.end {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(self.next))
        }
    }

    fn counter(end: u32) -> Counter {
        Counter { next: 0, end, calls: 0 }
    }

    #[test]
    fn keeps_two_items_materialized() {
        let mut la = Lookahead::new(counter(3)).unwrap();
        assert_eq!(la.current(), Some(&1));
        assert_eq!(la.peek_second(), Some(&2));
        assert_eq!(la.next().unwrap(), Some(1));
        assert_eq!(la.current(), Some(&2));
        assert_eq!(la.peek_second(), Some(&3));
        assert_eq!(la.next().unwrap(), Some(2));
        assert_eq!(la.peek_second(), None);
        assert!(la.has_next());
        assert_eq!(la.next().unwrap(), Some(3));
        assert!(!la.has_next());
        assert_eq!(la.next().unwrap(), None);
    }

    #[test]
    fn empty_source_has_nothing() {
        let la = Lookahead::new(counter(0)).unwrap();
        assert!(!la.has_next());
        assert!(la.current().is_none());
    }

    #[test]
    fn source_is_not_polled_after_exhaustion() {
        let mut la = Lookahead::new(counter(1)).unwrap();
        while la.next().unwrap().is_some() {}
        let calls = la.source().calls;
        assert_eq!(la.next().unwrap(), None);
        assert_eq!(la.source().calls, calls);
    }
}
