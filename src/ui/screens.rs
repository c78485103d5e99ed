use std::fmt;

/// A selectable list backing one tab. Rows are re-fetched from the database
/// after every change, so the screen only has to keep the cursor sane.
pub(crate) struct ListScreen<T> {
    pub(crate) items: Vec<T>,
    pub(crate) selected: usize,
    /// Search term the rows were fetched with, if any.
    pub(crate) filter: Option<String>,
}

impl<T> ListScreen<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        let mut screen = Self {
            items,
            selected: 0,
            filter: None,
        };
        screen.ensure_in_bounds();
        screen
    }

    pub(crate) fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.ensure_in_bounds();
    }

    pub(crate) fn current(&self) -> Option<&T> {
        self.items.get(self.selected)
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        if self.is_empty() {
            return;
        }
        let len = self.items.len() as isize;
        let new = (self.selected as isize + offset).clamp(0, len - 1);
        self.selected = new as usize;
    }

    pub(crate) fn select_first(&mut self) {
        self.selected = 0;
    }

    pub(crate) fn select_last(&mut self) {
        if !self.items.is_empty() {
            self.selected = self.items.len() - 1;
        }
    }

    pub(crate) fn ensure_in_bounds(&mut self) {
        if self.items.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.items.len() {
            self.selected = self.items.len() - 1;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for ListScreen<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Top-level tabs, in display order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Tab {
    Books,
    Users,
    Loans,
    Overdue,
    History,
    Reports,
}

impl Tab {
    pub(crate) const ALL: [Tab; 6] = [
        Tab::Books,
        Tab::Users,
        Tab::Loans,
        Tab::Overdue,
        Tab::History,
        Tab::Reports,
    ];

    pub(crate) fn index(self) -> usize {
        Tab::ALL.iter().position(|tab| *tab == self).unwrap_or(0)
    }

    pub(crate) fn from_digit(ch: char) -> Option<Tab> {
        let idx = ch.to_digit(10)? as usize;
        idx.checked_sub(1).and_then(|i| Tab::ALL.get(i).copied())
    }

    pub(crate) fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub(crate) fn previous(self) -> Tab {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }

    /// Tabs whose rows can be narrowed with `/`.
    pub(crate) fn is_searchable(self) -> bool {
        matches!(self, Tab::Books | Tab::Users)
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tab::Books => "Books",
            Tab::Users => "Users",
            Tab::Loans => "Loans",
            Tab::Overdue => "Overdue",
            Tab::History => "History",
            Tab::Reports => "Reports",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_clamped() {
        let mut screen = ListScreen::new(vec!["a", "b", "c"]);
        screen.move_selection(10);
        assert_eq!(screen.current(), Some(&"c"));
        screen.move_selection(-10);
        assert_eq!(screen.current(), Some(&"a"));
        screen.select_last();
        screen.set_items(vec!["a"]);
        assert_eq!(screen.selected, 0);
    }

    #[test]
    fn empty_screen_has_no_selection() {
        let mut screen: ListScreen<i32> = ListScreen::default();
        screen.move_selection(1);
        screen.select_last();
        assert_eq!(screen.current(), None);
        assert!(screen.is_empty());
    }

    #[test]
    fn tabs_cycle_and_map_digits() {
        assert_eq!(Tab::Reports.next(), Tab::Books);
        assert_eq!(Tab::Books.previous(), Tab::Reports);
        assert_eq!(Tab::from_digit('3'), Some(Tab::Loans));
        assert_eq!(Tab::from_digit('0'), None);
        assert_eq!(Tab::from_digit('7'), None);
    }
}
