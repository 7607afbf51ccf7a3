//! Category registration and row dispatch.
//!
//! A category is a named table with an ordered set of registered keywords
//! (columns) and a [`CategoryHandler`] receiving its rows. Both the text and
//! binary paths funnel values into per-keyword slots here and fire the same
//! row callback, so a handler cannot tell the two serializations apart.
//!
//! Lookups are case-insensitive over lazily sorted index vectors: files
//! carry tens of categories with at most a few dozen keywords each, so flat
//! sorted arrays with binary search beat hashing.

use std::cmp::Ordering;
use std::str;

use tracing::debug;

use crate::error::Error;

/// Declared type of a keyword's cells.
///
/// Text files always deliver strings; binary columns may carry native
/// integers or floats, and are coerced to the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Str,
    Int,
    Float,
}

/// Handle to a registered category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryHandle(pub(crate) usize);

/// Per-category callbacks. The implementor is the category state; dropping
/// the reader (or calling `clear_categories`) releases it.
pub trait CategoryHandler {
    /// One row of data. Borrowed cells are valid only until this returns.
    fn row(&mut self, row: &Row<'_>) -> Result<(), Error>;

    /// A `save_` frame closed (text only).
    fn end_save_frame(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// The data block ended.
    fn finalize(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Hook for category names present in the file but never registered.
/// Receives the name and the 1-based line number (0 in binary mode).
pub type UnknownCategoryHook = Box<dyn FnMut(&str, u32) -> Result<(), Error>>;

/// Hook for keywords of a registered category that were never registered.
/// Receives the category name, the keyword name, and the line number.
pub type UnknownKeywordHook = Box<dyn FnMut(&str, &str, u32) -> Result<(), Error>>;

/// A single keyword cell as seen by the row callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    /// The keyword did not appear since the last row.
    Missing,
    /// The literal `.`: the value is inapplicable.
    Omitted,
    /// The literal `?`: the value is unknown.
    Unknown,
    Str(&'a str),
    Int(i32),
    Float(f64),
}

impl<'a> Cell<'a> {
    /// True if the keyword appeared at all, including as `.` or `?`.
    pub fn in_file(&self) -> bool {
        !matches!(self, Cell::Missing)
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self, Cell::Omitted)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Cell::Unknown)
    }

    /// The string content, or `None` for anything that is not a string cell.
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Reads the cell as `i32`, parsing string cells.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Cell::Int(v) => Some(v),
            Cell::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Reads the cell as `f64`.
    ///
    /// String cells may carry CIF uncertainty notation like `50.123(4)`;
    /// the parenthesized part is stripped before parsing.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Cell::Float(v) => Some(v),
            Cell::Int(v) => Some(v as f64),
            Cell::Str(s) => {
                let s = match s.find('(') {
                    Some(i) => &s[..i],
                    None => s,
                };
                s.parse().ok()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum SlotValue {
    #[default]
    None,
    /// Byte span into the line passed to `Registry::fire_row`.
    Borrowed(usize, usize),
    /// The cell lives in the slot's own buffer.
    Owned,
    Int(i32),
    Float(f64),
}

/// Per-read state of one keyword. Values persist from the first observation
/// in a row until the row callback returns.
#[derive(Debug, Default)]
struct Slot {
    in_file: bool,
    omitted: bool,
    unknown: bool,
    value: SlotValue,
    /// Reusable owned storage for copied string cells.
    buf: String,
}

impl Slot {
    fn clear(&mut self) {
        self.in_file = false;
        self.omitted = false;
        self.unknown = false;
        self.value = SlotValue::None;
        self.buf.clear();
    }

    fn set_omitted(&mut self) {
        self.in_file = true;
        self.omitted = true;
        self.unknown = false;
        self.value = SlotValue::None;
    }

    fn set_unknown(&mut self) {
        self.in_file = true;
        self.omitted = false;
        self.unknown = true;
        self.value = SlotValue::None;
    }

    fn set_borrowed(&mut self, start: usize, end: usize) {
        self.in_file = true;
        self.omitted = false;
        self.unknown = false;
        self.value = SlotValue::Borrowed(start, end);
    }

    fn set_owned(&mut self, s: &str) {
        self.in_file = true;
        self.omitted = false;
        self.unknown = false;
        self.buf.clear();
        self.buf.push_str(s);
        self.value = SlotValue::Owned;
    }

    fn set_int(&mut self, v: i32) {
        self.in_file = true;
        self.omitted = false;
        self.unknown = false;
        self.value = SlotValue::Int(v);
    }

    fn set_float(&mut self, v: f64) {
        self.in_file = true;
        self.omitted = false;
        self.unknown = false;
        self.value = SlotValue::Float(v);
    }
}

#[derive(Debug)]
struct Keyword {
    name: String,
    cell_type: CellType,
    slot: Slot,
}

/// Ordered view of a category's keyword slots during a row callback.
pub struct Row<'a> {
    keywords: &'a [Keyword],
    line: &'a [u8],
}

impl<'a> Row<'a> {
    /// Number of registered keywords.
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// The cell for the keyword registered at `index` (registration order,
    /// as returned by `register_keyword`). Out-of-range indexes read as
    /// [`Cell::Missing`].
    pub fn get(&self, index: usize) -> Cell<'a> {
        let Some(kw) = self.keywords.get(index) else {
            return Cell::Missing;
        };
        let slot = &kw.slot;
        if slot.omitted {
            return Cell::Omitted;
        }
        if slot.unknown {
            return Cell::Unknown;
        }
        if !slot.in_file {
            return Cell::Missing;
        }
        match slot.value {
            SlotValue::None => Cell::Missing,
            SlotValue::Borrowed(a, b) => Cell::Str(
                self.line
                    .get(a..b)
                    .and_then(|s| str::from_utf8(s).ok())
                    .unwrap_or(""),
            ),
            SlotValue::Owned => Cell::Str(&kw.slot.buf),
            SlotValue::Int(v) => Cell::Int(v),
            SlotValue::Float(v) => Cell::Float(v),
        }
    }
}

struct Category {
    name: String,
    handler: Box<dyn CategoryHandler>,
    keywords: Vec<Keyword>,
    /// Keyword indices ordered for case-insensitive binary search.
    lookup: Vec<usize>,
    lookup_dirty: bool,
}

/// Member-wise ASCII-lowercase comparison.
fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    let lhs = a.bytes().map(|c| c.to_ascii_lowercase());
    let rhs = b.bytes().map(|c| c.to_ascii_lowercase());
    lhs.cmp(rhs)
}

/// All categories registered with a reader, plus the unknown-name hooks.
pub(crate) struct Registry {
    categories: Vec<Category>,
    lookup: Vec<usize>,
    lookup_dirty: bool,
    unknown_category: Option<UnknownCategoryHook>,
    unknown_keyword: Option<UnknownKeywordHook>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            categories: Vec::new(),
            lookup: Vec::new(),
            lookup_dirty: false,
            unknown_category: None,
            unknown_keyword: None,
        }
    }

    /// Register a category. Re-registering a name replaces the earlier
    /// handler and drops its keywords.
    pub fn register_category(
        &mut self,
        name: &str,
        handler: Box<dyn CategoryHandler>,
    ) -> CategoryHandle {
        if let Some(i) = self
            .categories
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
        {
            debug!(category = name, "replacing category registration");
            let cat = &mut self.categories[i];
            cat.handler = handler;
            cat.keywords.clear();
            cat.lookup.clear();
            cat.lookup_dirty = false;
            return CategoryHandle(i);
        }
        self.categories.push(Category {
            name: name.to_owned(),
            handler,
            keywords: Vec::new(),
            lookup: Vec::new(),
            lookup_dirty: false,
        });
        self.lookup.push(self.categories.len() - 1);
        self.lookup_dirty = true;
        CategoryHandle(self.categories.len() - 1)
    }

    /// Register a keyword of `category`, returning its registration-order
    /// index for use with [`Row::get`]. Re-registering a name replaces the
    /// earlier entry in place.
    pub fn register_keyword(
        &mut self,
        category: CategoryHandle,
        name: &str,
        cell_type: CellType,
    ) -> usize {
        let cat = &mut self.categories[category.0];
        let keyword = Keyword {
            name: name.to_owned(),
            cell_type,
            slot: Slot::default(),
        };
        if let Some(i) = cat
            .keywords
            .iter()
            .position(|k| k.name.eq_ignore_ascii_case(name))
        {
            cat.keywords[i] = keyword;
            return i;
        }
        cat.keywords.push(keyword);
        cat.lookup.push(cat.keywords.len() - 1);
        cat.lookup_dirty = true;
        cat.keywords.len() - 1
    }

    /// Drop every registered category (running their release hooks) and
    /// both unknown-name hooks.
    pub fn clear(&mut self) {
        self.categories.clear();
        self.lookup.clear();
        self.lookup_dirty = false;
        self.unknown_category = None;
        self.unknown_keyword = None;
    }

    pub fn set_unknown_category_hook(&mut self, hook: UnknownCategoryHook) {
        self.unknown_category = Some(hook);
    }

    pub fn set_unknown_keyword_hook(&mut self, hook: UnknownKeywordHook) {
        self.unknown_keyword = Some(hook);
    }

    pub fn notify_unknown_category(&mut self, name: &str, line: u32) -> Result<(), Error> {
        match &mut self.unknown_category {
            Some(hook) => hook(name, line),
            None => Ok(()),
        }
    }

    pub fn notify_unknown_keyword(
        &mut self,
        category: &str,
        keyword: &str,
        line: u32,
    ) -> Result<(), Error> {
        match &mut self.unknown_keyword {
            Some(hook) => hook(category, keyword, line),
            None => Ok(()),
        }
    }

    /// Case-insensitive category lookup. The sort is deferred until the
    /// first lookup after a registration.
    pub fn find_category(&mut self, name: &str) -> Option<usize> {
        if self.lookup_dirty {
            let cats = &self.categories;
            self.lookup
                .sort_by(|&a, &b| cmp_ignore_case(&cats[a].name, &cats[b].name));
            self.lookup_dirty = false;
        }
        let cats = &self.categories;
        self.lookup
            .binary_search_by(|&i| cmp_ignore_case(&cats[i].name, name))
            .ok()
            .map(|pos| self.lookup[pos])
    }

    /// Case-insensitive keyword lookup within a category.
    pub fn find_keyword(&mut self, ci: usize, name: &str) -> Option<usize> {
        let cat = &mut self.categories[ci];
        if cat.lookup_dirty {
            let kws = &cat.keywords;
            cat.lookup
                .sort_by(|&a, &b| cmp_ignore_case(&kws[a].name, &kws[b].name));
            cat.lookup_dirty = false;
        }
        let kws = &cat.keywords;
        cat.lookup
            .binary_search_by(|&i| cmp_ignore_case(&kws[i].name, name))
            .ok()
            .map(|pos| cat.lookup[pos])
    }

    pub fn category_name(&self, ci: usize) -> &str {
        &self.categories[ci].name
    }

    pub fn keyword_name(&self, ci: usize, ki: usize) -> &str {
        &self.categories[ci].keywords[ki].name
    }

    pub fn cell_type(&self, ci: usize, ki: usize) -> CellType {
        self.categories[ci].keywords[ki].cell_type
    }

    // -- slot setters -------------------------------------------------------
    // A later observation within the same row overwrites the earlier one.

    pub fn set_omitted(&mut self, ci: usize, ki: usize) {
        self.categories[ci].keywords[ki].slot.set_omitted();
    }

    pub fn set_unknown(&mut self, ci: usize, ki: usize) {
        self.categories[ci].keywords[ki].slot.set_unknown();
    }

    /// Store a byte span into the line that will be passed to `fire_row`.
    pub fn set_str_borrowed(&mut self, ci: usize, ki: usize, start: usize, end: usize) {
        self.categories[ci].keywords[ki].slot.set_borrowed(start, end);
    }

    /// Copy a string cell into the slot's own buffer.
    pub fn set_str_copied(&mut self, ci: usize, ki: usize, s: &str) {
        self.categories[ci].keywords[ki].slot.set_owned(s);
    }

    pub fn set_int(&mut self, ci: usize, ki: usize, v: i32) {
        self.categories[ci].keywords[ki].slot.set_int(v);
    }

    pub fn set_float(&mut self, ci: usize, ki: usize, v: f64) {
        self.categories[ci].keywords[ki].slot.set_float(v);
    }

    // -- dispatch -----------------------------------------------------------

    /// Invoke a category's row callback, then reset its keyword slots.
    /// Borrowed slot spans are resolved against `line`.
    pub fn fire_row(&mut self, ci: usize, line: &[u8]) -> Result<(), Error> {
        let cat = &mut self.categories[ci];
        let result = {
            let row = Row {
                keywords: &cat.keywords,
                line,
            };
            cat.handler.row(&row)
        };
        for kw in &mut cat.keywords {
            kw.slot.clear();
        }
        result
    }

    /// Fire the row callback only if at least one keyword saw data, then
    /// reset the slots either way.
    fn flush_pending(&mut self, ci: usize) -> Result<(), Error> {
        let has_data = self.categories[ci]
            .keywords
            .iter()
            .any(|k| k.slot.in_file);
        if has_data {
            self.fire_row(ci, b"")
        } else {
            for kw in &mut self.categories[ci].keywords {
                kw.slot.clear();
            }
            Ok(())
        }
    }

    /// A save frame closed: flush pending rows, then fire every category's
    /// frame callback.
    pub fn end_save_frame(&mut self) -> Result<(), Error> {
        for ci in 0..self.categories.len() {
            self.flush_pending(ci)?;
            self.categories[ci].handler.end_save_frame()?;
        }
        Ok(())
    }

    /// The data block ended: flush pending rows, then finalize every
    /// category.
    pub fn end_block(&mut self) -> Result<(), Error> {
        for ci in 0..self.categories.len() {
            self.flush_pending(ci)?;
            self.categories[ci].handler.finalize()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        ncols: usize,
        rows: Rc<RefCell<Vec<Vec<String>>>>,
    }

    impl CategoryHandler for Recorder {
        fn row(&mut self, row: &Row<'_>) -> Result<(), Error> {
            let cells = (0..self.ncols)
                .map(|i| match row.get(i) {
                    Cell::Missing => "<missing>".to_string(),
                    Cell::Omitted => "<omitted>".to_string(),
                    Cell::Unknown => "<unknown>".to_string(),
                    Cell::Str(s) => s.to_string(),
                    Cell::Int(v) => format!("int:{v}"),
                    Cell::Float(v) => format!("float:{v}"),
                })
                .collect();
            self.rows.borrow_mut().push(cells);
            Ok(())
        }
    }

    fn registry_with_two_keywords() -> (Registry, Rc<RefCell<Vec<Vec<String>>>>) {
        let rows = Rc::new(RefCell::new(Vec::new()));
        let mut reg = Registry::new();
        let cat = reg.register_category(
            "_Foo",
            Box::new(Recorder {
                ncols: 2,
                rows: rows.clone(),
            }),
        );
        reg.register_keyword(cat, "Bar", CellType::Str);
        reg.register_keyword(cat, "baz", CellType::Int);
        (reg, rows)
    }

    #[test]
    fn lookups_ignore_case() {
        let (mut reg, _rows) = registry_with_two_keywords();
        let ci = reg.find_category("_foo").expect("lowercase");
        assert_eq!(reg.find_category("_FOO"), Some(ci));
        let ki = reg.find_keyword(ci, "bar").expect("lowercase");
        assert_eq!(reg.find_keyword(ci, "BAR"), Some(ki));
        assert_eq!(reg.find_category("_missing"), None);
        assert_eq!(reg.find_keyword(ci, "nope"), None);
    }

    #[test]
    fn registration_after_lookup_is_found() {
        let (mut reg, rows) = registry_with_two_keywords();
        assert!(reg.find_category("_later").is_none());
        reg.register_category(
            "_later",
            Box::new(Recorder {
                ncols: 0,
                rows: rows.clone(),
            }),
        );
        assert!(reg.find_category("_LATER").is_some());
    }

    #[test]
    fn tri_state_is_exclusive() {
        let (mut reg, rows) = registry_with_two_keywords();
        let ci = reg.find_category("_foo").unwrap();
        reg.set_omitted(ci, 0);
        reg.set_unknown(ci, 1);
        reg.fire_row(ci, b"").unwrap();
        assert_eq!(rows.borrow()[0], vec!["<omitted>", "<unknown>"]);
    }

    #[test]
    fn slots_reset_after_each_row() {
        let (mut reg, rows) = registry_with_two_keywords();
        let ci = reg.find_category("_foo").unwrap();
        reg.set_str_copied(ci, 0, "first");
        reg.fire_row(ci, b"").unwrap();
        reg.set_int(ci, 1, 7);
        reg.fire_row(ci, b"").unwrap();
        let rows = rows.borrow();
        assert_eq!(rows[0], vec!["first", "<missing>"]);
        assert_eq!(rows[1], vec!["<missing>", "int:7"]);
    }

    #[test]
    fn later_observation_overwrites_earlier() {
        let (mut reg, rows) = registry_with_two_keywords();
        let ci = reg.find_category("_foo").unwrap();
        reg.set_str_copied(ci, 0, "old");
        reg.set_omitted(ci, 0);
        reg.set_str_copied(ci, 0, "new");
        reg.fire_row(ci, b"").unwrap();
        assert_eq!(rows.borrow()[0][0], "new");
    }

    #[test]
    fn borrowed_spans_resolve_against_the_given_line() {
        let (mut reg, rows) = registry_with_two_keywords();
        let ci = reg.find_category("_foo").unwrap();
        reg.set_str_borrowed(ci, 0, 4, 9);
        reg.fire_row(ci, b"xxx hello yyy").unwrap();
        assert_eq!(rows.borrow()[0][0], "hello");
    }

    #[test]
    fn duplicate_category_registration_replaces() {
        let (mut reg, rows) = registry_with_two_keywords();
        let cat = reg.register_category(
            "_FOO",
            Box::new(Recorder {
                ncols: 1,
                rows: rows.clone(),
            }),
        );
        assert_eq!(cat.0, 0);
        let ci = reg.find_category("_foo").unwrap();
        assert!(reg.find_keyword(ci, "bar").is_none(), "old keywords dropped");
    }

    #[test]
    fn end_block_flushes_pending_data_once() {
        let (mut reg, rows) = registry_with_two_keywords();
        let ci = reg.find_category("_foo").unwrap();
        reg.set_str_copied(ci, 0, "pending");
        reg.end_block().unwrap();
        reg.end_block().unwrap();
        assert_eq!(rows.borrow().len(), 1, "no data, no second callback");
    }

    #[test]
    fn clear_drops_registrations() {
        let (mut reg, _rows) = registry_with_two_keywords();
        reg.clear();
        assert!(reg.find_category("_foo").is_none());
    }
}
