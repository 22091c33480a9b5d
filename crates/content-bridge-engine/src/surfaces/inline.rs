//! Inline content flattened to one unit per native position.
//!
//! Both tree surfaces store inline content as runs (text nodes with marks,
//! styled text / links). Editing a range is simpler on a flat sequence of
//! styled characters and atoms; [`splice`] edits it and each surface folds
//! the units back into runs afterwards.

/// One native position of inline content.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit<M, A> {
    /// A character carrying the marks of the run it came from.
    Char(char, M),
    /// A non-text inline node (image, hard break).
    Atom(A),
}

impl<M, A> Unit<M, A> {
    pub fn marks(&self) -> Option<&M> {
        match self {
            Unit::Char(_, marks) => Some(marks),
            Unit::Atom(_) => None,
        }
    }
}

/// Marks a character inserted at `at` inherits: those of the character
/// before it, else the one after it, else none.
fn inherited_marks<M: Clone + Default, A>(units: &[Unit<M, A>], at: usize) -> M {
    at.checked_sub(1)
        .and_then(|prev| units.get(prev))
        .and_then(Unit::marks)
        .or_else(|| units.get(at).and_then(Unit::marks))
        .cloned()
        .unwrap_or_default()
}

/// Replace units `from..to` with the characters of `text`.
pub fn splice<M: Clone + Default, A>(units: &mut Vec<Unit<M, A>>, from: usize, to: usize, text: &str) {
    let to = to.min(units.len());
    let from = from.min(to);
    let marks = inherited_marks(units, from);
    units.splice(from..to, text.chars().map(|c| Unit::Char(c, marks.clone())));
}

/// Unit index for a plain-text offset, where each unit contributes
/// `width(unit)` plain characters. Zero-width units before the target are
/// skipped only when the target lies beyond them.
pub fn unit_index_for_plain<M, A>(
    units: &[Unit<M, A>],
    plain: usize,
    width: impl Fn(&Unit<M, A>) -> usize,
) -> usize {
    let mut consumed = 0;
    for (index, unit) in units.iter().enumerate() {
        if consumed >= plain {
            return index;
        }
        consumed += width(unit);
    }
    units.len()
}

/// Plain-text offset of unit index `index`.
pub fn plain_for_unit_index<M, A>(
    units: &[Unit<M, A>],
    index: usize,
    width: impl Fn(&Unit<M, A>) -> usize,
) -> usize {
    units.iter().take(index).map(width).sum()
}
