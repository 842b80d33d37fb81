//! Keyword records and their derived key signatures.
use crate::positions::{Positions, LASTCHAR};
use crate::NIL;

/// A keyword as delivered by the input parser.
///
/// `allchars` is the raw byte string and may contain NUL bytes. `rest`
/// carries the remainder of the input line; only the code emitter looks at
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub allchars: Vec<u8>,
    pub rest: String,
}

impl Keyword {
    /// Creates a keyword from its raw bytes and trailing attribute text.
    pub fn new<B, R>(allchars: B, rest: R) -> Self
    where
        B: Into<Vec<u8>>,
        R: Into<String>,
    {
        Self {
            allchars: allchars.into(),
            rest: rest.into(),
        }
    }
}

/// A keyword enriched with the data the search derives for it.
///
/// Every `KeywordExt` lives in the arena owned by the search; the main
/// list and the duplicate chains are index chains through that arena.
#[derive(Debug)]
pub struct KeywordExt {
    /// The keyword bytes, as supplied.
    pub allchars: Vec<u8>,
    /// Attribute text for the emitter.
    pub rest: String,
    /// The selected characters participating in the hash, the key
    /// signature.
    pub selchars: Vec<u32>,
    /// Frequency valuation driving the optional reordering.
    pub occurrence: u32,
    /// Hash value; final once the associated values are fixed.
    pub hash_value: u32,
    /// Slot in the emitted word list. The search never writes this; the
    /// emitter stamps it while laying out its output.
    pub final_index: Option<u32>,
    /// Next keyword with the same signature, or `NIL`.
    pub(crate) duplicate_link: u32,
    /// Successor on the main list, or `NIL`.
    pub(crate) link: u32,
}

impl KeywordExt {
    pub(crate) fn new(keyword: Keyword) -> Self {
        Self {
            allchars: keyword.allchars,
            rest: keyword.rest,
            selchars: Vec::new(),
            occurrence: 0,
            hash_value: 0,
            final_index: None,
            duplicate_link: NIL,
            link: NIL,
        }
    }

    /// Recomputes the signature in position order.
    pub(crate) fn init_selchars_tuple(
        &mut self,
        use_all_chars: bool,
        positions: &Positions,
        alpha_inc: &[u32],
    ) {
        self.selchars = selchars_of(&self.allchars, use_all_chars, positions, alpha_inc);
    }

    /// Recomputes the signature sorted ascending, so equal multisets
    /// compare equal as sequences.
    pub(crate) fn init_selchars_multiset(
        &mut self,
        use_all_chars: bool,
        positions: &Positions,
        alpha_inc: &[u32],
    ) {
        let mut selchars = selchars_of(&self.allchars, use_all_chars, positions, alpha_inc);
        selchars.sort_unstable();
        self.selchars = selchars;
    }
}

/// Projects a keyword through the position set and the alphabet shifts.
///
/// Positions beyond the keyword's length select nothing. The
/// length-dependent position never takes a shift.
pub(crate) fn selchars_of(
    allchars: &[u8],
    use_all_chars: bool,
    positions: &Positions,
    alpha_inc: &[u32],
) -> Vec<u32> {
    if use_all_chars {
        return allchars
            .iter()
            .enumerate()
            .map(|(i, &c)| u32::from(c) + alpha_inc.get(i).copied().unwrap_or(0))
            .collect();
    }
    let mut key_set = Vec::with_capacity(positions.len());
    for pos in positions.iter() {
        if pos == LASTCHAR {
            key_set.push(u32::from(allchars[allchars.len() - 1]));
        } else if usize::from(pos) <= allchars.len() {
            let i = usize::from(pos) - 1;
            key_set.push(u32::from(allchars[i]) + alpha_inc.get(i).copied().unwrap_or(0));
        }
    }
    key_set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_keeps_position_order() {
        let positions: Positions = [1, 3, LASTCHAR].into_iter().collect();
        let selchars = selchars_of(b"abcd", false, &positions, &[]);
        // Decreasing position order: byte 3, byte 1, then the last byte.
        assert_eq!(selchars, vec![u32::from(b'c'), u32::from(b'a'), u32::from(b'd')]);
    }

    #[test]
    fn test_positions_beyond_length_select_nothing() {
        let positions: Positions = [2, 9].into_iter().collect();
        let selchars = selchars_of(b"hi", false, &positions, &[]);
        assert_eq!(selchars, vec![u32::from(b'i')]);
    }

    #[test]
    fn test_alpha_inc_shifts_numeric_positions_only() {
        let positions: Positions = [1, LASTCHAR].into_iter().collect();
        let alpha_inc = [7, 0];
        let selchars = selchars_of(b"ab", false, &positions, &alpha_inc);
        assert_eq!(selchars, vec![u32::from(b'a') + 7, u32::from(b'b')]);
    }

    #[test]
    fn test_multiset_sorts() {
        let positions: Positions = [1, 2].into_iter().collect();
        let mut kw = KeywordExt::new(Keyword::new(&b"ba"[..], ""));
        kw.init_selchars_multiset(false, &positions, &[]);
        assert_eq!(kw.selchars, vec![u32::from(b'a'), u32::from(b'b')]);
    }

    #[test]
    fn test_all_chars_mode() {
        let selchars = selchars_of(b"ab", true, &Positions::new(), &[1, 2]);
        assert_eq!(selchars, vec![u32::from(b'a') + 1, u32::from(b'b') + 2]);
    }
}
