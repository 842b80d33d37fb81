//! Search configuration.
use crate::positions::Positions;

/// The deterministic trial step used when none is configured.
const DEFAULT_JUMP: u32 = 5;

/// Tuning knobs for the search, threaded explicitly instead of living in
/// process globals.
///
/// The defaults give a deterministic search: jump of 5, associated values
/// starting at 0, the table sized to the keyword count, and the keyword
/// length mixed into the hash.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hash every byte of every keyword instead of a selected position
    /// set.
    pub use_all_chars: bool,
    /// Leave the keyword length out of the hash.
    pub ignore_length: bool,
    /// Assume 7-bit input bytes, halving the associated-value table.
    pub seven_bit: bool,
    /// Accept keywords whose signatures coincide, chaining them behind one
    /// representative instead of failing.
    pub allow_duplicates: bool,
    /// Reorder keywords by signature frequency before the associated-value
    /// search, so inevitable collisions surface early.
    pub occurrence_sort: bool,
    /// Fixed byte positions; the position search is skipped when set.
    pub user_positions: Option<Positions>,
    /// Scales the associated-value range: `n > 0` multiplies the keyword
    /// count by `n`, `n < 0` divides it by `-n`, and 0 leaves it
    /// unchanged.
    pub size_multiple: i32,
    /// First associated value to try, or -1 to start from random values.
    pub initial_asso_value: i32,
    /// Step between successive trial values. Must be odd; an even value is
    /// rounded up. 0 selects randomized steps.
    pub jump: u32,
    /// Trial budget per candidate byte in fast mode; 0 means the keyword
    /// count.
    pub iterations: u32,
    /// Number of (initial value, jump) pairs to race; 0 runs the
    /// configured pair once.
    pub asso_iterations: u32,
    /// Cap the per-candidate trial budget instead of sweeping the whole
    /// associated-value range.
    pub fast: bool,
    /// Emit the table and keyword-list dumps at debug log level.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_all_chars: false,
            ignore_length: false,
            seven_bit: false,
            allow_duplicates: false,
            occurrence_sort: false,
            user_positions: None,
            size_multiple: 1,
            initial_asso_value: 0,
            jump: DEFAULT_JUMP,
            iterations: 0,
            asso_iterations: 0,
            fast: false,
            debug: false,
        }
    }
}
