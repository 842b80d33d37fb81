//! The search engine behind the generated hash function.
//!
//! Three chained searches run over the keyword arena: good byte positions,
//! then alphabet increments that make the projected signatures distinct,
//! then the associated values that make the hash itself injective. The
//! first two are greedy local searches over a duplicate-count objective;
//! the third is an iterative search with explicit-stack backtracking.
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::bool_array::BoolArray;
use crate::config::Config;
use crate::errors::{PhgenError, Result};
use crate::hash_table::HashTable;
use crate::keyword::{selchars_of, Keyword, KeywordExt};
use crate::list;
use crate::positions::{Positions, LASTCHAR};
use crate::NIL;

/// One collision being resolved. The stack of these drives backtracking.
struct Frame {
    /// Keyword whose placement collided.
    curr: u32,
    /// The keyword it collided with, for diagnostics.
    prior: u32,
    /// Candidate byte values whose multiplicities differ between the two
    /// signatures, ascending by occurrence.
    union_set: Vec<u32>,
    /// Index of the candidate currently under trial.
    index: usize,
    /// Saved associated value of the candidate under trial.
    original: u32,
    /// Trials left for the candidate under trial.
    remaining: u32,
}

/// Drives the searches over an owned keyword arena.
///
/// # Examples
///
/// ```
/// use phgen::{Config, Keyword, Search};
///
/// let keywords = ["if", "do", "for"]
///     .iter()
///     .map(|w| Keyword::new(w.as_bytes(), ""))
///     .collect();
/// let solution = Search::new(keywords, Config::default())
///     .optimize()
///     .unwrap();
///
/// assert_eq!(solution.total_duplicates, 0);
/// ```
pub struct Search {
    config: Config,
    /// Owning storage for every keyword. The main list and the duplicate
    /// chains are index chains through it.
    arena: Vec<KeywordExt>,
    head: u32,
    total_keys: u32,
    total_duplicates: u32,
    /// Length of the main list, not counting chained duplicates.
    list_len: u32,
    max_key_len: usize,
    min_key_len: usize,
    positions: Positions,
    alpha_inc: Vec<u32>,
    alpha_size: u32,
    occurrences: Vec<u32>,
    asso_values: Vec<u32>,
    asso_value_max: u32,
    /// Upper bound on any hash value under the current parameters.
    max_hash_value: u32,
    collision_detector: BoolArray,
    initial_asso_value: i32,
    jump: u32,
    rng: SmallRng,
}

impl Search {
    /// Takes ownership of the keyword list. `keywords` must not be empty.
    pub fn new(keywords: Vec<Keyword>, config: Config) -> Self {
        assert!(!keywords.is_empty(), "keyword list must not be empty");

        let mut arena: Vec<KeywordExt> = keywords.into_iter().map(KeywordExt::new).collect();
        let mut head = NIL;
        for id in (0..arena.len() as u32).rev() {
            arena[id as usize].link = head;
            head = id;
        }

        Self {
            config,
            arena,
            head,
            total_keys: 0,
            total_duplicates: 0,
            list_len: 0,
            max_key_len: 0,
            min_key_len: 0,
            positions: Positions::new(),
            alpha_inc: Vec::new(),
            alpha_size: 0,
            occurrences: Vec::new(),
            asso_values: Vec::new(),
            asso_value_max: 0,
            max_hash_value: 0,
            collision_detector: BoolArray::new(0),
            initial_asso_value: 0,
            jump: 0,
            rng: SmallRng::seed_from_u64(0),
        }
    }

    /// Runs the whole search and hands back the solved tables together
    /// with the keyword list sorted by hash value.
    pub fn optimize(mut self) -> Result<Solution> {
        self.prepare()?;
        self.find_positions();
        self.find_alpha_inc();
        self.prepare_selchars()?;
        if self.config.occurrence_sort {
            self.reorder();
        }
        self.prepare_asso_values();
        self.search_asso_values()?;
        self.final_check()?;
        self.head = list::merge_sort(&mut self.arena, self.head, &|a, b| {
            a.hash_value < b.hash_value
        });
        if self.config.debug {
            self.dump();
        }
        Ok(self.into_solution())
    }

    fn prepare(&mut self) -> Result<()> {
        self.total_keys = self.arena.len() as u32;
        self.list_len = self.total_keys;
        self.max_key_len = self.arena.iter().map(|kw| kw.allchars.len()).max().unwrap_or(0);
        self.min_key_len = self.arena.iter().map(|kw| kw.allchars.len()).min().unwrap_or(0);
        // The generated comparison code cannot recognize an empty string.
        if self.min_key_len == 0 {
            return Err(PhgenError::EmptyKeyword);
        }
        Ok(())
    }

    /// Counts keywords whose signature under the given parameters matches
    /// an earlier keyword's. The signatures stay assigned as a side
    /// effect.
    fn count_duplicates(
        &mut self,
        positions: &Positions,
        alpha_inc: &[u32],
        multiset: bool,
    ) -> u32 {
        let mut table = HashTable::new(self.total_keys as usize, self.config.ignore_length);
        let mut duplicates = 0;
        for id in 0..self.arena.len() as u32 {
            if multiset {
                self.arena[id as usize].init_selchars_multiset(
                    self.config.use_all_chars,
                    positions,
                    alpha_inc,
                );
            } else {
                self.arena[id as usize].init_selchars_tuple(
                    self.config.use_all_chars,
                    positions,
                    alpha_inc,
                );
            }
            if table.insert(id, &self.arena).is_some() {
                duplicates += 1;
            }
        }
        duplicates
    }

    // ---------------- Step 1: finding good byte positions ----------------

    /// Positions at which same-length keywords differing in exactly one
    /// interior byte can be told apart; omitting such a position would
    /// force a duplicate.
    fn mandatory_positions(&self) -> Positions {
        let mut mandatory = Positions::new();
        if self.config.allow_duplicates {
            return mandatory;
        }
        for i in 0..self.arena.len() {
            for j in i + 1..self.arena.len() {
                let k1 = &self.arena[i].allchars;
                let k2 = &self.arena[j].allchars;
                if k1.len() != k2.len() {
                    continue;
                }
                let n = k1.len();
                if let Some(idx) = (0..n - 1).find(|&idx| k1[idx] != k2[idx]) {
                    if k1[idx + 1..] == k2[idx + 1..] && idx < Positions::MAX_KEY_POS as usize {
                        let pos = (idx + 1) as u8;
                        if !mandatory.contains(pos) {
                            mandatory.add(pos);
                        }
                    }
                }
            }
        }
        mandatory
    }

    /// Chooses the byte positions, minimizing the number of keywords that
    /// become indistinguishable under the projection.
    fn find_positions(&mut self) {
        if self.config.use_all_chars {
            return;
        }
        if let Some(user) = self.config.user_positions {
            self.positions = user;
            debug!("using explicit positions: {:?}", self.positions);
            return;
        }

        let mandatory = self.mandatory_positions();
        let imax = self.max_key_len.min(Positions::MAX_KEY_POS as usize) as u8;

        let mut current = mandatory;
        let mut current_duplicates = self.count_duplicates(&current, &[], false);

        // Add positions as long as this strictly lowers the duplicate
        // count.
        loop {
            let mut best = current;
            let mut best_duplicates = u32::MAX;
            for pos in (0..=imax).rev() {
                if current.contains(pos) {
                    continue;
                }
                let mut trial = current;
                trial.add(pos);
                let trial_duplicates = self.count_duplicates(&trial, &[], false);
                // On a tie prefer a numeric position over LASTCHAR.
                if trial_duplicates < best_duplicates
                    || (trial_duplicates == best_duplicates && pos != LASTCHAR)
                {
                    best = trial;
                    best_duplicates = trial_duplicates;
                }
            }
            if best_duplicates >= current_duplicates {
                break;
            }
            current = best;
            current_duplicates = best_duplicates;
        }

        // Remove positions as long as this does not raise the count.
        loop {
            let mut best = current;
            let mut best_duplicates = u32::MAX;
            for pos in current.iter() {
                if mandatory.contains(pos) {
                    continue;
                }
                let mut trial = current;
                trial.remove(pos);
                let trial_duplicates = self.count_duplicates(&trial, &[], false);
                // On a tie prefer dropping LASTCHAR.
                if trial_duplicates < best_duplicates
                    || (trial_duplicates == best_duplicates && pos == LASTCHAR)
                {
                    best = trial;
                    best_duplicates = trial_duplicates;
                }
            }
            if best_duplicates > current_duplicates {
                break;
            }
            current = best;
            current_duplicates = best_duplicates;
        }

        // Trade two positions for one as long as this does not raise the
        // count.
        loop {
            let mut best = current;
            let mut best_duplicates = u32::MAX;
            let in_set: Vec<u8> = current.iter().collect();
            for (n1, &p1) in in_set.iter().enumerate() {
                if mandatory.contains(p1) {
                    continue;
                }
                for &p2 in &in_set[n1 + 1..] {
                    if mandatory.contains(p2) {
                        continue;
                    }
                    for p3 in (0..=imax).rev() {
                        if current.contains(p3) {
                            continue;
                        }
                        let mut trial = current;
                        trial.remove(p1);
                        trial.remove(p2);
                        trial.add(p3);
                        let trial_duplicates = self.count_duplicates(&trial, &[], false);
                        if trial_duplicates < best_duplicates
                            || (trial_duplicates == best_duplicates
                                && (p1 == LASTCHAR || p2 == LASTCHAR || p3 != LASTCHAR))
                        {
                            best = trial;
                            best_duplicates = trial_duplicates;
                        }
                    }
                }
            }
            if best_duplicates > current_duplicates {
                break;
            }
            current = best;
            current_duplicates = best_duplicates;
        }

        self.positions = current;
        debug!(
            "computed positions: {:?}, projection duplicates = {}",
            self.positions, current_duplicates
        );
    }

    // --------------- Step 2: finding good alpha increments ---------------

    /// Chooses per-position increments so that the sorted signatures admit
    /// no more duplicates than the ordered ones already do.
    fn find_alpha_inc(&mut self) {
        let positions = self.positions;
        let duplicates_goal = self.count_duplicates(&positions, &[], false);

        let mut current = vec![0u32; self.max_key_len];
        let mut current_duplicates = self.count_duplicates(&positions, &current, true);

        if current_duplicates > duplicates_goal {
            // Indices free to receive an increment. The length-dependent
            // position is never shifted.
            let indices: Vec<usize> = if self.config.use_all_chars {
                (0..self.max_key_len).collect()
            } else {
                positions
                    .iter()
                    .filter(|&p| p != LASTCHAR)
                    .map(|p| usize::from(p) - 1)
                    .collect()
            };

            let mut best = vec![0u32; self.max_key_len];
            while current_duplicates > duplicates_goal {
                // A unit increment is not always enough; widen until some
                // index gives an improvement.
                for inc in 1u32.. {
                    let mut best_duplicates = u32::MAX;
                    for &index in &indices {
                        let mut trial = current.clone();
                        trial[index] += inc;
                        let trial_duplicates = self.count_duplicates(&positions, &trial, true);
                        if trial_duplicates < best_duplicates {
                            best.copy_from_slice(&trial);
                            best_duplicates = trial_duplicates;
                        }
                    }
                    if best_duplicates < current_duplicates {
                        current.copy_from_slice(&best);
                        current_duplicates = best_duplicates;
                        break;
                    }
                }
            }
        }

        let max_inc = current.iter().copied().max().unwrap_or(0);
        self.alpha_inc = current;
        self.alpha_size = if self.config.seven_bit { 128 } else { 256 } + max_inc;

        if max_inc > 0 {
            let nonzero: Vec<(usize, u32)> = self
                .alpha_inc
                .iter()
                .copied()
                .enumerate()
                .filter(|&(_, inc)| inc != 0)
                .map(|(i, inc)| (i + 1, inc))
                .collect();
            debug!("computed alpha increments (position, shift): {:?}", nonzero);
        }
    }

    // ------------------- Duplicate folding, occurrences -------------------

    /// Fixes the final signatures, folds equal keywords into duplicate
    /// chains, and counts byte occurrences over the representatives.
    fn prepare_selchars(&mut self) -> Result<()> {
        let positions = self.positions;
        for id in 0..self.arena.len() {
            self.arena[id].init_selchars_multiset(
                self.config.use_all_chars,
                &positions,
                &self.alpha_inc,
            );
        }

        let mut table = HashTable::new(self.list_len as usize, self.config.ignore_length);
        let mut prev = NIL;
        let mut cur = self.head;
        while cur != NIL {
            let next = self.arena[cur as usize].link;
            match table.insert(cur, &self.arena) {
                Some(other) => {
                    self.total_duplicates += 1;
                    self.list_len -= 1;
                    // Unlink from the main list and chain behind the
                    // representative. The first keyword can never be a
                    // duplicate, so prev is valid here.
                    self.arena[prev as usize].link = next;
                    self.arena[cur as usize].duplicate_link =
                        self.arena[other as usize].duplicate_link;
                    self.arena[other as usize].duplicate_link = cur;

                    let message = format!(
                        "key link: \"{}\" = \"{}\", with key set {:?}",
                        String::from_utf8_lossy(&self.arena[cur as usize].allchars),
                        String::from_utf8_lossy(&self.arena[other as usize].allchars),
                        self.arena[cur as usize].selchars,
                    );
                    if self.config.allow_duplicates {
                        debug!("{}", message);
                    } else {
                        warn!("{}", message);
                    }
                }
                None => prev = cur,
            }
            cur = next;
        }

        if self.total_duplicates > 0 {
            if !self.config.allow_duplicates {
                return Err(PhgenError::duplicates(self.total_duplicates));
            }
            warn!(
                "{} input keys have identical key signatures, examine output carefully",
                self.total_duplicates
            );
        }

        self.occurrences = vec![0; self.alpha_size as usize];
        let mut cur = self.head;
        while cur != NIL {
            for &c in &self.arena[cur as usize].selchars {
                self.occurrences[c as usize] += 1;
            }
            cur = self.arena[cur as usize].link;
        }
        Ok(())
    }

    // ----------------- Reordering the keyword list (optional) -----------------

    /// Reorders the list so that keywords sharing many signature bytes
    /// come first, and keywords whose signatures are fully determined sit
    /// right behind the keyword that completed them. Inevitable
    /// collisions then surface while backtracking is still cheap
    /// (Cichelli).
    fn reorder(&mut self) {
        let mut cur = self.head;
        while cur != NIL {
            let value: u32 = self.arena[cur as usize]
                .selchars
                .iter()
                .map(|&c| self.occurrences[c as usize])
                .sum();
            self.arena[cur as usize].occurrence = value;
            cur = self.arena[cur as usize].link;
        }

        self.head = list::merge_sort(&mut self.arena, self.head, &|a, b| {
            a.occurrence > b.occurrence
        });

        let mut determined = vec![false; self.alpha_size as usize];
        let mut ptr = self.head;
        while ptr != NIL && self.arena[ptr as usize].link != NIL {
            for &c in &self.arena[ptr as usize].selchars {
                determined[c as usize] = true;
            }

            let mut curr = ptr;
            let mut next = self.arena[curr as usize].link;
            while next != NIL {
                let next_determined = self.arena[next as usize]
                    .selchars
                    .iter()
                    .all(|&c| determined[c as usize]);
                if next_determined {
                    if curr == ptr {
                        // Already in place.
                        curr = next;
                    } else {
                        // Splice it out and reinsert it right after ptr.
                        self.arena[curr as usize].link = self.arena[next as usize].link;
                        self.arena[next as usize].link = self.arena[ptr as usize].link;
                        self.arena[ptr as usize].link = next;
                    }
                    ptr = self.arena[ptr as usize].link;
                } else {
                    curr = next;
                }
                next = self.arena[curr as usize].link;
            }
            ptr = self.arena[ptr as usize].link;
        }
    }

    // ---------------- Step 3: finding good asso_values ----------------

    fn max_keysig_size(&self) -> u32 {
        if self.config.use_all_chars {
            self.max_key_len as u32
        } else {
            self.positions.len() as u32
        }
    }

    fn prepare_asso_values(&mut self) {
        let non_linked_length = self.list_len;
        let asso_value_max = match self.config.size_multiple {
            0 => non_linked_length,
            m if m > 0 => non_linked_length * m as u32,
            m => non_linked_length / (-m) as u32,
        };
        // A power of two, so that trials with an odd jump sweep the whole
        // range.
        self.asso_value_max = asso_value_max.max(1).next_power_of_two();

        let length_bound = if self.config.ignore_length {
            0
        } else {
            self.max_key_len as u32
        };
        self.max_hash_value = length_bound + (self.asso_value_max - 1) * self.max_keysig_size();
        self.collision_detector = BoolArray::new(self.max_hash_value as usize + 1);
        self.asso_values = vec![0; self.alpha_size as usize];

        debug!(
            "total non-linked keys = {}, maximum associated value = {}, maximum hash value = {}",
            non_linked_length, self.asso_value_max, self.max_hash_value
        );

        self.initial_asso_value = self.config.initial_asso_value;
        self.jump = self.config.jump;
        if self.jump != 0 && self.jump % 2 == 0 {
            // An even jump would only ever visit half the value range.
            self.jump += 1;
            debug!("rounded jump up to {}", self.jump);
        }
        if self.initial_asso_value < 0 || self.jump == 0 {
            let seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            self.rng = SmallRng::seed_from_u64(seed);
        }
    }

    fn init_asso_values(&mut self) {
        if self.initial_asso_value < 0 {
            let mask = self.asso_value_max - 1;
            for value in self.asso_values.iter_mut() {
                *value = self.rng.gen::<u32>() & mask;
            }
        } else {
            let value = self.initial_asso_value as u32 & (self.asso_value_max - 1);
            self.asso_values.fill(value);
        }
    }

    /// Computes and stores the keyword's hash under the current associated
    /// values. Called from the innermost trial loop.
    #[inline]
    fn compute_hash(&mut self, id: u32) -> u32 {
        let sum = {
            let kw = &self.arena[id as usize];
            let base = if self.config.ignore_length {
                0
            } else {
                kw.allchars.len() as u32
            };
            kw.selchars
                .iter()
                .fold(base, |sum, &c| sum + self.asso_values[c as usize])
        };
        self.arena[id as usize].hash_value = sum;
        sum
    }

    /// Number of trial values per candidate byte.
    fn trial_budget(&self) -> u32 {
        if self.config.fast {
            if self.config.iterations == 0 {
                self.list_len
            } else {
                self.config.iterations.min(self.list_len)
            }
        } else {
            self.asso_value_max
        }
    }

    fn find_colliding_prior(&self, curr: u32) -> Option<u32> {
        let hash = self.arena[curr as usize].hash_value;
        let mut p = self.head;
        while p != curr {
            if self.arena[p as usize].hash_value == hash {
                return Some(p);
            }
            p = self.arena[p as usize].link;
        }
        None
    }

    /// Recomputes the hashes from the head up to and including `last`,
    /// returning whether they are pairwise distinct.
    fn prefix_collision_free(&mut self, last: u32) -> bool {
        self.collision_detector.clear();
        let mut p = self.head;
        loop {
            let hash = self.compute_hash(p);
            if self.collision_detector.set_bit(hash as usize) {
                return false;
            }
            if p == last {
                return true;
            }
            p = self.arena[p as usize].link;
        }
    }

    /// Restores the stored hashes of the prefix after a failed resolution.
    fn rehash_prefix(&mut self, last: u32) {
        let mut p = self.head;
        loop {
            self.compute_hash(p);
            if p == last {
                break;
            }
            p = self.arena[p as usize].link;
        }
    }

    fn open_frame(&self, prior: u32, curr: u32, iterations: u32) -> Frame {
        let mut union_set = Vec::new();
        disjoint_union(
            &self.arena[prior as usize].selchars,
            &self.arena[curr as usize].selchars,
            &mut union_set,
        );
        // Only a byte occurring with different multiplicity in the two
        // signatures can separate their hashes. Least-used bytes first:
        // changing them disturbs fewer already placed keywords.
        union_set.sort_unstable_by_key(|&c| self.occurrences[c as usize]);
        debug_assert!(!union_set.is_empty());

        let original = self.asso_values[union_set[0] as usize];
        Frame {
            curr,
            prior,
            union_set,
            index: 0,
            original,
            remaining: iterations,
        }
    }

    /// Tries further values for the frame's candidates until one leaves
    /// the whole prefix collision-free. Returns false once every
    /// candidate's budget is exhausted, with the associated values
    /// restored.
    fn advance_frame(&mut self, frame: &mut Frame, iterations: u32) -> bool {
        loop {
            if frame.remaining == 0 {
                let c = frame.union_set[frame.index] as usize;
                self.asso_values[c] = frame.original;
                frame.index += 1;
                if frame.index == frame.union_set.len() {
                    return false;
                }
                frame.original = self.asso_values[frame.union_set[frame.index] as usize];
                frame.remaining = iterations;
            }
            frame.remaining -= 1;

            let c = frame.union_set[frame.index] as usize;
            let step = if self.jump != 0 {
                self.jump
            } else {
                self.rng.gen::<u32>()
            };
            self.asso_values[c] =
                self.asso_values[c].wrapping_add(step) & (self.asso_value_max - 1);

            if self.prefix_collision_free(frame.curr) {
                trace!(
                    "resolved by changing asso_values[{}] to {}",
                    c,
                    self.asso_values[c]
                );
                return true;
            }
        }
    }

    /// Places the keywords one by one, resolving collisions by adjusting
    /// associated values and backtracking when a collision admits no
    /// resolution.
    fn find_asso_values(&mut self) -> Result<()> {
        self.init_asso_values();
        let iterations = self.trial_budget();

        let mut stack: Vec<Frame> = Vec::with_capacity(self.list_len as usize);
        let mut num_done = 1u32;
        let mut curr = self.head;
        while curr != NIL {
            self.compute_hash(curr);

            if let Some(prior) = self.find_colliding_prior(curr) {
                trace!(
                    "collision on keyword #{}, prior = \"{}\", curr = \"{}\", hash = {}",
                    num_done,
                    String::from_utf8_lossy(&self.arena[prior as usize].allchars),
                    String::from_utf8_lossy(&self.arena[curr as usize].allchars),
                    self.arena[curr as usize].hash_value,
                );
                let mut frame = self.open_frame(prior, curr, iterations);
                loop {
                    if self.advance_frame(&mut frame, iterations) {
                        curr = frame.curr;
                        stack.push(frame);
                        break;
                    }
                    if self.config.allow_duplicates {
                        // Tolerate the collision; the final verification
                        // accounts for it.
                        trace!("collision not resolved, leaving a residual duplicate");
                        self.rehash_prefix(frame.curr);
                        curr = frame.curr;
                        break;
                    }
                    frame = match stack.pop() {
                        Some(frame) => {
                            trace!(
                                "backtracking to keyword \"{}\" (collided with \"{}\")",
                                String::from_utf8_lossy(&self.arena[frame.curr as usize].allchars),
                                String::from_utf8_lossy(&self.arena[frame.prior as usize].allchars),
                            );
                            frame
                        }
                        None => return Err(PhgenError::ExhaustiveSearchFailure),
                    };
                }
            }

            curr = self.arena[curr as usize].link;
            num_done += 1;
        }
        Ok(())
    }

    /// Counts residual collisions and the largest hash under the current
    /// associated values.
    fn measure_run(&mut self) -> (u32, u32) {
        self.collision_detector.clear();
        let mut collisions = 0;
        let mut max_hash = 0;
        let mut p = self.head;
        while p != NIL {
            let hash = self.compute_hash(p);
            max_hash = max_hash.max(hash);
            if self.collision_detector.set_bit(hash as usize) {
                collisions += 1;
            }
            p = self.arena[p as usize].link;
        }
        (collisions, max_hash)
    }

    fn snapshot_order(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.list_len as usize);
        let mut p = self.head;
        while p != NIL {
            order.push(p);
            p = self.arena[p as usize].link;
        }
        order
    }

    fn restore_order(&mut self, order: &[u32]) {
        let mut next = NIL;
        for &id in order.iter().rev() {
            self.arena[id as usize].link = next;
            next = id;
        }
        self.head = next;
    }

    /// Runs the associated-value search once, or races several
    /// (initial value, jump) pairs and installs the best outcome.
    fn search_asso_values(&mut self) -> Result<()> {
        if self.config.asso_iterations == 0 {
            return self.find_asso_values();
        }

        let saved_order = self.snapshot_order();
        let mut best_asso: Vec<u32> = Vec::new();
        let mut best_collisions = u32::MAX;
        let mut best_max_hash = u32::MAX;
        let mut last_error = None;

        self.initial_asso_value = 0;
        self.jump = 1;
        let mut remaining = self.config.asso_iterations;
        loop {
            self.restore_order(&saved_order);
            match self.find_asso_values() {
                Ok(()) => {
                    let (collisions, max_hash) = self.measure_run();
                    trace!(
                        "run (initial = {}, jump = {}): {} collisions, max hash {}",
                        self.initial_asso_value,
                        self.jump,
                        collisions,
                        max_hash
                    );
                    if collisions < best_collisions
                        || (collisions == best_collisions && max_hash < best_max_hash)
                    {
                        best_asso = self.asso_values.clone();
                        best_collisions = collisions;
                        best_max_hash = max_hash;
                    }
                }
                Err(err) => last_error = Some(err),
            }

            remaining -= 1;
            if remaining == 0 {
                break;
            }
            // Enumerates (0,1), (1,1), (2,1), (0,3), (3,1), (1,3), (4,1),
            // (2,3), (0,5), ...
            if self.initial_asso_value >= 2 {
                self.initial_asso_value -= 2;
                self.jump += 2;
            } else {
                self.initial_asso_value += self.jump as i32;
                self.jump = 1;
            }
        }

        self.restore_order(&saved_order);
        if best_asso.is_empty() {
            return Err(last_error.unwrap_or(PhgenError::ExhaustiveSearchFailure));
        }
        self.asso_values = best_asso;
        Ok(())
    }

    /// Recomputes every hash one last time and verifies injectivity.
    fn final_check(&mut self) -> Result<()> {
        self.collision_detector.clear();
        let mut p = self.head;
        while p != NIL {
            let hash = self.compute_hash(p);
            if self.collision_detector.set_bit(hash as usize) {
                if self.config.allow_duplicates {
                    self.total_duplicates += 1;
                } else {
                    return Err(PhgenError::invariant(hash));
                }
            }
            p = self.arena[p as usize].link;
        }
        Ok(())
    }

    fn dump(&self) {
        debug!("dumping occurrence and associated value tables");
        for c in 0..self.alpha_size as usize {
            if self.occurrences[c] != 0 {
                debug!(
                    "asso_values[{}] = {:6}, occurrences[{}] = {:6}",
                    c, self.asso_values[c], c, self.occurrences[c]
                );
            }
        }
        debug!(
            "total keywords = {}, total duplicates = {}, maximum key length = {}",
            self.total_keys, self.total_duplicates, self.max_key_len
        );
        debug!("list contents (hash value, key length, key set, keyword):");
        let mut p = self.head;
        while p != NIL {
            let kw = &self.arena[p as usize];
            debug!(
                "{:11}, {:11}, {:?}, {}",
                kw.hash_value,
                kw.allchars.len(),
                kw.selchars,
                String::from_utf8_lossy(&kw.allchars)
            );
            p = kw.link;
        }
    }

    fn into_solution(self) -> Solution {
        let mut min_hash_value = u32::MAX;
        let mut max_hash_value = 0;
        let mut p = self.head;
        while p != NIL {
            let hash = self.arena[p as usize].hash_value;
            min_hash_value = min_hash_value.min(hash);
            max_hash_value = max_hash_value.max(hash);
            p = self.arena[p as usize].link;
        }
        Solution {
            config: self.config,
            arena: self.arena,
            head: self.head,
            positions: self.positions,
            alpha_inc: self.alpha_inc,
            alpha_size: self.alpha_size,
            asso_values: self.asso_values,
            asso_value_max: self.asso_value_max,
            occurrences: self.occurrences,
            min_hash_value,
            max_hash_value,
            min_key_len: self.min_key_len,
            max_key_len: self.max_key_len,
            total_keys: self.total_keys,
            total_duplicates: self.total_duplicates,
        }
    }
}

/// Computes the ordered set of values contained with different
/// multiplicities in the two sorted sequences.
fn disjoint_union(set1: &[u32], set2: &[u32], out: &mut Vec<u32>) {
    out.clear();
    let mut i = 0;
    let mut j = 0;
    while i < set1.len() && j < set2.len() {
        if set1[i] == set2[j] {
            i += 1;
            j += 1;
        } else {
            let next = if set1[i] < set2[j] {
                let next = set1[i];
                i += 1;
                next
            } else {
                let next = set2[j];
                j += 1;
                next
            };
            if out.last() != Some(&next) {
                out.push(next);
            }
        }
    }
    for &next in set1[i..].iter().chain(&set2[j..]) {
        if out.last() != Some(&next) {
            out.push(next);
        }
    }
}

/// Everything the code emitter needs: the solved tables and the keyword
/// list sorted ascending by hash value, with duplicate chains attached to
/// their representatives.
#[derive(Debug)]
pub struct Solution {
    config: Config,
    arena: Vec<KeywordExt>,
    head: u32,
    /// The chosen byte positions. Empty in all-bytes mode.
    pub positions: Positions,
    /// Per-position alphabet shifts, indexed by byte position.
    pub alpha_inc: Vec<u32>,
    /// Size of the shifted alphabet; bounds every signature value.
    pub alpha_size: u32,
    /// The associated-value table, indexed by signature value.
    pub asso_values: Vec<u32>,
    /// Exclusive power-of-two bound on every associated value.
    pub asso_value_max: u32,
    /// How often each signature value occurs across the representatives.
    pub occurrences: Vec<u32>,
    /// Smallest hash value over the representatives.
    pub min_hash_value: u32,
    /// Largest hash value over the representatives.
    pub max_hash_value: u32,
    /// Length of the shortest keyword.
    pub min_key_len: usize,
    /// Length of the longest keyword.
    pub max_key_len: usize,
    /// Number of input keywords, counting duplicates.
    pub total_keys: u32,
    /// Number of keywords chained behind a representative, plus any
    /// residual hash collisions when duplicates are allowed.
    pub total_duplicates: u32,
}

impl Solution {
    /// The configuration the search ran under.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The representatives, in increasing hash order.
    pub fn keywords(&self) -> Keywords {
        Keywords {
            arena: &self.arena,
            cursor: self.head,
            chain: false,
        }
    }

    /// The keywords folded behind `representative`, excluding it.
    pub fn duplicates_of(&self, representative: &KeywordExt) -> Keywords {
        Keywords {
            arena: &self.arena,
            cursor: representative.duplicate_link,
            chain: true,
        }
    }

    /// Walks the representatives in order with mutable access, so the
    /// emitter can stamp `final_index`.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut KeywordExt),
    {
        let mut p = self.head;
        while p != NIL {
            f(&mut self.arena[p as usize]);
            p = self.arena[p as usize].link;
        }
    }

    /// Evaluates the generated hash function on a byte string.
    ///
    /// For every input keyword this reproduces the stored `hash_value`
    /// exactly; for other strings it yields whatever the generated
    /// function would.
    pub fn hash(&self, allchars: &[u8]) -> u32 {
        let selchars = selchars_of(
            allchars,
            self.config.use_all_chars,
            &self.positions,
            &self.alpha_inc,
        );
        let base = if self.config.ignore_length {
            0
        } else {
            allchars.len() as u32
        };
        selchars
            .iter()
            .fold(base, |sum, &c| sum + self.asso_values[c as usize])
    }
}

/// Iterator over a keyword list or a duplicate chain.
pub struct Keywords<'a> {
    arena: &'a [KeywordExt],
    cursor: u32,
    chain: bool,
}

impl<'a> Iterator for Keywords<'a> {
    type Item = &'a KeywordExt;

    fn next(&mut self) -> Option<&'a KeywordExt> {
        if self.cursor == NIL {
            return None;
        }
        let kw = &self.arena[self.cursor as usize];
        self.cursor = if self.chain { kw.duplicate_link } else { kw.link };
        Some(kw)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::positions::LASTCHAR;

    const C89_KEYWORDS: &[&str] = &[
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "int", "long", "register", "return",
        "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned",
        "void", "volatile", "while",
    ];

    fn run(words: &[&str], config: Config) -> Result<Solution> {
        let keywords = words
            .iter()
            .map(|w| Keyword::new(w.as_bytes(), ""))
            .collect();
        Search::new(keywords, config).optimize()
    }

    fn assert_injective(solution: &Solution) {
        let mut seen = HashSet::new();
        for kw in solution.keywords() {
            assert!(
                seen.insert(kw.hash_value),
                "hash {} assigned twice",
                kw.hash_value
            );
        }
    }

    fn assert_well_formed(solution: &Solution) {
        assert_injective(solution);
        assert!(solution.asso_value_max.is_power_of_two());
        let mut prev = 0;
        for kw in solution.keywords() {
            assert!(prev <= kw.hash_value, "list not sorted by hash value");
            prev = kw.hash_value;
            for &c in &kw.selchars {
                assert!(c < solution.alpha_size);
            }
            // Recomputing from the emitted tables must reproduce the
            // stored value, for the representative and its whole chain.
            assert_eq!(solution.hash(&kw.allchars), kw.hash_value);
            for dup in solution.duplicates_of(kw) {
                assert_eq!(solution.hash(&dup.allchars), kw.hash_value);
            }
        }
        for &value in &solution.asso_values {
            assert!(value < solution.asso_value_max);
        }
    }

    #[test]
    fn test_short_keywords() {
        let solution = run(&["if", "do", "for"], Config::default()).unwrap();
        assert!(solution.positions.contains(1));
        assert_well_formed(&solution);
        assert_eq!(solution.total_duplicates, 0);
        assert!(solution.min_hash_value >= 2);
        assert!(
            solution.max_hash_value
                <= solution.max_key_len as u32
                    + (solution.asso_value_max - 1) * solution.positions.len() as u32
        );
    }

    #[test]
    fn test_c89_keywords() {
        let solution = run(C89_KEYWORDS, Config::default()).unwrap();
        assert_eq!(solution.total_duplicates, 0);
        assert_eq!(solution.total_keys, 32);
        assert_eq!(solution.keywords().count(), 32);
        assert_well_formed(&solution);
    }

    #[test]
    fn test_interior_difference_is_distinguished() {
        let solution = run(&["ab", "ba"], Config::default()).unwrap();
        assert!(solution.positions.contains(1));
        assert_well_formed(&solution);
    }

    #[test]
    fn test_single_interior_difference_is_mandatory() {
        // "farm" and "form" differ in byte 2 alone; no position set that
        // omits it can tell them apart.
        let solution = run(&["farm", "form"], Config::default()).unwrap();
        assert!(solution.positions.contains(2));
        assert_well_formed(&solution);
    }

    #[test]
    fn test_length_keeps_prefix_pairs_apart() {
        let config = Config {
            user_positions: Some([1, LASTCHAR].into_iter().collect()),
            ..Config::default()
        };
        let solution = run(&["a", "b", "aa", "bb"], config).unwrap();
        assert_eq!(solution.total_duplicates, 0);
        assert_well_formed(&solution);
    }

    #[test]
    fn test_ignoring_length_makes_prefix_pairs_collide() {
        let config = Config {
            user_positions: Some([1, LASTCHAR].into_iter().collect()),
            ignore_length: true,
            ..Config::default()
        };
        let err = run(&["a", "b", "aa", "bb"], config).unwrap_err();
        assert_eq!(err, PhgenError::UnresolvableDuplicates { count: 2 });
    }

    #[test]
    fn test_allowed_duplicates_ride_their_representative() {
        let config = Config {
            user_positions: Some([1, LASTCHAR].into_iter().collect()),
            ignore_length: true,
            allow_duplicates: true,
            ..Config::default()
        };
        let solution = run(&["a", "b", "aa", "bb"], config).unwrap();
        assert_eq!(solution.total_duplicates, 2);
        assert_eq!(solution.keywords().count(), 2);
        assert_well_formed(&solution);

        // No keyword may be lost: the main list plus the chains must give
        // back the original multiset.
        let mut all: Vec<Vec<u8>> = vec![];
        for kw in solution.keywords() {
            all.push(kw.allchars.clone());
            for dup in solution.duplicates_of(kw) {
                all.push(dup.allchars.clone());
            }
        }
        all.sort();
        assert_eq!(all, vec![b"a".to_vec(), b"aa".to_vec(), b"b".to_vec(), b"bb".to_vec()]);
    }

    #[test]
    fn test_fast_mode_is_deterministic() {
        let config = Config {
            fast: true,
            iterations: 7,
            jump: 5,
            initial_asso_value: 0,
            asso_iterations: 0,
            ..Config::default()
        };
        let first = run(C89_KEYWORDS, config.clone()).unwrap();
        let second = run(C89_KEYWORDS, config).unwrap();

        assert_eq!(first.asso_values, second.asso_values);
        let hashes1: Vec<(Vec<u8>, u32)> = first
            .keywords()
            .map(|kw| (kw.allchars.clone(), kw.hash_value))
            .collect();
        let hashes2: Vec<(Vec<u8>, u32)> = second
            .keywords()
            .map(|kw| (kw.allchars.clone(), kw.hash_value))
            .collect();
        assert_eq!(hashes1, hashes2);
        assert_well_formed(&first);
    }

    #[test]
    fn test_full_byte_alphabet() {
        let keywords: Vec<Keyword> = (0u8..=255).map(|b| Keyword::new(vec![b], "")).collect();
        let config = Config {
            user_positions: Some([LASTCHAR].into_iter().collect()),
            ignore_length: true,
            ..Config::default()
        };
        let solution = Search::new(keywords, config).optimize().unwrap();
        assert_eq!(solution.total_duplicates, 0);
        assert!(solution.alpha_inc.iter().all(|&inc| inc == 0));
        assert_eq!(solution.keywords().count(), 256);
        assert_well_formed(&solution);
    }

    #[test]
    fn test_multi_start_picks_a_solution() {
        let config = Config {
            asso_iterations: 5,
            ..Config::default()
        };
        let first = run(C89_KEYWORDS, config.clone()).unwrap();
        let second = run(C89_KEYWORDS, config).unwrap();
        assert_well_formed(&first);
        assert_eq!(first.asso_values, second.asso_values);
    }

    #[test]
    fn test_occurrence_sort_keeps_every_keyword() {
        let config = Config {
            occurrence_sort: true,
            ..Config::default()
        };
        let solution = run(C89_KEYWORDS, config).unwrap();
        assert_eq!(solution.keywords().count(), 32);
        assert_well_formed(&solution);
    }

    #[test]
    fn test_all_bytes_mode() {
        let config = Config {
            use_all_chars: true,
            ..Config::default()
        };
        let solution = run(C89_KEYWORDS, config).unwrap();
        assert!(solution.positions.is_empty());
        assert_well_formed(&solution);
    }

    #[test]
    fn test_seven_bit_alphabet() {
        let config = Config {
            seven_bit: true,
            ..Config::default()
        };
        let solution = run(&["if", "do", "for"], config).unwrap();
        assert_eq!(solution.alpha_size, 128);
        assert_well_formed(&solution);
    }

    #[test]
    fn test_empty_keyword_is_rejected() {
        let err = run(&["a", ""], Config::default()).unwrap_err();
        assert_eq!(err, PhgenError::EmptyKeyword);
    }

    #[test]
    fn test_disjoint_union_keeps_differing_multiplicities() {
        let mut out = vec![];
        disjoint_union(&[1, 2, 2, 5], &[2, 3, 5], &mut out);
        assert_eq!(out, vec![1, 2, 3]);

        disjoint_union(&[7, 8], &[7, 8], &mut out);
        assert!(out.is_empty());

        disjoint_union(&[], &[4, 4, 9], &mut out);
        assert_eq!(out, vec![4, 9]);
    }
}
