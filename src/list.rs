//! Singly linked keyword lists threaded through the owning arena.
//!
//! The arena owns every keyword; a list is just a head id plus the `link`
//! fields of its members. Sorting therefore only rewires indices and never
//! moves a keyword.
use crate::keyword::KeywordExt;
use crate::NIL;

/// Merges two sorted lists into one sorted list. `less` decides whether
/// its first argument must precede its second.
fn merge<F>(arena: &mut [KeywordExt], mut list1: u32, mut list2: u32, less: &F) -> u32
where
    F: Fn(&KeywordExt, &KeywordExt) -> bool,
{
    let mut head = NIL;
    let mut tail = NIL;
    loop {
        if list1 == NIL || list2 == NIL {
            let rest = if list1 == NIL { list2 } else { list1 };
            if tail == NIL {
                return rest;
            }
            arena[tail as usize].link = rest;
            return head;
        }
        let next = if less(&arena[list2 as usize], &arena[list1 as usize]) {
            let next = list2;
            list2 = arena[next as usize].link;
            next
        } else {
            let next = list1;
            list1 = arena[next as usize].link;
            next
        };
        if tail == NIL {
            head = next;
        } else {
            arena[tail as usize].link = next;
        }
        tail = next;
    }
}

/// Sorts the list starting at `head` and returns the new head.
///
/// Top-down mergesort: a slow and a fast cursor find the middle, the two
/// halves sort recursively and merge. Recursion depth is logarithmic in
/// the list length, unlike the search's own backtracking.
pub(crate) fn merge_sort<F>(arena: &mut [KeywordExt], head: u32, less: &F) -> u32
where
    F: Fn(&KeywordExt, &KeywordExt) -> bool,
{
    if head == NIL || arena[head as usize].link == NIL {
        return head;
    }

    let mut middle = head;
    let mut probe = arena[arena[head as usize].link as usize].link;
    while probe != NIL {
        probe = arena[probe as usize].link;
        middle = arena[middle as usize].link;
        if probe != NIL {
            probe = arena[probe as usize].link;
        }
    }
    let tail = arena[middle as usize].link;
    arena[middle as usize].link = NIL;

    let list1 = merge_sort(arena, head, less);
    let list2 = merge_sort(arena, tail, less);
    merge(arena, list1, list2, less)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::Keyword;

    fn arena_with_hashes(hashes: &[u32]) -> (Vec<KeywordExt>, u32) {
        let mut arena: Vec<KeywordExt> = hashes
            .iter()
            .map(|&h| {
                let mut kw = KeywordExt::new(Keyword::new(&b"x"[..], ""));
                kw.hash_value = h;
                kw
            })
            .collect();
        let mut head = NIL;
        for id in (0..arena.len() as u32).rev() {
            arena[id as usize].link = head;
            head = id;
        }
        (arena, head)
    }

    fn collect(arena: &[KeywordExt], mut head: u32) -> Vec<u32> {
        let mut out = vec![];
        while head != NIL {
            out.push(arena[head as usize].hash_value);
            head = arena[head as usize].link;
        }
        out
    }

    #[test]
    fn test_sorts_ascending() {
        let (mut arena, head) = arena_with_hashes(&[5, 1, 4, 1, 9, 2, 6]);
        let head = merge_sort(&mut arena, head, &|a, b| a.hash_value < b.hash_value);
        assert_eq!(collect(&arena, head), vec![1, 1, 2, 4, 5, 6, 9]);
    }

    #[test]
    fn test_sorts_descending() {
        let (mut arena, head) = arena_with_hashes(&[3, 8, 0, 8]);
        let head = merge_sort(&mut arena, head, &|a, b| a.hash_value > b.hash_value);
        assert_eq!(collect(&arena, head), vec![8, 8, 3, 0]);
    }

    #[test]
    fn test_short_lists() {
        let (mut arena, _) = arena_with_hashes(&[7]);
        let head = merge_sort(&mut arena, 0, &|a, b| a.hash_value < b.hash_value);
        assert_eq!(collect(&arena, head), vec![7]);
        assert_eq!(
            merge_sort(&mut arena, NIL, &|a, b| a.hash_value < b.hash_value),
            NIL
        );
    }
}
