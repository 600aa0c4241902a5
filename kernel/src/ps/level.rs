//! Priority Levels
//!
//! The MLFQ ready structure: one queue per priority level, threaded
//! through the process table by slot index. A process enters a level at
//! the head and leaves from the tail, so each level is FIFO in the order
//! processes became runnable.
//!
//! A slot is linked into `levels[p.level]` exactly when its state is
//! RUNNABLE. `enqueue` is the only way into that state for a process in
//! the table; `dequeue` and `remove_from_level` are the only ways out of
//! a queue. The level of a process only changes while it is unlinked.
//!
//! All functions here run under the process table lock (they take the
//! `ProcTable` by reference, which only the lock guard hands out).

use super::{ProcState, ProcTable};
use crate::ke::bugcheck::{codes, ke_bug_check_ex};
use crate::param::PLEVELS;

/// One priority level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    /// Most recently enqueued slot
    pub(crate) head: Option<usize>,
    /// Oldest slot, next to be dispatched
    pub(crate) last: Option<usize>,
    len: usize,
}

impl Level {
    pub const fn new() -> Self {
        Self {
            head: None,
            last: None,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::new()
    }
}

fn check_level(level: usize) {
    if level >= PLEVELS {
        ke_bug_check_ex(codes::INVALID_PRIORITY_LEVEL, level as u64, "priority level out of range");
    }
}

impl ProcTable {
    /// Is `slot` linked into its level?
    pub fn is_linked(&self, slot: usize) -> bool {
        let p = &self.procs[slot];
        p.back.is_some()
            || p.next.is_some()
            || (p.level < PLEVELS && self.levels[p.level].head == Some(slot))
    }

    /// Link `slot` at the head of its level and mark it RUNNABLE
    pub fn enqueue(&mut self, slot: usize) {
        if self.procs[slot].state == ProcState::Unused {
            ke_bug_check_ex(codes::NULL_PROCESS, slot as u64, "enqueue of unused slot");
        }
        if self.is_linked(slot) {
            ke_bug_check_ex(codes::PROCESS_ALREADY_QUEUED, slot as u64, "enqueue");
        }
        let level = self.procs[slot].level;
        check_level(level);

        let old_head = self.levels[level].head;
        let p = &mut self.procs[slot];
        p.state = ProcState::Runnable;
        p.next = old_head;
        p.back = None;

        match old_head {
            Some(head) => self.procs[head].back = Some(slot),
            None => self.levels[level].last = Some(slot),
        }
        self.levels[level].head = Some(slot);
        self.levels[level].len += 1;

        log::trace!("enqueue pid {} at level {}", self.procs[slot].pid, level);
    }

    /// Unlink and return the oldest slot of `level`
    ///
    /// The caller sets the new state; the slot is left RUNNABLE but
    /// unlinked.
    pub fn dequeue(&mut self, level: usize) -> usize {
        check_level(level);
        let slot = match self.levels[level].last {
            Some(slot) => slot,
            None => ke_bug_check_ex(codes::EMPTY_LEVEL_DEQUEUE, level as u64, "dequeue"),
        };

        match self.procs[slot].back {
            Some(back) => {
                self.procs[back].next = None;
                self.levels[level].last = Some(back);
            }
            None => {
                self.levels[level].head = None;
                self.levels[level].last = None;
            }
        }
        self.levels[level].len -= 1;

        let p = &mut self.procs[slot];
        p.back = None;
        p.next = None;
        log::trace!("dequeue pid {} from level {}", p.pid, level);
        slot
    }

    /// Is `level` empty?
    pub fn is_level_empty(&self, level: usize) -> bool {
        check_level(level);
        self.levels[level].is_empty()
    }

    /// Unlink `slot` from wherever it sits in its level
    pub fn remove_from_level(&mut self, slot: usize) {
        if !self.is_linked(slot) {
            ke_bug_check_ex(codes::PROCESS_NOT_QUEUED, slot as u64, "remove_from_level");
        }
        let level = self.procs[slot].level;
        let (back, next) = (self.procs[slot].back, self.procs[slot].next);

        match back {
            Some(b) => self.procs[b].next = next,
            None => self.levels[level].head = next,
        }
        match next {
            Some(n) => self.procs[n].back = back,
            None => self.levels[level].last = back,
        }
        self.levels[level].len -= 1;

        let p = &mut self.procs[slot];
        p.back = None;
        p.next = None;
    }

    /// Move an unlinked `slot` one level toward 0, if not already there
    pub fn raise_priority(&mut self, slot: usize) {
        self.check_movable(slot);
        let p = &mut self.procs[slot];
        if p.level > 0 {
            p.level -= 1;
        }
    }

    /// Move an unlinked `slot` one level toward the floor, if not already there
    pub fn lower_priority(&mut self, slot: usize) {
        self.check_movable(slot);
        let p = &mut self.procs[slot];
        if p.level < PLEVELS - 1 {
            p.level += 1;
        }
    }

    fn check_movable(&self, slot: usize) {
        if self.procs[slot].state == ProcState::Unused {
            ke_bug_check_ex(codes::NULL_PROCESS, slot as u64, "priority change of unused slot");
        }
        if self.is_linked(slot) {
            ke_bug_check_ex(codes::PROCESS_ALREADY_QUEUED, slot as u64, "priority change while queued");
        }
    }

    /// Highest-priority level with a runnable process
    pub fn first_ready_level(&self) -> Option<usize> {
        (0..PLEVELS).find(|&level| !self.is_level_empty(level))
    }

    /// Slots of `level`, head (newest) to tail (oldest)
    pub fn level_slots(&self, level: usize) -> LevelIter<'_> {
        check_level(level);
        LevelIter {
            table: self,
            cursor: self.levels[level].head,
        }
    }

    #[inline]
    pub fn level(&self, level: usize) -> &super::Level {
        check_level(level);
        &self.levels[level]
    }
}

/// Walks one level from head to tail
pub struct LevelIter<'a> {
    table: &'a ProcTable,
    cursor: Option<usize>,
}

impl Iterator for LevelIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let slot = self.cursor?;
        self.cursor = self.table.procs[slot].next;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn table_with(levels: &[usize]) -> (ProcTable, Vec<usize>) {
        let mut table = ProcTable::new();
        let slots = levels
            .iter()
            .map(|&level| table.allocate(level).unwrap().0)
            .collect();
        (table, slots)
    }

    fn assert_linkage(table: &ProcTable) {
        for (slot, p) in table.procs.iter().enumerate() {
            let linked = (0..PLEVELS).any(|l| table.level_slots(l).any(|s| s == slot));
            assert_eq!(linked, p.state == ProcState::Runnable, "slot {}", slot);
            if linked {
                assert!(table.level_slots(p.level).any(|s| s == slot));
            }
        }
        for l in 0..PLEVELS {
            assert_eq!(table.level_slots(l).count(), table.level(l).len());
        }
    }

    #[test]
    fn test_fifo_within_level() {
        let (mut table, slots) = table_with(&[1, 1, 1]);
        for &s in &slots {
            table.enqueue(s);
        }
        assert_linkage(&table);

        assert_eq!(table.dequeue(1), slots[0]);
        assert_eq!(table.dequeue(1), slots[1]);
        assert_eq!(table.dequeue(1), slots[2]);
        assert!(table.is_level_empty(1));
    }

    #[test]
    fn test_enqueue_marks_runnable_and_links_head() {
        let (mut table, slots) = table_with(&[0, 0]);
        table.enqueue(slots[0]);
        table.enqueue(slots[1]);

        assert_eq!(table.proc(slots[0]).state, ProcState::Runnable);
        let order: Vec<usize> = table.level_slots(0).collect();
        assert_eq!(order, [slots[1], slots[0]]);
    }

    #[test]
    fn test_remove_patches_neighbours() {
        let (mut table, slots) = table_with(&[2, 2, 2, 2]);
        for &s in &slots {
            table.enqueue(s);
        }

        // middle
        table.remove_from_level(slots[1]);
        // tail
        table.remove_from_level(slots[0]);
        // head
        table.remove_from_level(slots[3]);

        let order: Vec<usize> = table.level_slots(2).collect();
        assert_eq!(order, [slots[2]]);
        assert_eq!(table.level(2).last, Some(slots[2]));

        table.remove_from_level(slots[2]);
        assert!(table.is_level_empty(2));
        assert_eq!(table.level(2).last, None);
    }

    #[test]
    fn test_first_ready_level_is_strict_priority() {
        let (mut table, slots) = table_with(&[3, 1, 2]);
        assert_eq!(table.first_ready_level(), None);
        for &s in &slots {
            table.enqueue(s);
        }
        assert_eq!(table.first_ready_level(), Some(1));
        table.dequeue(1);
        assert_eq!(table.first_ready_level(), Some(2));
    }

    #[test]
    fn test_priority_moves_saturate() {
        let (mut table, slots) = table_with(&[0, PLEVELS - 1]);
        table.raise_priority(slots[0]);
        table.lower_priority(slots[1]);
        assert_eq!(table.proc(slots[0]).level, 0);
        assert_eq!(table.proc(slots[1]).level, PLEVELS - 1);

        table.lower_priority(slots[0]);
        table.raise_priority(slots[1]);
        assert_eq!(table.proc(slots[0]).level, 1);
        assert_eq!(table.proc(slots[1]).level, PLEVELS - 2);
    }

    #[test]
    fn test_single_member_is_linked() {
        let (mut table, slots) = table_with(&[0]);
        assert!(!table.is_linked(slots[0]));
        table.enqueue(slots[0]);
        assert!(table.is_linked(slots[0]));
        table.dequeue(0);
        assert!(!table.is_linked(slots[0]));
    }

    #[test]
    #[should_panic(expected = "EMPTY_LEVEL_DEQUEUE")]
    fn test_dequeue_empty_level_is_fatal() {
        let mut table = ProcTable::new();
        table.dequeue(0);
    }

    #[test]
    #[should_panic(expected = "PROCESS_NOT_QUEUED")]
    fn test_remove_unlinked_is_fatal() {
        let (mut table, slots) = table_with(&[0]);
        table.remove_from_level(slots[0]);
    }

    #[test]
    #[should_panic(expected = "PROCESS_ALREADY_QUEUED")]
    fn test_double_enqueue_is_fatal() {
        let (mut table, slots) = table_with(&[0]);
        table.enqueue(slots[0]);
        table.enqueue(slots[0]);
    }

    #[test]
    #[should_panic(expected = "INVALID_PRIORITY_LEVEL")]
    fn test_is_empty_on_bad_level_is_fatal() {
        let table = ProcTable::new();
        table.is_level_empty(PLEVELS);
    }

    #[test]
    #[should_panic(expected = "NULL_PROCESS")]
    fn test_enqueue_unused_is_fatal() {
        let mut table = ProcTable::new();
        table.enqueue(0);
    }
}
