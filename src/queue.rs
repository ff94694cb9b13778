//! # State Queues
//!
//! The four task queues, one per task state (READY and RUNNING share
//! one). Each queue is a singly-linked list threaded through the TCB
//! pool via the intrusive `next` index, kept sorted ascending by
//! `priority_preemption`; insertion among equal keys is FIFO.
//!
//! Callers select no queue explicitly — both operations derive the
//! target from the TCB's current state, so state changes must happen
//! *after* `remove` and *before* `insert`. Neither operation masks
//! interrupts; callers hold the critical section.

use crate::task::{TaskId, TaskPool};

/// Which of the four queues. READY and RUNNING tasks share
/// [`QueueKind::Ready`]; the running task is its head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Dormant,
    Ready,
    Waiting,
    Suspended,
}

impl QueueKind {
    pub(crate) const COUNT: usize = 4;

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Heads of the four state queues.
pub(crate) struct TaskQueues {
    heads: [Option<TaskId>; QueueKind::COUNT],
}

impl TaskQueues {
    pub(crate) const fn new() -> Self {
        Self {
            heads: [None; QueueKind::COUNT],
        }
    }

    /// Head of a queue, if any.
    #[inline]
    pub(crate) fn head(&self, kind: QueueKind) -> Option<TaskId> {
        self.heads[kind.index()]
    }

    #[inline]
    pub(crate) fn is_empty(&self, kind: QueueKind) -> bool {
        self.head(kind).is_none()
    }

    /// Insert `id` into the queue selected by its state, in sorted
    /// position: before the first entry whose `priority_preemption` is
    /// strictly greater, i.e. after all entries with an equal key.
    ///
    /// The TCB must be free (not linked into any queue).
    pub(crate) fn insert<V>(&mut self, pool: &mut TaskPool<V>, id: TaskId) {
        debug_assert!(pool[id].next.is_none());

        let q = pool[id].state.queue().index();
        let key = pool[id].priority_preemption;

        // Insert at the head: empty queue, or the head sorts after us.
        match self.heads[q] {
            None => {
                self.heads[q] = Some(id);
                return;
            }
            Some(head) if key < pool[head].priority_preemption => {
                pool[id].next = Some(head);
                self.heads[q] = Some(id);
                return;
            }
            Some(head) => {
                // Walk to the last entry whose key is <= ours and
                // splice in behind it.
                let mut at = head;
                loop {
                    match pool[at].next {
                        Some(n) if pool[n].priority_preemption <= key => at = n,
                        after => {
                            pool[id].next = after;
                            pool[at].next = Some(id);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Unlink `id` from the queue selected by its state. No-op if the
    /// task is not present.
    pub(crate) fn remove<V>(&mut self, pool: &mut TaskPool<V>, id: TaskId) {
        let q = pool[id].state.queue().index();

        let Some(head) = self.heads[q] else { return };
        if head == id {
            self.heads[q] = pool[id].next.take();
            return;
        }

        let mut at = head;
        while let Some(n) = pool[at].next {
            if n == id {
                pool[at].next = pool[id].next.take();
                return;
            }
            at = n;
        }
    }

    /// Iterate a queue front to back.
    pub(crate) fn iter<'p, V>(
        &self,
        pool: &'p TaskPool<V>,
        kind: QueueKind,
    ) -> QueueIter<'p, V> {
        QueueIter {
            pool,
            cur: self.head(kind),
        }
    }
}

pub(crate) struct QueueIter<'p, V> {
    pool: &'p TaskPool<V>,
    cur: Option<TaskId>,
}

impl<V> Iterator for QueueIter<'_, V> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let id = self.cur?;
        self.cur = self.pool[id].next;
        Some(id)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;

    fn make_ready(pool: &mut TaskPool<()>, priority: u8) -> TaskId {
        let id = pool.allocate(priority).unwrap();
        pool[id].state = TaskState::Ready;
        id
    }

    fn ids(queues: &TaskQueues, pool: &TaskPool<()>, kind: QueueKind) -> Vec<TaskId> {
        queues.iter(pool, kind).collect()
    }

    #[test]
    fn test_insert_sorted_by_priority() {
        let mut pool: TaskPool<()> = TaskPool::new();
        let mut queues = TaskQueues::new();

        let mid = make_ready(&mut pool, 100);
        let high = make_ready(&mut pool, 10);
        let low = make_ready(&mut pool, 200);

        queues.insert(&mut pool, mid);
        queues.insert(&mut pool, low);
        queues.insert(&mut pool, high);

        assert_eq!(ids(&queues, &pool, QueueKind::Ready), vec![high, mid, low]);
    }

    #[test]
    fn test_insert_fifo_among_equals() {
        let mut pool: TaskPool<()> = TaskPool::new();
        let mut queues = TaskQueues::new();

        let a = make_ready(&mut pool, 100);
        let b = make_ready(&mut pool, 100);
        let c = make_ready(&mut pool, 100);

        queues.insert(&mut pool, a);
        queues.insert(&mut pool, b);
        queues.insert(&mut pool, c);

        // Equal keys append after their peers.
        assert_eq!(ids(&queues, &pool, QueueKind::Ready), vec![a, b, c]);
    }

    #[test]
    fn test_equal_key_insert_lands_after_lower_and_before_higher() {
        let mut pool: TaskPool<()> = TaskPool::new();
        let mut queues = TaskQueues::new();

        let high = make_ready(&mut pool, 50);
        let low = make_ready(&mut pool, 200);
        let mid1 = make_ready(&mut pool, 100);
        let mid2 = make_ready(&mut pool, 100);

        for id in [high, low, mid1, mid2] {
            queues.insert(&mut pool, id);
        }

        assert_eq!(
            ids(&queues, &pool, QueueKind::Ready),
            vec![high, mid1, mid2, low]
        );
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let mut pool: TaskPool<()> = TaskPool::new();
        let mut queues = TaskQueues::new();

        let a = make_ready(&mut pool, 1);
        let b = make_ready(&mut pool, 2);
        let c = make_ready(&mut pool, 3);
        for id in [a, b, c] {
            queues.insert(&mut pool, id);
        }

        queues.remove(&mut pool, b);
        assert_eq!(ids(&queues, &pool, QueueKind::Ready), vec![a, c]);
        assert!(pool[b].next.is_none());

        queues.remove(&mut pool, c);
        assert_eq!(ids(&queues, &pool, QueueKind::Ready), vec![a]);

        queues.remove(&mut pool, a);
        assert!(queues.is_empty(QueueKind::Ready));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut pool: TaskPool<()> = TaskPool::new();
        let mut queues = TaskQueues::new();

        let a = make_ready(&mut pool, 1);
        let stray = make_ready(&mut pool, 2);
        queues.insert(&mut pool, a);

        queues.remove(&mut pool, stray);
        assert_eq!(ids(&queues, &pool, QueueKind::Ready), vec![a]);
    }

    #[test]
    fn test_queue_selected_by_state() {
        let mut pool: TaskPool<()> = TaskPool::new();
        let mut queues = TaskQueues::new();

        let a = pool.allocate(100).unwrap();
        pool[a].state = TaskState::Suspended;
        queues.insert(&mut pool, a);

        assert!(queues.is_empty(QueueKind::Ready));
        assert_eq!(ids(&queues, &pool, QueueKind::Suspended), vec![a]);
    }
}
