//! Cooperative, deadline-ordered task scheduler.
//!
//! The scheduler is the only source of deferred or periodic execution on the
//! badge. Tasks are owned by whoever created them; the scheduler only keeps a
//! shared reference while a task is pending and borrows it mutably for the
//! duration of a single `run`.
//!
//! Pending tasks are kept sorted by deadline. Tasks sharing a deadline keep
//! their insertion order, which keeps a tick's execution order deterministic.

use core::cell::RefCell;
use core::fmt;

use heapless::Vec;

use crate::config::MAX_SCHEDULED_TASKS;

/// Monotonic time in milliseconds.
pub type AbsoluteTime = u64;

/// Millisecond delay relative to the scheduler's current time.
pub type RelativeTime = u32;

/// Unit of deferred work.
pub trait Task {
    /// Executes the task. `now` is the time passed to the current tick.
    fn run(&mut self, now: AbsoluteTime);

    /// Rescheduling period. `None` (or zero) marks a one-shot task.
    fn period(&self) -> Option<RelativeTime> {
        None
    }

    /// Periodic tasks stop being rescheduled once this returns `false`.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Shared handle the scheduler keeps while a task is pending.
pub type TaskRef<'a> = &'a RefCell<dyn Task + 'a>;

/// Period and liveness bookkeeping embedded by periodic tasks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Periodic {
    period_ms: RelativeTime,
    alive: bool,
}

impl Periodic {
    pub const fn new(period_ms: RelativeTime) -> Self {
        Self {
            period_ms,
            alive: true,
        }
    }

    pub const fn period_ms(&self) -> RelativeTime {
        self.period_ms
    }

    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    /// Stops further executions once the current run returns.
    pub fn kill(&mut self) {
        self.alive = false;
    }
}

/// Errors reported when handing a task to the scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleError {
    /// Every slot of the task table is in use.
    Full,
    /// The task is already pending.
    AlreadyScheduled,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::Full => f.write_str("scheduler task table is full"),
            ScheduleError::AlreadyScheduled => f.write_str("task is already scheduled"),
        }
    }
}

struct Entry<'a> {
    deadline: AbsoluteTime,
    // Tick pass during which the entry was inserted; such entries wait for
    // the next tick even when already due.
    pass: u32,
    task: TaskRef<'a>,
}

/// Fixed-capacity scheduler driven by an external clock.
pub struct Scheduler<'a, const CAPACITY: usize = MAX_SCHEDULED_TASKS> {
    pending: Vec<Entry<'a>, CAPACITY>,
    now: AbsoluteTime,
    pass: u32,
}

impl<'a, const CAPACITY: usize> Scheduler<'a, CAPACITY> {
    /// Creates an empty scheduler whose clock starts at zero.
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
            now: 0,
            pass: 0,
        }
    }

    /// Time passed to the most recent [`tick`](Self::tick).
    pub const fn now(&self) -> AbsoluteTime {
        self.now
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Deadline of the earliest pending task.
    pub fn next_deadline(&self) -> Option<AbsoluteTime> {
        self.pending.first().map(|entry| entry.deadline)
    }

    /// Returns `true` when `task` is currently pending.
    pub fn is_scheduled(&self, task: TaskRef<'a>) -> bool {
        self.pending
            .iter()
            .any(|entry| core::ptr::addr_eq(entry.task, task))
    }

    /// Schedules `task` to run once `delay_ms` has elapsed past the current
    /// time. A zero delay runs the task on the next tick.
    pub fn schedule(&mut self, task: TaskRef<'a>, delay_ms: RelativeTime) -> Result<(), ScheduleError> {
        if self.is_scheduled(task) {
            return Err(ScheduleError::AlreadyScheduled);
        }

        let deadline = self.now.saturating_add(AbsoluteTime::from(delay_ms));
        self.insert(Entry {
            deadline,
            pass: self.pass,
            task,
        })
    }

    /// Schedules a periodic task so its first run happens one period from now.
    pub fn schedule_periodic(&mut self, task: TaskRef<'a>) -> Result<(), ScheduleError> {
        let period = task.borrow().period().unwrap_or(0);
        self.schedule(task, period)
    }

    /// Runs every task whose deadline is at or before `now`, earliest first.
    ///
    /// Periodic tasks are rescheduled relative to the deadline they just met,
    /// so a late tick does not shift their phase. A rescheduled task never
    /// runs a second time within the same tick.
    pub fn tick(&mut self, now: AbsoluteTime) {
        self.now = self.now.max(now);
        self.pass = self.pass.wrapping_add(1);

        while let Some(index) = self.next_due() {
            let entry = self.pending.remove(index);

            let period = {
                let mut task = entry.task.borrow_mut();
                task.run(self.now);
                match task.period() {
                    Some(period) if period > 0 && task.is_alive() => Some(period),
                    _ => None,
                }
            };

            if let Some(period) = period {
                // The slot freed by the removal above is still available.
                let _ = self.insert(Entry {
                    deadline: entry.deadline.saturating_add(AbsoluteTime::from(period)),
                    pass: self.pass,
                    task: entry.task,
                });
            }
        }
    }

    fn next_due(&self) -> Option<usize> {
        self.pending
            .iter()
            .take_while(|entry| entry.deadline <= self.now)
            .position(|entry| entry.pass != self.pass)
    }

    fn insert(&mut self, entry: Entry<'a>) -> Result<(), ScheduleError> {
        let index = self
            .pending
            .iter()
            .position(|existing| existing.deadline > entry.deadline)
            .unwrap_or(self.pending.len());

        self.pending
            .insert(index, entry)
            .map_err(|_| ScheduleError::Full)
    }
}

impl<const CAPACITY: usize> Default for Scheduler<'_, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use heapless::Vec as HeaplessVec;

    struct Recorder<'a> {
        id: u8,
        log: &'a RefCell<HeaplessVec<(u8, AbsoluteTime), 32>>,
        periodic: Option<Periodic>,
        die_after: Option<u32>,
        runs: u32,
    }

    impl<'a> Recorder<'a> {
        fn once(id: u8, log: &'a RefCell<HeaplessVec<(u8, AbsoluteTime), 32>>) -> Self {
            Self {
                id,
                log,
                periodic: None,
                die_after: None,
                runs: 0,
            }
        }

        fn every(
            id: u8,
            period: RelativeTime,
            log: &'a RefCell<HeaplessVec<(u8, AbsoluteTime), 32>>,
        ) -> Self {
            Self {
                periodic: Some(Periodic::new(period)),
                ..Self::once(id, log)
            }
        }
    }

    impl Task for Recorder<'_> {
        fn run(&mut self, now: AbsoluteTime) {
            self.runs += 1;
            self.log.borrow_mut().push((self.id, now)).unwrap();
            if let (Some(limit), Some(periodic)) = (self.die_after, self.periodic.as_mut())
                && self.runs >= limit
            {
                periodic.kill();
            }
        }

        fn period(&self) -> Option<RelativeTime> {
            self.periodic.map(|periodic| periodic.period_ms())
        }

        fn is_alive(&self) -> bool {
            self.periodic.is_none_or(|periodic| periodic.is_alive())
        }
    }

    fn ids(log: &RefCell<HeaplessVec<(u8, AbsoluteTime), 32>>) -> HeaplessVec<u8, 32> {
        log.borrow().iter().map(|(id, _)| *id).collect()
    }

    #[test]
    fn equal_deadlines_keep_insertion_order() {
        let log = RefCell::new(HeaplessVec::new());
        let first = RefCell::new(Recorder::once(1, &log));
        let second = RefCell::new(Recorder::once(2, &log));
        let third = RefCell::new(Recorder::once(3, &log));

        let mut scheduler = Scheduler::<4>::new();
        scheduler.schedule(&second, 10).unwrap();
        scheduler.schedule(&first, 5).unwrap();
        scheduler.schedule(&third, 10).unwrap();
        scheduler.tick(10);

        assert_eq!(ids(&log).as_slice(), &[1, 2, 3]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn pending_task_cannot_be_added_twice() {
        let log = RefCell::new(HeaplessVec::new());
        let task = RefCell::new(Recorder::once(1, &log));

        let mut scheduler = Scheduler::<4>::new();
        scheduler.schedule(&task, 10).unwrap();
        assert_eq!(
            scheduler.schedule(&task, 20),
            Err(ScheduleError::AlreadyScheduled)
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn capacity_overflow_is_reported() {
        let log = RefCell::new(HeaplessVec::new());
        let a = RefCell::new(Recorder::once(1, &log));
        let b = RefCell::new(Recorder::once(2, &log));
        let c = RefCell::new(Recorder::once(3, &log));

        let mut scheduler = Scheduler::<2>::new();
        scheduler.schedule(&a, 1).unwrap();
        scheduler.schedule(&b, 1).unwrap();
        assert_eq!(scheduler.schedule(&c, 1), Err(ScheduleError::Full));
    }

    #[test]
    fn late_tick_runs_periodic_task_once_and_keeps_phase() {
        let log = RefCell::new(HeaplessVec::new());
        let task = RefCell::new(Recorder::every(7, 100, &log));

        let mut scheduler = Scheduler::<4>::new();
        scheduler.schedule_periodic(&task).unwrap();

        scheduler.tick(250);
        assert_eq!(log.borrow().len(), 1, "one run per tick even when late");
        assert_eq!(scheduler.next_deadline(), Some(200));

        scheduler.tick(251);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(scheduler.next_deadline(), Some(300));
    }

    #[test]
    fn killed_periodic_task_is_dropped() {
        let log = RefCell::new(HeaplessVec::new());
        let mut recorder = Recorder::every(1, 10, &log);
        recorder.die_after = Some(2);
        let task = RefCell::new(recorder);

        let mut scheduler = Scheduler::<4>::new();
        scheduler.schedule_periodic(&task).unwrap();
        for now in [10, 20, 30, 40] {
            scheduler.tick(now);
        }

        assert_eq!(task.borrow().runs, 2);
        assert!(!scheduler.is_scheduled(&task));
    }

    #[test]
    fn zero_period_behaves_as_one_shot() {
        struct Counter<'a>(&'a Cell<u32>);

        impl Task for Counter<'_> {
            fn run(&mut self, _: AbsoluteTime) {
                self.0.set(self.0.get() + 1);
            }

            fn period(&self) -> Option<RelativeTime> {
                Some(0)
            }
        }

        let count = Cell::new(0);
        let task = RefCell::new(Counter(&count));
        let mut scheduler = Scheduler::<2>::new();
        scheduler.schedule(&task, 0).unwrap();
        scheduler.tick(0);
        scheduler.tick(1);

        assert_eq!(count.get(), 1);
        assert!(scheduler.is_empty());
    }
}
