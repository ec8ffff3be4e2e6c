use core::cell::{Cell, RefCell};

use badge_core::scheduler::{AbsoluteTime, Periodic, RelativeTime, Scheduler, Task};

struct Once<'a> {
    ran: &'a Cell<bool>,
}

impl Task for Once<'_> {
    fn run(&mut self, _: AbsoluteTime) {
        self.ran.set(true);
    }
}

struct Counting<'a> {
    periodic: Periodic,
    runs: &'a Cell<u32>,
    die_after: Option<u32>,
}

impl<'a> Counting<'a> {
    fn every(period: RelativeTime, runs: &'a Cell<u32>) -> Self {
        Self {
            periodic: Periodic::new(period),
            runs,
            die_after: None,
        }
    }
}

impl Task for Counting<'_> {
    fn run(&mut self, _: AbsoluteTime) {
        self.runs.set(self.runs.get() + 1);
        if self.die_after == Some(self.runs.get()) {
            self.periodic.kill();
        }
    }

    fn period(&self) -> Option<RelativeTime> {
        Some(self.periodic.period_ms())
    }

    fn is_alive(&self) -> bool {
        self.periodic.is_alive()
    }
}

#[test]
fn task_scheduled_now_waits_for_next_tick() {
    let ran = Cell::new(false);
    let task = RefCell::new(Once { ran: &ran });
    let mut scheduler = Scheduler::<16>::new();

    scheduler.tick(1);
    scheduler.schedule(&task, 0).unwrap();
    assert!(!ran.get(), "scheduling must not run the task");

    scheduler.tick(1);
    assert!(ran.get(), "a zero delay runs on the next tick");
}

#[test]
fn task_waits_for_its_deadline() {
    let ran = Cell::new(false);
    let task = RefCell::new(Once { ran: &ran });
    let mut scheduler = Scheduler::<16>::new();

    scheduler.tick(1);
    scheduler.schedule(&task, 100).unwrap();
    scheduler.tick(10);
    assert!(!ran.get(), "deadline is 101");
    scheduler.tick(100);
    assert!(!ran.get(), "deadline is 101");

    scheduler.tick(101);
    assert!(ran.get());
}

#[test]
fn late_tick_still_runs_task() {
    let ran = Cell::new(false);
    let task = RefCell::new(Once { ran: &ran });
    let mut scheduler = Scheduler::<16>::new();

    scheduler.tick(1);
    scheduler.schedule(&task, 100).unwrap();
    scheduler.tick(200);
    assert!(ran.get());
}

#[test]
fn one_shot_task_runs_once() {
    let ran = Cell::new(false);
    let task = RefCell::new(Once { ran: &ran });
    let mut scheduler = Scheduler::<16>::new();

    scheduler.tick(1);
    scheduler.schedule(&task, 100).unwrap();
    scheduler.tick(200);
    assert!(ran.get());

    ran.set(false);
    scheduler.tick(500);
    assert!(!ran.get(), "one-shot task must not run twice");
    assert!(scheduler.is_empty());
}

#[test]
fn tick_runs_every_due_task_and_only_those() {
    let ran: [Cell<bool>; 3] = Default::default();
    let at_50 = RefCell::new(Once { ran: &ran[0] });
    let at_100 = RefCell::new(Once { ran: &ran[1] });
    let at_150 = RefCell::new(Once { ran: &ran[2] });

    let mut scheduler = Scheduler::<16>::new();
    scheduler.schedule(&at_150, 150).unwrap();
    scheduler.schedule(&at_50, 50).unwrap();
    scheduler.schedule(&at_100, 100).unwrap();

    scheduler.tick(120);
    assert!(ran[0].get() && ran[1].get());
    assert!(!ran[2].get(), "task due at 150 ran at 120");

    scheduler.tick(200);
    assert!(ran[2].get());
}

#[test]
fn many_tasks_run_in_deadline_order() {
    struct Ordered<'a> {
        index: usize,
        order: &'a RefCell<Vec<usize>>,
    }

    impl Task for Ordered<'_> {
        fn run(&mut self, _: AbsoluteTime) {
            self.order.borrow_mut().push(self.index);
        }
    }

    let order = RefCell::new(Vec::new());
    let tasks: Vec<RefCell<Ordered<'_>>> = (0..16)
        .map(|index| {
            RefCell::new(Ordered {
                index,
                order: &order,
            })
        })
        .collect();

    let mut scheduler = Scheduler::<16>::new();
    // Insert in a scrambled order; 7 is coprime with 16.
    for step in 0..16 {
        let index = (step * 7) % 16;
        let delay = RelativeTime::try_from(index * 10 + 5).unwrap();
        scheduler.schedule(&tasks[index], delay).unwrap();
    }

    for round in 0..=16u64 {
        scheduler.tick(round * 10);
        let expected: Vec<usize> = (0..usize::try_from(round).unwrap()).collect();
        assert_eq!(
            *order.borrow(),
            expected,
            "first {round} tasks should have run at tick {}",
            round * 10
        );
    }
}

#[test]
fn periodic_task_not_run_before_first_period() {
    let runs = Cell::new(0);
    let task = RefCell::new(Counting::every(100, &runs));
    let mut scheduler = Scheduler::<16>::new();

    scheduler.schedule_periodic(&task).unwrap();
    scheduler.tick(50);
    assert_eq!(runs.get(), 0);
    scheduler.tick(100);
    assert_eq!(runs.get(), 1);
}

#[test]
fn periodic_task_second_run_waits_for_next_period() {
    let runs = Cell::new(0);
    let task = RefCell::new(Counting::every(100, &runs));
    let mut scheduler = Scheduler::<16>::new();

    scheduler.schedule_periodic(&task).unwrap();
    scheduler.tick(120);
    assert_eq!(runs.get(), 1);
    scheduler.tick(150);
    assert_eq!(runs.get(), 1, "next deadline is 200, not 220");
    scheduler.tick(200);
    assert_eq!(runs.get(), 2);
}

#[test]
fn periodic_task_is_rescheduled_each_period() {
    let runs = Cell::new(0);
    let task = RefCell::new(Counting::every(100, &runs));
    let mut scheduler = Scheduler::<16>::new();

    scheduler.schedule_periodic(&task).unwrap();
    for (tick, expected) in [(100, 1), (200, 2), (300, 3)] {
        scheduler.tick(tick);
        assert_eq!(runs.get(), expected, "run count at tick {tick}");
    }
}

#[test]
fn periodic_task_that_kills_itself_stops() {
    let runs = Cell::new(0);
    let mut counting = Counting::every(100, &runs);
    counting.die_after = Some(3);
    let task = RefCell::new(counting);
    let mut scheduler = Scheduler::<16>::new();

    scheduler.schedule_periodic(&task).unwrap();
    for tick in [100, 200, 300, 400, 500] {
        scheduler.tick(tick);
    }

    assert_eq!(runs.get(), 3);
    assert!(!scheduler.is_scheduled(&task));
}

#[test]
fn jittery_ticks_do_not_shift_periodic_phase() {
    let log = RefCell::new(Vec::new());

    struct Stamp<'a> {
        log: &'a RefCell<Vec<AbsoluteTime>>,
    }

    impl Task for Stamp<'_> {
        fn run(&mut self, now: AbsoluteTime) {
            self.log.borrow_mut().push(now);
        }

        fn period(&self) -> Option<RelativeTime> {
            Some(100)
        }
    }

    let task = RefCell::new(Stamp { log: &log });
    let mut scheduler = Scheduler::<16>::new();
    scheduler.schedule_periodic(&task).unwrap();

    for tick in [104, 230, 299, 301, 417] {
        scheduler.tick(tick);
    }

    assert_eq!(*log.borrow(), vec![104, 230, 301, 417]);
    assert_eq!(scheduler.next_deadline(), Some(500));
}
