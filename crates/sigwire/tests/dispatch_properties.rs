//! Dispatch behavior under self-modification.
//!
//! Covers:
//! 1. Pairing: every connection is visible from both ends.
//! 2. Delivery order follows insertion position.
//! 3. Callbacks may disconnect themselves, later entries or earlier entries.
//! 4. Reentrant emission delivers to every live entry at each level.
//! 5. Dropping participants closes exactly their connections.
//! 6. Scan-based disconnect counts.
//! 7. Forwarding chains and cycles.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use sigwire::{Emitter, EmitterConfig, Observe, Observer, Scan, Slot};

// ── Fixtures ──────────────────────────────────────────────────────────────

type Log = Rc<RefCell<Vec<u32>>>;

struct Probe {
    observer: Observer,
    tag: u32,
    log: Log,
}

impl Observe for Probe {
    fn observer(&self) -> &Observer {
        &self.observer
    }
}

impl Probe {
    fn record(&self, _: &u32, _: &Slot) {
        self.log.borrow_mut().push(self.tag);
    }

    fn record_arg(&self, arg: &u32, _: &Slot) {
        self.log.borrow_mut().push(self.tag * 100 + arg);
    }

    fn record_once(&self, _: &u32, slot: &Slot) {
        self.log.borrow_mut().push(self.tag);
        assert_eq!(self.observer.disconnect(slot.connection()), Ok(()));
        assert!(slot.connection_closed());
    }
}

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn probe(tag: u32, log: &Log) -> Rc<Probe> {
    Rc::new(Probe {
        observer: Observer::new(),
        tag,
        log: Rc::clone(log),
    })
}

fn take(log: &Log) -> Vec<u32> {
    std::mem::take(&mut *log.borrow_mut())
}

// ── Pairing and order ─────────────────────────────────────────────────────

#[test]
fn connection_counts_agree_on_both_ends() {
    let log = new_log();
    let first: Emitter<u32> = Emitter::new();
    let second: Emitter<u32> = Emitter::new();
    let p = probe(1, &log);
    let q = probe(2, &log);

    first.connect(&p, Probe::record);
    first.connect(&q, Probe::record);
    second.connect(&p, Probe::record);

    assert_eq!(first.count_connections(), 2);
    assert_eq!(second.count_connections(), 1);
    assert_eq!(p.observer.count_connections(), 2);
    assert_eq!(q.observer.count_connections(), 1);
    assert!(first.is_connected_to_observer(&q.observer));
    assert!(!second.is_connected_to_observer(&q.observer));
}

#[test]
fn delivers_in_connection_order() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let probes: Vec<_> = (1..=5).map(|tag| probe(tag, &log)).collect();
    for p in &probes {
        emitter.connect(p, Probe::record);
    }
    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 2, 3, 4, 5]);
}

#[test]
fn positional_connect() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let (p1, p2, p3, p4) = (probe(1, &log), probe(2, &log), probe(3, &log), probe(4, &log));

    emitter.connect(&p1, Probe::record);
    emitter.connect(&p2, Probe::record);
    emitter.connect(&p3, Probe::record);
    emitter.connect_at(&p4, Probe::record, 1);
    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 4, 2, 3]);

    let p5 = probe(5, &log);
    let p6 = probe(6, &log);
    emitter.connect_at(&p5, Probe::record, -100);
    emitter.connect_at(&p6, Probe::record, 100);
    emitter.emit(0);
    assert_eq!(take(&log), vec![5, 1, 4, 2, 3, 6]);
}

#[test]
fn arguments_reach_every_connection() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let p = probe(1, &log);
    let q = probe(2, &log);
    emitter.connect(&p, Probe::record_arg);
    emitter.connect(&q, Probe::record_arg);
    emitter.emit(7);
    assert_eq!(take(&log), vec![107, 207]);
}

// ── Self-modification ─────────────────────────────────────────────────────

#[test]
fn callback_disconnects_itself() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let p = probe(1, &log);
    let q = probe(2, &log);
    let r = probe(3, &log);
    emitter.connect(&p, Probe::record);
    emitter.connect(&q, Probe::record_once);
    emitter.connect(&r, Probe::record);

    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 2, 3]);
    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 3]);
    assert_eq!(q.observer.count_connections(), 0);
}

#[test]
fn callback_disconnects_the_following_entry() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let owner = Observer::new();
    let victim = probe(2, &log);
    let tail = probe(3, &log);

    let weak_victim = Rc::downgrade(&victim);
    let sink = Rc::clone(&log);
    emitter.connect_fn(&owner, move |_, _| {
        sink.borrow_mut().push(1);
        if let Some(victim) = weak_victim.upgrade() {
            victim.observer.disconnect_all();
        }
    });
    emitter.connect(&victim, Probe::record);
    emitter.connect(&tail, Probe::record);

    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 3]);
}

#[test]
fn callback_disconnects_an_earlier_entry() {
    let log = new_log();
    let emitter: Rc<Emitter<u32>> = Rc::new(Emitter::new());
    let head = probe(1, &log);
    let owner = Observer::new();
    let tail = probe(3, &log);

    emitter.connect(&head, Probe::record);
    let weak_emitter = Rc::downgrade(&emitter);
    let weak_head = Rc::downgrade(&head);
    let sink = Rc::clone(&log);
    emitter.connect_fn(&owner, move |_, _| {
        sink.borrow_mut().push(2);
        if let (Some(emitter), Some(head)) = (weak_emitter.upgrade(), weak_head.upgrade()) {
            emitter.disconnect(&head, Probe::record, Scan::default());
        }
    });
    emitter.connect(&tail, Probe::record);

    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 2, 3]);
    emitter.emit(0);
    assert_eq!(take(&log), vec![2, 3]);
}

#[test]
fn callback_drops_the_observer_of_later_entries() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let owner = Observer::new();
    let doomed: Rc<RefCell<Option<Rc<Probe>>>> = Rc::new(RefCell::new(Some(probe(2, &log))));

    let holder = Rc::clone(&doomed);
    let sink = Rc::clone(&log);
    emitter.connect_fn(&owner, move |_, _| {
        sink.borrow_mut().push(1);
        holder.borrow_mut().take();
    });
    if let Some(p) = doomed.borrow().as_ref() {
        emitter.connect(p, Probe::record);
        emitter.connect(p, Probe::record_arg);
    }
    let tail = probe(3, &log);
    emitter.connect(&tail, Probe::record);

    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 3]);
    assert_eq!(emitter.count_connections(), 2);
}

#[test]
fn entry_connected_during_emit_is_visited() {
    let log = new_log();
    let emitter: Rc<Emitter<u32>> = Rc::new(Emitter::new());
    let owner = Observer::new();
    let late = probe(9, &log);

    let weak_emitter = Rc::downgrade(&emitter);
    let weak_late = Rc::downgrade(&late);
    let added = Rc::new(Cell::new(false));
    let flag = Rc::clone(&added);
    let sink = Rc::clone(&log);
    emitter.connect_fn(&owner, move |_, _| {
        sink.borrow_mut().push(1);
        if flag.replace(true) {
            return;
        }
        if let (Some(emitter), Some(late)) = (weak_emitter.upgrade(), weak_late.upgrade()) {
            emitter.connect(&late, Probe::record);
            // Inserted before the running cursor: not visited this pass.
            emitter.connect_at(&late, Probe::record_arg, 0);
        }
    });

    emitter.emit(5);
    assert_eq!(take(&log), vec![1, 9]);
    emitter.emit(5);
    assert_eq!(take(&log), vec![905, 1, 9]);
}

// ── Reentrancy ────────────────────────────────────────────────────────────

#[test]
fn reentrant_emit_delivers_each_level() {
    let log = new_log();
    let emitter: Rc<Emitter<u32>> = Rc::new(Emitter::new());
    let owner = Observer::new();
    let tail = probe(7, &log);

    let weak_emitter = Rc::downgrade(&emitter);
    let sink = Rc::clone(&log);
    emitter.connect_fn(&owner, move |level, slot| {
        sink.borrow_mut().push(*level);
        assert_eq!(slot.depth() as u32, *level + 1);
        if *level < 2 {
            if let Some(emitter) = weak_emitter.upgrade() {
                emitter.emit(level + 1);
            }
        }
    });
    emitter.connect(&tail, Probe::record_arg);

    emitter.emit(0);
    assert_eq!(take(&log), vec![0, 1, 2, 702, 701, 700]);
    assert_eq!(emitter.depth(), 0);
}

#[test]
fn nested_emit_removing_entry_under_outer_cursor() {
    let log = new_log();
    let emitter: Rc<Emitter<u32>> = Rc::new(Emitter::new());
    let owner = Rc::new(Observer::new());
    let middle = probe(2, &log);
    let tail = probe(3, &log);

    let weak_emitter = Rc::downgrade(&emitter);
    let inner_owner = Rc::clone(&owner);
    let sink = Rc::clone(&log);
    emitter.connect_fn(&owner, move |level, slot| {
        sink.borrow_mut().push(10 + level);
        if *level == 0 {
            if let Some(emitter) = weak_emitter.upgrade() {
                emitter.emit(1);
            }
        } else {
            // The outer emission is still positioned on this entry.
            assert_eq!(inner_owner.disconnect(slot.connection()), Ok(()));
        }
    });
    emitter.connect(&middle, Probe::record);
    emitter.connect(&tail, Probe::record);

    emitter.emit(0);
    assert_eq!(take(&log), vec![10, 11, 2, 3, 2, 3]);
    assert_eq!(emitter.count_connections(), 2);
    assert_eq!(owner.count_connections(), 0);
}

// ── Destruction ───────────────────────────────────────────────────────────

#[test]
fn dropping_observer_closes_connections_on_every_emitter() {
    let log = new_log();
    let a: Emitter<u32> = Emitter::new();
    let b: Emitter<u32> = Emitter::new();
    let p = probe(1, &log);
    let q = probe(2, &log);

    a.connect(&p, Probe::record);
    a.connect(&q, Probe::record);
    a.connect(&p, Probe::record_arg);
    b.connect(&p, Probe::record_arg);
    assert_eq!(p.observer.count_connections(), 3);

    drop(p);
    assert_eq!(a.count_connections(), 1);
    assert_eq!(b.count_connections(), 0);
    a.emit(0);
    b.emit(0);
    assert_eq!(take(&log), vec![2]);
}

#[test]
fn dropping_emitter_closes_anchors() {
    let log = new_log();
    let p = probe(1, &log);
    {
        let a: Emitter<u32> = Emitter::new();
        let b: Emitter<u32> = Emitter::new();
        a.connect(&p, Probe::record);
        a.connect(&p, Probe::record_arg);
        b.connect(&p, Probe::record);
        assert_eq!(p.observer.count_connections(), 3);
    }
    assert_eq!(p.observer.count_connections(), 0);
}

#[test]
fn callback_releasing_a_handle_to_the_emitter() {
    let log = new_log();
    let holder: Rc<RefCell<Option<Rc<Emitter<u32>>>>> = Rc::new(RefCell::new(None));
    let emitter = Rc::new(Emitter::new());
    *holder.borrow_mut() = Some(Rc::clone(&emitter));

    let owner = Observer::new();
    let tail = probe(2, &log);
    let cell = Rc::clone(&holder);
    let sink = Rc::clone(&log);
    emitter.connect_fn(&owner, move |_, _| {
        sink.borrow_mut().push(1);
        cell.borrow_mut().take();
    });
    emitter.connect(&tail, Probe::record);

    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 2]);
    assert!(holder.borrow().is_none());
    drop(emitter);
    assert_eq!(tail.observer.count_connections(), 0);
    assert_eq!(owner.count_connections(), 0);
}

// ── Scan-based disconnect ─────────────────────────────────────────────────

#[test]
fn disconnect_counts() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let p = probe(1, &log);
    for _ in 0..5 {
        emitter.connect(&p, Probe::record);
    }

    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::last(2)), 2);
    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::last(2)), 2);
    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::last(2)), 1);
    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::last(2)), 0);

    for _ in 0..3 {
        emitter.connect(&p, Probe::record);
    }
    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::first(2)), 2);
    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::all()), 1);
    assert_eq!(p.observer.count_connections(), 0);
}

#[test]
fn disconnect_scan_respects_start() {
    let log = new_log();
    let emitter: Emitter<u32> = Emitter::new();
    let p = probe(1, &log);
    let q = probe(2, &log);
    // p q p q p
    emitter.connect(&p, Probe::record);
    emitter.connect(&q, Probe::record);
    emitter.connect(&p, Probe::record);
    emitter.connect(&q, Probe::record);
    emitter.connect(&p, Probe::record_arg);

    // From index 1 toward the back, first match of p/record is position 2.
    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::new(1, 1)), 1);
    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 2, 2, 100]);

    // From the second-to-last entry toward the front.
    assert_eq!(emitter.disconnect(&q, Probe::record, Scan::new(-2, -1)), 2);
    emitter.emit(0);
    assert_eq!(take(&log), vec![1, 100]);
    assert_eq!(emitter.disconnect(&p, Probe::record, Scan::new(0, 0)), 0);
}

#[test]
fn closures_are_only_removed_unconditionally() {
    let emitter: Emitter<u32> = Emitter::new();
    let owner = Observer::new();
    let hits = Rc::new(Cell::new(0));
    let counter = Rc::clone(&hits);
    emitter.connect_fn(&owner, move |_, _| counter.set(counter.get() + 1));

    emitter.emit(0);
    assert_eq!(owner.count_connections(), 1);
    assert_eq!(emitter.disconnect_any(Scan::default()), 1);
    emitter.emit(0);
    assert_eq!(hits.get(), 1);
}

// ── Forwarding ────────────────────────────────────────────────────────────

#[test]
fn forwarding_chain_delivers_in_order() {
    let log = new_log();
    let a: Emitter<u32> = Emitter::new();
    let b: Emitter<u32> = Emitter::new();
    let c: Emitter<u32> = Emitter::new();
    let p = probe(1, &log);
    let q = probe(2, &log);
    let r = probe(3, &log);

    a.connect(&p, Probe::record);
    a.connect_emitter(&b);
    a.connect(&r, Probe::record);
    b.connect_emitter(&c);
    c.connect(&q, Probe::record);

    a.emit(0);
    assert_eq!(take(&log), vec![1, 2, 3]);
    assert_eq!(c.count_bindings(), 1);

    drop(b);
    a.emit(0);
    assert_eq!(take(&log), vec![1, 3]);
    assert_eq!(c.count_bindings(), 0);
    assert_eq!(a.count_connections(), 2);
}

#[test]
fn forwarding_cycle_is_bounded_by_depth() {
    let log = new_log();
    let a: Emitter<u32> = Emitter::with_config(EmitterConfig::new(4));
    let b: Emitter<u32> = Emitter::with_config(EmitterConfig::new(4));
    let p = probe(1, &log);

    a.connect_emitter(&b);
    b.connect_emitter(&a);
    b.connect(&p, Probe::record);

    assert_eq!(a.try_emit(0), Ok(()));
    assert_eq!(take(&log), vec![1, 1, 1, 1]);
    assert_eq!(a.depth(), 0);
    assert_eq!(b.depth(), 0);
}

#[test]
fn slot_identifies_the_emitter() {
    let seen = Rc::new(Cell::new(false));
    let emitter: Rc<Emitter<u32>> = Rc::new(Emitter::new());
    let owner = Observer::new();
    let weak = Rc::downgrade(&emitter);
    let flag = Rc::clone(&seen);
    let owner_id = owner.id();
    emitter.connect_fn(&owner, move |_, slot| {
        let emitter = weak.upgrade();
        flag.set(emitter.is_some_and(|e| slot.is_emitted_by(&*e)) && slot.observer_id() == owner_id);
    });
    emitter.emit(0);
    assert!(seen.get());
}
