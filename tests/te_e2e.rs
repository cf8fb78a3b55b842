//! End-to-end tests of the temporal-expression operators.
//!
//! Each test drives the engine externally: set the signal values for a
//! cycle, post the sampling event, run to that instant, repeat. Matches
//! and failures are collected through `always` callbacks as
//! `(start_cycle, report_cycle)` pairs and compared sorted, since
//! several evaluations may report within the same instant.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use oroboro::{Engine, EventId, Expr, VirtualTime};

type Sig = Rc<Cell<bool>>;
type Hits = Rc<RefCell<Vec<(u64, u64)>>>;

fn sig() -> Sig {
    Rc::new(Cell::new(false))
}

fn bit(name: &str, s: &Sig) -> Expr {
    let probe = Rc::clone(s);
    Expr::pred(name, move || probe.get())
}

/// An expression that holds at every cycle.
fn ok() -> Expr {
    Expr::pred("ok", || true)
}

fn collect(engine: &mut Engine, sampler: EventId, expr: Expr) -> (Hits, Hits) {
    let matches: Hits = Rc::default();
    let fails: Hits = Rc::default();
    let m = Rc::clone(&matches);
    let f = Rc::clone(&fails);
    engine
        .always(
            sampler,
            expr,
            move |rec| m.borrow_mut().push((rec.start, rec.end)),
            move |rec| f.borrow_mut().push((rec.start, rec.at)),
        )
        .unwrap();
    (matches, fails)
}

/// Posts the sampler once per cycle at t = 10, 20, ..., applying the
/// per-cycle signal assignments first.
fn drive(engine: &mut Engine, sampler: EventId, cycles: usize, mut set: impl FnMut(usize)) {
    for i in 0..cycles {
        set(i);
        let t = VirtualTime::from_ticks((i as u64 + 1) * 10);
        engine.post_at(t, sampler).unwrap();
        engine.run_until(t).unwrap();
    }
}

fn sorted(hits: &Hits) -> Vec<(u64, u64)> {
    let mut v = hits.borrow().clone();
    v.sort_unstable();
    v
}

fn apply(values: &[u8], s: &Sig, i: usize) {
    s.set(values[i] == 1);
}

#[test]
fn pred_matches_exactly_the_high_cycles() {
    let mut engine = Engine::new();
    let sampler = engine.event_named("sampler");
    let a = sig();

    let (matches, fails) = collect(&mut engine, sampler, bit("a", &a));

    let siga = [0, 0, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    assert_eq!(sorted(&matches), vec![(2, 2), (3, 3)]);
    assert_eq!(sorted(&fails), vec![(0, 0), (1, 1), (4, 4)]);
}

#[test]
fn concat_needs_two_cycles_in_a_row() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let expr = bit("a", &a) + bit("a", &a);
    let (matches, fails) = collect(&mut engine, sampler, expr);

    let siga = [0, 0, 1, 1, 0, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    assert_eq!(sorted(&matches), vec![(2, 3)]);
    assert_eq!(
        sorted(&fails),
        vec![(0, 0), (1, 1), (3, 4), (4, 4), (5, 5)]
    );
}

#[test]
fn alternation_of_two_and_three_long_runs() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let two = bit("a", &a) + bit("a", &a);
    let three = bit("a", &a) + bit("a", &a) + bit("a", &a);
    let (matches, fails) = collect(&mut engine, sampler, two | three);

    let siga = [0, 0, 1, 1, 1, 0, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    // The run of three high cycles matches both arms from cycle 2; the
    // evaluation from cycle 3 matches the short arm and fails the long
    // one, and both arms fail from cycle 4 at cycle 5.
    assert_eq!(sorted(&matches), vec![(2, 3), (2, 4), (3, 4)]);
    assert_eq!(
        sorted(&fails),
        vec![(0, 0), (1, 1), (3, 5), (4, 5), (5, 5), (6, 6)]
    );
}

#[test]
fn conditional_with_gap_matches() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let req = sig();
    let ack = sig();

    let expr = bit("req", &req) >> (!bit("ack", &ack) + bit("ack", &ack));
    let (matches, fails) = collect(&mut engine, sampler, expr);

    let reqs = [1, 0, 0];
    let acks = [0, 0, 1];
    drive(&mut engine, sampler, reqs.len(), |i| {
        apply(&reqs, &req, i);
        apply(&acks, &ack, i);
    });

    // req at cycle 0, ack quiet at 1 and high at 2 satisfies the
    // obligation; the later evaluations are vacuous.
    assert_eq!(sorted(&matches), vec![(0, 2), (1, 1), (2, 2)]);
    assert!(fails.borrow().is_empty());
}

#[test]
fn conditional_intervening_ack_fails() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let req = sig();
    let ack = sig();

    let expr = bit("req", &req) >> (!bit("ack", &ack) + bit("ack", &ack));
    let (matches, fails) = collect(&mut engine, sampler, expr);

    let reqs = [1, 0];
    let acks = [0, 1];
    drive(&mut engine, sampler, reqs.len(), |i| {
        apply(&reqs, &req, i);
        apply(&acks, &ack, i);
    });

    assert_eq!(sorted(&matches), vec![(1, 1)]);
    assert_eq!(sorted(&fails), vec![(0, 1)]);
}

#[test]
fn conditional_unmet_antecedent_is_vacuous() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let req = sig();
    let ack = sig();

    let expr = bit("req", &req) >> (!bit("ack", &ack) + bit("ack", &ack));
    let (matches, fails) = collect(&mut engine, sampler, expr);

    drive(&mut engine, sampler, 1, |_| {
        req.set(false);
        ack.set(false);
    });

    assert_eq!(sorted(&matches), vec![(0, 0)]);
    assert!(fails.borrow().is_empty());
}

#[test]
fn repeat_range_reports_every_length() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let expr = bit("a", &a) * (2, 3);
    let (matches, fails) = collect(&mut engine, sampler, expr);

    let siga = [1, 1, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    assert_eq!(
        sorted(&matches),
        vec![(0, 1), (0, 2), (1, 2), (1, 3), (2, 3)]
    );
    // From cycle 2 the two-long chain matches but the three-long
    // extension runs off the high run and fails.
    assert_eq!(sorted(&fails), vec![(2, 4), (3, 4), (4, 4)]);
}

#[test]
fn inversion_swaps_outcomes() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let (matches, fails) = collect(&mut engine, sampler, !bit("a", &a));

    let siga = [0, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    assert_eq!(sorted(&matches), vec![(0, 0), (2, 2)]);
    assert_eq!(sorted(&fails), vec![(1, 1)]);
}

#[test]
fn fusion_overlaps_at_the_boundary_cycle() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();
    let b = sig();

    let expr = bit("a", &a) / bit("b", &b);
    let (matches, fails) = collect(&mut engine, sampler, expr);

    let siga = [1, 1, 0];
    let sigb = [1, 0, 1];
    drive(&mut engine, sampler, siga.len(), |i| {
        apply(&siga, &a, i);
        apply(&sigb, &b, i);
    });

    // Both predicates observe the same cycle, so a fused match may end
    // at its own start cycle.
    assert_eq!(sorted(&matches), vec![(0, 0)]);
    assert_eq!(sorted(&fails), vec![(1, 1), (2, 2)]);
}

#[test]
fn intersection_pairs_matches_across_sides() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();
    let b = sig();

    let expr = bit("a", &a) ^ (ok() * (2, 5) + bit("b", &b));
    let (matches, fails) = collect(&mut engine, sampler, expr);

    let siga = [0, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
    let sigb = [0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 1, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| {
        apply(&siga, &a, i);
        apply(&sigb, &b, i);
    });

    assert_eq!(
        sorted(&matches),
        vec![(2, 5), (2, 6), (8, 12), (8, 13)]
    );
    // Evaluations late in the window never complete (their chains are
    // still waiting on future cycles), so only check the settled ones.
    let fail_starts: Vec<u64> = sorted(&fails)
        .into_iter()
        .map(|(s, _)| s)
        .filter(|s| *s < 10)
        .collect();
    assert_eq!(fail_starts, vec![0, 1, 3, 4, 5, 6, 7, 9]);
}

#[test]
fn conjunction_requires_equal_end_cycles() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();
    let b = sig();

    let left = bit("a", &a) + ok() * (1, 8);
    let right = ok() * (1, 8) + bit("b", &b);
    let (matches, fails) = collect(&mut engine, sampler, left & right);

    let siga = [0, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
    let sigb = [0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 1, 0, 0, 0, 0, 0];
    drive(&mut engine, sampler, siga.len(), |i| {
        apply(&siga, &a, i);
        apply(&sigb, &b, i);
    });

    // This pattern finds `a` followed by `b` after one to eight cycles:
    // both sides must agree on the end cycle.
    assert_eq!(
        sorted(&matches),
        vec![(2, 7), (2, 8), (2, 10), (8, 10)]
    );
    assert!(sorted(&fails).contains(&(0, 8)));
    assert!(!fails.borrow().iter().any(|(s, _)| *s == 2));
}

#[test]
fn double_negation_preserves_outcome_pattern() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let plain = bit("a", &a) + bit("a", &a);
    let doubled = !!(bit("a", &a) + bit("a", &a));
    let (plain_m, plain_f) = collect(&mut engine, sampler, plain);
    let (doubled_m, doubled_f) = collect(&mut engine, sampler, doubled);

    let siga = [0, 1, 1, 0, 1, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    assert_eq!(sorted(&plain_m), sorted(&doubled_m));
    assert_eq!(sorted(&plain_f), sorted(&doubled_f));
    assert!(!plain_m.borrow().is_empty());
}

#[test]
fn alternation_matches_are_the_union_of_both_sides() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();
    let b = sig();

    let (alt_m, _) = collect(
        &mut engine,
        sampler,
        (bit("a", &a) + bit("a", &a)) | bit("b", &b),
    );
    let (left_m, _) = collect(&mut engine, sampler, bit("a", &a) + bit("a", &a));
    let (right_m, _) = collect(&mut engine, sampler, bit("b", &b));

    let siga = [0, 1, 1, 1, 0, 0, 1, 1];
    let sigb = [1, 0, 1, 0, 0, 1, 0, 0];
    drive(&mut engine, sampler, siga.len(), |i| {
        apply(&siga, &a, i);
        apply(&sigb, &b, i);
    });

    let mut union = sorted(&left_m);
    union.extend(sorted(&right_m));
    union.sort_unstable();
    assert_eq!(sorted(&alt_m), union);
}

#[test]
fn repeat_range_equals_union_of_exact_repeats() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let (range_m, _) = collect(&mut engine, sampler, bit("a", &a) * (2, 3));
    let (two_m, _) = collect(&mut engine, sampler, bit("a", &a) * 2);
    let (three_m, _) = collect(&mut engine, sampler, bit("a", &a) * 3);

    let siga = [1, 1, 0, 1, 1, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    let mut union = sorted(&two_m);
    union.extend(sorted(&three_m));
    union.sort_unstable();
    assert_eq!(sorted(&range_m), union);
}

#[test]
fn firstof_emits_at_most_one_match_per_evaluation() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let inner = (bit("a", &a) + bit("a", &a)) | bit("a", &a);
    let (matches, _) = collect(&mut engine, sampler, inner.first_of());

    let siga = [1, 1, 1, 0, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    let all = sorted(&matches);
    for start in all.iter().map(|(s, _)| *s) {
        assert_eq!(
            all.iter().filter(|(s, _)| *s == start).count(),
            1,
            "more than one match from cycle {start}"
        );
    }
    assert!(!all.is_empty());
}

#[test]
fn once_deduplicates_per_end_cycle() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    // All three arms match over the same cycles, so the raw alternation
    // reports each success three times; `once` keeps one per end cycle.
    let arm = || bit("a", &a) + bit("a", &a);
    let raw = (arm() | arm()) | arm();
    let (raw_m, _) = collect(&mut engine, sampler, raw);
    let (once_m, once_f) = collect(&mut engine, sampler, ((arm() | arm()) | arm()).once());

    let siga = [0, 0, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    assert_eq!(sorted(&raw_m), vec![(2, 3), (2, 3), (2, 3)]);
    assert_eq!(sorted(&once_m), vec![(2, 3)]);
    // Failures pass the filter unchanged.
    assert!(sorted(&once_f).contains(&(0, 0)));
}

#[test]
fn always_launches_one_evaluation_per_posting() {
    let mut engine = Engine::new();
    let sampler = engine.event();

    let (matches, fails) = collect(&mut engine, sampler, ok());
    drive(&mut engine, sampler, 5, |_| {});

    assert_eq!(sorted(&matches).len(), 5);
    assert!(fails.borrow().is_empty());
}

#[test]
fn vacuous_conditional_matches_once_per_cycle() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let never = Expr::pred("never", || false);

    let (matches, fails) = collect(&mut engine, sampler, never >> ok());
    drive(&mut engine, sampler, 4, |_| {});

    assert_eq!(sorted(&matches), vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    assert!(fails.borrow().is_empty());
}

#[test]
fn match_trace_renders_deterministically() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let rendered = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rendered);
    engine
        .always(
            sampler,
            bit("a", &a) + bit("a", &a),
            move |m| sink.borrow_mut().push(m.trace.render()),
            |_| {},
        )
        .unwrap();

    let siga = [0, 0, 1, 1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    assert_eq!(
        *rendered.borrow(),
        vec![String::from(
            "+ (2/3) (30/40) match\n  a (2/2) (30/30) match\n  a (3/3) (40/40) match\n"
        )]
    );
}

#[test]
fn failure_trace_explains_the_broken_path() {
    let mut engine = Engine::new();
    let sampler = engine.event();
    let a = sig();

    let rendered = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rendered);
    engine
        .always(
            sampler,
            bit("a", &a) + bit("a", &a),
            |_| {},
            move |f| sink.borrow_mut().push(f.trace.render()),
        )
        .unwrap();

    let siga = [1, 0];
    drive(&mut engine, sampler, siga.len(), |i| apply(&siga, &a, i));

    // The evaluation from cycle 0 saw `a` hold and then drop.
    let failures = rendered.borrow();
    assert_eq!(
        failures[0],
        "+ (0/1) (10/20) fail\n  a (0/0) (10/10) match\n  a (1/1) (20/20) fail\n"
    );
}
