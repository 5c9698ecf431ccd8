use std::sync::{Arc, Mutex, OnceLock, Weak};

use chg_voter_core::*;
use pretty_assertions::assert_eq;

type Calls = Arc<Mutex<Vec<(Option<i64>, Option<String>, bool)>>>;

fn fcc() -> (Votable, Calls) {
    let calls: Calls = Arc::default();
    let sink = calls.clone();
    let v = Votable::new("fcc", ElectionKind::Min, VotableCfg::default(), move |_: &VotableState, d: Decision<'_>| {
        sink.lock()
            .unwrap()
            .push((d.value, d.client.map(str::to_string), d.step));
        Ok(())
    })
    .unwrap();
    v.vote("A", true, 500, false).unwrap();
    v.vote("B", true, 300, false).unwrap();
    calls.lock().unwrap().clear();
    (v, calls)
}

fn last(calls: &Calls) -> Option<(Option<i64>, Option<String>, bool)> {
    calls.lock().unwrap().last().cloned()
}

#[test]
fn override_preempts_and_releases() {
    let (v, calls) = fcc();

    v.vote_override("debug", true, 4400, false).unwrap();
    assert!(v.is_override_vote_enabled().unwrap());
    assert_eq!(v.effective_result().unwrap(), Some(4400));
    assert_eq!(v.effective_client().unwrap().as_deref(), Some("debug"));
    assert_eq!(last(&calls), Some((Some(4400), Some("debug".to_string()), false)));

    v.vote_override("debug", false, 0, false).unwrap();
    assert!(!v.is_override_vote_enabled().unwrap());
    assert_eq!(v.effective_result().unwrap(), Some(300));
    assert_eq!(last(&calls), Some((Some(300), Some("B".to_string()), false)));
}

#[test]
fn override_dominates_election_changes() {
    let (v, calls) = fcc();
    v.vote_override("debug", true, 4400, false).unwrap();
    let n = calls.lock().unwrap().len();

    v.vote("C", true, 100, false).unwrap();
    v.vote("B", false, 0, false).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(4400));
    assert_eq!(v.effective_result_exclude_client("A").unwrap(), Some(4400));
    // Election moved underneath, but the callback stayed quiet.
    assert_eq!(calls.lock().unwrap().len(), n);
    assert_eq!(v.lock().unwrap().state().election_result(), Some(100));

    v.vote_override("debug", false, 0, false).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(100));
    assert_eq!(last(&calls), Some((Some(100), Some("C".to_string()), false)));
}

#[test]
fn override_engage_needs_callback_success() {
    let reject = Arc::new(Mutex::new(false));
    let r = reject.clone();
    let v = Votable::new("vbat", ElectionKind::Max, VotableCfg::default(), move |_: &VotableState, d: Decision<'_>| {
        if *r.lock().unwrap() && d.client == Some("ovr") {
            return Err(HookError::new(-16, "busy"));
        }
        Ok(())
    })
    .unwrap();
    v.vote("a", true, 10, false).unwrap();

    *reject.lock().unwrap() = true;
    let err = v.vote_override("ovr", true, 99, false).unwrap_err();
    assert_eq!(err.errno(), -16);
    assert!(!v.is_override_vote_enabled().unwrap());
    assert_eq!(v.effective_result().unwrap(), Some(10));

    *reject.lock().unwrap() = false;
    v.vote_override("ovr", true, 99, false).unwrap();
    assert!(v.is_override_vote_enabled().unwrap());
}

#[test]
fn override_release_is_unconditional() {
    let fail = Arc::new(Mutex::new(false));
    let f = fail.clone();
    let v = Votable::new("icl", ElectionKind::Min, VotableCfg::default(), move |_: &VotableState, _: Decision<'_>| {
        if *f.lock().unwrap() {
            return Err(HookError::new(-5, "io"));
        }
        Ok(())
    })
    .unwrap();
    v.vote_override("ovr", true, 1, false).unwrap();

    *fail.lock().unwrap() = true;
    assert!(v.vote_override("ovr", false, 0, false).is_err());
    assert!(!v.is_override_vote_enabled().unwrap());
}

#[test]
fn force_dominates_override() {
    let (v, calls) = fcc();
    v.vote_override("debug", true, 4400, false).unwrap();

    v.set_force_val(1234).unwrap();
    v.set_force_active(true).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(1234));
    assert_eq!(v.effective_client().unwrap().as_deref(), Some(DEBUG_FORCE_CLIENT));
    assert_eq!(
        last(&calls),
        Some((Some(1234), Some(DEBUG_FORCE_CLIENT.to_string()), false))
    );

    // Release force: override is authoritative again.
    v.set_force_active(false).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(4400));
    assert_eq!(last(&calls), Some((Some(4400), Some("debug".to_string()), false)));
}

#[test]
fn force_release_without_override_restores_election() {
    let (v, calls) = fcc();
    v.set_force_val(7).unwrap();
    v.set_force_active(true).unwrap();
    assert!(v.force_active().unwrap());
    assert_eq!(v.force_val().unwrap(), 7);

    v.vote("B", false, 0, false).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(7));
    let n = calls.lock().unwrap().len();

    v.set_force_active(false).unwrap();
    assert_eq!(calls.lock().unwrap().len(), n + 1);
    assert_eq!(last(&calls), Some((Some(500), Some("A".to_string()), false)));
    assert_eq!(v.effective_result().unwrap(), Some(500));
}

#[test]
fn override_under_force_is_recorded_silently() {
    let (v, calls) = fcc();
    v.set_force_active(true).unwrap();
    let n = calls.lock().unwrap().len();

    v.vote_override("debug", true, 4400, false).unwrap();
    assert_eq!(calls.lock().unwrap().len(), n);
    assert!(v.is_override_vote_enabled().unwrap());
    assert_eq!(v.effective_result().unwrap(), Some(0));

    v.set_force_active(false).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(4400));

    v.set_force_active(true).unwrap();
    v.vote_override("debug", false, 0, false).unwrap();
    v.set_force_active(false).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(300));
}

#[test]
fn rerun_reasserts_election_not_override() {
    let (v, calls) = fcc();
    v.rerun_election(true).unwrap();
    assert_eq!(last(&calls), Some((Some(300), Some("B".to_string()), true)));

    v.vote_override("debug", true, 4400, false).unwrap();
    v.rerun_election(true).unwrap();
    assert_eq!(last(&calls), Some((Some(300), Some("B".to_string()), true)));
    // Getters still honour the override.
    assert_eq!(v.effective_result().unwrap(), Some(4400));
}

#[test]
fn rerun_under_force_reports_force_without_step() {
    let (v, calls) = fcc();
    v.set_force_val(55).unwrap();
    v.set_force_active(true).unwrap();
    v.rerun_election(true).unwrap();
    assert_eq!(
        last(&calls),
        Some((Some(55), Some(DEBUG_FORCE_CLIENT.to_string()), false))
    );
}

#[test]
fn votes_under_force_stay_silent() {
    let (v, calls) = fcc();
    v.set_force_active(true).unwrap();
    let n = calls.lock().unwrap().len();
    v.vote("A", true, 10, false).unwrap();
    assert_eq!(calls.lock().unwrap().len(), n);
    assert_eq!(v.lock().unwrap().state().election_result(), Some(10));
}

#[test]
fn guard_runs_several_operations_under_one_lock() {
    let (v, calls) = fcc();
    {
        let mut g = v.lock().unwrap();
        g.vote("C", true, 50, false).unwrap();
        g.vote("D", true, 40, false).unwrap();
        assert_eq!(g.effective_result(), Some(40));
        assert_eq!(g.effective_client(), Some("D"));
        g.rerun_election(false).unwrap();
        // Same thread re-entry through the handle is refused.
        assert!(matches!(v.vote("E", true, 1, false), Err(VoteError::Reentrant(_))));
    }
    assert_eq!(calls.lock().unwrap().len(), 3);
    v.vote("E", true, 1, false).unwrap();
}

#[test]
fn reentrant_callback_is_refused() {
    let handle: Arc<OnceLock<Weak<Votable>>> = Arc::default();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let (h, s) = (handle.clone(), seen.clone());
    let v = Arc::new(
        Votable::new("loop", ElectionKind::Max, VotableCfg::default(), move |_: &VotableState, _: Decision<'_>| {
            if let Some(me) = h.get().and_then(Weak::upgrade) {
                s.lock().unwrap().push(me.vote("inner", true, 1, false));
            }
            Ok(())
        })
        .unwrap(),
    );
    handle.set(Arc::downgrade(&v)).unwrap();

    v.vote("outer", true, 5, false).unwrap();
    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![Err(VoteError::Reentrant("loop".to_string()))]
    );
    assert_eq!(v.get_client_vote("inner").unwrap(), None);
    assert_eq!(v.effective_result().unwrap(), Some(5));
}

#[test]
fn check_registering_checks_is_refused() {
    let handle: Arc<OnceLock<Weak<Votable>>> = Arc::default();
    let h = handle.clone();
    let v = Arc::new(
        Votable::new("chk", ElectionKind::Min, VotableCfg::default(), |_: &VotableState, _: Decision<'_>| Ok(())).unwrap(),
    );
    handle.set(Arc::downgrade(&v)).unwrap();

    v.add_check(move |_: &VoteRequest<'_>| {
        match h.get().and_then(Weak::upgrade) {
            Some(me) => match me.add_check(|_: &VoteRequest<'_>| Ok(())) {
                Err(VoteError::Reentrant(_)) => Ok(()),
                _ => Err(HookError::new(-1, "re-entry not refused")),
            },
            None => Ok(()),
        }
    })
    .unwrap();

    v.vote("a", true, 1, false).unwrap();
    assert_eq!(v.check_count(), 1);
}

#[test]
fn callbacks_and_guards_may_register_checks() {
    let handle: Arc<OnceLock<Weak<Votable>>> = Arc::default();
    let added = Arc::new(Mutex::new(Vec::new()));

    let (h, a) = (handle.clone(), added.clone());
    let v = Arc::new(
        Votable::new("late", ElectionKind::Max, VotableCfg::default(), move |_: &VotableState, _: Decision<'_>| {
            if let Some(me) = h.get().and_then(Weak::upgrade) {
                let rc = me.add_check(|req: &VoteRequest<'_>| {
                    if req.value > 100 {
                        Err(HookError::new(-34, "too high"))
                    } else {
                        Ok(())
                    }
                });
                a.lock().unwrap().push(rc);
            }
            Ok(())
        })
        .unwrap(),
    );
    handle.set(Arc::downgrade(&v)).unwrap();

    v.vote("a", true, 5, false).unwrap();
    assert_eq!(added.lock().unwrap().clone(), vec![Ok(())]);
    assert_eq!(v.check_count(), 1);

    // The check registered from the callback now applies.
    let err = v.vote("b", true, 500, false).unwrap_err();
    assert_eq!(err.errno(), -34);

    {
        let _g = v.lock().unwrap();
        v.add_check(|_: &VoteRequest<'_>| Ok(())).unwrap();
    }
    assert_eq!(v.check_count(), 2);
}

#[test]
fn other_votables_are_reachable_from_callbacks() {
    let (downstream, down_calls) = fcc();
    let downstream = Arc::new(downstream);
    let d = downstream.clone();
    let upstream = Votable::new("up", ElectionKind::Max, VotableCfg::default(), move |_: &VotableState, dec: Decision<'_>| {
        d.vote("up", dec.value.is_some(), dec.value.unwrap_or(0), dec.step)
            .map_err(|e| HookError::new(e.errno(), e.to_string()))
    })
    .unwrap();

    upstream.vote("x", true, 100, false).unwrap();
    assert_eq!(downstream.effective_result().unwrap(), Some(100));
    assert_eq!(downstream.effective_client().unwrap().as_deref(), Some("up"));
    assert_eq!(down_calls.lock().unwrap().len(), 1);
}

#[test]
fn panicking_callback_leaves_votable_usable() {
    let v = Arc::new(
        Votable::new("boom", ElectionKind::Min, VotableCfg::default(), |_: &VotableState, d: Decision<'_>| {
            if d.value == Some(13) {
                panic!("unlucky");
            }
            Ok(())
        })
        .unwrap(),
    );

    let v2 = v.clone();
    let joined = std::thread::spawn(move || v2.vote("a", true, 13, false)).join();
    assert!(joined.is_err());

    v.vote("a", true, 14, false).unwrap();
    assert_eq!(v.effective_result().unwrap(), Some(14));
}

#[test]
fn status_reflects_layers() {
    let (v, _calls) = fcc();
    v.vote_override("debug", true, 4400, false).unwrap();
    let st = v.status().unwrap();

    assert_eq!(st.name, "fcc");
    assert_eq!(st.kind, ElectionKind::Min);
    assert_eq!(
        st.clients,
        vec![
            ClientStatus { client: "A".into(), enabled: true, value: 500 },
            ClientStatus { client: "B".into(), enabled: true, value: 300 },
        ]
    );
    assert_eq!(st.effective_client.as_deref(), Some("debug"));
    assert_eq!(st.effective_result, Some(4400));
    assert_eq!(
        st.override_vote,
        Some(OverrideStatus { client: "debug".into(), value: 4400 })
    );
    assert!(!st.force_active);
}
