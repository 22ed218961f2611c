mod common;

use common::{calendar_template, ctx, Harness};
use intersection_types::{ContractVersion, ProposalDraft, Scope};
use std::time::Duration;

#[test]
fn racing_finalizers_apply_exactly_once() {
    let h = Harness::new();
    let a = h.circle();
    let b = h.circle();
    let int = h.connect(&a, &b).intersection_id;

    let p = h
        .service
        .submit_proposal(
            &ctx(),
            &int,
            &a,
            ProposalDraft::amendment("write").adding_scope(Scope::read_write("notes:write", "")),
        )
        .unwrap();
    h.service.accept_proposal(&ctx(), &p.id, &b).unwrap();

    let successes: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| h.service.finalize(&ctx(), &p.id).is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum()
    });

    assert_eq!(successes, 1);
    assert_eq!(h.service.get_contract_history(&int).unwrap().len(), 2);
}

#[test]
fn concurrent_amendments_serialize_into_one_chain() {
    let h = Harness::new();
    let a = h.circle();
    let b = h.circle();
    let int = h.connect(&a, &b).intersection_id;

    const WORKERS: usize = 6;
    std::thread::scope(|s| {
        for i in 0..WORKERS {
            let service = h.service.clone();
            let (a, b, int) = (a.clone(), b.clone(), int.clone());
            s.spawn(move || {
                let p = service
                    .submit_proposal(
                        &ctx(),
                        &int,
                        &a,
                        ProposalDraft::amendment("grow")
                            .adding_scope(Scope::read(format!("scope-{i}"), "")),
                    )
                    .unwrap();
                service.accept_proposal(&ctx(), &p.id, &b).unwrap();
                service.finalize(&ctx(), &p.id).unwrap();
            });
        }
    });

    let history = h.service.get_contract_history(&int).unwrap();
    assert_eq!(history.len(), WORKERS + 1);
    for pair in history.windows(2) {
        assert!(pair[0].version < pair[1].version);
    }

    let latest = h.service.get_contract(&int).unwrap();
    assert_eq!(latest.version, ContractVersion::new(1, WORKERS as u64, 0));
    for i in 0..WORKERS {
        assert!(latest.has_scope(&format!("scope-{i}")));
    }
}

#[test]
fn open_invite_accepted_from_many_threads() {
    let h = Harness::new();
    let a = h.circle();
    let acceptors: Vec<_> = (0..8).map(|_| h.circle()).collect();
    let token = h
        .service
        .issue_invite(&ctx(), &a, None, "open house", calendar_template(), Duration::ZERO)
        .unwrap();

    std::thread::scope(|s| {
        for acceptor in &acceptors {
            let (service, token) = (&h.service, &token);
            s.spawn(move || service.accept_invite(&ctx(), token, acceptor).unwrap());
        }
    });

    let intersections = h.service.list_intersections(None).unwrap();
    assert_eq!(intersections.len(), acceptors.len());
    for acceptor in &acceptors {
        assert!(intersections
            .iter()
            .any(|i| h.service.is_party(&i.id, acceptor).unwrap()));
    }
}
