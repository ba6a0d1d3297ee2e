//! Concurrent operations on the same asset never double-assign it

mod common;

use assets_common::{ErrorKind, HistoryAction, Role};
use attribution_engine::{Config, CreateAttribution, Store};
use common::{assert_consistent, fixture_with, user};
use std::time::Duration;

fn contended_config() -> Config {
    Config {
        lock_wait: Duration::from_secs(5),
        lock_retry: Duration::from_millis(2),
        ..Config::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_assign_phone_once() {
    let f = fixture_with(contended_config()).await;

    let mut contenders = Vec::new();
    for n in 0..16 {
        let holder = user(
            &f.inventory,
            &format!("Contender {}", n),
            &format!("contender{}@example.com", n),
            Role::User,
        )
        .await;
        contenders.push(holder.id);
    }

    let mut tasks = Vec::new();
    for holder in contenders {
        let engine = f.engine.clone();
        let request = CreateAttribution::new(holder).phone(f.phone.id);
        let admin = f.admin.id;
        tasks.push(tokio::spawn(async move {
            engine.create_attribution(request, admin).await
        }));
    }

    let mut won = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "unexpected error: {}", e),
        }
    }
    assert_eq!(won, 1);

    let active = f.store.count_active_attributions(f.phone_ref()).await.unwrap();
    assert_eq!(active, 1);
    let history = f.engine.asset_history(f.phone_ref()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, HistoryAction::Assign);
    assert_consistent(&f.store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_return_and_transfer_race_has_one_winner() {
    let f = fixture_with(contended_config()).await;
    let created = f
        .engine
        .create_attribution(
            CreateAttribution::new(f.alice.id)
                .phone(f.phone.id)
                .sim_card(f.sim.id),
            f.admin.id,
        )
        .await
        .unwrap();

    let returning = {
        let engine = f.engine.clone();
        let id = created.id;
        tokio::spawn(async move { engine.return_attribution(id, None, None).await })
    };
    let transferring = {
        let engine = f.engine.clone();
        let (id, to, by) = (created.id, f.bob.id, f.admin.id);
        tokio::spawn(async move { engine.transfer_attribution(id, to, by, None).await })
    };

    let returned = returning.await.unwrap();
    let transferred = transferring.await.unwrap();
    assert!(
        returned.is_ok() != transferred.is_ok(),
        "exactly one of return/transfer must win"
    );
    for outcome in [returned.err(), transferred.err()].into_iter().flatten() {
        assert_eq!(outcome.kind(), ErrorKind::Conflict);
    }

    // each asset moved exactly once after its assignment
    for asset in [f.phone_ref(), f.sim_ref()] {
        assert_eq!(f.engine.asset_history(asset).await.unwrap().len(), 2);
    }
    assert_consistent(&f.store).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_asset_sets_do_not_deadlock() {
    let f = fixture_with(contended_config()).await;

    // both requests need the SIM card
    let pair = {
        let engine = f.engine.clone();
        let request = CreateAttribution::new(f.alice.id)
            .phone(f.phone.id)
            .sim_card(f.sim.id);
        let admin = f.admin.id;
        tokio::spawn(async move { engine.create_attribution(request, admin).await })
    };
    let sim_only = {
        let engine = f.engine.clone();
        let request = CreateAttribution::new(f.bob.id).sim_card(f.sim.id);
        let admin = f.admin.id;
        tokio::spawn(async move { engine.create_attribution(request, admin).await })
    };

    let results = tokio::time::timeout(Duration::from_secs(10), async {
        (pair.await.unwrap(), sim_only.await.unwrap())
    })
    .await
    .expect("operations deadlocked");

    let wins = [results.0.is_ok(), results.1.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(wins, 1);
    assert_consistent(&f.store).await;
}
