mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tg_catalogbot::autopost::Autoposter;
use tg_catalogbot::channel::ChannelError;
use tg_catalogbot::db;
use tg_catalogbot::model::NewProduct;
use tg_catalogbot::watcher::{CycleReport, Watcher};

fn categorized(name: &str, category: &str, stock: i64) -> NewProduct {
    NewProduct {
        category: Some(category.into()),
        images: vec![format!("https://cdn.example.com/{}.jpg", name.to_lowercase())],
        ..product(name, Some(stock))
    }
}

#[tokio::test]
async fn watcher_retracts_before_updating() {
    let pool = setup_pool().await;

    let sold_out = db::insert_product(&pool, &product("SoldOut", Some(0)))
        .await
        .unwrap();
    db::record_publish(&pool, sold_out, &[31]).await.unwrap();

    let unknown_stock = db::insert_product(&pool, &product("Unknown", None))
        .await
        .unwrap();
    db::record_publish(&pool, unknown_stock, &[32]).await.unwrap();

    let mut flagged = product("Flagged", Some(3));
    flagged.needs_update = true;
    let flagged = db::insert_product(&pool, &flagged).await.unwrap();

    let mut hidden = product("Hidden", Some(0));
    hidden.visible = false;
    let hidden = db::insert_product(&pool, &hidden).await.unwrap();
    db::record_publish(&pool, hidden, &[33]).await.unwrap();

    let channel = RecordingChannel::with_send_responses(vec![Ok(40)]);
    let sleeper = RecordingSleeper::default();
    let watcher = Watcher::new(publisher(&pool, &channel, &sleeper), Duration::from_secs(5), 1);

    let report = watcher.run_cycle().await.unwrap();
    assert_eq!(
        report,
        CycleReport {
            retracted: 2,
            published: 1,
            skipped: 0,
            failed: 0
        }
    );

    let calls = channel.calls().await;
    assert_eq!(calls[0], Call::Delete(31));
    assert_eq!(calls[1], Call::Delete(32));
    assert!(matches!(calls[2], Call::Text { .. }));
    assert_eq!(calls.len(), 3);

    assert!(message_ids(&pool, sold_out).await.is_empty());
    assert!(message_ids(&pool, unknown_stock).await.is_empty());
    assert_eq!(message_ids(&pool, flagged).await, vec![40]);
    assert!(!needs_update(&pool, flagged).await);
    // hidden products are left alone, posts included
    assert_eq!(message_ids(&pool, hidden).await, vec![33]);

    // converged: nothing left to do
    let report = watcher.run_cycle().await.unwrap();
    assert_eq!(report, CycleReport::default());
}

#[tokio::test]
async fn failed_product_does_not_block_others_and_retries_next_cycle() {
    let pool = setup_pool().await;
    let mut a = product("A", Some(1));
    a.needs_update = true;
    let a = db::insert_product(&pool, &a).await.unwrap();
    let mut b = product("B", Some(1));
    b.needs_update = true;
    let b = db::insert_product(&pool, &b).await.unwrap();

    let channel = RecordingChannel::with_send_responses(vec![
        Err(ChannelError::Other("chat not found".into())),
        Ok(50),
    ]);
    let sleeper = RecordingSleeper::default();
    let watcher = Watcher::new(publisher(&pool, &channel, &sleeper), Duration::from_secs(5), 1);

    let report = watcher.run_cycle().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(report.failed, 1);
    assert!(needs_update(&pool, a).await);
    assert!(message_ids(&pool, a).await.is_empty());
    assert_eq!(message_ids(&pool, b).await, vec![50]);

    let report = watcher.run_cycle().await.unwrap();
    assert_eq!(report.published, 1);
    assert!(!needs_update(&pool, a).await);
    assert_eq!(message_ids(&pool, a).await.len(), 1);
}

#[tokio::test]
async fn watcher_with_wider_concurrency_publishes_everything() {
    let pool = setup_pool().await;
    let mut ids = Vec::new();
    for i in 0..5 {
        let mut p = product(&format!("P{i}"), Some(2));
        p.needs_update = true;
        ids.push(db::insert_product(&pool, &p).await.unwrap());
    }

    let channel = RecordingChannel::default();
    let sleeper = RecordingSleeper::default();
    let watcher = Watcher::new(publisher(&pool, &channel, &sleeper), Duration::from_secs(5), 3);

    let report = watcher.run_cycle().await.unwrap();
    assert_eq!(report.published, 5);
    for id in ids {
        assert_eq!(message_ids(&pool, id).await.len(), 1);
        assert!(!needs_update(&pool, id).await);
    }
}

#[tokio::test]
async fn autopost_posts_by_priority_one_per_cycle() {
    let pool = setup_pool().await;
    let other = db::insert_product(&pool, &categorized("Watch", "Other", 5))
        .await
        .unwrap();
    let luggage = db::insert_product(&pool, &categorized("Trolley", "Каталог/Багаж", 5))
        .await
        .unwrap();
    let backpack = db::insert_product(&pool, &categorized("Daypack", "Каталог/Рюкзаки", 5))
        .await
        .unwrap();
    // below the stock threshold
    db::insert_product(&pool, &categorized("Tote", "Каталог/Рюкзаки", 1))
        .await
        .unwrap();

    let channel = RecordingChannel::default();
    let sleeper = RecordingSleeper::default();
    let publisher = publisher(&pool, &channel, &sleeper);
    let autoposter = Autoposter::new(publisher, Duration::from_secs(3600), 1, 2);

    assert_eq!(autoposter.run_cycle().await.unwrap(), vec![backpack]);
    assert_eq!(autoposter.run_cycle().await.unwrap(), vec![luggage]);
    assert_eq!(autoposter.run_cycle().await.unwrap(), vec![other]);
    assert!(autoposter.run_cycle().await.unwrap().is_empty());

    let photos: Vec<String> = channel
        .calls()
        .await
        .into_iter()
        .filter_map(|c| match c {
            Call::Photo { url, .. } => Some(url),
            _ => None,
        })
        .collect();
    assert_eq!(
        photos,
        vec![
            "https://cdn.example.com/daypack.jpg",
            "https://cdn.example.com/trolley.jpg",
            "https://cdn.example.com/watch.jpg",
        ]
    );
    assert_eq!(sleeper.sleeps().await, vec![PACING; 3]);
}

#[tokio::test]
async fn autopost_batch_keeps_going_after_a_failure() {
    let pool = setup_pool().await;
    let first = db::insert_product(&pool, &categorized("Daypack", "Каталог/Рюкзаки", 5))
        .await
        .unwrap();
    let second = db::insert_product(&pool, &categorized("Sling", "Каталог/Плечевые сумки", 5))
        .await
        .unwrap();

    let channel =
        RecordingChannel::with_send_responses(vec![Err(ChannelError::Other("boom".into()))]);
    let sleeper = RecordingSleeper::default();
    let autoposter = Autoposter::new(
        publisher(&pool, &channel, &sleeper),
        Duration::from_secs(3600),
        2,
        2,
    );

    assert_eq!(autoposter.run_cycle().await.unwrap(), vec![second]);
    assert!(message_ids(&pool, first).await.is_empty());
    // still a candidate next time
    assert_eq!(autoposter.run_cycle().await.unwrap(), vec![first]);
}

#[tokio::test]
async fn restocked_product_returns_through_autopost() {
    let pool = setup_pool().await;
    let id = db::insert_product(&pool, &categorized("Daypack", "Каталог/Рюкзаки", 3))
        .await
        .unwrap();

    let channel = RecordingChannel::default();
    let sleeper = RecordingSleeper::default();
    let publisher = publisher(&pool, &channel, &sleeper);
    let watcher = Watcher::new(publisher.clone(), Duration::from_secs(5), 1);
    let autoposter = Autoposter::new(publisher, Duration::from_secs(3600), 1, 2);

    assert_eq!(autoposter.run_cycle().await.unwrap(), vec![id]);

    db::update_stock(&pool, id, Some(0)).await.unwrap();
    assert_eq!(watcher.run_cycle().await.unwrap().retracted, 1);
    assert!(message_ids(&pool, id).await.is_empty());
    assert!(autoposter.run_cycle().await.unwrap().is_empty());

    db::update_stock(&pool, id, Some(4)).await.unwrap();
    assert_eq!(watcher.run_cycle().await.unwrap(), CycleReport::default());
    assert_eq!(autoposter.run_cycle().await.unwrap(), vec![id]);
    assert_eq!(message_ids(&pool, id).await.len(), 1);
}

#[tokio::test]
async fn publisher_is_shared_between_loops() {
    let pool = setup_pool().await;
    let mut flagged = product("Flagged", Some(3));
    flagged.needs_update = true;
    db::insert_product(&pool, &flagged).await.unwrap();
    db::insert_product(&pool, &categorized("Daypack", "Каталог/Рюкзаки", 3))
        .await
        .unwrap();

    let channel = RecordingChannel::default();
    let sleeper = RecordingSleeper::default();
    let publisher = publisher(&pool, &channel, &sleeper);
    let watcher = Arc::new(Watcher::new(publisher.clone(), Duration::from_secs(5), 1));
    let autoposter = Arc::new(Autoposter::new(publisher, Duration::from_secs(3600), 1, 2));

    let (watched, autoposted) = tokio::join!(watcher.run_cycle(), autoposter.run_cycle());
    let watched = watched.unwrap();
    let autoposted = autoposted.unwrap();
    assert_eq!(watched.failed, 0);
    assert_eq!(watched.published + autoposted.len(), 2);
    assert_eq!(channel.sends().await, 2);
}

#[tokio::test]
async fn product_due_in_both_loops_is_posted_once() {
    let pool = setup_pool().await;
    let mut both = categorized("Daypack", "Каталог/Рюкзаки", 3);
    both.needs_update = true;
    let id = db::insert_product(&pool, &both).await.unwrap();

    let channel = RecordingChannel::default();
    let sleeper = RecordingSleeper::default();
    let publisher = publisher(&pool, &channel, &sleeper);
    let watcher = Arc::new(Watcher::new(publisher.clone(), Duration::from_secs(5), 1));
    let autoposter = Arc::new(Autoposter::new(publisher, Duration::from_secs(3600), 1, 2));

    let (watched, autoposted) = tokio::join!(watcher.run_cycle(), autoposter.run_cycle());
    let watched = watched.unwrap();
    let autoposted = autoposted.unwrap();

    assert_eq!(watched.failed, 0);
    assert_eq!(watched.published + autoposted.len(), 1);
    assert_eq!(channel.sends().await, 1);
    assert!(channel.deleted().await.is_empty());
    assert_eq!(message_ids(&pool, id).await.len(), 1);
    assert!(!needs_update(&pool, id).await);

    // nothing left for either loop
    assert_eq!(watcher.run_cycle().await.unwrap(), CycleReport::default());
    assert!(autoposter.run_cycle().await.unwrap().is_empty());
    assert_eq!(channel.sends().await, 1);
}
