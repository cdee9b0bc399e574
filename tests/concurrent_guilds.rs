//! High concurrency tests for guild queues
//!
//! Many guilds are driven in parallel against one controller while decay
//! ticks run alongside. Each guild's invariants must hold afterwards.

mod fixtures;

use fixtures::{claim, participant, TestSystem};
use guild_queue::types::{AckKind, QueueCommand, QueueResponse};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_100_guilds_joining_concurrently() {
    let system = Arc::new(TestSystem::new());
    let guild_count = 100u64;
    let members_per_guild = 8u64;

    for guild in 0..guild_count {
        system.track(guild).await;
    }

    let start_time = Instant::now();
    let handles: Vec<_> = (0..guild_count)
        .flat_map(|guild| (0..members_per_guild).map(move |member| (guild, member)))
        .map(|(guild, member)| {
            let system = system.clone();
            tokio::spawn(async move {
                system
                    .command(guild, guild * 1000 + member, QueueCommand::Join)
                    .await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let duration = start_time.elapsed();

    let joined = results
        .into_iter()
        .filter(|result| matches!(result, Ok(QueueResponse::Joined(_))))
        .count();
    assert_eq!(joined as u64, guild_count * members_per_guild);
    assert!(
        duration < Duration::from_secs(10),
        "joins should complete within 10 seconds, took: {:?}",
        duration
    );

    for guild in 0..guild_count {
        let ids = system.roster_ids(guild);
        assert_eq!(ids.len() as u64, members_per_guild);
        // Every member of a guild is its own and listed once
        assert!(ids.iter().all(|id| id / 1000 == guild));
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    let stats = system.controller.get_stats().unwrap();
    assert_eq!(stats.guilds as u64, guild_count);
    assert_eq!(stats.participants_waiting as u64, guild_count * members_per_guild);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_holds_under_contention() {
    let system = Arc::new(TestSystem::new());
    system.track(1).await;
    system
        .command(
            1,
            9,
            QueueCommand::SetCapacity {
                value: "5".to_string(),
            },
        )
        .await;

    let handles: Vec<_> = (100..150)
        .map(|id| {
            let system = system.clone();
            tokio::spawn(async move { system.command(1, id, QueueCommand::Join).await })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let mut joined = 0;
    let mut full = 0;
    for result in results {
        match result.unwrap() {
            QueueResponse::Joined(_) => joined += 1,
            QueueResponse::Failed { error } if error.kind() == "full" => full += 1,
            other => panic!("Unexpected response: {:?}", other),
        }
    }

    assert_eq!(joined, 5);
    assert_eq!(full, 45);
    assert_eq!(system.roster_ids(1).len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ticks_interleaved_with_commands() {
    let system = Arc::new(TestSystem::new());
    let guilds: Vec<u64> = (1..=20).collect();

    for &guild in &guilds {
        system.track(guild).await;
        for member in 0..4 {
            system
                .command(guild, guild * 100 + member, QueueCommand::Join)
                .await;
        }
        let token = match system.command(guild, guild * 100, claim("A7X92")).await {
            QueueResponse::Claimed(announcement) => announcement.token,
            other => panic!("Unexpected response: {:?}", other),
        };
        // Every member starts being tracked
        for member in 0..4 {
            system
                .controller
                .acknowledge(guild, &participant(guild * 100 + member), token, AckKind::Confirm)
                .unwrap();
        }
    }

    let ticker = {
        let system = system.clone();
        tokio::spawn(async move {
            for _ in 0..6 {
                system.tick().await;
                tokio::task::yield_now().await;
            }
        })
    };

    let commands: Vec<_> = guilds
        .iter()
        .map(|&guild| {
            let system = system.clone();
            tokio::spawn(async move {
                system.command(guild, guild * 100 + 50, QueueCommand::Join).await;
                system.command(guild, 0, QueueCommand::View).await
            })
        })
        .collect();

    ticker.await.unwrap();
    for result in futures::future::join_all(commands).await {
        assert!(matches!(result.unwrap(), QueueResponse::Roster(_)));
    }

    for &guild in &guilds {
        let ids = system.roster_ids(guild);
        // The head is never evicted by decay
        assert_eq!(ids.first(), Some(&(guild * 100)));
        // The untracked late joiner survives every tick
        assert!(ids.contains(&(guild * 100 + 50)));
        // Tracked waiters went below the eviction line
        for member in 1..4 {
            assert!(!ids.contains(&(guild * 100 + member)));
        }
    }
}
