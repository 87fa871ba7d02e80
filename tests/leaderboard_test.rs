//! Integration tests for best-attempt selection and route leaderboards.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sprintrank::storage::NewSprint;
use sprintrank::{Database, LeaderboardService};

fn fresh_db() -> Result<Arc<Database>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Ok(Arc::new(Database::open_in_memory()?))
}

fn sprint(user: i64, route: i64, duration_ms: i64, success: bool) -> NewSprint {
    NewSprint {
        user_id: user,
        route_id: route,
        tournament_id: None,
        path: vec!["Start".into(), "Waypoint".into(), "Finish".into()],
        started_at: Utc::now(),
        duration_ms,
        success,
    }
}

/// The worked scenario: A 5000ms success, B 4000ms success, C 9000ms fail.
#[test]
fn test_route_scenario_ranks_b_then_a_and_omits_c() -> Result<()> {
    let db = fresh_db()?;
    let a = db.insert_user("A", "a@example.com", "pw")?;
    let b = db.insert_user("B", "b@example.com", "pw")?;
    let c = db.insert_user("C", "c@example.com", "pw")?;
    let route = db.get_or_create_route("Alpha", "Omega", a)?.id;

    db.insert_sprint(&sprint(a, route, 5000, true))?;
    db.insert_sprint(&sprint(b, route, 4000, true))?;
    db.insert_sprint(&sprint(c, route, 9000, false))?;

    let service = LeaderboardService::new(db);

    let attempts = service.best_attempts(route, None)?;
    assert_eq!(attempts.len(), 2);
    assert_eq!((attempts[0].user_id, attempts[0].duration_ms), (b, 4000));
    assert_eq!((attempts[1].user_id, attempts[1].duration_ms), (a, 5000));

    assert_eq!(service.placement(route, b)?, Some(1));
    assert_eq!(service.placement(route, a)?, Some(2));
    assert_eq!(service.placement(route, c)?, None);
    Ok(())
}

#[test]
fn test_leaderboard_durations_are_non_decreasing() -> Result<()> {
    let db = fresh_db()?;
    let creator = db.insert_user("Creator", "creator@example.com", "pw")?;
    let route = db.get_or_create_route("Alpha", "Omega", creator)?.id;

    // Ten users with scattered times, some with several attempts
    for i in 0..10 {
        let user = db.insert_user(
            &format!("User{i}"),
            &format!("user{i}@example.com"),
            "pw",
        )?;
        db.insert_sprint(&sprint(user, route, 9000 - i * 500, true))?;
        db.insert_sprint(&sprint(user, route, 9500 - i * 500, true))?;
    }

    let service = LeaderboardService::new(db);
    let board = service.route_leaderboard(route)?;

    assert_eq!(board.len(), 10);
    for pair in board.windows(2) {
        assert!(pair[0].duration_ms <= pair[1].duration_ms);
    }
    for (i, entry) in board.iter().enumerate() {
        assert_eq!(entry.rank as usize, i + 1);
    }
    Ok(())
}

#[test]
fn test_at_most_one_entry_per_user_at_true_minimum() -> Result<()> {
    let db = fresh_db()?;
    let user = db.insert_user("Runner", "runner@example.com", "pw")?;
    let route = db.get_or_create_route("Alpha", "Omega", user)?.id;

    for duration in [8000, 3000, 5000, 3000] {
        db.insert_sprint(&sprint(user, route, duration, true))?;
    }
    db.insert_sprint(&sprint(user, route, 500, false))?;

    let service = LeaderboardService::new(db);
    let attempts = service.best_attempts(route, None)?;

    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].duration_ms, 3000);
    assert_eq!(attempts[0].steps(), 3);
    Ok(())
}

#[test]
fn test_unknown_route_yields_empty_leaderboard() -> Result<()> {
    let db = fresh_db()?;
    let service = LeaderboardService::new(db);

    assert!(service.best_attempts(424242, None)?.is_empty());
    assert!(service.route_leaderboard(424242)?.is_empty());
    assert_eq!(service.placement(424242, 1)?, None);
    Ok(())
}
