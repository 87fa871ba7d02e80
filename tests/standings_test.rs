//! Integration tests for tournament and global point standings.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use sprintrank::storage::NewSprint;
use sprintrank::{AppConfig, Database, RelationGate, StandingsService, TournamentService};

struct Arena {
    db: Arc<Database>,
    gate: RelationGate,
    alice: i64,
    bob: i64,
    tournament: i64,
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn arena() -> Result<Arena> {
    init_logging();
    let db = Arc::new(Database::open_in_memory()?);
    let alice = db.insert_user("Alice", "alice@example.com", "pw")?;
    let bob = db.insert_user("Bob", "bob@example.com", "pw")?;

    let service = TournamentService::new(db.clone(), AppConfig::default());
    let tournament = service.create(alice)?.id;
    let gate = RelationGate::new(db.clone());

    Ok(Arena {
        db,
        gate,
        alice,
        bob,
        tournament,
    })
}

fn attempt(user: i64, route: i64, tournament: Option<i64>, duration_ms: i64) -> NewSprint {
    NewSprint {
        user_id: user,
        route_id: route,
        tournament_id: tournament,
        path: vec!["Start".into(), "Finish".into()],
        started_at: Utc::now(),
        duration_ms,
        success: true,
    }
}

/// The worked scenario: T has routes {R1, R2}; A wins R1, B wins R2.
#[test]
fn test_split_wins_give_each_user_one_point() -> Result<()> {
    let a = arena()?;
    let r1 = a.db.get_or_create_route("One", "End", a.alice)?.id;
    let r2 = a.db.get_or_create_route("Two", "End", a.alice)?.id;
    a.gate.add_route(a.tournament, r1, a.alice)?;
    a.gate.add_route(a.tournament, r2, a.alice)?;

    a.db.insert_sprint(&attempt(a.alice, r1, Some(a.tournament), 3000))?;
    a.db.insert_sprint(&attempt(a.bob, r1, Some(a.tournament), 4000))?;
    a.db.insert_sprint(&attempt(a.bob, r2, Some(a.tournament), 1500))?;
    a.db.insert_sprint(&attempt(a.alice, r2, Some(a.tournament), 2500))?;

    let standings = StandingsService::new(a.db.clone()).tournament_standings(a.tournament)?;

    assert_eq!(standings.len(), 2);
    assert!(standings.iter().all(|s| s.points == 1));
    let names: Vec<&str> = standings.iter().map(|s| s.user_name.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Alice") && names.contains(&"Bob"));
    Ok(())
}

#[test]
fn test_points_total_matches_contested_route_count() -> Result<()> {
    let a = arena()?;
    let contested = a.db.get_or_create_route("Contested", "End", a.alice)?.id;
    let deserted = a.db.get_or_create_route("Deserted", "End", a.alice)?.id;
    let failed_only = a.db.get_or_create_route("Failed", "End", a.alice)?.id;
    for route in [contested, deserted, failed_only] {
        a.gate.add_route(a.tournament, route, a.alice)?;
    }

    a.db.insert_sprint(&attempt(a.bob, contested, Some(a.tournament), 2000))?;
    let mut fail = attempt(a.bob, failed_only, Some(a.tournament), 1000);
    fail.success = false;
    a.db.insert_sprint(&fail)?;

    let standings = StandingsService::new(a.db.clone()).tournament_standings(a.tournament)?;
    let total: u32 = standings.iter().map(|s| s.points).sum();

    // Exactly one route had a successful tournament-scoped attempt
    assert_eq!(total, 1);
    assert_eq!(standings[0].user_name, "Bob");
    Ok(())
}

#[test]
fn test_fastest_attempt_wins_the_route() -> Result<()> {
    let a = arena()?;
    let route = a.db.get_or_create_route("Solo", "End", a.alice)?.id;
    a.gate.add_route(a.tournament, route, a.alice)?;

    a.db.insert_sprint(&attempt(a.alice, route, Some(a.tournament), 1000))?;
    a.db.insert_sprint(&attempt(a.bob, route, Some(a.tournament), 1001))?;

    let standings = StandingsService::new(a.db.clone()).tournament_standings(a.tournament)?;

    assert_eq!(standings.len(), 1);
    assert_eq!(standings[0].user_name, "Alice");
    assert_eq!(standings[0].points, 1);
    Ok(())
}

#[test]
fn test_standings_order_is_highest_points_first() -> Result<()> {
    let a = arena()?;
    let mut routes = Vec::new();
    for name in ["One", "Two", "Three"] {
        let id = a.db.get_or_create_route(name, "End", a.alice)?.id;
        a.gate.add_route(a.tournament, id, a.alice)?;
        routes.push(id);
    }

    // Alice wins two routes, Bob one
    a.db.insert_sprint(&attempt(a.alice, routes[0], Some(a.tournament), 1000))?;
    a.db.insert_sprint(&attempt(a.alice, routes[1], Some(a.tournament), 1000))?;
    a.db.insert_sprint(&attempt(a.bob, routes[2], Some(a.tournament), 1000))?;

    let standings = StandingsService::new(a.db.clone()).tournament_standings(a.tournament)?;

    assert_eq!(standings[0].user_name, "Alice");
    assert_eq!(standings[0].points, 2);
    assert_eq!(standings[1].user_name, "Bob");
    assert_eq!(standings[1].points, 1);
    Ok(())
}

#[test]
fn test_global_standings_cover_all_routes_unscoped() -> Result<()> {
    let a = arena()?;
    let inside = a.db.get_or_create_route("Inside", "End", a.alice)?.id;
    let outside = a.db.get_or_create_route("Outside", "End", a.alice)?.id;
    a.gate.add_route(a.tournament, inside, a.alice)?;

    a.db.insert_sprint(&attempt(a.alice, inside, Some(a.tournament), 2000))?;
    a.db.insert_sprint(&attempt(a.bob, outside, None, 3000))?;
    // Bob is faster on the tournament route but sprinted outside it; globally
    // his attempt counts
    a.db.insert_sprint(&attempt(a.bob, inside, None, 500))?;

    let service = StandingsService::new(a.db.clone());

    let global = service.global_standings()?;
    let bob_global = global.iter().find(|s| s.user_name == "Bob").unwrap();
    assert_eq!(bob_global.points, 2);
    assert!(global.iter().all(|s| s.user_name != "Alice"));

    let scoped = service.tournament_standings(a.tournament)?;
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].user_name, "Alice");
    Ok(())
}

#[test]
fn test_empty_tournament_has_empty_standings() -> Result<()> {
    let a = arena()?;
    let standings = StandingsService::new(a.db.clone()).tournament_standings(a.tournament)?;
    assert!(standings.is_empty());
    Ok(())
}
