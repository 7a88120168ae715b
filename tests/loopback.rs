//! Smoke test of the in-process transport

use arena_sync::config::{Config, LogFormat, Tuning};
use arena_sync::net::run_demo;

#[test]
fn bots_see_each_other_through_the_loopback() {
    let config = Config {
        log_level: "warn".to_string(),
        log_format: LogFormat::Text,
        server_tick_rate: 60,
        demo_bots: 2,
        demo_seconds: 1,
        tuning: Tuning::default(),
    };

    let report = tokio_test::block_on(run_demo(&config, std::future::pending())).unwrap();

    assert!(report.ticks > 10);
    assert_eq!(report.bots.len(), 2);
    for bot in &report.bots {
        assert!(bot.predicted.is_some(), "bot {} never spawned", bot.id);
        assert_eq!(bot.remotes, 1);
        assert!(bot.snapshots_stored > 0);
        assert!(bot.latency.is_some_and(|l| l >= 0.0));
    }

    let snapshot = report.final_snapshot.expect("server recorded snapshots");
    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json["entities"].is_object());
}
