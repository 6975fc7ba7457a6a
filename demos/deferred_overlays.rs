//! Queue overlay commands before the map is ready, then watch them replay.
//!
//! Run with `cargo run --example deferred_overlays`.

use std::sync::Arc;

use map_relay::{
    BufferedEngineAudit, Command, EngineConfig, EventHandlers, LatLng, LogLevel, Logger, MapEngine,
    MapEvent, MapOptions, MemoryBackend, MemorySink, OverlayKind, PointSpec, PolylineSpec, Result,
    Submission,
};

fn main() -> Result<()> {
    let sink = MemorySink::new();
    let audit = BufferedEngineAudit::new();
    let mut config = EngineConfig {
        logger: Some(Logger::new(sink.clone()).with_min_level(LogLevel::Info)),
        audit: Arc::new(audit.clone()),
        ..EngineConfig::default()
    };
    config.enable_metrics();

    let backend = MemoryBackend::new();
    let mut engine = MapEngine::with_config(backend.factory(), config);
    let options = MapOptions::new("harbour").with_center(LatLng::new(31.2, 121.5));
    let map = engine.request_map(options)?;

    let watch = EventHandlers::new()
        .on("onhide", |event: &MapEvent| println!("group hidden: {}", event.id))
        .on("onremove", |event: &MapEvent| println!("group removed: {}", event.id));

    let pier = engine.submit(
        map,
        Command::add_point(PointSpec::new(LatLng::new(31.23, 121.49)).with_id("pier")),
    )?;
    let ferry = engine.submit(
        map,
        Command::AddPolyline(PolylineSpec::new(vec![
            LatLng::new(31.23, 121.49),
            LatLng::new(31.25, 121.52),
        ])),
    )?;
    let members = [
        pier.clone().into_arg::<String>()?,
        ferry.clone().into_arg::<String>()?,
    ];
    let group = engine.submit(map, Command::group(Some("route"), members))?;
    engine.submit(map, Command::add_group_event("route", watch))?;
    let hidden = engine.submit(map, Command::HideGroup("route".into()))?;
    describe("pier", &pier);

    if let Some(report) = engine.map_ready()? {
        println!(
            "drained batch {}: {} executed, {} failed",
            report.batch,
            report.executed,
            report.failed.len()
        );
    }

    describe("pier", &pier);
    describe("ferry", &ferry);
    describe("group", &group);
    describe("hideGroup", &hidden);

    let points = engine.submit(map, Command::get_by_type(OverlayKind::Point))?;
    println!("points: {:?}", points.outcome()?);
    engine.submit(map, Command::remove_group("route"))?;

    for event in sink.events() {
        println!("[{:?}] {} {:?}", event.level, event.message, event.fields);
    }
    println!("audit stages: {:?}", audit.stages());
    if let Some(snapshot) = engine.metrics_snapshot() {
        println!("metrics: {snapshot:?}");
    }
    Ok(())
}

fn describe(label: &str, submission: &Submission) {
    match submission.outcome() {
        Ok(outcome) => println!("{label}: {outcome:?}"),
        Err(error) => println!("{label}: {error}"),
    }
}
