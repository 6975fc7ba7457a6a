use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{Criterion, criterion_group, criterion_main};
use map_relay::logging::{LogEvent, LogSink};
use map_relay::{
    Command, EngineConfig, EventHandlers, LatLng, Logger, LoggingResult, MapEngine, MapEvent,
    MapId, MapOptions, MemoryBackend, OverlayKind, PointSpec,
};

#[derive(Clone, Default)]
struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _event: &LogEvent) -> LoggingResult<()> {
        Ok(())
    }
}

const QUEUED_POINTS: usize = 500;
const GROUPED_OVERLAYS: usize = 64;

fn pending_engine() -> (MapEngine, MapId) {
    let mut config = EngineConfig {
        logger: Some(Logger::new(NullSink)),
        ..EngineConfig::default()
    };
    config.enable_metrics();
    let mut engine = MapEngine::with_config(MemoryBackend::new().factory(), config);
    let map = engine.request_map(MapOptions::new("bench")).expect("map");
    (engine, map)
}

fn deferred_drain(c: &mut Criterion) {
    c.bench_function("deferred_drain", |b| {
        b.iter(|| {
            let (mut engine, map) = pending_engine();
            for index in 0..QUEUED_POINTS {
                let spec = PointSpec::new(LatLng::new(index as f64 * 0.01, 120.0));
                let added = engine.submit(map, Command::add_point(spec)).expect("queued");
                let id = added.into_arg().expect("token");
                engine.submit(map, Command::Hide(id)).expect("queued");
            }
            let report = engine.map_ready().expect("ready").expect("drain");
            black_box(report.executed);
        });
    });
}

fn group_fan_out(c: &mut Criterion) {
    let (mut engine, map) = pending_engine();
    engine.map_ready().expect("ready");
    let fired = Arc::new(AtomicUsize::new(0));

    let mut members = Vec::with_capacity(GROUPED_OVERLAYS);
    for index in 0..GROUPED_OVERLAYS {
        let spec = PointSpec::new(LatLng::new(0.0, index as f64)).with_id(format!("p{index}"));
        engine.submit(map, Command::add_point(spec)).expect("point");
        members.push(format!("p{index}"));
    }
    for group in ["even", "odd", "all"] {
        let ids: Vec<String> = members
            .iter()
            .enumerate()
            .filter(|(index, _)| match group {
                "even" => index % 2 == 0,
                "odd" => index % 2 == 1,
                _ => true,
            })
            .map(|(_, id)| id.clone())
            .collect();
        engine
            .submit(map, Command::group(Some(group), ids))
            .expect("group");
        let counter = Arc::clone(&fired);
        let handlers = EventHandlers::new()
            .on("onhide", move |_event: &MapEvent| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .on("onshow", |_event: &MapEvent| {});
        engine
            .submit(map, Command::add_group_event(group, handlers))
            .expect("group event");
    }

    c.bench_function("group_fan_out_hide_show", |b| {
        b.iter(|| {
            engine
                .submit(map, Command::HideByType(OverlayKind::Point.into()))
                .expect("hide");
            engine
                .submit(map, Command::ShowByType(OverlayKind::Point.into()))
                .expect("show");
        });
    });
    black_box(fired.load(Ordering::Relaxed));
}

criterion_group!(benches, deferred_drain, group_fan_out);
criterion_main!(benches);
