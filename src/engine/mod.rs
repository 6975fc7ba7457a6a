//! Deferred command engine.
//!
//! `MapEngine` owns every map it has created. Commands submitted while any
//! map is still initialising are queued in submission order and replayed in
//! one pass when the last map reports ready; each command is followed by an
//! event fan-out over the subjects it affected.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::error::{MapError, Result};
use crate::events::{Aggregator, FanOut};
use crate::geometry::{LatLng, WORLD_PIXEL_WIDTH};
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv, json_str};
use crate::metrics::{EngineMetrics, MetricSnapshot};
use crate::overlay::MapType;
use crate::style::{Fill, Font, StyleDefaults, Stroke};
use crate::widget::{WidgetFactory, WidgetSpec};

pub mod audit;
mod commands;
mod construction;
mod dispatch;
mod instance;


pub use audit::{
    BufferedEngineAudit, EngineAudit, EngineAuditEvent, EngineAuditEventBuilder,
    EngineAuditStage, NullEngineAudit,
};
pub use commands::{
    Arg, Command, FromOutcome, Operation, Outcome, PointSpec, PolygonSpec, PolylineSpec, RunFn,
};
pub use construction::ConstructionQueue;
pub use dispatch::{DrainFailure, DrainReport, ResultToken, SlotState, Submission, WorkQueue};

use dispatch::WorkItem;
use instance::{ExecContext, MapInstance, Step};

const LOG_TARGET: &str = "map_relay::engine";

/// Sequence number of a map created by one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MapId(pub usize);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creation parameters; omitted values come from `EngineConfig::map_defaults`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    pub container: String,
    pub center: Option<LatLng>,
    pub zoom: Option<u8>,
    pub map_type: Option<MapType>,
}

impl MapOptions {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            center: None,
            zoom: None,
            map_type: None,
        }
    }

    pub fn with_center(mut self, center: LatLng) -> Self {
        self.center = Some(center);
        self
    }

    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_map_type(mut self, map_type: MapType) -> Self {
        self.map_type = Some(map_type);
        self
    }

    fn resolve(&self, defaults: &MapDefaults) -> WidgetSpec {
        WidgetSpec {
            container: self.container.clone(),
            center: self.center.unwrap_or(defaults.center),
            zoom: self.zoom.unwrap_or(defaults.zoom),
            map_type: self.map_type.unwrap_or(defaults.map_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapDefaults {
    pub center: LatLng,
    /// Also used by `setCenter` when no zoom is given.
    pub zoom: u8,
    pub map_type: MapType,
}

impl Default for MapDefaults {
    fn default() -> Self {
        Self {
            center: LatLng::new(30.0, 120.0),
            zoom: 5,
            map_type: MapType::Road,
        }
    }
}

/// What a drain does when a queued command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    /// Record the failure and keep replaying.
    #[default]
    Continue,
    /// Stop at the first failure; later tokens fail with `Aborted`.
    Abort,
}

/// Hook invoked after every transition to fully ready.
pub type ReadyHook = Box<dyn FnMut(&mut MapEngine) -> Result<()> + Send>;

/// Configuration knobs for the engine.
#[derive(Clone)]
pub struct EngineConfig {
    /// Optional structured logger used by the engine.
    pub logger: Option<Logger>,
    /// Counters shared with the host.
    pub metrics: Option<Arc<Mutex<EngineMetrics>>>,
    /// Target used when emitting metrics snapshots after a drain.
    pub metrics_target: String,
    pub audit: Arc<dyn EngineAudit>,
    pub drain_policy: DrainPolicy,
    pub map_defaults: MapDefaults,
    pub styles: StyleDefaults,
    /// Pixel x-coordinates returned by `fromLatLngToPoint` wrap at this width.
    pub world_pixel_width: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logger: None,
            metrics: None,
            metrics_target: "map_relay::engine.metrics".to_string(),
            audit: Arc::new(NullEngineAudit),
            drain_policy: DrainPolicy::default(),
            map_defaults: MapDefaults::default(),
            styles: StyleDefaults::default(),
            world_pixel_width: WORLD_PIXEL_WIDTH,
        }
    }
}

impl EngineConfig {
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(EngineMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<Arc<Mutex<EngineMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

pub struct MapEngine {
    config: EngineConfig,
    factory: Box<dyn WidgetFactory>,
    construction: ConstructionQueue,
    /// Indexed by `MapId`; `None` while pending or after a failed creation.
    maps: Vec<Option<MapInstance>>,
    queue: WorkQueue,
    aggregator: Aggregator,
    locked: bool,
    on_ready: Option<ReadyHook>,
}

impl MapEngine {
    pub fn new(factory: impl WidgetFactory + 'static) -> Self {
        Self::with_config(factory, EngineConfig::default())
    }

    pub fn with_config(factory: impl WidgetFactory + 'static, config: EngineConfig) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            construction: ConstructionQueue::new(),
            maps: Vec::new(),
            queue: WorkQueue::new(),
            aggregator: Aggregator::new(),
            locked: false,
            on_ready: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    pub fn is_ready(&self) -> bool {
        self.construction.is_ready()
    }

    pub fn map_count(&self) -> usize {
        self.construction.map_count()
    }

    pub fn ready_count(&self) -> usize {
        self.construction.ready_count()
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// While locked, commands queued before readiness are discarded instead
    /// of replayed.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_on_ready<F>(&mut self, hook: F)
    where
        F: FnMut(&mut MapEngine) -> Result<()> + Send + 'static,
    {
        self.on_ready = Some(Box::new(hook));
    }

    pub fn set_default_stroke(&mut self, stroke: Stroke) {
        self.config.styles.stroke = stroke;
    }

    pub fn set_default_fill(&mut self, fill: Fill) {
        self.config.styles.fill = fill;
    }

    pub fn set_default_font(&mut self, font: Font) {
        self.config.styles.font = font;
    }

    pub fn set_default_point_image(&mut self, url: impl Into<String>) {
        self.config.styles.point_image = url.into();
    }

    pub fn metrics_snapshot(&self) -> Option<MetricSnapshot> {
        let metrics = self.config.metrics.as_ref()?;
        metrics.lock().ok().map(|guard| guard.snapshot())
    }

    /// Reserve a map id and build its widget. The engine stays not ready
    /// until the host calls [`MapEngine::map_ready`] for it.
    pub fn request_map(&mut self, options: MapOptions) -> Result<MapId> {
        let spec = options.resolve(&self.config.map_defaults);
        let container = spec.container.clone();
        let id = self.construction.reserve(spec);
        self.maps.push(None);

        self.log_engine_event(
            LogLevel::Info,
            "map requested",
            [json_kv("map", id.0), json_str("container", container.as_str())],
        );
        self.audit(
            EngineAuditStage::MapRequested,
            [json_kv("map", id.0), json_str("container", container)],
        );

        self.construct_pending()?;
        Ok(id)
    }

    /// Global readiness callback, invoked by the host once per created map.
    /// Returns the drain report when this call made the engine ready.
    pub fn map_ready(&mut self) -> Result<Option<DrainReport>> {
        let complete = self.construction.mark_ready()?;
        let fields = [
            json_kv("ready", self.ready_count()),
            json_kv("maps", self.map_count()),
        ];
        self.log_engine_event(LogLevel::Info, "map ready", fields.clone());
        self.audit(EngineAuditStage::MapReady, fields);

        if !complete {
            return Ok(None);
        }
        Ok(Some(self.on_fully_ready()))
    }

    /// Execute now when ready, otherwise queue and hand back a token.
    pub fn submit(&mut self, map: MapId, command: Command) -> Result<Submission> {
        if self.is_ready() {
            return self.perform(map, command).map(Submission::Ready);
        }
        if !self.construction.is_reserved(map) {
            return Err(MapError::MapNotFound(map));
        }

        let operation = command.operation();
        let token = self.queue.push(map, command);
        self.with_metrics(EngineMetrics::record_deferred);
        let fields = [
            json_kv("map", map.0),
            json_str("operation", operation.name()),
            json_kv("position", token.position()),
        ];
        self.log_engine_event(LogLevel::Debug, "command deferred", fields.clone());
        self.audit(EngineAuditStage::CommandDeferred, fields);
        Ok(Submission::Pending(token))
    }

    fn construct_pending(&mut self) -> Result<()> {
        while let Some((id, spec)) = self.construction.pop() {
            match self.factory.create(&spec) {
                Ok(widget) => {
                    if let Some(slot) = self.maps.get_mut(id.0) {
                        *slot = Some(MapInstance::new(widget));
                    }
                    self.log_engine_event(LogLevel::Debug, "map created", [json_kv("map", id.0)]);
                    self.audit(EngineAuditStage::MapCreated, [json_kv("map", id.0)]);
                }
                Err(error) => {
                    self.log_engine_event(
                        LogLevel::Error,
                        "map creation failed",
                        [json_kv("map", id.0), json_str("error", error.to_string())],
                    );
                    if self.construction.abandon() {
                        self.on_fully_ready();
                    }
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    fn on_fully_ready(&mut self) -> DrainReport {
        let (batch, items) = self.queue.take();
        let report = if self.locked {
            self.discard_items(batch, items)
        } else {
            self.drain_items(batch, items)
        };
        self.audit(
            EngineAuditStage::EngineReady,
            [json_kv("maps", self.map_count()), json_kv("batch", batch)],
        );
        self.emit_metrics_snapshot();

        if let Some(mut hook) = self.on_ready.take() {
            if let Err(error) = hook(self) {
                self.log_engine_event(
                    LogLevel::Warn,
                    "on_ready hook failed",
                    [json_str("error", error.to_string())],
                );
            }
            // The hook may have installed a replacement.
            if self.on_ready.is_none() {
                self.on_ready = Some(hook);
            }
        }
        report
    }

    fn drain_items(&mut self, batch: u64, items: Vec<WorkItem>) -> DrainReport {
        let mut report = DrainReport::new(batch);
        self.log_engine_event(
            LogLevel::Info,
            "drain started",
            [json_kv("batch", batch), json_kv("queued", items.len())],
        );

        let mut aborted = false;
        for WorkItem {
            map,
            command,
            token,
        } in items
        {
            if aborted {
                token.settle(SlotState::Failed(MapError::Aborted));
                report.aborted += 1;
                continue;
            }
            let operation = command.operation();
            match self.perform(map, command) {
                Ok(outcome) => {
                    token.settle(SlotState::Resolved(outcome));
                    report.executed += 1;
                }
                Err(error) => {
                    self.log_engine_event(
                        LogLevel::Warn,
                        "queued command failed",
                        [
                            json_kv("position", token.position()),
                            json_str("operation", operation.name()),
                            json_str("error", error.to_string()),
                        ],
                    );
                    token.settle(SlotState::Failed(error.clone()));
                    report.failed.push(DrainFailure {
                        position: token.position(),
                        map,
                        operation,
                        error,
                    });
                    aborted = self.config.drain_policy == DrainPolicy::Abort;
                }
            }
        }

        let failures = report.failed.len();
        self.with_metrics(|metrics| metrics.record_drain(failures));
        let fields = [
            json_kv("batch", batch),
            json_kv("executed", report.executed),
            json_kv("failed", failures),
            json_kv("aborted", report.aborted),
        ];
        self.log_engine_event(LogLevel::Info, "drain completed", fields.clone());
        self.audit(EngineAuditStage::DrainCompleted, fields);
        report
    }

    fn discard_items(&mut self, batch: u64, items: Vec<WorkItem>) -> DrainReport {
        let mut report = DrainReport::new(batch);
        for item in items {
            item.token.settle(SlotState::Failed(MapError::Discarded));
            report.discarded += 1;
        }
        let discarded = report.discarded;
        self.with_metrics(|metrics| metrics.record_discarded(discarded));
        let fields = [json_kv("batch", batch), json_kv("discarded", discarded)];
        self.log_engine_event(LogLevel::Info, "queue discarded", fields.clone());
        self.audit(EngineAuditStage::QueueDiscarded, fields);
        report
    }

    /// Execute one command against a created map and notify affected subjects.
    fn perform(&mut self, map: MapId, command: Command) -> Result<Outcome> {
        let operation = command.operation();
        let instance = self
            .maps
            .get_mut(map.0)
            .and_then(Option::as_mut)
            .ok_or(MapError::MapNotFound(map))?;
        let mut ctx = ExecContext {
            styles: &self.config.styles,
            default_zoom: self.config.map_defaults.zoom,
            world_width: self.config.world_pixel_width,
            staging: &mut self.aggregator.staging,
        };

        let execution = match instance.execute(command, &mut ctx) {
            Ok(Step::Done(execution)) => execution,
            Ok(Step::Run(body)) => {
                let result = self.run_atomic(body);
                self.record_command(map, operation, FanOut::default());
                return result;
            }
            Err(error) => {
                self.aggregator.discard_staged();
                return Err(error);
            }
        };

        let fan_out = {
            let view = instance.fan_out_context();
            self.aggregator.dispatch(
                &view,
                operation.event_pool(),
                operation.trigger().as_ref(),
                &execution.changed,
            )
        };
        self.record_command(map, operation, fan_out);
        Ok(execution.outcome)
    }

    /// Group notifications stay deduplicated across every command the body
    /// issues, including nested runs.
    fn run_atomic(&mut self, body: RunFn) -> Result<Outcome> {
        let mut scope = AtomicScope::enter(self);
        body(&mut *scope.engine)
    }

    fn record_command(&self, map: MapId, operation: Operation, fan_out: FanOut) {
        self.with_metrics(|metrics| {
            metrics.record_executed();
            metrics.record_fan_out(fan_out.direct + fan_out.grouped, fan_out.removals);
        });
        let fields = [
            json_kv("map", map.0),
            json_str("operation", operation.name()),
            json_kv("listeners", fan_out.total()),
        ];
        self.log_engine_event(LogLevel::Trace, "command executed", fields.clone());
        self.audit(EngineAuditStage::CommandExecuted, fields);
    }

    fn with_metrics(&self, update: impl FnOnce(&mut EngineMetrics)) {
        if let Some(metrics) = self.config.metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                update(&mut *guard);
            }
        }
    }

    fn emit_metrics_snapshot(&self) {
        let (Some(logger), Some(snapshot)) = (self.config.logger.as_ref(), self.metrics_snapshot())
        else {
            return;
        };
        let _ = logger.log_event(snapshot.to_log_event(&self.config.metrics_target));
    }

    fn log_engine_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.config.logger.as_ref() {
            if !logger.enabled(level) {
                return;
            }
            let event = event_with_fields(level, LOG_TARGET, message, fields);
            let _ = logger.log_event(event);
        }
    }

    fn audit<I>(&self, stage: EngineAuditStage, details: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut builder = EngineAuditEventBuilder::new(stage);
        for (key, value) in details {
            builder.detail(key, value);
        }
        self.config.audit.record(builder.finish());
    }
}

/// Keeps the aggregator in atomic mode for as long as it lives. Leaving the
/// scope also ends the run when the body unwinds.
struct AtomicScope<'a> {
    engine: &'a mut MapEngine,
}

impl<'a> AtomicScope<'a> {
    fn enter(engine: &'a mut MapEngine) -> Self {
        engine.aggregator.enter_atomic();
        Self { engine }
    }
}

impl Drop for AtomicScope<'_> {
    fn drop(&mut self) {
        self.engine.aggregator.exit_atomic();
    }
}

impl fmt::Debug for MapEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapEngine")
            .field("maps", &self.map_count())
            .field("ready", &self.ready_count())
            .field("queued", &self.queue.len())
            .field("locked", &self.locked)
            .finish()
    }
}
