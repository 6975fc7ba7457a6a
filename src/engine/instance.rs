use std::collections::HashMap;

use crate::error::{MapError, Result};
use crate::events::{
    EventHandlers, EventKind, FanOutContext, ListenerHandle, ListenerTable, RemovalStaging,
};
use crate::geometry::{Bounds, normalize_pixel_x};
use crate::overlay::{GroupId, MAP_SUBJECT, Overlay, OverlayId, OverlayKind, OverlayOptions, Shape};
use crate::registry::{GroupRegistry, OverlayRegistry, Residence};
use crate::style::{Label, StyleDefaults};
use crate::widget::{EventTarget, MapWidget};

use super::commands::{Arg, Command, Outcome, PointSpec, PolygonSpec, PolylineSpec, RunFn};

/// Engine settings a command body reads, plus the removal staging it feeds.
pub(crate) struct ExecContext<'a> {
    pub styles: &'a StyleDefaults,
    pub default_zoom: u8,
    pub world_width: f64,
    pub staging: &'a mut RemovalStaging,
}

/// Result of a command body plus the overlays whose visibility it changed.
#[derive(Debug)]
pub(crate) struct Execution {
    pub outcome: Outcome,
    pub changed: Vec<OverlayId>,
}

impl Execution {
    fn value(outcome: Outcome) -> Self {
        Self {
            outcome,
            changed: Vec::new(),
        }
    }

    fn unit() -> Self {
        Self::value(Outcome::Unit)
    }

    fn count(changed: Vec<OverlayId>) -> Self {
        Self {
            outcome: Outcome::Count(changed.len()),
            changed,
        }
    }
}

pub(crate) enum Step {
    Done(Execution),
    /// `run` bodies need the whole engine.
    Run(RunFn),
}

/// One created map: its widget and every per-map table.
pub(crate) struct MapInstance {
    widget: Box<dyn MapWidget>,
    overlays: OverlayRegistry,
    groups: GroupRegistry,
    listeners: ListenerTable,
    group_listeners: ListenerTable,
    /// Per-member group trampolines, keyed by overlay id.
    member_bindings: HashMap<OverlayId, Vec<(GroupId, ListenerHandle)>>,
}

impl MapInstance {
    pub fn new(widget: Box<dyn MapWidget>) -> Self {
        Self {
            widget,
            overlays: OverlayRegistry::new(),
            groups: GroupRegistry::new(),
            listeners: ListenerTable::new(),
            group_listeners: ListenerTable::new(),
            member_bindings: HashMap::new(),
        }
    }

    pub fn fan_out_context(&self) -> FanOutContext<'_> {
        FanOutContext {
            listeners: &self.listeners,
            group_listeners: &self.group_listeners,
            groups: &self.groups,
            center: self.widget.center().normalized(),
        }
    }

    pub fn execute(&mut self, command: Command, ctx: &mut ExecContext<'_>) -> Result<Step> {
        let execution = match command {
            Command::SetCenter { center, zoom } => {
                let center = center.resolve()?;
                let zoom = zoom.map(Arg::resolve).transpose()?.unwrap_or(ctx.default_zoom);
                self.widget.set_center(center, zoom);
                Execution::unit()
            }
            Command::SetZoom(zoom) => {
                self.widget.set_zoom(zoom.resolve()?);
                Execution::unit()
            }
            Command::SetMapType(map_type) => {
                self.widget.set_map_type(map_type.resolve()?);
                Execution::unit()
            }
            Command::GetCenter => {
                Execution::value(Outcome::Position(self.widget.center().normalized()))
            }
            Command::GetZoom => Execution::value(Outcome::Zoom(self.widget.zoom())),
            Command::GetMapType => Execution::value(Outcome::MapType(self.widget.map_type())),
            Command::GetSize => Execution::value(Outcome::Size(self.widget.size())),
            Command::GetBounds => {
                let bounds = self.widget.bounds();
                Execution::value(Outcome::Bounds(Bounds::new(
                    bounds.south_west.normalized(),
                    bounds.north_east.normalized(),
                )))
            }
            Command::Translate { east, south } => {
                self.widget.pan_by(east, south);
                Execution::unit()
            }
            Command::FromLatLngToPoint(position) => {
                let mut pixel = self.widget.lat_lng_to_point(position.resolve()?);
                pixel.x = normalize_pixel_x(pixel.x, ctx.world_width);
                Execution::value(Outcome::Pixel(pixel))
            }
            Command::FromPointToLatLng(pixel) => {
                let position = self.widget.point_to_lat_lng(pixel.resolve()?);
                Execution::value(Outcome::Position(position.normalized()))
            }
            Command::AddPoint(spec) => self.add_point(spec, ctx.styles)?,
            Command::AddPolyline(spec) => self.add_polyline(spec, ctx.styles)?,
            Command::AddPolygon(spec) => self.add_polygon(spec, ctx.styles)?,
            Command::GetType(id) => {
                let id = id.resolve()?;
                let residence = self.residence(&id)?;
                Execution::value(Outcome::Kind(residence.kind()))
            }
            Command::GetByType(kind) => {
                let ids = self.overlays.ids_by_kind(self.widget.as_ref(), kind.resolve()?);
                Execution::value(Outcome::Ids(ids))
            }
            Command::Locate { id, zoom } => {
                let id = id.resolve()?;
                let overlay = self
                    .overlays
                    .fetch(self.widget.as_ref(), &id)
                    .ok_or(MapError::IdNotFound(id))?;
                self.widget.locate_overlay(&overlay, zoom);
                Execution::unit()
            }
            Command::Remove(id) => {
                let id = id.resolve()?;
                self.residence(&id)?;
                self.delete_overlay(&id, ctx.staging);
                Execution::unit()
            }
            Command::RemoveByType(kind) => {
                let removed = self.remove_kind(kind.resolve()?, ctx.staging);
                Execution::value(Outcome::Count(removed))
            }
            Command::RemoveAll => {
                let removed = OverlayKind::ALL
                    .into_iter()
                    .map(|kind| self.remove_kind(kind, ctx.staging))
                    .sum();
                Execution::value(Outcome::Count(removed))
            }
            Command::Hide(id) => {
                let id = id.resolve()?;
                self.residence(&id)?;
                let hidden = self.overlays.hide(self.widget.as_mut(), &id);
                Execution {
                    outcome: Outcome::Bool(hidden),
                    changed: if hidden { vec![id] } else { Vec::new() },
                }
            }
            Command::HideByType(kind) => {
                Execution::count(self.overlays.hide_kind(self.widget.as_mut(), kind.resolve()?))
            }
            Command::HideAll => {
                let changed = OverlayKind::ALL
                    .into_iter()
                    .flat_map(|kind| self.overlays.hide_kind(self.widget.as_mut(), kind))
                    .collect();
                Execution::count(changed)
            }
            Command::Show(id) => {
                let id = id.resolve()?;
                self.residence(&id)?;
                let shown = self.overlays.show(self.widget.as_mut(), &id);
                Execution {
                    outcome: Outcome::Bool(shown),
                    changed: if shown { vec![id] } else { Vec::new() },
                }
            }
            Command::ShowByType(kind) => {
                Execution::count(self.overlays.show_kind(self.widget.as_mut(), kind.resolve()?))
            }
            Command::ShowAll => {
                let changed = OverlayKind::ALL
                    .into_iter()
                    .flat_map(|kind| self.overlays.show_kind(self.widget.as_mut(), kind))
                    .collect();
                Execution::count(changed)
            }
            Command::IsHidden(id) => {
                let id = id.resolve()?;
                Execution::value(Outcome::Bool(self.residence(&id)?.is_hidden()))
            }
            Command::AddMapEvent(handlers) => {
                self.register_map_handlers(&handlers);
                Execution::unit()
            }
            Command::AddOverlayEvent { id, handlers } => {
                let id = id.resolve()?;
                self.residence(&id)?;
                self.register_overlay_handlers(&id, &handlers);
                Execution::unit()
            }
            Command::AddOverlayEventByType { kind, handlers } => {
                for id in self.overlays.ids_by_kind(self.widget.as_ref(), kind.resolve()?) {
                    self.register_overlay_handlers(&id, &handlers);
                }
                Execution::unit()
            }
            Command::AddOverlayEventToAll(handlers) => {
                for id in self.overlays.all_ids(self.widget.as_ref()) {
                    self.register_overlay_handlers(&id, &handlers);
                }
                Execution::unit()
            }
            Command::RemoveMapEvent(event) => {
                self.listeners.clear(MAP_SUBJECT, &event);
                Execution::unit()
            }
            Command::RemoveOverlayEvent { id, event } => {
                let id = id.resolve()?;
                self.residence(&id)?;
                self.listeners.clear(&id, &event);
                Execution::unit()
            }
            Command::RemoveOverlayEventByType { kind, event } => {
                for id in self.overlays.ids_by_kind(self.widget.as_ref(), kind.resolve()?) {
                    self.listeners.clear(&id, &event);
                }
                Execution::unit()
            }
            Command::RemoveAllOverlayEvent(event) => {
                for id in self.overlays.all_ids(self.widget.as_ref()) {
                    self.listeners.clear(&id, &event);
                }
                Execution::unit()
            }
            Command::Group { id, members } => {
                let members = members
                    .into_iter()
                    .map(Arg::resolve)
                    .collect::<Result<Vec<_>>>()?;
                Execution::value(Outcome::Id(self.create_group(id, members)?))
            }
            Command::Ungroup(id) => {
                let id = id.resolve()?;
                Execution::value(Outcome::Bool(self.drop_group(&id)))
            }
            Command::GetGroup(id) => {
                let id = id.resolve()?;
                Execution::value(Outcome::Ids(self.members(&id)?))
            }
            Command::RemoveGroup(id) => {
                let id = id.resolve()?;
                for member in self.members(&id)? {
                    self.delete_overlay(&member, ctx.staging);
                }
                ctx.staging
                    .stage_group(&id, self.group_listeners.handles(&id, &EventKind::Remove));
                self.drop_group(&id);
                Execution::unit()
            }
            Command::HideGroup(id) => {
                let id = id.resolve()?;
                let changed = self
                    .members(&id)?
                    .into_iter()
                    .filter(|member| self.overlays.hide(self.widget.as_mut(), member))
                    .collect();
                Execution::count(changed)
            }
            Command::ShowGroup(id) => {
                let id = id.resolve()?;
                let changed = self
                    .members(&id)?
                    .into_iter()
                    .filter(|member| self.overlays.show(self.widget.as_mut(), member))
                    .collect();
                Execution::count(changed)
            }
            Command::LocateGroup { id, zoom } => {
                let id = id.resolve()?;
                let overlays: Vec<Overlay> = self
                    .members(&id)?
                    .iter()
                    .filter_map(|member| self.overlays.fetch(self.widget.as_ref(), member))
                    .collect();
                self.widget.locate_overlays(&overlays, zoom);
                Execution::unit()
            }
            Command::AddGroupEvent { id, handlers } => {
                let id = id.resolve()?;
                let members = self.members(&id)?;
                self.register_group_handlers(&id, &members, &handlers);
                Execution::unit()
            }
            Command::RemoveGroupEvent { id, event } => {
                let id = id.resolve()?;
                self.members(&id)?;
                self.group_listeners.clear(&id, &event);
                Execution::unit()
            }
            Command::Run(body) => return Ok(Step::Run(body)),
        };
        Ok(Step::Done(execution))
    }

    fn residence(&self, id: &str) -> Result<Residence> {
        self.overlays
            .residence(self.widget.as_ref(), id)
            .ok_or_else(|| MapError::IdNotFound(id.to_string()))
    }

    fn members(&self, group: &str) -> Result<Vec<OverlayId>> {
        self.groups
            .members(group)
            .ok_or_else(|| MapError::IdNotFound(group.to_string()))
    }

    fn claim_id(&self, requested: Option<OverlayId>) -> Result<OverlayId> {
        match requested {
            Some(id) if id == MAP_SUBJECT || self.overlays.contains(self.widget.as_ref(), &id) => {
                Err(MapError::IdAlreadyExists(id))
            }
            Some(id) => Ok(id),
            None => Ok(self.overlays.allocate_id(self.widget.as_ref())),
        }
    }

    fn place(&mut self, overlay: Overlay) -> Execution {
        let id = overlay.id.clone();
        self.widget.add_overlay(overlay, true);
        self.groups.bind_overlay(&id);
        Execution::value(Outcome::Id(id))
    }

    fn add_point(&mut self, spec: PointSpec, styles: &StyleDefaults) -> Result<Execution> {
        let position = spec.position.resolve()?;
        let id = self.claim_id(spec.id)?;
        let options = OverlayOptions {
            zoom_levels: spec.zoom_levels.unwrap_or(OverlayOptions::default().zoom_levels),
            z_index: spec.z_index.unwrap_or(OverlayOptions::default().z_index),
            editable: spec.editable.unwrap_or(false),
            label: spec.label.map(|label| with_default_font(label, styles)),
            image_url: Some(spec.image_url.unwrap_or_else(|| styles.point_image.clone())),
            image_offset: spec.image_offset.unwrap_or((0, 0)),
            ..OverlayOptions::default()
        };
        Ok(self.place(Overlay {
            id,
            kind: OverlayKind::Point,
            shape: Shape::Point(position),
            options,
        }))
    }

    fn add_polyline(&mut self, spec: PolylineSpec, styles: &StyleDefaults) -> Result<Execution> {
        let id = self.claim_id(spec.id)?;
        let options = OverlayOptions {
            zoom_levels: spec.zoom_levels.unwrap_or(OverlayOptions::default().zoom_levels),
            z_index: spec.z_index.unwrap_or(OverlayOptions::default().z_index),
            editable: spec.editable.unwrap_or(false),
            label: spec.label.map(|label| with_default_font(label, styles)),
            stroke: Some(spec.stroke.unwrap_or(styles.stroke)),
            ..OverlayOptions::default()
        };
        Ok(self.place(Overlay {
            id,
            kind: OverlayKind::Polyline,
            shape: Shape::Path(spec.path),
            options,
        }))
    }

    fn add_polygon(&mut self, spec: PolygonSpec, styles: &StyleDefaults) -> Result<Execution> {
        let id = self.claim_id(spec.id)?;
        let options = OverlayOptions {
            zoom_levels: spec.zoom_levels.unwrap_or(OverlayOptions::default().zoom_levels),
            z_index: spec.z_index.unwrap_or(OverlayOptions::default().z_index),
            editable: spec.editable.unwrap_or(false),
            label: spec.label.map(|label| with_default_font(label, styles)),
            stroke: Some(spec.stroke.unwrap_or(styles.stroke)),
            fill: Some(spec.fill.unwrap_or(styles.fill)),
            ..OverlayOptions::default()
        };
        Ok(self.place(Overlay {
            id,
            kind: OverlayKind::Polygon,
            shape: Shape::Path(spec.path),
            options,
        }))
    }

    fn remove_kind(&mut self, kind: OverlayKind, staging: &mut RemovalStaging) -> usize {
        self.overlays
            .ids_by_kind(self.widget.as_ref(), kind)
            .iter()
            .filter(|id| self.delete_overlay(id, staging))
            .count()
    }

    /// Remove an overlay, silence its listeners and stage every `onremove`
    /// handle for the overlay and its groups. No-op for unknown ids.
    pub fn delete_overlay(&mut self, id: &str, staging: &mut RemovalStaging) -> bool {
        if id == MAP_SUBJECT || self.overlays.remove(self.widget.as_mut(), id).is_none() {
            return false;
        }
        let mut registered = self.listeners.drop_subject(id);
        staging.stage_overlay(id, registered.remove(&EventKind::Remove).unwrap_or_default());
        let bindings = self.member_bindings.remove(id).unwrap_or_default();
        for gid in self.groups.detach_overlay(id) {
            for (_, handle) in bindings.iter().filter(|(bound, _)| *bound == gid) {
                handle.tombstone();
            }
            staging.stage_group(&gid, self.group_listeners.handles(&gid, &EventKind::Remove));
        }
        true
    }

    fn create_group(&mut self, id: Option<GroupId>, members: Vec<OverlayId>) -> Result<GroupId> {
        if let Some(missing) = members
            .iter()
            .find(|member| !self.overlays.contains(self.widget.as_ref(), member))
        {
            return Err(MapError::IdNotFound(missing.clone()));
        }
        let id = match id {
            Some(id) if self.groups.contains(&id) => return Err(MapError::IdAlreadyExists(id)),
            Some(id) => id,
            None => self.groups.allocate_id(),
        };
        self.groups.insert(id.clone(), members)?;
        Ok(id)
    }

    fn drop_group(&mut self, id: &str) -> bool {
        if self.groups.remove(id).is_none() {
            return false;
        }
        self.group_listeners.drop_subject(id);
        for bindings in self.member_bindings.values_mut() {
            bindings.retain(|(gid, _)| gid != id);
        }
        true
    }

    fn register_map_handlers(&mut self, handlers: &EventHandlers) {
        for (kind, listener) in handlers.iter() {
            let handle = ListenerHandle::new(listener.clone());
            if let Some(native) = kind.native() {
                self.widget
                    .add_event_listener(EventTarget::Map, native, handle.trampoline(MAP_SUBJECT));
            }
            self.listeners.push(MAP_SUBJECT, kind.clone(), handle);
        }
    }

    fn register_overlay_handlers(&mut self, id: &str, handlers: &EventHandlers) {
        for (kind, listener) in handlers.iter() {
            let handle = ListenerHandle::new(listener.clone());
            if let Some(native) = kind.native().filter(|native| !native.is_view_change()) {
                self.widget.add_event_listener(
                    EventTarget::Overlay(id.to_string()),
                    native,
                    handle.trampoline(id),
                );
            }
            self.listeners.push(id, kind.clone(), handle);
        }
    }

    /// Trampolines are wired onto the current members only.
    fn register_group_handlers(&mut self, id: &str, members: &[OverlayId], handlers: &EventHandlers) {
        for (kind, listener) in handlers.iter() {
            let handle = ListenerHandle::new(listener.clone());
            if let Some(native) = kind.native().filter(|native| !native.is_view_change()) {
                for member in members {
                    let bound = handle.bind();
                    self.widget.add_event_listener(
                        EventTarget::Overlay(member.clone()),
                        native,
                        bound.trampoline(id),
                    );
                    self.member_bindings
                        .entry(member.clone())
                        .or_default()
                        .push((id.to_string(), bound));
                }
            }
            self.group_listeners.push(id, kind.clone(), handle);
        }
    }
}

fn with_default_font(mut label: Label, styles: &StyleDefaults) -> Label {
    if label.font.is_none() {
        label.font = Some(styles.font.clone());
    }
    label
}
