use std::collections::HashSet;

use crate::geometry::LatLng;
use crate::overlay::{GroupId, MAP_SUBJECT, OverlayId};
use crate::registry::GroupRegistry;

use super::core::{EventKind, ListenerHandle, ListenerTable, MapEvent};

/// Which subjects an operation can affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPool {
    None,
    /// Only the map subject.
    MapOnly,
    /// The overlays changed by this step plus the map subject.
    Changed,
}

/// `onremove` handles collected by overlay deletion, fired after the
/// enclosing operation's own notifications.
#[derive(Debug, Default)]
pub struct RemovalStaging {
    overlays: Vec<(ListenerHandle, OverlayId)>,
    groups: Vec<(ListenerHandle, GroupId)>,
    staged_groups: HashSet<GroupId>,
}

impl RemovalStaging {
    pub fn stage_overlay(&mut self, id: &str, handles: Vec<ListenerHandle>) {
        self.overlays
            .extend(handles.into_iter().map(|handle| (handle, id.to_string())));
    }

    /// Stage a group's removal handles unless it was already staged during
    /// this pass. Returns whether anything was staged.
    pub fn stage_group(&mut self, id: &str, handles: &[ListenerHandle]) -> bool {
        if !self.staged_groups.insert(id.to_string()) {
            return false;
        }
        self.groups
            .extend(handles.iter().map(|handle| (handle.clone(), id.to_string())));
        true
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty() && self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overlays.len() + self.groups.len()
    }

    /// Drop staged handles without firing them.
    pub fn clear(&mut self) {
        self.overlays.clear();
        self.groups.clear();
    }

    fn reset_dedup(&mut self) {
        self.staged_groups.clear();
    }
}

/// Read-only view of one map's listener state for a fan-out pass.
pub struct FanOutContext<'a> {
    pub listeners: &'a ListenerTable,
    pub group_listeners: &'a ListenerTable,
    pub groups: &'a GroupRegistry,
    /// Map center reported in every payload.
    pub center: LatLng,
}

/// Number of callbacks invoked by one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub direct: usize,
    pub grouped: usize,
    pub removals: usize,
}

impl FanOut {
    pub fn total(&self) -> usize {
        self.direct + self.grouped + self.removals
    }
}

/// Per-engine aggregation state.
///
/// Group notifications are deduplicated per pass. Inside an atomic run the
/// dedup sets survive pass boundaries and are only reset when the outermost
/// run exits.
#[derive(Debug, Default)]
pub struct Aggregator {
    notified_groups: HashSet<GroupId>,
    atomic_depth: usize,
    pub(crate) staging: RemovalStaging,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_atomic(&mut self) {
        self.atomic_depth += 1;
    }

    pub fn exit_atomic(&mut self) {
        self.atomic_depth = self.atomic_depth.saturating_sub(1);
        if self.atomic_depth == 0 {
            self.reset_dedup();
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic_depth > 0
    }

    pub fn staging_mut(&mut self) -> &mut RemovalStaging {
        &mut self.staging
    }

    pub fn affected_subjects(pool: EventPool, changed: &[OverlayId]) -> Vec<String> {
        match pool {
            EventPool::None => Vec::new(),
            EventPool::MapOnly => vec![MAP_SUBJECT.to_string()],
            EventPool::Changed if changed.is_empty() => Vec::new(),
            EventPool::Changed => {
                let mut subjects = changed.to_vec();
                subjects.push(MAP_SUBJECT.to_string());
                subjects
            }
        }
    }

    /// Notify the subjects affected by one top-level operation, then fire
    /// every staged removal handle.
    pub fn dispatch(
        &mut self,
        ctx: &FanOutContext<'_>,
        pool: EventPool,
        trigger: Option<&EventKind>,
        changed: &[OverlayId],
    ) -> FanOut {
        let mut fan_out = FanOut::default();

        if let Some(kind) = trigger {
            let subjects = Self::affected_subjects(pool, changed);
            for subject in &subjects {
                let event = MapEvent::new(ctx.center, subject.as_str());
                fan_out.direct += fire_all(ctx.listeners.handles(subject, kind), &event);
            }
            for subject in &subjects {
                for gid in ctx.groups.groups_of(subject) {
                    if !self.notified_groups.insert(gid.clone()) {
                        continue;
                    }
                    let event = MapEvent::new(ctx.center, gid.as_str());
                    fan_out.grouped += fire_all(ctx.group_listeners.handles(gid, kind), &event);
                }
            }
        }

        // Removal handles are tombstoned by the deletion that staged them.
        for (handle, id) in self.staging.overlays.drain(..) {
            handle.fire_unchecked(&MapEvent::new(ctx.center, id));
            fan_out.removals += 1;
        }
        for (handle, id) in self.staging.groups.drain(..) {
            handle.fire_unchecked(&MapEvent::new(ctx.center, id));
            fan_out.removals += 1;
        }

        if !self.is_atomic() {
            self.reset_dedup();
        }
        fan_out
    }

    /// Forget removals staged by an operation that failed part way.
    pub fn discard_staged(&mut self) {
        self.staging.clear();
        if !self.is_atomic() {
            self.reset_dedup();
        }
    }

    fn reset_dedup(&mut self) {
        self.notified_groups.clear();
        self.staging.reset_dedup();
    }
}

fn fire_all(handles: &[ListenerHandle], event: &MapEvent) -> usize {
    handles.iter().filter(|handle| handle.fire(event)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<String>>>;

    fn recorder(seen: &Seen, tag: &str) -> ListenerHandle {
        let seen = Arc::clone(seen);
        let tag = tag.to_string();
        ListenerHandle::new(Arc::new(move |event: &MapEvent| {
            seen.lock().unwrap().push(format!("{tag}:{}", event.id));
        }))
    }

    struct Fixture {
        listeners: ListenerTable,
        group_listeners: ListenerTable,
        groups: GroupRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                listeners: ListenerTable::new(),
                group_listeners: ListenerTable::new(),
                groups: GroupRegistry::new(),
            }
        }

        fn ctx(&self) -> FanOutContext<'_> {
            FanOutContext {
                listeners: &self.listeners,
                group_listeners: &self.group_listeners,
                groups: &self.groups,
                center: LatLng::new(30.0, 120.0),
            }
        }
    }

    fn ids(values: &[&str]) -> Vec<OverlayId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn changed_pool_is_empty_when_nothing_changed() {
        assert!(Aggregator::affected_subjects(EventPool::Changed, &[]).is_empty());
        assert_eq!(
            Aggregator::affected_subjects(EventPool::Changed, &ids(&["a"])),
            ids(&["a", MAP_SUBJECT])
        );
        assert_eq!(
            Aggregator::affected_subjects(EventPool::MapOnly, &ids(&["a"])),
            ids(&[MAP_SUBJECT])
        );
        assert!(Aggregator::affected_subjects(EventPool::None, &ids(&["a"])).is_empty());
    }

    #[test]
    fn overlapping_groups_fire_once_each() {
        let seen: Seen = Arc::default();
        let mut fx = Fixture::new();
        fx.groups.insert("g1".into(), ids(&["o"])).unwrap();
        fx.groups.insert("g2".into(), ids(&["o"])).unwrap();
        fx.listeners.push("o", EventKind::Hide, recorder(&seen, "o"));
        fx.group_listeners.push("g1", EventKind::Hide, recorder(&seen, "g"));
        fx.group_listeners.push("g2", EventKind::Hide, recorder(&seen, "g"));

        let mut aggregator = Aggregator::new();
        let fan_out = aggregator.dispatch(
            &fx.ctx(),
            EventPool::Changed,
            Some(&EventKind::Hide),
            &ids(&["o"]),
        );

        assert_eq!(fan_out, FanOut { direct: 1, grouped: 2, removals: 0 });
        assert_eq!(*seen.lock().unwrap(), vec!["o:o", "g:g1", "g:g2"]);
    }

    #[test]
    fn group_shared_by_changed_overlays_fires_once_per_pass() {
        let seen: Seen = Arc::default();
        let mut fx = Fixture::new();
        fx.groups.insert("g".into(), ids(&["a", "b"])).unwrap();
        fx.group_listeners.push("g", EventKind::Show, recorder(&seen, "g"));

        let mut aggregator = Aggregator::new();
        let ctx = fx.ctx();
        aggregator.dispatch(&ctx, EventPool::Changed, Some(&EventKind::Show), &ids(&["a", "b"]));
        aggregator.dispatch(&ctx, EventPool::Changed, Some(&EventKind::Show), &ids(&["a"]));

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn atomic_run_keeps_dedup_across_passes() {
        let seen: Seen = Arc::default();
        let mut fx = Fixture::new();
        fx.groups.insert("g".into(), ids(&["a", "b"])).unwrap();
        fx.group_listeners.push("g", EventKind::Hide, recorder(&seen, "g"));

        let mut aggregator = Aggregator::new();
        let ctx = fx.ctx();
        aggregator.enter_atomic();
        aggregator.enter_atomic();
        aggregator.dispatch(&ctx, EventPool::Changed, Some(&EventKind::Hide), &ids(&["a"]));
        aggregator.exit_atomic();
        aggregator.dispatch(&ctx, EventPool::Changed, Some(&EventKind::Hide), &ids(&["b"]));
        assert_eq!(seen.lock().unwrap().len(), 1);

        aggregator.exit_atomic();
        assert!(!aggregator.is_atomic());
        aggregator.dispatch(&ctx, EventPool::Changed, Some(&EventKind::Hide), &ids(&["b"]));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn staged_removals_fire_after_direct_listeners_even_when_tombstoned() {
        let seen: Seen = Arc::default();
        let fx = Fixture::new();
        let removal = recorder(&seen, "rm");
        removal.tombstone();

        let mut aggregator = Aggregator::new();
        aggregator.staging_mut().stage_overlay("p", vec![removal]);
        let group_handle = recorder(&seen, "rmg");
        assert!(aggregator.staging_mut().stage_group("g", &[group_handle.clone()]));
        assert!(!aggregator.staging_mut().stage_group("g", &[group_handle]));

        let fan_out = aggregator.dispatch(&fx.ctx(), EventPool::None, None, &[]);
        assert_eq!(fan_out.removals, 2);
        assert!(aggregator.staging_mut().is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["rm:p", "rmg:g"]);
    }

    #[test]
    fn tombstoned_direct_listeners_are_skipped() {
        let seen: Seen = Arc::default();
        let mut fx = Fixture::new();
        let handle = recorder(&seen, "m");
        fx.listeners.push(MAP_SUBJECT, EventKind::Add, handle.clone());
        handle.tombstone();

        let mut aggregator = Aggregator::new();
        let fan_out = aggregator.dispatch(&fx.ctx(), EventPool::MapOnly, Some(&EventKind::Add), &[]);
        assert_eq!(fan_out.total(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn discarded_staging_never_fires() {
        let seen: Seen = Arc::default();
        let fx = Fixture::new();
        let mut aggregator = Aggregator::new();
        aggregator.staging_mut().stage_overlay("p", vec![recorder(&seen, "rm")]);

        aggregator.discard_staged();
        aggregator.dispatch(&fx.ctx(), EventPool::None, None, &[]);
        assert!(seen.lock().unwrap().is_empty());
    }
}
