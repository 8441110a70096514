//! Visibility detection
//!
//! Tracks whether one element intersects its root (the viewport by default),
//! remembering whether it has ever been visible.

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::{Error, Result};

/// Layout element identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// Axis-aligned rectangle in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Overlap with another rect; edge-adjacent rects count as intersecting
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right >= x && bottom >= y {
            Some(Rect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Grow (or shrink, for negative margins) each side
    fn expand(&self, margin: &RootMargin) -> Rect {
        let top = margin.top.resolve(self.height);
        let right = margin.right.resolve(self.width);
        let bottom = margin.bottom.resolve(self.height);
        let left = margin.left.resolve(self.width);

        Rect::new(
            self.x - left,
            self.y - top,
            (self.width + left + right).max(0.0),
            (self.height + top + bottom).max(0.0),
        )
    }
}

/// Current geometry: the viewport plus every element's box
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub root: Rect,
    pub elements: HashMap<ElementId, Rect>,
}

impl Layout {
    pub fn new(root: Rect) -> Self {
        Self {
            root,
            elements: HashMap::new(),
        }
    }

    pub fn with_element(mut self, id: ElementId, rect: Rect) -> Self {
        self.elements.insert(id, rect);
        self
    }
}

/// One observation delivered by an observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub target: ElementId,
    pub is_intersecting: bool,
    pub intersection_ratio: f32,
}

/// Platform intersection observer
pub trait IntersectionObserver {
    fn observe(&mut self, target: ElementId);
    fn unobserve(&mut self, target: ElementId);
    fn disconnect(&mut self);
    /// Entries produced since the last call, given the current layout
    fn take_entries(&mut self, layout: &Layout) -> Vec<IntersectionEntry>;
}

/// Options shared with the platform observer
#[derive(Debug, Clone)]
pub struct ObserverOptions {
    pub threshold: Vec<f32>,
    /// Root element; `None` means the viewport
    pub root: Option<ElementId>,
    pub root_margin: String,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            threshold: vec![0.0],
            root: None,
            root_margin: "0px".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Length {
    Px(f32),
    Percent(f32),
}

impl Length {
    fn parse(s: &str) -> Option<Self> {
        if let Some(px) = s.strip_suffix("px") {
            px.parse().ok().map(Length::Px)
        } else if let Some(pct) = s.strip_suffix('%') {
            pct.parse().ok().map(Length::Percent)
        } else if s == "0" {
            Some(Length::Px(0.0))
        } else {
            None
        }
    }

    fn resolve(&self, basis: f32) -> f32 {
        match self {
            Length::Px(px) => *px,
            Length::Percent(pct) => basis * pct / 100.0,
        }
    }
}

/// Parsed CSS margin shorthand
#[derive(Debug, Clone, Copy, PartialEq)]
struct RootMargin {
    top: Length,
    right: Length,
    bottom: Length,
    left: Length,
}

impl RootMargin {
    fn parse(s: &str) -> Result<Self> {
        let parts = s
            .split_whitespace()
            .map(|part| {
                Length::parse(part)
                    .ok_or_else(|| Error::Other(format!("invalid root margin length: {}", part)))
            })
            .collect::<Result<Vec<_>>>()?;

        let (top, right, bottom, left) = match parts.as_slice() {
            [all] => (*all, *all, *all, *all),
            [vertical, horizontal] => (*vertical, *horizontal, *vertical, *horizontal),
            [top, horizontal, bottom] => (*top, *horizontal, *bottom, *horizontal),
            [top, right, bottom, left] => (*top, *right, *bottom, *left),
            _ => return Err(Error::Other(format!("invalid root margin: {:?}", s))),
        };

        Ok(Self {
            top,
            right,
            bottom,
            left,
        })
    }
}

/// Geometric observer over a `Layout`.
///
/// Reports an entry on first observation and whenever the target crosses a
/// threshold or starts/stops intersecting.
#[derive(Debug)]
pub struct ViewportObserver {
    options: ObserverOptions,
    margin: RootMargin,
    /// Last (is_intersecting, thresholds reached) per target
    observed: HashMap<ElementId, Option<(bool, usize)>>,
}

impl ViewportObserver {
    pub fn new(options: ObserverOptions) -> Result<Self> {
        let margin = RootMargin::parse(&options.root_margin)?;
        Ok(Self {
            options,
            margin,
            observed: HashMap::new(),
        })
    }

    fn root_rect(&self, layout: &Layout) -> Option<Rect> {
        match self.options.root {
            Some(id) => layout.elements.get(&id).copied(),
            None => Some(layout.root),
        }
    }

    fn thresholds_reached(&self, ratio: f32, is_intersecting: bool) -> usize {
        self.options
            .threshold
            .iter()
            .filter(|&&t| is_intersecting && ratio >= t)
            .count()
    }
}

impl IntersectionObserver for ViewportObserver {
    fn observe(&mut self, target: ElementId) {
        self.observed.entry(target).or_insert(None);
    }

    fn unobserve(&mut self, target: ElementId) {
        self.observed.remove(&target);
    }

    fn disconnect(&mut self) {
        self.observed.clear();
    }

    fn take_entries(&mut self, layout: &Layout) -> Vec<IntersectionEntry> {
        let Some(root) = self.root_rect(layout) else {
            return Vec::new();
        };
        let root = root.expand(&self.margin);

        let targets: Vec<ElementId> = self.observed.keys().copied().collect();
        let mut entries = Vec::new();

        for target in targets {
            let Some(rect) = layout.elements.get(&target) else {
                continue;
            };

            let intersection = rect.intersect(&root);
            let is_intersecting = intersection.is_some();
            let ratio = match intersection {
                Some(_) if rect.area() == 0.0 => 1.0,
                Some(overlap) => (overlap.area() / rect.area()).clamp(0.0, 1.0),
                None => 0.0,
            };
            let reached = self.thresholds_reached(ratio, is_intersecting);

            let last = self.observed.get(&target).copied().flatten();
            if last != Some((is_intersecting, reached)) {
                self.observed.insert(target, Some((is_intersecting, reached)));
                entries.push(IntersectionEntry {
                    target,
                    is_intersecting,
                    intersection_ratio: ratio,
                });
            }
        }

        entries
    }
}

/// Detector configuration
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub observer: ObserverOptions,
    /// Stop observing after the first intersection
    pub trigger_once: bool,
    /// Never re-attach once the element has been visible
    pub freeze_once_visible: bool,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            observer: ObserverOptions::default(),
            trigger_once: true,
            freeze_once_visible: false,
        }
    }
}

/// Observable detector state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisibilityState {
    pub is_intersecting: bool,
    pub intersection_ratio: f32,
    pub has_intersected: bool,
}

impl VisibilityState {
    fn visible() -> Self {
        Self {
            is_intersecting: true,
            intersection_ratio: 1.0,
            has_intersected: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&VisibilityState)>;

/// Visibility detector for one element at a time
pub struct VisibilityDetector {
    options: DetectorOptions,
    /// `None` when the platform has no observer; the detector then fails open
    observer: Option<Box<dyn IntersectionObserver>>,
    target: Option<ElementId>,
    observing: bool,
    state: VisibilityState,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl VisibilityDetector {
    pub fn new(options: DetectorOptions, observer: Option<Box<dyn IntersectionObserver>>) -> Self {
        Self {
            options,
            observer,
            target: None,
            observing: false,
            state: VisibilityState::default(),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Detector backed by a `ViewportObserver`.
    ///
    /// An unparseable root margin leaves it without an observer, so it reports visible.
    pub fn viewport(options: DetectorOptions) -> Self {
        let observer = match ViewportObserver::new(options.observer.clone()) {
            Ok(observer) => Some(Box::new(observer) as Box<dyn IntersectionObserver>),
            Err(e) => {
                warn!("Intersection observer unavailable: {}", e);
                None
            }
        };
        Self::new(options, observer)
    }

    pub fn snapshot(&self) -> VisibilityState {
        self.state
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    fn frozen(&self) -> bool {
        self.options.freeze_once_visible && self.state.has_intersected
    }

    /// Observe `target`, replacing any previous observation
    pub fn attach(&mut self, target: ElementId) {
        self.teardown();
        self.target = Some(target);

        if self.frozen() {
            return;
        }

        match self.observer.as_mut() {
            Some(observer) => {
                observer.observe(target);
                self.observing = true;
            }
            None => {
                debug!("No intersection observer; treating {:?} as visible", target);
                self.state = VisibilityState::visible();
                self.notify();
            }
        }
    }

    /// Stop observing; the owning scope is going away
    pub fn detach(&mut self) {
        self.teardown();
        self.target = None;
    }

    /// Apply one observation. Ignored when nothing is being observed.
    pub fn on_entry(&mut self, entry: IntersectionEntry) {
        if !self.observing || self.target != Some(entry.target) {
            return;
        }

        self.state.is_intersecting = entry.is_intersecting;
        self.state.intersection_ratio = entry.intersection_ratio;

        if entry.is_intersecting {
            self.state.has_intersected = true;

            if self.options.trigger_once
                && let Some(observer) = self.observer.as_mut()
            {
                observer.unobserve(entry.target);
                self.observing = false;
            }
            if self.options.freeze_once_visible {
                self.teardown();
            }
        }

        self.notify();
    }

    /// Pull pending entries from the observer for the given layout
    pub fn refresh(&mut self, layout: &Layout) {
        if !self.observing {
            return;
        }
        let entries = match self.observer.as_mut() {
            Some(observer) => observer.take_entries(layout),
            None => return,
        };
        for entry in entries {
            self.on_entry(entry);
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&VisibilityState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn notify(&mut self) {
        let state = self.state;
        for (_, callback) in &mut self.subscribers {
            callback(&state);
        }
    }

    fn teardown(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer.disconnect();
        }
        self.observing = false;
    }
}
