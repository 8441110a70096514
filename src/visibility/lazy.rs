//! Lazily rendered page sections
//!
//! A section shows a placeholder until it first comes near the viewport,
//! then renders its content and never goes back.

use super::detector::{
    DetectorOptions, ElementId, IntersectionObserver, Layout, ObserverOptions, VisibilityDetector,
};

/// Number of card blocks in the default skeleton
const SKELETON_CARDS: usize = 3;

/// Content that may still be loading after the section became visible
pub trait DeferredContent {
    fn is_ready(&self) -> bool {
        true
    }
}

/// Default loading skeleton
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skeleton {
    pub min_height: String,
    pub cards: usize,
    /// Pulsing animation
    pub animated: bool,
    /// Hidden from assistive technology
    pub aria_hidden: bool,
}

impl Skeleton {
    pub fn new(min_height: impl Into<String>) -> Self {
        Self {
            min_height: min_height.into(),
            cards: SKELETON_CARDS,
            animated: true,
            aria_hidden: true,
        }
    }
}

/// What is shown while content is unavailable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Skeleton(Skeleton),
    /// Caller-supplied fallback markup
    Custom(String),
}

#[derive(Debug, Clone)]
pub struct LazySectionOptions {
    pub class_name: String,
    pub fallback: Option<String>,
    /// Start loading this far before the section scrolls into view
    pub root_margin: String,
    pub threshold: f32,
    pub min_height: String,
}

impl Default for LazySectionOptions {
    fn default() -> Self {
        Self {
            class_name: String::new(),
            fallback: None,
            root_margin: "200px 0px".to_string(),
            threshold: 0.0,
            min_height: "400px".to_string(),
        }
    }
}

impl LazySectionOptions {
    fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            observer: ObserverOptions {
                threshold: vec![self.threshold],
                root: None,
                root_margin: self.root_margin.clone(),
            },
            trigger_once: true,
            freeze_once_visible: true,
        }
    }

    fn placeholder(&self) -> Placeholder {
        match &self.fallback {
            Some(fallback) => Placeholder::Custom(fallback.clone()),
            None => Placeholder::Skeleton(Skeleton::new(self.min_height.clone())),
        }
    }
}

/// What a section renders right now
#[derive(Debug, PartialEq)]
pub enum SectionView<'a, C> {
    /// Not yet near the viewport
    Placeholder(&'a Placeholder),
    /// Visible, content still loading
    Suspended(&'a Placeholder),
    Content(&'a C),
}

/// A below-the-fold section rendered on first approach
pub struct LazySection<C> {
    content: C,
    class_name: String,
    placeholder: Placeholder,
    detector: VisibilityDetector,
    shown: bool,
}

impl<C: DeferredContent> LazySection<C> {
    /// Mount a section observed against the viewport
    pub fn new(element: ElementId, content: C, options: LazySectionOptions) -> Self {
        let detector = VisibilityDetector::viewport(options.detector_options());
        Self::mount(element, content, &options, detector)
    }

    /// Mount with a specific observer (`None` when the platform has none)
    pub fn with_observer(
        element: ElementId,
        content: C,
        options: LazySectionOptions,
        observer: Option<Box<dyn IntersectionObserver>>,
    ) -> Self {
        let detector = VisibilityDetector::new(options.detector_options(), observer);
        Self::mount(element, content, &options, detector)
    }

    fn mount(
        element: ElementId,
        content: C,
        options: &LazySectionOptions,
        mut detector: VisibilityDetector,
    ) -> Self {
        detector.attach(element);
        Self {
            content,
            class_name: options.class_name.clone(),
            placeholder: options.placeholder(),
            detector,
            shown: false,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Re-evaluate visibility against the current layout
    pub fn refresh(&mut self, layout: &Layout) {
        self.detector.refresh(layout);
    }

    pub fn has_intersected(&self) -> bool {
        self.detector.snapshot().has_intersected
    }

    pub fn view(&mut self) -> SectionView<'_, C> {
        if !self.shown {
            if !self.has_intersected() {
                return SectionView::Placeholder(&self.placeholder);
            }
            if !self.content.is_ready() {
                return SectionView::Suspended(&self.placeholder);
            }
            self.shown = true;
        }
        SectionView::Content(&self.content)
    }

    /// Tear down observation
    pub fn unmount(&mut self) {
        self.detector.detach();
    }
}
