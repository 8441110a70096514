//! Visibility detection and lazily rendered sections

pub mod detector;
pub mod lazy;

pub use detector::{
    DetectorOptions, ElementId, IntersectionEntry, IntersectionObserver, Layout, ObserverOptions,
    Rect, SubscriptionId, ViewportObserver, VisibilityDetector, VisibilityState,
};
pub use lazy::{DeferredContent, LazySection, LazySectionOptions, Placeholder, SectionView, Skeleton};
