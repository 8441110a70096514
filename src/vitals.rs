//! Web vitals rating and analytics events

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Analytics category for every vitals event
pub const EVENT_CATEGORY: &str = "Web Vitals";

/// Core web vitals with published thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Metric {
    Lcp,
    Fid,
    Cls,
    Fcp,
    Ttfb,
    Inp,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Lcp,
        Metric::Fid,
        Metric::Cls,
        Metric::Fcp,
        Metric::Ttfb,
        Metric::Inp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Lcp => "LCP",
            Metric::Fid => "FID",
            Metric::Cls => "CLS",
            Metric::Fcp => "FCP",
            Metric::Ttfb => "TTFB",
            Metric::Inp => "INP",
        }
    }

    /// Upper bounds for (good, needs-improvement)
    pub fn thresholds(&self) -> (f64, f64) {
        match self {
            Metric::Lcp => (2500.0, 4000.0),
            Metric::Fid => (100.0, 300.0),
            Metric::Cls => (0.1, 0.25),
            Metric::Fcp => (1800.0, 3000.0),
            Metric::Ttfb => (800.0, 1800.0),
            Metric::Inp => (200.0, 500.0),
        }
    }

    pub fn rate(&self, value: f64) -> Rating {
        let (good, needs_improvement) = self.thresholds();
        if value <= good {
            Rating::Good
        } else if value <= needs_improvement {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown metric: {}", s))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rating::Good => "good",
            Rating::NeedsImprovement => "needs-improvement",
            Rating::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Rate a sample by metric name. Metrics without thresholds rate good.
pub fn rate(name: &str, value: f64) -> Rating {
    name.parse::<Metric>()
        .map(|m| m.rate(value))
        .unwrap_or(Rating::Good)
}

/// Human-readable value: CLS is unitless, everything else milliseconds
pub fn format_value(name: &str, value: f64) -> String {
    if name == Metric::Cls.name() {
        format!("{:.3}", value)
    } else {
        format!("{}ms", value.round())
    }
}

/// Event sent to the analytics collector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalsEvent {
    pub name: String,
    pub event_category: &'static str,
    /// Metric instance id
    pub event_label: String,
    pub value: i64,
    pub metric_rating: Rating,
    pub non_interaction: bool,
}

impl VitalsEvent {
    pub fn new(name: &str, id: &str, value: f64) -> Self {
        let scaled = if name == Metric::Cls.name() {
            value * 1000.0
        } else {
            value
        };

        Self {
            name: name.to_string(),
            event_category: EVENT_CATEGORY,
            event_label: id.to_string(),
            value: scaled.round() as i64,
            metric_rating: rate(name, value),
            non_interaction: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundaries_are_inclusive() {
        assert_eq!(rate("LCP", 2500.0), Rating::Good);
        assert_eq!(rate("LCP", 2500.1), Rating::NeedsImprovement);
        assert_eq!(rate("LCP", 4000.0), Rating::NeedsImprovement);
        assert_eq!(rate("LCP", 4000.1), Rating::Poor);
    }

    #[test]
    fn test_every_metric_rates() {
        assert_eq!(rate("FID", 301.0), Rating::Poor);
        assert_eq!(rate("CLS", 0.05), Rating::Good);
        assert_eq!(rate("CLS", 0.2), Rating::NeedsImprovement);
        assert_eq!(rate("FCP", 1800.0), Rating::Good);
        assert_eq!(rate("TTFB", 900.0), Rating::NeedsImprovement);
        assert_eq!(rate("INP", 600.0), Rating::Poor);
    }

    #[test]
    fn test_unknown_metric_is_good() {
        assert_eq!(rate("FOO", 1_000_000.0), Rating::Good);
        assert_eq!(rate("lcp", 99_999.0), Rating::Good);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value("LCP", 2431.6), "2432ms");
        assert_eq!(format_value("CLS", 0.12345), "0.123");
    }

    #[test]
    fn test_event_scales_cls() {
        let event = VitalsEvent::new("CLS", "v3-123", 0.1234);
        assert_eq!(event.value, 123);
        assert_eq!(event.metric_rating, Rating::NeedsImprovement);

        let event = VitalsEvent::new("LCP", "v3-456", 1999.5);
        assert_eq!(event.value, 2000);
        assert_eq!(event.metric_rating, Rating::Good);
    }

    #[test]
    fn test_event_json() {
        let event = VitalsEvent::new("INP", "v3-1", 250.0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_category"], "Web Vitals");
        assert_eq!(json["event_label"], "v3-1");
        assert_eq!(json["metric_rating"], "needs-improvement");
        assert_eq!(json["non_interaction"], true);
        assert_eq!(json["value"], 250);
    }
}
