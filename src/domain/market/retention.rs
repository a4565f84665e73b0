use crate::domain::market::bar::Bar;
use std::collections::HashMap;
use std::str::FromStr;

/// Maximum confirmed-candle history length kept per bar. Appends trim the
/// stored list so it never exceeds the limit for its bar.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    limits: HashMap<Bar, usize>,
}

/// History bound for bars without an explicit entry.
const DEFAULT_MAX_LEN: usize = 100;

impl Default for RetentionPolicy {
    fn default() -> Self {
        let limits = HashMap::from([
            (Bar::OneSec, 60),
            (Bar::OneMin, 200),
            (Bar::ThreeMin, 200),
            (Bar::FiveMin, 200),
            (Bar::FifteenMin, 200),
            (Bar::ThirtyMin, 200),
            (Bar::OneHour, 200),
            (Bar::TwoHour, 200),
            (Bar::FourHour, 200),
            (Bar::OneDay, 365),
            (Bar::OneWeek, 104),
            (Bar::OneMonth, 60),
        ]);
        Self { limits }
    }
}

impl RetentionPolicy {
    /// Policy with no entries; every bar gets the default bound. Useful as a
    /// base for `with_limit` in tests.
    pub fn empty() -> Self {
        Self {
            limits: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, bar: Bar, max_len: usize) -> Self {
        self.limits.insert(bar, max_len);
        self
    }

    pub fn max_len(&self, bar: Bar) -> usize {
        self.limits.get(&bar).copied().unwrap_or(DEFAULT_MAX_LEN)
    }

    /// Lookup by raw label; unknown labels use the default bound.
    pub fn max_len_for_label(&self, label: &str) -> usize {
        Bar::from_str(label)
            .map(|bar| self.max_len(bar))
            .unwrap_or(DEFAULT_MAX_LEN)
    }
}
