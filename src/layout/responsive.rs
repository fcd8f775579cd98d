//! Named width breakpoints

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointName {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
    Xxl,
}

impl BreakpointName {
    /// Largest first, for lookup by width
    const DESCENDING: [BreakpointName; 6] = [
        BreakpointName::Xxl,
        BreakpointName::Xl,
        BreakpointName::Lg,
        BreakpointName::Md,
        BreakpointName::Sm,
        BreakpointName::Xs,
    ];

    /// Smallest container width (px) at which the breakpoint applies
    pub fn min_width(self) -> f64 {
        match self {
            BreakpointName::Xs => 0.0,
            BreakpointName::Sm => 576.0,
            BreakpointName::Md => 768.0,
            BreakpointName::Lg => 992.0,
            BreakpointName::Xl => 1200.0,
            BreakpointName::Xxl => 1600.0,
        }
    }

    /// The breakpoint with the largest boundary not above `width`
    pub fn for_width(width: f64) -> Self {
        Self::DESCENDING
            .into_iter()
            .find(|bp| width >= bp.min_width())
            .unwrap_or(BreakpointName::Xs)
    }
}

/// Column count per breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Breakpoints {
    pub xs: usize,
    pub sm: usize,
    pub md: usize,
    pub lg: usize,
    pub xl: usize,
    pub xxl: usize,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            xs: 1,
            sm: 1,
            md: 2,
            lg: 3,
            xl: 4,
            xxl: 4,
        }
    }
}

impl Breakpoints {
    pub fn columns(&self, name: BreakpointName) -> usize {
        let columns = match name {
            BreakpointName::Xs => self.xs,
            BreakpointName::Sm => self.sm,
            BreakpointName::Md => self.md,
            BreakpointName::Lg => self.lg,
            BreakpointName::Xl => self.xl,
            BreakpointName::Xxl => self.xxl,
        };
        columns.max(1)
    }
}
