// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use core::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::error::Outcome;

/// Per-session masking counters. `failed` is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub all: u64,
    pub success: u64,
    pub problematic: u64,
}

impl Stats {
    pub fn failed(&self) -> u64 {
        self.all - self.success - self.problematic
    }

    pub fn record<T>(&mut self, outcome: &Outcome<T>) {
        self.all += 1;
        match outcome {
            Outcome::Masked(_) => self.success += 1,
            Outcome::Problematic { .. } => self.problematic += 1,
            Outcome::Failed { .. } => (),
        }
    }
}

impl Add for Stats {
    type Output = Stats;

    fn add(self, rhs: Stats) -> Stats {
        Stats {
            all: self.all + rhs.all,
            success: self.success + rhs.success,
            problematic: self.problematic + rhs.problematic,
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Stats) {
        *self = *self + rhs;
    }
}

impl core::iter::Sum for Stats {
    fn sum<I: Iterator<Item = Stats>>(iter: I) -> Stats {
        iter.fold(Stats::default(), |a, b| a + b)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "All: {}, Success: {}, Problematic: {}, Failed: {}",
            self.all,
            self.success,
            self.problematic,
            self.failed()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MaskError;

    #[test]
    fn record_and_merge() {
        let mut a = Stats::default();
        a.record(&Outcome::Masked(()));
        a.record(&Outcome::Problematic {
            output: (),
            errors: vec![MaskError::Cast("x".into())],
        });
        a.record(&Outcome::Failed {
            fallback: (),
            error: MaskError::Parse("x".into()),
        });
        assert_eq!(a.failed(), 1);

        let b = Stats {
            all: 2,
            success: 2,
            problematic: 0,
        };
        let total: Stats = [a, b].into_iter().sum();
        assert_eq!(total, b + a);
        assert_eq!(
            total.to_string(),
            "All: 5, Success: 3, Problematic: 1, Failed: 1"
        );
    }
}
