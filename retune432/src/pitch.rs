//! 440 Hz -> 432 Hz filter chain.
//!
//! Three stages, applied in order:
//! 1. `asetrate` reinterprets the samples at `rate × 432/440` (pitch and speed both drop)
//! 2. `atempo` speeds back up by `440/432` (duration restored, pitch untouched)
//! 3. `aresample` to the fixed output rate (neither pitch nor duration change)
//!
//! Scale factors are kept as exact rationals so the chain's net effect can be
//! checked without floating point noise.

use std::fmt;
use std::ops::Mul;

pub const SOURCE_TUNING_HZ: u64 = 440;
pub const TARGET_TUNING_HZ: u64 = 432;

/// Every output is resampled to this rate.
pub const TARGET_SAMPLE_RATE_HZ: u32 = 48_000;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Positive rational number, always stored reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    num: u64,
    den: u64,
}

impl Ratio {
    /// `None` for a zero numerator or denominator.
    pub fn new(num: u64, den: u64) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self::reduced(num, den))
    }

    fn reduced(num: u64, den: u64) -> Self {
        let g = gcd(num, den);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    pub const ONE: Ratio = Ratio { num: 1, den: 1 };

    pub fn numer(&self) -> u64 {
        self.num
    }

    pub fn denom(&self) -> u64 {
        self.den
    }

    pub fn recip(self) -> Self {
        Self {
            num: self.den,
            den: self.num,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Mul for Ratio {
    type Output = Ratio;

    fn mul(self, rhs: Ratio) -> Ratio {
        // Cross-reduce first so intermediate products stay small.
        let g1 = gcd(self.num, rhs.den);
        let g2 = gcd(rhs.num, self.den);
        Ratio {
            num: (self.num / g1) * (rhs.num / g2),
            den: (self.den / g2) * (rhs.den / g1),
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 432/440 reduced, i.e. 27/55.
pub fn pitch_ratio() -> Ratio {
    Ratio::reduced(TARGET_TUNING_HZ, SOURCE_TUNING_HZ)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStage {
    /// Reinterpret the stream at `source_rate × factor`.
    SetRate { source_rate: u32, factor: Ratio },
    /// Speed up by `factor` without changing pitch.
    Tempo(Ratio),
    Resample(u32),
}

impl FilterStage {
    /// Multiplier applied to playback duration.
    pub fn duration_scale(&self) -> Ratio {
        match self {
            FilterStage::SetRate { factor, .. } => factor.recip(),
            FilterStage::Tempo(factor) => factor.recip(),
            FilterStage::Resample(_) => Ratio::ONE,
        }
    }

    /// Multiplier applied to every frequency in the signal.
    pub fn pitch_scale(&self) -> Ratio {
        match self {
            FilterStage::SetRate { factor, .. } => *factor,
            FilterStage::Tempo(_) | FilterStage::Resample(_) => Ratio::ONE,
        }
    }

    fn to_ffmpeg(&self) -> String {
        match self {
            FilterStage::SetRate {
                source_rate,
                factor,
            } => format!("asetrate={}*{}", source_rate, factor.as_f64()),
            FilterStage::Tempo(factor) => format!("atempo={}", factor.as_f64()),
            FilterStage::Resample(rate) => format!("aresample={}", rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    pub fn net_duration_scale(&self) -> Ratio {
        self.stages
            .iter()
            .fold(Ratio::ONE, |acc, s| acc * s.duration_scale())
    }

    pub fn net_pitch_scale(&self) -> Ratio {
        self.stages
            .iter()
            .fold(Ratio::ONE, |acc, s| acc * s.pitch_scale())
    }

    /// Comma-joined filtergraph for `-af` / `-filter:a`.
    pub fn to_ffmpeg_filter(&self) -> String {
        self.stages
            .iter()
            .map(FilterStage::to_ffmpeg)
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub fn retune_chain(source_rate: u32, target_rate: u32) -> FilterChain {
    let ratio = pitch_ratio();
    FilterChain {
        stages: vec![
            FilterStage::SetRate {
                source_rate,
                factor: ratio,
            },
            FilterStage::Tempo(ratio.recip()),
            FilterStage::Resample(target_rate),
        ],
    }
}
