use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Half-away-from-zero rounding to 2 decimals, applied to totals and GPAs
/// before they are compared against thresholds or stored.
pub fn round_off_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

/// One row of the letter-grade table. A total maps to the band with the
/// highest `min_total` that does not exceed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBand {
    pub letter: String,
    pub min_total: f64,
    pub points: f64,
}

impl GradeBand {
    pub fn new(letter: &str, min_total: f64, points: f64) -> Self {
        Self {
            letter: letter.to_string(),
            min_total,
            points,
        }
    }
}

pub const DEFAULT_CA_MAX: f64 = 30.0;
pub const DEFAULT_EXAM_MAX: f64 = 70.0;
pub const DEFAULT_PASS_MARK: f64 = 55.0;

pub fn default_bands() -> Vec<GradeBand> {
    vec![
        GradeBand::new("A", 75.0, 4.0),
        GradeBand::new("B+", 70.0, 3.3),
        GradeBand::new("B", 65.0, 3.0),
        GradeBand::new("C+", 60.0, 2.3),
        GradeBand::new("C", 55.0, 2.0),
        GradeBand::new("D", 45.0, 1.0),
        GradeBand::new("F", 0.0, 0.0),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub ca_marks: f64,
    pub exam_marks: f64,
    pub total: f64,
    pub letter: String,
    pub points: f64,
    pub passed: bool,
}

/// Validated grading rules: mark maxima, pass mark and the band table
/// (kept sorted by descending `min_total`).
#[derive(Debug, Clone)]
pub struct GradeScale {
    ca_max: f64,
    exam_max: f64,
    pass_mark: f64,
    bands: Vec<GradeBand>,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            ca_max: DEFAULT_CA_MAX,
            exam_max: DEFAULT_EXAM_MAX,
            pass_mark: DEFAULT_PASS_MARK,
            bands: default_bands(),
        }
    }
}

impl GradeScale {
    pub fn new(
        ca_max: f64,
        exam_max: f64,
        pass_mark: f64,
        bands: Vec<GradeBand>,
    ) -> Result<Self, CalcError> {
        if !(ca_max.is_finite() && ca_max > 0.0) {
            return Err(CalcError::new("bad_scale", "ca_max must be a positive number"));
        }
        if !(exam_max.is_finite() && exam_max > 0.0) {
            return Err(CalcError::new(
                "bad_scale",
                "exam_max must be a positive number",
            ));
        }
        let max_total = ca_max + exam_max;
        if !(pass_mark.is_finite() && (0.0..=max_total).contains(&pass_mark)) {
            return Err(CalcError::new(
                "bad_scale",
                format!("pass_mark must be between 0 and {}", max_total),
            ));
        }
        if bands.is_empty() {
            return Err(CalcError::new("bad_scale", "at least one grade band is required"));
        }

        let mut seen: Vec<String> = Vec::with_capacity(bands.len());
        for b in &bands {
            let letter = b.letter.trim();
            if letter.is_empty() {
                return Err(CalcError::new("bad_scale", "grade letters must not be empty"));
            }
            if !(b.min_total.is_finite() && b.min_total >= 0.0) {
                return Err(CalcError::new(
                    "bad_scale",
                    format!("band {} has an invalid min_total", letter),
                ));
            }
            if !(b.points.is_finite() && b.points >= 0.0) {
                return Err(CalcError::new(
                    "bad_scale",
                    format!("band {} has invalid points", letter),
                ));
            }
            let key = letter.to_ascii_uppercase();
            if seen.contains(&key) {
                return Err(CalcError::new(
                    "bad_scale",
                    format!("duplicate grade letter {}", letter),
                ));
            }
            seen.push(key);
        }

        let mut bands: Vec<GradeBand> = bands
            .into_iter()
            .map(|b| GradeBand {
                letter: b.letter.trim().to_string(),
                ..b
            })
            .collect();
        bands.sort_by(|a, b| {
            b.min_total
                .partial_cmp(&a.min_total)
                .unwrap_or(Ordering::Equal)
        });
        if bands.windows(2).any(|w| w[0].min_total == w[1].min_total) {
            return Err(CalcError::new(
                "bad_scale",
                "grade bands must have distinct thresholds",
            ));
        }
        if bands.last().map(|b| b.min_total) != Some(0.0) {
            return Err(CalcError::new(
                "bad_scale",
                "the lowest grade band must start at 0",
            ));
        }

        Ok(Self {
            ca_max,
            exam_max,
            pass_mark,
            bands,
        })
    }

    pub fn ca_max(&self) -> f64 {
        self.ca_max
    }

    pub fn exam_max(&self) -> f64 {
        self.exam_max
    }

    pub fn pass_mark(&self) -> f64 {
        self.pass_mark
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    pub fn validate_marks(&self, ca_marks: f64, exam_marks: f64) -> Result<(), CalcError> {
        if !ca_marks.is_finite() || ca_marks < 0.0 || ca_marks > self.ca_max {
            return Err(CalcError::new(
                "bad_params",
                format!("caMarks must be between 0 and {}", self.ca_max),
            )
            .with_details(serde_json::json!({ "caMarks": ca_marks })));
        }
        if !exam_marks.is_finite() || exam_marks < 0.0 || exam_marks > self.exam_max {
            return Err(CalcError::new(
                "bad_params",
                format!("examMarks must be between 0 and {}", self.exam_max),
            )
            .with_details(serde_json::json!({ "examMarks": exam_marks })));
        }
        Ok(())
    }

    pub fn total(&self, ca_marks: f64, exam_marks: f64) -> Result<f64, CalcError> {
        self.validate_marks(ca_marks, exam_marks)?;
        Ok(round_off_2_decimals(ca_marks + exam_marks))
    }

    /// Band for an already computed total. Totals below every threshold
    /// (only possible for negative input) fall into the lowest band.
    pub fn band_for(&self, total: f64) -> &GradeBand {
        self.bands
            .iter()
            .find(|b| total >= b.min_total)
            .unwrap_or_else(|| &self.bands[self.bands.len() - 1])
    }

    pub fn grade(&self, ca_marks: f64, exam_marks: f64) -> Result<GradeOutcome, CalcError> {
        let total = self.total(ca_marks, exam_marks)?;
        let band = self.band_for(total);
        Ok(GradeOutcome {
            ca_marks,
            exam_marks,
            total,
            letter: band.letter.clone(),
            points: band.points,
            passed: total >= self.pass_mark,
        })
    }
}

/// Grade points of one course result together with the course credits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditedGrade {
    pub points: f64,
    pub credits: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaSummary {
    pub gpa: f64,
    pub courses_counted: usize,
    pub credits_attempted: f64,
    pub credits_earned: f64,
}

pub fn gpa_summary<I>(grades: I) -> GpaSummary
where
    I: IntoIterator<Item = CreditedGrade>,
{
    let mut weighted: f64 = 0.0;
    let mut attempted: f64 = 0.0;
    let mut earned: f64 = 0.0;
    let mut count: usize = 0;

    for g in grades {
        // Zero-credit courses carry no weight.
        if !(g.credits.is_finite() && g.credits > 0.0) {
            continue;
        }
        count += 1;
        attempted += g.credits;
        weighted += g.points * g.credits;
        if g.passed {
            earned += g.credits;
        }
    }

    let gpa = if attempted > 0.0 {
        round_off_2_decimals(weighted / attempted)
    } else {
        0.0
    };

    GpaSummary {
        gpa,
        courses_counted: count,
        credits_attempted: attempted,
        credits_earned: earned,
    }
}
