use chrono::{Datelike, NaiveDate};

/// Month on which the academic year rolls over. Dates before July count
/// toward the previous academic year.
pub const ACADEMIC_YEAR_BOUNDARY_MONTH: u32 = 7;

/// Highest academic year a batch can be in before it counts as graduated.
pub const PROGRAMME_LENGTH_YEARS: i32 = 5;

/// Attendance percentage as an unformatted value.
///
/// Zero on either side yields 0.0. In particular `total == 0` with
/// `attended > 0` is NOT an error here; the zero check guards the
/// division and the caller gets 0.0 back. That mirrors the system this
/// replaces and is kept on purpose.
pub fn percentage_value(attended: u64, total: u64) -> f64 {
    if attended == 0 || total == 0 {
        return 0.0;
    }
    (attended as f64 / total as f64) * 100.0
}

/// Attendance percentage formatted to two decimals, e.g. `(7, 10)` -> "70.00".
pub fn percentage(attended: u64, total: u64) -> String {
    format_percent(percentage_value(attended, total))
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}", value)
}

/// Parse a batch identifier "YYYY-YYYY" into (start year, end year).
/// Both halves must be exactly four digits and the end year must come
/// after the start year.
pub fn parse_batch(batch: &str) -> Option<(i32, i32)> {
    let (start, end) = batch.split_once('-')?;
    if start.len() != 4 || end.len() != 4 {
        return None;
    }
    if !start.bytes().all(|b| b.is_ascii_digit()) || !end.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let start_year: i32 = start.parse().ok()?;
    let end_year: i32 = end.parse().ok()?;
    if end_year <= start_year {
        return None;
    }
    Some((start_year, end_year))
}

fn ordinal_suffix(n: i32) -> &'static str {
    match n % 100 {
        11..=13 => "th",
        _ => match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    }
}

/// Human-readable academic year for a batch as of `today`.
///
/// "2021-2025" evaluated in March 2023 is "2nd": March falls before the
/// July boundary, so the effective academic year is 2022 and the ordinal
/// is 2022 - 2021 + 1. Ordinals below 1 map to "Not Started", above the
/// programme length to "Graduated". A batch that does not parse yields
/// an empty label.
pub fn academic_year_label(batch: &str, today: NaiveDate) -> String {
    let Some((start_year, _)) = parse_batch(batch) else {
        return String::new();
    };
    let effective_year = if today.month() < ACADEMIC_YEAR_BOUNDARY_MONTH {
        today.year() - 1
    } else {
        today.year()
    };
    let ordinal = effective_year - start_year + 1;
    if ordinal < 1 {
        return "Not Started".to_string();
    }
    if ordinal > PROGRAMME_LENGTH_YEARS {
        return "Graduated".to_string();
    }
    format!("{}{}", ordinal, ordinal_suffix(ordinal))
}

/// True when (year, month) falls inside the inclusive range, comparing
/// year first, then month.
pub fn in_month_range(
    year: i32,
    month: u32,
    start_year: i32,
    start_month: u32,
    end_year: i32,
    end_month: u32,
) -> bool {
    (year, month) >= (start_year, start_month) && (year, month) <= (end_year, end_month)
}

/// Pooled attended/total counts for one attendance category.
///
/// Aggregation sums counts across periods and divides once at the end;
/// it never averages already-computed per-period percentages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryTally {
    pub attended: u64,
    pub total: u64,
}

impl CategoryTally {
    pub fn add(&mut self, attended: u64, total: u64) {
        self.attended += attended;
        self.total += total;
    }

    pub fn percentage_value(&self) -> f64 {
        percentage_value(self.attended, self.total)
    }
}

/// Per-student pooled tallies across the three attendance categories.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttendanceTally {
    pub theory: CategoryTally,
    pub practical: CategoryTally,
    pub clinical: CategoryTally,
}

/// Finished per-student aggregation: three category percentages plus
/// their unweighted mean, all two-decimal strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub theory_percentage: String,
    pub practical_percentage: String,
    pub clinical_percentage: String,
    pub average_percentage: String,
}

impl AttendanceTally {
    pub fn summary(&self) -> AttendanceSummary {
        let theory = self.theory.percentage_value();
        let practical = self.practical.percentage_value();
        let clinical = self.clinical.percentage_value();
        let average = (theory + practical + clinical) / 3.0;
        AttendanceSummary {
            theory_percentage: format_percent(theory),
            practical_percentage: format_percent(practical),
            clinical_percentage: format_percent(clinical),
            average_percentage: format_percent(average),
        }
    }
}

pub const THEORY70_MAX: u64 = 70;
pub const THEORY20_MAX: u64 = 20;
pub const THEORY10_MAX: u64 = 10;
pub const PRACTICAL90_MAX: u64 = 90;
pub const PRACTICAL10_MAX: u64 = 10;

/// Raw internal-assessment sub-scores for one student.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessmentScores {
    pub theory70: u64,
    pub theory20: u64,
    pub theory10: u64,
    pub practical90: u64,
    pub practical10: u64,
}

impl AssessmentScores {
    /// First sub-score over its declared maximum, as (field, value, max).
    pub fn bounds_violation(&self) -> Option<(&'static str, u64, u64)> {
        let checks = [
            ("theory70", self.theory70, THEORY70_MAX),
            ("theory20", self.theory20, THEORY20_MAX),
            ("theory10", self.theory10, THEORY10_MAX),
            ("practical90", self.practical90, PRACTICAL90_MAX),
            ("practical10", self.practical10, PRACTICAL10_MAX),
        ];
        checks.into_iter().find(|(_, value, max)| value > max)
    }

    pub fn total_theory(&self) -> u64 {
        self.theory70 + self.theory20 + self.theory10
    }

    pub fn total_practical(&self) -> u64 {
        self.practical90 + self.practical10
    }
}
