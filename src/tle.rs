//! Two-Line Element (TLE) set parser.
//!
//! Parses standard NORAD/Space-Track TLE format (2-line and 3-line with
//! name) into [`ElementRecord`]s. Batch parsing silently skips malformed
//! blocks; an empty or truncated stream simply terminates parsing.
//!
//! # TLE Format Reference
//! ```text
//! Line 0 (optional): Satellite Name (up to 24 chars)
//! Line 1: 1 NNNNNC NNNNNAAA NNNNN.NNNNNNNN +.NNNNNNNN +NNNNN-N +NNNNN-N N NNNNN
//! Line 2: 2 NNNNN NNN.NNNN NNN.NNNN NNNNNNN NNN.NNNN NNN.NNNN NN.NNNNNNNNNNNNNN
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;
use crate::elements::ElementRecord;

/// TLE parsing errors.
#[derive(Error, Debug)]
pub enum TleError {
    #[error("line 1 must start with '1', got '{0}'")]
    InvalidLine1Start(char),

    #[error("line 2 must start with '2', got '{0}'")]
    InvalidLine2Start(char),

    #[error("line {line} shorter than 69 columns ({len})")]
    TruncatedLine { line: u8, len: usize },

    #[error("non-ASCII bytes in TLE line")]
    NotAscii,

    #[error("catalog numbers don't match between lines: {0} vs {1}")]
    CatalogMismatch(u32, u32),

    #[error("failed to parse field '{field}'")]
    ParseField { field: &'static str },

    #[error("failed to parse implied-decimal field '{0}'")]
    ImpliedDecimal(String),
}

/// A parsed Two-Line Element set, still in the wire units (degrees,
/// rev/day).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tle {
    /// Satellite name (from line 0, if present).
    pub name: Option<String>,
    /// Catalog (NORAD) number.
    pub catalog_number: u32,
    /// Classification (U=unclassified, C=classified, S=secret).
    pub classification: char,
    /// International designator (launch year, launch number, piece).
    pub intl_designator: String,
    /// Epoch year (full 4-digit year).
    pub epoch_year: u16,
    /// Epoch day of year (fractional, 1-based).
    pub epoch_day: f64,
    /// First derivative of mean motion (rev/day²) / 2.
    pub mean_motion_dot: f64,
    /// Second derivative of mean motion (rev/day³) / 6.
    pub mean_motion_ddot: f64,
    /// B* drag term (1/Earth radii).
    pub bstar: f64,
    /// Element set number.
    pub element_set: u16,
    /// Inclination (degrees).
    pub inclination_deg: f64,
    /// Right ascension of ascending node (degrees).
    pub raan_deg: f64,
    /// Eccentricity (dimensionless).
    pub eccentricity: f64,
    /// Argument of perigee (degrees).
    pub arg_perigee_deg: f64,
    /// Mean anomaly (degrees).
    pub mean_anomaly_deg: f64,
    /// Mean motion (revolutions per day).
    pub mean_motion_rev_day: f64,
    /// Revolution number at epoch.
    pub rev_number: u32,
}

impl Tle {
    /// Parse a TLE from two lines (without satellite name).
    pub fn parse(line1: &str, line2: &str) -> Result<Self, TleError> {
        Self::parse_with_name(None, line1, line2)
    }

    /// Parse a TLE from three lines (with satellite name on line 0).
    pub fn parse_3line(line0: &str, line1: &str, line2: &str) -> Result<Self, TleError> {
        let name = line0.trim().to_string();
        Self::parse_with_name(Some(name), line1, line2)
    }

    fn parse_with_name(name: Option<String>, line1: &str, line2: &str) -> Result<Self, TleError> {
        let line1 = line1.trim_end();
        let line2 = line2.trim_end();

        // Column slicing below is byte-indexed
        if !line1.is_ascii() || !line2.is_ascii() {
            return Err(TleError::NotAscii);
        }
        if line1.len() < 69 {
            return Err(TleError::TruncatedLine { line: 1, len: line1.len() });
        }
        if line2.len() < 69 {
            return Err(TleError::TruncatedLine { line: 2, len: line2.len() });
        }

        let c1 = line1.as_bytes()[0] as char;
        let c2 = line2.as_bytes()[0] as char;
        if c1 != '1' {
            return Err(TleError::InvalidLine1Start(c1));
        }
        if c2 != '2' {
            return Err(TleError::InvalidLine2Start(c2));
        }

        // ── Line 1 ──
        let catalog_1 = parse_u32(&line1[2..7], "catalog_number (line 1)")?;
        let classification = line1.as_bytes()[7] as char;
        let intl_designator = line1[9..17].trim().to_string();

        let epoch_year_2d = parse_u32(&line1[18..20], "epoch_year")? as u16;
        let epoch_year = if epoch_year_2d >= 57 {
            1900 + epoch_year_2d
        } else {
            2000 + epoch_year_2d
        };
        let epoch_day = parse_f64(&line1[20..32], "epoch_day")?;

        let mean_motion_dot = parse_f64(&line1[33..43], "mean_motion_dot")?;
        let mean_motion_ddot = parse_implied_decimal(&line1[44..52])?;
        let bstar = parse_implied_decimal(&line1[53..61])?;
        let element_set = line1[64..68].trim().parse::<u16>().unwrap_or(0);

        // ── Line 2 ──
        let catalog_2 = parse_u32(&line2[2..7], "catalog_number (line 2)")?;
        if catalog_1 != catalog_2 {
            return Err(TleError::CatalogMismatch(catalog_1, catalog_2));
        }

        let inclination_deg = parse_f64(&line2[8..16], "inclination")?;
        let raan_deg = parse_f64(&line2[17..25], "raan")?;

        // Eccentricity has an implied leading decimal point
        let ecc_str = format!("0.{}", line2[26..33].trim());
        let eccentricity = ecc_str
            .parse::<f64>()
            .map_err(|_| TleError::ParseField { field: "eccentricity" })?;

        let arg_perigee_deg = parse_f64(&line2[34..42], "arg_perigee")?;
        let mean_anomaly_deg = parse_f64(&line2[42..51], "mean_anomaly")?;
        let mean_motion_rev_day = parse_f64(&line2[52..63], "mean_motion")?;
        let rev_number = line2[63..68].trim().parse::<u32>().unwrap_or(0);

        Ok(Tle {
            name,
            catalog_number: catalog_1,
            classification,
            intl_designator,
            epoch_year,
            epoch_day,
            mean_motion_dot,
            mean_motion_ddot,
            bstar,
            element_set,
            inclination_deg,
            raan_deg,
            eccentricity,
            arg_perigee_deg,
            mean_anomaly_deg,
            mean_motion_rev_day,
            rev_number,
        })
    }

    /// Parse a string containing multiple TLEs (2-line or 3-line format).
    ///
    /// Malformed blocks are skipped; the scan simply stops at a truncated
    /// tail. Returns every block that parsed cleanly.
    pub fn parse_batch(input: &str) -> Vec<Self> {
        let lines: Vec<&str> = input
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.is_empty())
            .collect();

        let mut tles = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].starts_with('1') && i + 1 < lines.len() && lines[i + 1].starts_with('2') {
                match Tle::parse(lines[i], lines[i + 1]) {
                    Ok(tle) => tles.push(tle),
                    Err(e) => log::debug!("skipping malformed TLE block: {e}"),
                }
                i += 2;
            } else if i + 2 < lines.len()
                && lines[i + 1].starts_with('1')
                && lines[i + 2].starts_with('2')
            {
                match Tle::parse_3line(lines[i], lines[i + 1], lines[i + 2]) {
                    Ok(tle) => tles.push(tle),
                    Err(e) => log::debug!("skipping malformed TLE block: {e}"),
                }
                i += 3;
            } else {
                i += 1;
            }
        }

        tles
    }

    /// Epoch as a Julian date.
    pub fn epoch_jd(&self) -> f64 {
        julian_date_year_start(self.epoch_year as i32) + self.epoch_day - 1.0
    }

    /// Convert to an [`ElementRecord`] (radians, rad/min, Julian-date
    /// epoch). Eccentricity is capped at 0.999, the store invariant.
    pub fn to_elements(&self) -> ElementRecord {
        ElementRecord::new(
            self.catalog_number,
            self.name.clone().unwrap_or_default(),
            self.intl_designator.clone(),
            self.epoch_jd(),
            self.inclination_deg * DEG2RAD,
            self.raan_deg * DEG2RAD,
            self.eccentricity.min(0.999),
            self.arg_perigee_deg * DEG2RAD,
            self.mean_anomaly_deg * DEG2RAD,
            self.mean_motion_rev_day * TAU / MIN_PER_DAY,
            self.bstar,
        )
    }
}

impl std::fmt::Display for Tle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (catalog {}) — {:.1}° inc, {:.4} ecc, {:.2} rev/day",
            self.name.as_deref().unwrap_or("UNKNOWN"),
            self.catalog_number,
            self.inclination_deg,
            self.eccentricity,
            self.mean_motion_rev_day,
        )
    }
}

fn parse_u32(s: &str, field: &'static str) -> Result<u32, TleError> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| TleError::ParseField { field })
}

fn parse_f64(s: &str, field: &'static str) -> Result<f64, TleError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| TleError::ParseField { field })
}

/// Parse the TLE "implied decimal" format: " NNNNN-N" → float.
///
/// Examples: " 16538-4" → 0.16538e-4, "-11606-4" → -0.11606e-4
fn parse_implied_decimal(s: &str) -> Result<f64, TleError> {
    let s = s.trim();
    if s.is_empty() || s == "00000-0" || s == "00000+0" {
        return Ok(0.0);
    }

    // Find the exponent sign (last + or - that isn't the leading sign)
    let bytes = s.as_bytes();
    let mut exp_pos = None;
    for i in (1..bytes.len()).rev() {
        if bytes[i] == b'+' || bytes[i] == b'-' {
            exp_pos = Some(i);
            break;
        }
    }

    let sign = if s.starts_with('-') { "-" } else { "" };
    match exp_pos {
        Some(pos) => {
            let digits = s[..pos].trim_start_matches(['+', '-', ' ']);
            let full = format!("{}0.{}e{}", sign, digits, &s[pos..]);
            full.parse::<f64>()
                .map_err(|_| TleError::ImpliedDecimal(s.to_string()))
        }
        None => {
            let digits = s.trim_start_matches(['+', '-', ' ']);
            let full = format!("{}0.{}", sign, digits);
            full.parse::<f64>()
                .map_err(|_| TleError::ImpliedDecimal(s.to_string()))
        }
    }
}

/// Mod-10 TLE line checksum ('-' counts as 1). Kept as a diagnostic;
/// parsing does not reject on mismatch, matching operational feeds where
/// hand-edited lines are common.
pub fn compute_checksum(line: &str) -> u8 {
    let sum: u32 = line
        .bytes()
        .take(68)
        .map(|b| match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'-' => 1,
            _ => 0,
        })
        .sum();
    (sum % 10) as u8
}

/// Julian date of January 1, 00:00 UT of the given year.
fn julian_date_year_start(year: i32) -> f64 {
    let y = year as f64;
    367.0 * y - ((7.0 * y) / 4.0).floor() + (275.0 / 9.0_f64).floor() + 1.0 + 1721013.5
}
