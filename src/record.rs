//! One decoded time step of an environment.
//!
//! Cell format: fields separated by `.`, decimals inside a field written with
//! `,`. `12,5.3.0` is red=12.5, green=3, blue=0. A dot inside a field can't be
//! told apart from the separator, so the split always happens first.

use serde::{Deserialize, Serialize};

/// Record schema, in cell order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    EnvironmentRed,
    EnvironmentGreen,
    EnvironmentBlue,
    #[serde(rename = "averageCompatibility")]
    Compatibility,
    AverageRed,
    AverageGreen,
    AverageBlue,
    Volume,
}

pub const FIELD_COUNT: usize = 8;

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::EnvironmentRed,
        Field::EnvironmentGreen,
        Field::EnvironmentBlue,
        Field::Compatibility,
        Field::AverageRed,
        Field::AverageGreen,
        Field::AverageBlue,
        Field::Volume,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::EnvironmentRed => "environmentRed",
            Field::EnvironmentGreen => "environmentGreen",
            Field::EnvironmentBlue => "environmentBlue",
            Field::Compatibility => "averageCompatibility",
            Field::AverageRed => "averageRed",
            Field::AverageGreen => "averageGreen",
            Field::AverageBlue => "averageBlue",
            Field::Volume => "volume",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub environment_red: f64,
    pub environment_green: f64,
    pub environment_blue: f64,
    #[serde(rename = "averageCompatibility")]
    pub compatibility: f64,
    pub average_red: f64,
    pub average_green: f64,
    pub average_blue: f64,
    /// Older reports stop after the averages.
    pub volume: Option<f64>,
}

impl Record {
    /// Value of `field`; a missing volume reads as `NaN`.
    pub fn get(&self, field: Field) -> f64 {
        match field {
            Field::EnvironmentRed => self.environment_red,
            Field::EnvironmentGreen => self.environment_green,
            Field::EnvironmentBlue => self.environment_blue,
            Field::Compatibility => self.compatibility,
            Field::AverageRed => self.average_red,
            Field::AverageGreen => self.average_green,
            Field::AverageBlue => self.average_blue,
            Field::Volume => self.volume.unwrap_or(f64::NAN),
        }
    }

    /// Fields that failed to decode.
    pub fn nan_fields(&self) -> Vec<Field> {
        Field::ALL
            .iter()
            .copied()
            .filter(|f| !(*f == Field::Volume && self.volume.is_none()))
            .filter(|f| self.get(*f).is_nan())
            .collect()
    }
}

/// Decode one raw cell. Never fails: unparsable or missing fields become `NaN`.
pub fn decode(cell: &str) -> Record {
    let mut values = cell.split('.').map(|part| parse_field(&part.replacen(',', ".", 1)));
    let mut next = || values.next().unwrap_or(f64::NAN);
    let environment_red = next();
    let environment_green = next();
    let environment_blue = next();
    let compatibility = next();
    let average_red = next();
    let average_green = next();
    let average_blue = next();
    let volume = values.next();

    Record {
        environment_red,
        environment_green,
        environment_blue,
        compatibility,
        average_red,
        average_green,
        average_blue,
        volume,
    }
}

/// Read the longest numeric prefix of `input`, ignoring leading whitespace.
/// `"12abc"` reads as 12; no numeric prefix at all reads as `NaN`.
pub fn parse_field(input: &str) -> f64 {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    if s[end..].starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}
