//! Windowing, stride downsampling and the record → named series pivot.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::record::{Field, Record, FIELD_COUNT};

/// Half-open index range `[start, end)`. `end: None` runs to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: i64,
    pub end: Option<i64>,
}

impl Default for Window {
    fn default() -> Self {
        Self::FULL
    }
}

impl Window {
    pub const FULL: Window = Window {
        start: 0,
        end: None,
    };

    pub fn new(start: i64, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Resolve against a sequence of `len` items. Never panics; out-of-range
    /// bounds just yield a shorter (possibly empty) range.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let start = clamp_index(self.start, len);
        let end = self.end.map_or(len, |e| clamp_index(e, len));
        (start, end.max(start))
    }
}

fn clamp_index(value: i64, len: usize) -> usize {
    if value <= 0 {
        0
    } else {
        usize::try_from(value).map_or(len, |v| v.min(len))
    }
}

pub fn window<T>(items: &[T], range: Window) -> &[T] {
    let (start, end) = range.bounds(items.len());
    &items[start..end]
}

/// Distance between kept elements when thinning `len` items to about `target`.
/// Always at least 1.
pub fn stride(len: usize, target: usize) -> usize {
    if target == 0 {
        return 1;
    }
    ((len as f64 / target as f64).round() as usize).max(1)
}

/// Keep every `stride`-th element starting at 0. The result holds roughly
/// `target` elements; `target == 0` or `target >= len` keeps everything.
pub fn downsample<T: Clone>(items: &[T], target: usize) -> Vec<T> {
    items.iter().step_by(stride(items.len(), target)).cloned().collect()
}

/// Column view of a record series: one value sequence per field, all the
/// same length, position `k` in each coming from record `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartReport {
    series: [Vec<f64>; FIELD_COUNT],
}

impl ChartReport {
    pub fn get(&self, field: Field) -> &[f64] {
        &self.series[field.index()]
    }

    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &[f64])> + '_ {
        Field::ALL.iter().map(move |f| (*f, self.get(*f)))
    }
}

impl Serialize for ChartReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for (field, values) in self.iter() {
            map.serialize_entry(field.label(), values)?;
        }
        map.end()
    }
}

/// Pivot records into per-field series. `NaN` values pass through untouched.
pub fn aggregate(records: &[Record]) -> ChartReport {
    let mut series: [Vec<f64>; FIELD_COUNT] =
        std::array::from_fn(|_| Vec::with_capacity(records.len()));
    for record in records {
        for field in Field::ALL {
            series[field.index()].push(record.get(field));
        }
    }
    ChartReport { series }
}
