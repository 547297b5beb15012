//! House number to offset interpolation
//!
//! Parcels along a side are assumed evenly spaced and of equal size. Numbers
//! step by 2 on single-parity sides and by 1 on mixed sides. The start number
//! sits at offset 0 and the end number at the far end of the segment.

use tracing::warn;

use super::geometry::to_offset;
use crate::item::{HouseNumbers, NumberingScheme};

/// Offset returned when a side has a single number
pub const MIDPOINT_OFFSET: u16 = 32767;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HouseNumberMatch {
    /// The requested number when in range, else the nearest end of the range
    pub closest_number: u16,
    pub side: Side,
    pub offset: u16,
}

/// Sides that may carry `number` under `scheme`
fn sides_for(scheme: NumberingScheme, number: u16) -> &'static [Side] {
    let even = number % 2 == 0;
    match scheme {
        NumberingScheme::None => &[],
        NumberingScheme::LeftEven if even => &[Side::Left],
        NumberingScheme::LeftEven => &[Side::Right],
        NumberingScheme::LeftOdd if even => &[Side::Right],
        NumberingScheme::LeftOdd => &[Side::Left],
        NumberingScheme::Mixed => &[Side::Left, Side::Right],
    }
}

fn range_of(numbers: &HouseNumbers, side: Side) -> (u16, u16) {
    match side {
        Side::Left => (numbers.left_start, numbers.left_end),
        Side::Right => (numbers.right_start, numbers.right_end),
    }
}

fn closest_in_range(start: u16, end: u16, number: u16) -> u16 {
    let (lo, hi) = (start.min(end), start.max(end));
    if number < lo {
        lo
    } else if number > hi {
        hi
    } else {
        number
    }
}

/// Finds the side and parcel of `number` and its offset along the segment.
/// `None` when the scheme has no side able to carry the number.
pub fn calculate_offset(numbers: &HouseNumbers, number: u16) -> Option<HouseNumberMatch> {
    let step: u32 = if numbers.scheme == NumberingScheme::Mixed { 1 } else { 2 };

    let (side, start, end, closest) = sides_for(numbers.scheme, number)
        .iter()
        .filter_map(|&side| {
            let (start, end) = range_of(numbers, side);
            if start == 0 && end == 0 {
                return None;
            }
            Some((side, start, end, closest_in_range(start, end, number)))
        })
        .min_by_key(|&(_, _, _, closest)| closest.abs_diff(number))?;

    let parcels = start.abs_diff(end) as u32 / step + 1;
    if parcels < 2 {
        return Some(HouseNumberMatch {
            closest_number: closest,
            side,
            offset: MIDPOINT_OFFSET,
        });
    }

    let parcel = closest.abs_diff(start) as u32 / step;
    let offset = to_offset(parcel as f64 / (parcels - 1) as f64);
    // kept as a warning, not clamped: the segment start is a list boundary
    if offset == 0 {
        warn!(number, start, end, "house number interpolated to segment start");
    }
    Some(HouseNumberMatch {
        closest_number: closest,
        side,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::geometry::MAX_OFFSET;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn left_odd_1_to_19() -> HouseNumbers {
        HouseNumbers {
            scheme: NumberingScheme::LeftOdd,
            left_start: 1,
            left_end: 19,
            right_start: 2,
            right_end: 20,
        }
    }

    #[test]
    fn left_odd_number_in_range() {
        let m = calculate_offset(&left_odd_1_to_19(), 9).unwrap();
        assert_eq!(m.closest_number, 9);
        assert_eq!(m.side, Side::Left);
        assert!(m.offset > 0 && m.offset < MAX_OFFSET);
    }

    #[test]
    fn offsets_grow_with_number() {
        let numbers = left_odd_1_to_19();
        let offsets: Vec<u16> = (1..=19)
            .step_by(2)
            .map(|n| calculate_offset(&numbers, n).unwrap().offset)
            .collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]), "{offsets:?}");
        assert_eq!(offsets[0], 0);
        assert_eq!(*offsets.last().unwrap(), MAX_OFFSET);
        // 9 is the fifth of ten parcels
        assert_eq!(offsets[4], to_offset(4.0 / 9.0));
    }

    #[test]
    fn start_number_warns_at_segment_start() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let m = tracing::subscriber::with_default(subscriber, || {
            calculate_offset(&left_odd_1_to_19(), 1).unwrap()
        });
        assert_eq!(m.offset, 0);
        assert_eq!(m.closest_number, 1);
        let output = String::from_utf8(log.0.lock().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("interpolated to segment start"), "{output}");
    }

    #[test]
    fn even_number_goes_to_right_side() {
        let m = calculate_offset(&left_odd_1_to_19(), 8).unwrap();
        assert_eq!(m.side, Side::Right);
        assert_eq!(m.closest_number, 8);
    }

    #[test]
    fn out_of_range_snaps_to_nearest_end() {
        let m = calculate_offset(&left_odd_1_to_19(), 41).unwrap();
        assert_eq!(m.closest_number, 19);
    }

    #[test]
    fn descending_range_counts_from_start() {
        let numbers = HouseNumbers {
            scheme: NumberingScheme::LeftEven,
            left_start: 40,
            left_end: 2,
            right_start: 0,
            right_end: 0,
        };
        let high = calculate_offset(&numbers, 40).unwrap().offset;
        let low = calculate_offset(&numbers, 2).unwrap().offset;
        assert!(high < low);
        assert!(calculate_offset(&numbers, 3).is_none());
    }

    #[test]
    fn single_number_side_is_midpoint() {
        let numbers = HouseNumbers {
            scheme: NumberingScheme::Mixed,
            left_start: 7,
            left_end: 7,
            right_start: 0,
            right_end: 0,
        };
        let m = calculate_offset(&numbers, 7).unwrap();
        assert_eq!(m.offset, MIDPOINT_OFFSET);
        assert!(calculate_offset(
            &HouseNumbers {
                scheme: NumberingScheme::None,
                ..numbers
            },
            7
        )
        .is_none());
    }
}
