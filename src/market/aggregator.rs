use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::{
    engine::{Candle, CandleBuilder, PricePoint},
    errors::{Error, Result},
};

/// Builds contiguous fixed-width bars from unordered price points.
///
/// Bars are aligned on multiples of `width` from midnight UTC of the first
/// point's day. Windows without samples become flat bars at the previous
/// close so the series has no gaps. Every bar except the last one is sealed.
///
/// ### Arguments
/// * `points` - ticks or trades, in any order.
/// * `width` - bar width, between 1 second and 24 hours.
pub fn aggregate<P: PricePoint>(points: &[P], width: Duration) -> Result<Vec<Candle>> {
    if width < Duration::seconds(1) || width > Duration::hours(24) {
        return Err(Error::InvalidWidth(width.num_seconds()));
    }

    let mut sorted = points.iter().collect::<Vec<_>>();
    sorted.sort_by_key(|p| p.time());
    let Some(first) = sorted.first() else {
        return Ok(Vec::new());
    };

    let day_start = first.time().date_naive().and_time(NaiveTime::MIN).and_utc();
    let open_time = day_start + width * ((first.time() - day_start).num_milliseconds() / width.num_milliseconds()) as i32;

    let mut candles = Vec::new();
    let mut current = Candle::flat(first.price(), open_time, open_time + width);
    let mut sampled = false;

    for point in sorted {
        while point.time() >= current.close_time() {
            let close = current.close();
            let next_open = current.close_time();
            current.seal();
            candles.push(current);
            current = Candle::flat(close, next_open, next_open + width);
            sampled = false;
        }
        current.push(point.price(), point.volume(), !sampled);
        sampled = true;
    }
    candles.push(current);

    Ok(candles)
}

/// Merges every run of `n` equal-width bars into one bar of width `n * width`.
///
/// A trailing run shorter than `n` still yields a bar of the full width,
/// left uncompleted.
pub fn group_candlesticks(candles: &[Candle], n: usize) -> Result<Vec<Candle>> {
    if n == 0 {
        return Err(Error::InvalidGroupSize(n));
    }
    let Some(first) = candles.first() else {
        return Ok(Vec::new());
    };

    let width = first.width();
    if let Some(other) = candles.iter().find(|c| c.width() != width) {
        return Err(Error::MixedCandleWidths(width.num_seconds(), other.width().num_seconds()));
    }

    candles
        .chunks(n)
        .map(|run| {
            let (head, tail) = (&run[0], &run[run.len() - 1]);
            let open = head.open();
            let close = tail.close();
            let high = run.iter().map(|c| c.high()).fold(open.max(close), f64::max);
            let low = run.iter().map(|c| c.low()).fold(open.min(close), f64::min);

            CandleBuilder::builder()
                .open(open)
                .high(high)
                .low(low)
                .close(close)
                .volume(run.iter().map(|c| c.volume()).sum())
                .open_time(head.open_time())
                .close_time(head.open_time() + width * n as i32)
                .completed(run.len() == n && tail.is_completed())
                .build()
        })
        .collect()
}

/// Returns the bar index containing `time`, if any.
pub fn candle_at(candles: &[Candle], time: DateTime<Utc>) -> Option<usize> {
    let idx = candles.partition_point(|c| c.close_time() <= time);
    candles.get(idx).filter(|c| c.open_time() <= time).map(|_| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{OrderSide, TapeRecord};
    use proptest::prelude::*;

    fn midnight() -> DateTime<Utc> {
        DateTime::from_timestamp_secs(1515110400).unwrap()
    }

    fn rec(id: u64, secs: i64, price: f64) -> TapeRecord {
        TapeRecord::from((id, price, 1.0, midnight() + Duration::seconds(secs), OrderSide::Buy))
    }

    #[test]
    fn rejects_bad_width() {
        let tape = vec![rec(1, 0, 100.0)];
        assert!(matches!(aggregate(&tape, Duration::milliseconds(500)), Err(Error::InvalidWidth(_))));
        assert!(matches!(aggregate(&tape, Duration::hours(25)), Err(Error::InvalidWidth(_))));
    }

    #[test]
    fn empty_input_gives_no_bar() {
        let tape: Vec<TapeRecord> = Vec::new();
        assert!(aggregate(&tape, Duration::minutes(1)).unwrap().is_empty());
    }

    #[test]
    fn bars_align_on_day_start() {
        let tape = vec![rec(1, 90, 100.0), rec(2, 100, 101.0)];
        let bars = aggregate(&tape, Duration::minutes(1)).unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open_time(), midnight() + Duration::minutes(1));
        assert!(!bars[0].is_completed());
    }

    #[test]
    fn scenario_gap_is_filled_with_flat_bars() {
        let tape = vec![rec(3, 200, 98.0), rec(1, 5, 100.0), rec(2, 30, 104.0)];
        let bars = aggregate(&tape, Duration::minutes(1)).unwrap();

        assert_eq!(bars.len(), 4);
        assert_eq!(bars[0].open(), 100.0);
        assert_eq!(bars[0].high(), 104.0);
        assert_eq!(bars[0].close(), 104.0);
        assert_eq!(bars[0].volume(), 2.0);
        for flat in &bars[1..3] {
            assert_eq!(flat.open(), 104.0);
            assert_eq!(flat.high(), 104.0);
            assert_eq!(flat.low(), 104.0);
            assert_eq!(flat.close(), 104.0);
            assert_eq!(flat.volume(), 0.0);
            assert!(flat.is_completed());
        }
        assert_eq!(bars[3].open(), 98.0);
        assert!(!bars[3].is_completed());
    }

    #[test]
    fn group_merges_runs() {
        let tape = (0..5).map(|i| rec(i, i as i64 * 60, 100.0 + i as f64)).collect::<Vec<_>>();
        let bars = aggregate(&tape, Duration::minutes(1)).unwrap();
        let grouped = group_candlesticks(&bars, 2).unwrap();

        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].width(), Duration::minutes(2));
        assert_eq!(grouped[0].open(), 100.0);
        assert_eq!(grouped[0].close(), 101.0);
        assert_eq!(grouped[0].volume(), 2.0);
        assert!(grouped[0].is_completed());
        assert_eq!(grouped[2].width(), Duration::minutes(2));
        assert!(!grouped[2].is_completed());
    }

    #[test]
    fn group_rejects_mixed_widths() {
        let one = aggregate(&[rec(1, 0, 100.0)], Duration::minutes(1)).unwrap();
        let five = aggregate(&[rec(1, 0, 100.0)], Duration::minutes(5)).unwrap();
        let mixed = [one[0], five[0]];
        assert!(matches!(group_candlesticks(&mixed, 2), Err(Error::MixedCandleWidths(60, 300))));
        assert!(matches!(group_candlesticks(&one, 0), Err(Error::InvalidGroupSize(0))));
    }

    #[test]
    fn candle_lookup() {
        let tape = vec![rec(1, 0, 100.0), rec(2, 150, 101.0)];
        let bars = aggregate(&tape, Duration::minutes(1)).unwrap();
        assert_eq!(candle_at(&bars, midnight() + Duration::seconds(61)), Some(1));
        assert_eq!(candle_at(&bars, midnight() + Duration::minutes(3)), None);
    }

    fn arb_tape() -> impl Strategy<Value = Vec<TapeRecord>> {
        prop::collection::vec((0i64..20_000, 1.0..1000.0_f64, 0.0..10.0_f64), 1..60).prop_map(|points| {
            points
                .into_iter()
                .enumerate()
                .map(|(i, (secs, price, volume))| {
                    TapeRecord::from((i as u64, price, volume, midnight() + Duration::seconds(secs), OrderSide::Sell))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn bars_are_contiguous_and_bounded(tape in arb_tape(), width in 1i64..3600) {
            let bars = aggregate(&tape, Duration::seconds(width)).unwrap();

            prop_assert!(!bars.is_empty());
            for pair in bars.windows(2) {
                prop_assert_eq!(pair[0].close_time(), pair[1].open_time());
                prop_assert!(pair[0].is_completed());
            }
            for bar in &bars {
                prop_assert!(bar.high() >= bar.open().max(bar.close()));
                prop_assert!(bar.low() <= bar.open().min(bar.close()));
            }
            let volume = bars.iter().map(|b| b.volume()).sum::<f64>();
            let expected = tape.iter().map(|r| r.volume()).sum::<f64>();
            prop_assert!((volume - expected).abs() < 1e-6);
        }

        #[test]
        fn grouping_keeps_extremes(tape in arb_tape(), n in 1usize..6) {
            let bars = aggregate(&tape, Duration::seconds(60)).unwrap();
            let grouped = group_candlesticks(&bars, n).unwrap();

            prop_assert_eq!(grouped.len(), bars.len().div_ceil(n));
            for (merged, run) in grouped.iter().zip(bars.chunks(n)) {
                prop_assert_eq!(merged.width(), Duration::seconds(60 * n as i64));
                prop_assert_eq!(merged.open(), run[0].open());
                prop_assert_eq!(merged.close(), run[run.len() - 1].close());
                prop_assert_eq!(merged.high(), run.iter().map(|c| c.high()).fold(f64::MIN, f64::max));
                prop_assert_eq!(merged.low(), run.iter().map(|c| c.low()).fold(f64::MAX, f64::min));
            }
        }
    }
}
