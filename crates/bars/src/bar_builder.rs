//! Fixed-interval bar building from raw price and volume series.
//!
//! Builds OHLC bars with volume and turnover, one per non-empty bucket.

use std::collections::{BTreeMap, HashMap};

use flex_core::{
    bucket_start, Interval, PriceTick, ResampledBar, TimestampUs, VolumeTick, MICROS_PER_SECOND,
};

/// Per-print volumes from session-cumulative counters.
///
/// The first print keeps its cumulative value; every later one is the
/// difference to its predecessor. Counters must be in arrival order.
pub fn volume_deltas(cumulative: &[i64]) -> Vec<i64> {
    let mut previous = 0;
    cumulative
        .iter()
        .map(|&c| {
            let delta = c - previous;
            previous = c;
            delta
        })
        .collect()
}

/// Builder for bars of one security.
///
/// Prices must be added in time order; `open` is the first price added to
/// a bucket and `close` the last.
pub struct BarBuilder {
    interval_us: i64,
    /// Bars being built, keyed by bucket start.
    bars: BTreeMap<TimestampUs, BarInProgress>,
}

/// A bar that's currently being built.
#[derive(Debug, Clone)]
struct BarInProgress {
    interval_start: TimestampUs,
    open: Option<f64>,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    amount: f64,
}

impl BarInProgress {
    fn new(interval_start: TimestampUs) -> Self {
        Self {
            interval_start,
            open: None,
            high: f64::NEG_INFINITY,
            low: f64::INFINITY,
            close: 0.0,
            volume: 0,
            amount: 0.0,
        }
    }

    fn add_price(&mut self, price: f64) {
        if self.open.is_none() {
            self.open = Some(price);
        }
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    fn add_volume(&mut self, delta: i64, price: Option<f64>) {
        self.volume += delta;
        if let Some(price) = price {
            self.amount += price * delta as f64;
        }
    }

    fn to_bar(&self) -> ResampledBar {
        let traded = self.open.is_some();
        ResampledBar {
            interval_start: self.interval_start,
            open: self.open,
            high: traded.then_some(self.high),
            low: traded.then_some(self.low),
            close: traded.then_some(self.close),
            volume: self.volume,
            amount: self.amount,
        }
    }
}

impl BarBuilder {
    /// Create a new bar builder.
    pub fn new(interval: Interval) -> Self {
        Self {
            interval_us: interval.as_micros(),
            bars: BTreeMap::new(),
        }
    }

    fn bar_at(&mut self, ts_us: TimestampUs) -> &mut BarInProgress {
        let start = bucket_start(ts_us, self.interval_us);
        self.bars
            .entry(start)
            .or_insert_with(|| BarInProgress::new(start))
    }

    /// Add a scaled price print.
    pub fn add_price(&mut self, ts_us: TimestampUs, price: f64) {
        self.bar_at(ts_us).add_price(price);
    }

    /// Add a per-print volume, with the price it traded at if known.
    pub fn add_volume(&mut self, ts_us: TimestampUs, delta: i64, price: Option<f64>) {
        self.bar_at(ts_us).add_volume(delta, price);
    }

    /// Finalize all bars, ascending by interval start.
    pub fn finish(self) -> Vec<ResampledBar> {
        self.bars.values().map(BarInProgress::to_bar).collect()
    }
}

/// Resample one security's raw series into bars.
///
/// Prices are scaled by their decimal flag and ordered by time (ties keep
/// arrival order). Volumes are differenced in arrival order. Volume prints
/// carry whole-second timestamps, so the k-th volume print of a second is
/// valued at the k-th price print of that second. Once a second runs out of
/// price prints, the latest price at or before its end is used; prints
/// preceding any price add volume but no turnover. Buckets without ticks
/// are not emitted.
pub fn build_bars(prices: &[PriceTick], volumes: &[VolumeTick], interval: Interval) -> Vec<ResampledBar> {
    let mut scaled: Vec<(TimestampUs, f64)> = prices.iter().map(|p| (p.ts_us, p.scaled())).collect();
    scaled.sort_by_key(|&(ts, _)| ts);

    let mut builder = BarBuilder::new(interval);
    for &(ts, price) in &scaled {
        builder.add_price(ts, price);
    }

    let cumulative: Vec<i64> = volumes.iter().map(|v| v.cumulative).collect();
    let mut seen_in_second: HashMap<TimestampUs, usize> = HashMap::new();
    for (tick, delta) in volumes.iter().zip(volume_deltas(&cumulative)) {
        let second = bucket_start(tick.ts_us, MICROS_PER_SECOND);
        let first = scaled.partition_point(|&(ts, _)| ts < second);
        let end = scaled.partition_point(|&(ts, _)| ts < second + MICROS_PER_SECOND);

        let rank = seen_in_second.entry(second).or_insert(0);
        let idx = if first + *rank < end { Some(first + *rank) } else { end.checked_sub(1) };
        *rank += 1;

        builder.add_volume(tick.ts_us, delta, idx.map(|i| scaled[i].1));
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SEC: i64 = MICROS_PER_SECOND;

    fn price(ts_us: i64, raw_price: i64, decimal_flag: u8) -> PriceTick {
        PriceTick {
            ts_us,
            raw_price,
            decimal_flag,
        }
    }

    fn volume(ts_us: i64, cumulative: i64) -> VolumeTick {
        VolumeTick { ts_us, cumulative }
    }

    fn one_second() -> Interval {
        Interval::from_secs(1).unwrap()
    }

    #[test]
    fn test_volume_deltas() {
        assert_eq!(volume_deltas(&[100, 250, 250, 400]), vec![100, 150, 0, 150]);
        assert_eq!(volume_deltas(&[]), Vec::<i64>::new());
        assert_eq!(volume_deltas(&[42]), vec![42]);
    }

    #[test]
    fn test_single_row_series() {
        let bars = build_bars(&[price(3 * SEC + 10, 20_380_000, 4)], &[], one_second());

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].interval_start, 3 * SEC);
        assert_relative_eq!(bars[0].open.unwrap(), 2038.0);
        assert_eq!(bars[0].open, bars[0].high);
        assert_eq!(bars[0].open, bars[0].low);
        assert_eq!(bars[0].open, bars[0].close);
        assert_eq!(bars[0].volume, 0);
    }

    #[test]
    fn test_ohlc_within_bucket() {
        let prices = [
            price(10, 1000, 1),
            price(20, 1050, 1),
            price(30, 995, 1),
            price(50, 1001, 1),
        ];
        let bars = build_bars(&prices, &[], one_second());

        assert_eq!(bars.len(), 1);
        assert_relative_eq!(bars[0].open.unwrap(), 100.0);
        assert_relative_eq!(bars[0].high.unwrap(), 105.0);
        assert_relative_eq!(bars[0].low.unwrap(), 99.5);
        assert_relative_eq!(bars[0].close.unwrap(), 100.1);
    }

    #[test]
    fn test_open_close_follow_time_not_arrival() {
        let prices = [price(30, 3, 0), price(10, 1, 0), price(20, 2, 0)];
        let bars = build_bars(&prices, &[], one_second());
        assert_relative_eq!(bars[0].open.unwrap(), 1.0);
        assert_relative_eq!(bars[0].close.unwrap(), 3.0);
    }

    #[test]
    fn test_decimal_flag_changes_mid_series() {
        let prices = [price(0, 20_380_000, 4), price(SEC, 2_039, 0)];
        let bars = build_bars(&prices, &[], one_second());
        assert_relative_eq!(bars[0].close.unwrap(), 2038.0);
        assert_relative_eq!(bars[1].close.unwrap(), 2039.0);
    }

    #[test]
    fn test_empty_buckets_omitted() {
        let prices = [price(0, 100, 0), price(5 * SEC + 1, 101, 0)];
        let volumes = [volume(0, 10), volume(5 * SEC, 30)];
        let bars = build_bars(&prices, &volumes, one_second());

        let starts: Vec<i64> = bars.iter().map(|b| b.interval_start).collect();
        assert_eq!(starts, vec![0, 5 * SEC]);
        assert_eq!(bars[0].volume, 10);
        assert_eq!(bars[1].volume, 20);
    }

    #[test]
    fn test_amount_at_tick_granularity() {
        // Two prints in one bucket at different prices.
        let prices = [price(63_886, 100, 0), price(SEC + 5, 110, 0)];
        let volumes = [volume(0, 100), volume(SEC, 250)];
        let bars = build_bars(&prices, &volumes, Interval::from_secs(10).unwrap());

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, 250);
        assert_relative_eq!(bars[0].amount, 100.0 * 100.0 + 150.0 * 110.0);
    }

    #[test]
    fn test_volume_without_price() {
        let bars = build_bars(&[price(2 * SEC, 100, 0)], &[volume(0, 40)], one_second());

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, None);
        assert_eq!(bars[0].close, None);
        assert_eq!(bars[0].volume, 40);
        assert_relative_eq!(bars[0].amount, 0.0);
        assert_eq!(bars[1].volume, 0);
    }

    #[test]
    fn test_buckets_aligned_to_epoch() {
        let prices = [price(1_700_000, 1, 0), price(2_300_000, 2, 0)];
        let bars = build_bars(&prices, &[], one_second());
        assert_eq!(bars[0].interval_start, 1_000_000);
        assert_eq!(bars[1].interval_start, 2_000_000);
    }

    #[test]
    fn test_builder_keys_by_bucket() {
        let mut builder = BarBuilder::new(one_second());
        builder.add_price(0, 1.0);
        builder.add_price(10, 2.0);
        builder.add_volume(SEC, 5, None);
        let bars = builder.finish();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].volume, 5);
        assert_eq!(bars[1].open, None);
    }

    #[test]
    fn test_amount_pairs_prints_within_a_second() {
        let prices = [price(100_000, 100, 0), price(900_000, 200, 0)];
        let volumes = [volume(0, 100), volume(0, 300)];
        let bars = build_bars(&prices, &volumes, one_second());

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, 300);
        assert_relative_eq!(bars[0].amount, 100.0 * 100.0 + 200.0 * 200.0);
    }

    #[test]
    fn test_extra_volume_prints_use_latest_price() {
        // Three volume prints against two price prints in second 1.
        let prices = [price(500_000, 90, 0), price(SEC + 100, 100, 0), price(SEC + 200, 110, 0)];
        let volumes = [volume(SEC, 10), volume(SEC, 30), volume(SEC, 60)];
        let bars = build_bars(&prices, &volumes, one_second());

        assert_eq!(bars[1].volume, 60);
        assert_relative_eq!(bars[1].amount, 10.0 * 100.0 + 20.0 * 110.0 + 30.0 * 110.0);
    }

    #[test]
    fn test_volume_in_quiet_second_uses_earlier_price() {
        let prices = [price(100, 100, 0), price(200, 105, 0)];
        let volumes = [volume(0, 1), volume(0, 2), volume(3 * SEC, 12)];
        let bars = build_bars(&prices, &volumes, one_second());

        assert_eq!(bars.len(), 2);
        assert_relative_eq!(bars[0].amount, 100.0 + 105.0);
        assert_eq!(bars[1].open, None);
        assert_relative_eq!(bars[1].amount, 10.0 * 105.0);
    }
}
