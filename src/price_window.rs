use std::collections::VecDeque;

use crate::model::price_point::PricePoint;

/// Most-recent-N price points, oldest first.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl PriceWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: PricePoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            let _ = self.points.pop_front();
        }
    }

    /// Replace contents with `points` (oldest first), keeping only the newest
    /// `capacity` entries.
    pub fn reset(&mut self, points: impl IntoIterator<Item = PricePoint>) {
        self.points.clear();
        for p in points {
            self.push(p);
        }
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    /// The newest `n` points, oldest first.
    pub fn tail(&self, n: usize) -> Vec<PricePoint> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn p(price: f64) -> PricePoint {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
            + Duration::seconds(price as i64);
        PricePoint::new("BTCUSDT", price, ts, false)
    }

    #[test]
    fn push_evicts_oldest() {
        let mut w = PriceWindow::new(3);
        for i in 1..=5 {
            w.push(p(i as f64));
        }
        assert_eq!(w.len(), 3);
        let prices: Vec<f64> = w.tail(10).iter().map(|x| x.price).collect();
        assert_eq!(prices, vec![3.0, 4.0, 5.0]);
        assert_eq!(w.latest().map(|x| x.price), Some(5.0));
    }

    #[test]
    fn reset_keeps_newest() {
        let mut w = PriceWindow::new(2);
        w.reset((1..=4).map(|i| p(i as f64)));
        let prices: Vec<f64> = w.tail(1).iter().map(|x| x.price).collect();
        assert_eq!(prices, vec![4.0]);
        w.reset(Vec::new());
        assert!(w.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut w = PriceWindow::new(0);
        w.push(p(1.0));
        w.push(p(2.0));
        assert_eq!(w.capacity(), 1);
        assert_eq!(w.len(), 1);
    }
}
