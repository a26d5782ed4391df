use std::future::Future;

/// Where "real" market prices come from.
///
/// Unavailability is routine: implementations report it as `None` and never
/// fail the tick.
pub trait PriceSource: Send + Sync {
    fn fetch_real_price(&self, symbol: &str) -> impl Future<Output = Option<f64>> + Send;
}

impl<T: PriceSource> PriceSource for std::sync::Arc<T> {
    fn fetch_real_price(&self, symbol: &str) -> impl Future<Output = Option<f64>> + Send {
        (**self).fetch_real_price(symbol)
    }
}
