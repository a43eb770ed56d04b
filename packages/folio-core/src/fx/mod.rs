//! Currency handling.
//!
//! Rate histories, the reporting-currency normalizer, and the per-run FX cache.

mod cache;
mod normalizer;
mod rates;

pub use cache::FxRateCache;
pub use normalizer::{convert_amount, normalize};
pub use rates::{RateHistory, RateSource, RateTable};
