//! Conversion of native-currency prices into the reporting currency.

use super::RateTable;
use crate::types::{Currency, CurrencyPair, NormalizedSeries, PricePoint, PriceSeries};
use crate::{Error, Result};
use chrono::{NaiveDate, Utc};

/// Convert a native-currency series into the reporting currency.
///
/// Each close is multiplied by the `native → reporting` rate for its date,
/// forward-filled from the nearest earlier quote. When the series is already
/// in the reporting currency the series is returned unchanged and the rate
/// table is never consulted.
///
/// # Errors
///
/// `Error::MissingRate` when some date has no quote at or before it.
pub fn normalize(
    series: &PriceSeries,
    reporting: Currency,
    rates: &RateTable,
) -> Result<NormalizedSeries> {
    let native = series.currency();
    if native == reporting {
        return Ok(NormalizedSeries::from_series(series.clone()));
    }

    let mut points = Vec::with_capacity(series.len());
    for point in series.points() {
        let rate = rates.rate_on(native, reporting, point.date)?;
        points.push(PricePoint::new(point.date, point.close * rate));
    }

    let converted = PriceSeries::new(series.ticker(), reporting, points)?;
    Ok(NormalizedSeries::from_series(converted))
}

/// Convert a single amount.
///
/// With a date the rate in force on that date is used; without one, the
/// latest available rate.
///
/// # Errors
///
/// `Error::MissingRate` when no usable quote exists. Without a date the error
/// reports today's date.
pub fn convert_amount(
    amount: f64,
    from: Currency,
    to: Currency,
    date: Option<NaiveDate>,
    rates: &RateTable,
) -> Result<f64> {
    if from == to {
        return Ok(amount);
    }

    let rate = match date {
        Some(date) => rates.rate_on(from, to, date)?,
        None => rates
            .latest_rate(from, to)
            .ok_or_else(|| Error::MissingRate {
                pair: CurrencyPair::new(from, to),
                date: Utc::now().date_naive(),
            })?,
    };
    Ok(amount * rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::RateHistory;
    use crate::types::FxRate;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn usd_series() -> PriceSeries {
        PriceSeries::from_pairs(
            "AAPL",
            Currency::USD,
            vec![(d(1), 170.0), (d(2), 172.0), (d(3), 171.0), (d(4), 175.0)],
        )
        .unwrap()
    }

    fn usdjpy_table() -> RateTable {
        let pair = CurrencyPair::new(Currency::USD, Currency::JPY);
        RateTable::new().with(
            RateHistory::historical(
                pair,
                &[FxRate::new(pair, d(1), 150.0), FxRate::new(pair, d(3), 152.0)],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_same_currency_is_identity() {
        let series = usd_series();
        // Empty table: identity must not need a rate.
        let normalized = normalize(&series, Currency::USD, &RateTable::new()).unwrap();
        assert_eq!(normalized.as_series(), &series);
    }

    #[test]
    fn test_time_matched_conversion_with_forward_fill() {
        let normalized = normalize(&usd_series(), Currency::JPY, &usdjpy_table()).unwrap();

        assert_eq!(normalized.currency(), Currency::JPY);
        assert_eq!(normalized.ticker(), "AAPL");
        let closes: Vec<f64> = normalized.points().iter().map(|p| p.close).collect();
        assert_relative_eq!(closes[0], 170.0 * 150.0);
        assert_relative_eq!(closes[1], 172.0 * 150.0); // 2nd filled from the 1st
        assert_relative_eq!(closes[2], 171.0 * 152.0);
        assert_relative_eq!(closes[3], 175.0 * 152.0);
    }

    #[test]
    fn test_inverse_quote_is_used() {
        let normalized = normalize(
            &PriceSeries::from_pairs("7203.T", Currency::JPY, vec![(d(2), 3000.0)]).unwrap(),
            Currency::USD,
            &usdjpy_table(),
        )
        .unwrap();
        assert_relative_eq!(normalized.points()[0].close, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_rate_before_first_quote() {
        let pair = CurrencyPair::new(Currency::USD, Currency::JPY);
        let late = RateTable::new()
            .with(RateHistory::historical(pair, &[FxRate::new(pair, d(3), 152.0)]).unwrap());

        let result = normalize(&usd_series(), Currency::JPY, &late);
        assert!(matches!(
            result,
            Err(Error::MissingRate { date, .. }) if date == d(1)
        ));
    }

    #[test]
    fn test_spot_rate_applies_to_whole_history() {
        let pair = CurrencyPair::new(Currency::USD, Currency::JPY);
        let table =
            RateTable::new().with(RateHistory::spot(FxRate::new(pair, d(30), 155.0)).unwrap());

        let normalized = normalize(&usd_series(), Currency::JPY, &table).unwrap();
        assert_relative_eq!(normalized.points()[0].close, 170.0 * 155.0);
        assert_relative_eq!(normalized.points()[3].close, 175.0 * 155.0);
    }

    #[test]
    fn test_convert_amount() {
        let table = usdjpy_table();
        assert_eq!(
            convert_amount(10.0, Currency::JPY, Currency::JPY, None, &table).unwrap(),
            10.0
        );
        assert_relative_eq!(
            convert_amount(10.0, Currency::USD, Currency::JPY, Some(d(2)), &table).unwrap(),
            1500.0
        );
        assert_relative_eq!(
            convert_amount(10.0, Currency::USD, Currency::JPY, None, &table).unwrap(),
            1520.0
        );
    }

    #[test]
    fn test_convert_amount_without_rate_is_missing_rate() {
        let table = usdjpy_table();
        let eurjpy = CurrencyPair::new(Currency::EUR, Currency::JPY);

        let undated = convert_amount(10.0, Currency::EUR, Currency::JPY, None, &table);
        assert!(matches!(undated, Err(Error::MissingRate { pair, .. }) if pair == eurjpy));

        let dated = convert_amount(10.0, Currency::EUR, Currency::JPY, Some(d(2)), &table);
        assert!(matches!(dated, Err(Error::MissingRate { date, .. }) if date == d(2)));
    }
}
