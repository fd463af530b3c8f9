//! One-step-ahead price forecasting with an additive trend/seasonality model.
//!
//! Each series is fitted from scratch on every call; no model state outlives
//! [`forecast_next`]. Prices are divided by their maximum and time is mapped
//! onto `[0, 1]` over the history, then
//!
//! ```text
//! y(t) = k·t + m + Σ_j δ_j · max(t − s_j, 0)      piecewise-linear trend
//!      + Σ_p Σ_n a_pn sin(2πn·d/P) + b_pn cos(2πn·d/P)   seasonality
//!      + Σ_o h_o · 1[d is a holiday shifted by o]       holiday effects
//!      + noise
//! ```
//!
//! where `d` is the absolute day number and `P` is 365.25, 7 or 1 days.
//! Changepoints `s_j` sit on evenly spaced history rows inside the first
//! `changepoint_range` of the data.
//!
//! The coefficients are a MAP estimate under these priors:
//!
//! | Coefficients | Prior |
//! |--------------|-------|
//! | `k`, `m` | Normal(0, 5) |
//! | `δ_j` | Laplace(0, `changepoint_prior_scale`) |
//! | seasonal | Normal(0, `seasonality_prior_scale`) |
//! | holiday | Normal(0, `holidays_prior_scale`) |
//!
//! The Laplace prior is handled by iteratively reweighted ridge regression:
//! every pass solves the normal equations with a per-delta precision of
//! `1 / (τ·|δ_prev|)`, and the noise variance is re-estimated from the
//! residuals between passes.
//!
//! Only holidays inside the exact observed date range enter the design. The
//! forecast horizon is always one calendar day after the last observation.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashSet;

use crate::calendar::{self, HolidayCalendar};
use crate::error::{Error, Result};
use crate::series::{PriceSeries, Ticker};

const TREND_PRIOR_SCALE: f64 = 5.0;
const MAX_PASSES: usize = 50;
const PASS_TOLERANCE: f64 = 1e-9;
/// Floor on the scaled noise variance. Keeps the ridge term alive for
/// near-perfect fits, where duplicated feature columns would otherwise make
/// the normal equations singular.
const MIN_NOISE_VARIANCE: f64 = 1e-6;
const MIN_DELTA: f64 = 1e-6;

/// Tuning of the forecasting model.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ForecastConfig {
    pub daily_seasonality: bool,
    pub weekly_seasonality: bool,
    pub yearly_seasonality: bool,
    /// Trend flexibility. Larger values let the trend bend more at changepoints.
    pub changepoint_prior_scale: f64,
    /// Strength of the seasonal components.
    pub seasonality_prior_scale: f64,
    /// Strength of the holiday effects.
    pub holidays_prior_scale: f64,
    /// Maximum number of potential changepoints.
    pub n_changepoints: usize,
    /// Fraction of the history (from the start) eligible for changepoints.
    pub changepoint_range: f64,
    pub yearly_order: usize,
    pub weekly_order: usize,
    pub daily_order: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            daily_seasonality: true,
            weekly_seasonality: true,
            yearly_seasonality: true,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            n_changepoints: 25,
            changepoint_range: 0.8,
            yearly_order: 10,
            weekly_order: 3,
            daily_order: 4,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        let scales = [
            ("changepoint_prior_scale", self.changepoint_prior_scale),
            ("seasonality_prior_scale", self.seasonality_prior_scale),
            ("holidays_prior_scale", self.holidays_prior_scale),
        ];
        for (name, value) in scales {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!("{name} must be finite and > 0")));
            }
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(Error::Config("changepoint_range must be in (0.0, 1.0]".into()));
        }
        Ok(())
    }

    fn seasonalities(&self) -> Vec<Seasonality> {
        let mut out = Vec::with_capacity(3);
        if self.yearly_seasonality && self.yearly_order > 0 {
            out.push(Seasonality {
                period: 365.25,
                order: self.yearly_order,
            });
        }
        if self.weekly_seasonality && self.weekly_order > 0 {
            out.push(Seasonality {
                period: 7.0,
                order: self.weekly_order,
            });
        }
        if self.daily_seasonality && self.daily_order > 0 {
            out.push(Seasonality {
                period: 1.0,
                order: self.daily_order,
            });
        }
        out
    }
}

/// Next-day prediction for one instrument.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Forecast {
    pub ticker: Ticker,
    pub last_date: NaiveDate,
    /// Always `last_date + 1 day`, trading day or not.
    pub next_date: NaiveDate,
    pub last_price: f64,
    pub predicted_price: f64,
    /// `(predicted_price - last_price) / last_price`
    pub predicted_return: f64,
}

#[derive(Clone, Copy, Debug)]
struct Seasonality {
    period: f64,
    order: usize,
}

/// Column layout of the regression: `[k, m, δ.., seasonal.., holiday..]`.
struct Design {
    origin: NaiveDate,
    span_days: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    holidays: Vec<(i64, FxHashSet<NaiveDate>)>,
}

impl Design {
    fn seasonal_width(&self) -> usize {
        self.seasonalities.iter().map(|s| 2 * s.order).sum()
    }

    fn width(&self) -> usize {
        2 + self.changepoints.len() + self.seasonal_width() + self.holidays.len()
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.origin).num_days() as f64 / self.span_days
    }

    fn row(&self, date: NaiveDate, out: &mut [f64]) {
        let t = self.scaled_time(date);
        out[0] = t;
        out[1] = 1.0;

        let mut col = 2;
        for &s in &self.changepoints {
            out[col] = (t - s).max(0.0);
            col += 1;
        }

        let day = f64::from(date.num_days_from_ce());
        for season in &self.seasonalities {
            for n in 1..=season.order {
                let angle = 2.0 * PI * n as f64 * day / season.period;
                out[col] = angle.sin();
                out[col + 1] = angle.cos();
                col += 2;
            }
        }

        for (_, dates) in &self.holidays {
            out[col] = if dates.contains(&date) { 1.0 } else { 0.0 };
            col += 1;
        }
    }

    fn matrix(&self, dates: &[NaiveDate]) -> DMatrix<f64> {
        let width = self.width();
        let mut x = DMatrix::zeros(dates.len(), width);
        let mut buf = vec![0.0; width];
        for (i, &date) in dates.iter().enumerate() {
            self.row(date, &mut buf);
            for (j, v) in buf.iter().enumerate() {
                x[(i, j)] = *v;
            }
        }
        x
    }

    /// Prior precision per column for every column except the changepoint
    /// deltas, whose precision is recomputed each pass.
    fn base_precision(&self, config: &ForecastConfig) -> Vec<f64> {
        let mut p = Vec::with_capacity(self.width());
        p.push(1.0 / (TREND_PRIOR_SCALE * TREND_PRIOR_SCALE));
        p.push(1.0 / (TREND_PRIOR_SCALE * TREND_PRIOR_SCALE));
        p.extend(std::iter::repeat_n(0.0, self.changepoints.len()));
        let s = config.seasonality_prior_scale;
        p.extend(std::iter::repeat_n(1.0 / (s * s), self.seasonal_width()));
        let h = config.holidays_prior_scale;
        p.extend(std::iter::repeat_n(1.0 / (h * h), self.holidays.len()));
        p
    }
}

/// Changepoint locations in scaled time.
fn changepoints(times: &[f64], config: &ForecastConfig) -> Vec<f64> {
    let hist = (times.len() as f64 * config.changepoint_range).floor() as usize;
    let count = config.n_changepoints.min(hist.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    let last = (hist - 1) as f64;
    (1..=count)
        .map(|j| {
            let idx = (j as f64 * last / count as f64).round() as usize;
            times[idx]
        })
        .collect()
}

/// Fit the model to `series` and predict the price one calendar day after
/// its last observation.
pub fn forecast_next(
    ticker: &Ticker,
    series: &PriceSeries,
    calendar: &HolidayCalendar,
    config: &ForecastConfig,
) -> Result<Forecast> {
    config.validate()?;

    let insufficient = |reason: String| Error::InsufficientData {
        ticker: ticker.clone(),
        reason,
    };

    let n = series.len();
    if n < 2 {
        return Err(insufficient(format!("need at least 2 observations, got {n}")));
    }

    let prices = series.prices();
    let y_scale = prices.iter().copied().fold(0.0_f64, f64::max);
    let y_min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    if y_scale - y_min <= 1e-12 * y_scale {
        return Err(insufficient("price series is constant".into()));
    }

    let first = series.first_date();
    let last = series.last_date();
    let next_date = last
        .succ_opt()
        .ok_or_else(|| Error::numerical(format!("forecast {ticker}"), "no date after last observation"))?;

    let in_range = calendar.within(first, last);
    if in_range.is_empty() {
        warn!("{ticker}: no holidays in {first}..={last}, fitting without holiday effects");
    } else {
        info!("{ticker}: using {} market holidays", in_range.len());
    }

    let mut design = Design {
        origin: first,
        span_days: (last - first).num_days() as f64,
        changepoints: Vec::new(),
        seasonalities: config.seasonalities(),
        holidays: calendar::effect_columns(&in_range),
    };
    let times: Vec<f64> = series.dates().iter().map(|d| design.scaled_time(*d)).collect();
    design.changepoints = changepoints(&times, config);

    let x = design.matrix(series.dates());
    let y = DVector::from_iterator(n, prices.iter().map(|p| p / y_scale));
    let beta = fit(ticker, &design, &x, &y, config)?;

    let mut row = vec![0.0; design.width()];
    design.row(next_date, &mut row);
    let yhat = row.iter().zip(beta.iter()).map(|(a, b)| a * b).sum::<f64>() * y_scale;

    if !yhat.is_finite() || yhat <= 0.0 {
        return Err(Error::numerical(
            format!("forecast {ticker}"),
            format!("prediction {yhat} for {next_date} is not finite and positive"),
        ));
    }

    let last_price = series.last_price();
    let predicted_return = (yhat - last_price) / last_price;
    info!(
        "{ticker}: current {last_price:.2} -> predicted {yhat:.2} (return {:.2}%)",
        predicted_return * 100.0
    );

    Ok(Forecast {
        ticker: ticker.clone(),
        last_date: last,
        next_date,
        last_price,
        predicted_price: yhat,
        predicted_return,
    })
}

/// MAP coefficients via iteratively reweighted ridge regression.
fn fit(
    ticker: &Ticker,
    design: &Design,
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    config: &ForecastConfig,
) -> Result<DVector<f64>> {
    let n = y.len() as f64;
    let xtx = x.tr_mul(x);
    let xty = x.tr_mul(y);
    let base = design.base_precision(config);
    let cp = 2..2 + design.changepoints.len();
    let tau = config.changepoint_prior_scale;

    let mean = y.mean();
    let mut noise = (y.map(|v| (v - mean) * (v - mean)).sum() / n).max(MIN_NOISE_VARIANCE);
    let mut precision = base.clone();
    for p in &mut precision[cp.clone()] {
        *p = 1.0 / (tau * tau);
    }

    let mut beta = DVector::zeros(design.width());
    for pass in 0..MAX_PASSES {
        let mut a = xtx.clone();
        for (j, p) in precision.iter().enumerate() {
            a[(j, j)] += noise * p;
        }

        let chol = a.cholesky().ok_or_else(|| {
            Error::numerical(
                format!("forecast {ticker}"),
                "normal equations are not positive definite",
            )
        })?;
        let next = chol.solve(&xty);
        if next.iter().any(|v| !v.is_finite()) {
            return Err(Error::numerical(
                format!("forecast {ticker}"),
                "non-finite model coefficients",
            ));
        }

        let step = (&next - &beta).amax();
        beta = next;

        let resid = y - x * &beta;
        noise = (resid.norm_squared() / n).max(MIN_NOISE_VARIANCE);
        for j in cp.clone() {
            precision[j] = 1.0 / (tau * beta[j].abs().max(MIN_DELTA));
        }

        if step < PASS_TOLERANCE {
            debug!("{ticker}: fit converged after {} passes", pass + 1);
            break;
        }
    }

    Ok(beta)
}

/// Forecasts for a whole basket.
///
/// Per-instrument failures do not stop the batch; they are collected in
/// [`BatchForecast::failures`] and the caller decides what to do with them.
#[derive(Clone, Debug, Default)]
pub struct BatchForecast {
    pub forecasts: BTreeMap<Ticker, Forecast>,
    pub failures: BTreeMap<Ticker, Error>,
}

impl BatchForecast {
    /// Ticker → predicted price.
    pub fn predictions(&self) -> BTreeMap<Ticker, f64> {
        self.forecasts
            .iter()
            .map(|(t, f)| (t.clone(), f.predicted_price))
            .collect()
    }

    /// Ticker → predicted return.
    pub fn predicted_returns(&self) -> BTreeMap<Ticker, f64> {
        self.forecasts
            .iter()
            .map(|(t, f)| (t.clone(), f.predicted_return))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fit and predict every series independently.
///
/// The configuration is validated once up front; after that, failures are
/// per instrument and land in [`BatchForecast::failures`].
///
/// With the `parallel` feature the instruments are spread over the rayon
/// pool; each worker owns its design matrix and shares only read-only inputs.
pub fn forecast_batch(
    history: &BTreeMap<Ticker, PriceSeries>,
    calendar: &HolidayCalendar,
    config: &ForecastConfig,
) -> Result<BatchForecast> {
    config.validate()?;

    let run = |(ticker, series): (&Ticker, &PriceSeries)| {
        (ticker.clone(), forecast_next(ticker, series, calendar, config))
    };

    #[cfg(feature = "parallel")]
    let results: Vec<(Ticker, Result<Forecast>)> = {
        use rayon::prelude::*;
        history.par_iter().map(run).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<(Ticker, Result<Forecast>)> = history.iter().map(run).collect();

    let mut batch = BatchForecast::default();
    for (ticker, result) in results {
        match result {
            Ok(f) => {
                batch.forecasts.insert(ticker, f);
            }
            Err(e) => {
                warn!("{ticker}: forecast failed: {e}");
                batch.failures.insert(ticker, e);
            }
        }
    }
    Ok(batch)
}
