//! Extrapolation models for intensities outside the landmark range
//!
//! Both models are fitted from two (raw intensity, standard value) landmark
//! pairs. The linear model continues the local trend indefinitely; the
//! exponential model follows the local slope near the second pair and bends
//! toward an asymptote:
//!
//! ```text
//! m     = (y2 - y1) / (x2 - x1)
//! b     = y1 - m * x1
//! omega = m * x2 - s + b
//! y     = s + beta * exp(gamma * x),  beta = omega * exp(-m * x2 / omega),  gamma = m / omega
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ExtrapolationError {
    #[display("cannot fit a line through landmarks at the same intensity ({x})")]
    DegenerateLinear { x: f64 },
    #[display(
        "exponential tail is undefined: the local trend at intensity {x2} meets the asymptote \
         {asymptote} (omega = {omega})"
    )]
    DegenerateExponential { x2: f64, asymptote: f64, omega: f64 },
}

/// Policy for intensities above the highest landmark.
///
/// Intensities below the lowest landmark always use the exponential model.
#[derive(
    Default,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    derive_more::Display,
    derive_more::FromStr,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TailMode {
    /// Exponential approach toward the table's highest value
    #[default]
    #[display("exp")]
    Exp,
    /// Unbounded line through the two highest landmark pairs
    #[display("linear")]
    Linear,
    /// Constant at the table's highest value
    #[display("flat")]
    Flat,
}

/// Straight line `y = slope * x + intercept` through two landmark pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTail {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTail {
    /// ```
    /// use nyulnorm_core::tail::LinearTail;
    ///
    /// let line = LinearTail::fit((10.0, 100.0), (20.0, 300.0))?;
    /// assert_eq!(line.eval(30.0), 500.0);
    /// # Ok::<(), nyulnorm_core::tail::ExtrapolationError>(())
    /// ```
    pub fn fit((x1, y1): (f64, f64), (x2, y2): (f64, f64)) -> Result<Self, ExtrapolationError> {
        let slope = (y2 - y1) / (x2 - x1);
        if !slope.is_finite() {
            return Err(ExtrapolationError::DegenerateLinear { x: x1 });
        }
        let intercept = y1 - slope * x1;
        Ok(Self { slope, intercept })
    }

    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Exponential curve `y = alpha + beta * exp(gamma * x)` with `alpha` the
/// asymptote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialTail {
    alpha: f64,
    omega: f64,
    gamma: f64,
    /// Intensity of the second landmark pair; `beta * exp(gamma * x)` is
    /// evaluated as `omega * exp(gamma * (x - pivot))` to keep `beta` from
    /// overflowing for large intensities.
    pivot: f64,
}

impl ExponentialTail {
    /// Fits the curve on two landmark pairs and a target asymptote.
    ///
    /// ```
    /// use nyulnorm_core::tail::ExponentialTail;
    ///
    /// // upper tail: local trend rises toward 1000
    /// let tail = ExponentialTail::fit((800.0, 800.0), (900.0, 900.0), 1000.0)?;
    /// assert!((tail.eval(900.0) - 900.0).abs() < 1e-9);
    /// assert!(tail.eval(1e6) <= 1000.0);
    /// # Ok::<(), nyulnorm_core::tail::ExtrapolationError>(())
    /// ```
    pub fn fit(
        first: (f64, f64),
        second: (f64, f64),
        asymptote: f64,
    ) -> Result<Self, ExtrapolationError> {
        let line = LinearTail::fit(first, second)?;
        let (x2, _) = second;
        let omega = line.slope * x2 - asymptote + line.intercept;
        let gamma = line.slope / omega;
        if omega == 0.0 || !omega.is_finite() || !gamma.is_finite() {
            return Err(ExtrapolationError::DegenerateExponential {
                x2,
                asymptote,
                omega,
            });
        }
        Ok(Self {
            alpha: asymptote,
            omega,
            gamma,
            pivot: x2,
        })
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// `omega * exp(-m * x2 / omega)`; may overflow to infinity for large
    /// intensities even though [`Self::eval`] stays finite.
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.omega * (-self.gamma * self.pivot).exp()
    }

    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        self.alpha + self.omega * (self.gamma * (x - self.pivot)).exp()
    }
}

/// Model used above the highest landmark, chosen by [`TailMode`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpperTail {
    Exponential(ExponentialTail),
    Linear(LinearTail),
    Flat(f64),
}

impl UpperTail {
    #[must_use]
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Self::Exponential(tail) => tail.eval(x),
            Self::Linear(tail) => tail.eval(x),
            Self::Flat(value) => *value,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_tail_mode_parsing() {
        assert_eq!("exp".parse::<TailMode>().unwrap(), TailMode::Exp);
        assert_eq!("linear".parse::<TailMode>().unwrap(), TailMode::Linear);
        assert_eq!("flat".parse::<TailMode>().unwrap(), TailMode::Flat);
        assert!("cubic".parse::<TailMode>().is_err());
        assert!("".parse::<TailMode>().is_err());
        assert_eq!(TailMode::default(), TailMode::Exp);
    }

    #[test]
    fn test_tail_mode_display_round_trips() {
        for mode in [TailMode::Exp, TailMode::Linear, TailMode::Flat] {
            assert_eq!(mode.to_string().parse::<TailMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_linear_fit_rejects_coincident_intensities() {
        assert_eq!(
            LinearTail::fit((5.0, 1.0), (5.0, 2.0)),
            Err(ExtrapolationError::DegenerateLinear { x: 5.0 })
        );
    }

    #[test]
    fn test_exponential_parameters() {
        // m = 2, b = -10, omega = 2 * 20 - 0 - 10 = 30
        let tail = ExponentialTail::fit((10.0, 10.0), (20.0, 30.0), 0.0).unwrap();
        assert_abs_diff_eq!(tail.alpha(), 0.0);
        assert_abs_diff_eq!(tail.gamma(), 2.0 / 30.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            tail.beta(),
            30.0 * (-2.0_f64 * 20.0 / 30.0).exp(),
            epsilon = 1e-12
        );
        for x in [-50.0, 0.0, 5.0, 10.0] {
            let direct = tail.alpha() + tail.beta() * (tail.gamma() * x).exp();
            assert_abs_diff_eq!(tail.eval(x), direct, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_lower_tail_approaches_asymptote_from_above() {
        let tail = ExponentialTail::fit((10.0, 0.0), (50.0, 100.0), 0.0).unwrap();
        let mut previous = tail.eval(10.0);
        for x in [5.0, 0.0, -10.0, -100.0, -1000.0] {
            let y = tail.eval(x);
            assert!(y.is_finite());
            assert!(y >= 0.0);
            assert!(y <= previous);
            previous = y;
        }
        assert_abs_diff_eq!(tail.eval(-1e6), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_upper_tail_approaches_asymptote_from_below() {
        let tail = ExponentialTail::fit((800.0, 780.0), (900.0, 880.0), 1000.0).unwrap();
        assert_abs_diff_eq!(tail.eval(900.0), 880.0, epsilon = 1e-9);
        let mut previous = tail.eval(950.0);
        for x in [1000.0, 2000.0, 1e5, 1e9] {
            let y = tail.eval(x);
            assert!(y.is_finite());
            assert!(y <= 1000.0);
            assert!(y >= previous);
            previous = y;
        }
        assert_abs_diff_eq!(tail.eval(1e9), 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_exponential_fit_detects_vanishing_omega() {
        // the line through both pairs reaches the asymptote exactly at x2
        let err = ExponentialTail::fit((90.0, 800.0), (100.0, 1000.0), 1000.0).unwrap_err();
        assert!(matches!(
            err,
            ExtrapolationError::DegenerateExponential { omega, .. } if omega == 0.0
        ));
    }

    #[test]
    fn test_eval_stays_finite_where_beta_overflows() {
        let tail = ExponentialTail::fit((99_990.0, 890.0), (100_000.0, 900.0), 1000.0).unwrap();
        assert!(tail.beta().is_infinite());
        assert!(tail.eval(120_000.0).is_finite());
    }

    #[test]
    fn test_upper_tail_variants() {
        let line = LinearTail::fit((0.0, 0.0), (1.0, 2.0)).unwrap();
        assert_eq!(UpperTail::Linear(line).eval(3.0), 6.0);
        assert_eq!(UpperTail::Flat(1000.0).eval(1e9), 1000.0);
    }
}
