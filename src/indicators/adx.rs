use rust_decimal::Decimal;
use super::Indicator;

/// Wilder's Average Directional Index. Tracks +DI/-DI alongside ADX since the risk manager's
/// side-balancer and the strategy selector's regime classification both read the directional
/// components, not just the trend-strength scalar.
#[derive(Debug, Clone)]
pub struct ADX {
    period: usize,
    prev_high: Option<Decimal>,
    prev_low: Option<Decimal>,
    prev_close: Option<Decimal>,
    smoothed_tr: Decimal,
    smoothed_plus_dm: Decimal,
    smoothed_minus_dm: Decimal,
    dx_values: Vec<Decimal>,
    count: usize,
    adx: Option<Decimal>,
    plus_di: Option<Decimal>,
    minus_di: Option<Decimal>,
}

impl ADX {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_high: None,
            prev_low: None,
            prev_close: None,
            smoothed_tr: Decimal::ZERO,
            smoothed_plus_dm: Decimal::ZERO,
            smoothed_minus_dm: Decimal::ZERO,
            dx_values: Vec::new(),
            count: 0,
            adx: None,
            plus_di: None,
            minus_di: None,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let (prev_high, prev_low, prev_close) = match (self.prev_high, self.prev_low, self.prev_close) {
            (Some(h), Some(l), Some(c)) => (h, l, c),
            _ => {
                self.prev_high = Some(high);
                self.prev_low = Some(low);
                self.prev_close = Some(close);
                return None;
            }
        };

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > Decimal::ZERO { up_move } else { Decimal::ZERO };
        let minus_dm = if down_move > up_move && down_move > Decimal::ZERO { down_move } else { Decimal::ZERO };

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        self.count += 1;
        let period_dec = Decimal::from(self.period as u32);

        if self.count <= self.period {
            self.smoothed_tr += tr;
            self.smoothed_plus_dm += plus_dm;
            self.smoothed_minus_dm += minus_dm;
        } else {
            self.smoothed_tr = self.smoothed_tr - (self.smoothed_tr / period_dec) + tr;
            self.smoothed_plus_dm = self.smoothed_plus_dm - (self.smoothed_plus_dm / period_dec) + plus_dm;
            self.smoothed_minus_dm = self.smoothed_minus_dm - (self.smoothed_minus_dm / period_dec) + minus_dm;
        }

        self.prev_high = Some(high);
        self.prev_low = Some(low);
        self.prev_close = Some(close);

        if self.count < self.period {
            return None;
        }

        if self.smoothed_tr.is_zero() {
            return self.adx;
        }

        let plus_di = (self.smoothed_plus_dm / self.smoothed_tr) * Decimal::from(100);
        let minus_di = (self.smoothed_minus_dm / self.smoothed_tr) * Decimal::from(100);
        self.plus_di = Some(plus_di);
        self.minus_di = Some(minus_di);

        let di_sum = plus_di + minus_di;
        let dx = if di_sum.is_zero() {
            Decimal::ZERO
        } else {
            ((plus_di - minus_di).abs() / di_sum) * Decimal::from(100)
        };

        self.dx_values.push(dx);
        if self.dx_values.len() > self.period {
            self.dx_values.remove(0);
        }

        if self.dx_values.len() < self.period {
            return None;
        }

        self.adx = Some(match self.adx {
            None => self.dx_values.iter().sum::<Decimal>() / period_dec,
            Some(prev_adx) => (prev_adx * (period_dec - Decimal::ONE) + dx) / period_dec,
        });

        self.adx
    }

    pub fn value(&self) -> Option<Decimal> {
        self.adx
    }

    pub fn plus_di(&self) -> Option<Decimal> {
        self.plus_di
    }

    pub fn minus_di(&self) -> Option<Decimal> {
        self.minus_di
    }
}

impl Indicator for ADX {
    fn name(&self) -> &'static str {
        "ADX"
    }

    fn is_ready(&self) -> bool {
        self.adx.is_some()
    }

    fn reset(&mut self) {
        *self = ADX::new(self.period);
    }
}

/// Runs ADX over a full OHLC series and returns the last computed value, for one-shot frame
/// analysis (strategy selector's regime classification, MTF confirmer).
pub fn adx_series(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], period: usize) -> Vec<Decimal> {
    let mut indicator = ADX::new(period);
    let mut out = Vec::new();
    for i in 0..highs.len() {
        if let Some(v) = indicator.update(highs[i], lows[i], closes[i]) {
            out.push(v);
        }
    }
    out
}
