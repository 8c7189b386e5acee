// Second-order low-pass for the throttle input, on top of idsp's DF1 biquad

use idsp::iir::{Biquad, Filter};

/// Biquad low-pass filter with its own DF1 state
#[derive(Debug, Clone)]
pub struct LowPass {
    iir: Biquad<f32>,
    /// DF1 state `[x1, x2, y1, y2]`
    xy: [f32; 4],
    /// State has been seeded with the first sample
    primed: bool,
}

impl LowPass {
    /// Low-pass with cutoff `fc` [Hz] at sample rate `fs` [Hz] and quality `q`
    ///
    /// `fc` is limited below Nyquist; a degenerate design falls back to a pass-through.
    pub fn new(fc: f32, fs: f32, q: f32) -> Self {
        if !(fc > 0.0 && fs > 0.0 && q > 0.0 && fc.is_finite() && fs.is_finite() && q.is_finite()) {
            return Self::passthrough();
        }
        let ba = Filter::<f32>::default()
            .frequency(fc.min(0.499 * fs), fs)
            .q(q)
            .lowpass();
        Self::with_iir(Biquad::from(&ba))
    }

    pub fn passthrough() -> Self {
        Self::with_iir(Biquad::IDENTITY)
    }

    fn with_iir(iir: Biquad<f32>) -> Self {
        Self {
            iir,
            xy: [0.0; 4],
            primed: false,
        }
    }

    /// Filter one sample
    ///
    /// The first sample after construction seeds the state, so the output
    /// starts at the input level instead of stepping up from zero.
    pub fn update(&mut self, x: f32) -> f32 {
        if !self.primed {
            self.primed = true;
            self.xy = [x; 4];
        }
        self.iir.update(&mut self.xy, x)
    }

    /// Last output
    pub fn output(&self) -> f32 {
        self.xy[2]
    }
}
