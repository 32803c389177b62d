use rand::Rng;

/// Result of one transition on a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarStep {
    /// parameter value after the transition
    pub value: f64,
    /// log-likelihood at `value`
    pub llik: f64,
    /// `false` if the chain stayed at the current value
    pub moved: bool,
}

impl ScalarStep {
    pub fn stay(value: f64, llik: f64) -> Self {
        Self {
            value,
            llik,
            moved: false,
        }
    }
}

/// A Markov transition kernel on a single real-valued parameter,
/// driven only by a log-likelihood function of that parameter.
pub trait ScalarSampler {
    /// `x' ~ K(x, ·)` leaving `exp(llik)` invariant
    fn step<LogLikelihood, R>(&self, current: f64, llik: &LogLikelihood, rng: &mut R) -> ScalarStep
    where
        LogLikelihood: Fn(f64) -> f64,
        R: Rng + ?Sized;
}

/// Anything we can store in a `McmcChain` and summarize element-wise.
pub trait ChainParam: Clone {
    fn dim(&self) -> usize;
    fn as_slice(&self) -> &[f64];
}

impl ChainParam for f64 {
    fn dim(&self) -> usize {
        1
    }
    fn as_slice(&self) -> &[f64] {
        std::slice::from_ref(self)
    }
}

impl ChainParam for Vec<f64> {
    fn dim(&self) -> usize {
        self.len()
    }
    fn as_slice(&self) -> &[f64] {
        self
    }
}

impl ChainParam for nalgebra::DVector<f64> {
    fn dim(&self) -> usize {
        self.len()
    }
    fn as_slice(&self) -> &[f64] {
        nalgebra::DVector::as_slice(self)
    }
}

/// Column-major flattening
impl ChainParam for nalgebra::DMatrix<f64> {
    fn dim(&self) -> usize {
        self.len()
    }
    fn as_slice(&self) -> &[f64] {
        nalgebra::DMatrix::as_slice(self)
    }
}
