/// Tuning knobs for a compiled [`crate::Schema`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of interned patterns after which the grammar is considered
    /// pathological and compilation or validation panics.
    pub pattern_limit: usize,
    /// Keep data derivatives of context-independent patterns across
    /// validation runs, keyed by the literal.
    pub cache_data_derivs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pattern_limit: 0x0fff_ffff,
            cache_data_derivs: true,
        }
    }
}
