/// Coarse-grained progress sink for long-running stages.
///
/// Called from whatever thread runs the computation, once per scanned K or
/// bootstrap run. Implementations must not block for long.
pub trait Progress {
    fn report(&self, completed: usize, total: usize, message: &str);
}

impl<F> Progress for F
where
    F: Fn(usize, usize, &str),
{
    fn report(&self, completed: usize, total: usize, message: &str) {
        self(completed, total, message)
    }
}

/// Discards all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {
    fn report(&self, _completed: usize, _total: usize, _message: &str) {}
}
