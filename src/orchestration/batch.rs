// Generic batch runner with an explicit failure policy
//
// Items are processed sequentially and in order. The policy decides what a
// failing item means for the batch:
// - `Isolate`: every item gets its own `Result`, siblings keep going
// - `Atomic`: the first failure aborts the batch and no partial output exists

/// How per-item results are folded into the batch output
pub trait FailurePolicy {
    type Output<T, E>;

    fn collect<T, E>(results: impl Iterator<Item = Result<T, E>>) -> Self::Output<T, E>;
}

/// One tagged result per input item
pub struct Isolate;

/// All items succeed, or the batch fails with the first error
pub struct Atomic;

impl FailurePolicy for Isolate {
    type Output<T, E> = Vec<Result<T, E>>;

    fn collect<T, E>(results: impl Iterator<Item = Result<T, E>>) -> Vec<Result<T, E>> {
        results.collect()
    }
}

impl FailurePolicy for Atomic {
    type Output<T, E> = Result<Vec<T>, E>;

    fn collect<T, E>(results: impl Iterator<Item = Result<T, E>>) -> Result<Vec<T>, E> {
        results.collect()
    }
}

/// Apply `f` to every item in order and fold the results with policy `P`
pub fn run_batch<P, I, T, E, F>(items: I, f: F) -> P::Output<T, E>
where
    P: FailurePolicy,
    I: IntoIterator,
    F: FnMut(I::Item) -> Result<T, E>,
{
    P::collect(items.into_iter().map(f))
}
