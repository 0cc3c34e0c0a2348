/// Errors of the distributed environment, matrix store, kernels and solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistError
{
    /// Used before the environment was initialized or after it was finalized.
    NotInitialized,
    /// Operand shapes (or process groups) do not conform.
    DimensionMismatch,
    /// Index outside of the local or global range.
    OutOfBounds,
    /// Singular or non-finite factorization, or a stalled iteration.
    NumericalFailure,
    /// Exceed max iterations.
    MaxIterExceeded,
    /// A collective could not complete because a peer never arrived.
    CollectiveDeadlock,

    /// Unsupported pair of distributions.
    InvalidDistribution,
    /// Parameter out of its valid range.
    InvalidParameter,
}

impl core::fmt::Display for DistError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", match &self {
            DistError::NotInitialized      => "NotInitialized: environment is not initialized",
            DistError::DimensionMismatch   => "DimensionMismatch: operand dimensions do not conform",
            DistError::OutOfBounds         => "OutOfBounds: index out of range",
            DistError::NumericalFailure    => "NumericalFailure: singular or non-finite computation",
            DistError::MaxIterExceeded     => "MaxIterExceeded: exceed max iterations",
            DistError::CollectiveDeadlock  => "CollectiveDeadlock: a peer process never reached the collective",
            DistError::InvalidDistribution => "InvalidDistribution: unsupported distribution pair",
            DistError::InvalidParameter    => "InvalidParameter: parameter out of range",
        })
    }
}

//

impl std::error::Error for DistError {}

//

#[test]
fn test_dist_error1()
{
    let e: Box<dyn std::error::Error> = Box::new(DistError::OutOfBounds);
    assert!(e.to_string().starts_with("OutOfBounds:"));
    assert_eq!(DistError::MaxIterExceeded.to_string(), "MaxIterExceeded: exceed max iterations");
}
