//! Bisection-point arithmetic (spec §4.1).

use super::CommitmentError;

/// Returns the next bisection point strictly between `pre` and `post`.
///
/// For `pre + 2 == post` the only interior point is `pre + 1`. Otherwise
/// the point is `(post - 1) & mask` where `mask` clears every bit below the
/// highest bit at which `post - 1` and `pre` differ — i.e. the largest
/// power-of-two-aligned position strictly inside `(pre, post)`. This
/// guarantees successive bisections converge in `O(log(post - pre))` steps
/// (property P3).
pub fn bisection_point(pre: u64, post: u64) -> Result<u64, CommitmentError> {
    if post <= pre + 1 {
        return Err(CommitmentError::InvalidArgument(format!(
            "cannot bisect an interval of length <= 1 (pre={pre}, post={post})"
        )));
    }
    if post == pre + 2 {
        return Ok(pre + 1);
    }
    let diff = (post - 1) ^ pre;
    let leading = diff.leading_zeros();
    let mask = u64::MAX << (63 - leading);
    Ok((post - 1) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn midpoint_of_length_two_is_the_only_interior_point() {
        assert_eq!(bisection_point(5, 7).unwrap(), 6);
    }

    #[test]
    fn rejects_non_bisectable_intervals() {
        assert!(bisection_point(5, 5).is_err());
        assert!(bisection_point(5, 6).is_err());
        assert!(bisection_point(6, 5).is_err());
    }

    #[test]
    fn bisection_point_is_strictly_interior() {
        for (pre, post) in [(0u64, 7u64), (0, 16), (3, 100), (1, 1024), (10, 11_000)] {
            let mid = bisection_point(pre, post).unwrap();
            assert!(mid > pre && mid < post, "{pre} < {mid} < {post} violated");
        }
    }

    #[test]
    fn repeated_bisection_converges_within_log2_steps() {
        for n in [2u64, 3, 7, 16, 17, 1000, 1 << 20] {
            let mut pre = 0u64;
            let mut post = n;
            let mut steps = 0u32;
            while post - pre > 1 {
                let mid = bisection_point(pre, post).unwrap();
                // Simulate the honest side narrowing toward `pre`, the
                // worst case for convergence (mirrors S1's bisection walk).
                post = mid;
                steps += 1;
                assert!(steps <= 64, "failed to converge for n={n}");
            }
            let bound = (n as f64).log2().ceil() as u32 + 1;
            assert!(steps <= bound, "n={n} took {steps} steps, bound {bound}");
        }
    }

    #[test]
    fn documented_example_0_to_7_bisects_to_4() {
        assert_eq!(bisection_point(0, 7).unwrap(), 4);
    }

    proptest::proptest! {
        /// P3 (bisection convergence): repeated bisection from `(0, n)`
        /// terminates within `ceil(log2 n) + 1` steps and every midpoint
        /// stays strictly interior, for arbitrary `n`.
        #[test]
        fn repeated_bisection_converges_for_arbitrary_n(n in 2u64..(1u64 << 24)) {
            let mut pre = 0u64;
            let mut post = n;
            let mut steps = 0u32;
            while post - pre > 1 {
                let mid = bisection_point(pre, post).unwrap();
                prop_assert!(mid > pre && mid < post);
                post = mid;
                steps += 1;
                prop_assert!(steps <= 64);
            }
            let bound = (n as f64).log2().ceil() as u32 + 1;
            prop_assert!(steps <= bound);
        }
    }
}
