//! Backend selection and the unified kernel-launch wrapper.
//!
//! The core runs every numeric kernel through [`launch`], which schedules a
//! data-parallel element kernel on the selected [`Backend`] and blocks until
//! the whole index space has been processed. The parallel lane fans out over
//! a work-stealing thread pool in workgroup-sized chunks; a CUDA-class device
//! would slot in behind the same entry point. The host lane is a plain scalar
//! loop and is bitwise-reproducible.
//!
//! Backend absence is not an error: [`select_backend`] degrades silently to
//! [`Backend::Host`] when the parallel lane is not compiled in or when the
//! operator forces host execution. [`BackendError`] is raised only when a
//! caller explicitly requests the parallel lane in a build without it.

use std::env;

use thiserror::Error;

/// Environment variable that forces host execution regardless of build
/// features. Truthy values: `1`, `true`, `yes`, `on` (case-insensitive).
pub const FORCE_HOST_ENV: &str = "FORCE_HOST_BACKEND";

/// Number of elements handed to each workgroup on the parallel lane.
pub const WORKGROUP_SIZE: usize = 256;

/// A compute lane the core can schedule kernels on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Backend {
    /// Data-parallel fan-out over workgroup-sized chunks.
    Parallel,
    /// Sequential scalar execution on the host.
    Host,
}

impl Backend {
    /// Returns the lane's stable name for logs and serialized payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Host => "host",
        }
    }
}

/// Where a graph's numeric arrays currently live.
///
/// String and metadata containers always stay on host; only the numeric
/// arrays follow this tag. The tag doubles as the array-backend predicate:
/// kernels over device-resident storage dispatch to the parallel lane.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Residency {
    /// Arrays live in host memory.
    #[default]
    Host,
    /// Arrays live on the accelerator side of the launch boundary.
    Device,
}

impl Residency {
    /// Returns the backend that kernels over this storage dispatch to.
    #[must_use]
    pub const fn backend(self) -> Backend {
        match self {
            Self::Host => Backend::Host,
            Self::Device => Backend::Parallel,
        }
    }
}

/// Error raised when a caller explicitly requests an unavailable lane.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum BackendError {
    /// The parallel lane was requested but is not compiled into this build.
    #[error("the parallel backend is not available in this build")]
    ParallelUnavailable,
}

/// Returns whether the parallel lane is compiled into this build.
#[must_use]
pub const fn parallel_available() -> bool {
    cfg!(feature = "parallel")
}

/// Selects the backend for new work: the parallel lane when it is compiled
/// in and the operator has not forced host execution, the host lane
/// otherwise. Absence of the parallel lane is silent.
#[must_use]
pub fn select_backend() -> Backend {
    select_backend_from(env::var(FORCE_HOST_ENV).ok().as_deref())
}

fn select_backend_from(force_host_raw: Option<&str>) -> Backend {
    if !parallel_available() || force_host_raw.is_some_and(is_truthy) {
        Backend::Host
    } else {
        Backend::Parallel
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Fills `out[i] = kernel(i)` for every element, scheduling on `backend`,
/// and returns once the whole range has been processed (the launch boundary
/// is synchronous; completion establishes happens-before for the next
/// launch). Element writes go to disjoint indices.
///
/// # Errors
/// Returns [`BackendError::ParallelUnavailable`] when `backend` is
/// [`Backend::Parallel`] in a build without the parallel lane.
pub fn launch<T, F>(backend: Backend, out: &mut [T], kernel: F) -> Result<(), BackendError>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    match backend {
        Backend::Host => {
            for (index, slot) in out.iter_mut().enumerate() {
                *slot = kernel(index);
            }
            Ok(())
        }
        #[cfg(feature = "parallel")]
        Backend::Parallel => {
            use rayon::prelude::*;
            out.par_chunks_mut(WORKGROUP_SIZE)
                .enumerate()
                .for_each(|(chunk_idx, chunk)| {
                    let base = chunk_idx * WORKGROUP_SIZE;
                    for (offset, slot) in chunk.iter_mut().enumerate() {
                        *slot = kernel(base + offset);
                    }
                });
            Ok(())
        }
        #[cfg(not(feature = "parallel"))]
        Backend::Parallel => Err(BackendError::ParallelUnavailable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::one("1", true)]
    #[case::true_upper("TRUE", true)]
    #[case::yes_padded(" yes ", true)]
    #[case::on("on", true)]
    #[case::zero("0", false)]
    #[case::empty("", false)]
    #[case::garbage("force", false)]
    fn is_truthy_recognises_operator_values(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(is_truthy(raw), expected);
    }

    #[test]
    fn forced_host_wins_over_parallel_feature() {
        assert_eq!(select_backend_from(Some("1")), Backend::Host);
    }

    #[test]
    fn unset_override_tracks_build_features() {
        let expected = if parallel_available() {
            Backend::Parallel
        } else {
            Backend::Host
        };
        assert_eq!(select_backend_from(None), expected);
    }

    #[rstest]
    #[case::host(Backend::Host)]
    #[cfg_attr(feature = "parallel", case::parallel(Backend::Parallel))]
    fn launch_fills_the_whole_range(#[case] backend: Backend) {
        let mut out = vec![0_u32; 3 * WORKGROUP_SIZE + 17];
        launch(backend, &mut out, |i| i as u32 * 2).expect("lane must be available");
        assert!(out.iter().enumerate().all(|(i, &v)| v == i as u32 * 2));
    }

    #[test]
    fn launch_on_empty_range_is_a_no_op() {
        let mut out: Vec<f32> = Vec::new();
        launch(Backend::Host, &mut out, |_| 1.0).expect("host lane is always available");
        assert!(out.is_empty());
    }

    #[test]
    fn residency_maps_to_dispatch_backend() {
        assert_eq!(Residency::Host.backend(), Backend::Host);
        assert_eq!(Residency::Device.backend(), Backend::Parallel);
    }
}
