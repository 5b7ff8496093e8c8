/// Three level polyfill for the f64 `ceil` and `ln` functions.
/// Using these functions in a no_std context falls back to libm's manual
/// implementation from musl's libc.
/// Using the nightly feature allows the upgrade to using LLVM hints, and
/// allowing LLVM to provide a software fallback for target platforms
/// without hardware f64 instructions.
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "std")] {
        #[inline(always)]
        pub(crate) fn ceil(val: f64) -> f64 {
            val.ceil()
        }
        #[inline(always)]
        pub(crate) fn ln(val: f64) -> f64 {
            val.ln()
        }
    } else if #[cfg(feature = "nightly")] {
        #[inline(always)]
        pub(crate) fn ceil(val: f64) -> f64 {
            unsafe {core::intrinsics::ceilf64(val)}
        }
        #[inline(always)]
        pub(crate) fn ln(val: f64) -> f64 {
            unsafe {core::intrinsics::logf64(val)}
        }
    } else {
        #[inline(always)]
        pub(crate) fn ceil(val: f64) -> f64 {
            libm::ceil(val)
        }
        #[inline(always)]
        pub(crate) fn ln(val: f64) -> f64 {
            libm::log(val)
        }
    }
}
