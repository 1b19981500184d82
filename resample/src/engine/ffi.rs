//! Raw libsoxr declarations used by the soxr engine.

use std::os::raw::{c_char, c_double, c_uint, c_ulong, c_void};

use crate::format::{Quality, SampleFormat};

/// `struct soxr`, only ever used behind a pointer.
pub enum SoxrHandle {}

/// NUL-terminated message, null on success.
pub type SoxrError = *const c_char;

// Recipes accepted by `soxr_quality_spec`.
pub const SOXR_QQ: c_ulong = 0;
pub const SOXR_LQ: c_ulong = 1;
pub const SOXR_MQ: c_ulong = 2;
pub const SOXR_HQ: c_ulong = 4;
pub const SOXR_VHQ: c_ulong = 6;

// `soxr_datatype_t` values for interleaved buffers.
pub const SOXR_FLOAT32_I: c_uint = 0;
pub const SOXR_FLOAT64_I: c_uint = 1;
pub const SOXR_INT32_I: c_uint = 2;
pub const SOXR_INT16_I: c_uint = 3;

/// Sample types of the input and output.
#[repr(C)]
pub struct SoxrIoSpec {
    pub itype: c_uint,
    pub otype: c_uint,
    pub scale: c_double,
    pub e: *mut c_void,
    pub flags: c_ulong,
}

/// Filter recipe and flags.
#[repr(C)]
pub struct SoxrQualitySpec {
    pub precision: c_double,
    pub phase_response: c_double,
    pub passband_end: c_double,
    pub stopband_begin: c_double,
    pub e: *mut c_void,
    pub flags: c_ulong,
}

/// Threading parameters.
#[repr(C)]
pub struct SoxrRuntimeSpec {
    pub log2_min_dct_size: c_uint,
    pub log2_large_dft_size: c_uint,
    pub coef_size_kbytes: c_uint,
    pub num_threads: c_uint,
    pub e: *mut c_void,
    pub flags: c_ulong,
}

unsafe extern "C" {
    /// Builds an I/O spec.
    pub fn soxr_io_spec(itype: c_uint, otype: c_uint) -> SoxrIoSpec;

    /// Builds a quality spec.
    pub fn soxr_quality_spec(recipe: c_ulong, flags: c_ulong) -> SoxrQualitySpec;

    /// Builds a runtime spec.
    pub fn soxr_runtime_spec(num_threads: c_uint) -> SoxrRuntimeSpec;

    /// Allocates a resampler; `error` is set on failure.
    pub fn soxr_create(
        input_rate: c_double,
        output_rate: c_double,
        num_channels: c_uint,
        error: *mut SoxrError,
        io_spec: *const SoxrIoSpec,
        quality_spec: *const SoxrQualitySpec,
        runtime_spec: *const SoxrRuntimeSpec,
    ) -> *mut SoxrHandle;

    /// Processes samples through the resampler. A null `input` marks the
    /// end of input.
    pub fn soxr_process(
        handle: *mut SoxrHandle,
        input: *const c_void,
        input_len: usize,
        input_done: *mut usize,
        output: *mut c_void,
        output_len: usize,
        output_done: *mut usize,
    ) -> SoxrError;

    /// Frees a handle returned by `soxr_create`.
    pub fn soxr_delete(handle: *mut SoxrHandle);
}

/// Maps a sample format to its interleaved soxr datatype.
pub fn datatype(format: SampleFormat) -> c_uint {
    match format {
        SampleFormat::F32 => SOXR_FLOAT32_I,
        SampleFormat::F64 => SOXR_FLOAT64_I,
        SampleFormat::I32 => SOXR_INT32_I,
        SampleFormat::I16 => SOXR_INT16_I,
    }
}

/// Maps a quality tier to its soxr recipe.
pub fn recipe(quality: Quality) -> c_ulong {
    match quality {
        Quality::Quick => SOXR_QQ,
        Quality::Low => SOXR_LQ,
        Quality::Medium => SOXR_MQ,
        Quality::High => SOXR_HQ,
        Quality::VeryHigh => SOXR_VHQ,
    }
}

/// Copies a soxr error message, if any.
pub fn error_string(err: SoxrError) -> Option<String> {
    if err.is_null() {
        return None;
    }
    // Safety: soxr errors point at static NUL-terminated strings.
    let msg = unsafe { std::ffi::CStr::from_ptr(err) };
    Some(msg.to_string_lossy().into_owned())
}
