//! SoX Resampler engine.

use std::os::raw::c_uint;
use std::ptr;

use tracing::debug;

use super::ffi::{self, SoxrHandle};
use super::{ContextSpec, ConversionEngine, EngineContext};
use crate::error::EngineError;

/// Creates contexts backed by libsoxr.
///
/// The configured parallelism is handed to soxr as its thread count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoxrEngine;

impl ConversionEngine for SoxrEngine {
    fn create_context(&self, spec: &ContextSpec) -> Result<Box<dyn EngineContext>, EngineError> {
        Ok(Box::new(SoxrContext::new(spec)?))
    }
}

/// Owns one native soxr handle; dropping it deletes the handle.
struct SoxrContext {
    handle: *mut SoxrHandle,
    frame_bytes: usize,
    ended: bool,
}

// Safety: the handle is owned exclusively by this context and only used
// through `&mut self`.
unsafe impl Send for SoxrContext {}

impl Drop for SoxrContext {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe { ffi::soxr_delete(self.handle) };
            self.handle = ptr::null_mut();
            debug!("soxr context released");
        }
    }
}

impl SoxrContext {
    fn new(spec: &ContextSpec) -> Result<Self, EngineError> {
        let datatype = ffi::datatype(spec.format);
        let threads = spec.parallelism.get().min(c_uint::MAX as usize) as c_uint;

        let handle = unsafe {
            let io_spec = ffi::soxr_io_spec(datatype, datatype);
            let quality_spec = ffi::soxr_quality_spec(ffi::recipe(spec.quality), 0);
            let runtime_spec = ffi::soxr_runtime_spec(threads);

            let mut error: ffi::SoxrError = ptr::null();
            let handle = ffi::soxr_create(
                spec.input_rate,
                spec.output_rate,
                spec.channels as c_uint,
                &mut error,
                &io_spec,
                &quality_spec,
                &runtime_spec,
            );
            if let Some(msg) = ffi::error_string(error) {
                if !handle.is_null() {
                    ffi::soxr_delete(handle);
                }
                return Err(EngineError(msg));
            }
            if handle.is_null() {
                return Err(EngineError::new("soxr: unknown error"));
            }
            handle
        };

        debug!(
            input_rate = spec.input_rate,
            output_rate = spec.output_rate,
            channels = spec.channels,
            threads,
            "soxr context created"
        );

        Ok(Self {
            handle,
            frame_bytes: spec.frame_bytes(),
            ended: false,
        })
    }

    /// Runs `soxr_process` and returns the frames written to `output`.
    ///
    /// No `idone` is passed, so soxr takes all `frames_in` frames and
    /// buffers whatever does not fit into `output`.
    fn call(
        &mut self,
        input: *const u8,
        frames_in: usize,
        output: &mut [u8],
        frames_out: usize,
    ) -> Result<usize, EngineError> {
        if output.len() < frames_out * self.frame_bytes {
            return Err(EngineError::new("soxr: output buffer too small"));
        }
        let mut odone: usize = 0;
        let err = unsafe {
            ffi::soxr_process(
                self.handle,
                input.cast(),
                frames_in,
                ptr::null_mut(),
                output.as_mut_ptr().cast(),
                frames_out,
                &mut odone,
            )
        };
        match ffi::error_string(err) {
            Some(msg) => Err(EngineError(msg)),
            None => Ok(odone),
        }
    }
}

impl EngineContext for SoxrContext {
    fn process(
        &mut self,
        input: &[u8],
        frames_in: usize,
        output: &mut [u8],
        frames_out: usize,
    ) -> Result<(usize, usize), EngineError> {
        if self.ended {
            return Err(EngineError::new("soxr: input already ended"));
        }
        if input.len() < frames_in * self.frame_bytes {
            return Err(EngineError::new("soxr: input buffer too small"));
        }
        let produced = self.call(input.as_ptr(), frames_in, output, frames_out)?;
        Ok((frames_in, produced))
    }

    fn flush(&mut self, output: &mut [u8], frames_out: usize) -> Result<usize, EngineError> {
        // A null input tells soxr the stream is over; an empty one only
        // collects what is already buffered.
        let input: *const u8 = if self.ended {
            ptr::null()
        } else {
            ptr::NonNull::<u8>::dangling().as_ptr()
        };
        self.call(input, 0, output, frames_out)
    }

    fn end_input(&mut self) -> Result<(), EngineError> {
        self.ended = true;
        Ok(())
    }
}
