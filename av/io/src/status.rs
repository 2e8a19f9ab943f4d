/*!
    FFmpeg status-code translation.
*/

use std::ffi::{CStr, c_char};

use av_types::{Error, Result};
use ffmpeg_next::ffi;

/**
    Format an FFmpeg status code via `av_strerror`.
*/
pub fn strerror(code: i32) -> String {
    let mut buf = [0 as c_char; 256];
    // SAFETY: buf is a valid mutable buffer of known length.
    unsafe {
        ffi::av_strerror(code, buf.as_mut_ptr(), buf.len());
    }
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_str()
        .unwrap_or("unknown error")
        .to_string()
}

/**
    Translate an FFmpeg return code into a structured error.

    On success (`ret >= 0`) this is a no-op; on failure the code is paired
    with the failing call site and the `av_strerror` message.
*/
pub fn check_ffmpeg(ret: i32, context: &str) -> Result<()> {
    if ret >= 0 {
        return Ok(());
    }
    Err(Error::ffmpeg(context, ret, strerror(ret)))
}

/**
    Map a stream error onto the fixed AVERROR sentinel set.

    The bridge reports every internal failure through this small set; it
    never invents status codes of its own.
*/
pub(crate) fn error_to_averror(error: &Error) -> i32 {
    match error {
        Error::Eof => ffi::AVERROR_EOF,
        Error::Unsupported { .. } => ffi::AVERROR(ffi::ENOSYS),
        Error::Ffmpeg { code, .. } if *code < 0 => *code,
        _ => ffi::AVERROR(ffi::EIO),
    }
}
