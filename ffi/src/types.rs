//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! A C host describes its packet with `FfiPacket`: two names and the two
//! header values the gate reads. The response payload goes into a buffer the
//! host owns, so nothing returned by `gate_write_packet` needs freeing.
//! `HostPacket` adapts those inputs to the core `Packet` trait.

use std::ffi::CStr;
use std::os::raw::c_char;

use gate_core::{Dispatcher, FieldValue, FieldWriteError, Packet};

/// Opaque handle to a `Dispatcher`. C callers receive a pointer to this
/// and pass it back into every FFI function.
pub struct FfiDispatcher {
    pub(crate) inner: Dispatcher,
}

/// Which member of `FfiFieldValue` is meaningful.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiValueTag {
    /// The packet has no such field.
    None = 0,
    Int = 1,
    UInt = 2,
    Float = 3,
    Text = 4,
}

/// A header value as C-compatible plain data.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiFieldValue {
    pub tag: FfiValueTag,
    pub int_value: i64,
    pub uint_value: u64,
    pub float_value: f64,
    /// NUL-terminated UTF-8, read only when `tag` is `Text`.
    pub text_value: *const c_char,
}

impl FfiFieldValue {
    pub const NONE: Self = Self {
        tag: FfiValueTag::None,
        int_value: 0,
        uint_value: 0,
        float_value: 0.0,
        text_value: std::ptr::null(),
    };

    pub fn uint(value: u64) -> Self {
        Self {
            tag: FfiValueTag::UInt,
            uint_value: value,
            ..Self::NONE
        }
    }

    pub fn int(value: i64) -> Self {
        Self {
            tag: FfiValueTag::Int,
            int_value: value,
            ..Self::NONE
        }
    }

    /// Convert to a core value. A `Text` tag with a null pointer reads as
    /// absent.
    ///
    /// # Safety
    /// `text_value`, when used, must point to a valid NUL-terminated string.
    pub(crate) unsafe fn to_core(&self) -> Option<FieldValue> {
        match self.tag {
            FfiValueTag::None => None,
            FfiValueTag::Int => Some(FieldValue::Int(self.int_value)),
            FfiValueTag::UInt => Some(FieldValue::UInt(self.uint_value)),
            FfiValueTag::Float => Some(FieldValue::Float(self.float_value)),
            FfiValueTag::Text => {
                if self.text_value.is_null() {
                    None
                } else {
                    let text = unsafe { CStr::from_ptr(self.text_value) }.to_string_lossy();
                    Some(FieldValue::Text(text.into_owned()))
                }
            }
        }
    }
}

/// An outgoing command as seen by the gate.
#[repr(C)]
pub struct FfiPacket {
    pub target_name: *const c_char,
    pub packet_name: *const c_char,
    pub stream_id: FfiFieldValue,
    pub function_code: FfiFieldValue,
}

/// What the host should do with the packet.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiDirective {
    /// Encode and send; `out_buf[..*out_len]` holds the response payload.
    Continue = 0,
    /// Drop the packet.
    Stop = 1,
    /// A required pointer argument was null.
    NullArg = 2,
    /// An internal panic was caught.
    Panic = 3,
}

/// `Packet` view over an `FfiPacket` plus the host's output buffer.
pub(crate) struct HostPacket<'a> {
    pub(crate) target_name: String,
    pub(crate) packet_name: String,
    pub(crate) stream_id_field: &'a str,
    pub(crate) function_code_field: &'a str,
    pub(crate) response_field: &'a str,
    pub(crate) stream_id: Option<FieldValue>,
    pub(crate) function_code: Option<FieldValue>,
    pub(crate) out: &'a mut [u8],
    pub(crate) written: usize,
}

impl Packet for HostPacket<'_> {
    fn target_name(&self) -> &str {
        &self.target_name
    }

    fn packet_name(&self) -> &str {
        &self.packet_name
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        if name == self.stream_id_field {
            self.stream_id.clone()
        } else if name == self.function_code_field {
            self.function_code.clone()
        } else {
            None
        }
    }

    fn write_field(&mut self, name: &str, bytes: &[u8]) -> Result<(), FieldWriteError> {
        if name != self.response_field {
            return Err(FieldWriteError::UnknownField(name.to_string()));
        }
        if bytes.len() > self.out.len() {
            return Err(FieldWriteError::TooLarge {
                field: name.to_string(),
                len: bytes.len(),
                max: self.out.len(),
            });
        }
        self.out[..bytes.len()].copy_from_slice(bytes);
        self.written = bytes.len();
        Ok(())
    }
}
