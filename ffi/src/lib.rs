//! C-ABI wrapper around `gate-core`.
//!
//! # Overview
//! Lets a host pipeline written in any language with a C FFI run the
//! pre-encode gate: build a dispatcher once, then call `gate_write_packet`
//! for every outgoing command and honour the returned `FfiDirective`.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Configuration errors surface as a null handle and an error log line.
//! - Response bytes are copied into a caller-owned buffer. A response that
//!   does not fit is handled like any other failed field write.
//! - The caller owns the dispatcher handle and any returned string, and
//!   must release them with `gate_dispatcher_free` / `gate_free_string`.

pub mod types;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use gate_core::{Directive, Dispatcher, DispatcherConfig};

use types::*;

// ---------------------------------------------------------------------------
// Dispatcher lifecycle
// ---------------------------------------------------------------------------

fn into_handle(config: DispatcherConfig) -> *mut FfiDispatcher {
    match Dispatcher::new(config) {
        Ok(inner) => Box::into_raw(Box::new(FfiDispatcher { inner })),
        Err(e) => {
            tracing::error!(error = %e, "invalid dispatcher configuration");
            std::ptr::null_mut()
        }
    }
}

/// Create a dispatcher for `endpoint`, reporting `identity` (may be null).
///
/// Returns null if `endpoint` is null, blank or not a usable URL.
/// The caller must free the returned pointer with `gate_dispatcher_free`.
#[unsafe(no_mangle)]
pub extern "C" fn gate_dispatcher_new(
    endpoint: *const c_char,
    identity: *const c_char,
) -> *mut FfiDispatcher {
    catch_unwind(|| {
        if endpoint.is_null() {
            return std::ptr::null_mut();
        }
        let endpoint = unsafe { CStr::from_ptr(endpoint) }.to_string_lossy().into_owned();
        let mut config = DispatcherConfig::new(endpoint);
        if !identity.is_null() {
            let identity = unsafe { CStr::from_ptr(identity) }.to_string_lossy().into_owned();
            config.keycloak_identity = Some(identity);
        }
        into_handle(config)
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Create a dispatcher from a TOML configuration document.
///
/// Returns null if `config` is null or does not describe a valid dispatcher.
#[unsafe(no_mangle)]
pub extern "C" fn gate_dispatcher_from_toml(config: *const c_char) -> *mut FfiDispatcher {
    catch_unwind(|| {
        if config.is_null() {
            return std::ptr::null_mut();
        }
        let text = unsafe { CStr::from_ptr(config) }.to_string_lossy();
        match DispatcherConfig::from_toml_str(&text) {
            Ok(config) => into_handle(config),
            Err(e) => {
                tracing::error!(error = %e, "invalid dispatcher configuration");
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a dispatcher created by `gate_dispatcher_*`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn gate_dispatcher_free(dispatcher: *mut FfiDispatcher) {
    if !dispatcher.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(dispatcher) });
        }));
    }
}

/// The normalized endpoint URL, as a new C string.
///
/// Returns null if `dispatcher` is null.
/// The caller must free the returned string with `gate_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn gate_dispatcher_endpoint(dispatcher: *const FfiDispatcher) -> *mut c_char {
    // The HTTP agent inside the handle is not RefUnwindSafe.
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() {
            return std::ptr::null_mut();
        }
        let dispatcher = unsafe { &*dispatcher };
        CString::new(dispatcher.inner.endpoint().as_str())
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut())
    }))
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Run one outgoing packet through the gate.
///
/// On `Continue`, `out_buf[..*out_len]` holds the decision service's
/// response bytes (`*out_len` is 0 for pass-through commands or when
/// injection is disabled). `out_buf` may be null only when `out_cap` is 0;
/// `out_len` may be null if the caller does not need the length.
#[unsafe(no_mangle)]
pub extern "C" fn gate_write_packet(
    dispatcher: *const FfiDispatcher,
    packet: *const FfiPacket,
    out_buf: *mut u8,
    out_cap: usize,
    out_len: *mut usize,
) -> FfiDirective {
    catch_unwind(AssertUnwindSafe(|| {
        if dispatcher.is_null() || packet.is_null() || (out_buf.is_null() && out_cap > 0) {
            return FfiDirective::NullArg;
        }
        let dispatcher = unsafe { &(*dispatcher).inner };
        let packet = unsafe { &*packet };
        if packet.target_name.is_null() || packet.packet_name.is_null() {
            return FfiDirective::NullArg;
        }

        let out: &mut [u8] = if out_buf.is_null() {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(out_buf, out_cap) }
        };
        let config = dispatcher.config();
        let host = HostPacket {
            target_name: unsafe { CStr::from_ptr(packet.target_name) }
                .to_string_lossy()
                .into_owned(),
            packet_name: unsafe { CStr::from_ptr(packet.packet_name) }
                .to_string_lossy()
                .into_owned(),
            stream_id_field: &config.stream_id_field,
            function_code_field: &config.function_code_field,
            response_field: &config.response_field,
            stream_id: unsafe { packet.stream_id.to_core() },
            function_code: unsafe { packet.function_code.to_core() },
            out,
            written: 0,
        };

        let (directive, written) = match dispatcher.write_packet(host) {
            Directive::Continue(host) => (FfiDirective::Continue, host.written),
            Directive::Stop => (FfiDirective::Stop, 0),
        };
        if !out_len.is_null() {
            unsafe { *out_len = written };
        }
        directive
    }))
    .unwrap_or(FfiDirective::Panic)
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn gate_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mock_server::{DecisionState, Received, Reply, ReplyPlan};
    use std::ffi::CString;
    use std::net::SocketAddr;

    fn start_mock(state: DecisionState) -> SocketAddr {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener, state).await
            })
            .unwrap();
        });

        addr
    }

    fn new_dispatcher(endpoint: &str) -> *mut FfiDispatcher {
        let endpoint = CString::new(endpoint).unwrap();
        gate_dispatcher_new(endpoint.as_ptr(), std::ptr::null())
    }

    /// Keeps the names alive for as long as the `FfiPacket` points at them.
    struct TestPacket {
        _target: CString,
        _name: CString,
        raw: FfiPacket,
    }

    fn packet(name: &str, function_code: FfiFieldValue) -> TestPacket {
        let target = CString::new("GATE").unwrap();
        let name = CString::new(name).unwrap();
        let raw = FfiPacket {
            target_name: target.as_ptr(),
            packet_name: name.as_ptr(),
            stream_id: FfiFieldValue::uint(0x1801),
            function_code,
        };
        TestPacket {
            _target: target,
            _name: name,
            raw,
        }
    }

    fn closed_port() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn dispatcher_new_and_free() {
        let d = new_dispatcher("http://localhost:3000/gate");
        assert!(!d.is_null());
        gate_dispatcher_free(d);
    }

    #[test]
    fn dispatcher_new_null_endpoint_returns_null() {
        assert!(gate_dispatcher_new(std::ptr::null(), std::ptr::null()).is_null());
    }

    #[test]
    fn dispatcher_new_blank_endpoint_returns_null() {
        assert!(new_dispatcher("   ").is_null());
    }

    #[test]
    fn dispatcher_free_null_is_safe() {
        gate_dispatcher_free(std::ptr::null_mut());
    }

    #[test]
    fn endpoint_is_normalized() {
        let d = new_dispatcher("//gate:8080/check");
        let s = gate_dispatcher_endpoint(d);
        assert_eq!(unsafe { CStr::from_ptr(s) }.to_str().unwrap(), "http://gate:8080/check");
        gate_free_string(s);
        gate_dispatcher_free(d);
    }

    #[test]
    fn dispatcher_from_toml() {
        let toml = CString::new("rest_endpoint = \"gate:9000\"\ntimeout_ms = 100").unwrap();
        let d = gate_dispatcher_from_toml(toml.as_ptr());
        assert!(!d.is_null());
        let s = gate_dispatcher_endpoint(d);
        assert_eq!(unsafe { CStr::from_ptr(s) }.to_str().unwrap(), "http://gate:9000");
        gate_free_string(s);
        gate_dispatcher_free(d);
    }

    #[test]
    fn dispatcher_from_bad_toml_returns_null() {
        let toml = CString::new("timeout_ms = \"soon\"").unwrap();
        assert!(gate_dispatcher_from_toml(toml.as_ptr()).is_null());
        assert!(gate_dispatcher_from_toml(std::ptr::null()).is_null());
    }

    #[test]
    fn write_packet_null_args() {
        let d = new_dispatcher("http://localhost:3000/gate");
        let pkt = packet("ARM", FfiFieldValue::uint(7));
        let mut buf = [0u8; 8];

        assert_eq!(
            gate_write_packet(std::ptr::null(), &pkt.raw, buf.as_mut_ptr(), buf.len(), std::ptr::null_mut()),
            FfiDirective::NullArg
        );
        assert_eq!(
            gate_write_packet(d, std::ptr::null(), buf.as_mut_ptr(), buf.len(), std::ptr::null_mut()),
            FfiDirective::NullArg
        );
        assert_eq!(
            gate_write_packet(d, &pkt.raw, std::ptr::null_mut(), 8, std::ptr::null_mut()),
            FfiDirective::NullArg
        );

        let nameless = FfiPacket {
            target_name: std::ptr::null(),
            packet_name: std::ptr::null(),
            stream_id: FfiFieldValue::NONE,
            function_code: FfiFieldValue::NONE,
        };
        assert_eq!(
            gate_write_packet(d, &nameless, buf.as_mut_ptr(), buf.len(), std::ptr::null_mut()),
            FfiDirective::NullArg
        );
        gate_dispatcher_free(d);
    }

    #[test]
    fn noop_continues_without_network() {
        let d = new_dispatcher(&format!("http://{}/gate", closed_port()));
        let pkt = packet("NOOP", FfiFieldValue::int(1));
        let mut buf = [0xaau8; 4];
        let mut len = usize::MAX;

        let directive = gate_write_packet(d, &pkt.raw, buf.as_mut_ptr(), buf.len(), &mut len);

        assert_eq!(directive, FfiDirective::Continue);
        assert_eq!(len, 0);
        assert_eq!(buf, [0xaa; 4]);
        gate_dispatcher_free(d);
    }

    #[test]
    fn refused_connection_stops() {
        let d = new_dispatcher(&format!("http://{}/gate", closed_port()));
        let pkt = packet("ARM", FfiFieldValue::uint(7));
        let mut len = usize::MAX;

        let directive = gate_write_packet(d, &pkt.raw, std::ptr::null_mut(), 0, &mut len);

        assert_eq!(directive, FfiDirective::Stop);
        assert_eq!(len, 0);
        gate_dispatcher_free(d);
    }

    #[test]
    fn accepted_command_fills_buffer() {
        let state = DecisionState::new(ReplyPlan::new(Reply::bytes(vec![9, 8, 7])));
        let addr = start_mock(state.clone());
        let d = new_dispatcher(&format!("{addr}/gate"));
        let pkt = packet("ARM", FfiFieldValue::uint(7));
        let mut buf = [0u8; 128];
        let mut len = 0usize;

        let directive = gate_write_packet(d, &pkt.raw, buf.as_mut_ptr(), buf.len(), &mut len);

        assert_eq!(directive, FfiDirective::Continue);
        assert_eq!(&buf[..len], &[9, 8, 7]);

        let received: Vec<Received> = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(state.received());
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].summary.keycloak_id, "unknown");
        assert_eq!(received[0].summary.stream_id, 0x1801);
        gate_dispatcher_free(d);
    }

    #[test]
    fn response_larger_than_buffer_stops() {
        let addr = start_mock(DecisionState::new(ReplyPlan::new(Reply::bytes(vec![1; 16]))));
        let d = new_dispatcher(&format!("{addr}/gate"));
        let pkt = packet("ARM", FfiFieldValue::uint(7));
        let mut buf = [0u8; 8];
        let mut len = usize::MAX;

        let directive = gate_write_packet(d, &pkt.raw, buf.as_mut_ptr(), buf.len(), &mut len);

        assert_eq!(directive, FfiDirective::Stop);
        assert_eq!(len, 0);
        assert_eq!(buf, [0; 8]);
        gate_dispatcher_free(d);
    }

    #[test]
    fn denied_command_stops() {
        let plan = ReplyPlan::default().with_packet("FIRE", Reply::text(403, "denied"));
        let addr = start_mock(DecisionState::new(plan));
        let d = new_dispatcher(&format!("{addr}/gate"));
        let pkt = packet("FIRE", FfiFieldValue::uint(9));
        let mut buf = [0u8; 128];

        let directive =
            gate_write_packet(d, &pkt.raw, buf.as_mut_ptr(), buf.len(), std::ptr::null_mut());

        assert_eq!(directive, FfiDirective::Stop);
        gate_dispatcher_free(d);
    }

    #[test]
    fn text_field_value_converts() {
        let text = CString::new("SAFE").unwrap();
        let value = FfiFieldValue {
            tag: FfiValueTag::Text,
            text_value: text.as_ptr(),
            ..FfiFieldValue::NONE
        };
        assert_eq!(
            unsafe { value.to_core() },
            Some(gate_core::FieldValue::Text("SAFE".to_string()))
        );

        let dangling = FfiFieldValue {
            tag: FfiValueTag::Text,
            ..FfiFieldValue::NONE
        };
        assert_eq!(unsafe { dangling.to_core() }, None);
    }

    #[test]
    fn free_string_null_is_safe() {
        gate_free_string(std::ptr::null_mut());
    }
}
