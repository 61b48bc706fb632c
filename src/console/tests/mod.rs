//! Callback bridge tests

use std::ffi::{c_char, CStr, CString};
use std::io::{self, BufReader, Read};
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::routes::{self, callbacks, input_trampoline, output_trampoline};
use super::*;
use crate::engine::{EngineHandle, EngineInt, OutputKind, SMCON};
use crate::registry::{Registry, RegistryConfig};
use crate::testing::{MockEngine, ScriptedReader, SharedBuffer};

fn bridge_over(
    chunks: &[&str],
    interactive: bool,
    config: &ConsoleConfig,
) -> (CallbackBridge, SharedBuffer, Arc<AtomicUsize>) {
    let reader = ScriptedReader::new(chunks.iter().copied());
    let reads = reader.reads();
    let output = SharedBuffer::default();
    let bridge = CallbackBridge::new(BufReader::new(reader), output.clone(), interactive, config);
    (bridge, output, reads)
}

struct BrokenReader;

impl Read for BrokenReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("device gone"))
    }
}

mod output_tests {
    use super::*;

    #[test]
    fn test_text_is_written_verbatim_and_flushed() {
        let (bridge, output, _) = bridge_over(&[], false, &ConsoleConfig::default());

        bridge.on_output(OutputEvent::Text {
            kind: OutputKind::Formatted,
            payload: b"2 3 4\n",
        });
        bridge.on_output(OutputEvent::Text {
            kind: OutputKind::Error,
            payload: b"|domain error\n",
        });

        assert_eq!(output.contents(), "2 3 4\n|domain error\n");
        assert_eq!(output.unflushed(), 0);
        assert_eq!(output.flushes(), 2);
        assert_eq!(bridge.exit_status(), None);
    }

    #[test]
    fn test_exit_records_status_and_runs_hook() {
        let seen = Arc::new(AtomicI32::new(-1));
        let hook_seen = Arc::clone(&seen);
        let (bridge, _, _) = bridge_over(&[], false, &ConsoleConfig::default());
        let bridge = bridge.with_exit_hook(move |status| hook_seen.store(status, Ordering::SeqCst));

        bridge.on_output(OutputEvent::Exit(3));
        assert_eq!(bridge.exit_status(), Some(3));
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        // The first recorded status wins.
        bridge.on_output(OutputEvent::Exit(9));
        assert_eq!(bridge.exit_status(), Some(3));
    }
}

mod input_tests {
    use super::*;

    #[test]
    fn test_prompt_is_written_and_terminator_dropped() {
        let (bridge, output, _) = bridge_over(&["1 + 1\n", "i. 3\r\n"], false, &ConsoleConfig::default());

        assert_eq!(bridge.on_input("   "), "1 + 1");
        assert_eq!(bridge.on_input("   "), "i. 3");
        assert_eq!(output.contents(), "      ");
        assert_eq!(output.unflushed(), 0);
    }

    #[test]
    fn test_long_line_is_delivered_in_pieces() {
        let config = ConsoleConfig {
            max_input: 4,
            ..ConsoleConfig::default()
        };
        let (bridge, _, _) = bridge_over(&["abcdefgh\n"], false, &config);

        assert_eq!(bridge.on_input(""), "abcd");
        assert_eq!(bridge.on_input(""), "efgh");
        assert_eq!(bridge.on_input(""), "");
    }

    #[test]
    fn test_line_is_cut_at_nul() {
        let (bridge, _, _) = bridge_over(&["ab\0cd\n"], false, &ConsoleConfig::default());
        assert_eq!(bridge.on_input(""), "ab");
    }

    #[test]
    fn test_non_interactive_eof_returns_shutdown_and_stops_reading() {
        let (bridge, output, reads) = bridge_over(&["x\n"], false, &ConsoleConfig::default());

        assert_eq!(bridge.on_input(">"), "x");
        assert_eq!(bridge.on_input(">"), SHUTDOWN_SENTENCE);
        let reads_at_eof = reads.load(Ordering::SeqCst);

        assert_eq!(bridge.on_input(">"), SHUTDOWN_SENTENCE);
        assert_eq!(bridge.on_input(">"), SHUTDOWN_SENTENCE);
        assert_eq!(reads.load(Ordering::SeqCst), reads_at_eof);
        assert_eq!(output.contents(), ">>");
    }

    #[test]
    fn test_configured_shutdown_sentence() {
        let config = ConsoleConfig {
            shutdown_sentence: "exit 0".to_string(),
            ..ConsoleConfig::default()
        };
        let (bridge, _, _) = bridge_over(&[], false, &config);
        assert_eq!(bridge.on_input(""), "exit 0");
    }

    #[test]
    fn test_read_error_counts_as_end_of_input() {
        let output = SharedBuffer::default();
        let bridge = CallbackBridge::new(
            BufReader::new(BrokenReader),
            output,
            false,
            &ConsoleConfig::default(),
        );
        assert_eq!(bridge.on_input(""), SHUTDOWN_SENTENCE);
    }

    #[test]
    fn test_interactive_eof_requests_break_and_retries() {
        let registry = Registry::init(Arc::new(MockEngine::new()), RegistryConfig::default()).unwrap();
        let session = registry.lookup(registry.acquire().unwrap()).unwrap();

        let (bridge, output, _) = bridge_over(&["", "", "later\n"], true, &ConsoleConfig::default());
        bridge.set_cancel_target(crate::interrupt::CancelCounter::resolve(&session));

        assert_eq!(bridge.on_input("   "), "later");
        assert_eq!(MockEngine::break_value(session.handle()), 2);
        assert_eq!(output.contents(), "   \n\n");
        assert!(bridge.is_interactive());
    }

    #[test]
    fn test_interactive_eof_without_target_still_retries() {
        let (bridge, _, _) = bridge_over(&["", "y\n"], true, &ConsoleConfig::default());
        assert_eq!(bridge.on_input(""), "y");
    }
}

mod route_tests {
    use super::*;

    fn routed(chunks: &[&str]) -> (Registry<MockEngine>, EngineHandle, routes::Route, SharedBuffer) {
        let registry = Registry::init(Arc::new(MockEngine::new()), RegistryConfig::default()).unwrap();
        let handle = registry.lookup(registry.acquire().unwrap()).unwrap().handle();
        let (bridge, output, _) = bridge_over(chunks, false, &ConsoleConfig::default());
        let route = routes::register(handle, Arc::new(bridge));
        (registry, handle, route, output)
    }

    #[test]
    fn test_callback_table_selects_console_mode() {
        let table = callbacks();
        assert!(table.output.is_some());
        assert!(table.input.is_some());
        assert!(table.window_driver.is_null());
        assert!(table.poll.is_null());
        assert_eq!(table.options, SMCON);
    }

    #[test]
    fn test_output_trampoline_routes_text() {
        let (_registry, handle, _route, output) = routed(&[]);
        let text = CString::new("hello\n").unwrap();

        unsafe { output_trampoline(handle.as_ptr(), 1, text.as_ptr()) };
        unsafe { output_trampoline(handle.as_ptr(), 2, ptr::null()) };
        assert_eq!(output.contents(), "hello\n");
    }

    #[test]
    fn test_output_trampoline_decodes_exit_status() {
        let (_registry, handle, route, _) = routed(&[]);

        unsafe { output_trampoline(handle.as_ptr(), 5, 7 as EngineInt as *const c_char) };
        assert_eq!(route.bridge().exit_status(), Some(7));
    }

    #[test]
    fn test_input_trampoline_returns_line() {
        let (_registry, handle, _route, output) = routed(&["i. 5\n"]);
        let prompt = CString::new("   ").unwrap();

        let line = unsafe { input_trampoline(handle.as_ptr(), prompt.as_ptr()) };
        assert_eq!(unsafe { CStr::from_ptr(line) }.to_str().unwrap(), "i. 5");
        assert_eq!(output.contents(), "   ");

        let line = unsafe { input_trampoline(handle.as_ptr(), ptr::null()) };
        assert_eq!(
            unsafe { CStr::from_ptr(line) }.to_str().unwrap(),
            SHUTDOWN_SENTENCE
        );
    }

    #[test]
    fn test_dropped_route_is_unrouted() {
        let (_registry, handle, route, output) = routed(&["never\n"]);
        drop(route);

        let line = unsafe { input_trampoline(handle.as_ptr(), ptr::null()) };
        assert_eq!(
            unsafe { CStr::from_ptr(line) }.to_str().unwrap(),
            SHUTDOWN_SENTENCE
        );
        unsafe { output_trampoline(handle.as_ptr(), 1, c"lost".as_ptr()) };
        assert_eq!(output.contents(), "");
    }

    #[test]
    fn test_stale_route_does_not_remove_replacement() {
        let (_registry, handle, first, _) = routed(&[]);
        let (replacement, output, _) = bridge_over(&[], false, &ConsoleConfig::default());
        let second = routes::register(handle, Arc::new(replacement));
        drop(first);

        unsafe { output_trampoline(handle.as_ptr(), 1, c"still here".as_ptr()) };
        assert_eq!(output.contents(), "still here");
        drop(second);
    }
}
