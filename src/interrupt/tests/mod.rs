//! Interrupt bridge tests
//!
//! The armed target is process-wide, so every test that arms or delivers
//! holds `SERIAL` for its whole body.

use std::sync::{Arc, Mutex};

use super::*;
use crate::registry::{Registry, RegistryConfig};
use crate::testing::MockEngine;

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

fn registry() -> Registry<MockEngine> {
    Registry::init(Arc::new(MockEngine::new()), RegistryConfig::default()).unwrap()
}

mod counter_tests {
    use super::*;

    #[test]
    fn test_each_request_increments_once() {
        let registry = registry();
        let id = registry.acquire().unwrap();
        let session = registry.lookup(id).unwrap();
        let counter = CancelCounter::resolve(&session).unwrap();

        for k in 1..=5u8 {
            assert_eq!(counter.request_cancel(), k);
        }
        assert_eq!(counter.value(), 5);
        assert_eq!(MockEngine::break_value(session.handle()), 5);
    }

    #[test]
    fn test_break_cell_wraps() {
        let registry = registry();
        let id = registry.acquire().unwrap();
        let counter = CancelCounter::resolve(&registry.lookup(id).unwrap()).unwrap();

        for _ in 0..255 {
            counter.request_cancel();
        }
        assert_eq!(counter.value(), 255);
        assert_eq!(counter.request_cancel(), 0);
    }

    #[test]
    fn test_null_break_cell_resolves_to_none() {
        let engine = Arc::new(MockEngine::new());
        engine.without_break_cell();
        let registry = Registry::init(engine, RegistryConfig::default()).unwrap();
        let id = registry.acquire().unwrap();
        assert!(CancelCounter::resolve(&registry.lookup(id).unwrap()).is_none());
        assert_eq!(registry.increment_break(id.into()), Ok(None));
    }

    #[test]
    fn test_counters_are_per_session() {
        let registry = registry();
        let a = registry.acquire().unwrap();
        let b = registry.acquire().unwrap();

        assert_eq!(registry.increment_break(a.into()), Ok(Some(1)));
        assert_eq!(registry.increment_break(a.into()), Ok(Some(2)));
        assert_eq!(registry.increment_break(b.into()), Ok(Some(1)));
    }

    #[test]
    fn test_counter_keeps_released_session_alive() {
        let registry = registry();
        let id = registry.acquire().unwrap();
        let counter = CancelCounter::resolve(&registry.lookup(id).unwrap()).unwrap();

        registry.release(id).unwrap();
        assert!(registry.engine().freed().is_empty());
        assert_eq!(counter.request_cancel(), 1);

        drop(counter);
        assert_eq!(registry.engine().freed().len(), 1);
    }
}

mod bridge_tests {
    use super::*;

    #[test]
    fn test_deliver_without_target_is_a_no_op() {
        let _serial = serial();
        assert!(!InterruptBridge::deliver());
    }

    #[test]
    fn test_deliver_reaches_armed_target() {
        let _serial = serial();
        let registry = registry();
        let id = registry.acquire().unwrap();
        let session = registry.lookup(id).unwrap();

        let armed = InterruptBridge::arm(CancelCounter::resolve(&session).unwrap());
        assert!(InterruptBridge::deliver());
        assert!(InterruptBridge::deliver());
        assert_eq!(armed.counter().value(), 2);

        drop(armed);
        assert!(!InterruptBridge::deliver());
        assert_eq!(MockEngine::break_value(session.handle()), 2);
    }

    #[test]
    fn test_stale_guard_does_not_disarm_newer_target() {
        let _serial = serial();
        let registry = registry();
        let first = registry.lookup(registry.acquire().unwrap()).unwrap();
        let second = registry.lookup(registry.acquire().unwrap()).unwrap();

        let old = InterruptBridge::arm(CancelCounter::resolve(&first).unwrap());
        let new = InterruptBridge::arm(CancelCounter::resolve(&second).unwrap());
        drop(old);

        assert!(InterruptBridge::deliver());
        assert_eq!(new.counter().value(), 1);
        assert_eq!(MockEngine::break_value(first.handle()), 0);
        drop(new);
    }

    #[test]
    fn test_disarmed_session_is_never_freed() {
        let _serial = serial();
        let registry = registry();
        let id = registry.acquire().unwrap();
        let session = registry.lookup(id).unwrap();

        let armed = InterruptBridge::arm(CancelCounter::resolve(&session).unwrap());
        drop(session);
        drop(armed);
        registry.release(id).unwrap();

        // A handler that loaded the target before the disarm may still bump it.
        assert!(registry.engine().freed().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_increments_armed_target() {
        let _serial = serial();
        let registry = registry();
        let session = registry.lookup(registry.acquire().unwrap()).unwrap();

        InterruptBridge::install().unwrap();
        let armed = InterruptBridge::arm(CancelCounter::resolve(&session).unwrap());

        // SAFETY: our handler is installed for SIGINT.
        assert_eq!(unsafe { libc::raise(libc::SIGINT) }, 0);
        assert_eq!(armed.counter().value(), 1);

        // The handler re-registers itself, so a second signal also lands.
        assert_eq!(unsafe { libc::raise(libc::SIGINT) }, 0);
        assert_eq!(armed.counter().value(), 2);

        drop(armed);
        InterruptBridge::uninstall().unwrap();
        // SAFETY: querying the disposition by swapping it back in.
        let current = unsafe { libc::signal(libc::SIGINT, libc::SIG_DFL) };
        assert_eq!(current, libc::SIG_DFL);
    }
}
