//! Region teardown shows up as `debug` events.

use std::io;
use std::sync::Arc;

use gep_memory::{
    AllocatorStatistics, DoubleEndedStackAllocator, GeneralPurposeAllocator, GrowthDirection, PoolAllocator,
    StackAllocator,
};
use parking_lot::Mutex;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` under a debug-level subscriber and returns everything it logged.
fn debug_output(f: impl FnOnce()) -> String {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = capture.0.lock();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[test]
fn test_pool_teardown_is_logged() {
    let heap = GeneralPurposeAllocator::new();
    let output = debug_output(|| {
        drop(PoolAllocator::with_parent(32, 8, &heap).unwrap());
    });
    assert!(output.contains("pool allocator created"));
    assert!(output.contains("pool region released"));
}

#[test]
fn test_stack_teardown_is_logged() {
    let heap = GeneralPurposeAllocator::new();
    let output = debug_output(|| {
        drop(StackAllocator::with_parent(GrowthDirection::Downward, 256, &heap).unwrap());
    });
    assert!(output.contains("stack region released"));
}

#[test]
fn test_double_ended_teardown_is_logged() {
    let heap = GeneralPurposeAllocator::new();
    let output = debug_output(|| {
        drop(DoubleEndedStackAllocator::with_parent(512, &heap).unwrap());
    });
    assert!(output.contains("double-ended stack region released"));
    assert_eq!(heap.bytes_used(), 0);
}
