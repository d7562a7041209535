//! Utilities for tests.

use crate::actor::{ActorInfo, ActorRef, TaskId};
use crate::runtime::{ActorResult, Runtime};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Enables log output for a test run, e.g. `RUST_LOG=turnstile=debug cargo test`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One enabled `Actor(i)` per entry, with task `i` in the given operation.
pub fn candidates(operations: &[u64]) -> Vec<ActorInfo> {
    operations
        .iter()
        .enumerate()
        .map(|(i, op)| {
            ActorInfo::new(TaskId::from(i as u64), ActorRef::new("Actor", i as u64), *op)
        })
        .collect()
}

/// Like [`candidates`] but with a type name per entry.
pub fn named_candidates(entries: &[(&str, u64)]) -> Vec<ActorInfo> {
    entries
        .iter()
        .enumerate()
        .map(|(i, (name, op))| {
            ActorInfo::new(TaskId::from(i as u64), ActorRef::new(*name, i as u64), *op)
        })
        .collect()
}

/// An in-memory console that can be handed to a strategy and inspected afterwards.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Two incrementers that read, yield, then write back. The last one to finish checks for a lost
/// update.
pub fn racy_counter(rt: Runtime) -> ActorResult {
    let counter = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicU64::new(0));
    for _ in 0..2 {
        let (counter, finished) = (Arc::clone(&counter), Arc::clone(&finished));
        rt.spawn("Incrementer", move |rt| {
            let read = counter.load(Ordering::SeqCst);
            rt.schedule()?;
            counter.store(read + 1, Ordering::SeqCst);
            if finished.fetch_add(1, Ordering::SeqCst) == 1 {
                rt.assert(counter.load(Ordering::SeqCst) == 2, "lost update")?;
            }
            Ok(())
        })?;
    }
    Ok(())
}

/// Two flippers that each flip a coin, yield, flip a fair coin, then roll a five-sided die. Rolling
/// heads, heads and a four is a bug.
pub fn coin_flips(rt: Runtime) -> ActorResult {
    for name in ["left", "right"] {
        rt.spawn("Flipper", move |rt| {
            let heads = rt.random_bool()?;
            rt.schedule()?;
            let fair = rt.fair_random_bool(name)?;
            let roll = rt.random_int(5)?;
            rt.assert(!(heads && fair && roll == 4), format!("{} hit the jackpot", name))
        })?;
    }
    Ok(())
}

/// Two writers that each append twice to a shared log. Never fails.
pub fn two_writers(rt: Runtime) -> ActorResult {
    let log = Arc::new(Mutex::new(Vec::new()));
    for name in ["left", "right"] {
        let log = Arc::clone(&log);
        rt.spawn("Writer", move |rt| {
            for _ in 0..2 {
                rt.schedule()?;
                log.lock().push(name);
            }
            Ok(())
        })?;
    }
    Ok(())
}
