//! Stress tests for UnitWork.
//!
//! These tests drive many sessions sequentially and from several threads
//! sharing one unit.

use crate::fixtures::Person;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use unitwork_core::{CoreError, EntityRef, PersistenceUnit, Query};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total sessions run.
    pub total_sessions: usize,
    /// Sessions that committed.
    pub committed: usize,
    /// Sessions that failed or rolled back.
    pub failed: usize,
    /// Total duration.
    pub duration: Duration,
    /// Sessions per second.
    pub sessions_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(committed: usize, failed: usize, duration: Duration) -> Self {
        let total = committed + failed;
        let sessions_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_sessions: total,
            committed,
            failed,
            duration,
            sessions_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total sessions: {}", self.total_sessions);
        println!("Committed: {}", self.committed);
        println!("Failed: {}", self.failed);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} sessions/sec", self.sessions_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of sessions to run.
    pub sessions: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Entities touched per session.
    pub entities_per_session: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            sessions: 1_000,
            threads: 4,
            entities_per_session: 8,
        }
    }
}

/// Inserts fresh people, one session per batch.
pub fn stress_sequential_inserts(unit: &PersistenceUnit, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut committed = 0usize;
    let mut failed = 0usize;

    for s in 0..config.sessions {
        let base = (s * config.entities_per_session) as i64;
        let result = unit.transaction(|session| {
            for i in 0..config.entities_per_session as i64 {
                let id = base + i + 1;
                session.persist(&EntityRef::new(Person::new(id, format!("p{id}"), 30)))?;
            }
            Ok(())
        });

        match result {
            Ok(()) => committed += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(committed, failed, start.elapsed())
}

/// Repeatedly loads, mutates and queries people in `1..=people`, rolling
/// back every other session.
pub fn stress_mixed_sessions(
    unit: &PersistenceUnit,
    people: i64,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let mut committed = 0usize;
    let mut failed = 0usize;

    for s in 0..config.sessions {
        let result = unit.transaction(|session| {
            for i in 0..config.entities_per_session {
                let id = ((s + i) as i64 % people) + 1;
                if let Some(person) = session.find::<Person>(id)? {
                    person.update(|p| p.age = (s % 100) as i32);
                }
            }
            let everyone = session.query::<Person>(&Query::all())?;
            if s % 2 == 1 {
                return Err(CoreError::invalid_operation(format!(
                    "rollback {} people",
                    everyone.len()
                )));
            }
            Ok(())
        });

        match result {
            Ok(()) => committed += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(committed, failed, start.elapsed())
}

/// Runs inserts from several threads sharing one unit. Each thread owns a
/// disjoint id range, so every session should commit.
pub fn stress_concurrent_sessions(unit: PersistenceUnit, config: &StressConfig) -> StressTestResult {
    let committed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let sessions_per_thread = config.sessions / config.threads;
    let per_session = config.entities_per_session;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let unit = unit.clone();
            let committed = Arc::clone(&committed);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for s in 0..sessions_per_thread {
                    let base = ((t * sessions_per_thread + s) * per_session) as i64;
                    let result = unit.transaction(|session| {
                        for i in 0..per_session as i64 {
                            let id = base + i + 1;
                            session.persist(&EntityRef::new(Person::new(id, "t", 1)))?;
                        }
                        Ok(())
                    });
                    match result {
                        Ok(()) => {
                            committed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        committed.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
