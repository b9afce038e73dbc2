//! Parallel execution of rule × tuple units.
//!
//! The calling thread enumerates units and feeds them through a bounded
//! channel to a fixed set of named worker threads. Workers borrow the
//! session, the facts and the result for the duration of one execution, so
//! the pool lives inside a thread scope and is torn down when the execution
//! returns.

use std::thread;

use crossbeam_channel::{bounded, Receiver};

use crate::context::{SessionControl, SessionResult};
use crate::error::{RuleError, RuleResult};
use crate::value::Value;

use super::session::{Session, Unit};

/// Runs all units of one execution on `workers` threads.
///
/// Once a stop is requested the producer stops enumerating and workers drain
/// the queue without running what is left in it.
pub(crate) fn run_parallel(
    session: &Session,
    facts: &[Value],
    result: &SessionResult,
    control: &SessionControl,
    workers: usize,
    queue_capacity: usize,
) -> RuleResult<()> {
    let workers = workers.max(1);
    let queue_capacity = queue_capacity.max(1);

    thread::scope(|scope| {
        let (tx, rx) = bounded::<Unit<'_>>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Unit<'_>> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("kyrorules-worker-{idx}"))
                .spawn_scoped(scope, move || {
                    for unit in rx {
                        if control.is_stopped() {
                            continue;
                        }
                        session.run_unit(&unit, result, control);
                    }
                })
                .map_err(|e| RuleError::internal(format!("failed to spawn rule worker: {e}")))?;
            handles.push(handle);
        }
        drop(rx);

        let mut submitted = 0usize;
        for unit in session.units(facts) {
            if control.is_stopped() {
                break;
            }
            // Every worker gone means every worker panicked; join reports it.
            if tx.send(unit).is_err() {
                break;
            }
            submitted += 1;
        }
        // Close the channel: workers drain queued units then exit.
        drop(tx);

        for handle in handles {
            handle
                .join()
                .map_err(|_| RuleError::internal("rule worker panicked"))?;
        }
        tracing::debug!(session = %session.id(), submitted, workers, "parallel execution finished");
        Ok(())
    })
}
