//! Bounded worker pool: a shared task queue, a fixed number of workers, and a barrier at the end.

use std::{
    thread,
    sync::{Mutex, mpsc},
};

/// One unit of work: name (used for logging) and the task itself.
pub struct Unit<T> {
    pub name: String,
    pub task: T,
}

impl<T> Unit<T> {
    pub fn new(name: impl Into<String>, task: T) -> Self {
        Self { name: name.into(), task }
    }
}

/// Runs all units using at most `threads` workers, and blocks until every unit finishes,
/// regardless of failures in other units.
///
/// Units are independent, and are executed in an arbitrary order.
/// If some units fail, all failures are logged, and the error of the earliest unit (in the input order)
/// is returned. Output of successful units is not affected.
pub fn run_units<T, F>(units: Vec<Unit<T>>, threads: usize, f: F) -> crate::Result<()>
where T: Send,
      F: Fn(T) -> crate::Result<()> + Sync,
{
    let n_units = units.len();
    if n_units == 0 {
        return Ok(());
    }
    let n_workers = threads.clamp(1, n_units);
    let names: Vec<String> = units.iter().map(|unit| unit.name.clone()).collect();
    let mut results: Vec<Option<crate::Result<()>>> = (0..n_units).map(|_| None).collect();

    if n_workers == 1 {
        for (ix, unit) in units.into_iter().enumerate() {
            results[ix] = Some(f(unit.task));
        }
    } else {
        let (task_sender, task_receiver) = mpsc::channel();
        let (res_sender, res_receiver) = mpsc::channel();
        for (ix, unit) in units.into_iter().enumerate() {
            // Receiver is alive, send cannot fail.
            let _ = task_sender.send((ix, unit.task));
        }
        std::mem::drop(task_sender);
        let task_receiver = Mutex::new(task_receiver);

        thread::scope(|scope| {
            for _ in 0..n_workers {
                let res_sender = res_sender.clone();
                let task_receiver = &task_receiver;
                let f = &f;
                scope.spawn(move || loop {
                    // Lock is released before the task is executed.
                    let next = match task_receiver.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => break,
                    };
                    let Ok((ix, task)) = next else { break };
                    if res_sender.send((ix, f(task))).is_err() {
                        log::error!("Worker pool: main thread stopped before the worker thread.");
                        break;
                    }
                });
            }
            std::mem::drop(res_sender);
            for (ix, res) in res_receiver.iter() {
                results[ix] = Some(res);
            }
        });
    }

    let mut first_err = None;
    for (name, res) in names.iter().zip(results.into_iter()) {
        match res {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                log::error!("    Unit {} failed", name);
                if first_err.is_none() {
                    first_err = Some(e);
                } else {
                    log::error!("    {}", e.display());
                }
            }
            // Only possible if a worker thread panicked, and then `thread::scope` panics as well.
            None => log::error!("    Unit {} did not finish", name),
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::Error;

    #[test]
    fn runs_every_unit() {
        let counter = AtomicUsize::new(0);
        let units: Vec<_> = (0..50).map(|i| Unit::new(format!("u{}", i), i)).collect();
        run_units(units, 4, |i| {
            counter.fetch_add(i, Ordering::Relaxed);
            Ok(())
        }).unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), (0..50).sum::<usize>());
    }

    #[test]
    fn failure_does_not_stop_other_units() {
        let counter = AtomicUsize::new(0);
        let units: Vec<_> = (0..10).map(|i| Unit::new(format!("u{}", i), i)).collect();
        let res = run_units(units, 3, |i| {
            counter.fetch_add(1, Ordering::Relaxed);
            if i == 3 || i == 7 {
                Err(Error::InvalidData(format!("unit {}", i)))
            } else {
                Ok(())
            }
        });
        assert_eq!(counter.load(Ordering::Relaxed), 10);
        match res {
            Err(Error::InvalidData(s)) => assert_eq!(s, "unit 3"),
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn empty_and_single_thread() {
        run_units(Vec::<Unit<()>>::new(), 8, |_| Ok(())).unwrap();
        let order = Mutex::new(Vec::new());
        let units: Vec<_> = (0..5).map(|i| Unit::new(i.to_string(), i)).collect();
        run_units(units, 1, |i| {
            order.lock().unwrap().push(i);
            Ok(())
        }).unwrap();
        assert_eq!(order.into_inner().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
