use std::time::{Duration, Instant};

use log::debug;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{Result, SyncErr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Takes part in the rounds, ranks not joined yet count as such.
    Rounds,
    /// Finished its epoch and waits for the rest.
    EpochDone,
    Left,
}

/// A reusable barrier whose amount of parties may shrink while it's waited on.
#[derive(Debug, Default)]
struct Phase {
    arrived: usize,
    generation: u64,
}

#[derive(Debug)]
struct State {
    status: Vec<Status>,
    next_rank: usize,
    round: Phase,
    epoch: Phase,
}

impl State {
    fn count(&self, f: impl Fn(Status) -> bool) -> usize {
        self.status.iter().filter(|&&s| f(s)).count()
    }

    fn round_parties(&self) -> usize {
        self.count(|s| s == Status::Rounds)
    }

    fn epoch_parties(&self) -> usize {
        self.count(|s| s != Status::Left)
    }

    fn check(&self, rank: usize) -> Result<Status> {
        match self.status.get(rank) {
            Some(Status::Left) | None => Err(SyncErr::Detached { rank }),
            Some(&status) => Ok(status),
        }
    }

    /// Releases the round barrier if every remaining party arrived.
    fn try_release_round(&mut self) -> bool {
        let parties = self.round_parties();
        let round = &mut self.round;

        if round.arrived == 0 || round.arrived < parties {
            return false;
        }

        round.arrived = 0;
        round.generation += 1;
        true
    }

    /// Releases the epoch barrier if every remaining party arrived, putting them back
    /// into the rounds.
    fn try_release_epoch(&mut self) -> bool {
        let parties = self.epoch_parties();
        let epoch = &mut self.epoch;

        if epoch.arrived == 0 || epoch.arrived < parties {
            return false;
        }

        epoch.arrived = 0;
        epoch.generation += 1;
        self.status
            .iter_mut()
            .filter(|s| **s == Status::EpochDone)
            .for_each(|s| *s = Status::Rounds);
        true
    }
}

/// The fixed set of workers training against a server.
///
/// Each round has two barrier waits, one after the pull and one after the push, so
/// nobody pulls round `n + 1` before every push of round `n` was applied. A worker
/// that runs out of data calls `epoch_done`, which takes it out of the rounds until
/// every other worker did the same, and one that aborts calls `leave`.
#[derive(Debug)]
pub struct Cohort {
    workers: usize,
    timeout: Option<Duration>,
    state: Mutex<State>,
    cvar: Condvar,
}

impl Cohort {
    /// Creates a new `Cohort`.
    ///
    /// # Arguments
    /// * `workers` - The amount of workers agreed at startup.
    /// * `timeout` - Upper bound for a barrier wait, forever if `None`.
    pub fn new(workers: usize, timeout: Option<Duration>) -> Self {
        Self {
            workers,
            timeout,
            state: Mutex::new(State {
                status: vec![Status::Rounds; workers],
                next_rank: 0,
                round: Phase::default(),
                epoch: Phase::default(),
            }),
            cvar: Condvar::new(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Hands out the next rank.
    ///
    /// # Returns
    /// A `SyncErr::Full` if all the ranks were taken.
    pub fn join(&self) -> Result<usize> {
        let mut state = self.state.lock();
        if state.next_rank >= self.workers {
            return Err(SyncErr::Full {
                workers: self.workers,
            });
        }

        let rank = state.next_rank;
        state.next_rank += 1;
        Ok(rank)
    }

    /// Waits until every worker still in the rounds arrives.
    ///
    /// # Arguments
    /// * `rank` - The arriving worker.
    ///
    /// # Returns
    /// A `SyncErr::Detached` if `rank` isn't taking part in the rounds, or a
    /// `SyncErr::Timeout` if the wait expired.
    pub fn round_wait(&self, rank: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.check(rank)? != Status::Rounds {
            return Err(SyncErr::Detached { rank });
        }

        let generation = state.round.generation;
        state.round.arrived += 1;

        if state.try_release_round() {
            self.cvar.notify_all();
            return Ok(());
        }

        let waited = self.wait_for(&mut state, |s| {
            s.round.generation != generation || s.status[rank] == Status::Left
        });
        if let Err(e) = waited {
            state.round.arrived -= 1;
            return Err(e);
        }

        match state.status[rank] {
            Status::Left => Err(SyncErr::Detached { rank }),
            _ => Ok(()),
        }
    }

    /// Takes `rank` out of the rounds and waits until every worker of the cohort
    /// finished its epoch.
    ///
    /// # Arguments
    /// * `rank` - The worker that ran out of data.
    pub fn epoch_done(&self, rank: usize) -> Result<()> {
        self.finish_epoch(rank)?;
        self.await_epoch(rank)
    }

    /// The first half of `epoch_done`, takes `rank` out of the rounds without waiting.
    ///
    /// A worker talking to many servers must finish its epoch on all of them before
    /// waiting on any, otherwise the others may block on a round it won't join.
    pub fn finish_epoch(&self, rank: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.check(rank)? == Status::EpochDone {
            return Ok(());
        }

        state.status[rank] = Status::EpochDone;
        state.epoch.arrived += 1;

        let released = state.try_release_round() | state.try_release_epoch();
        if released {
            self.cvar.notify_all();
        }

        Ok(())
    }

    /// The second half of `epoch_done`, waits until the epoch barrier releases `rank`.
    pub fn await_epoch(&self, rank: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.check(rank)?;

        let waited = self.wait_for(&mut state, |s| s.status[rank] != Status::EpochDone);
        if let Err(e) = waited {
            state.epoch.arrived -= 1;
            state.status[rank] = Status::Rounds;
            return Err(e);
        }

        match state.status[rank] {
            Status::Left => Err(SyncErr::Detached { rank }),
            _ => {
                debug!(rank = rank; "epoch barrier released");
                Ok(())
            }
        }
    }

    /// Removes `rank` from the cohort for good, the barriers stop waiting for it.
    ///
    /// Leaving twice is a no-op.
    pub fn leave(&self, rank: usize) {
        let mut state = self.state.lock();
        let Ok(status) = state.check(rank) else {
            return;
        };

        if status == Status::EpochDone {
            state.epoch.arrived -= 1;
        }
        state.status[rank] = Status::Left;

        state.try_release_round();
        state.try_release_epoch();
        self.cvar.notify_all();

        debug!(rank = rank; "worker left the cohort");
    }

    /// Detaches every worker at once, joined or not, waking whoever is blocked on a
    /// barrier with a `SyncErr::Detached`.
    pub fn dissolve(&self) {
        let mut state = self.state.lock();
        state.status.fill(Status::Left);
        state.next_rank = self.workers;
        state.round.arrived = 0;
        state.epoch.arrived = 0;
        self.cvar.notify_all();

        debug!("cohort dissolved");
    }

    /// Blocks on the condition variable until `done` holds.
    fn wait_for(
        &self,
        state: &mut MutexGuard<'_, State>,
        done: impl Fn(&State) -> bool,
    ) -> Result<()> {
        let Some(timeout) = self.timeout else {
            while !done(state) {
                self.cvar.wait(state);
            }
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        while !done(state) {
            if self.cvar.wait_until(state, deadline).timed_out() && !done(state) {
                return Err(SyncErr::Timeout { waited: timeout });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use super::*;

    fn cohort(workers: usize) -> Arc<Cohort> {
        Arc::new(Cohort::new(workers, Some(Duration::from_secs(5))))
    }

    #[test]
    fn ranks_are_handed_out_in_order() {
        let cohort = cohort(2);
        assert_eq!(cohort.join(), Ok(0));
        assert_eq!(cohort.join(), Ok(1));
        assert_eq!(cohort.join(), Err(SyncErr::Full { workers: 2 }));
    }

    #[test]
    fn single_worker_never_blocks() {
        let cohort = cohort(1);
        let rank = cohort.join().unwrap();

        cohort.round_wait(rank).unwrap();
        cohort.round_wait(rank).unwrap();
        cohort.epoch_done(rank).unwrap();
        cohort.round_wait(rank).unwrap();
    }

    #[test]
    fn round_waits_for_everyone() {
        const WORKERS: usize = 4;
        const ROUNDS: usize = 50;

        let cohort = cohort(WORKERS);
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let cohort = Arc::clone(&cohort);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let rank = cohort.join().unwrap();
                    for round in 0..ROUNDS {
                        counter.fetch_add(1, Ordering::SeqCst);
                        cohort.round_wait(rank).unwrap();
                        // nobody can be ahead before everyone arrived
                        assert!(counter.load(Ordering::SeqCst) >= (round + 1) * WORKERS);
                        cohort.round_wait(rank).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn epoch_done_releases_pending_rounds() {
        let cohort = cohort(2);
        let fast = cohort.join().unwrap();
        let slow = cohort.join().unwrap();

        let handle = {
            let cohort = Arc::clone(&cohort);
            thread::spawn(move || {
                cohort.round_wait(slow).unwrap();
                cohort.round_wait(slow).unwrap();
                cohort.round_wait(slow).unwrap();
                cohort.epoch_done(slow).unwrap();
            })
        };

        cohort.round_wait(fast).unwrap();
        cohort.epoch_done(fast).unwrap();
        handle.join().unwrap();

        // both are back in the rounds for the next epoch
        let handle = {
            let cohort = Arc::clone(&cohort);
            thread::spawn(move || cohort.round_wait(slow))
        };
        cohort.round_wait(fast).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn two_phase_epoch_across_servers() {
        let servers = [cohort(2), cohort(2)];
        let done = [servers[0].join().unwrap(), servers[1].join().unwrap()];
        let busy = [servers[0].join().unwrap(), servers[1].join().unwrap()];

        let handle = {
            let servers = servers.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    for (server, &rank) in servers.iter().zip(&busy) {
                        server.round_wait(rank).unwrap();
                    }
                }
                for (server, &rank) in servers.iter().zip(&busy) {
                    server.finish_epoch(rank).unwrap();
                }
                for (server, &rank) in servers.iter().zip(&busy) {
                    server.await_epoch(rank).unwrap();
                }
            })
        };

        for (server, &rank) in servers.iter().zip(&done) {
            server.finish_epoch(rank).unwrap();
        }
        for (server, &rank) in servers.iter().zip(&done) {
            server.await_epoch(rank).unwrap();
        }

        handle.join().unwrap();
    }

    #[test]
    fn leave_unblocks_the_rest() {
        let cohort = cohort(2);
        let stays = cohort.join().unwrap();
        let goes = cohort.join().unwrap();

        let handle = {
            let cohort = Arc::clone(&cohort);
            thread::spawn(move || cohort.round_wait(stays))
        };

        cohort.leave(goes);
        cohort.leave(goes);
        handle.join().unwrap().unwrap();

        assert_eq!(cohort.round_wait(goes), Err(SyncErr::Detached { rank: goes }));
        cohort.epoch_done(stays).unwrap();
    }

    #[test]
    fn dissolve_wakes_every_waiter() {
        let cohort = cohort(3);
        let in_round = cohort.join().unwrap();
        let in_epoch = cohort.join().unwrap();

        let handles = [
            {
                let cohort = Arc::clone(&cohort);
                thread::spawn(move || cohort.round_wait(in_round))
            },
            {
                let cohort = Arc::clone(&cohort);
                thread::spawn(move || cohort.epoch_done(in_epoch))
            },
        ];

        thread::sleep(Duration::from_millis(50));
        cohort.dissolve();

        for (handle, rank) in handles.into_iter().zip([in_round, in_epoch]) {
            assert_eq!(handle.join().unwrap(), Err(SyncErr::Detached { rank }));
        }
        assert_eq!(cohort.join(), Err(SyncErr::Full { workers: 3 }));
    }

    #[test]
    fn timeout_withdraws_the_arrival() {
        let cohort = Cohort::new(2, Some(Duration::from_millis(20)));
        let rank = cohort.join().unwrap();

        let err = cohort.round_wait(rank).unwrap_err();
        assert_eq!(
            err,
            SyncErr::Timeout {
                waited: Duration::from_millis(20)
            }
        );
        assert_eq!(cohort.state.lock().round.arrived, 0);
    }

    #[test]
    fn unknown_rank_is_detached() {
        let cohort = cohort(1);
        assert_eq!(cohort.round_wait(3), Err(SyncErr::Detached { rank: 3 }));
    }
}
