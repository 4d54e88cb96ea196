use std::time::Duration;

use log::info;
use machine_learning::Loss;

/// What a worker did during one epoch.
#[derive(Debug, Default, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    pub rounds: usize,
    /// Lines handed to the compute tasks, malformed ones included.
    pub lines: usize,
    pub skipped: usize,
    pub loss: Loss,

    pub gather_time: Duration,
    pub compute_time: Duration,
    /// Time spent in pulls, pushes and the epoch handshake, barrier waits included.
    pub sync_time: Duration,
}

impl EpochReport {
    pub fn new(epoch: usize) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }

    #[inline]
    pub fn bump_round(&mut self) {
        self.rounds += 1;
    }

    #[inline]
    pub fn add_lines(&mut self, lines: usize, skipped: usize) {
        self.lines += lines;
        self.skipped += skipped;
    }

    pub fn log(&self, rank: usize) {
        info!(
            rank = rank,
            epoch = self.epoch,
            rounds = self.rounds,
            lines = self.lines,
            skipped = self.skipped,
            loss = self.loss.mean(),
            gather_ms = self.gather_time.as_millis() as u64,
            compute_ms = self.compute_time.as_millis() as u64,
            sync_ms = self.sync_time.as_millis() as u64;
            "epoch finished"
        );
    }
}
