use std::{io, num::NonZeroUsize};

use parking_lot::Mutex;

use super::LineSource;

struct WindowState<'s, R> {
    source: &'s mut LineSource<R>,
    /// Slots left, `None` means the whole remaining input.
    budget: Option<usize>,
    taken: usize,
    eof: bool,
}

/// Hands out contiguous chunks of lines from a shared source to many tasks.
///
/// Each line consumes `cost` slots of the budget, a line is handed out as long as
/// any slot is left.
pub struct Window<'s, R> {
    state: Mutex<WindowState<'s, R>>,
    cost: usize,
    chunk: usize,
}

impl<'s, R: io::BufRead + io::Seek> Window<'s, R> {
    /// Creates a new `Window`.
    ///
    /// # Arguments
    /// * `source` - The lines to distribute, starting at its current position.
    /// * `budget` - The amount of slots, unlimited if `None`.
    /// * `cost` - The slots consumed per line.
    /// * `chunk` - The maximum amount of lines per call to `next_chunk`.
    pub fn new(
        source: &'s mut LineSource<R>,
        budget: Option<usize>,
        cost: NonZeroUsize,
        chunk: NonZeroUsize,
    ) -> Self {
        Self {
            state: Mutex::new(WindowState {
                source,
                budget,
                taken: 0,
                eof: false,
            }),
            cost: cost.get(),
            chunk: chunk.get(),
        }
    }

    /// Replaces the content of `out` with the next chunk of lines.
    ///
    /// # Returns
    /// `false` once the window or the input is exhausted.
    pub fn next_chunk(&self, out: &mut Vec<String>) -> io::Result<bool> {
        out.clear();
        let mut state = self.state.lock();

        while out.len() < self.chunk && !state.eof {
            if state.budget == Some(0) {
                break;
            }

            let Some(line) = state.source.read_line()? else {
                state.eof = true;
                break;
            };

            if let Some(budget) = &mut state.budget {
                *budget = budget.saturating_sub(self.cost);
            }
            state.taken += 1;
            out.push(line);
        }

        Ok(!out.is_empty())
    }

    /// The amount of lines handed out so far.
    pub fn taken(&self) -> usize {
        self.state.lock().taken
    }

    /// Whether the end of the input was reached.
    pub fn hit_eof(&self) -> bool {
        self.state.lock().eof
    }
}
