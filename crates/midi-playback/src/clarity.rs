use crate::compile::PlaybackCommand;
use std::collections::HashMap;

/// Parameters for the legacy clarity pass.
#[derive(Debug, Clone)]
pub struct ClarityParams {
    /// Occupancy threshold per tick.
    pub max_polyphony: usize,
    /// How many ticks forward a note may shift before it is dropped.
    pub max_shift_ticks: u32,
}

impl Default for ClarityParams {
    fn default() -> Self {
        ClarityParams {
            max_polyphony: 5,
            max_shift_ticks: 2,
        }
    }
}

/// Redistribute an already-compiled sequence so no tick exceeds the clarity
/// threshold. Loudest notes place first; each takes the first tick in
/// tick..=tick + max_shift_ticks with room, and a note that fits nowhere in
/// its window is dropped rather than deferred further. The result is
/// re-sorted ascending by tick, so within a tick notes run loudest first.
pub fn reschedule_for_clarity(
    commands: &[PlaybackCommand],
    params: &ClarityParams,
) -> Vec<PlaybackCommand> {
    let mut notes: Vec<PlaybackCommand> = commands.to_vec();
    notes.sort_by(|a, b| b.velocity.total_cmp(&a.velocity));

    let mut occupancy: HashMap<u32, usize> = HashMap::new();
    let mut rescheduled: Vec<PlaybackCommand> = Vec::with_capacity(notes.len());

    for mut note in notes {
        let mut placed = false;
        for offset in 0..=params.max_shift_ticks {
            let target = note.tick + offset;
            let used = occupancy.entry(target).or_insert(0);
            if *used < params.max_polyphony {
                *used += 1;
                note.tick = target;
                placed = true;
                break;
            }
        }
        if placed {
            rescheduled.push(note);
        }
    }

    rescheduled.sort_by(|a, b| a.tick.cmp(&b.tick));
    rescheduled
}
