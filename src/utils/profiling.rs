use std::time::{Duration, Instant};

/// Per-step timing breakdown of a sector.
#[derive(Debug, Default, Clone, Copy)]
pub struct SectorProfile {
    pub anchors_time: Duration,
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub solver_time: Duration,
    pub soft_body_time: Duration,
    pub portal_time: Duration,
    pub total_step_time: Duration,

    pub sub_steps: u32,
    pub object_count: usize,
    pub contact_count: usize,
    pub active_island_count: usize,
}

impl SectorProfile {
    /// Writes the breakdown to the `log` facade at info level.
    pub fn report(&self) {
        let total_us = self.total_step_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        let share = |d: Duration| (d.as_micros() as f32 / total_us) * 100.0;
        log::info!(
            "sector step: {:.2} ms over {} sub-steps ({} objects, {} contacts, {} islands)",
            self.total_step_time.as_secs_f32() * 1000.0,
            self.sub_steps,
            self.object_count,
            self.contact_count,
            self.active_island_count
        );
        log::info!(
            "  anchors {:.1}% | broad {:.1}% | narrow {:.1}% | solver {:.1}% | soft {:.1}% | portals {:.1}%",
            share(self.anchors_time),
            share(self.broad_phase_time),
            share(self.narrow_phase_time),
            share(self.solver_time),
            share(self.soft_body_time),
            share(self.portal_time)
        );
    }
}

/// Adds the elapsed time of its scope to a profile slot.
pub struct PhaseTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> PhaseTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
