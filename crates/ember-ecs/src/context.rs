//! Per-frame context handed to every system.
//!
//! Replaces ambient globals (frame delta, frame counter, RNG) with an explicit
//! value owned by whoever drives the frame loop. The RNG is a seeded PCG so
//! that a run is reproducible from its seed.

use rand::SeedableRng;
use rand_pcg::Pcg64;

/// Timing and randomness for the frame currently being simulated.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Seconds elapsed since the previous frame.
    pub dt: f32,
    /// Number of frames completed before this one.
    pub frame: u64,
    /// Total simulated seconds before this frame.
    pub elapsed: f64,
    rng: Pcg64,
}

impl FrameContext {
    /// A context for the first frame, with `dt = 0` and an RNG seeded from
    /// `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            dt: 0.0,
            frame: 0,
            elapsed: 0.0,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Builder-style setter for `dt`.
    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt = dt;
        self
    }

    /// Deterministic RNG shared by all systems within a run.
    pub fn rng(&mut self) -> &mut Pcg64 {
        &mut self.rng
    }

    /// Close the current frame: bump the counter and accumulate `dt`.
    pub fn advance(&mut self) {
        self.frame += 1;
        self.elapsed += f64::from(self.dt);
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new(0)
    }
}
