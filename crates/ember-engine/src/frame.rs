//! Fixed-timestep frame loop.
//!
//! The [`FrameLoop`] owns a [`World`] and the [`FrameContext`] handed to its
//! systems. Each frame:
//!
//! 1. Every system's `update` runs in registration order with `dt = fixed_dt`.
//! 2. Every system's `draw` runs (sorted by draw order if configured).
//! 3. The frame counter and simulated time advance.
//!
//! Systems run in a fixed order, `dt` is constant and randomness comes from
//! the context's seeded RNG. Two loops over worlds restored from the same
//! snapshot, with the same seed, produce the same
//! [`state_hash`](FrameLoop::state_hash) sequence. Worlds built from scratch
//! allocate fresh entity ids, so their hashes differ even when their
//! contents match.
//!
//! # Example
//!
//! ```
//! use ember_engine::frame::{FrameConfig, FrameLoop};
//! use ember_engine::systems::{Lifetime, LifetimeSystem};
//! use ember_ecs::prelude::*;
//!
//! let mut world = World::new();
//! world.add_system(LifetimeSystem);
//! let spark = world.add_entity(Entity::new().with(Lifetime::new(0.05)));
//!
//! let mut frames = FrameLoop::new(world, FrameConfig::default());
//! frames.run_frames(10);
//!
//! assert_eq!(frames.frame_count(), 10);
//! assert!(!frames.world().contains(spark));
//! ```

use std::time::{Duration, Instant};

use ember_ecs::prelude::*;
use serde::Deserialize;
use tracing::debug;

// ---------------------------------------------------------------------------
// FrameConfig
// ---------------------------------------------------------------------------

/// Errors raised while loading a [`FrameConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("fixed_dt must be positive and finite, got {0}")]
    InvalidTimestep(f32),
}

/// Configuration for the frame loop.
///
/// Every field is optional in JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Seconds simulated per frame. Must be positive and finite.
    pub fixed_dt: f32,
    /// Seed of the frame context's RNG.
    pub seed: u64,
    /// Sort the draw pass by each system's draw order.
    pub sort_draw: bool,
}

impl Default for FrameConfig {
    /// 60 Hz, seed 0, registration-order drawing.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            seed: 0,
            sort_draw: false,
        }
    }
}

impl FrameConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fixed_dt > 0.0 && self.fixed_dt.is_finite() {
            Ok(())
        } else {
            Err(ConfigError::InvalidTimestep(self.fixed_dt))
        }
    }
}

// ---------------------------------------------------------------------------
// FrameDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDiagnostics {
    /// Wall-clock time of the update pass.
    pub update_time: Duration,
    /// Wall-clock time of the draw pass.
    pub draw_time: Duration,
    /// Total time for the frame.
    pub total_time: Duration,
    /// Entities alive at the end of the frame.
    pub entity_count: usize,
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// The deterministic fixed-timestep frame loop.
pub struct FrameLoop {
    world: World,
    context: FrameContext,
    config: FrameConfig,
    last_diagnostics: FrameDiagnostics,
}

impl FrameLoop {
    /// Create a frame loop over `world`.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(mut world: World, config: FrameConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        world.set_draw_sorting(config.sort_draw);
        let context = FrameContext::new(config.seed).with_dt(config.fixed_dt);
        debug!(
            fixed_dt = config.fixed_dt,
            seed = config.seed,
            sort_draw = config.sort_draw,
            "frame loop created"
        );
        Self {
            world,
            context,
            config,
            last_diagnostics: FrameDiagnostics::default(),
        }
    }

    /// Register a system with the owned world.
    pub fn add_system(&mut self, system: impl System + 'static) -> SystemId {
        self.world.add_system(system)
    }

    /// Run one update pass and one draw pass.
    pub fn frame(&mut self) -> &FrameDiagnostics {
        let frame_start = Instant::now();

        self.context.dt = self.config.fixed_dt;
        self.world.update(&mut self.context);
        let update_time = frame_start.elapsed();

        let draw_start = Instant::now();
        self.world.draw();
        let draw_time = draw_start.elapsed();

        self.context.advance();

        self.last_diagnostics = FrameDiagnostics {
            update_time,
            draw_time,
            total_time: frame_start.elapsed(),
            entity_count: self.world.entity_count(),
        };
        &self.last_diagnostics
    }

    /// Run `count` frames in sequence.
    pub fn run_frames(&mut self, count: u64) {
        for _ in 0..count {
            self.frame();
        }
    }

    // -- accessors ----------------------------------------------------------

    /// The number of frames executed so far.
    pub fn frame_count(&self) -> u64 {
        self.context.frame
    }

    /// Simulated seconds, computed as `frame_count * fixed_dt` to avoid
    /// drift from repeated addition.
    pub fn sim_time(&self) -> f64 {
        self.context.frame as f64 * f64::from(self.config.fixed_dt)
    }

    pub fn fixed_dt(&self) -> f32 {
        self.config.fixed_dt
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access for setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The context the next frame will run with.
    pub fn context_mut(&mut self) -> &mut FrameContext {
        &mut self.context
    }

    pub fn last_diagnostics(&self) -> &FrameDiagnostics {
        &self.last_diagnostics
    }

    /// BLAKE3 digest of the world's reflectable state.
    pub fn state_hash(&self) -> String {
        self.world.capture_snapshot().hash()
    }

    /// Give the world back, ending the loop.
    pub fn into_world(self) -> World {
        self.world
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("frame", &self.context.frame)
            .field("config", &self.config)
            .field("world", &self.world)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Counter(u64);
    ember_ecs::serde_component!(Counter, "Counter");

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Noise(u32);
    ember_ecs::serde_component!(Noise, "Noise");

    struct Count;
    impl System for Count {
        fn name(&self) -> &str {
            "count"
        }
        fn requires(&self) -> Vec<ComponentKind> {
            vec![ComponentKind::of::<Counter>()]
        }
        fn update(&mut self, world: &mut World, entities: &[EntityId], _: &mut FrameContext) {
            for &id in entities {
                if let Some(c) = world.get_component_mut::<Counter>(id) {
                    c.0 += 1;
                }
            }
        }
    }

    struct Roll;
    impl System for Roll {
        fn name(&self) -> &str {
            "roll"
        }
        fn requires(&self) -> Vec<ComponentKind> {
            vec![ComponentKind::of::<Noise>()]
        }
        fn update(&mut self, world: &mut World, entities: &[EntityId], frame: &mut FrameContext) {
            for &id in entities {
                let roll = frame.rng().gen::<u32>();
                if let Some(n) = world.get_component_mut::<Noise>(id) {
                    n.0 = roll;
                }
            }
        }
    }

    #[test]
    fn new_loop_starts_at_zero() {
        let frames = FrameLoop::new(World::new(), FrameConfig::default());
        assert_eq!(frames.frame_count(), 0);
        assert_eq!(frames.sim_time(), 0.0);
        assert!((frames.fixed_dt() - 1.0 / 60.0).abs() < f32::EPSILON);
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive")]
    fn zero_dt_panics() {
        let _ = FrameLoop::new(
            World::new(),
            FrameConfig {
                fixed_dt: 0.0,
                ..Default::default()
            },
        );
    }

    #[test]
    fn frames_run_systems_and_advance_time() {
        let mut world = World::new();
        let id = world.add_entity(Entity::new().with(Counter(0)));
        let mut frames = FrameLoop::new(
            world,
            FrameConfig {
                fixed_dt: 0.5,
                ..Default::default()
            },
        );
        frames.add_system(Count);
        frames.run_frames(4);
        assert_eq!(frames.world().get_component::<Counter>(id), Some(&Counter(4)));
        assert_eq!(frames.frame_count(), 4);
        assert_eq!(frames.sim_time(), 2.0);
        assert_eq!(frames.last_diagnostics().entity_count, 1);
    }

    #[test]
    fn same_seed_same_hashes() {
        fn run(seed: u64) -> Vec<String> {
            let mut world = World::new();
            world.add_system(Roll);
            for _ in 0..3 {
                world.add_entity(Entity::new().with(Noise(0)));
            }
            let mut frames = FrameLoop::new(
                world,
                FrameConfig {
                    seed,
                    ..Default::default()
                },
            );
            (0..5)
                .map(|_| {
                    frames.frame();
                    frames.state_hash()
                })
                .collect()
        }

        // Entity ids differ between runs, so compare the component data only.
        let noise = |seed| {
            let mut world = World::new();
            world.add_system(Roll);
            let id = world.add_entity(Entity::new().with(Noise(0)));
            let mut frames = FrameLoop::new(world, FrameConfig { seed, ..Default::default() });
            frames.run_frames(3);
            frames.world().get_component::<Noise>(id).cloned()
        };
        assert_eq!(noise(9), noise(9));
        assert_ne!(noise(9), noise(10));

        let hashes = run(1);
        assert_eq!(hashes.len(), 5);
        assert_ne!(hashes[0], hashes[1]);
    }

    #[test]
    fn config_from_json() {
        let config = FrameConfig::from_json_str(r#"{ "fixed_dt": 0.02, "sort_draw": true }"#)
            .unwrap();
        assert_eq!(config.fixed_dt, 0.02);
        assert_eq!(config.seed, 0);
        assert!(config.sort_draw);

        assert!(matches!(
            FrameConfig::from_json_str(r#"{ "fixed_dt": -1.0 }"#),
            Err(ConfigError::InvalidTimestep(_))
        ));
        assert!(matches!(
            FrameConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
