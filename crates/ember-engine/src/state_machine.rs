//! Per-entity finite-state machine component.
//!
//! A [`StateMachine`] holds named states, each with a [`StateBehavior`]
//! (enter/update/exit hooks) and an ordered list of guarded transitions.
//! Every [`update`](StateMachine::update) fires at most one transition: the
//! first registered guard of the current state that returns `true`.
//!
//! The machine is generic over the subject it drives. Inside the ECS that is
//! the owning [`Entity`] ([`EntityStateMachine`]); the
//! [`StateMachineSystem`](crate::systems::StateMachineSystem) takes the
//! machine out of its entity for the duration of the update so hooks can
//! mutate the entity freely.
//!
//! ```
//! use ember_engine::state_machine::{HookBehavior, StateMachine};
//!
//! struct Guard { distance: f32 }
//!
//! let mut machine = StateMachine::<Guard>::new("idle");
//! machine.add_state("idle", ());
//! machine.add_state("chasing", HookBehavior::new().on_enter(|m, _| {
//!     m.set_state_data("alerted", true);
//! }));
//! machine
//!     .add_transition("idle", "chasing", |_, g: &Guard, _| g.distance < 50.0)
//!     .unwrap();
//!
//! let mut guard = Guard { distance: 40.0 };
//! machine.update(0.1, &mut guard).unwrap();
//! assert_eq!(machine.current_state(), "chasing");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ember_ecs::component::Component;
use ember_ecs::entity::Entity;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Global-data keys ending in this suffix decay by `dt` every update.
///
/// A positive `Int` under such a key becomes a `Float` on its first decay.
/// An `Int` that is already zero or negative is left as is.
pub const COOLDOWN_SUFFIX: &str = "_cooldown";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by state machine configuration and updates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateMachineError {
    /// A state name was referenced that has not been registered.
    #[error("unknown state '{state}'. Registered states: [{registered}]")]
    UnknownState { state: String, registered: String },
}

// ---------------------------------------------------------------------------
// DataValue
// ---------------------------------------------------------------------------

/// A scratch value stored in per-state or global machine data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Seconds remaining; decays every update regardless of its key.
    Cooldown(f64),
}

impl DataValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of `Int`, `Float` and `Cooldown` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) | Self::Cooldown(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is a cooldown that has not yet run out. Plain numbers
    /// count as running while positive.
    pub fn is_running(&self) -> bool {
        self.as_f64().is_some_and(|v| v > 0.0)
    }

    /// Tick a decaying value down by `dt`, clamped at zero.
    fn decay(&mut self, dt: f64, by_suffix: bool) {
        match self {
            Self::Cooldown(v) => *v = (*v - dt).max(0.0),
            Self::Float(v) if by_suffix => *v = (*v - dt).max(0.0),
            Self::Int(v) if by_suffix && *v > 0 => {
                *self = Self::Float((*v as f64 - dt).max(0.0));
            }
            _ => {}
        }
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ---------------------------------------------------------------------------
// MachineState
// ---------------------------------------------------------------------------

/// The runtime state of a [`StateMachine`]: everything except its behaviors
/// and transitions.
///
/// Hooks and guards see this view. It is also what
/// [`StateMachine::snapshot`] and [`StateMachine::restore`] persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    current: String,
    previous: Option<String>,
    initialized: bool,
    locked: bool,
    enabled: bool,
    time_in_state: f32,
    state_data: BTreeMap<String, BTreeMap<String, DataValue>>,
    global_data: BTreeMap<String, DataValue>,
}

impl MachineState {
    fn new(initial: String) -> Self {
        Self {
            current: initial,
            previous: None,
            initialized: false,
            locked: false,
            enabled: true,
            time_in_state: 0.0,
            state_data: BTreeMap::new(),
            global_data: BTreeMap::new(),
        }
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    /// The state left by the most recent transition.
    pub fn previous_state(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Whether the initial enter hook has fired.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Seconds accumulated by updates since the current state was entered.
    pub fn time_in_state(&self) -> f32 {
        self.time_in_state
    }

    /// Suspend transition evaluation. Update hooks keep running.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    // -- scratch data -------------------------------------------------------

    /// Scratch value of the *current* state.
    pub fn state_data(&self, key: &str) -> Option<&DataValue> {
        self.state_data.get(&self.current)?.get(key)
    }

    pub fn set_state_data(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.state_data
            .entry(self.current.clone())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Drop every scratch value of the current state.
    pub fn clear_state_data(&mut self) {
        if let Some(data) = self.state_data.get_mut(&self.current) {
            data.clear();
        }
    }

    pub fn global_data(&self, key: &str) -> Option<&DataValue> {
        self.global_data.get(key)
    }

    pub fn set_global_data(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.global_data.insert(key.into(), value.into());
    }

    pub fn remove_global_data(&mut self, key: &str) -> Option<DataValue> {
        self.global_data.remove(key)
    }

    fn decay_cooldowns(&mut self, dt: f32) {
        let dt = f64::from(dt);
        for (key, value) in &mut self.global_data {
            value.decay(dt, key.ends_with(COOLDOWN_SUFFIX));
        }
    }
}

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

/// Hooks run by a state. All three default to no-ops.
pub trait StateBehavior<C>: Send + Sync {
    fn enter(&mut self, _machine: &mut MachineState, _subject: &mut C) {}

    fn update(&mut self, _machine: &mut MachineState, _subject: &mut C, _dt: f32) {}

    fn exit(&mut self, _machine: &mut MachineState, _subject: &mut C) {}
}

/// A state with no hooks.
impl<C> StateBehavior<C> for () {}

type Hook<C> = Box<dyn FnMut(&mut MachineState, &mut C) + Send + Sync>;
type UpdateHook<C> = Box<dyn FnMut(&mut MachineState, &mut C, f32) + Send + Sync>;

/// A [`StateBehavior`] assembled from closures.
pub struct HookBehavior<C> {
    enter: Option<Hook<C>>,
    update: Option<UpdateHook<C>>,
    exit: Option<Hook<C>>,
}

impl<C> HookBehavior<C> {
    pub fn new() -> Self {
        Self {
            enter: None,
            update: None,
            exit: None,
        }
    }

    pub fn on_enter(
        mut self,
        hook: impl FnMut(&mut MachineState, &mut C) + Send + Sync + 'static,
    ) -> Self {
        self.enter = Some(Box::new(hook));
        self
    }

    pub fn on_update(
        mut self,
        hook: impl FnMut(&mut MachineState, &mut C, f32) + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Box::new(hook));
        self
    }

    pub fn on_exit(
        mut self,
        hook: impl FnMut(&mut MachineState, &mut C) + Send + Sync + 'static,
    ) -> Self {
        self.exit = Some(Box::new(hook));
        self
    }
}

impl<C> Default for HookBehavior<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> StateBehavior<C> for HookBehavior<C> {
    fn enter(&mut self, machine: &mut MachineState, subject: &mut C) {
        if let Some(hook) = &mut self.enter {
            hook(machine, subject);
        }
    }

    fn update(&mut self, machine: &mut MachineState, subject: &mut C, dt: f32) {
        if let Some(hook) = &mut self.update {
            hook(machine, subject, dt);
        }
    }

    fn exit(&mut self, machine: &mut MachineState, subject: &mut C) {
        if let Some(hook) = &mut self.exit {
            hook(machine, subject);
        }
    }
}

/// Strategy that names the state a subject should be in.
///
/// Installed with [`StateMachine::with_desired_state_provider`], it replaces
/// hand-written transition tables: every state gets a transition to every
/// other state, guarded by "the provider wants that state".
pub trait DesiredStateProvider<C>: Send + Sync {
    /// The wanted state, or `None` to stay put.
    fn desired_state(&self, machine: &MachineState, subject: &C) -> Option<String>;
}

// ---------------------------------------------------------------------------
// StateMachine
// ---------------------------------------------------------------------------

/// Transition guard: `(machine, subject, dt) -> fire?`
pub type Predicate<C> = Box<dyn Fn(&MachineState, &C, f32) -> bool + Send + Sync>;

struct Transition<C> {
    target: String,
    predicate: Predicate<C>,
    /// Generated from the desired-state provider.
    generated: bool,
}

struct StateEntry<C> {
    behavior: Box<dyn StateBehavior<C>>,
    transitions: Vec<Transition<C>>,
}

/// A finite-state machine driving a subject of type `C`.
pub struct StateMachine<C: 'static = Entity> {
    states: BTreeMap<String, StateEntry<C>>,
    state: MachineState,
    provider: Option<Arc<dyn DesiredStateProvider<C>>>,
}

/// The machine used as an ECS component.
pub type EntityStateMachine = StateMachine<Entity>;

impl<C: 'static> Component for StateMachine<C> {
    const NAME: &'static str = "StateMachine";
}

impl<C: 'static> StateMachine<C> {
    /// Create a machine that starts in `initial`.
    ///
    /// `initial` must be registered with [`add_state`](Self::add_state)
    /// before the first update.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            states: BTreeMap::new(),
            state: MachineState::new(initial.into()),
            provider: None,
        }
    }

    /// Drive transitions from a [`DesiredStateProvider`].
    ///
    /// Generates provider transitions between every pair of registered
    /// states, and keeps doing so for states added later.
    pub fn with_desired_state_provider(
        mut self,
        provider: impl DesiredStateProvider<C> + 'static,
    ) -> Self {
        let provider: Arc<dyn DesiredStateProvider<C>> = Arc::new(provider);
        self.provider = Some(Arc::clone(&provider));
        let names: Vec<String> = self.states.keys().cloned().collect();
        for from in &names {
            for to in names.iter().filter(|to| *to != from) {
                self.push_provider_transition(&provider, from, to);
            }
        }
        self
    }

    fn push_provider_transition(
        &mut self,
        provider: &Arc<dyn DesiredStateProvider<C>>,
        from: &str,
        to: &str,
    ) {
        let provider = Arc::clone(provider);
        let target = to.to_owned();
        let wanted = target.clone();
        if let Some(entry) = self.states.get_mut(from) {
            entry.transitions.push(Transition {
                target,
                predicate: Box::new(move |machine, subject, _dt| {
                    provider.desired_state(machine, subject).as_deref() == Some(wanted.as_str())
                }),
                generated: true,
            });
        }
    }

    /// Register a state. Re-adding a name replaces its behavior and drops its
    /// transitions; its scratch data is kept.
    pub fn add_state(&mut self, name: impl Into<String>, behavior: impl StateBehavior<C> + 'static) {
        let name = name.into();
        self.state.state_data.entry(name.clone()).or_default();
        self.states.insert(
            name.clone(),
            StateEntry {
                behavior: Box::new(behavior),
                transitions: Vec::new(),
            },
        );

        if let Some(provider) = self.provider.clone() {
            for (_, entry) in self.states.iter_mut().filter(|(s, _)| **s != name) {
                entry
                    .transitions
                    .retain(|t| !(t.generated && t.target == name));
            }
            let others: Vec<String> = self.states.keys().filter(|s| **s != name).cloned().collect();
            for other in &others {
                self.push_provider_transition(&provider, &name, other);
                self.push_provider_transition(&provider, other, &name);
            }
        }
        trace!(state = %name, "state registered");
    }

    /// Add a guarded transition. Guards of one state are evaluated in
    /// registration order.
    pub fn add_transition(
        &mut self,
        from: &str,
        to: &str,
        predicate: impl Fn(&MachineState, &C, f32) -> bool + Send + Sync + 'static,
    ) -> Result<(), StateMachineError> {
        self.ensure_state(to)?;
        self.ensure_state(from)?;
        if let Some(entry) = self.states.get_mut(from) {
            entry.transitions.push(Transition {
                target: to.to_owned(),
                predicate: Box::new(predicate),
                generated: false,
            });
        }
        Ok(())
    }

    fn ensure_state(&self, name: &str) -> Result<(), StateMachineError> {
        if self.states.contains_key(name) {
            Ok(())
        } else {
            Err(StateMachineError::UnknownState {
                state: name.to_owned(),
                registered: self.state_names().join(", "),
            })
        }
    }

    /// Switch to `name`, running the old state's exit hook and the new
    /// state's enter hook. A no-op if `name` is already current.
    ///
    /// Called before the first update, the initial state's enter hook is
    /// skipped along with its exit hook, since it was never entered.
    pub fn change_state(&mut self, name: &str, subject: &mut C) -> Result<(), StateMachineError> {
        self.ensure_state(name)?;
        if self.state.current == name {
            return Ok(());
        }

        if self.state.initialized {
            if let Some(entry) = self.states.get_mut(&self.state.current) {
                entry.behavior.exit(&mut self.state, subject);
            }
        }
        let previous = std::mem::replace(&mut self.state.current, name.to_owned());
        debug!(from = %previous, to = %name, "state changed");
        self.state.previous = Some(previous);
        self.state.time_in_state = 0.0;
        self.state.initialized = true;

        if let Some(entry) = self.states.get_mut(name) {
            entry.behavior.enter(&mut self.state, subject);
        }
        Ok(())
    }

    /// Advance the machine by `dt` seconds.
    ///
    /// Does nothing while disabled. The first call enters the initial state.
    /// Cooldowns decay, then (unless locked) the first transition whose guard
    /// holds fires, then the current state's update hook runs once.
    pub fn update(&mut self, dt: f32, subject: &mut C) -> Result<(), StateMachineError> {
        if !self.state.enabled {
            return Ok(());
        }
        self.ensure_state(&self.state.current)?;

        if !self.state.initialized {
            self.state.initialized = true;
            if let Some(entry) = self.states.get_mut(&self.state.current) {
                entry.behavior.enter(&mut self.state, subject);
            }
        }

        self.state.decay_cooldowns(dt);

        if !self.state.locked {
            let fired = self.states.get(&self.state.current).and_then(|entry| {
                entry
                    .transitions
                    .iter()
                    .find(|t| (t.predicate)(&self.state, subject, dt))
                    .map(|t| t.target.clone())
            });
            if let Some(target) = fired {
                self.change_state(&target, subject)?;
            }
        }

        self.state.time_in_state += dt;
        if let Some(entry) = self.states.get_mut(&self.state.current) {
            entry.behavior.update(&mut self.state, subject, dt);
        }
        Ok(())
    }

    // -- gates --------------------------------------------------------------

    pub fn lock(&mut self) {
        self.state.lock();
    }

    pub fn unlock(&mut self) {
        self.state.unlock();
    }

    pub fn is_locked(&self) -> bool {
        self.state.locked
    }

    /// Resume updates.
    pub fn enable(&mut self) {
        self.state.enabled = true;
    }

    /// Make [`update`](Self::update) a no-op until re-enabled.
    pub fn disable(&mut self) {
        self.state.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    // -- read API -----------------------------------------------------------

    pub fn current_state(&self) -> &str {
        self.state.current_state()
    }

    pub fn previous_state(&self) -> Option<&str> {
        self.state.previous_state()
    }

    pub fn time_in_state(&self) -> f32 {
        self.state.time_in_state
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Registered state names, sorted.
    pub fn state_names(&self) -> Vec<&str> {
        self.states.keys().map(String::as_str).collect()
    }

    /// Number of transitions leaving `state` (0 for unknown states).
    pub fn transition_count(&self, state: &str) -> usize {
        self.states.get(state).map_or(0, |e| e.transitions.len())
    }

    /// Runtime state view shared with hooks and guards.
    pub fn machine_state(&self) -> &MachineState {
        &self.state
    }

    // -- scratch data -------------------------------------------------------

    pub fn state_data(&self, key: &str) -> Option<&DataValue> {
        self.state.state_data(key)
    }

    pub fn set_state_data(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.state.set_state_data(key, value);
    }

    pub fn clear_state_data(&mut self) {
        self.state.clear_state_data();
    }

    pub fn global_data(&self, key: &str) -> Option<&DataValue> {
        self.state.global_data(key)
    }

    pub fn set_global_data(&mut self, key: impl Into<String>, value: impl Into<DataValue>) {
        self.state.set_global_data(key, value);
    }

    // -- persistence --------------------------------------------------------

    /// Copy of the runtime state, suitable for serialization.
    pub fn snapshot(&self) -> MachineState {
        self.state.clone()
    }

    /// Replace the runtime state with a snapshot.
    ///
    /// Behaviors and transitions are code and stay as registered; the
    /// snapshot's current state must be one of them.
    pub fn restore(&mut self, snapshot: MachineState) -> Result<(), StateMachineError> {
        self.ensure_state(&snapshot.current)?;
        self.state = snapshot;
        Ok(())
    }
}

impl<C: 'static> fmt::Debug for StateMachine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("states", &self.state_names())
            .field("current", &self.state.current)
            .field("locked", &self.state.locked)
            .field("enabled", &self.state.enabled)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
