use std::collections::HashMap;

use indexmap::IndexSet;

use super::builtins::{NO_ANIMATION, POST_STATE, WELL_KNOWN_DESCRIPTORS};
use super::error::Diagnostic;
use super::graph::{ActionArena, State, StateId};
use super::text::TextPools;
use crate::config::CompileOptions;

/// Everything the compiler accumulates for one sheet. Phases read and extend
/// it in order; codegen and validation only read it.
#[derive(Debug, Clone)]
pub struct CompilerContext {
    pub options: CompileOptions,
    /// Indexed by [`StateId`]; POST is always slot 0.
    pub states: Vec<State>,
    state_index: HashMap<String, StateId>,
    pub actions: ActionArena,
    pub text: TextPools,
    /// Descriptor table; the well-known names come first.
    pub descriptors: IndexSet<String>,
    pub animations: IndexSet<String>,
    /// Widest set of alternative columns any row could have used.
    pub max_extra_choices: usize,
    /// Warnings collected so far, in the order they were found.
    pub diagnostics: Vec<Diagnostic>,
    /// NOPs removed by the optimizer, 0 when culling is off.
    pub nops_culled: usize,
}

impl CompilerContext {
    pub fn new(options: CompileOptions) -> Self {
        let mut ctx = Self {
            options,
            states: Vec::new(),
            state_index: HashMap::new(),
            actions: ActionArena::new(),
            text: TextPools::new(),
            descriptors: WELL_KNOWN_DESCRIPTORS.iter().map(|d| (*d).to_string()).collect(),
            animations: IndexSet::new(),
            max_extra_choices: 0,
            diagnostics: Vec::new(),
            nops_culled: 0,
        };
        ctx.declare_state(POST_STATE, false, 0);
        ctx
    }

    /// Allocate the next dense id. Callers check for duplicates first.
    pub fn declare_state(&mut self, name: &str, implicit: bool, line: usize) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(State::new(name, implicit, line));
        self.state_index.insert(name.to_string(), id);
        id
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.state_index.get(name).copied()
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0]
    }

    pub fn warn(&mut self, diagnostic: Diagnostic) {
        tracing::debug!(message = %diagnostic.message, "warning");
        self.diagnostics.push(diagnostic.as_warning());
    }

    pub fn intern_descriptor(&mut self, name: &str) -> usize {
        self.descriptors.insert_full(name.to_string()).0
    }

    /// Intern an animation name. Blank and `NONE` mean "no animation".
    pub fn intern_animation(&mut self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(NO_ANIMATION) {
            return None;
        }
        self.animations.insert(name.to_string());
        Some(name.to_string())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.diagnostics.iter().filter(|d| !d.is_fatal())
    }
}
