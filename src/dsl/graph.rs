//! The compiled game graph: states, actions, and the arena the actions live in.
//!
//! Actions are linked by index ([`ActionRef`]), never by ownership, so the
//! optimizer can rewire links freely. Serialized action ids are positions in
//! [`ActionArena::live`] and are only derived at emission time.

use std::cmp::Reverse;
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;

use super::builtins::TICKS_PER_SECOND;
use super::row::{InputTuple, ResultKind};

/// Dense state id; 0 is the POST bootstrap state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateId(pub usize);

/// Arena handle of an action. Stable across the optimizer pass, unlike the
/// serialized id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionRef(pub usize);

/// Action type tags as the firmware interpreter sees them. The discriminant is
/// the serialized `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Text = 0,
    TextBadgeName = 1,
    TextUserName = 2,
    TextBadgeCount = 3,
    SetAnimTemp = 4,
    SetAnimBg = 5,
    StateTransition = 6,
    Push = 7,
    Pop = 8,
    Previous = 9,
    Close = 10,
    Nop = 11,
    Other = 12,
}

impl ActionType {
    pub const ALL: [ActionType; 13] = [
        ActionType::Text,
        ActionType::TextBadgeName,
        ActionType::TextUserName,
        ActionType::TextBadgeCount,
        ActionType::SetAnimTemp,
        ActionType::SetAnimBg,
        ActionType::StateTransition,
        ActionType::Push,
        ActionType::Pop,
        ActionType::Previous,
        ActionType::Close,
        ActionType::Nop,
        ActionType::Other,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    /// TEXT and its variable-bound variants.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            ActionType::Text
                | ActionType::TextBadgeName
                | ActionType::TextUserName
                | ActionType::TextBadgeCount
        )
    }

    /// Types whose detail names a target state.
    pub fn targets_state(self) -> bool {
        matches!(self, ActionType::StateTransition | ActionType::Push)
    }

    pub fn from_result(kind: ResultKind) -> Self {
        match kind {
            ResultKind::Text => ActionType::Text,
            ResultKind::SetAnimTemp => ActionType::SetAnimTemp,
            ResultKind::SetAnimBg => ActionType::SetAnimBg,
            ResultKind::StateTransition => ActionType::StateTransition,
            ResultKind::Push => ActionType::Push,
            ResultKind::Pop => ActionType::Pop,
            ResultKind::Previous => ActionType::Previous,
            ResultKind::Close => ActionType::Close,
            ResultKind::Other => ActionType::Other,
        }
    }
}

/// Type-dependent payload. At most one shape is ever populated.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionDetail {
    None,
    /// A text frame, already substituted and ready for the pool.
    Text(String),
    /// `None` clears the animation slot.
    Animation(Option<String>),
    State(StateId),
    Descriptor(String),
}

/// Which text pool a frame was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pool {
    Main,
    Aux,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionType,
    pub detail: ActionDetail,
    /// Seconds for text frames, a raw count otherwise.
    pub duration: f64,
    pub choice_share: u16,
    pub choice_total: u16,
    pub next_action: Option<ActionRef>,
    pub next_choice: Option<ActionRef>,
    /// Back-links; only used while building and traversing.
    pub prev_action: Option<ActionRef>,
    pub prev_choice: Option<ActionRef>,
    pub pool: Pool,
    /// State whose row produced this action.
    pub state: StateId,
    /// Input tuple of the series this action belongs to.
    pub trigger: InputTuple,
    /// Source line, 0 for synthesized actions.
    pub line: usize,
}

impl Action {
    pub fn new(kind: ActionType, detail: ActionDetail, state: StateId, trigger: InputTuple) -> Self {
        Self {
            kind,
            detail,
            duration: 0.0,
            choice_share: 1,
            choice_total: 1,
            next_action: None,
            next_choice: None,
            prev_action: None,
            prev_choice: None,
            pool: Pool::Main,
            state,
            trigger,
            line: 0,
        }
    }

    pub fn with_share(mut self, share: u16) -> Self {
        self.choice_share = share;
        self.choice_total = share;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn in_pool(mut self, pool: Pool) -> Self {
        self.pool = pool;
        self
    }

    pub fn target_state(&self) -> Option<StateId> {
        match self.detail {
            ActionDetail::State(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_choice_member(&self) -> bool {
        self.next_choice.is_some() || self.prev_choice.is_some()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = crate::util::serde_variant_name(&self.kind).unwrap_or_default();
        match &self.detail {
            ActionDetail::None => write!(f, "{name}"),
            ActionDetail::Text(t) => write!(f, "{name}: \"{t}\""),
            ActionDetail::Animation(Some(a)) => write!(f, "{name}: {a}"),
            ActionDetail::Animation(None) => write!(f, "{name}: NONE"),
            ActionDetail::State(id) => write!(f, "{name}: #{}", id.0),
            ActionDetail::Descriptor(d) => write!(f, "{name}: {d}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub seconds: u32,
    pub recurring: bool,
    pub target: ActionRef,
}

impl Timer {
    /// Firmware ticks. The builder refuses timers whose ticks overflow u32.
    pub fn ticks(&self) -> u32 {
        self.seconds.saturating_mul(TICKS_PER_SECOND as u32)
    }
}

/// A text-triggered input (menu entry) offered while in a state.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub text: String,
    pub target: ActionRef,
}

/// A network-triggered event.
#[derive(Debug, Clone, PartialEq)]
pub struct Other {
    pub descriptor: String,
    pub target: ActionRef,
}

#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    /// Synthesized from an undeclared transition target.
    pub implicit: bool,
    /// Declaration line, 0 for synthesized states.
    pub line: usize,
    /// Input tuple → head of its choice set, in first-seen order.
    pub events: IndexMap<InputTuple, ActionRef>,
    /// One-shot timers first, then recurring; longest first within each group.
    pub timers: Vec<Timer>,
    pub inputs: Vec<Input>,
    pub others: Vec<Other>,
    pub entry: Option<ActionRef>,
}

impl State {
    pub fn new(name: impl Into<String>, implicit: bool, line: usize) -> Self {
        Self {
            name: name.into(),
            implicit,
            line,
            events: IndexMap::new(),
            timers: Vec::new(),
            inputs: Vec::new(),
            others: Vec::new(),
            entry: None,
        }
    }

    /// Insert keeping the firmware's timer order.
    pub fn add_timer(&mut self, timer: Timer) {
        let key = |t: &Timer| (t.recurring, Reverse(t.seconds));
        let at = self.timers.partition_point(|t| key(t) <= key(&timer));
        self.timers.insert(at, timer);
    }
}

/// Flat storage for every action plus the global ordered action list.
#[derive(Debug, Clone, Default)]
pub struct ActionArena {
    nodes: Vec<Action>,
    order: Vec<ActionRef>,
}

impl ActionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) -> ActionRef {
        let r = ActionRef(self.nodes.len());
        self.nodes.push(action);
        self.order.push(r);
        r
    }

    pub fn get(&self, r: ActionRef) -> &Action {
        &self.nodes[r.0]
    }

    pub fn get_mut(&mut self, r: ActionRef) -> &mut Action {
        &mut self.nodes[r.0]
    }

    /// Number of actions still in the global list.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The global action list in serialization order.
    pub fn live(&self) -> &[ActionRef] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionRef, &Action)> + '_ {
        self.order.iter().map(|&r| (r, self.get(r)))
    }

    /// Chain `to` after `from` in sequence order.
    pub fn link_next(&mut self, from: ActionRef, to: ActionRef) {
        self.get_mut(from).next_action = Some(to);
        self.get_mut(to).prev_action = Some(from);
    }

    /// Sequence predecessor of `r`. Choice-set siblings have none of their
    /// own, so for them this is the predecessor of their set's head.
    pub fn previous_action(&self, r: ActionRef) -> Option<ActionRef> {
        let mut cur = self.get(r);
        loop {
            if let Some(prev) = cur.prev_action {
                return Some(prev);
            }
            match cur.prev_choice {
                Some(prev) => cur = self.get(prev),
                None => return None,
            }
        }
    }

    /// Walk back to the action that begins the series containing `r`.
    pub fn sequence_origin(&self, r: ActionRef) -> ActionRef {
        let mut cur = r;
        while let Some(prev) = self.previous_action(cur) {
            cur = prev;
        }
        cur
    }

    /// Every member of the choice set headed by `head`, in order.
    pub fn choice_members(&self, head: ActionRef) -> Vec<ActionRef> {
        let mut members = vec![head];
        let mut cur = self.get(head).next_choice;
        while let Some(r) = cur {
            members.push(r);
            cur = self.get(r).next_choice;
        }
        members
    }

    /// Last member of the choice set containing `r`.
    pub fn choice_tail(&self, r: ActionRef) -> ActionRef {
        let mut cur = r;
        while let Some(next) = self.get(cur).next_choice {
            cur = next;
        }
        cur
    }

    /// Drop actions from the global list. Their arena slots remain, so
    /// outstanding [`ActionRef`]s never dangle.
    pub fn purge(&mut self, doomed: &HashSet<ActionRef>) {
        self.order.retain(|r| !doomed.contains(r));
    }

    /// Serialized id of every live action, indexed by arena slot.
    pub fn positions(&self) -> Vec<Option<usize>> {
        let mut positions = vec![None; self.nodes.len()];
        for (pos, r) in self.order.iter().enumerate() {
            positions[r.0] = Some(pos);
        }
        positions
    }
}
