use std::collections::HashMap;

use serde::Serialize;

use super::builtins::{SENTINEL, TEXT_SLOT_SIZE, TICKS_PER_SECOND};
use super::context::CompilerContext;
use super::error::Diagnostic;
use super::graph::{ActionDetail, ActionRef, ActionType, State};
use crate::config::Placement;
use crate::util::{serde_variant_name, symbol_ident};

/// Bytes per serialized action.
pub const ACTION_SIZE: usize = 14;
/// State header: entry id, three counts, one pad byte.
pub const STATE_HEADER_SIZE: usize = 6;
pub const TIMER_SIZE: usize = 10;
pub const INPUT_SIZE: usize = 4;
pub const OTHER_SIZE: usize = 4;

/// The three flash tables plus the symbols firmware needs to find things in them.
#[derive(Debug, Clone)]
pub struct CompiledGame {
    pub text_pool: Vec<u8>,
    pub action_table: Vec<u8>,
    pub state_table: Vec<u8>,
    pub symbols: SymbolTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub value: u32,
}

impl Symbol {
    fn new(name: impl Into<String>, value: usize) -> Self {
        Self {
            name: name.into(),
            value: u32::try_from(value).unwrap_or(u32::MAX),
        }
    }
}

/// Integer constants for the firmware build, grouped by what they index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolTable {
    pub states: Vec<Symbol>,
    pub descriptors: Vec<Symbol>,
    pub animations: Vec<Symbol>,
    pub action_types: Vec<Symbol>,
    /// Counts, maxima, record sizes.
    pub layout: Vec<Symbol>,
    /// Table addresses; rendered in hex.
    pub placement: Vec<Symbol>,
}

impl SymbolTable {
    /// Render as a C header.
    pub fn to_header(&self) -> String {
        let mut out = String::from("// Generated by statemaker. Do not edit.\n");
        out.push_str("#ifndef STATEMAKER_GAME_H\n#define STATEMAKER_GAME_H\n");
        let groups = [
            ("STATE_ID_", &self.states),
            ("DESCRIPTOR_ID_", &self.descriptors),
            ("ANIM_ID_", &self.animations),
            ("ACTION_TYPE_", &self.action_types),
            ("", &self.layout),
        ];
        for (prefix, symbols) in groups {
            out.push('\n');
            for s in symbols {
                out.push_str(&format!("#define {prefix}{} {}\n", symbol_ident(&s.name), s.value));
            }
        }
        out.push('\n');
        for s in &self.placement {
            out.push_str(&format!("#define {} {:#08x}\n", symbol_ident(&s.name), s.value));
        }
        out.push_str("\n#endif\n");
        out
    }
}

/// Serialize the finished graph. Ids come from positions in the live
/// action list, so this must run after any culling.
pub fn generate(ctx: &CompilerContext, placement: &Placement) -> Result<CompiledGame, Diagnostic> {
    let mut emitter = Emitter::new(ctx)?;
    let text_pool = emitter.text_pool()?;
    let action_table = emitter.action_table()?;
    let state_table = emitter.state_table()?;
    let symbols = emitter.symbols(placement)?;
    tracing::debug!(
        text = text_pool.len(),
        actions = action_table.len(),
        states = state_table.len(),
        "tables emitted"
    );
    Ok(CompiledGame {
        text_pool,
        action_table,
        state_table,
        symbols,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Maxima {
    timers: usize,
    inputs: usize,
    others: usize,
}

impl Maxima {
    fn of(states: &[State]) -> Self {
        Self {
            timers: states.iter().map(|s| s.timers.len()).max().unwrap_or(0),
            inputs: states.iter().map(|s| s.inputs.len()).max().unwrap_or(0),
            others: states.iter().map(|s| s.others.len()).max().unwrap_or(0),
        }
    }

    fn stride(self) -> usize {
        STATE_HEADER_SIZE + TIMER_SIZE * self.timers + INPUT_SIZE * self.inputs + OTHER_SIZE * self.others
    }
}

struct Emitter<'a> {
    ctx: &'a CompilerContext,
    positions: Vec<Option<usize>>,
    maxima: Maxima,
}

impl<'a> Emitter<'a> {
    fn new(ctx: &'a CompilerContext) -> Result<Self, Diagnostic> {
        let limit = usize::from(SENTINEL);
        let tables = [
            ("actions", ctx.actions.len()),
            ("states", ctx.states.len()),
            ("text strings", ctx.text.len()),
            ("descriptors", ctx.descriptors.len()),
            ("animations", ctx.animations.len()),
        ];
        for (what, len) in tables {
            if len > limit {
                return Err(Diagnostic::semantic(format!(
                    "Too many {what}: {len} (at most {limit})"
                )));
            }
        }
        let maxima = Maxima::of(&ctx.states);
        for (what, count) in [("timers", maxima.timers), ("inputs", maxima.inputs), ("NET inputs", maxima.others)] {
            if count > usize::from(u8::MAX) {
                return Err(Diagnostic::semantic(format!(
                    "A state has {count} {what}; at most {} fit a state record",
                    u8::MAX
                )));
            }
        }
        Ok(Self {
            ctx,
            positions: ctx.actions.positions(),
            maxima,
        })
    }

    /// Serialized id of an action, or the sentinel.
    fn id(&self, r: Option<ActionRef>) -> u16 {
        r.and_then(|r| self.positions.get(r.0).copied().flatten())
            .map_or(SENTINEL, to_u16)
    }

    fn text_pool(&self) -> Result<Vec<u8>, Diagnostic> {
        let mut out = Vec::with_capacity(self.ctx.text.len() * TEXT_SLOT_SIZE);
        for s in self.ctx.text.iter() {
            if s.len() >= TEXT_SLOT_SIZE {
                return Err(Diagnostic::semantic(format!("Text '{s}' does not fit a text slot")));
            }
            let mut slot = [0u8; TEXT_SLOT_SIZE];
            slot[..s.len()].copy_from_slice(s.as_bytes());
            out.extend_from_slice(&slot);
        }
        Ok(out)
    }

    fn action_table(&self) -> Result<Vec<u8>, Diagnostic> {
        let mut out = Vec::with_capacity(self.ctx.actions.len() * ACTION_SIZE);
        for (_, action) in self.ctx.actions.iter() {
            let detail = match &action.detail {
                ActionDetail::Text(text) => self.text_address(text)?,
                ActionDetail::Animation(Some(name)) => self.ctx.animations.get_index_of(name).map_or(SENTINEL, to_u16),
                ActionDetail::Animation(None) => SENTINEL,
                ActionDetail::State(id) => to_u16(id.0),
                ActionDetail::Descriptor(d) => self.ctx.descriptors.get_index_of(d).map_or(SENTINEL, to_u16),
                ActionDetail::None => 0,
            };
            let duration = if action.kind.is_text() {
                action.duration * TICKS_PER_SECOND
            } else {
                action.duration
            };
            for field in [
                action.kind.code(),
                detail,
                clamp_u16(duration),
                self.id(action.next_action),
                self.id(action.next_choice),
                action.choice_share,
                action.choice_total,
            ] {
                out.extend_from_slice(&field.to_le_bytes());
            }
        }
        Ok(out)
    }

    fn text_address(&self, text: &str) -> Result<u16, Diagnostic> {
        self.ctx
            .text
            .address(text)
            .map(to_u16)
            .ok_or_else(|| Diagnostic::semantic(format!("Text '{text}' missing from the text pools")))
    }

    fn state_table(&self) -> Result<Vec<u8>, Diagnostic> {
        let stride = self.maxima.stride();
        let mut out = Vec::with_capacity(self.ctx.states.len() * stride);
        for state in &self.ctx.states {
            let start = out.len();
            out.extend_from_slice(&self.id(state.entry).to_le_bytes());
            for count in [state.timers.len(), state.inputs.len(), state.others.len()] {
                out.push(u8::try_from(count).unwrap_or(u8::MAX));
            }
            out.push(0);

            for slot in 0..self.maxima.timers {
                match state.timers.get(slot) {
                    Some(timer) => {
                        out.extend_from_slice(&timer.ticks().to_le_bytes());
                        out.push(u8::from(timer.recurring));
                        out.extend_from_slice(&[0; 3]);
                        out.extend_from_slice(&self.id(Some(timer.target)).to_le_bytes());
                    }
                    None => {
                        out.extend_from_slice(&[0; 8]);
                        out.extend_from_slice(&SENTINEL.to_le_bytes());
                    }
                }
            }
            for slot in 0..self.maxima.inputs {
                match state.inputs.get(slot) {
                    Some(input) => {
                        out.extend_from_slice(&self.text_address(&input.text)?.to_le_bytes());
                        out.extend_from_slice(&self.id(Some(input.target)).to_le_bytes());
                    }
                    None => {
                        out.extend_from_slice(&[0; 2]);
                        out.extend_from_slice(&SENTINEL.to_le_bytes());
                    }
                }
            }
            for slot in 0..self.maxima.others {
                match state.others.get(slot) {
                    Some(other) => {
                        let descriptor = self.ctx.descriptors.get_index_of(&other.descriptor).map_or(SENTINEL, to_u16);
                        out.extend_from_slice(&descriptor.to_le_bytes());
                        out.extend_from_slice(&self.id(Some(other.target)).to_le_bytes());
                    }
                    None => {
                        out.extend_from_slice(&[0; 2]);
                        out.extend_from_slice(&SENTINEL.to_le_bytes());
                    }
                }
            }
            debug_assert_eq!(out.len() - start, stride);
        }
        Ok(out)
    }

    fn symbols(&self, placement: &Placement) -> Result<SymbolTable, Diagnostic> {
        let ctx = self.ctx;
        let layout = [
            ("STATE_COUNT", ctx.states.len()),
            ("ACTION_COUNT", ctx.actions.len()),
            ("TEXT_COUNT", ctx.text.len()),
            ("MAIN_TEXT_COUNT", ctx.text.main_len()),
            ("AUX_TEXT_COUNT", ctx.text.aux_len()),
            ("DESCRIPTOR_COUNT", ctx.descriptors.len()),
            ("ANIM_COUNT", ctx.animations.len()),
            ("MAX_TIMERS", self.maxima.timers),
            ("MAX_INPUTS", self.maxima.inputs),
            ("MAX_OTHERS", self.maxima.others),
            ("STATE_STRIDE", self.maxima.stride()),
            ("ACTION_SIZE", ACTION_SIZE),
            ("TEXT_SLOT_SIZE", TEXT_SLOT_SIZE),
            ("NO_TARGET", usize::from(SENTINEL)),
        ];
        let addr = |a: u32| usize::try_from(a).unwrap_or(usize::MAX);
        Ok(SymbolTable {
            states: unique_symbols("States", "STATE_ID_", ctx.states.iter().map(|s| s.name.as_str()))?,
            descriptors: unique_symbols("Descriptors", "DESCRIPTOR_ID_", ctx.descriptors.iter().map(String::as_str))?,
            animations: unique_symbols("Animations", "ANIM_ID_", ctx.animations.iter().map(String::as_str))?,
            action_types: ActionType::ALL
                .iter()
                .map(|t| Symbol::new(serde_variant_name(t).unwrap_or_default(), usize::from(t.code())))
                .collect(),
            layout: layout.iter().map(|(name, v)| Symbol::new(*name, *v)).collect(),
            placement: vec![
                Symbol::new("TEXT_POOL_ADDR", addr(placement.text_pool_addr)),
                Symbol::new("ACTION_TABLE_ADDR", addr(placement.action_table_addr)),
                Symbol::new("STATE_TABLE_ADDR", addr(placement.state_table_addr)),
            ],
        })
    }
}

/// Number `names` in order, refusing two names that render to the same C
/// identifier.
fn unique_symbols<'n>(
    what: &str,
    prefix: &str,
    names: impl Iterator<Item = &'n str>,
) -> Result<Vec<Symbol>, Diagnostic> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut symbols = Vec::new();
    for (i, name) in names.enumerate() {
        let ident = symbol_ident(name);
        if let Some(first) = seen.get(&ident) {
            return Err(Diagnostic::semantic(format!(
                "{what} '{first}' and '{name}' both become the symbol {prefix}{ident}"
            )));
        }
        seen.insert(ident, name);
        symbols.push(Symbol::new(name, i));
    }
    Ok(symbols)
}

/// Table sizes are checked up front, so indexes always fit.
fn to_u16(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(SENTINEL)
}

fn clamp_u16(value: f64) -> u16 {
    value.round().clamp(0.0, f64::from(u16::MAX)) as u16
}
