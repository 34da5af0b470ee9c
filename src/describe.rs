use serde::Serialize;

use crate::dsl::context::CompilerContext;
use crate::dsl::graph::{ActionRef, StateId};

/// Human-readable summary of the whole game: states, tables, pools.
pub fn describe_game(ctx: &CompilerContext) -> String {
    let mut lines = Vec::new();

    lines.push(format!("States ({})", ctx.states.len()));
    for (i, state) in ctx.states.iter().enumerate() {
        lines.push(format!(
            "  [{i}] {}{} ({} events, {} timers, {} inputs, {} net)",
            state.name,
            if state.implicit { " (implicit)" } else { "" },
            state.events.len(),
            state.timers.len(),
            state.inputs.len(),
            state.others.len(),
        ));
    }

    lines.push(format!(
        "\nActions: {}\nText: {} main, {} aux",
        ctx.actions.len(),
        ctx.text.main_len(),
        ctx.text.aux_len()
    ));

    let descriptors: Vec<&str> = ctx.descriptors.iter().map(String::as_str).collect();
    lines.push(format!("Descriptors ({}): {}", descriptors.len(), descriptors.join(", ")));

    if !ctx.animations.is_empty() {
        let animations: Vec<&str> = ctx.animations.iter().map(String::as_str).collect();
        lines.push(format!("Animations ({}): {}", animations.len(), animations.join(", ")));
    }

    for i in 0..ctx.states.len() {
        lines.push(String::new());
        lines.push(describe_state(ctx, StateId(i)));
    }

    lines.join("\n")
}

/// One state's events, each with its choice set and the series behind every choice.
pub fn describe_state(ctx: &CompilerContext, id: StateId) -> String {
    let positions = ctx.actions.positions();
    let pos = |r: ActionRef| positions.get(r.0).copied().flatten().map_or_else(|| "-".to_string(), |p| p.to_string());

    let state = ctx.state(id);
    let mut lines = vec![format!("{} (id: {})", state.name, id.0)];
    for (trigger, head) in &state.events {
        lines.push(format!("  {trigger}"));
        for member in ctx.actions.choice_members(*head) {
            let choice = ctx.actions.get(member);
            lines.push(format!("    choice {}/{}", choice.choice_share, choice.choice_total));
            let mut cur = Some(member);
            while let Some(r) = cur {
                let action = ctx.actions.get(r);
                lines.push(format!("      #{} {action}", pos(r)));
                cur = action.next_action;
            }
        }
    }
    lines.join("\n")
}

/// Machine-readable outcome of one compile.
#[derive(Debug, Clone, Serialize)]
pub struct CompileReport {
    pub file: String,
    pub states: usize,
    pub actions: usize,
    pub text_main: usize,
    pub text_aux: usize,
    pub descriptors: usize,
    pub animations: usize,
    pub nops_culled: usize,
    /// Rendered the same way they are printed.
    pub warnings: Vec<String>,
}

impl CompileReport {
    pub fn new(file: &str, ctx: &CompilerContext) -> Self {
        Self {
            file: file.to_string(),
            states: ctx.states.len(),
            actions: ctx.actions.len(),
            text_main: ctx.text.main_len(),
            text_aux: ctx.text.aux_len(),
            descriptors: ctx.descriptors.len(),
            animations: ctx.animations.len(),
            nops_culled: ctx.nops_culled,
            warnings: ctx.warnings().map(|w| w.render(file)).collect(),
        }
    }
}
