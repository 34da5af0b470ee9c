use std::collections::HashSet;

use super::context::CompilerContext;
use super::graph::{ActionArena, ActionRef, ActionType};

// ── NOP culling ──────────────────────────────────────────────────

/// Remove the NOPs that only rejoin parallel text alternatives.
/// Every action pointing at such a NOP is pointed past it instead; choice
/// links are never touched. Returns the number of NOPs removed.
pub fn cull_nops(ctx: &mut CompilerContext) -> usize {
    let heads: HashSet<ActionRef> = ctx
        .states
        .iter()
        .flat_map(|s| s.events.values().copied().chain(s.entry))
        .collect();

    let mut doomed = HashSet::new();
    let live = ctx.actions.live().to_vec();
    for r in live {
        if is_cullable(&ctx.actions, &heads, r) {
            continue;
        }
        loop {
            let Some(next) = ctx.actions.get(r).next_action else { break };
            if !is_cullable(&ctx.actions, &heads, next) {
                break;
            }
            let after = ctx.actions.get(next).next_action;
            ctx.actions.get_mut(r).next_action = after;
            if let Some(after) = after {
                ctx.actions.get_mut(after).prev_action = Some(r);
            }
            doomed.insert(next);
        }
    }

    ctx.actions.purge(&doomed);
    tracing::debug!(culled = doomed.len(), remaining = ctx.actions.len(), "NOPs culled");
    doomed.len()
}

/// A NOP that nothing can jump to directly.
fn is_cullable(actions: &ActionArena, heads: &HashSet<ActionRef>, r: ActionRef) -> bool {
    let action = actions.get(r);
    action.kind == ActionType::Nop && !action.is_choice_member() && !heads.contains(&r)
}
