#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod builtins;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod builder;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod codegen;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod context;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod graph;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod optimize;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod row;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod sheet;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod text;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod validate;

use crate::config::CompileOptions;
use context::CompilerContext;
use error::{CompileFailure, Diagnostic};
use sheet::Sheet;

/// Compile a state sheet into a finished graph ready for code generation.
///
/// This is the primary public entry point for the DSL pipeline:
/// sheet → phase 1 (declare states) → phase 2 (build graph) → cull → validate
///
/// Warnings (including graph-level ones) are left in
/// [`CompilerContext::diagnostics`]. On the first FATAL problem the warnings
/// gathered up to that point travel with it in the [`CompileFailure`].
pub fn compile_source(source: &str, options: &CompileOptions) -> Result<CompilerContext, CompileFailure> {
    let sheet = sheet::read_sheet(source)?;
    let mut ctx = CompilerContext::new(options.clone());
    if let Err(fatal) = build_graph(&sheet, &mut ctx) {
        return Err(CompileFailure {
            fatal,
            warnings: ctx.diagnostics,
        });
    }
    if options.cull_nops {
        ctx.nops_culled = optimize::cull_nops(&mut ctx);
    }
    let warnings = validate::validate(&ctx);
    ctx.diagnostics.extend(warnings);
    Ok(ctx)
}

fn build_graph(sheet: &Sheet, ctx: &mut CompilerContext) -> Result<(), Diagnostic> {
    let rows = parser::parse(sheet, ctx)?;
    builder::build(&rows, ctx)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::Placement;
    use codegen::{generate, ACTION_SIZE};
    use graph::{ActionDetail, ActionRef, ActionType, StateId};
    use row::{InputKind, InputTuple};

    const HEADER: &str = "Input_type,Input_detail,Choice_share,Result_duration,Result_type,Result_detail,,";

    const SAMPLE: &str = "\
Input_type,Input_detail,Choice_share,Result_duration,Result_type,Result_detail,,
COMMENT,Sample game,,,,,,
START_STATE,firstboot,,,,,,
ENTER,,,,SET_ANIM_BG,rainbow,,
CONTD,,,,TEXT,Hello $username! Welcome to the badge game,,
CONTD,,,,TEXT,Say hi,Wave hello,Nod politely
CONTD,,,,STATE_TRANSITION,idle,,
START_STATE,idle,,,,,,
ENTER,,,,TEXT,Idle,,
TIMER,30,2,,TEXT,Still there?,Hello?,
TIMER,30,1,,STATE_TRANSITION,sleep,,
TIMER_R,5,,,SET_ANIM_TEMP,blink,,
USER_IN,Status,,,TEXT,You have seen $badgecount badges,,
USER_IN,Sleep,,,PUSH,sleep,,
NET,BADGE_NEARBY,,,TEXT,Someone is close,Friend nearby!,
CONTD,,,,OTHER,UNLOCK,,
START_STATE,sleep,,,,,,
ENTER,,,,SET_ANIM_BG,none,,
CONTD,,,,TEXT,Zzz,,
USER_IN,Wake,,,POP,,,
USER_IN,Back,,,PREVIOUS,,,
USER_IN,Bye,,,CLOSE,,,
";

    fn compile(source: &str, cull: bool) -> CompilerContext {
        let options = CompileOptions {
            cull_nops: cull,
            ..CompileOptions::default()
        };
        compile_source(source, &options).unwrap()
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    /// Non-NOP actions reachable from every event head, in traversal order.
    fn behaviour(ctx: &CompilerContext) -> Vec<String> {
        fn walk(ctx: &CompilerContext, r: ActionRef, seen: &mut HashSet<ActionRef>, out: &mut Vec<String>) {
            if !seen.insert(r) {
                return;
            }
            let action = ctx.actions.get(r);
            if action.kind != ActionType::Nop {
                out.push(format!("{}:{action}", action.state.0));
            }
            if let Some(choice) = action.next_choice {
                walk(ctx, choice, seen, out);
            }
            if let Some(next) = action.next_action {
                walk(ctx, next, seen, out);
            }
        }
        let mut out = Vec::new();
        for state in &ctx.states {
            for head in state.events.values() {
                let mut seen = HashSet::new();
                walk(ctx, *head, &mut seen, &mut out);
            }
        }
        out
    }

    #[test]
    fn sample_compiles() {
        let ctx = compile(SAMPLE, false);
        assert_eq!(ctx.states.len(), 4);
        assert!(ctx.diagnostics.iter().all(|d| !d.is_fatal()));
        assert!(ctx.text.in_main("Hello %s!"));
        assert!(ctx.text.in_main("You have seen %d badges"));
        assert!(!ctx.text.in_main("Hello?"));
    }

    #[test]
    fn ids_are_dense_and_references_valid() {
        for cull in [false, true] {
            let ctx = compile(SAMPLE, cull);
            let game = generate(&ctx, &Placement::default()).unwrap();
            let n = game.action_table.len() / ACTION_SIZE;
            assert_eq!(n, ctx.actions.len());
            let in_range = |id: u16| id == builtins::SENTINEL || usize::from(id) < n;
            for i in 0..n {
                let base = i * ACTION_SIZE;
                assert!(in_range(u16_at(&game.action_table, base + 6)));
                assert!(in_range(u16_at(&game.action_table, base + 8)));
                let kind = u16_at(&game.action_table, base);
                if kind == ActionType::StateTransition.code() || kind == ActionType::Push.code() {
                    assert!(usize::from(u16_at(&game.action_table, base + 2)) < ctx.states.len());
                }
            }
            let stride = game.state_table.len() / ctx.states.len();
            for s in 0..ctx.states.len() {
                let entry = u16_at(&game.state_table, s * stride);
                assert!(in_range(entry));
            }
        }
    }

    #[test]
    fn choice_totals_match_shares() {
        let ctx = compile(SAMPLE, false);
        let mut sets = 0;
        // Every live action without a choice predecessor heads a choice set,
        // including the sets that alternatives form mid-series.
        for (r, action) in ctx.actions.iter() {
            if action.prev_choice.is_some() {
                continue;
            }
            let members = ctx.actions.choice_members(r);
            let sum: u16 = members.iter().map(|m| ctx.actions.get(*m).choice_share).sum();
            for m in &members {
                assert_eq!(ctx.actions.get(*m).choice_total, sum, "{}", ctx.actions.get(*m));
            }
            if members.len() > 1 {
                sets += 1;
            }
        }
        // FIRSTBOOT's CONTD alternatives, IDLE's two TIMER sets and the NET alternatives.
        assert!(sets >= 3, "{sets}");

        let firstboot = ctx.state(ctx.state_id("FIRSTBOOT").unwrap());
        let mut cur = firstboot.entry;
        let mut found = false;
        while let Some(r) = cur {
            let action = ctx.actions.get(r);
            if action.detail == ActionDetail::Text("Say hi".to_string()) {
                let members = ctx.actions.choice_members(r);
                assert_eq!(members.len(), 3);
                assert!(members.iter().all(|m| ctx.actions.get(*m).choice_total == 3));
                found = true;
            }
            cur = action.next_action;
        }
        assert!(found);

        let idle = ctx.state(ctx.state_id("IDLE").unwrap());
        let timer_head = idle.events[&InputTuple::new(InputKind::Timer, "30")];
        assert_eq!(ctx.actions.get(timer_head).choice_total, 5);
    }

    #[test]
    fn frames_fit_their_slots() {
        let ctx = compile(SAMPLE, false);
        for text in ctx.text.iter() {
            assert!(text.len() <= builtins::FRAME_WIDTH, "{text}");
        }
    }

    #[test]
    fn culling_preserves_behaviour() {
        let plain = compile(SAMPLE, false);
        let culled = compile(SAMPLE, true);
        assert!(culled.actions.len() < plain.actions.len());
        assert!(culled
            .actions
            .iter()
            .all(|(_, a)| a.kind != ActionType::Nop));
        assert_eq!(behaviour(&plain), behaviour(&culled));
        assert_eq!(plain.nops_culled, 0);
        assert_eq!(culled.nops_culled, plain.actions.len() - culled.actions.len());
    }

    #[test]
    fn validation_sees_the_culled_graph() {
        let src = format!("{HEADER}\nSTART_STATE,HOME\nENTER,,,,TEXT,one,two\nCONTD,,,,CLOSE,\n");
        let options = CompileOptions {
            cull_nops: true,
            ..CompileOptions::default()
        };
        let ctx = compile_source(&src, &options).unwrap();
        assert_eq!(ctx.nops_culled, 1);
        let nodes = validate::action_graph(&ctx).node_count();
        assert_eq!(nodes, ctx.states.len() + ctx.actions.len());
        assert!(ctx.warnings().all(|w| !w.message.contains("not connected")));
    }

    #[test]
    fn warnings_survive_a_fatal() {
        let src = format!(
            "{HEADER}\nSTART_STATE,HOME\nENTER,,,,STATE_TRANSITION,NOWHERE\nUSER_IN,{},,,CLOSE,\n",
            "x".repeat(30)
        );
        let options = CompileOptions {
            allow_implicit: true,
            ..CompileOptions::default()
        };
        let failure = compile_source(&src, &options).unwrap_err();
        assert_eq!(failure.fatal.message, "Input text too long");
        assert_eq!(failure.warnings.len(), 1);
        assert!(failure.warnings[0].message.contains("Implicit declaration of state NOWHERE"));

        let rendered = failure.render("game.csv");
        let warning = rendered.find("WARNING: game.csv:3").unwrap();
        let fatal = rendered.find("FATAL: game.csv:4").unwrap();
        assert!(warning < fatal);
    }

    #[test]
    fn output_is_deterministic() {
        for cull in [false, true] {
            let a = generate(&compile(SAMPLE, cull), &Placement::default()).unwrap();
            let b = generate(&compile(SAMPLE, cull), &Placement::default()).unwrap();
            assert_eq!(a.text_pool, b.text_pool);
            assert_eq!(a.action_table, b.action_table);
            assert_eq!(a.state_table, b.state_table);
            assert_eq!(a.symbols.to_header(), b.symbols.to_header());
        }
    }

    #[test]
    fn self_transition_series() {
        let ctx = compile(
            &format!("{HEADER}\nSTART_STATE,HOME\nENTER,,,,TEXT,HI\nCONTD,,,,STATE_TRANSITION,HOME\n"),
            false,
        );
        let home = ctx.state_id("HOME").unwrap();
        assert_eq!(home, StateId(1));
        assert_eq!(ctx.state(home).entry, Some(ActionRef(0)));
        let first = ctx.actions.get(ActionRef(0));
        assert_eq!(first.next_action, Some(ActionRef(1)));
        let second = ctx.actions.get(ActionRef(1));
        assert_eq!(second.kind, ActionType::StateTransition);
        assert_eq!(second.detail, ActionDetail::State(home));
    }

    #[test]
    fn input_text_limit() {
        let ok = format!("{HEADER}\nSTART_STATE,HOME\nUSER_IN,{},,,CLOSE,\n", "x".repeat(23));
        assert!(compile_source(&ok, &CompileOptions::default()).is_ok());
        let long = format!("{HEADER}\nSTART_STATE,HOME\nUSER_IN,{},,,CLOSE,\n", "x".repeat(24));
        let err = compile_source(&long, &CompileOptions::default()).unwrap_err();
        assert!(err.fatal.is_fatal());
        assert_eq!(err.fatal.message, "Input text too long");
    }

    #[test]
    fn alternatives_make_parallel_sequences() {
        let ctx = compile(&format!("{HEADER}\nSTART_STATE,HOME\nENTER,,,,TEXT,one,two,three\n"), false);
        let head = ctx.state(StateId(1)).entry.unwrap();
        let members = ctx.actions.choice_members(head);
        assert_eq!(members.len(), 3);
        let nop = ctx.actions.get(head).next_action.unwrap();
        assert_eq!(ctx.actions.get(nop).kind, ActionType::Nop);
        assert!(members.iter().all(|m| ctx.actions.get(*m).next_action == Some(nop)));
        assert_eq!(ctx.actions.get(nop).prev_action, Some(members[2]));
    }

    #[test]
    fn undeclared_target() {
        let src = format!("{HEADER}\nSTART_STATE,HOME\nENTER,,,,STATE_TRANSITION,MYSTERY\n");
        let err = compile_source(&src, &CompileOptions::default()).unwrap_err();
        assert!(err.fatal.is_fatal());

        let options = CompileOptions {
            allow_implicit: true,
            ..CompileOptions::default()
        };
        let ctx = compile_source(&src, &options).unwrap();
        let mystery = ctx.state_id("MYSTERY").unwrap();
        assert!(ctx.diagnostics.iter().any(|d| !d.is_fatal() && d.message.contains("MYSTERY")));
        let show = ctx.state(mystery).entry.unwrap();
        let back = ctx.actions.get(show).next_action.unwrap();
        assert_eq!(ctx.actions.get(back).detail, ActionDetail::State(StateId(1)));
    }

    #[test]
    fn weighted_choice_totals() {
        let ctx = compile(
            &format!("{HEADER}\nSTART_STATE,HOME\nENTER,,1,,TEXT,rare\nENTER,,3,,TEXT,common\n"),
            false,
        );
        let head = ctx.state(StateId(1)).entry.unwrap();
        let members = ctx.actions.choice_members(head);
        assert_eq!(members.len(), 2);
        for m in members {
            assert_eq!(ctx.actions.get(m).choice_total, 4);
        }
    }

    #[test]
    fn compilations_do_not_leak_into_each_other() {
        let first = compile(SAMPLE, false);
        let second = compile(&format!("{HEADER}\nSTART_STATE,HOME\nENTER,,,,CLOSE,\n"), false);
        assert_eq!(second.states.len(), 2);
        assert!(second.text.is_empty());
        assert!(first.states.len() > second.states.len());
    }
}
