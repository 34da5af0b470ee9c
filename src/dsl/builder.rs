//! Phase 2: turns validated rows into the state/action/choice graph.
//!
//! Every state is already declared, so transition targets resolve by name.
//! Rows are consumed in order with a cursor tracking the current state, the
//! input tuple of the open series, and that series' tail.

use super::builtins::{FRAME_WIDTH, IMPLICIT_STATE_SECONDS, MAX_INPUT_TEXT, POST_STATE, TICKS_PER_SECOND};
use super::context::CompilerContext;
use super::error::Diagnostic;
use super::graph::{Action, ActionDetail, ActionRef, ActionType, Input, Other, Pool, StateId, Timer};
use super::row::{EventRow, InputKind, InputTuple, Record, ResultKind, Row, RowLocation};
use super::text::{self, TextSpec};

pub fn build(rows: &[Row], ctx: &mut CompilerContext) -> Result<(), Diagnostic> {
    let mut builder = Builder::new(ctx);
    for row in rows {
        match &row.record {
            Record::StateDecl { name } => builder.enter_state(name, &row.loc)?,
            Record::Event(event) => builder.add_event(event, &row.loc)?,
        }
    }
    builder.build_implicit_states();
    builder.build_post()?;
    tracing::debug!(
        states = ctx.states.len(),
        actions = ctx.actions.len(),
        strings = ctx.text.len(),
        "graph built"
    );
    Ok(())
}

struct Cursor {
    state: StateId,
    trigger: Option<InputTuple>,
    seq_tail: Option<ActionRef>,
}

/// Actions produced by one row: choice-set heads (primary first) and the
/// action later rows continue from.
struct Fragment {
    heads: Vec<ActionRef>,
    tail: ActionRef,
}

struct Builder<'a> {
    ctx: &'a mut CompilerContext,
    cursor: Option<Cursor>,
    /// Implicit states awaiting their entry series, with the state that
    /// first referenced each.
    implicit: Vec<(StateId, StateId)>,
}

impl<'a> Builder<'a> {
    fn new(ctx: &'a mut CompilerContext) -> Self {
        Self {
            ctx,
            cursor: None,
            implicit: Vec::new(),
        }
    }

    fn enter_state(&mut self, name: &str, loc: &RowLocation) -> Result<(), Diagnostic> {
        let state = self.ctx.state_id(name).ok_or_else(|| {
            Diagnostic::semantic(format!("State {name} was not declared in phase 1")).at(loc, name)
        })?;
        self.cursor = Some(Cursor {
            state,
            trigger: None,
            seq_tail: None,
        });
        Ok(())
    }

    fn add_event(&mut self, row: &EventRow, loc: &RowLocation) -> Result<(), Diagnostic> {
        let Some(cursor) = self.cursor.as_ref() else {
            return Err(Diagnostic::semantic("Input type not allowed without START_STATE first")
                .at(loc, row.input.name()));
        };
        let state = cursor.state;

        if row.input == InputKind::Contd {
            let (Some(trigger), Some(seq_tail)) = (cursor.trigger.clone(), cursor.seq_tail) else {
                return Err(Diagnostic::semantic("CONTD without preceding input").at(loc, "CONTD"));
            };
            let fragment = self.build_result(row, loc, state, &trigger)?;
            let (primary, alternatives) = split_heads(&fragment);
            self.ctx.actions.link_next(seq_tail, primary);
            self.join_alternatives(primary, alternatives, loc)?;
            self.set_cursor(state, trigger, fragment.tail);
            return Ok(());
        }

        let trigger = InputTuple::new(row.input, row.input_detail.clone());
        let fragment = self.build_result(row, loc, state, &trigger)?;
        let (primary, alternatives) = split_heads(&fragment);

        let existing = self.ctx.state(state).events.get(&trigger).copied();
        match existing {
            Some(head) => {
                let tail = self.ctx.actions.choice_tail(head);
                self.append_choice(tail, primary, loc)?;
            }
            None => self.register_event(state, &trigger, primary, row, loc)?,
        }
        self.join_alternatives(primary, alternatives, loc)?;
        self.set_cursor(state, trigger, fragment.tail);
        Ok(())
    }

    fn set_cursor(&mut self, state: StateId, trigger: InputTuple, tail: ActionRef) {
        self.cursor = Some(Cursor {
            state,
            trigger: Some(trigger),
            seq_tail: Some(tail),
        });
    }

    /// Record a first-seen input tuple with its state.
    fn register_event(
        &mut self,
        state: StateId,
        trigger: &InputTuple,
        head: ActionRef,
        row: &EventRow,
        loc: &RowLocation,
    ) -> Result<(), Diagnostic> {
        let detail = row.input_detail.as_str();
        match row.input {
            InputKind::Enter => self.ctx.state_mut(state).entry = Some(head),
            InputKind::Timer | InputKind::TimerR => {
                let seconds = detail.parse::<u32>().ok().filter(|s| *s > 0).ok_or_else(|| {
                    Diagnostic::semantic(format!(
                        "Timer duration '{detail}' must be a positive whole number of seconds"
                    ))
                    .at(loc, detail)
                })?;
                if seconds.checked_mul(TICKS_PER_SECOND as u32).is_none() {
                    return Err(Diagnostic::semantic(format!(
                        "Timer duration {seconds} is too long; at most {} seconds fit",
                        u32::MAX / TICKS_PER_SECOND as u32
                    ))
                    .at(loc, detail));
                }
                self.ctx.state_mut(state).add_timer(Timer {
                    seconds,
                    recurring: row.input == InputKind::TimerR,
                    target: head,
                });
            }
            InputKind::UserIn => {
                if detail.chars().count() > MAX_INPUT_TEXT || detail.len() > FRAME_WIDTH {
                    return Err(Diagnostic::semantic("Input text too long").at(loc, detail));
                }
                self.ctx.text.intern_main(detail);
                self.ctx.state_mut(state).inputs.push(Input {
                    text: detail.to_string(),
                    target: head,
                });
            }
            InputKind::Net => {
                self.ctx.intern_descriptor(detail);
                self.ctx.state_mut(state).others.push(Other {
                    descriptor: detail.to_string(),
                    target: head,
                });
            }
            InputKind::Contd => {}
        }
        self.ctx.state_mut(state).events.insert(trigger.clone(), head);
        Ok(())
    }

    /// Link `member` after `tail` in its choice set and bring every member's
    /// total up to the new sum.
    fn append_choice(&mut self, tail: ActionRef, member: ActionRef, loc: &RowLocation) -> Result<(), Diagnostic> {
        let actions = &mut self.ctx.actions;
        let share = actions.get(member).choice_share;
        actions.get_mut(tail).next_choice = Some(member);
        actions.get_mut(member).prev_choice = Some(tail);

        let mut total = share;
        let mut cur = Some(tail);
        while let Some(r) = cur {
            let action = actions.get_mut(r);
            action.choice_total = action.choice_total.checked_add(share).ok_or_else(|| {
                Diagnostic::semantic(format!("Choice shares add up to more than {}", u16::MAX))
                    .at(loc, "")
            })?;
            total = action.choice_total;
            cur = action.prev_choice;
        }
        actions.get_mut(member).choice_total = total;
        Ok(())
    }

    fn join_alternatives(
        &mut self,
        primary: ActionRef,
        alternatives: &[ActionRef],
        loc: &RowLocation,
    ) -> Result<(), Diagnostic> {
        for &alt in alternatives {
            let tail = self.ctx.actions.choice_tail(primary);
            self.append_choice(tail, alt, loc)?;
        }
        Ok(())
    }

    // ── Result construction ──────────────────────────────────────

    fn build_result(
        &mut self,
        row: &EventRow,
        loc: &RowLocation,
        state: StateId,
        trigger: &InputTuple,
    ) -> Result<Fragment, Diagnostic> {
        if row.result == ResultKind::Text {
            return self.build_text(row, loc, state, trigger);
        }

        let detail = match row.result {
            ResultKind::SetAnimTemp | ResultKind::SetAnimBg => {
                ActionDetail::Animation(self.ctx.intern_animation(&row.result_detail))
            }
            ResultKind::StateTransition | ResultKind::Push => {
                ActionDetail::State(self.resolve_state(&row.result_detail, state, loc)?)
            }
            ResultKind::Other => {
                self.ctx.intern_descriptor(&row.result_detail);
                ActionDetail::Descriptor(row.result_detail.clone())
            }
            ResultKind::Text | ResultKind::Pop | ResultKind::Previous | ResultKind::Close => ActionDetail::None,
        };
        let duration = row.duration.unwrap_or(0.0);
        check_duration(duration.round(), loc, row)?;

        let action = Action::new(ActionType::from_result(row.result), detail, state, trigger.clone())
            .with_share(row.choice_share)
            .with_duration(duration)
            .with_line(loc.line);
        let r = self.ctx.actions.push(action);
        Ok(Fragment {
            heads: vec![r],
            tail: r,
        })
    }

    /// One chain per text (primary, then each alternative); alternatives
    /// rejoin through a trailing NOP.
    fn build_text(
        &mut self,
        row: &EventRow,
        loc: &RowLocation,
        state: StateId,
        trigger: &InputTuple,
    ) -> Result<Fragment, Diagnostic> {
        if let Some(secs) = row.duration {
            check_duration(secs * TICKS_PER_SECOND, loc, row)?;
        }
        let spec = |pool| TextSpec {
            duration: row.duration,
            trigger: trigger.kind,
            pool,
            loc,
        };

        let primary = self.text_chain(&row.result_detail, &spec(Pool::Main), row, state, trigger)?;
        if row.extra_choices.is_empty() {
            return Ok(Fragment {
                heads: vec![primary.0],
                tail: primary.1,
            });
        }

        let mut chains = vec![primary];
        for alt in &row.extra_choices {
            chains.push(self.text_chain(alt, &spec(Pool::Aux), row, state, trigger)?);
        }
        let nop = self.ctx.actions.push(
            Action::new(ActionType::Nop, ActionDetail::None, state, trigger.clone()).with_line(loc.line),
        );
        for &(_, tail) in &chains {
            self.ctx.actions.link_next(tail, nop);
        }
        Ok(Fragment {
            heads: chains.iter().map(|(head, _)| *head).collect(),
            tail: nop,
        })
    }

    /// Compile one text and chain its frames. Returns (head, tail).
    fn text_chain(
        &mut self,
        text: &str,
        spec: &TextSpec<'_>,
        row: &EventRow,
        state: StateId,
        trigger: &InputTuple,
    ) -> Result<(ActionRef, ActionRef), Diagnostic> {
        let frames = text::compile_text(self.ctx, text, spec)?;
        let mut head: Option<ActionRef> = None;
        let mut tail: Option<ActionRef> = None;
        for frame in frames {
            let action = Action::new(frame.kind, ActionDetail::Text(frame.text), state, trigger.clone())
                .with_duration(frame.duration)
                .with_line(spec.loc.line)
                .in_pool(spec.pool);
            let r = self.ctx.actions.push(action);
            match tail {
                Some(prev) => self.ctx.actions.link_next(prev, r),
                None => head = Some(r),
            }
            tail = Some(r);
        }
        let (Some(head), Some(tail)) = (head, tail) else {
            return Err(Diagnostic::semantic("Text produced no frames").at(spec.loc, text));
        };
        let share = row.choice_share;
        let action = self.ctx.actions.get_mut(head);
        action.choice_share = share;
        action.choice_total = share;
        Ok((head, tail))
    }

    // ── States ───────────────────────────────────────────────────

    fn resolve_state(&mut self, name: &str, origin: StateId, loc: &RowLocation) -> Result<StateId, Diagnostic> {
        let upper = name.trim().to_uppercase();
        if upper.is_empty() {
            return Err(Diagnostic::semantic("Transition requires a target state").at(loc, ""));
        }
        if let Some(id) = self.ctx.state_id(&upper) {
            return Ok(id);
        }
        if !self.ctx.options.allow_implicit {
            return Err(Diagnostic::semantic(format!("Transition to nonexistent state {upper}")).at(loc, name));
        }
        self.ctx.warn(
            Diagnostic::semantic(format!(
                "Implicit declaration of state {upper}; not intended for production badges"
            ))
            .at(loc, name),
        );
        let id = self.ctx.declare_state(&upper, true, 0);
        self.implicit.push((id, origin));
        Ok(id)
    }

    /// Entry for each implicit state: show its name, then go back.
    fn build_implicit_states(&mut self) {
        for (id, origin) in std::mem::take(&mut self.implicit) {
            let label = truncate_to_slot(&self.ctx.state(id).name);
            self.ctx.text.intern_main(&label);
            let trigger = InputTuple::enter();
            let show = self.ctx.actions.push(
                Action::new(ActionType::Text, ActionDetail::Text(label), id, trigger.clone())
                    .with_duration(IMPLICIT_STATE_SECONDS),
            );
            let back = self.ctx.actions.push(Action::new(
                ActionType::StateTransition,
                ActionDetail::State(origin),
                id,
                trigger.clone(),
            ));
            self.ctx.actions.link_next(show, back);
            let state = self.ctx.state_mut(id);
            state.entry = Some(show);
            state.events.insert(trigger, show);
        }
    }

    /// POST's entry announces itself, then starts the first declared state.
    fn build_post(&mut self) -> Result<(), Diagnostic> {
        if self.ctx.states.len() < 2 {
            return Err(Diagnostic::semantic("No states declared"));
        }
        let (post, first) = (StateId(0), StateId(1));
        self.ctx.intern_descriptor(POST_STATE);
        let trigger = InputTuple::enter();
        let announce = self.ctx.actions.push(Action::new(
            ActionType::Other,
            ActionDetail::Descriptor(POST_STATE.to_string()),
            post,
            trigger.clone(),
        ));
        let start = self.ctx.actions.push(Action::new(
            ActionType::StateTransition,
            ActionDetail::State(first),
            post,
            trigger.clone(),
        ));
        self.ctx.actions.link_next(announce, start);
        let state = self.ctx.state_mut(post);
        state.entry = Some(announce);
        state.events.insert(trigger, announce);
        Ok(())
    }
}

fn split_heads(fragment: &Fragment) -> (ActionRef, &[ActionRef]) {
    match fragment.heads.split_first() {
        Some((primary, rest)) => (*primary, rest),
        None => (fragment.tail, &[]),
    }
}

/// Durations are serialized as u16 (ticks for text, raw otherwise).
fn check_duration(serialized: f64, loc: &RowLocation, row: &EventRow) -> Result<(), Diagnostic> {
    if serialized.round() > f64::from(u16::MAX) {
        let cell = row.duration.map(|d| d.to_string()).unwrap_or_default();
        return Err(Diagnostic::semantic(format!("Result_duration {cell} is too long")).at(loc, &cell));
    }
    Ok(())
}

/// Longest prefix that fits a text slot without splitting a character.
fn truncate_to_slot(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars().take(FRAME_WIDTH) {
        if out.len() + c.len_utf8() > FRAME_WIDTH {
            break;
        }
        out.push(c);
    }
    out
}
