//! Phase 1: structural validation of every sheet row and declaration of
//! every explicit state, so phase 2 can resolve forward references.

use super::builtins::{IGNORED_INPUT_TYPES, START_STATE};
use super::context::CompilerContext;
use super::error::Diagnostic;
use super::row::{EventRow, InputKind, RawRow, Record, ResultKind, Row};
use super::sheet::Sheet;
use crate::util::from_serde_str;

pub fn parse(sheet: &Sheet, ctx: &mut CompilerContext) -> Result<Vec<Row>, Diagnostic> {
    ctx.max_extra_choices = sheet.max_extra_choices;
    let mut parser = Parser::new(ctx);
    let mut rows = Vec::new();
    for raw in &sheet.rows {
        if let Some(record) = parser.parse_row(raw)? {
            rows.push(Row {
                loc: raw.loc.clone(),
                record,
            });
        }
    }
    tracing::debug!(rows = rows.len(), states = ctx.states.len(), "phase 1 complete");
    Ok(rows)
}

struct Parser<'a> {
    ctx: &'a mut CompilerContext,
    in_state: bool,
    /// Result of the previous event row in the current state, if any.
    last_result: Option<ResultKind>,
}

impl<'a> Parser<'a> {
    fn new(ctx: &'a mut CompilerContext) -> Self {
        Self {
            ctx,
            in_state: false,
            last_result: None,
        }
    }

    fn parse_row(&mut self, raw: &RawRow) -> Result<Option<Record>, Diagnostic> {
        let kind = raw.input_type.to_ascii_uppercase();
        if IGNORED_INPUT_TYPES.contains(&kind.as_str()) {
            return Ok(None);
        }
        if kind == START_STATE {
            return self.declare_state(raw).map(Some);
        }
        if !self.in_state {
            return Err(Diagnostic::semantic("Input type not allowed without START_STATE first")
                .at(&raw.loc, &raw.input_type));
        }
        self.parse_event(raw).map(|e| Some(Record::Event(e)))
    }

    fn declare_state(&mut self, raw: &RawRow) -> Result<Record, Diagnostic> {
        let name = raw.input_detail.trim().to_uppercase();
        if name.is_empty() {
            return Err(Diagnostic::semantic("START_STATE requires a state name")
                .at(&raw.loc, &raw.input_type));
        }
        if self.ctx.state_id(&name).is_some() {
            return Err(Diagnostic::semantic("Duplicate state definition")
                .at(&raw.loc, &raw.input_detail));
        }
        let id = self.ctx.declare_state(&name, false, raw.loc.line);
        tracing::trace!(state = %name, id = id.0, "declared");
        self.in_state = true;
        self.last_result = None;
        Ok(Record::StateDecl { name })
    }

    fn parse_event(&mut self, raw: &RawRow) -> Result<EventRow, Diagnostic> {
        let input = from_serde_str::<InputKind>(&raw.input_type).ok_or_else(|| {
            Diagnostic::syntax(format!("Unknown input type '{}'", raw.input_type))
                .at(&raw.loc, &raw.input_type)
        })?;
        let result = from_serde_str::<ResultKind>(&raw.result_type).ok_or_else(|| {
            Diagnostic::syntax(format!("Unknown result type '{}'", raw.result_type))
                .at(&raw.loc, &raw.result_type)
        })?;

        match input {
            InputKind::Contd => match self.last_result {
                None => {
                    return Err(Diagnostic::semantic("CONTD without preceding input")
                        .at(&raw.loc, &raw.input_type));
                }
                Some(prev) if prev.is_terminal() => {
                    let name = crate::util::serde_variant_name(&prev).unwrap_or_default();
                    return Err(Diagnostic::semantic(format!(
                        "{name} must be last in its action series"
                    ))
                    .at(&raw.loc, &raw.input_type));
                }
                Some(_) => {}
            },
            InputKind::Enter if !raw.input_detail.is_empty() => {
                return Err(Diagnostic::semantic("ENTER takes no Input_detail")
                    .at(&raw.loc, &raw.input_detail));
            }
            _ => {}
        }

        let choice_share = parse_share(raw)?;
        let duration = parse_duration(raw)?;

        let extras: Vec<String> = raw.extra.iter().filter(|c| !c.is_empty()).cloned().collect();
        let extra_choices = if result == ResultKind::Text || extras.is_empty() {
            extras
        } else {
            self.ctx.warn(
                Diagnostic::style(format!(
                    "Alternative text ignored on a {} row",
                    raw.result_type.to_ascii_uppercase()
                ))
                .at(&raw.loc, extras.first().map_or("", String::as_str)),
            );
            Vec::new()
        };

        self.last_result = Some(result);
        Ok(EventRow {
            input,
            input_detail: raw.input_detail.clone(),
            choice_share,
            duration,
            result,
            result_detail: raw.result_detail.clone(),
            extra_choices,
        })
    }
}

fn parse_share(raw: &RawRow) -> Result<u16, Diagnostic> {
    if raw.choice_share.is_empty() {
        return Ok(1);
    }
    raw.choice_share.parse::<u16>().map_err(|_| {
        Diagnostic::syntax(format!(
            "Choice_share '{}' must be a whole number from 0 to {}",
            raw.choice_share,
            u16::MAX
        ))
        .at(&raw.loc, &raw.choice_share)
    })
}

fn parse_duration(raw: &RawRow) -> Result<Option<f64>, Diagnostic> {
    if raw.result_duration.is_empty() {
        return Ok(None);
    }
    match raw.result_duration.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(secs)),
        _ => Err(Diagnostic::syntax(format!(
            "Result_duration '{}' must be a non-negative number",
            raw.result_duration
        ))
        .at(&raw.loc, &raw.result_duration)),
    }
}
