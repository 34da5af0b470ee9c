//! Text compiler: word-wraps result text into display frames, binds `$`
//! variables, and interns frames into the main/aux string pools.

use indexmap::IndexSet;

use super::builtins::{self, FRAME_WIDTH, TEXT_BASE_SECONDS, TEXT_SECONDS_PER_CHAR};
use super::context::CompilerContext;
use super::error::Diagnostic;
use super::graph::{ActionType, Pool};
use super::row::{InputKind, RowLocation};

// ── String pools ─────────────────────────────────────────────────

/// Deduplicated frame storage. Main holds first-choice text and input
/// labels; aux holds alternates until some main-pool use promotes them.
#[derive(Debug, Clone, Default)]
pub struct TextPools {
    main: IndexSet<String>,
    aux: IndexSet<String>,
}

impl TextPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str, pool: Pool) {
        match pool {
            Pool::Main => self.intern_main(text),
            Pool::Aux => self.intern_aux(text),
        }
    }

    /// Place in main, moving it out of aux if it was put there speculatively.
    pub fn intern_main(&mut self, text: &str) {
        if self.main.contains(text) {
            return;
        }
        self.aux.shift_remove(text);
        self.main.insert(text.to_string());
    }

    pub fn intern_aux(&mut self, text: &str) {
        if self.main.contains(text) || self.aux.contains(text) {
            return;
        }
        self.aux.insert(text.to_string());
    }

    /// Serialized address: main index, or `main_len + aux index`.
    pub fn address(&self, text: &str) -> Option<usize> {
        self.main
            .get_index_of(text)
            .or_else(|| self.aux.get_index_of(text).map(|i| self.main.len() + i))
    }

    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    pub fn aux_len(&self) -> usize {
        self.aux.len()
    }

    pub fn len(&self) -> usize {
        self.main.len() + self.aux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All strings in address order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.main.iter().chain(self.aux.iter()).map(String::as_str)
    }

    pub fn in_main(&self, text: &str) -> bool {
        self.main.contains(text)
    }
}

// ── Wrapping ─────────────────────────────────────────────────────

/// Split `$name!` into (`$name`, `!`). `None` if the word isn't `$`-prefixed.
fn split_var(word: &str) -> Option<(&str, &str)> {
    let rest = word.strip_prefix('$')?;
    let len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if len == 0 {
        return None;
    }
    Some(word.split_at(len + 1))
}

/// Display width of one word, counting a known variable as its reserved width.
fn token_width(word: &str) -> usize {
    if let Some((name, rest)) = split_var(word) {
        if let Some(var) = builtins::lookup_var(name) {
            return var.width + rest.chars().count();
        }
    }
    word.chars().count()
}

/// Display width of a wrapped frame.
pub fn frame_width(frame: &str) -> usize {
    let words: Vec<&str> = frame.split(' ').collect();
    words.iter().map(|w| token_width(w)).sum::<usize>() + words.len().saturating_sub(1)
}

/// Greedy word wrap to [`FRAME_WIDTH`]. Words wider than a frame are broken.
/// Empty text yields one blank frame.
pub fn wrap(text: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for word in text.split_whitespace() {
        let width = token_width(word);
        if !current.is_empty() && current_width + 1 + width <= FRAME_WIDTH {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + width;
            continue;
        }
        if !current.is_empty() {
            frames.push(std::mem::take(&mut current));
        }
        if width <= FRAME_WIDTH {
            current = word.to_string();
            current_width = width;
        } else {
            let chars: Vec<char> = word.chars().collect();
            let mut chunks = chars.chunks(FRAME_WIDTH).peekable();
            while let Some(chunk) = chunks.next() {
                let piece: String = chunk.iter().collect();
                if chunks.peek().is_some() {
                    frames.push(piece);
                } else {
                    current_width = piece.chars().count();
                    current = piece;
                }
            }
        }
    }
    if !current.is_empty() || frames.is_empty() {
        frames.push(current);
    }
    frames
}

/// Default time on screen for a frame of `width` visible characters.
pub fn default_duration(width: usize) -> f64 {
    TEXT_BASE_SECONDS + TEXT_SECONDS_PER_CHAR * width as f64
}

// ── Variables ────────────────────────────────────────────────────

/// A frame after variable binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundFrame {
    pub text: String,
    pub kind: ActionType,
    /// `$` tokens that matched no variable and were kept literally.
    pub unknown_vars: Vec<String>,
}

/// Replace the frame's variable (if any) with its placeholder. `Err` carries
/// the names when more than one variable appears.
pub fn bind_variables(frame: &str) -> Result<BoundFrame, Vec<String>> {
    let words: Vec<&str> = frame.split(' ').collect();
    let mut found = Vec::new();
    let mut unknown_vars = Vec::new();
    for word in &words {
        if let Some((name, _)) = split_var(word) {
            match builtins::lookup_var(name) {
                Some(var) => found.push(var),
                None => unknown_vars.push(name.to_string()),
            }
        }
    }
    if found.len() > 1 {
        return Err(found.iter().map(|v| v.name.to_string()).collect());
    }
    let Some(var) = found.first() else {
        return Ok(BoundFrame {
            text: frame.to_string(),
            kind: ActionType::Text,
            unknown_vars,
        });
    };

    // The firmware runs bound frames through a printf, so literal '%' doubles.
    let text = words
        .iter()
        .map(|word| match split_var(word) {
            Some((name, rest)) if builtins::lookup_var(name).is_some() => {
                format!("{}{}", var.placeholder.format_spec(), rest.replace('%', "%%"))
            }
            _ => word.replace('%', "%%"),
        })
        .collect::<Vec<_>>()
        .join(" ");
    Ok(BoundFrame {
        text,
        kind: var.action,
        unknown_vars,
    })
}

// ── Frame compilation ────────────────────────────────────────────

/// How a piece of result text is being used.
#[derive(Debug, Clone, Copy)]
pub struct TextSpec<'a> {
    /// Explicit duration for every frame, or `None` for the per-frame default.
    pub duration: Option<f64>,
    /// Input kind that triggers the series this text belongs to.
    pub trigger: InputKind,
    pub pool: Pool,
    pub loc: &'a RowLocation,
}

/// A frame ready to become a TEXT-family action.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFrame {
    pub text: String,
    pub kind: ActionType,
    pub duration: f64,
}

/// Wrap, bind, size-check and intern one result text.
pub fn compile_text(
    ctx: &mut CompilerContext,
    text: &str,
    spec: &TextSpec<'_>,
) -> Result<Vec<CompiledFrame>, Diagnostic> {
    let frames = wrap(text);

    if frames.len() > 1 {
        if spec.trigger == InputKind::TimerR {
            ctx.warn(
                Diagnostic::style(format!(
                    "Text wraps to {} frames on a recurring timer",
                    frames.len()
                ))
                .at(spec.loc, text),
            );
        }
        if !ctx.options.suppress_single_word_warning {
            for frame in frames.iter().filter(|f| !f.contains(' ')) {
                ctx.warn(
                    Diagnostic::style(format!("Frame '{frame}' is a single word after wrapping"))
                        .at(spec.loc, frame),
                );
            }
        }
    }

    let mut compiled = Vec::with_capacity(frames.len());
    for frame in &frames {
        let bound = bind_variables(frame).map_err(|names| {
            Diagnostic::semantic(format!(
                "Only one variable allowed per frame, found {}",
                names.join(", ")
            ))
            .at(spec.loc, names.get(1).map_or(frame.as_str(), String::as_str))
        })?;
        for name in &bound.unknown_vars {
            ctx.warn(
                Diagnostic::style(format!("Unknown variable '{name}' will be shown literally"))
                    .at(spec.loc, name),
            );
        }
        if bound.text.len() > FRAME_WIDTH {
            return Err(Diagnostic::semantic(format!(
                "Text '{}' is {} bytes; a text slot holds {FRAME_WIDTH}",
                bound.text,
                bound.text.len()
            ))
            .at(spec.loc, frame));
        }
        ctx.text.intern(&bound.text, spec.pool);
        compiled.push(CompiledFrame {
            duration: spec.duration.unwrap_or_else(|| default_duration(frame_width(frame))),
            text: bound.text,
            kind: bound.kind,
        });
    }
    Ok(compiled)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;

    fn loc() -> RowLocation {
        RowLocation { line: 3, text: "ENTER,,,,TEXT,...".to_string() }
    }

    fn spec(loc: &RowLocation, trigger: InputKind) -> TextSpec<'_> {
        TextSpec { duration: None, trigger, pool: Pool::Main, loc }
    }

    #[test]
    fn wrap_is_greedy() {
        let frames = wrap("the quick brown fox jumps over the lazy dog");
        assert_eq!(frames, vec!["the quick brown fox", "jumps over the lazy dog"]);
        assert!(frames.iter().all(|f| f.chars().count() <= FRAME_WIDTH));
    }

    #[test]
    fn wrap_exact_width_fits() {
        let text = "abcdefghijkl mnopqrstuvw"; // 24 chars
        assert_eq!(wrap(text), vec![text]);
    }

    #[test]
    fn empty_text_is_one_blank_frame() {
        assert_eq!(wrap(""), vec![String::new()]);
        assert_eq!(wrap("   "), vec![String::new()]);
    }

    #[test]
    fn long_words_are_broken() {
        let frames = wrap("supercalifragilisticexpialidocious ok");
        assert_eq!(frames, vec!["supercalifragilisticexpi", "alidocious ok"]);
    }

    #[test]
    fn variables_reserve_their_width() {
        // $badgename reserves 10, so "hello $badgename, welcome" is 5+1+11+1+7 = 25
        let frames = wrap("hello $badgename, welcome");
        assert_eq!(frames, vec!["hello $badgename,", "welcome"]);
    }

    #[test]
    fn default_duration_formula() {
        assert!((default_duration(0) - 0.5).abs() < f64::EPSILON);
        assert!((default_duration(24) - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn bind_single_variable() {
        let bound = bind_variables("hi $username! 100%").unwrap();
        assert_eq!(bound.text, "hi %s! 100%%");
        assert_eq!(bound.kind, ActionType::TextUserName);
    }

    #[test]
    fn bind_rejects_two_variables() {
        let err = bind_variables("$username $badgecount").unwrap_err();
        assert_eq!(err, vec!["$username", "$badgecount"]);
    }

    #[test]
    fn unknown_dollar_token_is_literal() {
        let bound = bind_variables("pay $5 or $bogus").unwrap();
        assert_eq!(bound.text, "pay $5 or $bogus");
        assert_eq!(bound.kind, ActionType::Text);
        assert_eq!(bound.unknown_vars, vec!["$5", "$bogus"]);
    }

    #[test]
    fn aux_strings_promote_to_main() {
        let mut pools = TextPools::new();
        pools.intern_aux("ALT");
        pools.intern_aux("OTHER");
        pools.intern_main("HELLO");
        assert_eq!(pools.address("HELLO"), Some(0));
        assert_eq!(pools.address("ALT"), Some(1));
        assert_eq!(pools.address("OTHER"), Some(2));

        pools.intern_main("ALT");
        assert!(pools.in_main("ALT"));
        assert_eq!(pools.address("ALT"), Some(1));
        assert_eq!(pools.address("OTHER"), Some(2));
        assert_eq!(pools.main_len(), 2);
        assert_eq!(pools.aux_len(), 1);

        // Main strings are never demoted.
        pools.intern_aux("HELLO");
        assert_eq!(pools.aux_len(), 1);
    }

    #[test]
    fn compile_text_warns_on_recurring_multi_frame() {
        let mut ctx = CompilerContext::new(CompileOptions::default());
        let loc = loc();
        let frames = compile_text(
            &mut ctx,
            "this message is far too long for one frame",
            &spec(&loc, InputKind::TimerR),
        )
        .unwrap();
        assert_eq!(frames.len(), 2);
        assert!(ctx.diagnostics.iter().any(|d| d.message.contains("recurring timer")));
    }

    #[test]
    fn single_word_warning_can_be_suppressed() {
        let loc = loc();
        let text = "hello abcdefghijklmnopqrstuvwxyz";

        let mut ctx = CompilerContext::new(CompileOptions::default());
        compile_text(&mut ctx, text, &spec(&loc, InputKind::Enter)).unwrap();
        assert!(ctx.diagnostics.iter().any(|d| d.message.contains("single word")));

        let options = CompileOptions { suppress_single_word_warning: true, ..CompileOptions::default() };
        let mut ctx = CompilerContext::new(options);
        compile_text(&mut ctx, text, &spec(&loc, InputKind::Enter)).unwrap();
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn explicit_duration_applies_to_every_frame() {
        let mut ctx = CompilerContext::new(CompileOptions::default());
        let loc = loc();
        let spec = TextSpec { duration: Some(2.0), ..spec(&loc, InputKind::Enter) };
        let frames = compile_text(&mut ctx, "the quick brown fox jumps over the lazy dog", &spec).unwrap();
        assert!(frames.iter().all(|f| (f.duration - 2.0).abs() < f64::EPSILON));
    }

    #[test]
    fn oversized_multibyte_frame_is_fatal() {
        let mut ctx = CompilerContext::new(CompileOptions::default());
        let loc = loc();
        let err = compile_text(&mut ctx, "ééééééééééééééé", &spec(&loc, InputKind::Enter)).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.message.contains("text slot"));
    }
}
