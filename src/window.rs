//! Context windows.
//!
//! For every position of a line, [`ContextWindow`] collects the rows that
//! feed the network when predicting (or predicted from) the word at that
//! position. Word rows and the paragraph row share one slot sequence; a
//! parallel flag says which table each slot indexes.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rng::SharedRng;

/// Largest supported window on either side of the target.
pub const MAX_WINDOW: usize = 64;

/// Slots in a [`Context`]: a full window on both sides plus two paragraph
/// slots (one injected at the left edge, one appended).
pub const CONTEXT_CAPACITY: usize = 2 * MAX_WINDOW + 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOptions {
    /// Words taken to the left of the target.
    pub before: usize,
    /// Words taken to the right of the target.
    pub after: usize,
    /// Draw the effective before/after uniformly from `1..=before` and
    /// `1..=after` at every position.
    pub randomize: bool,
    /// With `randomize`, use a single draw for both sides.
    pub symmetric: bool,
    /// Append the paragraph row as the last slot of every window.
    pub paragraph_mode: bool,
    /// Fill slots missing at the start of the line with `start_symbol`.
    pub prepad: bool,
    /// Fill slots missing at the end of the line with `start_symbol`.
    pub postpad: bool,
    /// When the window runs past the start of the line, put the paragraph row
    /// in the first slot instead.
    pub prepad_paragraph_once: bool,
    /// Vocabulary index used for padding.
    pub start_symbol: u32,
}

impl Default for WindowOptions {
    fn default() -> Self {
        WindowOptions {
            before: 5,
            after: 5,
            randomize: true,
            symmetric: false,
            paragraph_mode: false,
            prepad: false,
            postpad: false,
            prepad_paragraph_once: false,
            start_symbol: 0,
        }
    }
}

impl WindowOptions {
    /// A fixed window of `n` words on each side.
    pub fn fixed(n: usize) -> Self {
        WindowOptions {
            before: n,
            after: n,
            randomize: false,
            ..WindowOptions::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.before > MAX_WINDOW || self.after > MAX_WINDOW {
            return Err(ConfigError::WindowTooLarge {
                before: self.before,
                after: self.after,
                needed: self.before + self.after + 2,
            });
        }
        if self.randomize && (self.before == 0 || self.after == 0) {
            return Err(ConfigError::EmptyRandomWindow);
        }
        if self.symmetric && self.before != self.after {
            return Err(ConfigError::AsymmetricWindow {
                before: self.before,
                after: self.after,
            });
        }
        if self.prepad && self.prepad_paragraph_once {
            return Err(ConfigError::ConflictingPadding);
        }
        if self.prepad_paragraph_once && !self.paragraph_mode {
            return Err(ConfigError::ParagraphPaddingWithoutParagraphs);
        }
        Ok(())
    }

    /// Most slots a single window can fill.
    pub fn max_len(&self) -> usize {
        self.before
            + self.after
            + usize::from(self.prepad_paragraph_once)
            + usize::from(self.paragraph_mode)
    }
}

/// One training example: a target word and the rows of its window.
#[derive(Clone)]
pub struct Context {
    pub target: u32,
    /// Position of the target in its line.
    pub position: usize,
    slots: [u32; CONTEXT_CAPACITY],
    is_paragraph: [bool; CONTEXT_CAPACITY],
    len: usize,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            target: 0,
            position: 0,
            slots: [0; CONTEXT_CAPACITY],
            is_paragraph: [false; CONTEXT_CAPACITY],
            len: 0,
        }
    }
}

impl Context {
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// # Panics
    ///
    /// If the context is already at [`CONTEXT_CAPACITY`].
    pub fn push(&mut self, row: u32, is_paragraph: bool) {
        assert!(
            self.len < CONTEXT_CAPACITY,
            "context window exceeds its capacity of {CONTEXT_CAPACITY} slots"
        );
        self.slots[self.len] = row;
        self.is_paragraph[self.len] = is_paragraph;
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Row indices, in window order.
    pub fn slots(&self) -> &[u32] {
        &self.slots[..self.len]
    }

    /// `true` where the slot at the same position is a paragraph row.
    pub fn paragraph_flags(&self) -> &[bool] {
        &self.is_paragraph[..self.len]
    }

    /// `(row, is_paragraph)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.slots().iter().copied().zip(self.paragraph_flags().iter().copied())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("target", &self.target)
            .field("position", &self.position)
            .field("slots", &self.slots())
            .field("paragraph_flags", &self.paragraph_flags())
            .finish()
    }
}

/// Generates contexts for lines under one set of [`WindowOptions`].
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow<'a> {
    options: &'a WindowOptions,
    rng: &'a SharedRng,
}

impl<'a> ContextWindow<'a> {
    pub fn new(options: &'a WindowOptions, rng: &'a SharedRng) -> Self {
        ContextWindow { options, rng }
    }

    fn spans(&self) -> (usize, usize) {
        let opts = self.options;
        if !opts.randomize {
            (opts.before, opts.after)
        } else if opts.symmetric {
            let n = self.rng.one_to(opts.before);
            (n, n)
        } else {
            (self.rng.one_to(opts.before), self.rng.one_to(opts.after))
        }
    }

    /// Fill `ctx` with the window around `line[pos]`.
    ///
    /// # Panics
    ///
    /// If `pos` is out of range for `line`.
    pub fn context_at(&self, line: &[u32], pos: usize, paragraph: u32, ctx: &mut Context) {
        let opts = self.options;
        let (before, after) = self.spans();

        ctx.clear();
        ctx.target = line[pos];
        ctx.position = pos;

        let left = pos.saturating_sub(before);
        let missing_left = before - (pos - left);
        if missing_left > 0 {
            if opts.prepad_paragraph_once {
                ctx.push(paragraph, true);
            } else if opts.prepad {
                for _ in 0..missing_left {
                    ctx.push(opts.start_symbol, false);
                }
            }
        }
        for &w in &line[left..pos] {
            ctx.push(w, false);
        }

        let right = (pos + 1 + after).min(line.len());
        for &w in &line[pos + 1..right] {
            ctx.push(w, false);
        }
        let missing_right = after - (right - (pos + 1));
        if opts.postpad {
            for _ in 0..missing_right {
                ctx.push(opts.start_symbol, false);
            }
        }

        if opts.paragraph_mode {
            ctx.push(paragraph, true);
        }
    }

    /// Every context of `line`, one per position.
    pub fn contexts<'l>(&'l self, line: &'l [u32], paragraph: u32) -> Contexts<'l, 'a> {
        Contexts {
            window: self,
            line,
            paragraph,
            pos: 0,
        }
    }
}

pub struct Contexts<'l, 'a> {
    window: &'l ContextWindow<'a>,
    line: &'l [u32],
    paragraph: u32,
    pos: usize,
}

impl Iterator for Contexts<'_, '_> {
    type Item = Context;

    fn next(&mut self) -> Option<Context> {
        if self.pos >= self.line.len() {
            return None;
        }
        let mut ctx = Context::default();
        self.window
            .context_at(self.line, self.pos, self.paragraph, &mut ctx);
        self.pos += 1;
        Some(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: [u32; 7] = [11, 12, 13, 14, 15, 16, 17];
    const PARAGRAPH: u32 = 3;

    fn all_contexts(options: &WindowOptions, line: &[u32]) -> Vec<Context> {
        let rng = SharedRng::new(1);
        let window = ContextWindow::new(options, &rng);
        window.contexts(line, PARAGRAPH).collect()
    }

    #[test]
    fn fixed_word_window_is_clipped_at_line_bounds() {
        let options = WindowOptions::fixed(10);
        options.validate().unwrap();
        let contexts = all_contexts(&options, &LINE);
        assert_eq!(contexts.len(), LINE.len());
        for (pos, ctx) in contexts.iter().enumerate() {
            let expected = pos.min(10) + (LINE.len() - 1 - pos).min(10);
            assert_eq!(ctx.len(), expected);
            assert_eq!(ctx.target, LINE[pos]);
            assert!(!ctx.slots().contains(&LINE[pos]), "target in its own window");
            assert!(ctx.paragraph_flags().iter().all(|&p| !p));
        }
    }

    #[test]
    fn window_keeps_line_order() {
        let options = WindowOptions::fixed(2);
        let contexts = all_contexts(&options, &LINE);
        assert_eq!(contexts[0].slots(), &[12, 13]);
        assert_eq!(contexts[3].slots(), &[12, 13, 15, 16]);
        assert_eq!(contexts[6].slots(), &[15, 16]);
    }

    #[test]
    fn pvdbow_prepad_paragraph_once_flags() {
        let options = WindowOptions {
            paragraph_mode: true,
            prepad_paragraph_once: true,
            ..WindowOptions::fixed(10)
        };
        options.validate().unwrap();
        for ctx in all_contexts(&options, &LINE) {
            let flags = ctx.paragraph_flags();
            assert!(flags[0], "first slot of {ctx:?}");
            assert!(flags[flags.len() - 1], "last slot of {ctx:?}");
            assert!(flags[1..flags.len() - 1].iter().all(|&p| !p));
            assert_eq!(ctx.slots()[0], PARAGRAPH);
            assert_eq!(ctx.len(), LINE.len() - 1 + 2);
        }
    }

    #[test]
    fn paragraph_injected_only_on_left_underflow() {
        let options = WindowOptions {
            paragraph_mode: true,
            prepad_paragraph_once: true,
            ..WindowOptions::fixed(1)
        };
        let contexts = all_contexts(&options, &LINE);
        assert_eq!(contexts[0].slots(), &[PARAGRAPH, 12, PARAGRAPH]);
        assert_eq!(contexts[0].paragraph_flags(), &[true, false, true]);
        assert_eq!(contexts[1].slots(), &[11, 13, PARAGRAPH]);
        assert_eq!(contexts[1].paragraph_flags(), &[false, false, true]);
    }

    #[test]
    fn padding_fills_missing_slots() {
        let options = WindowOptions {
            prepad: true,
            postpad: true,
            start_symbol: 0,
            ..WindowOptions::fixed(3)
        };
        let contexts = all_contexts(&options, &LINE);
        for ctx in &contexts {
            assert_eq!(ctx.len(), 6);
        }
        assert_eq!(contexts[1].slots(), &[0, 0, 11, 13, 14, 15]);
        assert_eq!(contexts[5].slots(), &[13, 14, 15, 17, 0, 0]);

        let prepad_only = WindowOptions {
            prepad: true,
            ..WindowOptions::fixed(3)
        };
        let contexts = all_contexts(&prepad_only, &LINE);
        assert_eq!(contexts[6].slots(), &[14, 15, 16]);
    }

    #[test]
    fn random_spans_stay_in_range() {
        let options = WindowOptions {
            before: 3,
            after: 5,
            ..WindowOptions::default()
        };
        let line: Vec<u32> = (0..40).collect();
        let mut lengths = std::collections::BTreeSet::new();
        for ctx in all_contexts(&options, &line).into_iter().skip(5).take(30) {
            assert!((2..=8).contains(&ctx.len()));
            lengths.insert(ctx.len());
        }
        assert!(lengths.len() > 1);
    }

    #[test]
    fn symmetric_spans_match() {
        let options = WindowOptions {
            symmetric: true,
            ..WindowOptions::default()
        };
        let line: Vec<u32> = (0..40).collect();
        for ctx in all_contexts(&options, &line).into_iter().skip(5).take(30) {
            let left = ctx.slots().iter().filter(|&&w| (w as usize) < ctx.position).count();
            assert_eq!(left * 2, ctx.len());
        }
    }

    #[test]
    fn same_seed_same_windows() {
        let options = WindowOptions::default();
        let line: Vec<u32> = (0..20).collect();
        let a: Vec<Vec<u32>> = all_contexts(&options, &line)
            .iter()
            .map(|c| c.slots().to_vec())
            .collect();
        let b: Vec<Vec<u32>> = all_contexts(&options, &line)
            .iter()
            .map(|c| c.slots().to_vec())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_options() {
        let too_big = WindowOptions::fixed(MAX_WINDOW + 1);
        assert!(matches!(too_big.validate(), Err(ConfigError::WindowTooLarge { .. })));

        let conflicting = WindowOptions {
            paragraph_mode: true,
            prepad: true,
            prepad_paragraph_once: true,
            ..WindowOptions::fixed(2)
        };
        assert_eq!(conflicting.validate(), Err(ConfigError::ConflictingPadding));

        let no_paragraph = WindowOptions {
            prepad_paragraph_once: true,
            ..WindowOptions::fixed(2)
        };
        assert_eq!(
            no_paragraph.validate(),
            Err(ConfigError::ParagraphPaddingWithoutParagraphs)
        );

        let lopsided = WindowOptions {
            before: 2,
            after: 4,
            symmetric: true,
            ..WindowOptions::default()
        };
        assert_eq!(
            lopsided.validate(),
            Err(ConfigError::AsymmetricWindow { before: 2, after: 4 })
        );

        let empty = WindowOptions {
            before: 0,
            ..WindowOptions::default()
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyRandomWindow));

        let widest = WindowOptions {
            paragraph_mode: true,
            prepad_paragraph_once: true,
            ..WindowOptions::fixed(MAX_WINDOW)
        };
        assert!(widest.validate().is_ok());
        assert_eq!(widest.max_len(), CONTEXT_CAPACITY);
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn overfilling_a_context_panics() {
        let mut ctx = Context::default();
        for i in 0..=CONTEXT_CAPACITY {
            ctx.push(i as u32, false);
        }
    }
}
