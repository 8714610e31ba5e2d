//! Interpretation of apostrophe runs (`''italic''`, `'''bold'''`).
//!
//! A run of apostrophes is ambiguous: `'''` may toggle bold or be a literal apostrophe followed by
//! an italic toggle, and `'''''` toggles both in either order. All runs of a logical line are
//! resolved together by a beam search over the possible interpretations, minimizing the number
//! of literal apostrophes plus the number of styles still open at the end of the line.
//!
//! Equal costs are broken by the order in which candidates were produced: for three apostrophes
//! the bold reading comes first, for five the order that closes the most recently opened style
//! first (or opens italic first) comes first, and earlier states beat later ones.

use crate::scanner::{Token, TokenKind};

/// Candidates kept after each run.
const BEAM_WIDTH: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("style path has {actual} entries for {expected} apostrophe runs")]
    PathLength { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    None,
    Italic,
    Bold,
    /// italic, then bold
    ItalicBold,
    /// bold, then italic
    BoldItalic,
}

/// The interpretation of one apostrophe run: `literal` apostrophes of text, then `toggle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyledRun {
    pub literal: u32,
    pub toggle: Toggle,
}

impl StyledRun {
    const fn new(literal: u32, toggle: Toggle) -> Self {
        StyledRun { literal, toggle }
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    italic: bool,
    bold: bool,
    /// whether bold was opened after italic
    bold_last: bool,
    /// literal apostrophes emitted on the path to this state
    literal: u32,
    prev: Option<usize>,
    choice: StyledRun,
}

impl State {
    const ROOT: State = State {
        italic: false,
        bold: false,
        bold_last: false,
        literal: 0,
        prev: None,
        choice: StyledRun::new(0, Toggle::None),
    };

    fn cost(&self) -> u32 {
        self.literal + u32::from(self.italic) + u32::from(self.bold)
    }

    fn toggle_italic(&mut self) {
        self.italic = !self.italic;
        if self.italic {
            self.bold_last = false;
        }
    }

    fn toggle_bold(&mut self) {
        self.bold = !self.bold;
        if self.bold {
            self.bold_last = true;
        }
    }

    fn successor(&self, index: usize, choice: StyledRun) -> State {
        let mut next = State {
            literal: self.literal + choice.literal,
            prev: Some(index),
            choice,
            ..*self
        };
        match choice.toggle {
            Toggle::None => {}
            Toggle::Italic => next.toggle_italic(),
            Toggle::Bold => next.toggle_bold(),
            Toggle::ItalicBold => {
                next.toggle_italic();
                next.toggle_bold();
            }
            Toggle::BoldItalic => {
                next.toggle_bold();
                next.toggle_italic();
            }
        }
        next
    }

    /// Readings of a run of `count` apostrophes, preferred first.
    fn choices(&self, count: u32) -> Vec<StyledRun> {
        match count {
            0 => vec![StyledRun::new(0, Toggle::None)],
            1 => vec![StyledRun::new(1, Toggle::None)],
            2 => vec![StyledRun::new(0, Toggle::Italic)],
            3 => vec![
                StyledRun::new(0, Toggle::Bold),
                StyledRun::new(1, Toggle::Italic),
            ],
            4 => vec![
                StyledRun::new(1, Toggle::Bold),
                StyledRun::new(2, Toggle::Italic),
            ],
            count => {
                let literal = count - 5;
                let bold_first = match (self.italic, self.bold) {
                    (true, true) => self.bold_last,
                    (false, true) => true,
                    _ => false,
                };
                let (preferred, other) = if bold_first {
                    (Toggle::BoldItalic, Toggle::ItalicBold)
                } else {
                    (Toggle::ItalicBold, Toggle::BoldItalic)
                };
                vec![
                    StyledRun::new(literal, preferred),
                    StyledRun::new(literal, other),
                ]
            }
        }
    }
}

/// Resolve the apostrophe runs of one logical line, given their lengths.
pub fn analyze(counts: &[u32]) -> Result<Vec<StyledRun>, StyleError> {
    let mut states = vec![State::ROOT];
    let mut frontier = vec![0];

    for &count in counts {
        let mut next = Vec::with_capacity(frontier.len() * 2);
        for &index in &frontier {
            let state = states[index];
            for choice in state.choices(count) {
                states.push(state.successor(index, choice));
                next.push(states.len() - 1);
            }
        }
        // stable: equal costs keep the order of production
        next.sort_by_key(|&i| states[i].cost());
        next.truncate(BEAM_WIDTH);
        frontier = next;
    }

    let mut path = Vec::with_capacity(counts.len());
    let mut current = frontier.first().copied().unwrap_or(0);
    while let Some(prev) = states[current].prev {
        path.push(states[current].choice);
        current = prev;
    }
    path.reverse();

    if path.len() != counts.len() {
        return Err(StyleError::PathLength {
            expected: counts.len(),
            actual: path.len(),
        });
    }
    Ok(path)
}

/// An apostrophe token together with its interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emphasis {
    /// index into the token slice
    pub token: usize,
    pub run: StyledRun,
}

/// Resolve all [`TokenKind::Style`] tokens of a token stream, line by line.
pub fn analyze_tokens(tokens: &[Token]) -> Result<Vec<Emphasis>, StyleError> {
    let mut result = Vec::new();
    let mut line: Vec<usize> = Vec::new();

    let flush = |line: &mut Vec<usize>, result: &mut Vec<Emphasis>| -> Result<(), StyleError> {
        if line.is_empty() {
            return Ok(());
        }
        let counts: Vec<u32> = line.iter().map(|&i| tokens[i].length).collect();
        let runs = analyze(&counts)?;
        result.extend(
            line.drain(..)
                .zip(runs)
                .map(|(token, run)| Emphasis { token, run }),
        );
        Ok(())
    };

    for (i, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Style {
            line.push(i);
        } else if token.kind.ends_line() {
            flush(&mut line, &mut result)?;
        }
    }
    flush(&mut line, &mut result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;
    use proptest::prelude::*;

    fn toggles(counts: &[u32]) -> Vec<(u32, Toggle)> {
        analyze(counts)
            .unwrap()
            .into_iter()
            .map(|run| (run.literal, run.toggle))
            .collect()
    }

    #[test]
    fn test_bold_pair() {
        assert_eq!(toggles(&[3, 3]), vec![(0, Toggle::Bold), (0, Toggle::Bold)]);
    }

    #[test]
    fn test_italic_bold_italic() {
        assert_eq!(
            toggles(&[2, 3, 2]),
            vec![(0, Toggle::Italic), (0, Toggle::Bold), (0, Toggle::Italic)]
        );
    }

    #[test]
    fn test_apostrophe_before_italic() {
        // l'''italic'' : the first run is an apostrophe plus an italic toggle
        assert_eq!(toggles(&[3, 2]), vec![(1, Toggle::Italic), (0, Toggle::Italic)]);
        assert_eq!(toggles(&[4, 3]), vec![(1, Toggle::Bold), (0, Toggle::Bold)]);
    }

    #[test]
    fn test_five_apostrophes() {
        assert_eq!(
            toggles(&[5, 5]),
            vec![(0, Toggle::ItalicBold), (0, Toggle::BoldItalic)]
        );
        assert_eq!(
            toggles(&[5, 3, 2]),
            vec![(0, Toggle::ItalicBold), (0, Toggle::Bold), (0, Toggle::Italic)]
        );
        assert_eq!(
            toggles(&[7, 5]),
            vec![(2, Toggle::ItalicBold), (0, Toggle::BoldItalic)]
        );
    }

    #[test]
    fn test_unbalanced() {
        assert_eq!(toggles(&[2]), vec![(0, Toggle::Italic)]);
        assert_eq!(toggles(&[1]), vec![(1, Toggle::None)]);
        assert_eq!(toggles(&[]), vec![]);
    }

    #[test]
    fn test_analyze_tokens_per_line() {
        let text = "'''a''' ''b\nc''";
        let tokens = scan(text);
        let emphasis = analyze_tokens(&tokens).unwrap();
        let toggles: Vec<_> = emphasis
            .iter()
            .map(|e| (tokens[e.token].text(text), e.run.toggle))
            .collect();
        assert_eq!(
            toggles,
            vec![
                ("'''", Toggle::Bold),
                ("'''", Toggle::Bold),
                ("''", Toggle::Italic),
                ("''", Toggle::Italic),
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 2000,
            ..ProptestConfig::default()
        })]
        #[test]
        fn path_length_matches_runs(counts in prop::collection::vec(1u32..9, 0..40)) {
            let path = analyze(&counts).unwrap();
            prop_assert_eq!(path.len(), counts.len());
            for (run, &count) in path.iter().zip(&counts) {
                let toggled = match run.toggle {
                    Toggle::None => 0,
                    Toggle::Italic => 2,
                    Toggle::Bold => 3,
                    Toggle::ItalicBold | Toggle::BoldItalic => 5,
                };
                prop_assert_eq!(run.literal + toggled, count);
            }
        }
    }
}
