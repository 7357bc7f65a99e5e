//! Modal vi-like input handler for viewport navigation and selection.
//!
//! In Insert mode (the default) every key flows to the application. Entering
//! Normal mode activates a command language: a trie of token strings maps key
//! sequences like `h`, `yaw`, `<PageUp>`, or `C-D` to commands, with `.` as a
//! wildcard token capturing the literal character for `f`/`F`/`t`/`T`. A
//! numeric prefix multiplies the next motion or operator. The handler never
//! touches the screen itself; it drives a host-provided [`ViExecutor`].

use std::collections::HashMap;

use crate::input::{Key, Modifiers};

/// The handler's modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViMode {
    /// Keys pass through to the terminal.
    #[default]
    Insert,
    Normal,
    Visual,
    VisualLine,
    VisualBlock,
}

/// Cursor motions the executor implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViMotion {
    Up,
    Down,
    Left,
    Right,
    LineBegin,
    FirstNonBlank,
    LineEnd,
    ScreenColumn,
    PageTop,
    PageMiddle,
    PageBottom,
    FileBegin,
    FileEnd,
    WordForward,
    WordBackward,
    WordEndForward,
    BigWordForward,
    BigWordBackward,
    BigWordEndForward,
    ParagraphForward,
    ParagraphBackward,
    ParenthesisMatch,
    SectionForward,
    SectionBackward,
    SectionEndForward,
    SectionEndBackward,
    LineMarkUp,
    LineMarkDown,
}

/// Viewport scrolling requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViScroll {
    PageUp,
    PageDown,
    HalfPageUp,
    HalfPageDown,
    /// `K`: scroll up one line, moving the cursor with the viewport.
    LineUpWithCursor,
    /// `J`: scroll down one line, moving the cursor with the viewport.
    LineDownWithCursor,
}

/// Character-targeted motions (`f`/`F`/`t`/`T`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharSearch {
    /// `f`: onto the next occurrence.
    ToCharRight,
    /// `F`: onto the previous occurrence.
    ToCharLeft,
    /// `t`: just before the next occurrence.
    TillCharRight,
    /// `T`: just after the previous occurrence.
    TillCharLeft,
}

/// Text-object scope: `i` (inner) or `a` (around).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectScope {
    Inner,
    Around,
}

/// Yankable text objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextObject {
    Word,
    BigWord,
    Paragraph,
    RoundBrackets,
    SquareBrackets,
    CurlyBrackets,
    AngleBrackets,
    DoubleQuotes,
    SingleQuotes,
    BackQuotes,
    /// `m`: the marked line range.
    LineMark,
}

/// What the host must implement for vi mode to act on.
///
/// Counts are pre-multiplied; implementations treat them as repetition.
pub trait ViExecutor {
    fn mode_changed(&mut self, _mode: ViMode) {}
    fn move_cursor(&mut self, motion: ViMotion, count: u32);
    fn move_to_char(&mut self, search: CharSearch, ch: char, count: u32);
    fn scroll_viewport(&mut self, scroll: ViScroll, count: u32);
    fn yank_selection(&mut self);
    fn yank_line(&mut self, count: u32);
    fn yank_motion(&mut self, motion: ViMotion, count: u32);
    fn yank_to_char(&mut self, search: CharSearch, ch: char, count: u32);
    fn yank_object(&mut self, scope: ObjectScope, object: TextObject);
    fn paste(&mut self, count: u32, before: bool);
    fn toggle_line_mark(&mut self);
    fn search_start(&mut self);
    fn search_cancel(&mut self);
    fn search_done(&mut self);
    fn update_search_term(&mut self, term: &str);
    fn jump_to_next_match(&mut self, count: u32);
    fn jump_to_previous_match(&mut self, count: u32);
    /// `*` / `#`: search the word under the cursor.
    fn search_current_word(&mut self, forward: bool);
}

/// Everything a key sequence can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViCommand {
    EnterInsert,
    EnterVisual,
    EnterVisualLine,
    EnterVisualBlock,
    ExitToNormal,
    Move(ViMotion),
    MoveToChar(CharSearch),
    RepeatCharSearch { reverse: bool },
    Scroll(ViScroll),
    YankSelection,
    YankLine,
    YankMove(ViMotion),
    YankToChar(CharSearch),
    YankObject(ObjectScope, TextObject),
    Paste { before: bool },
    ToggleLineMark,
    SearchStart,
    SearchCurrentWord { forward: bool },
    JumpNextMatch,
    JumpPreviousMatch,
}

bitflags::bitflags! {
    /// Which modes a registration is live in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ModeMask: u8 {
        const NORMAL       = 1 << 0;
        const VISUAL       = 1 << 1;
        const VISUAL_LINE  = 1 << 2;
        const VISUAL_BLOCK = 1 << 3;
    }
}

impl ModeMask {
    const ANY_VISUAL: ModeMask = ModeMask::VISUAL
        .union(ModeMask::VISUAL_LINE)
        .union(ModeMask::VISUAL_BLOCK);
    const ALL: ModeMask = ModeMask::NORMAL.union(ModeMask::ANY_VISUAL);

    fn contains_mode(self, mode: ViMode) -> bool {
        match mode {
            ViMode::Insert => false,
            ViMode::Normal => self.contains(ModeMask::NORMAL),
            ViMode::Visual => self.contains(ModeMask::VISUAL),
            ViMode::VisualLine => self.contains(ModeMask::VISUAL_LINE),
            ViMode::VisualBlock => self.contains(ModeMask::VISUAL_BLOCK),
        }
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<&'static str, TrieNode>,
    /// `.` wildcard child: matches any literal character, capturing it.
    wildcard: Option<Box<TrieNode>>,
    command: Option<(ViCommand, ModeMask)>,
}

impl TrieNode {
    fn insert(&mut self, tokens: &[&'static str], command: ViCommand, modes: ModeMask) {
        match tokens.split_first() {
            None => self.command = Some((command, modes)),
            Some((&".", rest)) => self
                .wildcard
                .get_or_insert_with(Default::default)
                .insert(rest, command, modes),
            Some((head, rest)) => self
                .children
                .entry(*head)
                .or_default()
                .insert(rest, command, modes),
        }
    }
}

/// Result of advancing the trie by one token.
enum TrieStep {
    NoMatch,
    Partial,
    /// A completed command; the captured char is set when `.` matched.
    Complete(ViCommand, Option<char>),
}

/// The modal handler.
pub struct ViInputHandler {
    mode: ViMode,
    trie: TrieNode,
    /// Tokens matched so far (trie path from the root).
    pending: Vec<String>,
    count: u32,
    /// Last `f`/`F`/`t`/`T` for `;` and `,`.
    last_char_search: Option<(CharSearch, char)>,
    /// Search-line editing state.
    searching: bool,
    search_term: String,
}

impl Default for ViInputHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ViInputHandler {
    pub fn new() -> Self {
        Self {
            mode: ViMode::Insert,
            trie: build_command_trie(),
            pending: Vec::new(),
            count: 0,
            last_char_search: None,
            searching: false,
            search_term: String::new(),
        }
    }

    pub fn mode(&self) -> ViMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode != ViMode::Insert
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    /// Host-initiated entry into Normal mode.
    pub fn enter_normal_mode(&mut self, executor: &mut impl ViExecutor) {
        self.set_mode(ViMode::Normal, executor);
    }

    /// Host-initiated exit back to Insert (pass-through) mode.
    pub fn leave(&mut self, executor: &mut impl ViExecutor) {
        if self.searching {
            self.cancel_search(executor);
        }
        self.set_mode(ViMode::Insert, executor);
    }

    fn set_mode(&mut self, mode: ViMode, executor: &mut impl ViExecutor) {
        if self.mode != mode {
            self.mode = mode;
            self.reset_pending();
            executor.mode_changed(mode);
        }
    }

    fn reset_pending(&mut self) {
        self.pending.clear();
        self.count = 0;
    }

    /// Whether the pending path sits on a wildcard edge, so the next
    /// character is a literal capture rather than a count digit.
    fn pending_expects_literal(&self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let mut node = &self.trie;
        for token in &self.pending {
            if let Some(child) = node.children.get(token.as_str()) {
                node = child;
            } else if let Some(wild) = &node.wildcard {
                node = wild;
            } else {
                return false;
            }
        }
        node.wildcard.is_some()
    }

    /// Handle a character key. Returns `true` when consumed.
    pub fn on_char(&mut self, ch: char, modifiers: Modifiers, executor: &mut impl ViExecutor) -> bool {
        if self.mode == ViMode::Insert {
            return false;
        }
        if self.searching {
            return self.search_input_char(ch, modifiers, executor);
        }

        // Count prefix: `1-9` start it, further digits extend it; a `0`
        // without a count in progress is the line-begin motion. Digits are
        // literals when the pending sequence is waiting on `f`/`t` capture.
        if modifiers.is_empty()
            && ch.is_ascii_digit()
            && !(ch == '0' && self.count == 0)
            && !self.pending_expects_literal()
        {
            self.count = self
                .count
                .saturating_mul(10)
                .saturating_add(ch.to_digit(10).unwrap_or(0));
            return true;
        }

        let token = encode_char(ch, modifiers);
        self.feed_token(&token, Some(ch), executor)
    }

    /// Handle a non-character key. Returns `true` when consumed.
    pub fn on_key(&mut self, key: Key, executor: &mut impl ViExecutor) -> bool {
        if self.mode == ViMode::Insert {
            return false;
        }
        if self.searching {
            return false;
        }
        let Some(token) = encode_key(key) else {
            return false;
        };
        self.feed_token(token, None, executor)
    }

    /// Escape / Enter / Backspace arrive separately from printable chars.
    pub fn on_control(&mut self, byte: u8, executor: &mut impl ViExecutor) -> bool {
        if self.mode == ViMode::Insert {
            return false;
        }
        if self.searching {
            match byte {
                0x1B => self.cancel_search(executor),
                b'\r' | b'\n' => self.finish_search(executor),
                0x08 | 0x7F => {
                    self.search_term.pop();
                    executor.update_search_term(&self.search_term);
                }
                _ => return false,
            }
            return true;
        }
        match byte {
            0x1B => {
                // <ESC>: drop pending input; in a visual mode, back to normal.
                if self.pending.is_empty() && self.mode != ViMode::Normal {
                    self.set_mode(ViMode::Normal, executor);
                } else {
                    self.reset_pending();
                }
                true
            }
            b'\r' | b'\n' => self.feed_token("<NL>", None, executor),
            0x08 | 0x7F => self.feed_token("<BS>", None, executor),
            _ => false,
        }
    }

    fn feed_token(&mut self, token: &str, literal: Option<char>, executor: &mut impl ViExecutor) -> bool {
        self.pending.push(token.to_string());
        match self.walk_pending(literal) {
            TrieStep::NoMatch => {
                // Unknown sequence: swallow it and start clean.
                self.reset_pending();
                true
            }
            TrieStep::Partial => true,
            TrieStep::Complete(command, captured) => {
                let count = self.count.max(1);
                self.reset_pending();
                self.run(command, captured, count, executor);
                true
            }
        }
    }

    /// Re-walk the whole pending path, honoring mode masks and wildcards.
    fn walk_pending(&self, literal: Option<char>) -> TrieStep {
        let mut node = &self.trie;
        let mut captured = None;
        for (i, token) in self.pending.iter().enumerate() {
            let is_last = i + 1 == self.pending.len();
            if let Some(child) = node.children.get(token.as_str()) {
                node = child;
            } else if let Some(wild) = &node.wildcard {
                let ch = if is_last {
                    literal
                } else {
                    token.chars().next()
                };
                match ch {
                    Some(ch) if token.chars().count() == 1 => {
                        captured = Some(ch);
                        node = wild;
                    }
                    _ => return TrieStep::NoMatch,
                }
            } else {
                return TrieStep::NoMatch;
            }
        }
        // A live command for this mode dispatches; otherwise the path is a
        // prefix worth waiting on, or a dead end.
        match node.command {
            Some((command, modes)) if modes.contains_mode(self.mode) => {
                TrieStep::Complete(command, captured)
            }
            _ if node.children.is_empty() && node.wildcard.is_none() => TrieStep::NoMatch,
            _ => TrieStep::Partial,
        }
    }

    fn run(
        &mut self,
        command: ViCommand,
        captured: Option<char>,
        count: u32,
        executor: &mut impl ViExecutor,
    ) {
        match command {
            ViCommand::EnterInsert => self.set_mode(ViMode::Insert, executor),
            ViCommand::EnterVisual => self.set_mode(ViMode::Visual, executor),
            ViCommand::EnterVisualLine => self.set_mode(ViMode::VisualLine, executor),
            ViCommand::EnterVisualBlock => self.set_mode(ViMode::VisualBlock, executor),
            ViCommand::ExitToNormal => self.set_mode(ViMode::Normal, executor),
            ViCommand::Move(motion) => executor.move_cursor(motion, count),
            ViCommand::MoveToChar(search) => {
                if let Some(ch) = captured {
                    self.last_char_search = Some((search, ch));
                    executor.move_to_char(search, ch, count);
                }
            }
            ViCommand::RepeatCharSearch { reverse } => {
                if let Some((search, ch)) = self.last_char_search {
                    let search = if reverse { invert(search) } else { search };
                    executor.move_to_char(search, ch, count);
                }
            }
            ViCommand::Scroll(scroll) => executor.scroll_viewport(scroll, count),
            ViCommand::YankSelection => {
                executor.yank_selection();
                self.set_mode(ViMode::Normal, executor);
            }
            ViCommand::YankLine => executor.yank_line(count),
            ViCommand::YankMove(motion) => executor.yank_motion(motion, count),
            ViCommand::YankToChar(search) => {
                if let Some(ch) = captured {
                    self.last_char_search = Some((search, ch));
                    executor.yank_to_char(search, ch, count);
                }
            }
            ViCommand::YankObject(scope, object) => executor.yank_object(scope, object),
            ViCommand::Paste { before } => executor.paste(count, before),
            ViCommand::ToggleLineMark => executor.toggle_line_mark(),
            ViCommand::SearchStart => {
                self.searching = true;
                self.search_term.clear();
                executor.search_start();
            }
            ViCommand::SearchCurrentWord { forward } => executor.search_current_word(forward),
            ViCommand::JumpNextMatch => executor.jump_to_next_match(count),
            ViCommand::JumpPreviousMatch => executor.jump_to_previous_match(count),
        }
    }

    // ── Search-line editing ─────────────────────────────────────────

    fn search_input_char(
        &mut self,
        ch: char,
        modifiers: Modifiers,
        executor: &mut impl ViExecutor,
    ) -> bool {
        if !modifiers.is_empty() && modifiers != Modifiers::SHIFT {
            return false;
        }
        self.search_term.push(ch);
        executor.update_search_term(&self.search_term);
        true
    }

    fn cancel_search(&mut self, executor: &mut impl ViExecutor) {
        self.searching = false;
        self.search_term.clear();
        executor.search_cancel();
    }

    fn finish_search(&mut self, executor: &mut impl ViExecutor) {
        self.searching = false;
        executor.search_done();
    }
}

fn invert(search: CharSearch) -> CharSearch {
    match search {
        CharSearch::ToCharRight => CharSearch::ToCharLeft,
        CharSearch::ToCharLeft => CharSearch::ToCharRight,
        CharSearch::TillCharRight => CharSearch::TillCharLeft,
        CharSearch::TillCharLeft => CharSearch::TillCharRight,
    }
}

fn encode_char(ch: char, modifiers: Modifiers) -> String {
    if modifiers.contains(Modifiers::CONTROL) {
        format!("C-{}", ch.to_ascii_uppercase())
    } else {
        ch.to_string()
    }
}

fn encode_key(key: Key) -> Option<&'static str> {
    Some(match key {
        Key::UpArrow => "<Up>",
        Key::DownArrow => "<Down>",
        Key::LeftArrow => "<Left>",
        Key::RightArrow => "<Right>",
        Key::Home => "<Home>",
        Key::End => "<End>",
        Key::PageUp => "<PageUp>",
        Key::PageDown => "<PageDown>",
        Key::Insert => "<Insert>",
        _ => return None,
    })
}

/// The full registered command set.
fn build_command_trie() -> TrieNode {
    use CharSearch::*;
    use ObjectScope::*;
    use TextObject::*;
    use ViCommand::*;
    use ViMotion::*;
    use ViScroll::*;

    let mut root = TrieNode::default();
    let mut add = |tokens: &[&'static str], command: ViCommand, modes: ModeMask| {
        root.insert(tokens, command, modes);
    };

    // Mode switches.
    add(&["a"], EnterInsert, ModeMask::NORMAL);
    add(&["i"], EnterInsert, ModeMask::NORMAL);
    add(&["<Insert>"], EnterInsert, ModeMask::NORMAL);
    add(&["v"], EnterVisual, ModeMask::ALL);
    add(&["V"], EnterVisualLine, ModeMask::ALL);
    add(&["C-V"], EnterVisualBlock, ModeMask::ALL);

    // Single-token motions (normal and visual).
    let motions: &[(&'static str, ViMotion)] = &[
        ("h", Left),
        ("<Left>", Left),
        ("<BS>", Left),
        ("j", Down),
        ("<Down>", Down),
        ("<NL>", Down),
        ("k", Up),
        ("<Up>", Up),
        ("l", Right),
        ("<Right>", Right),
        ("<Space>", Right),
        ("0", LineBegin),
        ("<Home>", LineBegin),
        ("^", FirstNonBlank),
        ("$", LineEnd),
        ("<End>", LineEnd),
        ("|", ScreenColumn),
        ("H", PageTop),
        ("M", PageMiddle),
        ("L", PageBottom),
        ("G", FileEnd),
        ("w", WordForward),
        ("b", WordBackward),
        ("e", WordEndForward),
        ("W", BigWordForward),
        ("B", BigWordBackward),
        ("E", BigWordEndForward),
        ("{", ParagraphBackward),
        ("}", ParagraphForward),
        ("%", ParenthesisMatch),
    ];
    for &(token, motion) in motions {
        add(&[token], Move(motion), ModeMask::ALL);
    }
    add(&["g", "g"], Move(FileBegin), ModeMask::ALL);
    add(&["[", "["], Move(SectionBackward), ModeMask::ALL);
    add(&["]", "]"], Move(SectionForward), ModeMask::ALL);
    add(&["[", "]"], Move(SectionEndBackward), ModeMask::ALL);
    add(&["]", "["], Move(SectionEndForward), ModeMask::ALL);
    add(&["[", "m"], Move(LineMarkUp), ModeMask::ALL);
    add(&["]", "m"], Move(LineMarkDown), ModeMask::ALL);

    // Character-targeted motions.
    add(&["f", "."], MoveToChar(ToCharRight), ModeMask::ALL);
    add(&["F", "."], MoveToChar(ToCharLeft), ModeMask::ALL);
    add(&["t", "."], MoveToChar(TillCharRight), ModeMask::ALL);
    add(&["T", "."], MoveToChar(TillCharLeft), ModeMask::ALL);
    add(&[";"], RepeatCharSearch { reverse: false }, ModeMask::ALL);
    add(&[","], RepeatCharSearch { reverse: true }, ModeMask::ALL);

    // Scrolling.
    add(&["C-D"], Scroll(HalfPageDown), ModeMask::ALL);
    add(&["C-U"], Scroll(HalfPageUp), ModeMask::ALL);
    add(&["<PageUp>"], Scroll(PageUp), ModeMask::ALL);
    add(&["<PageDown>"], Scroll(PageDown), ModeMask::ALL);
    add(&["J"], Scroll(LineDownWithCursor), ModeMask::NORMAL);
    add(&["K"], Scroll(LineUpWithCursor), ModeMask::NORMAL);

    // Yank.
    add(&["y"], YankSelection, ModeMask::ANY_VISUAL);
    add(&["y", "y"], YankLine, ModeMask::NORMAL);
    add(&["Y"], YankLine, ModeMask::NORMAL);
    let yank_motions: &[(&'static str, ViMotion)] = &[
        ("b", WordBackward),
        ("e", WordEndForward),
        ("w", WordForward),
        ("B", BigWordBackward),
        ("E", BigWordEndForward),
        ("W", BigWordForward),
    ];
    for &(token, motion) in yank_motions {
        add(&["y", token], YankMove(motion), ModeMask::NORMAL);
    }
    add(&["y", "f", "."], YankToChar(ToCharRight), ModeMask::NORMAL);
    add(&["y", "F", "."], YankToChar(ToCharLeft), ModeMask::NORMAL);
    add(&["y", "t", "."], YankToChar(TillCharRight), ModeMask::NORMAL);
    add(&["y", "T", "."], YankToChar(TillCharLeft), ModeMask::NORMAL);

    // Text objects: y{i|a}{object}.
    let objects: &[(&'static str, TextObject)] = &[
        ("\"", DoubleQuotes),
        ("(", RoundBrackets),
        (")", RoundBrackets),
        ("<", AngleBrackets),
        (">", AngleBrackets),
        ("W", BigWord),
        ("[", SquareBrackets),
        ("]", SquareBrackets),
        ("'", SingleQuotes),
        ("`", BackQuotes),
        ("p", Paragraph),
        ("w", Word),
        ("{", CurlyBrackets),
        ("}", CurlyBrackets),
        ("m", LineMark),
    ];
    for &(token, object) in objects {
        add(&["y", "i", token], YankObject(Inner, object), ModeMask::NORMAL);
        add(&["y", "a", token], YankObject(Around, object), ModeMask::NORMAL);
    }

    // Paste, marks, search.
    add(&["p"], Paste { before: false }, ModeMask::NORMAL);
    add(&["P"], Paste { before: true }, ModeMask::NORMAL);
    add(&["m", "m"], ToggleLineMark, ModeMask::NORMAL);
    add(&["/"], SearchStart, ModeMask::ALL);
    add(&["*"], SearchCurrentWord { forward: true }, ModeMask::NORMAL);
    add(&["#"], SearchCurrentWord { forward: false }, ModeMask::NORMAL);
    add(&["n"], JumpNextMatch, ModeMask::ALL);
    add(&["N"], JumpPreviousMatch, ModeMask::ALL);

    root
}
