//! Data-driven conformance tests.
//!
//! Fixtures live in `tests/fixtures/conformance.json`: each entry feeds a
//! hex-encoded byte stream into a fresh screen and checks cursor position
//! and selected cells. Adding coverage for a new sequence usually means
//! adding a fixture, not code.

use std::path::PathBuf;

use serde::Deserialize;
use vtcore::{CellFlags, CellLocation, Color, PageSize, Parser, Screen, Sequencer, Settings};

#[derive(Debug, Deserialize)]
struct Fixture {
    name: String,
    #[allow(dead_code)]
    description: String,
    initial_size: [u16; 2],
    input_bytes_hex: String,
    expected: Expected,
}

#[derive(Debug, Deserialize)]
struct Expected {
    cursor: CursorPos,
    cells: Vec<CellExpectation>,
}

#[derive(Debug, Deserialize)]
struct CursorPos {
    line: u16,
    column: u16,
}

#[derive(Debug, Deserialize)]
struct CellExpectation {
    line: u16,
    column: u16,
    #[serde(rename = "char")]
    ch: String,
    #[serde(default)]
    width: Option<u8>,
    #[serde(default)]
    attrs: Option<AttrExpectation>,
}

#[derive(Debug, Deserialize, Default)]
struct AttrExpectation {
    #[serde(default)]
    bold: bool,
    #[serde(default)]
    italic: bool,
    #[serde(default)]
    underline: bool,
    #[serde(default)]
    inverse: bool,
    #[serde(default)]
    fg_indexed: Option<u8>,
}

fn decode_hex(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("fixture hex"))
        .collect()
}

fn load_fixtures() -> Vec<Fixture> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("conformance.json");
    let data = std::fs::read_to_string(&path).expect("fixture file");
    serde_json::from_str(&data).expect("fixture json")
}

#[test]
fn conformance_fixtures() {
    for fixture in load_fixtures() {
        let mut settings = Settings::default();
        settings.page_size = PageSize::new(fixture.initial_size[0], fixture.initial_size[1]);
        let mut screen = Screen::new(settings);
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        sequencer.process(
            &mut parser,
            &mut screen,
            &decode_hex(&fixture.input_bytes_hex),
            None,
        );

        let cursor = screen.cursor().position;
        assert_eq!(
            cursor,
            CellLocation::new(fixture.expected.cursor.line, fixture.expected.cursor.column),
            "{}: cursor mismatch",
            fixture.name
        );

        for expectation in &fixture.expected.cells {
            let cell = screen
                .grid()
                .cell(CellLocation::new(expectation.line, expectation.column))
                .unwrap_or_else(|| panic!("{}: cell out of bounds", fixture.name));
            let expected_char = expectation.ch.chars().next().expect("fixture char");
            assert_eq!(
                cell.content(),
                expected_char,
                "{}: cell ({}, {})",
                fixture.name,
                expectation.line,
                expectation.column
            );
            if let Some(width) = expectation.width {
                assert_eq!(cell.width(), width, "{}: width", fixture.name);
            }
            if let Some(attrs) = &expectation.attrs {
                assert_eq!(
                    cell.flags.contains(CellFlags::BOLD),
                    attrs.bold,
                    "{}: bold",
                    fixture.name
                );
                assert_eq!(
                    cell.flags.contains(CellFlags::ITALIC),
                    attrs.italic,
                    "{}: italic",
                    fixture.name
                );
                assert_eq!(
                    cell.flags.contains(CellFlags::UNDERLINE),
                    attrs.underline,
                    "{}: underline",
                    fixture.name
                );
                assert_eq!(
                    cell.flags.contains(CellFlags::INVERSE),
                    attrs.inverse,
                    "{}: inverse",
                    fixture.name
                );
                if let Some(index) = attrs.fg_indexed {
                    assert_eq!(cell.fg, Color::Indexed(index), "{}: fg", fixture.name);
                }
            }
        }
    }
}

#[test]
fn fixtures_are_well_formed() {
    let fixtures = load_fixtures();
    assert!(fixtures.len() >= 5);
    for fixture in &fixtures {
        assert!(!fixture.name.is_empty());
        assert_eq!(fixture.input_bytes_hex.len() % 2, 0, "{}", fixture.name);
        assert!(fixture.initial_size[0] > 0 && fixture.initial_size[1] > 0);
    }
}
