//! Parser + screen throughput benchmarks.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vtcore::{PageSize, Parser, Screen, Sequencer, Settings};

fn screen() -> Screen {
    let mut settings = Settings::default();
    settings.page_size = PageSize::new(50, 160);
    Screen::new(settings)
}

fn plain_ascii(c: &mut Criterion) {
    let line = "the quick brown fox jumps over the lazy dog 0123456789\r\n".repeat(64);
    c.bench_function("plain_ascii_64_lines", |b| {
        let mut s = screen();
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        b.iter(|| {
            sequencer.process(&mut parser, &mut s, black_box(line.as_bytes()), None);
        });
    });
}

fn sgr_heavy(c: &mut Criterion) {
    let mut payload = String::new();
    for i in 0..256u32 {
        payload.push_str(&format!("\x1b[38;5;{}mX\x1b[0m", i % 256));
    }
    payload.push_str("\r\n");
    c.bench_function("sgr_heavy_line", |b| {
        let mut s = screen();
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        b.iter(|| {
            sequencer.process(&mut parser, &mut s, black_box(payload.as_bytes()), None);
        });
    });
}

fn cursor_motion_storm(c: &mut Criterion) {
    let mut payload = String::new();
    for i in 0..512u32 {
        payload.push_str(&format!("\x1b[{};{}H.", i % 50 + 1, i % 160 + 1));
    }
    c.bench_function("cursor_motion_storm", |b| {
        let mut s = screen();
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        b.iter(|| {
            sequencer.process(&mut parser, &mut s, black_box(payload.as_bytes()), None);
        });
    });
}

fn utf8_mixed(c: &mut Criterion) {
    let line = "日本語テキスト with mixed ascii ünïcödé 🎉\r\n".repeat(32);
    c.bench_function("utf8_mixed_32_lines", |b| {
        let mut s = screen();
        let mut parser = Parser::new();
        let mut sequencer = Sequencer::new();
        b.iter(|| {
            sequencer.process(&mut parser, &mut s, black_box(line.as_bytes()), None);
        });
    });
}

criterion_group!(benches, plain_ascii, sgr_heavy, cursor_motion_storm, utf8_mixed);
criterion_main!(benches);
