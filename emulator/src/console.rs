//! Operator console: command grammar and execution against a [`Chain`].

use core::fmt;

use badge_core::link::Side;
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, eof, opt, preceded, repeat, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{rest, take_while};

use crate::chain::{APPLICATION_TYPES, Chain, ChainError, Notice, TICK_MS};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("tick", "tick [count]                      - advance the clock by whole ticks"),
    ("run", "run <duration>                    - advance the clock, e.g. `run 3s`"),
    ("link", "link <wire> up|down               - plug or unplug the wire right of a badge"),
    (
        "send",
        "send <badge> left|right <type> [hex bytes] - queue an application message",
    ),
    ("reset", "reset <badge>                     - discard a badge's session"),
    ("status", "status                            - show every badge"),
    ("log", "log <badge>                       - show a badge's network history"),
    ("help", "help [topic]                      - show help for a command"),
];

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command<'a> {
    Tick { count: u32 },
    Run { duration_ms: u64 },
    Link { wire: usize, connected: bool },
    Send {
        badge: usize,
        toward: Side,
        kind: u8,
        payload: Vec<u8>,
    },
    Reset { badge: usize },
    Status,
    Log { badge: usize },
    Help { topic: Option<&'a str> },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SyntaxError;

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unrecognized command, try `help`")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Keyword {
    Tick,
    Run,
    Link,
    Send,
    Reset,
    Status,
    Log,
    Help,
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<Command<'_>, SyntaxError> {
    terminated(command, (space0, eof))
        .parse(line.trim())
        .map_err(|_| SyntaxError)
}

fn command<'a>(input: &mut &'a str) -> Result<Command<'a>, ContextError> {
    match keyword.parse_next(input)? {
        Keyword::Tick => opt(preceded(space1, dec_uint))
            .map(|count| Command::Tick {
                count: count.unwrap_or(1),
            })
            .parse_next(input),
        Keyword::Run => preceded(space1, duration)
            .map(|duration_ms| Command::Run { duration_ms })
            .parse_next(input),
        Keyword::Link => (
            preceded(space1, index),
            preceded(space1, alt(("up".value(true), "down".value(false)))),
        )
            .map(|(wire, connected)| Command::Link { wire, connected })
            .parse_next(input),
        Keyword::Send => (
            preceded(space1, index),
            preceded(space1, side),
            preceded(space1, dec_uint),
            repeat(0.., preceded(space1, hex_byte)),
        )
            .map(|(badge, toward, kind, payload)| Command::Send {
                badge,
                toward,
                kind,
                payload,
            })
            .parse_next(input),
        Keyword::Reset => preceded(space1, index)
            .map(|badge| Command::Reset { badge })
            .parse_next(input),
        Keyword::Status => Ok(Command::Status),
        Keyword::Log => preceded(space1, index)
            .map(|badge| Command::Log { badge })
            .parse_next(input),
        Keyword::Help => opt(preceded(space1, rest.map(str::trim)))
            .map(|topic| Command::Help {
                topic: topic.filter(|topic| !topic.is_empty()),
            })
            .parse_next(input),
    }
}

fn keyword(input: &mut &str) -> Result<Keyword, ContextError> {
    alt((
        "tick".value(Keyword::Tick),
        "run".value(Keyword::Run),
        "link".value(Keyword::Link),
        "send".value(Keyword::Send),
        "reset".value(Keyword::Reset),
        "status".value(Keyword::Status),
        "log".value(Keyword::Log),
        "help".value(Keyword::Help),
    ))
    .parse_next(input)
}

fn index(input: &mut &str) -> Result<usize, ContextError> {
    dec_uint.parse_next(input)
}

fn side(input: &mut &str) -> Result<Side, ContextError> {
    alt(("left".value(Side::Left), "right".value(Side::Right))).parse_next(input)
}

/// `<n>ms` or `<n>s`, in milliseconds.
fn duration(input: &mut &str) -> Result<u64, ContextError> {
    (
        dec_uint::<_, u64, _>,
        alt(("ms".value(1u64), "s".value(1_000u64))),
    )
        .map(|(amount, scale)| amount.saturating_mul(scale))
        .parse_next(input)
}

fn hex_byte(input: &mut &str) -> Result<u8, ContextError> {
    take_while(1..=2, |c: char| c.is_ascii_hexdigit())
        .try_map(|digits: &str| u8::from_str_radix(digits, 16))
        .parse_next(input)
}

/// How a console line should be rendered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tone {
    Plain,
    Ok,
    Warn,
    Error,
}

/// One line of console output, optionally attributed to a badge.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    pub badge: Option<usize>,
    pub tone: Tone,
    pub text: String,
}

impl Line {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            badge: None,
            tone: Tone::Plain,
            text: text.into(),
        }
    }

    fn ok(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Ok,
            ..Self::plain(text)
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Error,
            ..Self::plain(text)
        }
    }

    fn badge(index: usize, tone: Tone, text: impl Into<String>) -> Self {
        Self {
            badge: Some(index),
            tone,
            text: text.into(),
        }
    }
}

/// Parses and runs one line, returning what to print.
pub fn execute(chain: &mut Chain<'_>, line: &str) -> Vec<Line> {
    let command = match parse(line) {
        Ok(command) => command,
        Err(error) => return vec![Line::error(format!("ERR syntax: {error}"))],
    };

    let mut lines = match run(chain, command) {
        Ok(lines) => lines,
        Err(error) => vec![Line::error(format!("ERR {error}"))],
    };

    lines.extend(chain.drain_notices().into_iter().map(|(index, notice)| {
        let tone = if notice == Notice::Disconnected {
            Tone::Warn
        } else {
            Tone::Plain
        };
        Line::badge(index, tone, notice.to_string())
    }));
    lines
}

fn run(chain: &mut Chain<'_>, command: Command<'_>) -> Result<Vec<Line>, ChainError> {
    let lines = match command {
        Command::Tick { count } => {
            chain.advance(u64::from(count).saturating_mul(TICK_MS));
            vec![Line::ok(format!("OK t={}ms", chain.now()))]
        }
        Command::Run { duration_ms } => {
            chain.advance(duration_ms);
            vec![Line::ok(format!("OK t={}ms", chain.now()))]
        }
        Command::Link { wire, connected } => {
            chain.set_link(wire, connected)?;
            let state = if connected { "up" } else { "down" };
            vec![Line::ok(format!("OK wire {wire} {state}"))]
        }
        Command::Send {
            badge,
            toward,
            kind,
            payload,
        } => {
            chain.send(badge, toward, kind, &payload)?;
            vec![Line::ok(format!(
                "OK queued type {kind} ({} bytes) toward {}",
                payload.len(),
                toward.label()
            ))]
        }
        Command::Reset { badge } => {
            chain.reset(badge)?;
            vec![Line::ok(format!("OK badge {badge} reset"))]
        }
        Command::Status => status(chain)?,
        Command::Log { badge } => log(chain, badge)?,
        Command::Help { topic } => help(topic),
    };
    Ok(lines)
}

fn status(chain: &Chain<'_>) -> Result<Vec<Line>, ChainError> {
    let mut lines = vec![Line::plain(format!(
        "t={}ms badges={} settled={}",
        chain.now(),
        chain.len(),
        chain.is_settled()
    ))];

    for index in 0..chain.len() {
        let badge = chain.badge(index)?;
        let stats = badge.stats();
        let tone = if badge.is_connected() {
            Tone::Ok
        } else {
            Tone::Warn
        };
        lines.push(Line::badge(
            index,
            tone,
            format!(
                "id={} count={} role={} state={} turn={} rx={} tx={} retx={} bad={} unknown={} resync={} resets={} last={}",
                badge.peer_id(),
                badge.peer_count(),
                badge.role().label(),
                badge.state().label(),
                if badge.holds_turn() { "yes" } else { "no" },
                stats.received,
                stats.sent,
                stats.retransmissions,
                stats.corrupted,
                stats.unknown_types,
                stats.resyncs,
                stats.resets,
                badge
                    .log()
                    .latest()
                    .map_or_else(|| "-".to_string(), |record| record.event.to_string()),
            ),
        ));
    }

    for index in 0..chain.wire_count() {
        let wire = chain.wire(index)?;
        let state = if wire.is_connected() { "up" } else { "down" };
        lines.push(Line::plain(format!(
            "wire {index}: {state} in-flight={} dropped={}",
            wire.in_flight(),
            wire.dropped()
        )));
    }
    Ok(lines)
}

fn log(chain: &Chain<'_>, index: usize) -> Result<Vec<Line>, ChainError> {
    let badge = chain.badge(index)?;
    let history = badge.log();
    if history.is_empty() {
        return Ok(vec![Line::badge(index, Tone::Plain, "no network events")]);
    }

    let mut lines = vec![Line::badge(
        index,
        Tone::Plain,
        format!("{} of {} events", history.len(), history.total()),
    )];
    lines.extend(history.oldest_first().map(|record| {
        Line::badge(index, Tone::Plain, format!("+{}ms {}", record.at, record.event))
    }));
    Ok(lines)
}

fn help(topic: Option<&str>) -> Vec<Line> {
    let Some(topic) = topic else {
        let mut lines = vec![Line::plain("Available commands:")];
        lines.extend(
            HELP_TOPICS
                .iter()
                .map(|(_, detail)| Line::plain(format!("  {detail}"))),
        );
        lines.push(Line::plain("  exit                              - leave the emulator"));
        lines.push(Line::plain(format!(
            "Application types: {}",
            APPLICATION_TYPES
                .iter()
                .map(|(kind, size, name)| format!("{kind}={name}/{size}B"))
                .collect::<Vec<_>>()
                .join(", ")
        )));
        return lines;
    };

    match HELP_TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
    {
        Some((_, detail)) => vec![Line::plain(*detail)],
        None => vec![
            Line::error(format!("No help available for `{topic}`.")),
            Line::plain(format!(
                "Available topics: {}",
                HELP_TOPICS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        ],
    }
}
