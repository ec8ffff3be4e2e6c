mod chain;
mod console;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use badge_core::config::NetworkConfig;
use crossterm::style::{Color, Stylize};

use chain::{Chain, MAX_BADGES};
use console::{Line, Tone};

const DEFAULT_BADGES: usize = 3;

fn main() -> io::Result<()> {
    let count = parse_badge_count().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("Usage: badge-emulator [--badges <1-{MAX_BADGES}>]");
        process::exit(2);
    });

    let catalog = chain::catalog().unwrap_or_else(|err| {
        eprintln!("invalid message catalog: {err}");
        process::exit(1);
    });
    let wires = chain::wires(count);
    let badges = chain::badges(&wires, count, NetworkConfig::default(), &catalog);
    let mut chain = Chain::new(&wires, &badges).unwrap_or_else(|err| {
        eprintln!("cannot schedule {count} badges: {err}");
        process::exit(1);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "Badge chain emulator ready with {count} badges. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for output in console::execute(&mut chain, trimmed) {
            render(&mut writer, &output)?;
        }
    }

    Ok(())
}

fn render(writer: &mut impl Write, line: &Line) -> io::Result<()> {
    let color = match line.tone {
        Tone::Plain => Color::Reset,
        Tone::Ok => Color::Green,
        Tone::Warn => Color::Yellow,
        Tone::Error => Color::Red,
    };

    if let Some(index) = line.badge {
        write!(writer, "{} ", format!("[{index}]").cyan())?;
    }
    writeln!(writer, "{}", line.text.as_str().with(color))
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_badge_count() -> Result<usize, String> {
    let mut args = env::args().skip(1);
    let Some(arg) = args.next() else {
        return Ok(DEFAULT_BADGES);
    };

    let value = if let Some(value) = arg.strip_prefix("--badges=") {
        value.to_string()
    } else if arg == "--badges" {
        args.next()
            .ok_or_else(|| "Expected value after --badges".to_string())?
    } else {
        arg
    };

    match value.parse::<usize>() {
        Ok(count) if (1..=MAX_BADGES).contains(&count) => Ok(count),
        _ => Err(format!("Invalid badge count `{value}`")),
    }
}
